//! The x86-64 `Emitter`.

use crate::codeholder::CodeHolder;
use crate::condcode::CondCode;
use crate::fixup::{FixupKind, FixupRecord};
use crate::instdb::{self, InstId};
use crate::isa::x86_64::encode::{encode_mem, encode_reg_reg, rex, RIP_FIXUP_KIND};
use crate::operand::{MemOperand, Operand, Reg, Width};
use crate::result::{CodegenError, CodegenResult};

use super::Emitter;

/// Emits x86-64 machine code.
pub struct X86_64Emitter;

impl Emitter for X86_64Emitter {
    fn emit(
        &self,
        holder: &mut CodeHolder,
        inst: InstId,
        cond: Option<CondCode>,
        operands: &[Operand],
    ) -> CodegenResult<()> {
        instdb::validate(inst, operands)?;
        match inst {
            InstId::Mov => emit_mov(holder, operands),
            InstId::Lea => emit_lea(holder, operands),
            InstId::Add => emit_alu(holder, operands, AluOp::Add),
            InstId::Sub => emit_alu(holder, operands, AluOp::Sub),
            InstId::And => emit_alu(holder, operands, AluOp::And),
            InstId::Or => emit_alu(holder, operands, AluOp::Or),
            InstId::Xor => emit_alu(holder, operands, AluOp::Xor),
            InstId::Cmp => emit_alu(holder, operands, AluOp::Cmp),
            InstId::Test => emit_test(holder, operands),
            InstId::Neg => emit_unary(holder, operands, 0x3),
            InstId::Not => emit_unary(holder, operands, 0x2),
            InstId::Shl => emit_shift_imm(holder, operands, 0x4),
            InstId::Shr => emit_shift_imm(holder, operands, 0x5),
            InstId::Sar => emit_shift_imm(holder, operands, 0x7),
            InstId::Rol => emit_rotate(holder, operands, 0x0),
            InstId::Ror => emit_rotate(holder, operands, 0x1),
            InstId::Imul => emit_imul(holder, operands),
            InstId::Push => emit_push(holder, operands),
            InstId::Pop => emit_pop(holder, operands),
            InstId::Call => emit_call(holder, operands),
            InstId::Ret => holder.emit(&[0xc3]),
            InstId::Jmp => emit_jmp(holder, operands),
            InstId::Jcc => emit_jcc(holder, operands, require_cond(cond)?),
            InstId::SetCc => emit_setcc(holder, operands, require_cond(cond)?),
            InstId::CmovCc => emit_cmovcc(holder, operands, require_cond(cond)?),
            InstId::Nop => holder.emit(&[0x90]),
            InstId::MovSs => emit_sse_rm(holder, operands, 0xf3, 0x10, 0x11),
            InstId::MovSd => emit_sse_rm(holder, operands, 0xf2, 0x10, 0x11),
            InstId::AddSs => emit_sse_arith(holder, operands, 0xf3, 0x58),
            InstId::AddSd => emit_sse_arith(holder, operands, 0xf2, 0x58),
            InstId::MulSs => emit_sse_arith(holder, operands, 0xf3, 0x59),
            InstId::MulSd => emit_sse_arith(holder, operands, 0xf2, 0x59),
        }
    }
}

fn require_cond(cond: Option<CondCode>) -> CodegenResult<CondCode> {
    cond.ok_or_else(|| CodegenError::invalid_argument("condition-coded instruction missing a CondCode"))
}

fn is_w64(width: Width) -> bool {
    width == Width::W64
}

fn emit_reg_direct(
    holder: &mut CodeHolder,
    opcode: &[u8],
    reg_field: Reg,
    rm_field: Reg,
) -> CodegenResult<()> {
    let (modrm_byte, rex_r, rex_b) = encode_reg_reg(reg_field, rm_field);
    if let Some(rex_byte) = rex(is_w64(reg_field.width()), rex_r, false, rex_b) {
        holder.emit(&[rex_byte])?;
    }
    holder.emit(opcode)?;
    holder.emit(&[modrm_byte])
}

/// Emit a reg-field + ModRM(+SIB)(+disp) sequence. When `mem` is `rip`-relative this also
/// registers the fixup against `mem.rip_label()`.
fn emit_reg_mem(
    holder: &mut CodeHolder,
    opcode: &[u8],
    reg_field: Reg,
    mem: &MemOperand,
) -> CodegenResult<()> {
    let reg_low = (reg_field.index() & 0x7) as u8;
    let enc = encode_mem(mem, reg_low)?;
    let rex_r = reg_field.index() & 0x8 != 0;
    if let Some(rex_byte) = rex(is_w64(reg_field.width()), rex_r, enc.rex_x, enc.rex_b) {
        holder.emit(&[rex_byte])?;
    }
    holder.emit(opcode)?;
    holder.emit(&[enc.modrm_byte])?;
    if let Some(sib) = enc.sib_byte {
        holder.emit(&[sib])?;
    }
    let disp_offset = holder.len();
    holder.emit(&enc.disp)?;
    if enc.needs_rip_fixup {
        let label = mem.rip_label().ok_or_else(|| {
            CodegenError::invalid_argument("rip-relative operand requires a label")
        })?;
        holder.add_fixup(FixupRecord::new(disp_offset, RIP_FIXUP_KIND, label))?;
    }
    Ok(())
}

fn operand_as_reg(op: &Operand) -> CodegenResult<Reg> {
    match op {
        Operand::Reg(r) => Ok(*r),
        _ => Err(CodegenError::operand_mismatch("expected a register operand")),
    }
}

fn emit_mov(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    match (&operands[0], &operands[1]) {
        // Reg-reg has no memory operand to disambiguate a direction for, so emit the store form
        // (reg field = source) to match the rest of this codebase's reg-reg encodings.
        (Operand::Reg(dst), Operand::Reg(src)) => emit_reg_direct(holder, &[0x89], *src, *dst),
        (Operand::Reg(dst), Operand::Mem(mem)) => emit_reg_mem(holder, &[0x8b], *dst, mem),
        (Operand::Reg(dst), Operand::Imm(imm)) => emit_mov_imm(holder, *dst, *imm),
        (Operand::Mem(mem), Operand::Reg(src)) => emit_reg_mem(holder, &[0x89], *src, mem),
        _ => Err(CodegenError::operand_mismatch("unsupported mov operand combination")),
    }
}

fn emit_mov_imm(holder: &mut CodeHolder, dst: Reg, imm: i64) -> CodegenResult<()> {
    let rex_b = dst.index() & 0x8 != 0;
    let low = (dst.index() & 0x7) as u8;
    if dst.width() == Width::W64 {
        if let Some(rex_byte) = rex(true, false, false, rex_b) {
            holder.emit(&[rex_byte])?;
        }
        holder.emit(&[0xb8 + low])?;
        holder.emit(&imm.to_le_bytes())
    } else {
        if let Some(rex_byte) = rex(false, false, false, rex_b) {
            holder.emit(&[rex_byte])?;
        }
        holder.emit(&[0xb8 + low])?;
        holder.emit(&(imm as i32).to_le_bytes())
    }
}

fn emit_lea(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    let mem = match &operands[1] {
        Operand::Mem(m) => m,
        _ => return Err(CodegenError::operand_mismatch("lea requires a memory second operand")),
    };
    emit_reg_mem(holder, &[0x8d], dst, mem)
}

#[derive(Copy, Clone)]
enum AluOp {
    Add,
    Or,
    And,
    Sub,
    Xor,
    Cmp,
}

impl AluOp {
    fn digit(self) -> u8 {
        match self {
            AluOp::Add => 0,
            AluOp::Or => 1,
            AluOp::And => 4,
            AluOp::Sub => 5,
            AluOp::Xor => 6,
            AluOp::Cmp => 7,
        }
    }

    /// `reg <- reg op r/m` opcode (the "load" direction).
    fn load_opcode(self) -> u8 {
        match self {
            AluOp::Add => 0x03,
            AluOp::Or => 0x0b,
            AluOp::And => 0x23,
            AluOp::Sub => 0x2b,
            AluOp::Xor => 0x33,
            AluOp::Cmp => 0x3b,
        }
    }

    /// `r/m <- r/m op reg` opcode (the "store" direction, for mem-destination forms).
    fn store_opcode(self) -> u8 {
        match self {
            AluOp::Add => 0x01,
            AluOp::Or => 0x09,
            AluOp::And => 0x21,
            AluOp::Sub => 0x29,
            AluOp::Xor => 0x31,
            AluOp::Cmp => 0x39,
        }
    }
}

fn emit_alu(holder: &mut CodeHolder, operands: &[Operand], op: AluOp) -> CodegenResult<()> {
    match (&operands[0], &operands[1]) {
        (Operand::Reg(dst), Operand::Reg(src)) => {
            // As in `emit_mov`: no memory operand to disambiguate, so emit the store form.
            emit_reg_direct(holder, &[op.store_opcode()], *src, *dst)
        }
        (Operand::Reg(dst), Operand::Mem(mem)) => emit_reg_mem(holder, &[op.load_opcode()], *dst, mem),
        (Operand::Reg(dst), Operand::Imm(imm)) => emit_alu_imm(holder, *dst, *imm, op.digit()),
        (Operand::Mem(mem), Operand::Reg(src)) => emit_reg_mem(holder, &[op.store_opcode()], *src, mem),
        _ => Err(CodegenError::operand_mismatch("unsupported alu operand combination")),
    }
}

fn emit_alu_imm(holder: &mut CodeHolder, dst: Reg, imm: i64, digit: u8) -> CodegenResult<()> {
    let rex_b = dst.index() & 0x8 != 0;
    let rm_low = (dst.index() & 0x7) as u8;
    if let Some(rex_byte) = rex(is_w64(dst.width()), false, false, rex_b) {
        holder.emit(&[rex_byte])?;
    }
    if let Ok(imm8) = i8::try_from(imm) {
        holder.emit(&[0x83])?;
        holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, digit, rm_low)])?;
        holder.emit(&[imm8 as u8])
    } else {
        holder.emit(&[0x81])?;
        holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, digit, rm_low)])?;
        holder.emit(&(imm as i32).to_le_bytes())
    }
}

fn emit_test(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let reg = operand_as_reg(&operands[1])?;
    match &operands[0] {
        Operand::Reg(rm) => emit_reg_direct(holder, &[0x85], reg, *rm),
        Operand::Mem(mem) => emit_reg_mem(holder, &[0x85], reg, mem),
        _ => Err(CodegenError::operand_mismatch("test requires a register or memory first operand")),
    }
}

fn emit_unary(holder: &mut CodeHolder, operands: &[Operand], digit: u8) -> CodegenResult<()> {
    match &operands[0] {
        Operand::Reg(r) => {
            let rex_b = r.index() & 0x8 != 0;
            let low = (r.index() & 0x7) as u8;
            if let Some(rex_byte) = rex(is_w64(r.width()), false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xf7])?;
            holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, digit, low)])
        }
        Operand::Mem(mem) => {
            let enc = encode_mem(mem, digit)?;
            if let Some(rex_byte) = rex(false, false, enc.rex_x, enc.rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xf7])?;
            holder.emit(&[enc.modrm_byte])?;
            if let Some(sib) = enc.sib_byte {
                holder.emit(&[sib])?;
            }
            holder.emit(&enc.disp)
        }
        _ => Err(CodegenError::operand_mismatch("unary op requires register or memory")),
    }
}

fn emit_shift_imm(holder: &mut CodeHolder, operands: &[Operand], digit: u8) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    let imm = match &operands[1] {
        Operand::Imm(i) => *i,
        _ => return Err(CodegenError::operand_mismatch("shift amount must be an immediate")),
    };
    let rex_b = dst.index() & 0x8 != 0;
    let low = (dst.index() & 0x7) as u8;
    if let Some(rex_byte) = rex(is_w64(dst.width()), false, false, rex_b) {
        holder.emit(&[rex_byte])?;
    }
    holder.emit(&[0xc1])?;
    holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, digit, low)])?;
    holder.emit(&[imm as u8])
}

/// `ROL`/`ROR` accept either an immediate count (`0xC1 /digit ib`) or a count taken from `cl`
/// (`0xD3 /digit`); `RCL`/`RCR` (through-carry rotation) are intentionally not supported.
fn emit_rotate(holder: &mut CodeHolder, operands: &[Operand], digit: u8) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    let rex_b = dst.index() & 0x8 != 0;
    let low = (dst.index() & 0x7) as u8;
    match &operands[1] {
        Operand::Imm(imm) => {
            if let Some(rex_byte) = rex(is_w64(dst.width()), false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xc1])?;
            holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, digit, low)])?;
            holder.emit(&[*imm as u8])
        }
        Operand::Reg(r) if r.index() == 1 && r.width() == Width::W8 => {
            if let Some(rex_byte) = rex(is_w64(dst.width()), false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xd3])?;
            holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, digit, low)])
        }
        _ => Err(CodegenError::operand_mismatch(
            "rotate count must be an immediate or cl",
        )),
    }
}

fn emit_imul(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    match &operands[1] {
        Operand::Reg(src) => emit_reg_direct(holder, &[0x0f, 0xaf], dst, *src),
        Operand::Mem(mem) => emit_reg_mem(holder, &[0x0f, 0xaf], dst, mem),
        _ => Err(CodegenError::operand_mismatch("imul requires a register or memory second operand")),
    }
}

fn emit_push(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    match &operands[0] {
        Operand::Reg(r) => {
            let rex_b = r.index() & 0x8 != 0;
            let low = (r.index() & 0x7) as u8;
            if let Some(rex_byte) = rex(false, false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0x50 + low])
        }
        Operand::Mem(mem) => {
            let enc = encode_mem(mem, 6)?;
            if let Some(rex_byte) = rex(false, false, enc.rex_x, enc.rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xff])?;
            holder.emit(&[enc.modrm_byte])?;
            if let Some(sib) = enc.sib_byte {
                holder.emit(&[sib])?;
            }
            holder.emit(&enc.disp)
        }
        _ => Err(CodegenError::operand_mismatch("push requires a register or memory operand")),
    }
}

fn emit_pop(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    match &operands[0] {
        Operand::Reg(r) => {
            let rex_b = r.index() & 0x8 != 0;
            let low = (r.index() & 0x7) as u8;
            if let Some(rex_byte) = rex(false, false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0x58 + low])
        }
        Operand::Mem(mem) => {
            let enc = encode_mem(mem, 0)?;
            if let Some(rex_byte) = rex(false, false, enc.rex_x, enc.rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0x8f])?;
            holder.emit(&[enc.modrm_byte])?;
            if let Some(sib) = enc.sib_byte {
                holder.emit(&[sib])?;
            }
            holder.emit(&enc.disp)
        }
        _ => Err(CodegenError::operand_mismatch("pop requires a register or memory operand")),
    }
}

fn emit_call(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    match &operands[0] {
        Operand::Label(label) => {
            holder.emit(&[0xe8])?;
            let offset = holder.len();
            holder.emit(&[0, 0, 0, 0])?;
            holder.add_fixup(FixupRecord::new(offset, FixupKind::Rel32, *label))
        }
        Operand::Reg(r) => {
            let rex_b = r.index() & 0x8 != 0;
            let low = (r.index() & 0x7) as u8;
            if let Some(rex_byte) = rex(false, false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xff])?;
            holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, 2, low)])
        }
        Operand::Mem(mem) => {
            let enc = encode_mem(mem, 2)?;
            if let Some(rex_byte) = rex(false, false, enc.rex_x, enc.rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0xff])?;
            holder.emit(&[enc.modrm_byte])?;
            if let Some(sib) = enc.sib_byte {
                holder.emit(&[sib])?;
            }
            holder.emit(&enc.disp)
        }
        _ => Err(CodegenError::operand_mismatch("call requires a label, register, or memory operand")),
    }
}

fn emit_jmp(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let label = match &operands[0] {
        Operand::Label(l) => *l,
        _ => return Err(CodegenError::operand_mismatch("jmp requires a label operand")),
    };
    holder.emit(&[0xe9])?;
    let offset = holder.len();
    holder.emit(&[0, 0, 0, 0])?;
    holder.add_fixup(FixupRecord::new(offset, FixupKind::Rel32, label))
}

fn emit_jcc(holder: &mut CodeHolder, operands: &[Operand], cond: CondCode) -> CodegenResult<()> {
    let label = match &operands[0] {
        Operand::Label(l) => *l,
        _ => return Err(CodegenError::operand_mismatch("jcc requires a label operand")),
    };
    holder.emit(&[0x0f, 0x80 | cond.x86_bits()])?;
    let offset = holder.len();
    holder.emit(&[0, 0, 0, 0])?;
    holder.add_fixup(FixupRecord::new(offset, FixupKind::Rel32, label))
}

fn emit_setcc(holder: &mut CodeHolder, operands: &[Operand], cond: CondCode) -> CodegenResult<()> {
    match &operands[0] {
        Operand::Reg(r) => {
            let rex_b = r.index() & 0x8 != 0;
            let low = (r.index() & 0x7) as u8;
            if let Some(rex_byte) = rex(false, false, false, rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0x0f, 0x90 | cond.x86_bits()])?;
            holder.emit(&[crate::isa::x86_64::encode::modrm(0b11, 0, low)])
        }
        Operand::Mem(mem) => {
            let enc = encode_mem(mem, 0)?;
            if let Some(rex_byte) = rex(false, false, enc.rex_x, enc.rex_b) {
                holder.emit(&[rex_byte])?;
            }
            holder.emit(&[0x0f, 0x90 | cond.x86_bits()])?;
            holder.emit(&[enc.modrm_byte])?;
            if let Some(sib) = enc.sib_byte {
                holder.emit(&[sib])?;
            }
            holder.emit(&enc.disp)
        }
        _ => Err(CodegenError::operand_mismatch("setcc requires a register or memory operand")),
    }
}

fn emit_cmovcc(holder: &mut CodeHolder, operands: &[Operand], cond: CondCode) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    match &operands[1] {
        Operand::Reg(src) => emit_reg_direct(holder, &[0x0f, 0x40 | cond.x86_bits()], dst, *src),
        Operand::Mem(mem) => emit_reg_mem(holder, &[0x0f, 0x40 | cond.x86_bits()], dst, mem),
        _ => Err(CodegenError::operand_mismatch("cmovcc requires a register or memory second operand")),
    }
}

fn emit_sse_rm(
    holder: &mut CodeHolder,
    operands: &[Operand],
    prefix: u8,
    load_op: u8,
    store_op: u8,
) -> CodegenResult<()> {
    holder.emit(&[prefix])?;
    match (&operands[0], &operands[1]) {
        (Operand::Reg(dst), Operand::Reg(src)) => emit_reg_direct(holder, &[0x0f, load_op], *dst, *src),
        (Operand::Reg(dst), Operand::Mem(mem)) => emit_reg_mem(holder, &[0x0f, load_op], *dst, mem),
        (Operand::Mem(mem), Operand::Reg(src)) => emit_reg_mem(holder, &[0x0f, store_op], *src, mem),
        _ => Err(CodegenError::operand_mismatch("unsupported scalar move operand combination")),
    }
}

fn emit_sse_arith(holder: &mut CodeHolder, operands: &[Operand], prefix: u8, opcode: u8) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    holder.emit(&[prefix])?;
    match &operands[1] {
        Operand::Reg(src) => emit_reg_direct(holder, &[0x0f, opcode], dst, *src),
        Operand::Mem(mem) => emit_reg_mem(holder, &[0x0f, opcode], dst, mem),
        _ => Err(CodegenError::operand_mismatch("unsupported scalar arithmetic operand combination")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::RegClass;

    fn rax() -> Reg {
        Reg::physical(RegClass::Gp, 0, Width::W64)
    }

    fn rcx() -> Reg {
        Reg::physical(RegClass::Gp, 1, Width::W64)
    }

    #[test]
    fn mov_reg_reg_emits_rex_w_and_store_form() {
        let mut holder = CodeHolder::new();
        X86_64Emitter
            .emit(&mut holder, InstId::Mov, None, &[Operand::Reg(rax()), Operand::Reg(rcx())])
            .unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(bytes, vec![0x48, 0x89, 0xc8]);
    }

    #[test]
    fn mov_reg_reg_matches_literal_identity_scenario() {
        // `mov rax, rdi; ret`.
        let rdi = Reg::physical(RegClass::Gp, 7, Width::W64);
        let mut holder = CodeHolder::new();
        X86_64Emitter
            .emit(&mut holder, InstId::Mov, None, &[Operand::Reg(rax()), Operand::Reg(rdi)])
            .unwrap();
        X86_64Emitter.emit(&mut holder, InstId::Ret, None, &[]).unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(bytes, vec![0x48, 0x89, 0xf8, 0xc3]);
    }

    #[test]
    fn add_reg_reg_matches_literal_win64_scenario() {
        // `mov rax, rcx; add rax, rdx; ret` (Win64's first two int args).
        let rdx = Reg::physical(RegClass::Gp, 2, Width::W64);
        let mut holder = CodeHolder::new();
        X86_64Emitter
            .emit(&mut holder, InstId::Mov, None, &[Operand::Reg(rax()), Operand::Reg(rcx())])
            .unwrap();
        X86_64Emitter
            .emit(&mut holder, InstId::Add, None, &[Operand::Reg(rax()), Operand::Reg(rdx)])
            .unwrap();
        X86_64Emitter.emit(&mut holder, InstId::Ret, None, &[]).unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(bytes, vec![0x48, 0x89, 0xc8, 0x48, 0x01, 0xd0, 0xc3]);
    }

    #[test]
    fn add_reg_imm8_uses_short_form() {
        let mut holder = CodeHolder::new();
        X86_64Emitter
            .emit(&mut holder, InstId::Add, None, &[Operand::Reg(rax()), Operand::Imm(5)])
            .unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(bytes, vec![0x48, 0x83, 0xc0, 0x05]);
    }

    #[test]
    fn ret_is_single_byte() {
        let mut holder = CodeHolder::new();
        X86_64Emitter.emit(&mut holder, InstId::Ret, None, &[]).unwrap();
        assert_eq!(holder.finalize().unwrap(), vec![0xc3]);
    }

    #[test]
    fn jcc_without_cond_code_is_rejected() {
        let mut holder = CodeHolder::new();
        let label = holder.new_label();
        assert!(X86_64Emitter
            .emit(&mut holder, InstId::Jcc, None, &[Operand::Label(label)])
            .is_err());
    }
}
