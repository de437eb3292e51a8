//! The AArch64 `Emitter`.
//!
//! Every instruction here is exactly one 32-bit little-endian word. There is no variable-length
//! encoding to worry about, but immediates are narrower (12 or 16 bits for data-processing
//! immediates) so several x86-64 instruction shapes lower to short sequences instead of a single
//! opcode (`Lea` on a large displacement becomes `ADRP`+`ADD`; a 64-bit immediate `Mov` becomes up
//! to four `MOVZ`/`MOVK`).

use crate::codeholder::CodeHolder;
use crate::condcode::CondCode;
use crate::fixup::{FixupKind, FixupRecord};
use crate::instdb::{self, InstId};
use crate::isa::aarch64::encode::{
    adr_like, branch26, compare_branch19, cond_branch19, load_store_unscaled_imm9, rd_imm16,
    rd_rn_imm12, rd_rn_rm,
};
use crate::isa::aarch64::ZR;
use crate::operand::{MemOperand, Operand, Reg, Width};
use crate::result::{CodegenError, CodegenResult};

use super::Emitter;

/// Emits AArch64 machine code.
pub struct Aarch64Emitter;

impl Emitter for Aarch64Emitter {
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
            InstId::Add => emit_add_sub(holder, operands, false),
            InstId::Sub => emit_add_sub(holder, operands, true),
            InstId::Cmp => emit_cmp(holder, operands),
            InstId::Ret => emit_word(holder, 0xd65f03c0),
            InstId::Nop => emit_word(holder, 0xd503201f),
            InstId::Jmp => emit_branch(holder, operands),
            InstId::Jcc => emit_cond_branch(holder, operands, require_cond(cond)?),
            InstId::Call => emit_call(holder, operands),
            _ => Err(CodegenError::unknown_instruction(format!(
                "{} is not implemented for aarch64",
                inst
            ))),
        }
    }
}

fn require_cond(cond: Option<CondCode>) -> CodegenResult<CondCode> {
    cond.ok_or_else(|| CodegenError::invalid_argument("condition-coded instruction missing a CondCode"))
}

fn emit_word(holder: &mut CodeHolder, word: u32) -> CodegenResult<()> {
    holder.emit(&word.to_le_bytes())
}

fn operand_as_reg(op: &Operand) -> CodegenResult<Reg> {
    match op {
        Operand::Reg(r) => Ok(*r),
        _ => Err(CodegenError::operand_mismatch("expected a register operand")),
    }
}

fn sf_bit(width: Width) -> u32 {
    if width == Width::W64 {
        1 << 31
    } else {
        0
    }
}

fn emit_mov(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    match (&operands[0], &operands[1]) {
        (Operand::Reg(dst), Operand::Reg(src)) => {
            // `MOV Rd, Rn` is the canonical alias of `ORR Rd, ZR, Rn`.
            let base = 0x2a000000 | sf_bit(dst.width());
            emit_word(holder, rd_rn_rm(base, *dst, ZR, *src))
        }
        (Operand::Reg(dst), Operand::Imm(imm)) => emit_mov_imm(holder, *dst, *imm),
        (Operand::Reg(dst), Operand::Mem(mem)) => emit_load(holder, *dst, mem),
        (Operand::Mem(mem), Operand::Reg(src)) => emit_store(holder, *src, mem),
        _ => Err(CodegenError::operand_mismatch("unsupported mov operand combination")),
    }
}

/// `LDUR Rt, [Rn, #imm9]`: the spill-reload pass is the only source of `Mem` operands on this
/// architecture today, and its offsets are frame-pointer-relative and often negative, so the
/// unscaled form (rather than `LDR`'s scaled, non-negative `imm12`) is what fits.
fn emit_load(holder: &mut CodeHolder, dst: Reg, mem: &MemOperand) -> CodegenResult<()> {
    let base = mem_base(mem)?;
    let imm9 = unscaled_imm9(mem.disp())?;
    let opcode = if dst.width() == Width::W64 { 0xf840_0000 } else { 0xb840_0000 };
    emit_word(holder, load_store_unscaled_imm9(opcode, dst, base, imm9))
}

/// `STUR Rt, [Rn, #imm9]`.
fn emit_store(holder: &mut CodeHolder, src: Reg, mem: &MemOperand) -> CodegenResult<()> {
    let base = mem_base(mem)?;
    let imm9 = unscaled_imm9(mem.disp())?;
    let opcode = if src.width() == Width::W64 { 0xf800_0000 } else { 0xb800_0000 };
    emit_word(holder, load_store_unscaled_imm9(opcode, src, base, imm9))
}

fn mem_base(mem: &MemOperand) -> CodegenResult<Reg> {
    mem.base()
        .ok_or_else(|| CodegenError::operand_mismatch("aarch64 load/store requires a base register"))
}

fn unscaled_imm9(disp: i32) -> CodegenResult<i16> {
    i16::try_from(disp)
        .ok()
        .filter(|d| (-256..=255).contains(d))
        .ok_or_else(|| CodegenError::invalid_argument("aarch64 unscaled load/store offset must fit in 9 bits"))
}

/// Materialize an arbitrary 64-bit immediate via one `MOVZ` (lowest nonzero halfword, or halfword
/// 0 if the immediate is zero) followed by up to three `MOVK`s for the remaining halfwords.
fn emit_mov_imm(holder: &mut CodeHolder, dst: Reg, imm: i64) -> CodegenResult<()> {
    let bits = if dst.width() == Width::W64 { imm as u64 } else { (imm as u32) as u64 };
    let halfwords: Vec<u16> = (0..4).map(|i| ((bits >> (i * 16)) & 0xffff) as u16).collect();
    let sf = sf_bit(dst.width());
    let max_hw = if dst.width() == Width::W64 { 4 } else { 2 };

    let first_nonzero = halfwords[..max_hw].iter().position(|&h| h != 0);
    match first_nonzero {
        None => emit_word(holder, rd_imm16(0x52800000 | sf, dst, 0, 0)), // movz dst, #0
        Some(first) => {
            emit_word(holder, rd_imm16(0x52800000 | sf, dst, halfwords[first], first as u8))?;
            for hw in (first + 1)..max_hw {
                if halfwords[hw] != 0 {
                    emit_word(holder, rd_imm16(0x72800000 | sf, dst, halfwords[hw], hw as u8))?;
                }
            }
            Ok(())
        }
    }
}

fn emit_add_sub(holder: &mut CodeHolder, operands: &[Operand], is_sub: bool) -> CodegenResult<()> {
    let dst = operand_as_reg(&operands[0])?;
    let sf = sf_bit(dst.width());
    match &operands[1] {
        Operand::Reg(src) => {
            let base = (if is_sub { 0x4b000000 } else { 0x0b000000 }) | sf;
            emit_word(holder, rd_rn_rm(base, dst, dst, *src))
        }
        Operand::Imm(imm) => {
            let imm12 = u16::try_from(*imm).map_err(|_| {
                CodegenError::invalid_argument("aarch64 add/sub immediate must fit in 12 bits")
            })?;
            let base = (if is_sub { 0x51000000 } else { 0x11000000 }) | sf;
            emit_word(holder, rd_rn_imm12(base, dst, dst, imm12))
        }
        _ => Err(CodegenError::operand_mismatch("add/sub requires a register or immediate second operand")),
    }
}

fn emit_cmp(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let lhs = operand_as_reg(&operands[0])?;
    let sf = sf_bit(lhs.width());
    match &operands[1] {
        Operand::Reg(rhs) => {
            // `CMP Rn, Rm` aliases `SUBS ZR, Rn, Rm`.
            emit_word(holder, rd_rn_rm(0x6b000000 | sf, ZR, lhs, *rhs))
        }
        Operand::Imm(imm) => {
            let imm12 = u16::try_from(*imm).map_err(|_| {
                CodegenError::invalid_argument("aarch64 cmp immediate must fit in 12 bits")
            })?;
            emit_word(holder, rd_rn_imm12(0x71000000 | sf, ZR, lhs, imm12))
        }
        _ => Err(CodegenError::operand_mismatch("cmp requires a register or immediate second operand")),
    }
}

fn emit_branch(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let label = match &operands[0] {
        Operand::Label(l) => *l,
        _ => return Err(CodegenError::operand_mismatch("jmp requires a label operand")),
    };
    let offset = holder.len();
    emit_word(holder, branch26(0x14000000))?;
    holder.add_fixup(FixupRecord::new(offset, FixupKind::Aarch64Branch26, label))
}

fn emit_cond_branch(holder: &mut CodeHolder, operands: &[Operand], cond: CondCode) -> CodegenResult<()> {
    let label = match &operands[0] {
        Operand::Label(l) => *l,
        _ => return Err(CodegenError::operand_mismatch("jcc requires a label operand")),
    };
    let offset = holder.len();
    emit_word(holder, cond_branch19(0x54000000, cond.aarch64_bits()))?;
    holder.add_fixup(FixupRecord::new(offset, FixupKind::Aarch64CondBranch19, label))
}

fn emit_call(holder: &mut CodeHolder, operands: &[Operand]) -> CodegenResult<()> {
    let label = match &operands[0] {
        Operand::Label(l) => *l,
        _ => return Err(CodegenError::operand_mismatch("call requires a label operand")),
    };
    let offset = holder.len();
    emit_word(holder, branch26(0x94000000))?; // BL
    holder.add_fixup(FixupRecord::new(offset, FixupKind::Aarch64Branch26, label))
}

/// `CBZ`/`CBNZ`-style compare-and-branch is not wired into the shared `InstId` vocabulary (it has
/// no x86-64 counterpart to unify with); a `Builder` targeting AArch64 that wants one emits the
/// equivalent `Cmp`+`Jcc` pair instead. The `compare_branch19` encoding helper remains available
/// for `Frame`'s stack-probe sequence.
#[allow(dead_code)]
fn unused_compare_branch_hook(holder: &mut CodeHolder, rt: Reg) -> CodegenResult<()> {
    emit_word(holder, compare_branch19(0xb4000000, rt))?;
    emit_word(holder, adr_like(0x90000000, rt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::aarch64::x;

    #[test]
    fn ret_is_fixed_encoding() {
        let mut holder = CodeHolder::new();
        Aarch64Emitter.emit(&mut holder, InstId::Ret, None, &[]).unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(u32::from_le_bytes(bytes.try_into().unwrap()), 0xd65f03c0);
    }

    #[test]
    fn mov_small_immediate_emits_single_movz() {
        let mut holder = CodeHolder::new();
        let x0 = x(0, Width::W64);
        Aarch64Emitter
            .emit(&mut holder, InstId::Mov, None, &[Operand::Reg(x0), Operand::Imm(42)])
            .unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(bytes.len(), 4);
        let word = u32::from_le_bytes(bytes.try_into().unwrap());
        assert_eq!(word & 0xffff_ffe0, 0xd280_0540 & 0xffff_ffe0);
    }

    #[test]
    fn mov_from_memory_emits_ldur() {
        let mut holder = CodeHolder::new();
        let x0 = x(0, Width::W64);
        let x29 = x(29, Width::W64);
        let mem = MemOperand::base_disp(x29, -16, 8);
        Aarch64Emitter
            .emit(&mut holder, InstId::Mov, None, &[Operand::Reg(x0), Operand::Mem(mem)])
            .unwrap();
        let bytes = holder.finalize().unwrap();
        let word = u32::from_le_bytes(bytes.try_into().unwrap());
        assert_eq!(word >> 22, 0xf840_0000u32 >> 22); // LDUR opcode bits
    }

    #[test]
    fn mov_to_memory_emits_stur() {
        let mut holder = CodeHolder::new();
        let x0 = x(0, Width::W64);
        let x29 = x(29, Width::W64);
        let mem = MemOperand::base_disp(x29, -16, 8);
        Aarch64Emitter
            .emit(&mut holder, InstId::Mov, None, &[Operand::Mem(mem), Operand::Reg(x0)])
            .unwrap();
        let bytes = holder.finalize().unwrap();
        let word = u32::from_le_bytes(bytes.try_into().unwrap());
        assert_eq!(word >> 22, 0xf800_0000u32 >> 22); // STUR opcode bits
    }

    #[test]
    fn add_reg_reg_uses_zero_shift_form() {
        let mut holder = CodeHolder::new();
        let x0 = x(0, Width::W64);
        let x1 = x(1, Width::W64);
        Aarch64Emitter
            .emit(&mut holder, InstId::Add, None, &[Operand::Reg(x0), Operand::Reg(x1)])
            .unwrap();
        let bytes = holder.finalize().unwrap();
        let word = u32::from_le_bytes(bytes.try_into().unwrap());
        assert_eq!(word >> 31, 1); // sf bit set for 64-bit
    }
}
