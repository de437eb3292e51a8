//! The instruction database (§4.4): canonical instruction identities and the operand shapes each
//! one accepts.
//!
//! `InstId` is architecture-independent; `Builder` records one per IR node, and each of
//! `assembler::x86_64`/`assembler::aarch64` interprets the subset it knows how to encode (not every
//! id is legal on every architecture — `Emitter::emit` reports `UnknownInstruction` for the rest).
//! Condition-code-parameterized families (`Jcc`, `SetCc`, `CmovCc`) store exactly one id each rather
//! than one per condition, with the actual condition carried alongside in the IR node.

use core::fmt;

use crate::operand::Operand;
use crate::result::{CodegenError, CodegenResult};

/// A canonical, architecture-independent instruction identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InstId {
    /// Move between registers, or a register and a memory/immediate operand.
    Mov,
    /// Load effective address (x86-64 `LEA`; AArch64 expressed as `ADD`/`ADRP` sequences by the
    /// builder rather than a single opcode, but the IR still records `Lea`).
    Lea,
    /// Integer add.
    Add,
    /// Integer subtract.
    Sub,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise exclusive or.
    Xor,
    /// Compare (subtract, discard result, set flags).
    Cmp,
    /// Bitwise and, discard result, set flags.
    Test,
    /// Two's-complement negate.
    Neg,
    /// Bitwise not.
    Not,
    /// Shift left.
    Shl,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Sar,
    /// Rotate left.
    Rol,
    /// Rotate right.
    Ror,
    /// Signed multiply.
    Imul,
    /// Push a value onto the stack (x86-64 only; AArch64 has no dedicated push opcode).
    Push,
    /// Pop a value off the stack (x86-64 only).
    Pop,
    /// Direct call.
    Call,
    /// Return.
    Ret,
    /// Unconditional jump/branch.
    Jmp,
    /// Conditional jump/branch; the `CondCode` travels with the IR node, not the id.
    Jcc,
    /// Set a byte to 0/1 from a condition (x86-64 `SETcc`).
    SetCc,
    /// Conditional move (x86-64 `CMOVcc`; AArch64 `CSEL`).
    CmovCc,
    /// No operation.
    Nop,
    /// Scalar single-precision float move.
    MovSs,
    /// Scalar double-precision float move.
    MovSd,
    /// Scalar single-precision float add.
    AddSs,
    /// Scalar double-precision float add.
    AddSd,
    /// Scalar single-precision float multiply.
    MulSs,
    /// Scalar double-precision float multiply.
    MulSd,
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What kind of value an operand slot accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperandKind {
    /// Any general-purpose register.
    Gp,
    /// Any vector register.
    Vec,
    /// An immediate.
    Imm,
    /// A memory reference.
    Mem,
    /// A label (branch/call targets).
    Label,
    /// A general-purpose register or a memory reference.
    GpOrMem,
    /// A vector register or a memory reference.
    VecOrMem,
    /// Any of register, memory, or immediate (used for some `Cmp`/`Test` forms).
    GpMemOrImm,
}

impl OperandKind {
    fn accepts(self, op: &Operand) -> bool {
        match (self, op) {
            (OperandKind::Gp, Operand::Reg(r)) => !matches!(r.class(), crate::operand::RegClass::Vec),
            (OperandKind::Vec, Operand::Reg(r)) => matches!(r.class(), crate::operand::RegClass::Vec),
            (OperandKind::Imm, Operand::Imm(_)) => true,
            (OperandKind::Mem, Operand::Mem(_)) => true,
            (OperandKind::Label, Operand::Label(_)) => true,
            (OperandKind::GpOrMem, Operand::Mem(_)) => true,
            (OperandKind::GpOrMem, Operand::Reg(r)) => !matches!(r.class(), crate::operand::RegClass::Vec),
            (OperandKind::VecOrMem, Operand::Mem(_)) => true,
            (OperandKind::VecOrMem, Operand::Reg(r)) => matches!(r.class(), crate::operand::RegClass::Vec),
            (OperandKind::GpMemOrImm, Operand::Imm(_)) => true,
            (OperandKind::GpMemOrImm, Operand::Mem(_)) => true,
            (OperandKind::GpMemOrImm, Operand::Reg(r)) => !matches!(r.class(), crate::operand::RegClass::Vec),
            _ => false,
        }
    }
}

/// One accepted operand-count-and-kind shape for an instruction.
pub struct Signature {
    /// The instruction this signature belongs to, for error messages.
    pub inst: InstId,
    /// The accepted kind of each operand slot, in order.
    pub shape: &'static [OperandKind],
}

/// Every signature the instruction database recognizes, grouped loosely by id. `validate` performs
/// a linear scan; the database is small enough that this is simpler and just as fast as a hash
/// lookup keyed by `(InstId, arity)`.
const SIGNATURES: &[Signature] = &[
    sig(InstId::Mov, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::Mov, &[OperandKind::Mem, OperandKind::Gp]),
    sig(InstId::Lea, &[OperandKind::Gp, OperandKind::Mem]),
    sig(InstId::Add, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::Add, &[OperandKind::Mem, OperandKind::GpOrMem]),
    sig(InstId::Sub, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::And, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::Or, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::Xor, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::Cmp, &[OperandKind::Gp, OperandKind::GpMemOrImm]),
    sig(InstId::Test, &[OperandKind::Gp, OperandKind::GpOrMem]),
    sig(InstId::Neg, &[OperandKind::GpOrMem]),
    sig(InstId::Not, &[OperandKind::GpOrMem]),
    sig(InstId::Shl, &[OperandKind::GpOrMem, OperandKind::Imm]),
    sig(InstId::Shr, &[OperandKind::GpOrMem, OperandKind::Imm]),
    sig(InstId::Sar, &[OperandKind::GpOrMem, OperandKind::Imm]),
    sig(InstId::Rol, &[OperandKind::GpOrMem, OperandKind::GpMemOrImm]),
    sig(InstId::Ror, &[OperandKind::GpOrMem, OperandKind::GpMemOrImm]),
    sig(InstId::Imul, &[OperandKind::Gp, OperandKind::GpOrMem]),
    sig(InstId::Push, &[OperandKind::GpOrMem]),
    sig(InstId::Pop, &[OperandKind::GpOrMem]),
    sig(InstId::Call, &[OperandKind::Label]),
    sig(InstId::Call, &[OperandKind::GpOrMem]),
    sig(InstId::Ret, &[]),
    sig(InstId::Jmp, &[OperandKind::Label]),
    sig(InstId::Jcc, &[OperandKind::Label]),
    sig(InstId::SetCc, &[OperandKind::GpOrMem]),
    sig(InstId::CmovCc, &[OperandKind::Gp, OperandKind::GpOrMem]),
    sig(InstId::Nop, &[]),
    sig(InstId::MovSs, &[OperandKind::Vec, OperandKind::VecOrMem]),
    sig(InstId::MovSs, &[OperandKind::Mem, OperandKind::Vec]),
    sig(InstId::MovSd, &[OperandKind::Vec, OperandKind::VecOrMem]),
    sig(InstId::MovSd, &[OperandKind::Mem, OperandKind::Vec]),
    sig(InstId::AddSs, &[OperandKind::Vec, OperandKind::VecOrMem]),
    sig(InstId::AddSd, &[OperandKind::Vec, OperandKind::VecOrMem]),
    sig(InstId::MulSs, &[OperandKind::Vec, OperandKind::VecOrMem]),
    sig(InstId::MulSd, &[OperandKind::Vec, OperandKind::VecOrMem]),
];

const fn sig(inst: InstId, shape: &'static [OperandKind]) -> Signature {
    Signature { inst, shape }
}

/// Check that `operands` matches some signature registered for `inst`.
///
/// # Errors
/// `UnknownInstruction` if no signature is registered for `inst` at all; `OperandMismatch` if
/// signatures exist but none match the given operand list.
pub fn validate(inst: InstId, operands: &[Operand]) -> CodegenResult<()> {
    let mut any_for_inst = false;
    for candidate in SIGNATURES {
        if candidate.inst != inst {
            continue;
        }
        any_for_inst = true;
        if candidate.shape.len() != operands.len() {
            continue;
        }
        if candidate
            .shape
            .iter()
            .zip(operands.iter())
            .all(|(kind, op)| kind.accepts(op))
        {
            return Ok(());
        }
    }
    if any_for_inst {
        Err(CodegenError::operand_mismatch(format!(
            "no signature of {} accepts the given operands",
            inst
        )))
    } else {
        Err(CodegenError::unknown_instruction(format!(
            "{} has no registered signature",
            inst
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{Reg, RegClass, Width};

    #[test]
    fn mov_reg_reg_validates() {
        let rax = Reg::physical(RegClass::Gp, 0, Width::W64);
        let rcx = Reg::physical(RegClass::Gp, 1, Width::W64);
        assert!(validate(InstId::Mov, &[Operand::Reg(rax), Operand::Reg(rcx)]).is_ok());
    }

    #[test]
    fn mov_reg_imm_validates() {
        let rax = Reg::physical(RegClass::Gp, 0, Width::W64);
        assert!(validate(InstId::Mov, &[Operand::Reg(rax), Operand::Imm(5)]).is_ok());
    }

    #[test]
    fn ret_takes_no_operands() {
        assert!(validate(InstId::Ret, &[]).is_ok());
        let rax = Reg::physical(RegClass::Gp, 0, Width::W64);
        assert!(validate(InstId::Ret, &[Operand::Reg(rax)]).is_err());
    }

    #[test]
    fn vec_register_rejected_for_gp_only_instruction() {
        let xmm0 = Reg::physical(RegClass::Vec, 0, Width::W128);
        assert!(matches!(
            validate(InstId::Neg, &[Operand::Reg(xmm0)]),
            Err(CodegenError::OperandMismatch(_))
        ));
    }
}
