//! Assemblers (§4.5): the `Emitter` trait plus its x86-64 and AArch64 implementations.
//!
//! An `Emitter` is the thin layer between a canonical `(InstId, CondCode?, &[Operand])` triple and
//! bytes appended to a `CodeHolder`. `Builder` records IR nodes against this same vocabulary and,
//! at `finalize` time, replays them through whichever `Emitter` matches the target `Isa` — so the
//! two assemblers below are also exactly what a caller gets from `CodeHolder`-level direct emission
//! without going through a `Builder` at all.

pub mod aarch64;
pub mod x86_64;

use crate::codeholder::CodeHolder;
use crate::condcode::CondCode;
use crate::instdb::InstId;
use crate::operand::Operand;
use crate::result::CodegenResult;

/// Encodes one canonical instruction into a `CodeHolder`.
///
/// Implementations validate the operand shape against `instdb::validate` before touching the
/// buffer, so a rejected instruction never partially emits bytes.
pub trait Emitter {
    /// Append the encoding of `inst cond? operands` to `holder`.
    fn emit(
        &self,
        holder: &mut CodeHolder,
        inst: InstId,
        cond: Option<CondCode>,
        operands: &[Operand],
    ) -> CodegenResult<()>;
}
