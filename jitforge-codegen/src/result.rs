//! Errors produced while building, encoding, or allocating registers for code.

use failure_derive::Fail;

/// A fallible result produced by this crate.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Everything that can go wrong between building an IR and handing finalized bytes to the runtime.
///
/// Every variant carries a short, human-readable context string describing *where* the failure
/// happened; the enum tag alone describes *what kind* of failure it was.
#[derive(Fail, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// A nonsensical size, operand kind, or bound was passed to a constructor.
    #[fail(display = "invalid argument: {}", _0)]
    InvalidArgument(String),

    /// No instruction-database signature matched the canonical id and operand list supplied.
    #[fail(display = "unknown instruction: {}", _0)]
    UnknownInstruction(String),

    /// A signature matched the instruction id but not on operand kind or width.
    #[fail(display = "operand mismatch: {}", _0)]
    OperandMismatch(String),

    /// An operation was attempted against an object in the wrong lifecycle state (writing to a
    /// non-writable block, double-binding a label, finalizing twice).
    #[fail(display = "invalid state: {}", _0)]
    InvalidState(String),

    /// `finalize()` was called while a referenced label was never bound.
    #[fail(display = "unresolved label: {}", _0)]
    UnresolvedLabel(String),

    /// A `rel8`/`rel32`/AArch64 branch-immediate fixup computed a displacement that doesn't fit.
    #[fail(display = "displacement overflow: {}", _0)]
    DisplacementOverflow(String),
}

impl CodegenError {
    /// Build an `InvalidArgument` with a formatted message.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        CodegenError::InvalidArgument(msg.into())
    }

    /// Build an `UnknownInstruction` with a formatted message.
    pub fn unknown_instruction<S: Into<String>>(msg: S) -> Self {
        CodegenError::UnknownInstruction(msg.into())
    }

    /// Build an `OperandMismatch` with a formatted message.
    pub fn operand_mismatch<S: Into<String>>(msg: S) -> Self {
        CodegenError::OperandMismatch(msg.into())
    }

    /// Build an `InvalidState` with a formatted message.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        CodegenError::InvalidState(msg.into())
    }

    /// Build an `UnresolvedLabel` with a formatted message.
    pub fn unresolved_label<S: Into<String>>(msg: S) -> Self {
        CodegenError::UnresolvedLabel(msg.into())
    }

    /// Build a `DisplacementOverflow` with a formatted message.
    pub fn displacement_overflow<S: Into<String>>(msg: S) -> Self {
        CodegenError::DisplacementOverflow(msg.into())
    }
}
