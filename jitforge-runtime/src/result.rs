//! Errors produced while mapping, protecting, or installing executable memory.

use failure_derive::Fail;

/// A fallible result produced by this crate.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Everything that can go wrong between a finalized byte buffer and a callable function pointer.
#[derive(Fail, Debug)]
pub enum RuntimeError {
    /// A nonsensical size or offset was passed to a constructor.
    #[fail(display = "invalid argument: {}", _0)]
    InvalidArgument(String),

    /// The OS refused to map a new region of virtual memory.
    #[fail(display = "failed to map virtual memory: {}", _0)]
    FailedToMapVirtMem(String),

    /// The OS refused a protection transition on an already-mapped region.
    #[fail(display = "protection failed: {}", _0)]
    ProtectionFailed(String),

    /// `add`/`add_bytes` was called with an empty byte buffer.
    #[fail(display = "no code generated")]
    NoCodeGenerated,

    /// The embedding configured this `Runtime` without executable-memory privileges.
    #[fail(display = "feature not enabled: {}", _0)]
    FeatureNotEnabled(String),

    /// A handle was used after its epoch was invalidated (the runtime released its block, or
    /// `dispose` already ran for it).
    #[fail(display = "invalid state: {}", _0)]
    InvalidState(String),

    /// An underlying `jitforge-codegen` call failed (e.g. `finalize()` on an unresolved label).
    #[fail(display = "codegen error: {}", _0)]
    Codegen(#[fail(cause)] jitforge_codegen::CodegenError),
}

impl RuntimeError {
    /// Build an `InvalidArgument` with a formatted message.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        RuntimeError::InvalidArgument(msg.into())
    }

    /// Build a `FailedToMapVirtMem` with a formatted message.
    pub fn failed_to_map<S: Into<String>>(msg: S) -> Self {
        RuntimeError::FailedToMapVirtMem(msg.into())
    }

    /// Build a `ProtectionFailed` with a formatted message.
    pub fn protection_failed<S: Into<String>>(msg: S) -> Self {
        RuntimeError::ProtectionFailed(msg.into())
    }

    /// Build a `FeatureNotEnabled` with a formatted message.
    pub fn feature_not_enabled<S: Into<String>>(msg: S) -> Self {
        RuntimeError::FeatureNotEnabled(msg.into())
    }

    /// Build an `InvalidState` with a formatted message.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        RuntimeError::InvalidState(msg.into())
    }
}

impl From<jitforge_codegen::CodegenError> for RuntimeError {
    fn from(e: jitforge_codegen::CodegenError) -> Self {
        RuntimeError::Codegen(e)
    }
}
