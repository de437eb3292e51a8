//! Cross-platform virtual-memory management and JIT function installation (§2 C1, C9).
//!
//! `jitforge-codegen` gets a program as far as a finalized byte buffer; this crate takes that
//! buffer, maps it write-xor-execute, and hands back a callable handle. It has no notion of
//! instructions, operands, or registers.

#![deny(missing_docs)]

pub mod config;
pub mod result;
pub mod runtime;
pub mod vmem;

pub use config::{TargetIsa, TargetIsaBuilder};
pub use result::{RuntimeError, RuntimeResult};
pub use runtime::{JitFunction, Runtime};
pub use vmem::{Block, Flags, VirtMemInfo};
