//! The operand model, instruction database, x86-64/AArch64 assemblers, the deferred-IR `Builder`,
//! the linear-scan register allocator, and function-frame emission (§2 C2-C8).
//!
//! This crate has no notion of executable memory; it only gets as far as a finalized byte buffer.
//! `jitforge-runtime` takes that buffer and installs it.

#![deny(missing_docs)]

pub mod assembler;
pub mod builder;
pub mod codeholder;
pub mod condcode;
pub mod fixup;
pub mod frame;
pub mod instdb;
pub mod isa;
pub mod operand;
pub mod regalloc;
pub mod relax;
pub mod result;
pub mod serialize;

pub use assembler::{aarch64::Aarch64Emitter, x86_64::X86_64Emitter, Emitter};
pub use builder::{Builder, IrNode};
pub use codeholder::CodeHolder;
pub use condcode::CondCode;
pub use fixup::{FixupKind, FixupRecord};
pub use frame::{ArgLocation, Frame};
pub use instdb::InstId;
pub use isa::{CallConv, Isa};
pub use operand::{Label, MemOperand, Operand, Reg, RegClass, Width};
pub use regalloc::{Allocation, Location};
pub use result::{CodegenError, CodegenResult};
pub use serialize::serialize;
