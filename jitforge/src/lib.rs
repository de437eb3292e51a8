//! A small runtime code generator for x86-64 and AArch64.
//!
//! This crate ties `jitforge-codegen` (operands, IR, assemblers, register allocation, frames) and
//! `jitforge-runtime` (virtual memory, function installation) together behind the signature/
//! type-id layer and the host-CPU probe the ancestor keeps at this same seam (`cranelift-native`'s
//! `builder()` function, which this workspace's `cpuinfo` module plays the same role as).

#![deny(missing_docs)]

pub mod cpuinfo;
pub mod signature;

pub use cpuinfo::{host as host_cpu_info, CpuInfo};
pub use signature::{FuncSignature, FuncSignatureBuilder, TypeId};

pub use jitforge_codegen::{
    serialize, Aarch64Emitter, ArgLocation, Builder, CallConv, CodeHolder, CodegenError,
    CodegenResult, CondCode, Emitter, FixupKind, FixupRecord, Frame, InstId, IrNode, Isa, Label,
    MemOperand, Operand, Reg, RegClass, Width, X86_64Emitter,
};
pub use jitforge_runtime::{
    JitFunction, Runtime, RuntimeError, RuntimeResult, TargetIsa, TargetIsaBuilder,
};

/// Serialize `builder`'s recorded IR and install the result into `runtime` in one call.
///
/// A thin convenience over `serialize` + `Runtime::add_bytes`; callers installing more than one
/// function, or who want to distinguish a compilation failure from an installation failure, should
/// call those two steps directly instead.
pub fn compile_and_install(builder: &Builder, runtime: &Runtime) -> RuntimeResult<JitFunction> {
    let bytes = serialize(builder)?;
    runtime.add_bytes(&bytes)
}
