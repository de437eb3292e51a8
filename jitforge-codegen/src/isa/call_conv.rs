//! Calling conventions (§4.8): argument/return register assignment and callee-saved sets.

use core::fmt;
use core::str::FromStr;

/// A calling convention understood by `Frame` when emitting a function's prologue, epilogue, and
/// argument shuffling.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CallConv {
    /// The x86-64 System V ABI (Linux, macOS, BSD): integer args in rdi/rsi/rdx/rcx/r8/r9, vector
    /// args in xmm0-7, return in rax:rdx / xmm0:xmm1.
    SystemV,
    /// The x86-64 Microsoft x64 convention: integer args in rcx/rdx/r8/r9, a 32-byte shadow space
    /// reserved by the caller, return in rax / xmm0.
    WindowsFastcall,
    /// The AArch64 procedure call standard: integer args in x0-x7, vector args in v0-v7, return in
    /// x0:x1 / v0:v1.
    AArch64,
}

impl CallConv {
    /// The platform-native convention for a given target triple's (architecture, operating system).
    pub fn for_target(arch: target_lexicon::Architecture, os: target_lexicon::OperatingSystem) -> Option<Self> {
        use target_lexicon::{Architecture, OperatingSystem};
        match (arch, os) {
            (Architecture::X86_64, OperatingSystem::Windows) => Some(CallConv::WindowsFastcall),
            (Architecture::X86_64, _) => Some(CallConv::SystemV),
            (Architecture::Aarch64(_), _) => Some(CallConv::AArch64),
            _ => None,
        }
    }

    /// The number of integer argument registers before arguments spill to the stack.
    pub fn int_arg_regs(self) -> u32 {
        match self {
            CallConv::SystemV => 6,
            CallConv::WindowsFastcall => 4,
            CallConv::AArch64 => 8,
        }
    }

    /// The number of vector/float argument registers before arguments spill to the stack.
    pub fn vec_arg_regs(self) -> u32 {
        match self {
            CallConv::SystemV => 8,
            CallConv::WindowsFastcall => 4,
            CallConv::AArch64 => 8,
        }
    }

    /// Bytes of shadow space the caller must reserve below the return address before the first
    /// stack argument, regardless of whether the callee is variadic.
    pub fn shadow_space(self) -> u32 {
        match self {
            CallConv::WindowsFastcall => 32,
            CallConv::SystemV | CallConv::AArch64 => 0,
        }
    }

    /// Required stack alignment, in bytes, at a `call` instruction.
    pub fn stack_align(self) -> u32 {
        16
    }
}

impl fmt::Display for CallConv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            CallConv::SystemV => "system_v",
            CallConv::WindowsFastcall => "windows_fastcall",
            CallConv::AArch64 => "aarch64",
        })
    }
}

impl FromStr for CallConv {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system_v" => Ok(CallConv::SystemV),
            "windows_fastcall" => Ok(CallConv::WindowsFastcall),
            "aarch64" => Ok(CallConv::AArch64),
            _ => Err("unknown calling convention"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_fastcall_reserves_shadow_space() {
        assert_eq!(CallConv::WindowsFastcall.shadow_space(), 32);
        assert_eq!(CallConv::SystemV.shadow_space(), 0);
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        for cc in &[CallConv::SystemV, CallConv::WindowsFastcall, CallConv::AArch64] {
            let s = cc.to_string();
            assert_eq!(CallConv::from_str(&s).unwrap(), *cc);
        }
    }
}
