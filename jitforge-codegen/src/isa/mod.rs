//! Per-architecture register tables, calling conventions, and encoders (§4.1, §4.5, §4.8).
//!
//! `jitforge-codegen` supports exactly two targets. There is no plugin mechanism for adding a third;
//! an `Isa` is chosen once, at `Builder` construction, and everything downstream (register
//! allocation, frame layout, encoding) dispatches on it.

pub mod aarch64;
pub mod call_conv;
pub mod registers;
pub mod x86_64;

use core::fmt;

pub use call_conv::CallConv;
pub use registers::RegisterSet;

/// The two architectures this crate can emit code for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Isa {
    /// x86-64, encoded per the Intel/AMD manuals' variable-length instruction format.
    X86_64,
    /// AArch64 (ARMv8-A), encoded as fixed 32-bit instruction words.
    Aarch64,
}

impl Isa {
    /// Detect the host architecture this process is running on, if it is one of the two supported
    /// ISAs.
    pub fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Isa::X86_64)
        } else if cfg!(target_arch = "aarch64") {
            Some(Isa::Aarch64)
        } else {
            None
        }
    }

    /// The platform-native calling convention for this architecture on the host operating system.
    pub fn default_call_conv(self) -> CallConv {
        match self {
            Isa::X86_64 if cfg!(target_os = "windows") => CallConv::WindowsFastcall,
            Isa::X86_64 => CallConv::SystemV,
            Isa::Aarch64 => CallConv::AArch64,
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Isa::X86_64 => "x86_64",
            Isa::Aarch64 => "aarch64",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_call_conv_matches_architecture() {
        assert_eq!(Isa::X86_64.default_call_conv() == CallConv::SystemV, !cfg!(target_os = "windows"));
        assert_eq!(Isa::Aarch64.default_call_conv(), CallConv::AArch64);
    }
}
