//! Configuration surface (§4.10): the architecture, calling convention, and safety policy a
//! `Runtime` installs code under, mirroring the ancestor's `settings::Flags` object built through a
//! small builder rather than free-standing globals.

use jitforge_codegen::{CallConv, Isa};

use crate::result::{RuntimeError, RuntimeResult};

/// Everything a `Runtime` needs to know about its target before it can install code: which
/// architecture, which calling convention, and which safety policies apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetIsa {
    isa: Isa,
    call_conv: CallConv,
    enforce_wx: bool,
    allow_executable_memory: bool,
    verifier_enabled: bool,
}

impl TargetIsa {
    /// Start building a `TargetIsa` targeting `isa`'s platform-default calling convention, with
    /// W^X enforcement, executable memory, and the verifier all enabled.
    pub fn builder(isa: Isa) -> TargetIsaBuilder {
        TargetIsaBuilder {
            isa,
            call_conv: isa.default_call_conv(),
            enforce_wx: true,
            allow_executable_memory: true,
            verifier_enabled: true,
        }
    }

    /// A `TargetIsa` for the host architecture and its default calling convention. Fails if the
    /// host isn't one of the two supported architectures.
    pub fn host() -> RuntimeResult<TargetIsa> {
        let isa = Isa::host()
            .ok_or_else(|| RuntimeError::invalid_argument("host architecture is not supported"))?;
        Ok(TargetIsa::builder(isa).finish())
    }

    /// The target architecture.
    pub fn isa(&self) -> Isa {
        self.isa
    }

    /// The calling convention code installed under this target is expected to honor.
    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    /// Whether the `Runtime` enforces write-xor-execute (the default, and the only policy this
    /// crate's `Runtime` tests against). When disabled, installed blocks are left read-write-
    /// execute instead of being downgraded to read-execute after the code is written — an explicit,
    /// rare opt-out for hosts that patch code in place after installation.
    pub fn enforce_wx(&self) -> bool {
        self.enforce_wx
    }

    /// Whether a `Runtime` built from this target is permitted to map executable memory at all. A
    /// hardened embedder that only wants the assembler for disassembly cross-checks sets this to
    /// `false`; `Runtime::add`/`add_bytes`/`add_cached` then fail with `FeatureNotEnabled`.
    pub fn allow_executable_memory(&self) -> bool {
        self.allow_executable_memory
    }

    /// Whether instruction-database validation runs on every emitted node. Reserved for a future
    /// IR verification pass; `jitforge-codegen`'s own operand-signature checks in `instdb::validate`
    /// always run regardless of this flag, since skipping them would let malformed IR reach the
    /// encoder.
    pub fn verifier_enabled(&self) -> bool {
        self.verifier_enabled
    }
}

/// Builds a [`TargetIsa`].
pub struct TargetIsaBuilder {
    isa: Isa,
    call_conv: CallConv,
    enforce_wx: bool,
    allow_executable_memory: bool,
    verifier_enabled: bool,
}

impl TargetIsaBuilder {
    /// Override the calling convention (defaults to `isa`'s platform default).
    pub fn call_conv(mut self, call_conv: CallConv) -> Self {
        self.call_conv = call_conv;
        self
    }

    /// Override W^X enforcement.
    pub fn enforce_wx(mut self, enforce_wx: bool) -> Self {
        self.enforce_wx = enforce_wx;
        self
    }

    /// Override whether executable memory may be mapped at all.
    pub fn allow_executable_memory(mut self, allow: bool) -> Self {
        self.allow_executable_memory = allow;
        self
    }

    /// Override the verifier flag.
    pub fn verifier_enabled(mut self, enabled: bool) -> Self {
        self.verifier_enabled = enabled;
        self
    }

    /// Finish building.
    pub fn finish(self) -> TargetIsa {
        TargetIsa {
            isa: self.isa,
            call_conv: self.call_conv,
            enforce_wx: self.enforce_wx,
            allow_executable_memory: self.allow_executable_memory,
            verifier_enabled: self.verifier_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_are_permissive() {
        let target = TargetIsa::builder(Isa::X86_64).finish();
        assert!(target.enforce_wx());
        assert!(target.allow_executable_memory());
        assert_eq!(target.call_conv(), CallConv::SystemV);
    }

    #[test]
    fn builder_overrides_apply() {
        let target = TargetIsa::builder(Isa::X86_64)
            .allow_executable_memory(false)
            .enforce_wx(false)
            .finish();
        assert!(!target.allow_executable_memory());
        assert!(!target.enforce_wx());
    }
}
