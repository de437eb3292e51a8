//! `CpuInfo::host()`: one of the three truly global items (§5, §9), lazily probed once and
//! immutable thereafter.
//!
//! On x86-64 this reads the feature bits CPUID actually reports, via the same `raw-cpuid`
//! dependency the ancestor's `cranelift-native` crate uses for the equivalent probe. AArch64 has no
//! analogous runtime-discoverable feature bit this core cares about, so its `CpuInfo` is a fixed,
//! trivially-true value.

use std::sync::OnceLock;

use jitforge_codegen::Isa;

/// A snapshot of the host CPU's feature bits relevant to the instruction subset this crate emits.
#[derive(Debug, Clone, Copy)]
pub struct CpuInfo {
    isa: Isa,
    has_sse2: bool,
    has_avx: bool,
    has_avx2: bool,
}

impl CpuInfo {
    /// The detected architecture.
    pub fn isa(&self) -> Isa {
        self.isa
    }

    /// `true` if the host supports SSE2 (the baseline this crate assumes for any `MovSs`/`MovSd`
    /// emission on x86-64; always `true` in practice since SSE2 is part of the x86-64 baseline, but
    /// checked rather than assumed).
    pub fn has_sse2(&self) -> bool {
        self.has_sse2
    }

    /// `true` if the host supports AVX. Unused by the current instruction set (`jitforge-codegen`
    /// only emits legacy-SSE-encoded float ops today) but probed now so a future VEX-encoded path
    /// doesn't need a second global.
    pub fn has_avx(&self) -> bool {
        self.has_avx
    }

    /// `true` if the host supports AVX2.
    pub fn has_avx2(&self) -> bool {
        self.has_avx2
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    fn probe() -> CpuInfo {
        let cpuid = raw_cpuid::CpuId::new();
        let features = cpuid.get_feature_info();
        let extended = cpuid.get_extended_feature_info();
        CpuInfo {
            isa: Isa::X86_64,
            has_sse2: features.as_ref().map_or(false, |f| f.has_sse2()),
            has_avx: features.as_ref().map_or(false, |f| f.has_avx()),
            has_avx2: extended.as_ref().map_or(false, |f| f.has_avx2()),
        }
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    fn probe() -> CpuInfo {
        CpuInfo { isa: Isa::host().unwrap_or(Isa::Aarch64), has_sse2: false, has_avx: false, has_avx2: false }
    }
}

static HOST_CPU_INFO: OnceLock<CpuInfo> = OnceLock::new();

/// The host CPU's feature bits, probed once per process.
pub fn host() -> CpuInfo {
    *HOST_CPU_INFO.get_or_init(CpuInfo::probe)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_stable_across_calls() {
        let a = host();
        let b = host();
        assert_eq!(a.isa(), b.isa());
        assert_eq!(a.has_sse2(), b.has_sse2());
    }
}
