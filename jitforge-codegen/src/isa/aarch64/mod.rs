//! AArch64 register tables and allocation/ABI constants.

pub mod encode;

use crate::isa::registers::RegisterSet;
use crate::operand::{Reg, RegClass, Width};

/// General-purpose register `x0`..`x30`, or the zero/stack-pointer encodings at index 31 (callers
/// pick `Width` to get the `w`-register view).
pub const fn x(n: u16, width: Width) -> Reg {
    Reg::physical(RegClass::Gp, n, width)
}

/// `x29`, the frame pointer.
pub const FP: Reg = Reg::physical(RegClass::Gp, 29, Width::W64);
/// `x30`, the link register.
pub const LR: Reg = Reg::physical(RegClass::Gp, 30, Width::W64);
/// `sp`, the stack pointer (architecturally register 31 in load/store and arithmetic encodings).
pub const SP: Reg = Reg::physical(RegClass::Gp, 31, Width::W64);
/// The zero register, `xzr`/`wzr` (also encoded as 31, disambiguated by instruction class, not
/// modeled further here since this crate never allocates it).
pub const ZR: Reg = Reg::physical(RegClass::Pc, 31, Width::W64);

/// Vector register `v0`..`v31`.
pub const fn v(n: u16, width: Width) -> Reg {
    Reg::physical(RegClass::Vec, n, width)
}

/// GP registers the allocator may hand out: `x0`-`x28` (excludes `fp`, `lr`, `sp`), minus `x16`/
/// `x17` which `gp_scratch` reserves for the spill reload/store pass.
pub fn allocatable_gp() -> RegisterSet {
    RegisterSet::from_indices(RegClass::Gp, &(0..29).filter(|i| *i != 16 && *i != 17).collect::<Vec<_>>())
}

/// Vector registers the allocator may hand out: `v0`-`v29`, reserving `v30`/`v31` as `vec_scratch`
/// for the spill reload/store pass.
pub fn allocatable_vec() -> RegisterSet {
    RegisterSet::from_indices(RegClass::Vec, &(0..30).collect::<Vec<_>>())
}

/// GP registers reserved for the spill reload/store pass in `serialize` (the AAPCS64 intra-call
/// scratch registers `x16`/`x17`, never live across a call and never handed out by the allocator).
pub fn gp_scratch() -> [Reg; 2] {
    [x(16, Width::W64), x(17, Width::W64)]
}

/// Vector registers reserved for the spill reload/store pass.
pub fn vec_scratch() -> [Reg; 2] {
    [v(30, Width::W64), v(31, Width::W64)]
}

/// Callee-saved GP registers under the AAPCS64: `x19`-`x28`, plus `fp`/`lr` which every frame
/// preserves via the standard prologue regardless of whether the allocator touches them.
pub fn callee_saved_gp() -> RegisterSet {
    RegisterSet::from_indices(RegClass::Gp, &(19..29).collect::<Vec<_>>())
}

/// Integer argument registers in calling order: `x0`-`x7`.
pub fn int_arg_regs() -> [Reg; 8] {
    [
        x(0, Width::W64),
        x(1, Width::W64),
        x(2, Width::W64),
        x(3, Width::W64),
        x(4, Width::W64),
        x(5, Width::W64),
        x(6, Width::W64),
        x(7, Width::W64),
    ]
}

/// The integer return-value register, `x0`.
pub fn int_return_reg() -> Reg {
    x(0, Width::W64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocatable_gp_excludes_fp_lr_sp() {
        let set = allocatable_gp();
        assert!(!set.contains(29));
        assert!(!set.contains(30));
        assert!(!set.contains(31));
        assert_eq!(set.len(), 27);
    }

    #[test]
    fn allocatable_gp_excludes_scratch_registers() {
        let set = allocatable_gp();
        for reg in gp_scratch() {
            assert!(!set.contains(reg.index()));
        }
    }

    #[test]
    fn allocatable_vec_excludes_scratch_registers() {
        let set = allocatable_vec();
        for reg in vec_scratch() {
            assert!(!set.contains(reg.index()));
        }
    }

    #[test]
    fn int_arg_regs_start_at_x0() {
        let args = int_arg_regs();
        assert_eq!(args[0].index(), 0);
        assert_eq!(args.len(), 8);
    }
}
