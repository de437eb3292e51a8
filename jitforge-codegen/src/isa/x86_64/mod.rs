//! x86-64 register tables and allocation/ABI constants.

pub mod encode;

use crate::isa::call_conv::CallConv;
use crate::isa::registers::RegisterSet;
use crate::operand::{Reg, RegClass, Width};

/// `rax`.
pub const RAX: Reg = Reg::physical(RegClass::Gp, 0, Width::W64);
/// `rcx`.
pub const RCX: Reg = Reg::physical(RegClass::Gp, 1, Width::W64);
/// `rdx`.
pub const RDX: Reg = Reg::physical(RegClass::Gp, 2, Width::W64);
/// `rbx`.
pub const RBX: Reg = Reg::physical(RegClass::Gp, 3, Width::W64);
/// `rsp`, the stack pointer.
pub const RSP: Reg = Reg::physical(RegClass::Gp, 4, Width::W64);
/// `rbp`, the frame pointer.
pub const RBP: Reg = Reg::physical(RegClass::Gp, 5, Width::W64);
/// `rsi`.
pub const RSI: Reg = Reg::physical(RegClass::Gp, 6, Width::W64);
/// `rdi`.
pub const RDI: Reg = Reg::physical(RegClass::Gp, 7, Width::W64);
/// `r8`.
pub const R8: Reg = Reg::physical(RegClass::Gp, 8, Width::W64);
/// `r9`.
pub const R9: Reg = Reg::physical(RegClass::Gp, 9, Width::W64);
/// `r10`.
pub const R10: Reg = Reg::physical(RegClass::Gp, 10, Width::W64);
/// `r11`.
pub const R11: Reg = Reg::physical(RegClass::Gp, 11, Width::W64);
/// `r12`.
pub const R12: Reg = Reg::physical(RegClass::Gp, 12, Width::W64);
/// `r13`.
pub const R13: Reg = Reg::physical(RegClass::Gp, 13, Width::W64);
/// `r14`.
pub const R14: Reg = Reg::physical(RegClass::Gp, 14, Width::W64);
/// `r15`.
pub const R15: Reg = Reg::physical(RegClass::Gp, 15, Width::W64);

/// `xmm`/`ymm`/`zmm` register `n` (0..=15), sized per the width requested.
pub const fn xmm(n: u16, width: Width) -> Reg {
    Reg::physical(RegClass::Vec, n, width)
}

/// GP registers the allocator may hand out for general-purpose use: all 16 integer registers minus
/// `rsp` (always the stack pointer), `rbp` (reserved as the frame pointer per §4.8's chosen frame
/// layout), and the two scratch registers `gp_scratch` carves out for the spill reload/store pass.
pub fn allocatable_gp() -> RegisterSet {
    RegisterSet::from_indices(RegClass::Gp, &[0, 1, 2, 3, 6, 7, 8, 9, 12, 13, 14, 15])
}

/// Vector registers the allocator may hand out: `xmm0`-`xmm13`, reserving `xmm14`/`xmm15` as
/// `vec_scratch` for the spill reload/store pass.
pub fn allocatable_vec() -> RegisterSet {
    RegisterSet::from_indices(RegClass::Vec, &(0..14).collect::<Vec<_>>())
}

/// GP registers reserved for the spill reload/store pass in `serialize`: never handed out by the
/// allocator, so materializing a spilled operand into one of these can't clobber a live value.
pub fn gp_scratch() -> [Reg; 2] {
    [R10, R11]
}

/// Vector registers reserved for the spill reload/store pass.
pub fn vec_scratch() -> [Reg; 2] {
    [xmm(14, Width::W128), xmm(15, Width::W128)]
}

/// Registers a callee must preserve across a call, for the given convention.
pub fn callee_saved_gp(cc: CallConv) -> RegisterSet {
    match cc {
        CallConv::SystemV => RegisterSet::from_indices(RegClass::Gp, &[3, 12, 13, 14, 15]), // rbx, r12-r15
        CallConv::WindowsFastcall => {
            RegisterSet::from_indices(RegClass::Gp, &[3, 6, 7, 12, 13, 14, 15]) // rbx, rsi, rdi, r12-r15
        }
        CallConv::AArch64 => unreachable!("aarch64 call conv queried on x86_64 table"),
    }
}

/// Integer argument registers in calling order, for the given convention.
pub fn int_arg_regs(cc: CallConv) -> &'static [Reg] {
    match cc {
        CallConv::SystemV => &[RDI, RSI, RDX, RCX, R8, R9],
        CallConv::WindowsFastcall => &[RCX, RDX, R8, R9],
        CallConv::AArch64 => unreachable!("aarch64 call conv queried on x86_64 table"),
    }
}

/// The integer return-value register.
pub fn int_return_reg() -> Reg {
    RAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocatable_gp_excludes_stack_and_frame_pointer() {
        let set = allocatable_gp();
        assert!(!set.contains(RSP.index()));
        assert!(!set.contains(RBP.index()));
        assert!(set.contains(RAX.index()));
        assert_eq!(set.len(), 12);
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
    fn system_v_arg_order_is_rdi_first() {
        let args = int_arg_regs(CallConv::SystemV);
        assert_eq!(args[0], RDI);
        assert_eq!(args.len(), 6);
    }

    #[test]
    fn windows_fastcall_has_four_int_arg_regs() {
        assert_eq!(int_arg_regs(CallConv::WindowsFastcall).len(), 4);
    }
}
