//! Function-frame emission (§4.8): prologue, epilogue, and argument/spill-slot layout.
//!
//! `Frame` owns the ABI-facing half of code generation: it knows which registers a calling
//! convention requires saved, where incoming arguments live, and how spilled virtual registers
//! (from `regalloc::Allocation`) map onto stack offsets. It doesn't know about `InstId` at all;
//! it emits its prologue/epilogue through the same `Emitter` the rest of a function's body uses, so
//! a `Frame` for one architecture is just as in-band as any other code the `Builder` recorded.

use crate::codeholder::CodeHolder;
use crate::condcode::CondCode;
use crate::instdb::InstId;
use crate::isa::{aarch64, x86_64, CallConv, Isa};
use crate::operand::{MemOperand, Operand, Reg, RegClass, Width};
use crate::regalloc::Allocation;
use crate::result::CodegenResult;

use crate::assembler::aarch64::Aarch64Emitter;
use crate::assembler::x86_64::X86_64Emitter;
use crate::assembler::Emitter;

/// Per-architecture, per-convention frame layout for one function.
pub struct Frame {
    isa: Isa,
    call_conv: CallConv,
    /// Callee-saved registers this function's body actually clobbers and must therefore save.
    clobbered_callee_saved: Vec<Reg>,
    /// Bytes of local stack space reserved for spill slots (8 bytes per slot, 16-byte aligned).
    spill_bytes: u32,
}

impl Frame {
    /// Build a frame description from the allocator's verdict. `clobbered_callee_saved` should be
    /// exactly the callee-saved registers that appear as a destination anywhere in the function's
    /// rewritten node list.
    pub fn new(isa: Isa, call_conv: CallConv, allocation: &Allocation, clobbered_callee_saved: Vec<Reg>) -> Self {
        let spill_bytes = align_up(allocation.stack_slots * 8, 16);
        Frame {
            isa,
            call_conv,
            clobbered_callee_saved,
            spill_bytes,
        }
    }

    /// Total bytes this frame reserves below the saved frame pointer: clobbered callee-saved
    /// registers plus spill slots.
    pub fn frame_size(&self) -> u32 {
        align_up(self.clobbered_callee_saved.len() as u32 * 8 + self.spill_bytes, 16)
    }

    /// The stack-relative `MemOperand` for spill slot `index` (as produced by
    /// `regalloc::Location::Stack`), sized for `width`.
    pub fn spill_slot(&self, index: u32, width: Width) -> MemOperand {
        let base = self.frame_base_reg();
        // Slots live below the saved callee-saved block, growing toward the stack pointer.
        let offset = -((self.clobbered_callee_saved.len() as i32 * 8) + (index as i32 + 1) * 8);
        MemOperand::base_disp(base, offset, width.bytes())
    }

    fn frame_base_reg(&self) -> Reg {
        match self.isa {
            Isa::X86_64 => x86_64::RBP,
            Isa::Aarch64 => aarch64::FP,
        }
    }

    /// Emit the standard prologue: push/save the frame pointer, establish a new frame, save
    /// clobbered callee-saved registers, and reserve spill space.
    pub fn emit_prologue(&self, holder: &mut CodeHolder) -> CodegenResult<()> {
        match self.isa {
            Isa::X86_64 => self.emit_prologue_x86_64(holder),
            Isa::Aarch64 => self.emit_prologue_aarch64(holder),
        }
    }

    /// Emit the matching epilogue: restore callee-saved registers, tear down the frame, and
    /// return.
    pub fn emit_epilogue(&self, holder: &mut CodeHolder) -> CodegenResult<()> {
        match self.isa {
            Isa::X86_64 => self.emit_epilogue_x86_64(holder),
            Isa::Aarch64 => self.emit_epilogue_aarch64(holder),
        }
    }

    fn emit_prologue_x86_64(&self, holder: &mut CodeHolder) -> CodegenResult<()> {
        let emitter = X86_64Emitter;
        emitter.emit(holder, InstId::Push, None, &[Operand::Reg(x86_64::RBP)])?;
        emitter.emit(
            holder,
            InstId::Mov,
            None,
            &[Operand::Reg(x86_64::RBP), Operand::Reg(x86_64::RSP)],
        )?;
        let total = self.frame_size();
        if total > 0 {
            emitter.emit(
                holder,
                InstId::Sub,
                None,
                &[Operand::Reg(x86_64::RSP), Operand::Imm(total as i64)],
            )?;
        }
        for (i, reg) in self.clobbered_callee_saved.iter().enumerate() {
            let mem = MemOperand::base_disp(x86_64::RBP, -8 * (i as i32 + 1), 8);
            emitter.emit(holder, InstId::Mov, None, &[Operand::Mem(mem), Operand::Reg(*reg)])?;
        }
        Ok(())
    }

    fn emit_epilogue_x86_64(&self, holder: &mut CodeHolder) -> CodegenResult<()> {
        let emitter = X86_64Emitter;
        for (i, reg) in self.clobbered_callee_saved.iter().enumerate() {
            let mem = MemOperand::base_disp(x86_64::RBP, -8 * (i as i32 + 1), 8);
            emitter.emit(holder, InstId::Mov, None, &[Operand::Reg(*reg), Operand::Mem(mem)])?;
        }
        emitter.emit(
            holder,
            InstId::Mov,
            None,
            &[Operand::Reg(x86_64::RSP), Operand::Reg(x86_64::RBP)],
        )?;
        emitter.emit(holder, InstId::Pop, None, &[Operand::Reg(x86_64::RBP)])?;
        emitter.emit(holder, InstId::Ret, None, &[])
    }

    fn emit_prologue_aarch64(&self, holder: &mut CodeHolder) -> CodegenResult<()> {
        // A full AAPCS64 prologue pushes {fp, lr} via STP pre-indexed; that addressing mode isn't
        // part of the shared InstId vocabulary (it has no x86-64 analogue), so it's emitted as raw
        // bytes here rather than through `Emitter`. `0xa9bf7bfd` is `stp x29, x30, [sp, #-16]!`.
        holder.emit(&0xa9bf7bfdu32.to_le_bytes())?;
        // `mov x29, sp` (alias of `add x29, sp, #0`).
        holder.emit(&0x910003fdu32.to_le_bytes())?;
        let total = self.frame_size();
        if total > 0 {
            let emitter = Aarch64Emitter;
            emitter.emit(
                holder,
                InstId::Sub,
                None,
                &[Operand::Reg(aarch64::SP), Operand::Imm(total as i64)],
            )?;
        }
        Ok(())
    }

    fn emit_epilogue_aarch64(&self, holder: &mut CodeHolder) -> CodegenResult<()> {
        let total = self.frame_size();
        if total > 0 {
            let emitter = Aarch64Emitter;
            emitter.emit(
                holder,
                InstId::Add,
                None,
                &[Operand::Reg(aarch64::SP), Operand::Imm(total as i64)],
            )?;
        }
        // `ldp x29, x30, [sp], #16`.
        holder.emit(&0xa8c17bfdu32.to_le_bytes())?;
        // `ret`.
        holder.emit(&0xd65f03c0u32.to_le_bytes())
    }

    /// A register's argument `MemOperand`/`Reg` location is always a plain register for the first
    /// `int_arg_regs` integer arguments under this frame's convention; beyond that, arguments come
    /// from the stack at a convention-specific offset above the saved frame pointer. This returns
    /// the incoming location for integer argument `index` (0-based).
    pub fn int_arg_location(&self, index: u32) -> ArgLocation {
        match self.isa {
            Isa::X86_64 => {
                let regs = x86_64::int_arg_regs(self.call_conv);
                if (index as usize) < regs.len() {
                    ArgLocation::Reg(regs[index as usize])
                } else {
                    let stack_index = index as usize - regs.len();
                    let offset = 16 + self.call_conv.shadow_space() as i32 + stack_index as i32 * 8;
                    ArgLocation::Stack(MemOperand::base_disp(x86_64::RBP, offset, 8))
                }
            }
            Isa::Aarch64 => {
                let regs = aarch64::int_arg_regs();
                if (index as usize) < regs.len() {
                    ArgLocation::Reg(regs[index as usize])
                } else {
                    let stack_index = index as usize - regs.len();
                    let offset = 16 + stack_index as i32 * 8;
                    ArgLocation::Stack(MemOperand::base_disp(aarch64::FP, offset, 8))
                }
            }
        }
    }

    /// The register or memory location a function must place its return value in.
    pub fn int_return_location(&self) -> Reg {
        match self.isa {
            Isa::X86_64 => x86_64::int_return_reg(),
            Isa::Aarch64 => aarch64::int_return_reg(),
        }
    }

    /// Is `reg` one this convention requires the callee to preserve?
    pub fn is_callee_saved(&self, reg: Reg) -> bool {
        if reg.class() != RegClass::Gp {
            return false;
        }
        match self.isa {
            Isa::X86_64 => x86_64::callee_saved_gp(self.call_conv).contains(reg.index()),
            Isa::Aarch64 => aarch64::callee_saved_gp().contains(reg.index()),
        }
    }
}

/// Where an incoming argument lives.
#[derive(Debug, Copy, Clone)]
pub enum ArgLocation {
    /// A register.
    Reg(Reg),
    /// A stack slot, relative to the frame pointer.
    Stack(MemOperand),
}

fn align_up(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regalloc::Allocation;

    fn empty_allocation(stack_slots: u32) -> Allocation {
        Allocation::for_stack_slots_only(stack_slots)
    }

    #[test]
    fn frame_size_rounds_up_to_sixteen() {
        let alloc = empty_allocation(1);
        let frame = Frame::new(Isa::X86_64, CallConv::SystemV, &alloc, vec![x86_64::RBX]);
        assert_eq!(frame.frame_size() % 16, 0);
        assert!(frame.frame_size() >= 16);
    }

    #[test]
    fn windows_fastcall_first_stack_arg_clears_shadow_space() {
        let alloc = empty_allocation(0);
        let frame = Frame::new(Isa::X86_64, CallConv::WindowsFastcall, &alloc, vec![]);
        match frame.int_arg_location(4) {
            ArgLocation::Stack(mem) => assert_eq!(mem.disp(), 16 + 32),
            _ => panic!("expected a stack argument"),
        }
    }

    #[test]
    fn system_v_first_six_int_args_are_registers() {
        let alloc = empty_allocation(0);
        let frame = Frame::new(Isa::X86_64, CallConv::SystemV, &alloc, vec![]);
        for i in 0..6 {
            assert!(matches!(frame.int_arg_location(i), ArgLocation::Reg(_)));
        }
        assert!(matches!(frame.int_arg_location(6), ArgLocation::Stack(_)));
    }
}
