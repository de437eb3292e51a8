//! Ties `Builder`, `regalloc`, `relax`, and `CodeHolder` together into one pass: recorded IR in,
//! finalized machine code out (§4.6, §4.9).

use jitforge_entity::EntityRef;

use smallvec::SmallVec;

use crate::assembler::aarch64::Aarch64Emitter;
use crate::assembler::x86_64::X86_64Emitter;
use crate::assembler::Emitter;
use crate::builder::{Builder, IrNode};
use crate::codeholder::CodeHolder;
use crate::fixup::FixupRecord;
use crate::frame::Frame;
use crate::instdb::InstId;
use crate::isa::{aarch64, x86_64, Isa};
use crate::operand::{Label, Operand, Reg, RegClass, Width};
use crate::regalloc::{self, Allocation, Location};
use crate::relax::{self, BranchForm};
use crate::result::CodegenResult;

/// Run register allocation, spill resolution, branch relaxation, and encoding over `builder`'s
/// recorded nodes, and return the finalized machine code for the function it described.
///
/// The returned bytes include the function's prologue and epilogue; callers don't need to (and
/// shouldn't) record those as IR nodes themselves.
pub fn serialize(builder: &Builder) -> CodegenResult<Vec<u8>> {
    let isa = builder.isa();
    let mut nodes = builder.nodes().to_vec();

    let allocation = regalloc::allocate(&nodes, isa);
    regalloc::rewrite(&mut nodes, &allocation)?;

    let clobbered = clobbered_callee_saved(&nodes, isa, builder.call_conv());
    let frame = Frame::new(isa, builder.call_conv(), &allocation, clobbered);

    let nodes = resolve_spills(&nodes, &allocation, &frame, isa);

    let layout = relax::relax(&nodes, isa);

    let mut holder = CodeHolder::new();
    // Builder's labels and a CodeHolder's labels are both dense `u32` ids allocated from zero, so
    // replaying the same allocation count here reproduces the same identity without a remapping
    // table.
    for _ in 0..builder.label_count() {
        holder.new_label();
    }

    frame.emit_prologue(&mut holder)?;

    for (i, node) in nodes.iter().enumerate() {
        if let Some(label) = bind_target(node) {
            holder.bind(label)?;
            continue;
        }
        emit_node(&mut holder, isa, node, layout.forms.get(&i).copied())?;
    }

    frame.emit_epilogue(&mut holder)?;

    for (label, bytes) in builder.constants() {
        holder.add_constant(*label, bytes)?;
    }

    holder.finalize()
}

fn bind_target(node: &crate::builder::IrNode) -> Option<Label> {
    if node.inst == InstId::Nop {
        if let Some(Operand::Label(l)) = node.operands.first() {
            return Some(*l);
        }
    }
    None
}

fn emit_node(
    holder: &mut CodeHolder,
    isa: Isa,
    node: &crate::builder::IrNode,
    form: Option<BranchForm>,
) -> CodegenResult<()> {
    if isa == Isa::X86_64 && form == Some(BranchForm::Short) {
        return emit_short_branch(holder, node);
    }
    match isa {
        Isa::X86_64 => X86_64Emitter.emit(holder, node.inst, node.cond, &node.operands),
        Isa::Aarch64 => Aarch64Emitter.emit(holder, node.inst, node.cond, &node.operands),
    }
}

fn emit_short_branch(holder: &mut CodeHolder, node: &crate::builder::IrNode) -> CodegenResult<()> {
    use crate::fixup::FixupKind;
    let label = match node.operands.first() {
        Some(Operand::Label(l)) => *l,
        _ => {
            return Err(crate::result::CodegenError::operand_mismatch(
                "short branch requires a label operand",
            ))
        }
    };
    match node.inst {
        InstId::Jmp => {
            holder.emit(&[0xeb])?;
            let offset = holder.len();
            holder.emit(&[0])?;
            holder.add_fixup(FixupRecord::new(offset, FixupKind::Rel8, label))
        }
        InstId::Jcc => {
            let cond = node.cond.ok_or_else(|| {
                crate::result::CodegenError::invalid_argument("Jcc node missing a CondCode")
            })?;
            holder.emit(&[0x70 | cond.x86_bits()])?;
            let offset = holder.len();
            holder.emit(&[0])?;
            holder.add_fixup(FixupRecord::new(offset, FixupKind::Rel8, label))
        }
        _ => unreachable!("relax only marks Jmp/Jcc nodes as short-form candidates"),
    }
}

/// Scan the rewritten node list for physical, callee-saved registers used as a write destination
/// (the first operand of anything other than a pure compare/test); those are exactly the registers
/// `Frame`'s prologue/epilogue must save and restore.
fn clobbered_callee_saved(
    nodes: &[crate::builder::IrNode],
    isa: Isa,
    call_conv: crate::isa::CallConv,
) -> Vec<crate::operand::Reg> {
    use std::collections::HashSet;
    let probe = Frame::new(isa, call_conv, &regalloc::Allocation::for_stack_slots_only(0), vec![]);
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for node in nodes {
        if matches!(node.inst, InstId::Cmp | InstId::Test) {
            continue;
        }
        if let Some(Operand::Reg(r)) = node.operands.first() {
            if !r.is_virtual() && probe.is_callee_saved(*r) && seen.insert(*r) {
                out.push(*r);
            }
        }
    }
    out
}

/// Turn every operand `rewrite` left virtual (i.e. spilled to `frame`'s stack slots) into a
/// scratch physical register, reloading it from the slot before the instruction and, if the
/// operand is the instruction's write destination, storing it back after. This is the other half
/// of `regalloc::rewrite`'s split: the allocator decides *that* a value spills, `Frame` knows
/// *where* its slot lives, and this pass is what actually materializes the load/store sequence
/// around each use — without it a spilled operand would still be a dangling virtual register by
/// the time it reaches an `Emitter`.
fn resolve_spills(nodes: &[IrNode], allocation: &Allocation, frame: &Frame, isa: Isa) -> Vec<IrNode> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.inst == InstId::Nop {
            out.push(node.clone());
            continue;
        }

        let mut operands: SmallVec<[Operand; 4]> = node.operands.clone();
        let mut reloads: Vec<IrNode> = Vec::new();
        let mut store_back: Option<IrNode> = None;
        let mut gp_used = 0usize;
        let mut vec_used = 0usize;
        let is_destination_write = !matches!(node.inst, InstId::Cmp | InstId::Test);

        for (pos, op) in operands.iter_mut().enumerate() {
            let Operand::Reg(r) = *op else { continue };
            if !r.is_virtual() {
                continue;
            }
            let slot = match allocation.location(r.index() as u32) {
                Location::Reg(_) => continue, // already rewritten to a physical register
                Location::Stack(slot) => slot,
            };

            let mem = frame.spill_slot(slot, r.width());
            let scratch = match r.class() {
                RegClass::Vec => {
                    let reg = vec_scratch(isa)[vec_used % 2].with_width(r.width());
                    vec_used += 1;
                    reg
                }
                _ => {
                    let reg = gp_scratch(isa)[gp_used % 2].with_width(r.width());
                    gp_used += 1;
                    reg
                }
            };
            let mov_inst = spill_mov_inst(r.class(), r.width());

            reloads.push(IrNode {
                inst: mov_inst,
                cond: None,
                operands: SmallVec::from_vec(vec![Operand::Reg(scratch), Operand::Mem(mem)]),
            });
            if pos == 0 && is_destination_write {
                store_back = Some(IrNode {
                    inst: mov_inst,
                    cond: None,
                    operands: SmallVec::from_vec(vec![Operand::Mem(mem), Operand::Reg(scratch)]),
                });
            }
            *op = Operand::Reg(scratch);
        }

        out.extend(reloads);
        out.push(IrNode { inst: node.inst, cond: node.cond, operands });
        if let Some(store) = store_back {
            out.push(store);
        }
    }
    out
}

fn spill_mov_inst(class: RegClass, width: Width) -> InstId {
    match class {
        RegClass::Vec if width == Width::W32 => InstId::MovSs,
        RegClass::Vec => InstId::MovSd,
        _ => InstId::Mov,
    }
}

fn gp_scratch(isa: Isa) -> [Reg; 2] {
    match isa {
        Isa::X86_64 => x86_64::gp_scratch(),
        Isa::Aarch64 => aarch64::gp_scratch(),
    }
}

fn vec_scratch(isa: Isa) -> [Reg; 2] {
    match isa {
        Isa::X86_64 => x86_64::vec_scratch(),
        Isa::Aarch64 => aarch64::vec_scratch(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::CallConv;
    use crate::operand::{RegClass, Width};

    #[test]
    fn identity_function_round_trips_argument_to_return() {
        let mut b = Builder::new(Isa::X86_64, CallConv::SystemV);
        let v0 = b.new_vreg(RegClass::Gp, Width::W64);
        let arg0 = crate::isa::x86_64::RDI;
        b.emit(InstId::Mov, None, &[Operand::Reg(v0), Operand::Reg(arg0)]).unwrap();
        let ret = crate::isa::x86_64::int_return_reg();
        b.emit(InstId::Mov, None, &[Operand::Reg(ret), Operand::Reg(v0)]).unwrap();
        b.emit(InstId::Ret, None, &[]).unwrap();
        let bytes = serialize(&b).unwrap();
        assert!(bytes.last() == Some(&0xc3));
    }

    #[test]
    fn add_function_with_win64_convention() {
        let mut b = Builder::new(Isa::X86_64, CallConv::WindowsFastcall);
        let regs = crate::isa::x86_64::int_arg_regs(CallConv::WindowsFastcall);
        b.emit(InstId::Add, None, &[Operand::Reg(regs[0]), Operand::Reg(regs[1])]).unwrap();
        b.emit(
            InstId::Mov,
            None,
            &[Operand::Reg(crate::isa::x86_64::int_return_reg()), Operand::Reg(regs[0])],
        )
        .unwrap();
        b.emit(InstId::Ret, None, &[]).unwrap();
        let bytes = serialize(&b).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn label_relaxation_produces_short_branch_when_possible() {
        let mut b = Builder::new(Isa::X86_64, CallConv::SystemV);
        let done = b.new_label();
        b.emit(InstId::Jmp, None, &[Operand::Label(done)]).unwrap();
        b.emit(InstId::Nop, None, &[]).unwrap();
        b.bind_label(done);
        b.emit(InstId::Ret, None, &[]).unwrap();
        let bytes = serialize(&b).unwrap();
        assert!(bytes.contains(&0xeb));
    }

    #[test]
    fn constant_pool_entry_is_reachable_via_rip() {
        let mut b = Builder::new(Isa::X86_64, CallConv::SystemV);
        let k = b.constant(&8.0f64.to_le_bytes());
        let v0 = b.new_vreg(RegClass::Vec, Width::W64);
        b.emit(
            InstId::MovSd,
            None,
            &[Operand::Reg(v0), Operand::Mem(crate::operand::MemOperand::rip(k, 0, 8))],
        )
        .unwrap();
        b.emit(InstId::Ret, None, &[]).unwrap();
        let bytes = serialize(&b).unwrap();
        assert!(bytes.len() > 8);
    }

    #[test]
    fn aarch64_branch_fixup_resolves_forward_label() {
        let mut b = Builder::new(Isa::Aarch64, CallConv::AArch64);
        let done = b.new_label();
        b.emit(InstId::Jmp, None, &[Operand::Label(done)]).unwrap();
        b.emit(InstId::Nop, None, &[]).unwrap();
        b.bind_label(done);
        b.emit(InstId::Ret, None, &[]).unwrap();
        let bytes = serialize(&b).unwrap();
        assert_eq!(bytes.len() % 4, 0);
    }
}
