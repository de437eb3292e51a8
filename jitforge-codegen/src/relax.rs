//! Branch relaxation: converge on final instruction encodings when a short branch form turns out
//! not to reach its target (§4.6, §4.9).
//!
//! x86-64 offers both an 8-bit and a 32-bit displacement form for `JMP`/`Jcc`; picking the short
//! form whenever possible keeps code dense, but whether it reaches depends on the final size of
//! everything between the branch and its target, which itself depends on which other branches
//! nearby chose the short or long form. This module iterates fixed-point style until no branch
//! needs to grow, the same strategy the teacher's own relaxation pass uses for EBB branch
//! instructions.

use std::collections::HashMap;

use log::debug;

use crate::builder::IrNode;
use crate::condcode::CondCode;
use crate::instdb::InstId;
use crate::isa::Isa;
use crate::operand::{Label, Operand};

/// The chosen encoding width for one branch node, decided by `relax`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BranchForm {
    /// The architecture's short/8-bit-ish displacement form.
    Short,
    /// The architecture's near/32-bit (or full-width) displacement form.
    Near,
}

/// Per-node decisions produced by relaxation, indexed by position in the node list.
pub struct RelaxedLayout {
    /// `forms[i]` is set only for nodes that are branches; other indices are absent.
    pub forms: HashMap<usize, BranchForm>,
    /// The final byte offset of each node once sizes have converged.
    pub offsets: Vec<u32>,
}

fn node_size(node: &IrNode, form: Option<BranchForm>, isa: Isa) -> u32 {
    match isa {
        Isa::Aarch64 => 4, // every AArch64 instruction is one fixed-size word
        Isa::X86_64 => match (node.inst, form) {
            (InstId::Jmp, Some(BranchForm::Short)) => 2,
            (InstId::Jmp, _) => 5,
            (InstId::Jcc, Some(BranchForm::Short)) => 2,
            (InstId::Jcc, _) => 6,
            (InstId::Nop, _) if matches!(node.operands.first(), Some(Operand::Label(_))) => 0, // a bound label, not a real nop
            (InstId::Nop, _) => 1,
            (InstId::Ret, _) => 1,
            (InstId::Push, _) | (InstId::Pop, _) => 1,
            (InstId::Call, _) => 5,
            // A conservative upper bound for everything else: REX + 2-byte opcode + ModRM + SIB +
            // disp32 + imm32. Real encoding is narrower in the common case; relaxation only needs
            // an upper bound to guarantee convergence, and `CodeHolder::finalize` emits the true
            // size regardless.
            _ => 11,
        },
    }
}

fn label_bind_target(node: &IrNode) -> Option<Label> {
    if node.inst == InstId::Nop {
        if let Some(Operand::Label(l)) = node.operands.first() {
            return Some(*l);
        }
    }
    None
}

fn branch_target(node: &IrNode) -> Option<Label> {
    match node.inst {
        InstId::Jmp | InstId::Jcc | InstId::Call => match node.operands.first() {
            Some(Operand::Label(l)) => Some(*l),
            _ => None,
        },
        _ => None,
    }
}

fn short_range_ok(isa: Isa, node: &IrNode) -> bool {
    isa == Isa::X86_64 && matches!(node.inst, InstId::Jmp | InstId::Jcc)
}

/// Run relaxation to a fixed point over `nodes`, returning the chosen branch forms and final
/// offsets. `CondCode` is carried along purely for readability in `debug!` output; it doesn't
/// affect sizing (`Jcc`'s near/short forms are the same size regardless of which condition).
pub fn relax(nodes: &[IrNode], isa: Isa) -> RelaxedLayout {
    let mut forms: HashMap<usize, BranchForm> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if short_range_ok(isa, node) {
            forms.insert(i, BranchForm::Short);
        }
    }

    loop {
        let mut offsets = Vec::with_capacity(nodes.len());
        let mut cursor = 0u32;
        let mut label_offsets: HashMap<Label, u32> = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            offsets.push(cursor);
            if let Some(label) = label_bind_target(node) {
                label_offsets.insert(label, cursor);
            }
            cursor += node_size(node, forms.get(&i).copied(), isa);
        }

        let mut grew = false;
        for (i, node) in nodes.iter().enumerate() {
            let Some(target) = branch_target(node) else { continue };
            let Some(&form) = forms.get(&i) else { continue };
            if form != BranchForm::Short {
                continue;
            }
            let Some(&target_off) = label_offsets.get(&target) else {
                // Forward reference to a label not yet seen in this pass; stay conservative.
                continue;
            };
            let next_insn = offsets[i] + node_size(node, Some(BranchForm::Short), isa);
            let disp = target_off as i64 - next_insn as i64;
            if !(-128..=127).contains(&disp) {
                debug!("relax: growing branch at node {} (disp {} out of short range)", i, disp);
                forms.insert(i, BranchForm::Near);
                grew = true;
            }
        }

        if !grew {
            let mut offsets = Vec::with_capacity(nodes.len());
            let mut cursor = 0u32;
            for (i, node) in nodes.iter().enumerate() {
                offsets.push(cursor);
                cursor += node_size(node, forms.get(&i).copied(), isa);
            }
            return RelaxedLayout { forms, offsets };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condcode::CondCode as Cc;
    use smallvec::SmallVec;

    fn nop_label(label: Label) -> IrNode {
        IrNode {
            inst: InstId::Nop,
            cond: None,
            operands: {
                let mut v = SmallVec::new();
                v.push(Operand::Label(label));
                v
            },
        }
    }

    fn jmp(label: Label) -> IrNode {
        IrNode {
            inst: InstId::Jmp,
            cond: None,
            operands: {
                let mut v = SmallVec::new();
                v.push(Operand::Label(label));
                v
            },
        }
    }

    fn jcc(label: Label, cond: Cc) -> IrNode {
        IrNode {
            inst: InstId::Jcc,
            cond: Some(cond),
            operands: {
                let mut v = SmallVec::new();
                v.push(Operand::Label(label));
                v
            },
        }
    }

    #[test]
    fn short_jump_to_nearby_label_stays_short() {
        use jitforge_entity::EntityRef;
        let target = Label::new(0);
        let nodes = vec![jmp(target), IrNode {
            inst: InstId::Nop,
            cond: None,
            operands: SmallVec::new(),
        }, nop_label(target)];
        let layout = relax(&nodes, Isa::X86_64);
        assert_eq!(layout.forms[&0], BranchForm::Short);
    }

    #[test]
    fn jump_across_many_instructions_grows_to_near() {
        use jitforge_entity::EntityRef;
        let target = Label::new(0);
        let mut nodes = vec![jcc(target, Cc::E)];
        for _ in 0..100 {
            nodes.push(IrNode {
                inst: InstId::Nop,
                cond: None,
                operands: SmallVec::new(),
            });
        }
        nodes.push(nop_label(target));
        let layout = relax(&nodes, Isa::X86_64);
        assert_eq!(layout.forms[&0], BranchForm::Near);
    }

    #[test]
    fn aarch64_nodes_are_always_fixed_width() {
        use jitforge_entity::EntityRef;
        let target = Label::new(0);
        let nodes = vec![jmp(target), nop_label(target)];
        let layout = relax(&nodes, Isa::Aarch64);
        assert_eq!(layout.offsets[1] - layout.offsets[0], 4);
    }
}
