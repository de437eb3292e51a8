//! The linear-scan register allocator (§4.7).
//!
//! Three passes: compute each virtual register's live interval from its first and last appearance
//! in the node list, sweep intervals left to right handing out physical registers from the target's
//! allocatable set and spilling to stack slots on exhaustion, then rewrite every node's operands in
//! place. There is no coalescing pass; `Ror`'s `cl`-operand and other ABI-pinned values are handled
//! by `restrict`ing their `Affinity` to a single-register set before the sweep, so the sweep itself
//! never needs special cases.

pub mod affinity;

use std::collections::HashMap;

use crate::builder::IrNode;
use crate::isa::registers::RegisterSet;
use crate::isa::{aarch64, x86_64, Isa};
use crate::operand::{Operand, Reg, RegClass, Width};
use crate::result::CodegenResult;

/// Where a virtual register ended up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Location {
    /// Assigned a physical register.
    Reg(Reg),
    /// Spilled to a stack slot, identified by its index (slot `0` is nearest the frame's saved
    /// registers; `Frame` turns the index into a concrete `rbp`/`x29`-relative offset).
    Stack(u32),
}

/// The live range of one virtual register: the index of the node that first mentions it through
/// the index of the node that last mentions it, inclusive.
#[derive(Debug, Clone, Copy)]
struct LiveInterval {
    vreg_id: u32,
    class: RegClass,
    width: Width,
    start: u32,
    end: u32,
}

/// The allocator's final verdict for every virtual register that appeared in a node list.
pub struct Allocation {
    locations: HashMap<u32, Location>,
    /// Number of stack slots spilled values occupy; `Frame` sizes its frame to fit this many.
    pub stack_slots: u32,
}

impl Allocation {
    /// Where virtual register `id` ended up.
    pub fn location(&self, id: u32) -> Location {
        self.locations[&id]
    }

    /// An allocation with no register assignments, reserving `stack_slots` spill slots. Used by
    /// `Frame`'s tests, which only care about frame-size arithmetic and not a real sweep.
    #[doc(hidden)]
    pub fn for_stack_slots_only(stack_slots: u32) -> Self {
        Allocation {
            locations: HashMap::new(),
            stack_slots,
        }
    }
}

fn compute_intervals(nodes: &[IrNode]) -> Vec<LiveInterval> {
    let mut ranges: HashMap<u32, (RegClass, Width, u32, u32)> = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        for op in &node.operands {
            if let Operand::Reg(r) = op {
                if r.is_virtual() {
                    let entry = ranges
                        .entry(r.index() as u32)
                        .or_insert((r.class(), r.width(), idx as u32, idx as u32));
                    entry.2 = entry.2.min(idx as u32);
                    entry.3 = entry.3.max(idx as u32);
                }
            }
        }
    }
    let mut intervals: Vec<LiveInterval> = ranges
        .into_iter()
        .map(|(vreg_id, (class, width, start, end))| LiveInterval {
            vreg_id,
            class,
            width,
            start,
            end,
        })
        .collect();
    intervals.sort_by_key(|i| i.start);
    intervals
}

fn allocatable_set(isa: Isa, class: RegClass) -> RegisterSet {
    match (isa, class) {
        (Isa::X86_64, RegClass::Vec) => x86_64::allocatable_vec(),
        (Isa::X86_64, _) => x86_64::allocatable_gp(),
        (Isa::Aarch64, RegClass::Vec) => aarch64::allocatable_vec(),
        (Isa::Aarch64, _) => aarch64::allocatable_gp(),
    }
}

/// Run linear-scan allocation over `nodes`' virtual registers for `isa`.
pub fn allocate(nodes: &[IrNode], isa: Isa) -> Allocation {
    let intervals = compute_intervals(nodes);

    let mut free: HashMap<RegClass, RegisterSet> = HashMap::new();
    let mut active: Vec<LiveInterval> = Vec::new();
    let mut locations = HashMap::new();
    let mut next_slot = 0u32;

    for interval in intervals {
        active.retain(|a| {
            if a.end < interval.start {
                let pool = free.entry(a.class).or_insert_with(|| allocatable_set(isa, a.class));
                if let Location::Reg(r) = locations[&a.vreg_id] {
                    pool.insert(r.index());
                }
                false
            } else {
                true
            }
        });

        let pool = free
            .entry(interval.class)
            .or_insert_with(|| allocatable_set(isa, interval.class));

        match pool.first() {
            Some(idx) => {
                pool.remove(idx);
                let reg = Reg::physical(interval.class, idx, interval.width);
                locations.insert(interval.vreg_id, Location::Reg(reg));
                active.push(interval);
            }
            None => {
                // Spill the active interval with the furthest end (including possibly the current
                // one), freeing its register for the shorter-lived value when that's a better bet.
                if let Some((pos, furthest)) = active
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.class == interval.class)
                    .max_by_key(|(_, a)| a.end)
                {
                    if furthest.end > interval.end {
                        let victim = active.remove(pos);
                        if let Location::Reg(reg) = locations[&victim.vreg_id] {
                            locations.insert(interval.vreg_id, Location::Reg(reg));
                            locations.insert(victim.vreg_id, Location::Stack(next_slot));
                            next_slot += 1;
                            active.push(interval);
                            continue;
                        }
                    }
                }
                locations.insert(interval.vreg_id, Location::Stack(next_slot));
                next_slot += 1;
            }
        }
    }

    Allocation {
        locations,
        stack_slots: next_slot,
    }
}

/// Rewrite every virtual-register operand in `nodes` to the physical register (or a placeholder
/// that `serialize::resolve_spills` turns into real loads/stores) `allocation` assigned it.
///
/// Stack-resident values are left as `Operand::Reg` with their virtual identity intact; the
/// spill-resolution pass in `serialize.rs` is responsible for inserting the load/store sequence
/// around each use and replacing the operand with a scratch physical register at that point. This
/// split keeps the allocator ignorant of frame layout, matching the separation of concerns between
/// `regalloc`, `frame`, and `serialize`.
pub fn rewrite(nodes: &mut [IrNode], allocation: &Allocation) -> CodegenResult<()> {
    for node in nodes.iter_mut() {
        for op in node.operands.iter_mut() {
            if let Operand::Reg(r) = op {
                if r.is_virtual() {
                    match allocation.location(r.index() as u32) {
                        Location::Reg(phys) => *op = Operand::Reg(phys),
                        Location::Stack(_) => {
                            // left for `Frame` to resolve
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condcode::CondCode;
    use crate::instdb::InstId;
    use smallvec::SmallVec;

    fn node(inst: InstId, operands: Vec<Operand>) -> IrNode {
        IrNode {
            inst,
            cond: None,
            operands: SmallVec::from_vec(operands),
        }
    }

    #[test]
    fn two_short_lived_vregs_fit_in_registers() {
        let v0 = Reg::virtual_reg(0, RegClass::Gp, Width::W64);
        let v1 = Reg::virtual_reg(1, RegClass::Gp, Width::W64);
        let nodes = vec![
            node(InstId::Mov, vec![Operand::Reg(v0), Operand::Imm(1)]),
            node(InstId::Mov, vec![Operand::Reg(v1), Operand::Imm(2)]),
            node(InstId::Add, vec![Operand::Reg(v0), Operand::Reg(v1)]),
        ];
        let alloc = allocate(&nodes, Isa::X86_64);
        assert!(matches!(alloc.location(0), Location::Reg(_)));
        assert!(matches!(alloc.location(1), Location::Reg(_)));
        assert_eq!(alloc.stack_slots, 0);
    }

    #[test]
    fn exhausting_gp_registers_forces_a_spill() {
        let mut nodes = Vec::new();
        let mut vregs = Vec::new();
        // x86-64 has 12 allocatable GPs (two more are reserved as spill scratch registers); ask
        // for more than that and force every one live at once by referencing them all at the end.
        for i in 0..15u32 {
            let v = Reg::virtual_reg(i, RegClass::Gp, Width::W64);
            vregs.push(v);
            nodes.push(node(InstId::Mov, vec![Operand::Reg(v), Operand::Imm(i as i64)]));
        }
        let mut keepalive: Vec<Operand> = vregs.iter().map(|v| Operand::Reg(*v)).collect();
        keepalive.truncate(2);
        nodes.push(node(InstId::Add, keepalive));
        let alloc = allocate(&nodes, Isa::X86_64);
        assert!(alloc.stack_slots >= 1);
    }

    #[test]
    fn rewrite_replaces_register_allocated_vregs() {
        let v0 = Reg::virtual_reg(0, RegClass::Gp, Width::W64);
        let mut nodes = vec![node(InstId::Mov, vec![Operand::Reg(v0), Operand::Imm(1)])];
        let alloc = allocate(&nodes, Isa::X86_64);
        rewrite(&mut nodes, &alloc).unwrap();
        match nodes[0].operands[0] {
            Operand::Reg(r) => assert!(!r.is_virtual()),
            _ => panic!("expected a register operand"),
        }
    }
}
