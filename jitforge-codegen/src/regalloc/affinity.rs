//! A value's preferred allocation, before the allocator has made a final decision.

use core::fmt;

use crate::isa::registers::RegisterSet;
use crate::operand::RegClass;

/// What a value would like to be allocated to.
///
/// Every virtual register starts life `Unassigned`. The allocator narrows that to `Reg` (some
/// member of a candidate set is acceptable) as it processes instructions that constrain the value
/// (an operand pinned to a specific physical register narrows the set to one member), and falls
/// back to `Stack` only when the candidate set is exhausted during coloring.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Affinity {
    /// No preference recorded yet.
    Unassigned,
    /// Must end up in one of these physical registers.
    Reg(RegisterSet),
    /// Spilled to a stack slot; never reconsidered for a register.
    Stack(RegClass),
}

impl Affinity {
    /// Narrow this affinity by intersecting it with `regs`, widening from `Unassigned` if
    /// necessary.
    pub fn restrict(self, regs: RegisterSet) -> Affinity {
        match self {
            Affinity::Unassigned => Affinity::Reg(regs),
            Affinity::Reg(existing) => Affinity::Reg(existing.intersect(regs)),
            Affinity::Stack(_) => self,
        }
    }

    /// Is this value definitely going to a register (possibly one of several candidates)?
    pub fn is_reg(self) -> bool {
        matches!(self, Affinity::Reg(_))
    }

    /// Is this value definitely spilled?
    pub fn is_stack(self) -> bool {
        matches!(self, Affinity::Stack(_))
    }
}

impl fmt::Debug for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Affinity::Unassigned => write!(f, "unassigned"),
            Affinity::Reg(set) => write!(f, "reg({:?})", set),
            Affinity::Stack(class) => write!(f, "stack({:?})", class),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_narrows_candidate_set() {
        let all = RegisterSet::from_indices(RegClass::Gp, &[0, 1, 2, 3]);
        let narrower = RegisterSet::from_indices(RegClass::Gp, &[1, 2]);
        let a = Affinity::Reg(all).restrict(narrower);
        match a {
            Affinity::Reg(set) => {
                assert!(set.contains(1));
                assert!(!set.contains(0));
            }
            _ => panic!("expected Reg affinity"),
        }
    }

    #[test]
    fn stack_affinity_is_sticky() {
        let a = Affinity::Stack(RegClass::Gp);
        let all = RegisterSet::from_indices(RegClass::Gp, &[0, 1]);
        assert!(a.restrict(all).is_stack());
    }
}
