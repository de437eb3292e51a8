//! `Builder`: a deferred instruction-node list over virtual registers (§4.6).
//!
//! Unlike `CodeHolder`, which owns a byte buffer and wants real operands up front, a `Builder`
//! collects a list of `(InstId, CondCode?, operands)` nodes that may still reference virtual
//! registers. `serialize` (in the `serialize` module) runs the register allocator over that list,
//! rewrites every virtual register to a physical one, and replays the rewritten nodes through the
//! target `Isa`'s `Emitter` into a fresh `CodeHolder`.

use smallvec::SmallVec;

use crate::condcode::CondCode;
use crate::instdb::{self, InstId};
use crate::isa::{CallConv, Isa};
use crate::operand::{Label, Operand, Reg, RegClass, Width};
use crate::result::CodegenResult;

/// One recorded instruction, prior to register allocation.
#[derive(Debug, Clone)]
pub struct IrNode {
    /// The canonical instruction identity.
    pub inst: InstId,
    /// The condition, for condition-coded instructions.
    pub cond: Option<CondCode>,
    /// Operands, which may be virtual registers.
    pub operands: SmallVec<[Operand; 4]>,
}

/// A sequence of `IrNode`s plus the label and constant-pool bookkeeping needed to resolve them,
/// targeting one architecture and calling convention.
pub struct Builder {
    isa: Isa,
    call_conv: CallConv,
    nodes: Vec<IrNode>,
    next_label: u32,
    next_vreg: u32,
    constants: Vec<(Label, Vec<u8>)>,
}

impl Builder {
    /// Start recording a function body for `isa` under `call_conv`.
    pub fn new(isa: Isa, call_conv: CallConv) -> Self {
        Builder {
            isa,
            call_conv,
            nodes: Vec::new(),
            next_label: 0,
            next_vreg: 0,
            constants: Vec::new(),
        }
    }

    /// The target architecture.
    pub fn isa(&self) -> Isa {
        self.isa
    }

    /// The calling convention this function will be emitted under.
    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    /// Allocate a fresh virtual register. Virtual registers are scoped to one `Builder`; passing
    /// one recorded by a different `Builder` to this one is a logic error the allocator cannot
    /// detect.
    pub fn new_vreg(&mut self, class: RegClass, width: Width) -> Reg {
        let id = self.next_vreg;
        self.next_vreg += 1;
        Reg::virtual_reg(id, class, width)
    }

    /// Allocate a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        use jitforge_entity::EntityRef;
        let label = Label::new(self.next_label as usize);
        self.next_label += 1;
        label
    }

    /// Record that `label` marks the instruction about to be recorded next.
    pub fn bind_label(&mut self, label: Label) {
        self.nodes.push(IrNode {
            inst: InstId::Nop,
            cond: None,
            operands: {
                let mut v = SmallVec::new();
                v.push(Operand::Label(label));
                v
            },
        });
    }

    /// Append constant-pool bytes, returning a label bound to their eventual address. Referencing
    /// this label from a memory operand via `MemOperand::rip` produces position-independent access
    /// to the constant once the function is serialized.
    pub fn constant(&mut self, bytes: &[u8]) -> Label {
        let label = self.new_label();
        self.constants.push((label, bytes.to_vec()));
        label
    }

    /// Record one instruction. Operand shapes are validated immediately so a malformed IR node is
    /// caught at the call site that produced it, not deep inside `serialize`.
    pub fn emit(
        &mut self,
        inst: InstId,
        cond: Option<CondCode>,
        operands: &[Operand],
    ) -> CodegenResult<()> {
        instdb::validate(inst, operands)?;
        self.nodes.push(IrNode {
            inst,
            cond,
            operands: SmallVec::from_slice(operands),
        });
        Ok(())
    }

    /// The recorded nodes, in emission order.
    pub fn nodes(&self) -> &[IrNode] {
        &self.nodes
    }

    /// The recorded constant-pool entries.
    pub fn constants(&self) -> &[(Label, Vec<u8>)] {
        &self.constants
    }

    /// The number of virtual registers allocated so far.
    pub fn vreg_count(&self) -> u32 {
        self.next_vreg
    }

    /// The number of labels allocated so far. `serialize` replays this count against a fresh
    /// `CodeHolder` so the two label tables share the same dense `u32` identity without a
    /// remapping table.
    pub fn label_count(&self) -> u32 {
        self.next_label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_validates_eagerly() {
        let mut b = Builder::new(Isa::X86_64, CallConv::SystemV);
        let v0 = b.new_vreg(RegClass::Gp, Width::W64);
        assert!(b.emit(InstId::Ret, None, &[Operand::Reg(v0)]).is_err());
        assert!(b.emit(InstId::Ret, None, &[]).is_ok());
    }

    #[test]
    fn vregs_are_distinct_within_one_builder() {
        let mut b = Builder::new(Isa::X86_64, CallConv::SystemV);
        let v0 = b.new_vreg(RegClass::Gp, Width::W64);
        let v1 = b.new_vreg(RegClass::Gp, Width::W64);
        assert_ne!(v0, v1);
    }

    #[test]
    fn constants_are_recorded_with_fresh_labels() {
        let mut b = Builder::new(Isa::X86_64, CallConv::SystemV);
        let k0 = b.constant(&[1, 2, 3, 4]);
        let k1 = b.constant(&[5, 6, 7, 8]);
        assert_ne!(k0, k1);
        assert_eq!(b.constants().len(), 2);
    }
}
