//! Fixups: deferred patches applied once a label's final address is known.
//!
//! Every branch, call, or rip-relative reference to a not-yet-bound label is recorded as a
//! `FixupRecord` at emit time; `CodeHolder::bind` and `CodeHolder::finalize` walk the list and patch
//! bytes in place once the target address is resolved (§4.3, §4.9).

use crate::operand::Label;

/// The shape of a pending patch: which bytes it occupies and how to compute their value from a
/// target offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FixupKind {
    /// An 8-bit PC-relative displacement (x86-64 short `Jcc`/`JMP`), relative to the byte following
    /// the fixup site.
    Rel8,
    /// A 32-bit PC-relative displacement (x86-64 near `Jcc`/`JMP`/`CALL`), relative to the byte
    /// following the fixup site.
    Rel32,
    /// A 32-bit absolute address, written little-endian.
    Abs32,
    /// A 64-bit absolute address, written little-endian.
    Abs64,
    /// A 32-bit `rip`-relative displacement used by x86-64 memory operands (constant-pool loads),
    /// relative to the byte following the fixup site.
    RipRel32,
    /// AArch64 unconditional branch immediate (`B`/`BL`), a 26-bit field holding a word-aligned
    /// offset.
    Aarch64Branch26,
    /// AArch64 conditional branch immediate (`B.cond`), a 19-bit field holding a word-aligned
    /// offset.
    Aarch64CondBranch19,
    /// AArch64 compare-and-branch immediate (`CBZ`/`CBNZ`), a 19-bit field holding a word-aligned
    /// offset.
    Aarch64CompareBranch19,
    /// The `ADRP`+`ADD` pair used to materialize a page-relative address; `add_offset` is the byte
    /// offset (from this fixup's site) of the paired `ADD` instruction whose 12-bit immediate also
    /// needs patching.
    Aarch64AdrpAdd {
        /// Offset in bytes from the `ADRP` instruction to its paired `ADD`.
        add_offset: u32,
    },
}

impl FixupKind {
    /// The number of bytes at the fixup site that this kind patches (for the fixed-width
    /// instruction-word kinds, the whole 4-byte instruction is rewritten; for the x86 kinds only the
    /// displacement/address field is rewritten).
    pub fn patch_len(self) -> u32 {
        match self {
            FixupKind::Rel8 => 1,
            FixupKind::Rel32 | FixupKind::RipRel32 => 4,
            FixupKind::Abs32 => 4,
            FixupKind::Abs64 => 8,
            FixupKind::Aarch64Branch26
            | FixupKind::Aarch64CondBranch19
            | FixupKind::Aarch64CompareBranch19 => 4,
            FixupKind::Aarch64AdrpAdd { .. } => 4,
        }
    }
}

/// A single deferred patch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FixupRecord {
    /// Byte offset within the code buffer where the patch begins.
    pub offset: u32,
    /// What shape of patch to apply.
    pub kind: FixupKind,
    /// The label whose resolved address (or offset, for PC-relative kinds) drives the patch.
    pub label: Label,
    /// A constant added to the computed displacement/address before it is written, used for
    /// constant-pool entries placed at a label plus some in-pool byte offset.
    pub addend: i64,
}

impl FixupRecord {
    /// Construct a new fixup record.
    pub fn new(offset: u32, kind: FixupKind, label: Label) -> Self {
        FixupRecord {
            offset,
            kind,
            label,
            addend: 0,
        }
    }

    /// Attach a nonzero addend (e.g. `label + 8` for the second slot of a two-entry constant pool
    /// group).
    pub fn with_addend(mut self, addend: i64) -> Self {
        self.addend = addend;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitforge_entity::EntityRef;

    #[test]
    fn patch_len_matches_kind() {
        assert_eq!(FixupKind::Rel8.patch_len(), 1);
        assert_eq!(FixupKind::Rel32.patch_len(), 4);
        assert_eq!(FixupKind::Abs64.patch_len(), 8);
        assert_eq!(
            FixupKind::Aarch64AdrpAdd { add_offset: 4 }.patch_len(),
            4
        );
    }

    #[test]
    fn addend_defaults_to_zero() {
        let label = Label::new(0);
        let rec = FixupRecord::new(16, FixupKind::Rel32, label);
        assert_eq!(rec.addend, 0);
        let rec = rec.with_addend(8);
        assert_eq!(rec.addend, 8);
    }
}
