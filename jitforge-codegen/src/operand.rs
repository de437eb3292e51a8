//! The operand model (§4.2): registers, immediates, memory addressing, and labels.
//!
//! An `Operand` is a tagged variant; encoders pattern-match on it rather than dispatching through a
//! class hierarchy (see DESIGN.md's "static dispatch" note). Once constructed, an `Operand` is
//! immutable.

use core::fmt;
use jitforge_entity::EntityRef;

/// An opaque reference into a `CodeHolder`'s label table.
///
/// Labels are handed out by `CodeHolder::new_label`/`Builder::new_label` and never reused; the
/// numeric value has no meaning outside the holder that created it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);
jitforge_entity::entity_impl!(Label, "L");

/// The register bank a `Reg` belongs to.
///
/// Each bank is a disjoint partition of the physical register file; the allocator never assigns a
/// value requesting one class to a register from another.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// General-purpose integer registers (`rax`..`r15`, `x0`..`x30`).
    Gp,
    /// Vector/SIMD registers (`xmm`/`ymm`/`zmm`, `v0`..`v31`).
    Vec,
    /// Mask registers (x86 `k0`..`k7`; AArch64 has none and never requests this class).
    Mask,
    /// Segment registers (x86 only).
    Segment,
    /// Control registers (x86 `cr0`..`cr8`).
    Control,
    /// Debug registers (x86 `dr0`..`dr7`).
    Debug,
    /// The program counter (AArch64 `pc`; modeled but never allocatable).
    Pc,
}

/// The access width of a register or memory operand, in bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    /// 8 bits.
    W8,
    /// 16 bits.
    W16,
    /// 32 bits.
    W32,
    /// 64 bits.
    W64,
    /// 128 bits.
    W128,
    /// 256 bits.
    W256,
    /// 512 bits.
    W512,
}

impl Width {
    /// The width in bits.
    pub fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
            Width::W128 => 128,
            Width::W256 => 256,
            Width::W512 => 512,
        }
    }

    /// The width in bytes.
    pub fn bytes(self) -> u32 {
        self.bits() / 8
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// A register operand: either a physical register identified by its architectural encoding, or a
/// virtual register identified by a monotonically increasing id within the `Builder` that created
/// it.
///
/// Equality of two physical registers is structural on `(class, index, width)`. Equality of two
/// virtual registers only depends on their id (the class/width that accompany a given id are fixed
/// at creation, so comparing the whole struct is equivalent, but it is the id that is authoritative
/// — see `VirtReg` in `regalloc`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Reg {
    class: RegClass,
    /// Architectural encoding when physical; allocator-assigned id when virtual.
    index: u16,
    width: Width,
    /// Marks `AH`/`BH`/`CH`/`DH`: these alias bits 8..16 of the low nibble-indexed GP registers and
    /// are incompatible with any REX prefix.
    high_byte: bool,
    is_virtual: bool,
}

impl Reg {
    /// Construct a physical register.
    pub const fn physical(class: RegClass, index: u16, width: Width) -> Self {
        Reg {
            class,
            index,
            width,
            high_byte: false,
            is_virtual: false,
        }
    }

    /// Construct one of the legacy high-byte registers (`AH`, `BH`, `CH`, `DH`). `index` is the
    /// encoding of the *low* byte register it aliases (0..=3).
    pub const fn physical_high_byte(index: u16) -> Self {
        Reg {
            class: RegClass::Gp,
            index,
            width: Width::W8,
            high_byte: true,
            is_virtual: false,
        }
    }

    /// Construct a virtual register for use inside a `Builder`. `id` must be unique within that
    /// builder.
    pub const fn virtual_reg(id: u32, class: RegClass, width: Width) -> Self {
        Reg {
            class,
            index: id as u16,
            width,
            high_byte: false,
            is_virtual: true,
        }
    }

    /// The register class.
    pub fn class(self) -> RegClass {
        self.class
    }

    /// The architectural encoding (physical) or allocator id (virtual).
    pub fn index(self) -> u16 {
        self.index
    }

    /// The access width.
    pub fn width(self) -> Width {
        self.width
    }

    /// Is this one of `AH`/`BH`/`CH`/`DH`?
    pub fn is_high_byte(self) -> bool {
        self.high_byte
    }

    /// Is this a virtual register awaiting allocation?
    pub fn is_virtual(self) -> bool {
        self.is_virtual
    }

    /// Reinterpret this register at a different width, keeping its identity.
    ///
    /// For a physical GP register this is the familiar "32-bit view of a 64-bit register" relation
    /// (`eax` is `rax` truncated): the architectural index is unchanged, only `width` differs.
    pub fn with_width(self, width: Width) -> Self {
        Reg {
            width,
            high_byte: self.high_byte && width == Width::W8,
            ..self
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_virtual {
            write!(f, "%v{}.{}", self.index, self.width)
        } else {
            write!(f, "%p{}:{:?}.{}", self.index, self.class, self.width)
        }
    }
}

/// A memory operand: `[disp]`, `[base+disp]`, `[index*scale+disp]`, or
/// `[base+index*scale+disp]`.
///
/// `size` is the *access* width in bytes, independent of the width of `base`/`index` (which are
/// always address-width registers).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MemOperand {
    base: Option<Reg>,
    index: Option<Reg>,
    scale: u8,
    disp: i32,
    size: u32,
    segment: Option<Reg>,
    /// True for x86-64 `[rip + disp32]` addressing; `base`/`index` are unused in that case.
    rip_relative: bool,
    /// For a `rip`-relative operand, the label the displacement resolves against (typically a
    /// constant-pool entry bound later by `CodeHolder::add_constant`).
    rip_label: Option<Label>,
}

impl MemOperand {
    /// `[disp]`, an absolute address.
    pub fn abs(disp: i32, size: u32) -> Self {
        MemOperand {
            base: None,
            index: None,
            scale: 1,
            disp,
            size,
            segment: None,
            rip_relative: false,
            rip_label: None,
        }
    }

    /// `[base+disp]`.
    pub fn base_disp(base: Reg, disp: i32, size: u32) -> Self {
        MemOperand {
            base: Some(base),
            index: None,
            scale: 1,
            disp,
            size,
            segment: None,
            rip_relative: false,
            rip_label: None,
        }
    }

    /// `[base+index*scale+disp]`. `scale` must be 1, 2, 4, or 8.
    pub fn base_index_scale(base: Reg, index: Reg, scale: u8, disp: i32, size: u32) -> Self {
        debug_assert!(matches!(scale, 1 | 2 | 4 | 8), "illegal SIB scale {}", scale);
        MemOperand {
            base: Some(base),
            index: Some(index),
            scale,
            disp,
            size,
            segment: None,
            rip_relative: false,
            rip_label: None,
        }
    }

    /// `[rip+disp]`, resolved against `label` during encoding (typically a constant-pool entry).
    pub fn rip(label: Label, disp: i32, size: u32) -> Self {
        MemOperand {
            base: None,
            index: None,
            scale: 1,
            disp,
            size,
            segment: None,
            rip_relative: true,
            rip_label: Some(label),
        }
    }

    /// Attach an explicit segment override (x86-64 only).
    pub fn with_segment(mut self, segment: Reg) -> Self {
        self.segment = Some(segment);
        self
    }

    /// The base register, if any.
    pub fn base(&self) -> Option<Reg> {
        self.base
    }

    /// The index register, if any.
    pub fn index(&self) -> Option<Reg> {
        self.index
    }

    /// The SIB scale factor.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// The displacement.
    pub fn disp(&self) -> i32 {
        self.disp
    }

    /// The access width in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The segment override, if any.
    pub fn segment(&self) -> Option<Reg> {
        self.segment
    }

    /// Is this `[rip+disp]`?
    pub fn is_rip_relative(&self) -> bool {
        self.rip_relative
    }

    /// The label a `[rip+disp]` operand resolves against, if this is one.
    pub fn rip_label(&self) -> Option<Label> {
        self.rip_label
    }
}

/// A single operand to an instruction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Operand {
    /// A register.
    Reg(Reg),
    /// A signed 64-bit immediate; the encoder narrows it to the smallest legal form.
    Imm(i64),
    /// A memory reference.
    Mem(MemOperand),
    /// A label, used by control-flow and constant-pool-referencing instructions.
    Label(Label),
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl From<MemOperand> for Operand {
    fn from(m: MemOperand) -> Self {
        Operand::Mem(m)
    }
}

impl From<Label> for Operand {
    fn from(l: Label) -> Self {
        Operand::Label(l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_register_equality_is_structural() {
        let a = Reg::physical(RegClass::Gp, 0, Width::W64);
        let b = Reg::physical(RegClass::Gp, 0, Width::W64);
        let c = Reg::physical(RegClass::Gp, 0, Width::W32);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn width_change_preserves_architectural_index() {
        let rax = Reg::physical(RegClass::Gp, 0, Width::W64);
        let eax = rax.with_width(Width::W32);
        assert_eq!(eax.index(), rax.index());
        assert_eq!(eax.width(), Width::W32);
    }

    #[test]
    fn virtual_registers_compare_by_id() {
        let v1 = Reg::virtual_reg(7, RegClass::Gp, Width::W64);
        let v2 = Reg::virtual_reg(7, RegClass::Gp, Width::W64);
        assert_eq!(v1, v2);
        assert!(v1.is_virtual());
    }
}
