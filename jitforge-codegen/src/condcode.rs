//! Condition codes, orthogonal to the instruction database.
//!
//! `Jcc`, `SETcc`, and `CMOVcc` are all parameterized by one of these; the instruction database
//! stores exactly one canonical instruction id for each of those families and pairs it with a
//! `CondCode` argument rather than declaring sixteen near-identical opcodes.

use core::fmt;

/// A condition code, shared between the Jcc/SETcc/CMOVcc families on x86-64 and the `b.cond`/
/// conditional-select families on AArch64.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CondCode {
    /// Overflow.
    O = 0x0,
    /// No overflow.
    No = 0x1,
    /// Below / carry.
    B = 0x2,
    /// Above or equal / not carry.
    Ae = 0x3,
    /// Equal / zero.
    E = 0x4,
    /// Not equal / not zero.
    Ne = 0x5,
    /// Below or equal.
    Be = 0x6,
    /// Above.
    A = 0x7,
    /// Sign.
    S = 0x8,
    /// No sign.
    Ns = 0x9,
    /// Parity.
    P = 0xa,
    /// No parity.
    Np = 0xb,
    /// Less.
    L = 0xc,
    /// Greater or equal.
    Ge = 0xd,
    /// Less or equal.
    Le = 0xe,
    /// Greater.
    G = 0xf,
}

impl CondCode {
    /// Look up a condition code (or one of its mnemonic aliases) by name.
    ///
    /// `jae`, `jnb`, and `jnc` are all spellings of the same canonical condition; this is where
    /// that collapse happens.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        use CondCode::*;
        Some(match name {
            "o" => O,
            "no" => No,
            "b" | "nae" | "c" => B,
            "ae" | "nb" | "nc" => Ae,
            "e" | "z" => E,
            "ne" | "nz" => Ne,
            "be" | "na" => Be,
            "a" | "nbe" => A,
            "s" => S,
            "ns" => Ns,
            "p" | "pe" => P,
            "np" | "po" => Np,
            "l" | "nge" => L,
            "ge" | "nl" => Ge,
            "le" | "ng" => Le,
            "g" | "nle" => G,
            _ => return None,
        })
    }

    /// The logical negation of this condition (used to invert a branch when relaxing it).
    pub fn inverse(self) -> Self {
        use CondCode::*;
        match self {
            O => No,
            No => O,
            B => Ae,
            Ae => B,
            E => Ne,
            Ne => E,
            Be => A,
            A => Be,
            S => Ns,
            Ns => S,
            P => Np,
            Np => P,
            L => Ge,
            Ge => L,
            Le => G,
            G => Le,
        }
    }

    /// The 4-bit condition field used by x86-64 Jcc/SETcc/CMOVcc opcodes.
    pub fn x86_bits(self) -> u8 {
        self as u8
    }

    /// The 4-bit condition field used by AArch64 `b.cond`, in AArch64's own encoding (which happens
    /// to share x86's numbering for the 14 conditions both ISAs define; AArch64 has no direct P/NP
    /// equivalent and maps them to VS/VC).
    pub fn aarch64_bits(self) -> u8 {
        use CondCode::*;
        match self {
            O => 0b0110,  // VS
            No => 0b0111, // VC
            B => 0b0011,  // CC/LO
            Ae => 0b0010, // CS/HS
            E => 0b0000,  // EQ
            Ne => 0b0001, // NE
            Be => 0b1001, // LS
            A => 0b1000,  // HI
            S => 0b0100,  // MI
            Ns => 0b0101, // PL
            P => 0b0110,  // no direct equivalent; alias to VS
            Np => 0b0111, // alias to VC
            L => 0b1011,  // LT
            Ge => 0b1010, // GE
            Le => 0b1101, // LE
            G => 0b1100,  // GT
        }
    }
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CondCode::*;
        f.write_str(match *self {
            O => "o",
            No => "no",
            B => "b",
            Ae => "ae",
            E => "e",
            Ne => "ne",
            Be => "be",
            A => "a",
            S => "s",
            Ns => "ns",
            P => "p",
            Np => "np",
            L => "l",
            Ge => "ge",
            Le => "le",
            G => "g",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_collapse_to_one_canonical_condition() {
        assert_eq!(CondCode::from_mnemonic("jae").is_none(), true); // mnemonic includes no "j" prefix
        assert_eq!(CondCode::from_mnemonic("ae"), Some(CondCode::Ae));
        assert_eq!(CondCode::from_mnemonic("nb"), Some(CondCode::Ae));
        assert_eq!(CondCode::from_mnemonic("nc"), Some(CondCode::Ae));
        assert_eq!(CondCode::from_mnemonic("z"), Some(CondCode::E));
    }

    #[test]
    fn inverse_is_involutive() {
        for cc in &[
            CondCode::O,
            CondCode::B,
            CondCode::E,
            CondCode::Be,
            CondCode::S,
            CondCode::P,
            CondCode::L,
            CondCode::Le,
        ] {
            assert_eq!(cc.inverse().inverse(), *cc);
        }
    }
}
