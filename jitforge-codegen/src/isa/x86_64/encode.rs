//! Low-level x86-64 byte-encoding primitives: REX prefixes, ModRM/SIB bytes, and memory-operand
//! addressing-mode selection.
//!
//! These are pure functions over small integers; the instruction-level encoders in
//! `assembler::x86_64` compose them. Kept separate so the bit-twiddling can be unit-tested in
//! isolation from operand dispatch.

use crate::fixup::FixupKind;
use crate::operand::{MemOperand, Reg};
use crate::result::{CodegenError, CodegenResult};

/// Build a REX prefix byte, or `None` if none of the four bits need setting and the registers
/// involved don't force one anyway (the caller is responsible for forcing a REX when a high-byte
/// register requires disambiguation from `AH`/`BH`/`CH`/`DH`).
///
/// `w` selects the 64-bit operand size, `r` extends ModRM.reg, `x` extends SIB.index, `b` extends
/// ModRM.rm/SIB.base/opcode.reg.
pub fn rex(w: bool, r: bool, x: bool, b: bool) -> Option<u8> {
    if !w && !r && !x && !b {
        return None;
    }
    Some(0x40 | (w as u8) << 3 | (r as u8) << 2 | (x as u8) << 1 | (b as u8))
}

/// The ModRM byte: `mod` (2 bits), `reg` (3 bits, the REX.R-extended register or an opcode
/// extension), `rm` (3 bits, the REX.B-extended register or SIB-follows marker).
pub fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    debug_assert!(md <= 0b11);
    (md << 6) | ((reg & 0x7) << 3) | (rm & 0x7)
}

/// The SIB byte: `scale` (2 bits, log2 of 1/2/4/8), `index` (3 bits), `base` (3 bits).
pub fn sib(scale_log2: u8, index: u8, base: u8) -> u8 {
    debug_assert!(scale_log2 <= 0b11);
    (scale_log2 << 6) | ((index & 0x7) << 3) | (base & 0x7)
}

fn scale_log2(scale: u8) -> u8 {
    match scale {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => unreachable!("illegal SIB scale {}", scale),
    }
}

/// The fully-assembled ModRM(+SIB)(+disp) encoding of a memory operand, paired with the REX.X/REX.B
/// bits it requires and, for `rip`-relative operands, the `FixupKind` the caller should register
/// (anchored at the first byte *after* this returned sequence, per the x86-64 rule that `rip`
/// addresses the next instruction).
pub struct MemEncoding {
    /// ModRM byte, with `rm` already set (`100` for SIB-follows or `101` for rip-relative).
    pub modrm_byte: u8,
    /// SIB byte, if the addressing mode needs one.
    pub sib_byte: Option<u8>,
    /// Displacement bytes to append after ModRM/SIB (0, 1, or 4 bytes).
    pub disp: Vec<u8>,
    /// `true` if `index`'s REX.X extension bit must be set.
    pub rex_x: bool,
    /// `true` if `base`'s (or, for rip-relative, nothing's) REX.B extension bit must be set.
    pub rex_b: bool,
    /// Set when the displacement needs a post-hoc rip-relative fixup against a label (the caller
    /// supplies the label; this struct only reports where the 4-byte disp field begins, via the
    /// length of everything emitted before it).
    pub needs_rip_fixup: bool,
}

/// Encode `mem`'s addressing mode into ModRM/SIB/disp bytes. `reg_field` is the ModRM.reg value
/// (either another register's low 3 bits, or an opcode-extension number).
pub fn encode_mem(mem: &MemOperand, reg_field: u8) -> CodegenResult<MemEncoding> {
    if mem.is_rip_relative() {
        return Ok(MemEncoding {
            modrm_byte: modrm(0b00, reg_field, 0b101),
            sib_byte: None,
            disp: vec![0, 0, 0, 0],
            rex_x: false,
            rex_b: false,
            needs_rip_fixup: true,
        });
    }

    let base = mem.base();
    let index = mem.index();

    match (base, index) {
        (Some(base), None) => {
            let base_low = (base.index() & 0x7) as u8;
            let rex_b = base.index() & 0x8 != 0;
            // rbp/r13 with a zero displacement would be misread as a rip-relative/disp32-only
            // encoding, so force a disp8 of 0 in that case; rsp/r12 always need a SIB byte because
            // rm=100 means "SIB follows", not "use rsp as the base".
            if base_low == 0b100 {
                let sib_byte = Some(sib(0, 0b100, base_low));
                let (md, disp) = encode_disp(mem.disp(), false);
                return Ok(MemEncoding {
                    modrm_byte: modrm(md, reg_field, 0b100),
                    sib_byte,
                    disp,
                    rex_x: false,
                    rex_b,
                    needs_rip_fixup: false,
                });
            }
            let force_disp8 = base_low == 0b101 && mem.disp() == 0;
            let (md, disp) = encode_disp(mem.disp(), force_disp8);
            Ok(MemEncoding {
                modrm_byte: modrm(md, reg_field, base_low),
                sib_byte: None,
                disp,
                rex_x: false,
                rex_b,
                needs_rip_fixup: false,
            })
        }
        (base, Some(index)) => {
            let index_low = (index.index() & 0x7) as u8;
            if index_low == 0b100 {
                return Err(CodegenError::invalid_argument(
                    "rsp/r12 cannot be used as a SIB index register",
                ));
            }
            let rex_x = index.index() & 0x8 != 0;
            let (base_low, rex_b, no_base) = match base {
                Some(b) => ((b.index() & 0x7) as u8, b.index() & 0x8 != 0, false),
                None => (0b101, false, true),
            };
            let sib_byte = Some(sib(scale_log2(mem.scale()), index_low, base_low));
            if no_base {
                let mut disp = mem.disp().to_le_bytes().to_vec();
                return Ok(MemEncoding {
                    modrm_byte: modrm(0b00, reg_field, 0b100),
                    sib_byte,
                    disp: { disp.truncate(4); disp },
                    rex_x,
                    rex_b,
                    needs_rip_fixup: false,
                });
            }
            let force_disp8 = base_low == 0b101 && mem.disp() == 0;
            let (md, disp) = encode_disp(mem.disp(), force_disp8);
            Ok(MemEncoding {
                modrm_byte: modrm(md, reg_field, 0b100),
                sib_byte,
                disp,
                rex_x,
                rex_b,
                needs_rip_fixup: false,
            })
        }
        (None, None) => {
            let mut disp = mem.disp().to_le_bytes().to_vec();
            disp.truncate(4);
            Ok(MemEncoding {
                modrm_byte: modrm(0b00, reg_field, 0b100),
                sib_byte: Some(sib(0, 0b100, 0b101)),
                disp,
                rex_x: false,
                rex_b: false,
                needs_rip_fixup: false,
            })
        }
    }
}

fn encode_disp(disp: i32, force_disp8: bool) -> (u8, Vec<u8>) {
    if disp == 0 && !force_disp8 {
        (0b00, Vec::new())
    } else if let Ok(d8) = i8::try_from(disp) {
        (0b01, vec![d8 as u8])
    } else {
        (0b10, disp.to_le_bytes().to_vec())
    }
}

/// Direct (register-to-register) ModRM byte plus the REX.R/REX.B bits the two registers require.
pub fn encode_reg_reg(reg_field: Reg, rm_field: Reg) -> (u8, bool, bool) {
    let reg_low = (reg_field.index() & 0x7) as u8;
    let rm_low = (rm_field.index() & 0x7) as u8;
    let rex_r = reg_field.index() & 0x8 != 0;
    let rex_b = rm_field.index() & 0x8 != 0;
    (modrm(0b11, reg_low, rm_low), rex_r, rex_b)
}

/// The `FixupKind` to register for a displacement field produced by `encode_mem` when
/// `needs_rip_fixup` is set.
pub const RIP_FIXUP_KIND: FixupKind = FixupKind::RipRel32;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{RegClass, Width};

    #[test]
    fn rex_is_none_when_nothing_set() {
        assert_eq!(rex(false, false, false, false), None);
    }

    #[test]
    fn rex_w_sets_bit_3() {
        assert_eq!(rex(true, false, false, false), Some(0x48));
    }

    #[test]
    fn modrm_packs_fields() {
        assert_eq!(modrm(0b11, 0b101, 0b010), 0b11_101_010);
    }

    #[test]
    fn rsp_base_forces_sib_byte() {
        let rsp = Reg::physical(RegClass::Gp, 4, Width::W64);
        let mem = MemOperand::base_disp(rsp, 0, 8);
        let enc = encode_mem(&mem, 0).unwrap();
        assert!(enc.sib_byte.is_some());
    }

    #[test]
    fn rbp_base_with_zero_disp_forces_disp8() {
        let rbp = Reg::physical(RegClass::Gp, 5, Width::W64);
        let mem = MemOperand::base_disp(rbp, 0, 8);
        let enc = encode_mem(&mem, 0).unwrap();
        assert_eq!(enc.disp, vec![0]);
    }

    #[test]
    fn rip_relative_reserves_four_byte_placeholder() {
        use jitforge_entity::EntityRef;
        let label = crate::operand::Label::new(0);
        let mem = MemOperand::rip(label, 0, 8);
        let enc = encode_mem(&mem, 0).unwrap();
        assert!(enc.needs_rip_fixup);
        assert_eq!(enc.disp.len(), 4);
    }

    #[test]
    fn r12_index_is_rejected() {
        let rax = Reg::physical(RegClass::Gp, 0, Width::W64);
        let r12 = Reg::physical(RegClass::Gp, 12, Width::W64);
        let mem = MemOperand::base_index_scale(rax, r12, 1, 0, 8);
        assert!(encode_mem(&mem, 0).is_err());
    }
}
