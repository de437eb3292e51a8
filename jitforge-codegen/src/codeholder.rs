//! `CodeHolder`: a relocation-aware byte buffer (§4.3).
//!
//! Encoders append bytes directly; anything that refers to a label not yet bound records a
//! `FixupRecord` instead of guessing a displacement. `finalize` walks every fixup, requires every
//! referenced label to have been bound, and patches the buffer in place.

use jitforge_entity::{EntityRef, PrimaryMap};

use crate::fixup::{FixupKind, FixupRecord};
use crate::operand::Label;
use crate::result::{CodegenError, CodegenResult};

/// A relocation-aware byte buffer.
///
/// A `CodeHolder` owns one contiguous code buffer plus a constant pool appended after it; labels
/// may point into either region. It has three lifecycle states: open (bytes may be appended, labels
/// bound, fixups added), and finalized (no further mutation; `code()` returns the patched bytes).
/// Calling `finalize` a second time is an error (§9, open question 3).
pub struct CodeHolder {
    code: Vec<u8>,
    const_pool: Vec<u8>,
    labels: PrimaryMap<Label, Option<u32>>,
    fixups: Vec<FixupRecord>,
    finalized: bool,
}

impl CodeHolder {
    /// An empty, open code holder.
    pub fn new() -> Self {
        CodeHolder {
            code: Vec::new(),
            const_pool: Vec::new(),
            labels: PrimaryMap::new(),
            fixups: Vec::new(),
            finalized: false,
        }
    }

    /// Allocate a new, unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None)
    }

    /// The current length of the code buffer, in bytes. The constant pool is not included; its
    /// final position is only known at `finalize` time.
    pub fn len(&self) -> u32 {
        self.code.len() as u32
    }

    /// Bind `label` to the current end of the code buffer.
    ///
    /// # Errors
    /// Returns `InvalidState` if `label` was already bound, or if this holder is finalized.
    pub fn bind(&mut self, label: Label) -> CodegenResult<()> {
        self.require_open()?;
        let offset = self.len();
        let slot = self
            .labels
            .get_mut(label)
            .ok_or_else(|| CodegenError::invalid_argument(format!("unknown label {}", label)))?;
        if slot.is_some() {
            return Err(CodegenError::invalid_state(format!(
                "label {} already bound",
                label
            )));
        }
        *slot = Some(offset);
        Ok(())
    }

    /// Append raw bytes to the code buffer.
    pub fn emit(&mut self, bytes: &[u8]) -> CodegenResult<()> {
        self.require_open()?;
        self.code.extend_from_slice(bytes);
        Ok(())
    }

    /// Append a single byte.
    pub fn emit_u8(&mut self, byte: u8) -> CodegenResult<()> {
        self.emit(&[byte])
    }

    /// Record a deferred patch anchored at `offset` bytes into the code buffer.
    pub fn add_fixup(&mut self, fixup: FixupRecord) -> CodegenResult<()> {
        self.require_open()?;
        self.fixups.push(fixup);
        Ok(())
    }

    /// Append `bytes` to the constant pool and bind `label` to its starting offset, expressed
    /// relative to the start of the pool (the pool is placed immediately after the code buffer
    /// during `finalize`, so the true address is only resolvable then).
    pub fn add_constant(&mut self, label: Label, bytes: &[u8]) -> CodegenResult<()> {
        self.require_open()?;
        let slot = self
            .labels
            .get_mut(label)
            .ok_or_else(|| CodegenError::invalid_argument(format!("unknown label {}", label)))?;
        if slot.is_some() {
            return Err(CodegenError::invalid_state(format!(
                "label {} already bound",
                label
            )));
        }
        // Store the pool-relative offset with the high bit set so `finalize` can tell a
        // pool-relative binding apart from a code-relative one; the pool never exceeds 2^31 bytes.
        let pool_offset = self.const_pool.len() as u32;
        *slot = Some(pool_offset | POOL_OFFSET_TAG);
        self.const_pool.extend_from_slice(bytes);
        Ok(())
    }

    /// Resolve every fixup against its label's bound offset and patch the buffer in place, then
    /// append the constant pool and return the combined bytes.
    ///
    /// # Errors
    /// Returns `InvalidState` if this holder was already finalized, or `UnresolvedLabel` if any
    /// fixup references a label that was never bound.
    pub fn finalize(mut self) -> CodegenResult<Vec<u8>> {
        self.require_open()?;
        let code_len = self.code.len() as u32;
        for fixup in &self.fixups {
            let raw = self.labels[fixup.label].ok_or_else(|| {
                CodegenError::unresolved_label(format!("label {} never bound", fixup.label))
            })?;
            let target = if raw & POOL_OFFSET_TAG != 0 {
                code_len + (raw & !POOL_OFFSET_TAG)
            } else {
                raw
            };
            patch_one(&mut self.code, fixup, target)?;
        }
        self.finalized = true;
        let mut out = self.code;
        out.extend_from_slice(&self.const_pool);
        Ok(out)
    }

    fn require_open(&self) -> CodegenResult<()> {
        if self.finalized {
            return Err(CodegenError::invalid_state(
                "code holder already finalized",
            ));
        }
        Ok(())
    }
}

impl Default for CodeHolder {
    fn default() -> Self {
        Self::new()
    }
}

const POOL_OFFSET_TAG: u32 = 1 << 31;

fn patch_one(code: &mut [u8], fixup: &FixupRecord, target: u32) -> CodegenResult<()> {
    let site = fixup.offset as usize;
    let len = fixup.kind.patch_len() as usize;
    if site + len > code.len() {
        return Err(CodegenError::invalid_state(format!(
            "fixup at offset {} runs past end of code buffer",
            site
        )));
    }
    match fixup.kind {
        FixupKind::Rel8 => {
            let next_insn = fixup.offset + 1;
            let disp = (target as i64 + fixup.addend) - next_insn as i64;
            let disp = i8::try_from(disp).map_err(|_| {
                CodegenError::displacement_overflow(format!(
                    "rel8 displacement {} out of range",
                    disp
                ))
            })?;
            code[site] = disp as u8;
        }
        FixupKind::Rel32 | FixupKind::RipRel32 => {
            let next_insn = fixup.offset + 4;
            let disp = (target as i64 + fixup.addend) - next_insn as i64;
            let disp = i32::try_from(disp).map_err(|_| {
                CodegenError::displacement_overflow(format!(
                    "rel32 displacement {} out of range",
                    disp
                ))
            })?;
            code[site..site + 4].copy_from_slice(&disp.to_le_bytes());
        }
        FixupKind::Abs32 => {
            let addr = (target as i64 + fixup.addend) as u32;
            code[site..site + 4].copy_from_slice(&addr.to_le_bytes());
        }
        FixupKind::Abs64 => {
            let addr = (target as i64 + fixup.addend) as u64;
            code[site..site + 8].copy_from_slice(&addr.to_le_bytes());
        }
        FixupKind::Aarch64Branch26 => {
            let disp = (target as i64 + fixup.addend) - fixup.offset as i64;
            patch_aarch64_branch(code, site, disp, 26)?;
        }
        FixupKind::Aarch64CondBranch19 | FixupKind::Aarch64CompareBranch19 => {
            let disp = (target as i64 + fixup.addend) - fixup.offset as i64;
            patch_aarch64_branch(code, site, disp, 19)?;
        }
        FixupKind::Aarch64AdrpAdd { add_offset } => {
            let page_of = |addr: i64| addr & !0xfff;
            let here = fixup.offset as i64;
            let page_delta = (page_of(target as i64 + fixup.addend) - page_of(here)) >> 12;
            let page_delta = i32::try_from(page_delta).map_err(|_| {
                CodegenError::displacement_overflow(format!(
                    "adrp page delta {} out of range",
                    page_delta
                ))
            })?;
            patch_adrp(code, site, page_delta)?;
            let add_site = site + add_offset as usize;
            let page_off = (target as i64 + fixup.addend) & 0xfff;
            patch_add_imm12(code, add_site, page_off as u32)?;
        }
    }
    Ok(())
}

/// Patch the signed, word-aligned immediate field of an AArch64 `B`/`B.cond`/`CBZ`/`CBNZ`
/// instruction. `bits` is the field width (26 for unconditional, 19 for conditional/compare
/// branches); the instruction word's low bits (opcode/condition) are left untouched.
fn patch_aarch64_branch(code: &mut [u8], site: usize, disp_bytes: i64, bits: u32) -> CodegenResult<()> {
    if disp_bytes & 0b11 != 0 {
        return Err(CodegenError::invalid_state(
            "aarch64 branch target not word-aligned",
        ));
    }
    let imm = disp_bytes >> 2;
    let half = 1i64 << (bits - 1);
    if imm < -half || imm >= half {
        return Err(CodegenError::displacement_overflow(format!(
            "aarch64 branch displacement {} out of range for {}-bit field",
            disp_bytes, bits
        )));
    }
    let mut word = u32::from_le_bytes(code[site..site + 4].try_into().unwrap());
    let mask = (1u32 << bits) - 1;
    let field = (imm as u32) & mask;
    let shift = if bits == 26 { 0 } else { 5 };
    word = (word & !(mask << shift)) | (field << shift);
    code[site..site + 4].copy_from_slice(&word.to_le_bytes());
    Ok(())
}

fn patch_adrp(code: &mut [u8], site: usize, page_delta: i32) -> CodegenResult<()> {
    let half = 1i32 << 20;
    if page_delta < -half || page_delta >= half {
        return Err(CodegenError::displacement_overflow(format!(
            "adrp page delta {} out of range",
            page_delta
        )));
    }
    let imm = page_delta as u32 & 0x1f_ffff;
    let immlo = imm & 0b11;
    let immhi = (imm >> 2) & 0x7ffff;
    let mut word = u32::from_le_bytes(code[site..site + 4].try_into().unwrap());
    word &= !((0x3 << 29) | (0x7ffff << 5));
    word |= immlo << 29;
    word |= immhi << 5;
    code[site..site + 4].copy_from_slice(&word.to_le_bytes());
    Ok(())
}

fn patch_add_imm12(code: &mut [u8], site: usize, page_off: u32) -> CodegenResult<()> {
    let mut word = u32::from_le_bytes(code[site..site + 4].try_into().unwrap());
    word &= !(0xfff << 10);
    word |= (page_off & 0xfff) << 10;
    code[site..site + 4].copy_from_slice(&word.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_finalize_with_no_fixups() {
        let mut holder = CodeHolder::new();
        holder.emit(&[0x90, 0x90]).unwrap();
        let l = holder.new_label();
        holder.bind(l).unwrap();
        let bytes = holder.finalize().unwrap();
        assert_eq!(bytes, vec![0x90, 0x90]);
    }

    #[test]
    fn double_bind_is_an_error() {
        let mut holder = CodeHolder::new();
        let l = holder.new_label();
        holder.bind(l).unwrap();
        assert!(holder.bind(l).is_err());
    }

    #[test]
    fn finalize_fails_on_unresolved_label() {
        let mut holder = CodeHolder::new();
        let l = holder.new_label();
        holder.emit(&[0, 0, 0, 0]).unwrap();
        holder
            .add_fixup(FixupRecord::new(0, FixupKind::Rel32, l))
            .unwrap();
        assert!(matches!(
            holder.finalize(),
            Err(CodegenError::UnresolvedLabel(_))
        ));
    }

    #[test]
    fn rel32_fixup_patches_relative_to_next_instruction() {
        let mut holder = CodeHolder::new();
        holder.emit(&[0xe9, 0, 0, 0, 0]).unwrap(); // jmp rel32
        let target = holder.new_label();
        holder
            .add_fixup(FixupRecord::new(1, FixupKind::Rel32, target))
            .unwrap();
        holder.emit(&[0x90; 10]).unwrap();
        holder.bind(target).unwrap();
        let bytes = holder.finalize().unwrap();
        let disp = i32::from_le_bytes(bytes[1..5].try_into().unwrap());
        assert_eq!(disp, 10); // (5 + 10) - 5
    }

    #[test]
    fn constant_pool_entry_resolves_after_code() {
        let mut holder = CodeHolder::new();
        holder.emit(&[0x90; 4]).unwrap();
        let k = holder.new_label();
        holder.add_constant(k, &[0xaa; 8]).unwrap();
        holder
            .add_fixup(FixupRecord::new(0, FixupKind::Abs32, k))
            .unwrap();
        let bytes = holder.finalize().unwrap();
        let addr = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(addr, 4); // code was 4 bytes, pool starts right after
        assert_eq!(&bytes[4..12], &[0xaa; 8]);
    }

    #[test]
    fn finalize_is_not_callable_twice() {
        let mut holder = CodeHolder::new();
        holder.emit(&[0x90]).unwrap();
        // second finalize is impossible to express directly since finalize consumes self;
        // instead verify that further mutation on an already-finalized-in-spirit holder would
        // fail via require_open, exercised through bind on a stale reference is not expressible
        // in safe code, so this test documents the invariant at the type level: `finalize` takes
        // `self` by value, making a second call a compile error, not a runtime one.
        let _ = holder.finalize().unwrap();
    }
}
