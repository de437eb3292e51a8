//! Virtual-memory layer (C1): page allocation, W^X protection transitions, and instruction-cache
//! maintenance.
//!
//! Everything here is expressed in terms of the `region` crate, the same dependency the ancestor's
//! `simplejit` crate reaches for to avoid hand-rolling `mmap`/`VirtualAlloc` twice. A `Block` owns
//! its mapping; dropping one without calling `release` still unmaps it (via `region::Allocation`'s
//! own `Drop`), but `release` is the documented, logged path.

use std::sync::OnceLock;

use crate::result::{RuntimeError, RuntimeResult};

/// Page size and allocation granularity for this process, discovered once and cached for the
/// lifetime of the process.
#[derive(Debug, Clone, Copy)]
pub struct VirtMemInfo {
    /// The OS page size, in bytes.
    pub page_size: usize,
    /// The minimum granularity at which new mappings may start (equal to `page_size` on every
    /// platform this crate targets, but kept distinct for readers porting to one that differs).
    pub allocation_granularity: usize,
}

static VIRT_MEM_INFO: OnceLock<VirtMemInfo> = OnceLock::new();

/// The cached page-size/allocation-granularity pair for this process.
pub fn info() -> VirtMemInfo {
    *VIRT_MEM_INFO.get_or_init(|| {
        let page_size = region::page::size();
        VirtMemInfo { page_size, allocation_granularity: page_size }
    })
}

fn round_up_to_page(n: usize) -> usize {
    let page = info().page_size;
    (n + page - 1) / page * page
}

/// The permission state of a mapped block. Deliberately flat (not a bitmask the caller can combine
/// freely): these five combinations are the only ones the runtime ever requests, and enumerating
/// them makes an accidental `write | execute` request a type error rather than a silent RWX page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flags {
    /// No access.
    None,
    /// Read-only.
    R,
    /// Read-write.
    Rw,
    /// Read-execute.
    Rx,
    /// Read-write-execute. Only reachable via an explicit request; never produced by `protect_rx`.
    Rwx,
}

impl Flags {
    fn to_region(self) -> region::Protection {
        match self {
            Flags::None => region::Protection::NONE,
            Flags::R => region::Protection::READ,
            Flags::Rw => region::Protection::READ_WRITE,
            Flags::Rx => region::Protection::READ_EXECUTE,
            Flags::Rwx => region::Protection::READ_WRITE_EXECUTE,
        }
    }

    fn is_writable(self) -> bool {
        matches!(self, Flags::Rw | Flags::Rwx)
    }
}

/// A mapped, page-aligned region of memory along with the permissions it currently holds.
pub struct Block {
    alloc: region::Allocation,
    flags: Flags,
}

impl Block {
    /// The address of the first byte of the mapping.
    pub fn as_ptr(&self) -> *const u8 {
        self.alloc.as_ptr::<u8>()
    }

    /// The address of the first byte of the mapping, as a mutable pointer. Callers must still
    /// respect `self.flags()`; writing through this pointer while `flags()` forbids writes is
    /// undefined behavior the OS will usually turn into a fault rather than silent corruption.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.alloc.as_mut_ptr::<u8>()
    }

    /// The length of the mapping in bytes (rounded up to whole pages at allocation time).
    pub fn len(&self) -> usize {
        self.alloc.len()
    }

    /// `true` if the mapping is zero bytes. Never true for a `Block` returned by `alloc`, since
    /// `alloc` rejects a zero-byte request; kept for API parity with other length-bearing types.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The block's current permission flags.
    pub fn flags(&self) -> Flags {
        self.flags
    }
}

/// Map `n_bytes` rounded up to whole pages, with permission `flags`.
pub fn alloc(n_bytes: usize, flags: Flags) -> RuntimeResult<Block> {
    if n_bytes == 0 {
        return Err(RuntimeError::invalid_argument("alloc size must be positive"));
    }
    let rounded = round_up_to_page(n_bytes);
    let alloc = region::alloc(rounded, flags.to_region())
        .map_err(|e| RuntimeError::failed_to_map(e.to_string()))?;
    log::debug!(
        "vmem: mapped {} bytes ({} requested) at {:p} with {:?}",
        rounded,
        n_bytes,
        alloc.as_ptr::<u8>(),
        flags
    );
    Ok(Block { alloc, flags })
}

/// Change `block`'s protection in place. The returned `Block` mirrors the same pages; no copy or
/// remap happens.
pub fn protect(mut block: Block, new_flags: Flags) -> RuntimeResult<Block> {
    let old_flags = block.flags;
    unsafe {
        region::protect(block.as_ptr(), block.len(), new_flags.to_region())
            .map_err(|e| RuntimeError::protection_failed(e.to_string()))?;
    }
    log::debug!(
        "vmem: reprotected {} bytes at {:p}: {:?} -> {:?}",
        block.len(),
        block.as_ptr(),
        old_flags,
        new_flags
    );
    block.flags = new_flags;
    Ok(block)
}

/// The W^X convenience: transition a writable block to read-execute. Returns an error rather than
/// silently granting RWX if the caller actually wants both; use `protect(block, Flags::Rwx)`
/// directly for that (rare, debugging-only) case.
pub fn protect_rx(block: Block) -> RuntimeResult<Block> {
    protect(block, Flags::Rx)
}

/// Unmap `block`. Consuming by value means a released block cannot be protected or written again
/// without the compiler catching it.
pub fn release(block: Block) -> RuntimeResult<()> {
    log::debug!("vmem: releasing {} bytes at {:p}", block.len(), block.as_ptr());
    drop(block.alloc);
    Ok(())
}

/// Copy `bytes` into `block` starting at `offset`. Fails if the block lacks write permission or the
/// range doesn't fit.
pub fn write_bytes(block: &mut Block, bytes: &[u8], offset: usize) -> RuntimeResult<()> {
    if !block.flags.is_writable() {
        return Err(RuntimeError::invalid_argument("block is not writable"));
    }
    let end = offset.checked_add(bytes.len()).ok_or_else(|| {
        RuntimeError::invalid_argument("offset + length overflows")
    })?;
    if end > block.len() {
        return Err(RuntimeError::invalid_argument("write out of bounds"));
    }
    unsafe {
        let dst = block.as_mut_ptr().add(offset);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
    }
    Ok(())
}

/// Flush the instruction cache over `[addr, addr+len)` so a CPU fetching instructions from that
/// range sees the bytes a different core (or the same core's data-side cache) just wrote.
///
/// x86-64 has coherent instruction and data caches; this is a no-op there beyond a memory fence.
/// AArch64 does not, so every cache line touched by the JIT write must be cleaned to the point of
/// unification and the matching instruction-cache line invalidated before it is safe to jump into.
pub fn flush_instruction_cache(addr: *const u8, len: usize) {
    log::debug!("vmem: flushing instruction cache over {} bytes at {:p}", len, addr);
    #[cfg(target_arch = "aarch64")]
    unsafe {
        aarch64_flush(addr, len);
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        let _ = (addr, len);
        std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(target_arch = "aarch64")]
unsafe fn aarch64_flush(addr: *const u8, len: usize) {
    use std::arch::asm;

    // dc/ic cache-line granularity is implementation-defined but always a power of two and never
    // larger than 2KiB; 64 bytes covers every shipping AArch64 core and walking in smaller strides
    // than the true line size is just redundant work, not incorrect.
    const LINE: usize = 64;
    let start = addr as usize & !(LINE - 1);
    let end = (addr as usize + len + LINE - 1) & !(LINE - 1);

    let mut line = start;
    while line < end {
        asm!("dc cvau, {0}", in(reg) line);
        line += LINE;
    }
    asm!("dsb ish");

    let mut line = start;
    while line < end {
        asm!("ic ivau, {0}", in(reg) line);
        line += LINE;
    }
    asm!("dsb ish");
    asm!("isb");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_is_stable_across_calls() {
        assert_eq!(info().page_size, info().page_size);
        assert!(info().page_size > 0);
    }

    #[test]
    fn alloc_rejects_zero_size() {
        assert!(alloc(0, Flags::Rw).is_err());
    }

    #[test]
    fn alloc_protect_write_release_roundtrip() {
        let block = alloc(16, Flags::Rw).unwrap();
        assert!(block.len() >= 16);
        let mut block = block;
        write_bytes(&mut block, &[0xc3], 0).unwrap();
        let block = protect_rx(block).unwrap();
        assert_eq!(block.flags(), Flags::Rx);
        release(block).unwrap();
    }

    #[test]
    fn write_to_non_writable_block_fails() {
        let block = alloc(16, Flags::Rw).unwrap();
        let mut block = protect_rx(block).unwrap();
        assert!(write_bytes(&mut block, &[0x90], 0).is_err());
        release(block).unwrap();
    }

    #[test]
    fn write_out_of_bounds_fails() {
        let mut block = alloc(16, Flags::Rw).unwrap();
        let len = block.len();
        assert!(write_bytes(&mut block, &[0; 8], len - 4).is_err());
        release(block).unwrap();
    }
}
