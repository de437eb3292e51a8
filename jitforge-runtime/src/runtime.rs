//! Runtime (C9): installs finalized byte buffers as callable, page-protected functions, with an
//! optional content-addressed cache.
//!
//! Cyclic references between the runtime and its handles are broken the way §9's design notes
//! describe: the runtime owns the memory, and a `JitFunction` only holds an index into the
//! runtime's block table plus an epoch counter, not a reference-counted claim on the memory itself.
//! Disposing the runtime invalidates every outstanding handle's epoch at once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jitforge_codegen::{CallConv, CodeHolder, Isa};

use crate::config::TargetIsa;
use crate::result::{RuntimeError, RuntimeResult};
use crate::vmem::{self, Block, Flags};

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv1a_mix(hash: &mut u64, byte: u8) {
    *hash ^= byte as u64;
    *hash = hash.wrapping_mul(FNV_PRIME);
}

/// A stable 64-bit key derived from `(arch, abi, bytes)` via FNV-1a.
fn cache_key(isa: Isa, call_conv: CallConv, bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in isa.to_string().bytes() {
        fnv1a_mix(&mut hash, b);
    }
    for b in call_conv.to_string().bytes() {
        fnv1a_mix(&mut hash, b);
    }
    for &b in bytes {
        fnv1a_mix(&mut hash, b);
    }
    hash
}

enum Slot {
    Occupied { block: Block, epoch: u32, size: usize },
    Free { epoch: u32 },
}

struct CacheEntry {
    bytes: Vec<u8>,
    index: usize,
}

struct Inner {
    slots: Vec<Slot>,
    cache: HashMap<u64, Vec<CacheEntry>>,
}

struct Shared {
    target: TargetIsa,
    inner: Mutex<Inner>,
}

/// Owns every block of executable memory installed through it. Safe to share across threads: the
/// block list and cache are guarded by an internal mutex, so concurrent `add`/`add_cached` calls
/// are serialized but never racy.
pub struct Runtime {
    shared: Arc<Shared>,
}

impl Runtime {
    /// Build a runtime targeting `target`.
    pub fn new(target: TargetIsa) -> Self {
        Runtime {
            shared: Arc::new(Shared {
                target,
                inner: Mutex::new(Inner { slots: Vec::new(), cache: HashMap::new() }),
            }),
        }
    }

    /// The configuration this runtime was built with.
    pub fn target_isa(&self) -> TargetIsa {
        self.shared.target
    }

    /// Finalize `holder` and install the resulting bytes.
    pub fn add(&self, holder: CodeHolder) -> RuntimeResult<JitFunction> {
        let bytes = holder.finalize()?;
        self.add_bytes(&bytes)
    }

    /// Install an already-finalized byte buffer: map RW memory, copy the bytes in, downgrade to
    /// RX (or leave RWX if W^X enforcement is disabled), flush the instruction cache, and record
    /// the block for lifetime tracking.
    pub fn add_bytes(&self, bytes: &[u8]) -> RuntimeResult<JitFunction> {
        if bytes.is_empty() {
            return Err(RuntimeError::NoCodeGenerated);
        }
        if !self.shared.target.allow_executable_memory() {
            return Err(RuntimeError::feature_not_enabled(
                "this runtime was configured without executable-memory privileges",
            ));
        }

        let mut block = vmem::alloc(bytes.len(), Flags::Rw)?;
        vmem::write_bytes(&mut block, bytes, 0)?;
        let block = if self.shared.target.enforce_wx() {
            vmem::protect_rx(block)?
        } else {
            vmem::protect(block, Flags::Rwx)?
        };

        let address = block.as_ptr() as usize;
        let size = bytes.len();
        vmem::flush_instruction_cache(block.as_ptr(), size);

        let (index, epoch) = {
            let mut inner = self.shared.inner.lock().unwrap();
            insert_block(&mut inner, block, size)
        };
        log::debug!(
            "runtime: installed {} bytes at {:#x} (slot {}, epoch {})",
            size,
            address,
            index,
            epoch
        );
        Ok(JitFunction { shared: Arc::clone(&self.shared), index, epoch, address, size })
    }

    /// Install `bytes`, but first check (and afterwards populate) a content-addressed cache keyed
    /// by `key`, or by an FNV-1a hash of `(arch, abi, bytes)` if `key` is `None`. A cache hit
    /// compares the full byte vector before returning the cached handle, so a hash collision never
    /// silently returns the wrong function; it falls through and compiles a fresh entry instead.
    pub fn add_cached(&self, bytes: &[u8], key: Option<u64>) -> RuntimeResult<JitFunction> {
        if bytes.is_empty() {
            return Err(RuntimeError::NoCodeGenerated);
        }
        let target = self.shared.target;
        let fnv = key.unwrap_or_else(|| cache_key(target.isa(), target.call_conv(), bytes));

        {
            let inner = self.shared.inner.lock().unwrap();
            if let Some(bucket) = inner.cache.get(&fnv) {
                for entry in bucket {
                    if entry.bytes.as_slice() == bytes {
                        if let Some(handle) = handle_for_index(&self.shared, &inner, entry.index) {
                            log::debug!("runtime: cache hit for key {:#x}", fnv);
                            return Ok(handle);
                        }
                    }
                }
            }
        }

        log::debug!("runtime: cache miss for key {:#x}, compiling", fnv);
        let handle = self.add_bytes(bytes)?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner
            .cache
            .entry(fnv)
            .or_insert_with(Vec::new)
            .push(CacheEntry { bytes: bytes.to_vec(), index: handle.index });
        Ok(handle)
    }

    /// Remove every cache entry stored under `key`. Does not release the underlying blocks;
    /// outstanding handles remain valid until disposed individually or the runtime is disposed.
    pub fn drop_cached(&self, key: u64) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.cache.remove(&key);
    }

    /// Empty the cache entirely.
    pub fn clear_cache(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        inner.cache.clear();
    }

    /// Release every installed block, even ones a live `JitFunction` still references. Every
    /// outstanding handle's epoch becomes stale; later calls against it are no-ops (see
    /// `JitFunction::dispose`), not use-after-free, since no handle ever holds a raw pointer it can
    /// dereference directly except through the explicit `call_*` methods.
    pub fn dispose(self) -> RuntimeResult<()> {
        let mut inner = self.shared.inner.lock().unwrap();
        for slot in inner.slots.drain(..) {
            if let Slot::Occupied { block, .. } = slot {
                vmem::release(block)?;
            }
        }
        inner.cache.clear();
        Ok(())
    }
}

fn insert_block(inner: &mut Inner, block: Block, size: usize) -> (usize, u32) {
    for (index, slot) in inner.slots.iter_mut().enumerate() {
        if let Slot::Free { epoch } = slot {
            let epoch = *epoch + 1;
            *slot = Slot::Occupied { block, epoch, size };
            return (index, epoch);
        }
    }
    let index = inner.slots.len();
    inner.slots.push(Slot::Occupied { block, epoch: 0, size });
    (index, 0)
}

fn handle_for_index(shared: &Arc<Shared>, inner: &Inner, index: usize) -> Option<JitFunction> {
    match inner.slots.get(index) {
        Some(Slot::Occupied { block, epoch, size }) => Some(JitFunction {
            shared: Arc::clone(shared),
            index,
            epoch: *epoch,
            address: block.as_ptr() as usize,
            size: *size,
        }),
        _ => None,
    }
}

/// A weak handle (slot index plus epoch) to one function installed by a `Runtime`. Cloning is not
/// provided: a handle is meant to be disposed exactly once by whoever received it from `add`.
pub struct JitFunction {
    shared: Arc<Shared>,
    index: usize,
    epoch: u32,
    address: usize,
    size: usize,
}

impl JitFunction {
    /// The address of the first byte of this function's code.
    pub fn address(&self) -> usize {
        self.address
    }

    /// The length, in bytes, of this function's code (not rounded to page granularity).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Release this function's block, evicting it from the cache if present. A no-op if the
    /// runtime already disposed this slot (directly via `Runtime::dispose`, or because the slot was
    /// reused after an earlier `dispose` of this same handle).
    pub fn dispose(self) -> RuntimeResult<()> {
        let taken = {
            let mut inner = self.shared.inner.lock().unwrap();
            let matches = matches!(
                inner.slots.get(self.index),
                Some(Slot::Occupied { epoch, .. }) if *epoch == self.epoch
            );
            if !matches {
                None
            } else {
                let slot = std::mem::replace(&mut inner.slots[self.index], Slot::Free { epoch: self.epoch });
                inner.cache.retain(|_, bucket| {
                    bucket.retain(|e| e.index != self.index);
                    !bucket.is_empty()
                });
                match slot {
                    Slot::Occupied { block, .. } => Some(block),
                    Slot::Free { .. } => None,
                }
            }
        };
        if let Some(block) = taken {
            vmem::release(block)?;
        }
        Ok(())
    }

    /// Call this function as a zero-argument function returning a 64-bit integer. The caller is
    /// responsible for the installed code actually matching this signature and calling convention;
    /// the runtime has no way to check it once bytes have been handed to `add_bytes`.
    ///
    /// # Safety
    /// The installed code must be a valid `extern "C" fn() -> i64` per the runtime's calling
    /// convention, and must not have been disposed.
    pub unsafe fn call_0(&self) -> i64 {
        let f: extern "C" fn() -> i64 = std::mem::transmute(self.address as *const ());
        f()
    }

    /// Call this function with one integer argument.
    ///
    /// # Safety
    /// See [`Self::call_0`].
    pub unsafe fn call_1(&self, a0: i64) -> i64 {
        let f: extern "C" fn(i64) -> i64 = std::mem::transmute(self.address as *const ());
        f(a0)
    }

    /// Call this function with two integer arguments.
    ///
    /// # Safety
    /// See [`Self::call_0`].
    pub unsafe fn call_2(&self, a0: i64, a1: i64) -> i64 {
        let f: extern "C" fn(i64, i64) -> i64 = std::mem::transmute(self.address as *const ());
        f(a0, a1)
    }

    /// Call this function with three integer arguments.
    ///
    /// # Safety
    /// See [`Self::call_0`].
    pub unsafe fn call_3(&self, a0: i64, a1: i64, a2: i64) -> i64 {
        let f: extern "C" fn(i64, i64, i64) -> i64 = std::mem::transmute(self.address as *const ());
        f(a0, a1, a2)
    }

    /// Call this function with four integer arguments.
    ///
    /// # Safety
    /// See [`Self::call_0`].
    pub unsafe fn call_4(&self, a0: i64, a1: i64, a2: i64, a3: i64) -> i64 {
        let f: extern "C" fn(i64, i64, i64, i64) -> i64 = std::mem::transmute(self.address as *const ());
        f(a0, a1, a2, a3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitforge_codegen::Isa;

    fn sysv_runtime() -> Runtime {
        Runtime::new(TargetIsa::builder(Isa::X86_64).finish())
    }

    // `48 89 f8 c3`: mov rax, rdi; ret -- the identity function, SysV scenario 1.
    const IDENTITY: [u8; 4] = [0x48, 0x89, 0xf8, 0xc3];

    #[test]
    fn add_bytes_rejects_empty() {
        let rt = sysv_runtime();
        assert!(matches!(rt.add_bytes(&[]), Err(RuntimeError::NoCodeGenerated)));
    }

    #[test]
    fn add_bytes_installs_and_is_callable() {
        let rt = sysv_runtime();
        let f = rt.add_bytes(&IDENTITY).unwrap();
        assert_eq!(f.size(), IDENTITY.len());
        let result = unsafe { f.call_1(0x1234) };
        assert_eq!(result, 0x1234);
        f.dispose().unwrap();
    }

    #[test]
    fn feature_not_enabled_when_executable_memory_disabled() {
        let rt = Runtime::new(
            TargetIsa::builder(Isa::X86_64).allow_executable_memory(false).finish(),
        );
        assert!(matches!(
            rt.add_bytes(&IDENTITY),
            Err(RuntimeError::FeatureNotEnabled(_))
        ));
    }

    #[test]
    fn cache_hit_returns_equivalent_handle_without_recompiling() {
        let rt = sysv_runtime();
        let a = rt.add_cached(&IDENTITY, None).unwrap();
        let b = rt.add_cached(&IDENTITY, None).unwrap();
        assert_eq!(a.address(), b.address());
        a.dispose().unwrap();
    }

    #[test]
    fn drop_cached_forces_recompilation() {
        let rt = sysv_runtime();
        let key = 0xdead_beef_u64;
        let a = rt.add_cached(&IDENTITY, Some(key)).unwrap();
        rt.drop_cached(key);
        let b = rt.add_cached(&IDENTITY, Some(key)).unwrap();
        assert_ne!(a.address(), b.address());
        a.dispose().unwrap();
        b.dispose().unwrap();
    }

    #[test]
    fn dispose_is_idempotent_on_stale_handle() {
        let rt = sysv_runtime();
        let f = rt.add_bytes(&IDENTITY).unwrap();
        let address = f.address();
        f.dispose().unwrap();
        let g = rt.add_bytes(&IDENTITY).unwrap();
        // Reusing the freed slot bumps the epoch, so the new handle's address may coincide with
        // the old one but the old handle (already consumed by `dispose`) can no longer be used to
        // observe it either way; this just exercises that a second install after dispose succeeds.
        let _ = address;
        g.dispose().unwrap();
    }

    #[test]
    fn runtime_dispose_releases_all_blocks() {
        let rt = sysv_runtime();
        let _a = rt.add_bytes(&IDENTITY).unwrap();
        let _b = rt.add_bytes(&IDENTITY).unwrap();
        rt.dispose().unwrap();
    }
}
