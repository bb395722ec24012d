//! Pooled buffer allocators.
//!
//! Rendering churns through same-sized scratch buffers (tile uploads,
//! cross-backend copies, baked curve tables). The pools here cache
//! those buffers so hot paths reuse blocks instead of hitting the
//! system allocator per frame.
//!
//! # Overview
//!
//! - [`DynamicPoolAllocator`] — a growable list of length-tagged
//!   entries; [`alloc`](DynamicPoolAllocator::alloc) hands out RAII
//!   [`Blob`] handles, [`emplace`](DynamicPoolAllocator::emplace)
//!   constructs a typed value in a pooled slot.
//! - [`FixedPoolAllocator`] — the monomorphic counterpart for one
//!   fixed-size type.
//! - [`AllocatorPolicy`] — controls length rounding, growth batch
//!   size, and first-fit vs exact-match scanning.
//!
//! # Concurrency
//!
//! Slot acquire and release are lock-free: a compare-and-swap on the
//! per-entry used flag, under a shared read lock that only excludes
//! structural changes. Growth and shrink take the write lock. If the
//! retry scan after growth cannot find the entry that was just added,
//! the pool's bookkeeping is corrupt and the call fails hard with
//! [`Error::PoolIntegrity`] — it never substitutes an unrelated entry.

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use crate::{Error, Result};

/// Byte alignment of every pooled buffer.
///
/// Large enough for any element type the engine stores in a slot and
/// for cache-line separation of concurrently used entries.
pub const ENTRY_ALIGNMENT: usize = 64;

/// Allocation behavior knobs for [`DynamicPoolAllocator`].
pub trait AllocatorPolicy: Send + Sync {
    /// Rounds a requested length up to the policy's allocation unit.
    fn aligned_length(&self, length: usize) -> usize;

    /// Number of entries to add when the pool grows for an
    /// `aligned_length`-sized request.
    fn growth_batch(&self, aligned_length: usize) -> usize;

    /// `true` selects first-fit scanning (any entry at least as large
    /// as the request); `false` demands an exact length match.
    fn fast_alloc(&self) -> bool;
}

/// The standard policy: configurable batch, rounding unit, and scan
/// mode.
#[derive(Debug, Clone, Copy)]
pub struct GenericPolicy {
    batch: usize,
    alignment: usize,
    fast: bool,
}

impl GenericPolicy {
    /// Creates a policy from its three knobs.
    pub const fn new(batch: usize, alignment: usize, fast: bool) -> Self {
        Self {
            batch,
            alignment,
            fast,
        }
    }
}

impl Default for GenericPolicy {
    /// Batch of 8 entries, 32-byte rounding, first-fit scanning.
    fn default() -> Self {
        Self::new(8, 32, true)
    }
}

impl AllocatorPolicy for GenericPolicy {
    #[inline]
    fn aligned_length(&self, length: usize) -> usize {
        length.div_ceil(self.alignment) * self.alignment
    }

    #[inline]
    fn growth_batch(&self, _aligned_length: usize) -> usize {
        self.batch
    }

    #[inline]
    fn fast_alloc(&self) -> bool {
        self.fast
    }
}

// =============================================================================
// Entries
// =============================================================================

/// One pooled buffer: length tag, used flag, aligned heap block.
///
/// The used flag is the exclusivity guarantee: whoever wins the
/// compare-and-swap owns the buffer until release.
struct PoolEntry {
    length: usize,
    used: AtomicBool,
    data: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the buffer is only reachable through a handle that won the
// used-flag CAS, so at most one thread touches the bytes at a time.
unsafe impl Send for PoolEntry {}
unsafe impl Sync for PoolEntry {}

impl PoolEntry {
    fn new(length: usize) -> Self {
        debug_assert!(length > 0);

        let layout = Layout::from_size_align(length, ENTRY_ALIGNMENT)
            .expect("pool entry layout");
        // SAFETY: layout has non-zero size.
        let data = unsafe { alloc::alloc_zeroed(layout) };
        let data = NonNull::new(data).unwrap_or_else(|| alloc::handle_alloc_error(layout));

        Self {
            length,
            used: AtomicBool::new(false),
            data,
            layout,
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.used
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    fn release(&self) {
        self.used.store(false, Ordering::Release);
    }

    #[inline]
    fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }
}

impl Drop for PoolEntry {
    fn drop(&mut self) {
        // SAFETY: data was allocated with this layout and is not
        // reachable anymore.
        unsafe { alloc::dealloc(self.data.as_ptr(), self.layout) };
    }
}

/// Shared pool state: the entry list plus used/total counters.
struct PoolShared {
    entries: RwLock<Vec<Arc<PoolEntry>>>,
    size: AtomicUsize,
    capacity: AtomicUsize,
}

impl PoolShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(Vec::new()),
            size: AtomicUsize::new(0),
            capacity: AtomicUsize::new(0),
        })
    }

    fn count_where(&self, pred: impl Fn(&PoolEntry) -> bool) -> usize {
        let entries = self.entries.read().expect("pool lock");
        entries.iter().filter(|e| pred(e)).count()
    }

    /// Removes unused entries matching `pred`, up to `limit`
    /// (0 = no limit). Returns the number removed.
    fn release_where(&self, limit: usize, pred: impl Fn(&PoolEntry) -> bool) -> usize {
        let mut entries = self.entries.write().expect("pool lock");
        let mut freed = 0;

        entries.retain(|e| {
            if (limit == 0 || freed < limit) && !e.is_used() && pred(e) {
                freed += 1;
                false
            } else {
                true
            }
        });

        self.capacity.fetch_sub(freed, Ordering::AcqRel);
        freed
    }

    fn grow(&self, count: usize, entry_size: usize) {
        let mut entries = self.entries.write().expect("pool lock");

        for _ in 0..count {
            entries.push(Arc::new(PoolEntry::new(entry_size)));
        }

        // smallest-first, so first-fit picks the tightest entry
        entries.sort_by_key(|e| e.length);
        self.capacity.fetch_add(count, Ordering::AcqRel);
    }

    /// Lock-free scan: shared lock over the list, CAS per entry.
    fn scan_acquire(
        &self,
        aligned: usize,
        exact: bool,
    ) -> Option<Arc<PoolEntry>> {
        let entries = self.entries.read().expect("pool lock");

        for entry in entries.iter() {
            let fits = if exact {
                entry.length == aligned
            } else {
                entry.length >= aligned
            };

            if fits && entry.try_acquire() {
                self.size.fetch_add(1, Ordering::AcqRel);
                return Some(Arc::clone(entry));
            }
        }

        None
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Scoped handle to one pooled buffer; releases its entry on drop.
///
/// At most one `Blob` exists per entry at a time (CAS-guarded), so the
/// slice accessors hand out the buffer without further locking.
pub struct Blob {
    entry: Arc<PoolEntry>,
    shared: Arc<PoolShared>,
}

impl Blob {
    /// Buffer length in bytes (the entry length, after policy
    /// rounding).
    #[inline]
    pub fn len(&self) -> usize {
        self.entry.length
    }

    /// `true` if the buffer has zero length. Pool entries never do.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry.length == 0
    }

    /// The pooled bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: this Blob holds the entry's used flag, so no other
        // handle can reach the buffer.
        unsafe { std::slice::from_raw_parts(self.entry.data.as_ptr(), self.entry.length) }
    }

    /// The pooled bytes, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, plus &mut self excludes aliasing reads.
        unsafe { std::slice::from_raw_parts_mut(self.entry.data.as_ptr(), self.entry.length) }
    }
}

impl std::fmt::Debug for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blob").field("len", &self.len()).finish()
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        self.entry.release();
        self.shared.size.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owning handle to a `T` constructed inside a pooled slot.
///
/// Dropping the handle runs `T`'s destructor in place, then releases
/// the slot back to the pool.
pub struct PoolRef<T> {
    value: NonNull<T>,
    entry: Arc<PoolEntry>,
    shared: Arc<PoolShared>,
}

// SAFETY: PoolRef owns the T exclusively; access follows &/&mut rules.
unsafe impl<T: Send> Send for PoolRef<T> {}
unsafe impl<T: Sync> Sync for PoolRef<T> {}

impl<T> std::ops::Deref for PoolRef<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: value was constructed in the slot and lives until drop.
        unsafe { self.value.as_ref() }
    }
}

impl<T> std::ops::DerefMut for PoolRef<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as above; &mut self guarantees exclusivity.
        unsafe { self.value.as_mut() }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PoolRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PoolRef").field(&**self).finish()
    }
}

impl<T> Drop for PoolRef<T> {
    fn drop(&mut self) {
        // SAFETY: the value was written into the slot at emplace time
        // and has not been dropped yet.
        unsafe { self.value.as_ptr().drop_in_place() };
        self.entry.release();
        self.shared.size.fetch_sub(1, Ordering::AcqRel);
    }
}

// =============================================================================
// DynamicPoolAllocator
// =============================================================================

/// A growable pool of length-tagged, reusable buffers.
pub struct DynamicPoolAllocator<P: AllocatorPolicy = GenericPolicy> {
    shared: Arc<PoolShared>,
    policy: P,
}

/// The engine's standard pool: [`GenericPolicy`] defaults.
pub type StdDynamicPoolAllocator = DynamicPoolAllocator<GenericPolicy>;

impl Default for StdDynamicPoolAllocator {
    fn default() -> Self {
        Self::new(GenericPolicy::default())
    }
}

impl<P: AllocatorPolicy> DynamicPoolAllocator<P> {
    /// Creates an empty pool with the given policy.
    pub fn new(policy: P) -> Self {
        Self {
            shared: PoolShared::new(),
            policy,
        }
    }

    /// The active policy.
    #[inline]
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Replaces the policy. Existing entries keep their lengths.
    pub fn set_policy(&mut self, policy: P) {
        self.policy = policy;
    }

    /// Number of entries currently handed out.
    #[inline]
    pub fn size(&self) -> usize {
        self.shared.size.load(Ordering::Acquire)
    }

    /// Total number of entries, used or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity.load(Ordering::Acquire)
    }

    /// `true` if the pool holds no entries at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.capacity() == 0
    }

    /// Allocates a buffer of at least `length` bytes.
    ///
    /// The fast path scans for a free entry lock-free; on a miss the
    /// pool grows by the policy's batch and the scan retries with an
    /// exact match.
    pub fn alloc(&self, length: usize) -> Result<Blob> {
        let entry = self.acquire_entry(length)?;
        Ok(Blob {
            entry,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Constructs `value` inside a pooled slot sized for `T`.
    pub fn emplace<T>(&self, value: T) -> Result<PoolRef<T>> {
        if align_of::<T>() > ENTRY_ALIGNMENT {
            return Err(Error::allocation_failed(
                size_of::<T>(),
                format!(
                    "type alignment {} exceeds pool alignment {ENTRY_ALIGNMENT}",
                    align_of::<T>()
                ),
            ));
        }

        let entry = self.acquire_entry(size_of::<T>().max(1))?;
        let ptr = entry.data.cast::<T>();
        // SAFETY: the slot is at least size_of::<T>() bytes, aligned to
        // ENTRY_ALIGNMENT >= align_of::<T>(), and exclusively ours.
        unsafe { ptr.as_ptr().write(value) };

        Ok(PoolRef {
            value: ptr,
            entry,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Adds `count` fresh entries of `entry_size` bytes.
    pub fn reserve(&self, count: usize, entry_size: usize) {
        if count == 0 || entry_size == 0 {
            return;
        }

        self.shared.grow(count, entry_size);
    }

    /// Grows until `count` entries of exactly `entry_size` exist,
    /// used or not.
    pub fn ensure_capacity(&self, count: usize, entry_size: usize) {
        let total =
            self.count_used_of_size(entry_size) + self.count_unused_of_size(entry_size);

        if total < count {
            self.reserve(count - total, entry_size);
        }
    }

    /// Grows until `count` *free* entries of exactly `entry_size`
    /// exist.
    pub fn ensure_unused(&self, count: usize, entry_size: usize) {
        let unused = self.count_unused_of_size(entry_size);

        if unused < count {
            self.reserve(count - unused, entry_size);
        }
    }

    /// Used entries of exactly `entry_size` bytes.
    pub fn count_used_of_size(&self, entry_size: usize) -> usize {
        self.shared
            .count_where(|e| e.length == entry_size && e.is_used())
    }

    /// Used entries of at least `entry_size` bytes.
    pub fn count_used_of_compatible_size(&self, entry_size: usize) -> usize {
        self.shared
            .count_where(|e| e.length >= entry_size && e.is_used())
    }

    /// Free entries of exactly `entry_size` bytes.
    pub fn count_unused_of_size(&self, entry_size: usize) -> usize {
        self.shared
            .count_where(|e| e.length == entry_size && !e.is_used())
    }

    /// Free entries of at least `entry_size` bytes.
    pub fn count_unused_of_compatible_size(&self, entry_size: usize) -> usize {
        self.shared
            .count_where(|e| e.length >= entry_size && !e.is_used())
    }

    /// `true` if a free entry of exactly `length` bytes exists.
    pub fn contains_entries_of_size(&self, length: usize) -> bool {
        self.count_unused_of_size(length) > 0
    }

    /// `true` if a free entry of at least `length` bytes exists.
    pub fn contains_entries_of_compatible_size(&self, length: usize) -> bool {
        self.count_unused_of_compatible_size(length) > 0
    }

    /// Total bytes held by the pool.
    pub fn query_memory_capacity(&self) -> usize {
        let entries = self.shared.entries.read().expect("pool lock");
        entries.iter().map(|e| e.length).sum()
    }

    /// Bytes held by entries currently handed out.
    pub fn query_memory_consumption(&self) -> usize {
        let entries = self.shared.entries.read().expect("pool lock");
        entries
            .iter()
            .filter(|e| e.is_used())
            .map(|e| e.length)
            .sum()
    }

    /// Frees up to `entries` unused entries (0 = all). Returns the
    /// number freed.
    pub fn release_unused(&self, entries: usize) -> usize {
        self.shared.release_where(entries, |_| true)
    }

    /// Frees up to `entries` unused entries of exactly `entry_size`
    /// bytes (0 = all).
    pub fn release_unused_of_size(&self, entries: usize, entry_size: usize) -> usize {
        self.shared
            .release_where(entries, |e| e.length == entry_size)
    }

    /// Frees up to `entries` unused entries of at least `entry_size`
    /// bytes (0 = all).
    pub fn release_unused_of_compatible_size(&self, entries: usize, entry_size: usize) -> usize {
        self.shared
            .release_where(entries, |e| e.length >= entry_size)
    }

    fn acquire_entry(&self, length: usize) -> Result<Arc<PoolEntry>> {
        if length == 0 {
            return Err(Error::allocation_failed(0, "zero-length allocation"));
        }

        let aligned = self.policy.aligned_length(length);
        debug_assert!(aligned >= length);

        // fast path: lock-free scan over existing entries
        if self.capacity() > self.size() {
            let exact = !self.policy.fast_alloc();
            if let Some(entry) = self.shared.scan_acquire(aligned, exact) {
                return Ok(entry);
            }
        }

        let batch = self.policy.growth_batch(aligned);
        if batch == 0 {
            return Err(Error::allocation_failed(
                aligned,
                "policy growth batch is zero",
            ));
        }

        self.shared.grow(batch, aligned);

        // the grown entries match exactly; anything else is corruption
        self.shared
            .scan_acquire(aligned, true)
            .ok_or(Error::PoolIntegrity { requested: aligned })
    }
}

impl<P: AllocatorPolicy> std::fmt::Debug for DynamicPoolAllocator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicPoolAllocator")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish()
    }
}

// =============================================================================
// FixedPoolAllocator
// =============================================================================

/// Pool for instances of one fixed-size type.
///
/// Grows by a single slot when exhausted; handles are the same
/// [`PoolRef`] the dynamic pool emits.
pub struct FixedPoolAllocator<T> {
    shared: Arc<PoolShared>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for FixedPoolAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FixedPoolAllocator<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            shared: PoolShared::new(),
            _marker: PhantomData,
        }
    }

    const fn entry_size() -> usize {
        let size = size_of::<T>();
        if size == 0 { 1 } else { size }
    }

    /// Slots currently handed out.
    #[inline]
    pub fn size(&self) -> usize {
        self.shared.size.load(Ordering::Acquire)
    }

    /// Total slots, used or not.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity.load(Ordering::Acquire)
    }

    /// `true` if no slots exist.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.capacity() == 0
    }

    /// Constructs `value` in a pooled slot, growing by one slot when
    /// every existing slot is taken.
    pub fn emplace(&self, value: T) -> Result<PoolRef<T>> {
        if align_of::<T>() > ENTRY_ALIGNMENT {
            return Err(Error::allocation_failed(
                size_of::<T>(),
                format!(
                    "type alignment {} exceeds pool alignment {ENTRY_ALIGNMENT}",
                    align_of::<T>()
                ),
            ));
        }

        let entry = loop {
            if let Some(entry) = self.shared.scan_acquire(Self::entry_size(), true) {
                break entry;
            }

            self.shared.grow(1, Self::entry_size());
        };

        let ptr = entry.data.cast::<T>();
        // SAFETY: slot sized and aligned for T, exclusively acquired.
        unsafe { ptr.as_ptr().write(value) };

        Ok(PoolRef {
            value: ptr,
            entry,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Adds `count` empty slots.
    pub fn reserve(&self, count: usize) {
        if count > 0 {
            self.shared.grow(count, Self::entry_size());
        }
    }

    /// Grows until `count` slots exist, used or not.
    pub fn ensure_capacity(&self, count: usize) {
        let capacity = self.capacity();
        if capacity < count {
            self.reserve(count - capacity);
        }
    }

    /// Grows until `count` free slots exist.
    pub fn ensure_unused(&self, count: usize) {
        let unused = self.capacity().saturating_sub(self.size());
        if unused < count {
            self.reserve(count - unused);
        }
    }

    /// Frees up to `entries` unused slots (0 = all). Returns the
    /// number freed.
    pub fn release_unused(&self, entries: usize) -> usize {
        self.shared.release_where(entries, |_| true)
    }

    /// Drops every unused slot and forgets the rest of the
    /// bookkeeping. Live handles keep their buffers alive.
    pub fn reset(&self) {
        let mut entries = self.shared.entries.write().expect("pool lock");
        let used = entries.iter().filter(|e| e.is_used()).count();
        entries.retain(|e| e.is_used());
        self.shared.capacity.store(used, Ordering::Release);
    }
}

impl<T: Default> FixedPoolAllocator<T> {
    /// Constructs a default value in a pooled slot.
    pub fn alloc(&self) -> Result<PoolRef<T>> {
        self.emplace(T::default())
    }
}

impl<T> std::fmt::Debug for FixedPoolAllocator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedPoolAllocator")
            .field("size", &self.size())
            .field("capacity", &self.capacity())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_length() {
        let policy = GenericPolicy::default();
        assert_eq!(policy.aligned_length(1000), 1024);
        assert_eq!(policy.aligned_length(1024), 1024);
        assert_eq!(policy.aligned_length(1), 32);
        assert_eq!(policy.aligned_length(33), 64);
    }

    #[test]
    fn test_alloc_and_release_restores_counts() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(2, 1024);

        let before_unused = pool.count_unused_of_size(1024);
        let before_size = pool.size();

        let blob = pool.alloc(1000).unwrap();
        assert_eq!(blob.len(), 1024);
        assert_eq!(pool.size(), before_size + 1);
        assert_eq!(pool.count_unused_of_size(1024), before_unused - 1);

        drop(blob);
        assert_eq!(pool.size(), before_size);
        assert_eq!(pool.count_unused_of_size(1024), before_unused);
    }

    #[test]
    fn test_reserve_then_alloc_without_growth() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(4, 1024);
        assert_eq!(pool.capacity(), 4);

        // 1000 rounds up to 1024; four allocations reuse the reserve
        let blobs: Vec<_> = (0..4).map(|_| pool.alloc(1000).unwrap()).collect();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.size(), 4);

        // a fifth forces growth by the policy batch (8)
        let extra = pool.alloc(1000).unwrap();
        assert_eq!(pool.capacity(), 4 + 8);
        assert_eq!(pool.size(), 5);

        drop(extra);
        drop(blobs);
        assert_eq!(pool.size(), 0);
    }

    #[test]
    fn test_fast_alloc_takes_compatible_entry() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(1, 4096);

        let blob = pool.alloc(100).unwrap();
        assert_eq!(blob.len(), 4096);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_exact_alloc_ignores_larger_entry() {
        let pool = DynamicPoolAllocator::new(GenericPolicy::new(2, 32, false));
        pool.reserve(1, 4096);

        let blob = pool.alloc(100).unwrap();
        // exact-match policy grows a 128-byte entry instead
        assert_eq!(blob.len(), 128);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn test_blob_bytes_are_writable() {
        let pool = StdDynamicPoolAllocator::default();
        let mut blob = pool.alloc(64).unwrap();
        blob.as_mut_slice().fill(0xAB);
        assert!(blob.as_slice().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_concurrent_allocs_do_not_overlap() {
        use std::collections::HashSet;
        use std::sync::Mutex;

        let pool = Arc::new(StdDynamicPoolAllocator::default());
        let ranges = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let ranges = Arc::clone(&ranges);
                std::thread::spawn(move || {
                    let mut local = Vec::new();
                    for _ in 0..16 {
                        let mut blob = pool.alloc(256).unwrap();
                        let start = blob.as_mut_slice().as_ptr() as usize;
                        local.push((start, start + blob.len()));
                        // keep the blob alive so ranges stay live together
                        std::mem::forget(blob);
                    }
                    ranges.lock().unwrap().extend(local);
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let ranges = ranges.lock().unwrap();
        let unique: HashSet<_> = ranges.iter().map(|r| r.0).collect();
        assert_eq!(unique.len(), ranges.len(), "entries were handed out twice");

        let mut sorted = ranges.clone();
        sorted.sort();
        for pair in sorted.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "live ranges overlap");
        }
    }

    #[test]
    fn test_emplace_runs_destructor() {
        use std::sync::atomic::AtomicU32;

        static DROPS: AtomicU32 = AtomicU32::new(0);

        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let pool = StdDynamicPoolAllocator::default();
        let handle = pool.emplace(Tracked).unwrap();
        assert_eq!(pool.size(), 1);

        drop(handle);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
        assert_eq!(pool.size(), 0);
        assert!(pool.capacity() > 0);
    }

    #[test]
    fn test_emplace_value_access() {
        let pool = StdDynamicPoolAllocator::default();
        let mut value = pool.emplace([1u32, 2, 3, 4]).unwrap();
        value[0] = 99;
        assert_eq!(*value, [99, 2, 3, 4]);
    }

    #[test]
    fn test_release_unused() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(4, 512);
        pool.reserve(2, 1024);

        let held = pool.alloc(512).unwrap();

        assert_eq!(pool.release_unused_of_size(0, 1024), 2);
        assert_eq!(pool.capacity(), 4);

        // the held entry survives a full sweep
        assert_eq!(pool.release_unused(0), 3);
        assert_eq!(pool.capacity(), 1);
        drop(held);
        assert_eq!(pool.release_unused(0), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_memory_introspection() {
        let pool = StdDynamicPoolAllocator::default();
        pool.reserve(2, 256);
        assert_eq!(pool.query_memory_capacity(), 512);
        assert_eq!(pool.query_memory_consumption(), 0);

        let _blob = pool.alloc(200).unwrap();
        assert_eq!(pool.query_memory_consumption(), 256);
        assert!(pool.contains_entries_of_size(256));
        assert!(pool.contains_entries_of_compatible_size(100));
        assert!(!pool.contains_entries_of_compatible_size(1000));
    }

    #[test]
    fn test_ensure_unused() {
        let pool = StdDynamicPoolAllocator::default();
        let _a = {
            pool.reserve(1, 128);
            pool.alloc(128).unwrap()
        };

        pool.ensure_unused(2, 128);
        assert_eq!(pool.count_unused_of_size(128), 2);
        assert_eq!(pool.capacity(), 3);

        pool.ensure_capacity(3, 128);
        assert_eq!(pool.capacity(), 3);
    }

    #[test]
    fn test_fixed_pool_grows_by_one() {
        let pool = FixedPoolAllocator::<u64>::new();
        assert!(pool.is_empty());

        let a = pool.emplace(1).unwrap();
        let b = pool.emplace(2).unwrap();
        assert_eq!(pool.capacity(), 2);
        assert_eq!((*a, *b), (1, 2));

        drop(a);
        let c = pool.emplace(3).unwrap();
        // the freed slot is reused, no growth
        assert_eq!(pool.capacity(), 2);
        assert_eq!(*c, 3);
        drop(b);
        drop(c);

        assert_eq!(pool.release_unused(0), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_fixed_pool_reset_keeps_live_handles() {
        let pool = FixedPoolAllocator::<String>::new();
        let held = pool.emplace(String::from("held")).unwrap();
        let _ = pool.emplace(String::from("dropped")).unwrap();

        pool.reset();
        assert_eq!(pool.capacity(), 1);
        assert_eq!(&*held, "held");
    }
}
