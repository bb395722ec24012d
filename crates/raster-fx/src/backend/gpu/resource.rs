//! Usage counting for pooled GPU resources.

use std::sync::atomic::{AtomicU32, Ordering};

/// Acquire/release counter shared by effects and textures.
///
/// The counter tracks users, not ownership: a resource with zero
/// users stays in its pool until an explicit `clean_up()` sweep
/// evicts it.
#[derive(Debug, Default)]
pub struct UsageCounter(AtomicU32);

impl UsageCounter {
    /// A counter with no users.
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Current user count.
    #[inline]
    pub fn users(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// `true` while at least one user holds the resource.
    #[inline]
    pub fn acquired(&self) -> bool {
        self.users() > 0
    }

    /// Registers a user unconditionally.
    #[inline]
    pub fn acquire(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Registers a user only when the resource is currently unused.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Removes a user; `false` when the counter was already zero.
    #[inline]
    pub fn release(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Memory accounting and usage surface of pooled GPU resources.
pub trait GpuResource {
    /// Device-side bytes held by the resource.
    fn gpu_memory_consumption(&self) -> usize;

    /// Host-side bytes held by the resource.
    fn cpu_memory_consumption(&self) -> usize;

    /// The resource's usage counter.
    fn usage(&self) -> &UsageCounter;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_contract() {
        let usage = UsageCounter::new();
        assert!(!usage.acquired());

        assert!(usage.try_acquire());
        assert!(usage.acquired());
        // try_acquire refuses a second user
        assert!(!usage.try_acquire());

        // acquire stacks users regardless
        usage.acquire();
        assert_eq!(usage.users(), 2);

        assert!(usage.release());
        assert!(usage.release());
        assert!(!usage.release());
        assert!(!usage.acquired());
    }
}
