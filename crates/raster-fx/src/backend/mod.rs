//! Backend realizations.
//!
//! `cpu` is always available; `gpu` needs the `wgpu` cargo feature.

pub mod cpu;

#[cfg(feature = "wgpu")]
pub mod gpu;

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique ids for devices and the objects they own.
///
/// Ownership checks in `destroy_*` compare these instead of pointer
/// identity.
pub(crate) fn next_object_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
