//! Resource pools for effects and textures.
//!
//! Pools reuse compiled effects (keyed by kernel source) and tile
//! textures (keyed by format and size) across frames. Entries carry
//! acquire/release counters; eviction only happens in explicit
//! `clean_up()` sweeps, which drop every entry without users.

use std::sync::{Arc, Mutex};

use raster_core::PixelFormat;

use super::context::Context;
use super::effect::{Effect, ParameterDecl};
use super::resource::GpuResource;
use super::texture::Texture;
use crate::FxResult;

/// A list of shared resources with usage-counted reuse.
pub struct ResourcePool<T: GpuResource> {
    items: Mutex<Vec<Arc<T>>>,
}

impl<T: GpuResource> ResourcePool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Number of pooled entries, used or not.
    pub fn size(&self) -> usize {
        self.items.lock().expect("resource pool").len()
    }

    /// `true` when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of entries without users.
    pub fn count_available(&self) -> usize {
        self.items
            .lock()
            .expect("resource pool")
            .iter()
            .filter(|item| !item.usage().acquired())
            .count()
    }

    /// Adds an entry.
    pub fn add(&self, item: Arc<T>) {
        self.items.lock().expect("resource pool").push(item);
    }

    /// Removes a specific entry; `false` when it was not pooled.
    pub fn remove(&self, item: &Arc<T>) -> bool {
        let mut items = self.items.lock().expect("resource pool");
        let before = items.len();
        items.retain(|candidate| !Arc::ptr_eq(candidate, item));
        items.len() != before
    }

    /// The first entry matching `pred`.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.items
            .lock()
            .expect("resource pool")
            .iter()
            .find(|item| pred(item))
            .cloned()
    }

    /// The first *unused* entry matching `pred`, acquired for the
    /// caller.
    pub fn acquire_where(&self, pred: impl Fn(&T) -> bool) -> Option<Arc<T>> {
        self.items
            .lock()
            .expect("resource pool")
            .iter()
            .find(|item| pred(item) && item.usage().try_acquire())
            .cloned()
    }

    /// Drops every entry without users; returns how many.
    pub fn clean_up(&self) -> usize {
        let mut items = self.items.lock().expect("resource pool");
        let before = items.len();
        items.retain(|item| item.usage().acquired());
        before - items.len()
    }

    /// Device-side bytes across all entries.
    pub fn total_gpu_memory_consumption(&self) -> usize {
        self.items
            .lock()
            .expect("resource pool")
            .iter()
            .map(|item| item.gpu_memory_consumption())
            .sum()
    }

    /// Host-side bytes across all entries.
    pub fn total_cpu_memory_consumption(&self) -> usize {
        self.items
            .lock()
            .expect("resource pool")
            .iter()
            .map(|item| item.cpu_memory_consumption())
            .sum()
    }
}

impl<T: GpuResource> Default for ResourcePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool of compiled effects, keyed by kernel source.
pub struct EffectPool {
    pool: ResourcePool<Effect>,
}

impl EffectPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            pool: ResourcePool::new(),
        }
    }

    /// The underlying resource pool.
    #[inline]
    pub fn pool(&self) -> &ResourcePool<Effect> {
        &self.pool
    }

    /// Returns the pooled effect compiled from `kernel_source`, or
    /// compiles a new one. Either way the caller is registered as a
    /// user; pair with `usage().release()`.
    pub fn acquire_from_source(
        &self,
        ctx: &Context,
        name: &str,
        kernel_source: &str,
        decls: &[ParameterDecl],
    ) -> FxResult<Arc<Effect>> {
        if let Some(effect) = self.pool.find(|e| e.kernel_source() == kernel_source) {
            effect.usage().acquire();
            return Ok(effect);
        }

        let effect = Effect::new(ctx, name, kernel_source, decls)?;
        effect.usage().acquire();
        self.pool.add(Arc::clone(&effect));
        Ok(effect)
    }

    /// Drops every effect without users.
    pub fn clean_up(&self) -> usize {
        self.pool.clean_up()
    }
}

impl Default for EffectPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool of tile textures, keyed by format and size.
pub struct TexturePool {
    pool: ResourcePool<Texture>,
}

impl TexturePool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            pool: ResourcePool::new(),
        }
    }

    /// The underlying resource pool.
    #[inline]
    pub fn pool(&self) -> &ResourcePool<Texture> {
        &self.pool
    }

    /// Returns an unused pooled texture of that shape, or creates a
    /// fresh one. The caller is registered as a user; pair with
    /// `usage().release()`.
    pub fn acquire(
        &self,
        ctx: &Context,
        format: PixelFormat,
        width: i32,
        height: i32,
    ) -> FxResult<Arc<Texture>> {
        if let Some(texture) = self.pool.acquire_where(|t| {
            t.format() == format && t.width() == width && t.height() == height
        }) {
            return Ok(texture);
        }

        let texture = Texture::new(ctx, format, width, height)?;
        texture.usage().acquire();
        self.pool.add(Arc::clone(&texture));
        Ok(texture)
    }

    /// Drops every texture without users.
    pub fn clean_up(&self) -> usize {
        self.pool.clean_up()
    }

    /// Device-side bytes across pooled textures.
    pub fn total_gpu_memory_consumption(&self) -> usize {
        self.pool.total_gpu_memory_consumption()
    }
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new()
    }
}
