//! The GPU backend device.
//!
//! Owns the wgpu context, the effect and texture pools, the render
//! context (the explicit active-effect slot), and the accounting for
//! every image object and pixel array it created.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use raster_core::{PixelFormat, StdDynamicPoolAllocator};
use tracing::debug;

use super::context::Context;
use super::effect::RenderContext;
use super::image::ImageObject;
use super::pixel_array::PixelArray;
use super::pool::{EffectPool, TexturePool};
use crate::backend::next_object_id;
use crate::device::{
    ApiBackendDevice, ApiImageObject, ApiPixelArray as _, BackendId,
    ImageObject as AnyImageObject, PixelArray as AnyPixelArray,
};
use crate::FxResult;

/// The GPU realization of a backend device.
pub struct BackendDevice {
    token: u64,
    ctx: Arc<Context>,
    effect_pool: Arc<EffectPool>,
    texture_pool: Arc<TexturePool>,
    render_ctx: Mutex<RenderContext>,
    allocator: RwLock<Arc<StdDynamicPoolAllocator>>,
    live_images: Mutex<HashMap<u64, usize>>,
    live_arrays: Mutex<HashMap<u64, usize>>,
}

impl BackendDevice {
    /// Creates a device on the best available adapter.
    pub fn new() -> FxResult<Self> {
        Ok(Self::with_context(Context::new()?))
    }

    /// Creates a device over an existing context.
    pub fn with_context(ctx: Arc<Context>) -> Self {
        Self {
            token: next_object_id(),
            ctx,
            effect_pool: Arc::new(EffectPool::new()),
            texture_pool: Arc::new(TexturePool::new()),
            render_ctx: Mutex::new(RenderContext::new()),
            allocator: RwLock::new(Arc::new(StdDynamicPoolAllocator::default())),
            live_images: Mutex::new(HashMap::new()),
            live_arrays: Mutex::new(HashMap::new()),
        }
    }

    /// `true` when a usable adapter exists.
    pub fn is_available() -> bool {
        Context::is_available()
    }

    /// The wgpu execution context.
    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// The pool of compiled effects.
    #[inline]
    pub fn effect_pool(&self) -> &Arc<EffectPool> {
        &self.effect_pool
    }

    /// The pool of tile textures.
    #[inline]
    pub fn texture_pool(&self) -> &Arc<TexturePool> {
        &self.texture_pool
    }

    /// Locks the render context for a bind/draw/unbind sequence.
    ///
    /// The guard also serializes GPU submission: the command stream is
    /// effectively single-threaded per context.
    pub fn render_context(&self) -> MutexGuard<'_, RenderContext> {
        self.render_ctx.lock().expect("render context")
    }

    /// Number of live image objects created by this device.
    pub fn count_images(&self) -> usize {
        self.live_images.lock().expect("live set").len()
    }

    /// Number of live pixel arrays created by this device.
    pub fn count_pixel_arrays(&self) -> usize {
        self.live_arrays.lock().expect("live set").len()
    }

    fn register_image(&self, image: &ImageObject) {
        self.live_images
            .lock()
            .expect("live set")
            .insert(image.id(), image.gpu_memory_consumption());
    }

    fn register_array(&self, array: &PixelArray) {
        self.live_arrays
            .lock()
            .expect("live set")
            .insert(array.id(), array.byte_size());
    }
}

impl ApiBackendDevice for BackendDevice {
    fn synchronize(&self) {
        self.ctx.wait_idle();
    }

    fn create_pixel_array(&self) -> FxResult<AnyPixelArray> {
        let array = PixelArray::new(Arc::clone(&self.ctx), self.token);
        self.register_array(&array);
        Ok(AnyPixelArray::Gpu(array))
    }

    fn create_pixel_array_with_len(
        &self,
        format: PixelFormat,
        length: usize,
    ) -> FxResult<AnyPixelArray> {
        let mut array = PixelArray::new(Arc::clone(&self.ctx), self.token);
        array.reset_with_len(format, length)?;
        self.register_array(&array);
        Ok(AnyPixelArray::Gpu(array))
    }

    fn create_pixel_array_with_data(
        &self,
        format: PixelFormat,
        length: usize,
        data: &[u8],
    ) -> FxResult<AnyPixelArray> {
        let mut array = PixelArray::new(Arc::clone(&self.ctx), self.token);
        array.reset_with_data(format, length, data)?;
        self.register_array(&array);
        Ok(AnyPixelArray::Gpu(array))
    }

    fn create_image(&self) -> FxResult<AnyImageObject> {
        let image = ImageObject::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.texture_pool),
            self.token,
        );
        self.register_image(&image);
        Ok(AnyImageObject::Gpu(image))
    }

    fn create_image_sized(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
    ) -> FxResult<AnyImageObject> {
        let mut image = ImageObject::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.texture_pool),
            self.token,
        );
        image.create(format, width, height)?;
        self.register_image(&image);
        Ok(AnyImageObject::Gpu(image))
    }

    fn create_image_with_data(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<AnyImageObject> {
        let mut image = ImageObject::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.texture_pool),
            self.token,
        );
        image.create_from_data(format, width, height, data)?;
        self.register_image(&image);
        Ok(AnyImageObject::Gpu(image))
    }

    fn destroy_image(&self, image: &mut AnyImageObject) -> bool {
        let AnyImageObject::Gpu(gpu_image) = image else {
            debug!("destroy_image rejected: wrong backend");
            return false;
        };

        if gpu_image.owner() != self.token {
            debug!("destroy_image rejected: object not owned by this device");
            return false;
        }

        if self
            .live_images
            .lock()
            .expect("live set")
            .remove(&gpu_image.id())
            .is_none()
        {
            debug!("destroy_image rejected: object already destroyed");
            return false;
        }

        gpu_image.discard_buffers();
        true
    }

    fn destroy_pixel_array(&self, array: &mut AnyPixelArray) -> bool {
        let AnyPixelArray::Gpu(gpu_array) = array else {
            debug!("destroy_pixel_array rejected: wrong backend");
            return false;
        };

        if gpu_array.owner() != self.token {
            debug!("destroy_pixel_array rejected: object not owned by this device");
            return false;
        }

        if self
            .live_arrays
            .lock()
            .expect("live set")
            .remove(&gpu_array.id())
            .is_none()
        {
            debug!("destroy_pixel_array rejected: object already destroyed");
            return false;
        }

        gpu_array.reset();
        true
    }

    fn managed_memory_consumption(&self) -> usize {
        self.allocator().query_memory_consumption()
    }

    fn backend_memory_consumption(&self) -> usize {
        let arrays: usize = self.live_arrays.lock().expect("live set").values().sum();
        self.texture_pool.total_gpu_memory_consumption() + arrays
    }

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn backend_id(&self) -> BackendId {
        BackendId::Gpu
    }

    fn clean_up(&self) -> usize {
        self.effect_pool.clean_up()
            + self.texture_pool.clean_up()
            + self.allocator().release_unused(0)
    }

    fn allocator(&self) -> Arc<StdDynamicPoolAllocator> {
        Arc::clone(&self.allocator.read().expect("allocator slot"))
    }

    fn set_allocator(&self, allocator: Arc<StdDynamicPoolAllocator>) {
        *self.allocator.write().expect("allocator slot") = allocator;
    }
}

impl std::fmt::Debug for BackendDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDevice")
            .field("backend", &"gpu")
            .field("images", &self.count_images())
            .finish()
    }
}
