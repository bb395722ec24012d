//! The CPU backend device.
//!
//! Owns the bounded worker pool, the shared buffer allocator, and the
//! accounting for every image object and pixel array it created.
//! `synchronize()` is the only blocking join: kernel jobs submitted to
//! the worker pool have no ordering guarantee until then.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use raster_core::{PixelFormat, StdDynamicPoolAllocator};
use tracing::debug;

use super::image::ImageObject;
use super::pixel_array::PixelArray;
use super::worker::WorkerPool;
use crate::device::{
    ApiBackendDevice, ApiImageObject, BackendId, ImageObject as AnyImageObject,
    PixelArray as AnyPixelArray,
};
use crate::{FxResult, backend::next_object_id};

/// The CPU realization of a backend device.
pub struct BackendDevice {
    token: u64,
    worker: WorkerPool,
    allocator: RwLock<Arc<StdDynamicPoolAllocator>>,
    live_images: Mutex<HashMap<u64, usize>>,
    live_arrays: Mutex<HashMap<u64, usize>>,
}

impl BackendDevice {
    /// Creates a device with a default worker pool and a fresh shared
    /// allocator.
    pub fn new() -> Self {
        Self::with_allocator(Arc::new(StdDynamicPoolAllocator::default()))
    }

    /// Creates a device sharing an existing allocator.
    pub fn with_allocator(allocator: Arc<StdDynamicPoolAllocator>) -> Self {
        Self {
            token: next_object_id(),
            worker: WorkerPool::new(),
            allocator: RwLock::new(allocator),
            live_images: Mutex::new(HashMap::new()),
            live_arrays: Mutex::new(HashMap::new()),
        }
    }

    /// The worker pool running pixel-kernel jobs.
    #[inline]
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.worker
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
            .insert(image.id(), image.byte_size());
    }

    fn register_array(&self, array: &PixelArray) {
        self.live_arrays
            .lock()
            .expect("live set")
            .insert(array.id(), array.byte_size());
    }
}

impl Default for BackendDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiBackendDevice for BackendDevice {
    fn synchronize(&self) {
        self.worker.wait_idle();
    }

    fn create_pixel_array(&self) -> FxResult<AnyPixelArray> {
        let array = PixelArray::with_owner(self.token);
        self.register_array(&array);
        Ok(AnyPixelArray::Cpu(array))
    }

    fn create_pixel_array_with_len(
        &self,
        format: PixelFormat,
        length: usize,
    ) -> FxResult<AnyPixelArray> {
        let mut array = PixelArray::with_owner(self.token);
        array.reset_with_len(format, length);
        self.register_array(&array);
        Ok(AnyPixelArray::Cpu(array))
    }

    fn create_pixel_array_with_data(
        &self,
        format: PixelFormat,
        length: usize,
        data: &[u8],
    ) -> FxResult<AnyPixelArray> {
        let mut array = PixelArray::with_owner(self.token);

        if !array.reset_with_data(format, length, data) {
            return Err(raster_core::Error::BufferSizeMismatch {
                expected: length * format.pixel_size(),
                actual: data.len(),
            }
            .into());
        }

        self.register_array(&array);
        Ok(AnyPixelArray::Cpu(array))
    }

    fn create_image(&self) -> FxResult<AnyImageObject> {
        let image = ImageObject::with_allocator(Some(self.allocator()), self.token);
        self.register_image(&image);
        Ok(AnyImageObject::Cpu(image))
    }

    fn create_image_sized(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
    ) -> FxResult<AnyImageObject> {
        let mut image = ImageObject::with_allocator(Some(self.allocator()), self.token);
        image.create(format, width, height)?;
        self.register_image(&image);
        Ok(AnyImageObject::Cpu(image))
    }

    fn create_image_with_data(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<AnyImageObject> {
        let mut image = ImageObject::with_allocator(Some(self.allocator()), self.token);
        image.create_from_data(format, width, height, data)?;
        self.register_image(&image);
        Ok(AnyImageObject::Cpu(image))
    }

    fn destroy_image(&self, image: &mut AnyImageObject) -> bool {
        let AnyImageObject::Cpu(cpu_image) = image else {
            debug!("destroy_image rejected: wrong backend");
            return false;
        };

        if cpu_image.owner() != self.token {
            debug!("destroy_image rejected: object not owned by this device");
            return false;
        }

        if self
            .live_images
            .lock()
            .expect("live set")
            .remove(&cpu_image.id())
            .is_none()
        {
            debug!("destroy_image rejected: object already destroyed");
            return false;
        }

        cpu_image.discard_buffers();
        true
    }

    fn destroy_pixel_array(&self, array: &mut AnyPixelArray) -> bool {
        let AnyPixelArray::Cpu(cpu_array) = array else {
            debug!("destroy_pixel_array rejected: wrong backend");
            return false;
        };

        if cpu_array.owner() != self.token {
            debug!("destroy_pixel_array rejected: object not owned by this device");
            return false;
        }

        if self
            .live_arrays
            .lock()
            .expect("live set")
            .remove(&cpu_array.id())
            .is_none()
        {
            debug!("destroy_pixel_array rejected: object already destroyed");
            return false;
        }

        crate::device::ApiPixelArray::reset(cpu_array);
        true
    }

    fn managed_memory_consumption(&self) -> usize {
        self.allocator().query_memory_consumption()
    }

    fn backend_memory_consumption(&self) -> usize {
        let images: usize = self.live_images.lock().expect("live set").values().sum();
        let arrays: usize = self.live_arrays.lock().expect("live set").values().sum();
        images + arrays
    }

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn backend_id(&self) -> BackendId {
        BackendId::Cpu
    }

    fn clean_up(&self) -> usize {
        self.allocator().release_unused(0)
    }

    fn allocator(&self) -> Arc<StdDynamicPoolAllocator> {
        Arc::clone(&self.allocator.read().expect("allocator slot"))
    }

    fn set_allocator(&self, allocator: Arc<StdDynamicPoolAllocator>) {
        *self.allocator.write().expect("allocator slot") = allocator;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy() {
        let device = BackendDevice::new();
        let mut image = device
            .create_image_sized(PixelFormat::Rgb8, 16, 16)
            .unwrap();

        assert_eq!(device.count_images(), 1);
        assert!(device.backend_memory_consumption() >= 16 * 16 * 3);

        assert!(device.destroy_image(&mut image));
        assert!(image.is_empty());
        assert_eq!(device.count_images(), 0);

        // a second destroy finds nothing to remove
        assert!(!device.destroy_image(&mut image));
    }

    #[test]
    fn test_destroy_foreign_object_fails() {
        let device_a = BackendDevice::new();
        let device_b = BackendDevice::new();

        let mut image = device_a
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        assert!(!device_b.destroy_image(&mut image));
        assert!(!image.is_empty());
        assert!(device_a.destroy_image(&mut image));
    }

    #[test]
    fn test_pixel_array_lifecycle() {
        let device = BackendDevice::new();
        let lut = [0u8, 64, 128, 255];
        let mut array = device
            .create_pixel_array_with_data(PixelFormat::Mono8, 4, &lut)
            .unwrap();

        assert_eq!(device.count_pixel_arrays(), 1);
        assert!(device.destroy_pixel_array(&mut array));
        assert_eq!(device.count_pixel_arrays(), 0);
    }

    #[test]
    fn test_images_draw_from_shared_allocator() {
        let device = BackendDevice::new();
        let _image = device
            .create_image_sized(PixelFormat::Rgba8, 32, 32)
            .unwrap();

        // the plane came out of the pool, so the pool accounts for it
        assert!(device.managed_memory_consumption() >= 32 * 32 * 4);

        // destroy frees the entry; clean_up reclaims it
        let mut image = _image;
        assert!(device.destroy_image(&mut image));
        assert!(device.clean_up() >= 1);
    }

    #[test]
    fn test_allocator_swap() {
        let device = BackendDevice::new();
        let replacement = Arc::new(StdDynamicPoolAllocator::default());
        device.set_allocator(Arc::clone(&replacement));
        assert!(Arc::ptr_eq(&device.allocator(), &replacement));
    }

    #[test]
    fn test_worker_pool_present() {
        let device = BackendDevice::new();
        assert!(device.worker_pool().thread_count() >= 1);
        device.synchronize();
    }
}
