//! The backend interface: devices, image objects, pixel arrays.
//!
//! [`ApiBackendDevice`] and [`ApiImageObject`] define the contract the
//! two backend realizations implement. The [`Device`], [`ImageObject`]
//! and [`PixelArray`] unions tag the realization chosen at
//! construction, so consumers dispatch with a `match` instead of a
//! cast.
//!
//! # Error channels
//!
//! Creation paths return `Result` — a rejected pixel format or a
//! failed GPU device is an error the caller must see. Data-movement
//! paths (`upload`, `retrieve`, `copy`) return `bool`: a `false`
//! means a precondition was violated and nothing was written. Both
//! channels are part of the contract and stay distinct per call site.

use std::sync::Arc;

use raster_core::{Bitmap, BitmapInfo, PixelFormat, Rect32I, StdDynamicPoolAllocator};

use crate::FxResult;
use crate::backend::cpu;
#[cfg(feature = "wgpu")]
use crate::backend::gpu;

/// Identity of an execution backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// The GPU shader path.
    Gpu,
    /// The CPU tiled-kernel path.
    Cpu,
}

impl BackendId {
    /// Stable numeric id, kept for session files that recorded it.
    #[inline]
    pub const fn id(self) -> i32 {
        match self {
            Self::Gpu => 0x10,
            Self::Cpu => 0x20,
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpu => write!(f, "gpu"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// A 2D pixel buffer owned by a backend device.
///
/// Objects are never resized in place: changing format or dimensions
/// requires a fresh `create*` call, which replaces the storage.
pub trait ApiImageObject {
    /// (Re)creates the object with zeroed storage.
    fn create(&mut self, format: PixelFormat, width: i32, height: i32) -> FxResult<()>;

    /// (Re)creates the object from a tightly packed pixel buffer.
    fn create_from_data(
        &mut self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<()>;

    /// (Re)creates the object from a whole bitmap.
    fn create_from_bitmap(&mut self, bitmap: &Bitmap) -> FxResult<()>;

    /// (Re)creates the object from a bitmap region.
    fn create_from_bitmap_region(&mut self, bitmap: &Bitmap, rect: Rect32I) -> FxResult<()>;

    /// (Re)creates zeroed storage shaped like `info`.
    fn create_from_bitmap_info(&mut self, info: &BitmapInfo) -> FxResult<()>;

    /// Copies the whole image into `buffer` (tightly packed).
    fn retrieve(&self, buffer: &mut [u8]) -> bool;

    /// Copies `rect` into `buffer` (tightly packed region).
    fn retrieve_region(&self, buffer: &mut [u8], rect: Rect32I) -> bool;

    /// Copies the whole image into a bitmap of equal shape.
    fn retrieve_bitmap(&self, bitmap: &mut Bitmap) -> bool;

    /// Copies `rect` into the top-left corner of `bitmap`.
    fn retrieve_bitmap_region(&self, bitmap: &mut Bitmap, rect: Rect32I) -> bool;

    /// Overwrites the whole image from a tightly packed buffer.
    fn upload(&mut self, data: &[u8]) -> bool;

    /// Writes a tightly packed `rect`-shaped buffer at
    /// (`dest_x`, `dest_y`).
    fn upload_region(&mut self, data: &[u8], rect: Rect32I, dest_x: i32, dest_y: i32) -> bool;

    /// Overwrites the whole image from a bitmap of equal shape.
    fn upload_bitmap(&mut self, bitmap: &Bitmap) -> bool;

    /// Writes the bitmap region `rect` at (`dest_x`, `dest_y`).
    fn upload_bitmap_region(
        &mut self,
        bitmap: &Bitmap,
        rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool;

    /// Copies `source_rect` out of another image object.
    ///
    /// Same-backend copies move buffers directly; cross-backend
    /// copies round-trip through an allocator-backed temporary —
    /// the canonical CPU↔GPU migration path.
    fn copy(&mut self, source: &ImageObject, source_rect: Rect32I, dest_x: i32, dest_y: i32)
    -> bool;

    /// Drops the pixel storage, leaving the object empty.
    fn discard_buffers(&mut self);

    /// Joins outstanding work on this object.
    fn synchronize(&mut self);

    /// Width in pixels (0 when empty).
    fn width(&self) -> i32;

    /// Height in pixels (0 when empty).
    fn height(&self) -> i32;

    /// Pixel layout ([`PixelFormat::Empty`] when empty).
    fn format(&self) -> PixelFormat;

    /// The owning backend.
    fn backend_id(&self) -> BackendId;

    /// `true` while no storage exists.
    fn is_empty(&self) -> bool;
}

/// A 1D pixel buffer (lookup tables, curve data).
pub trait ApiPixelArray {
    /// Drops the storage.
    fn reset(&mut self);

    /// Element layout.
    fn format(&self) -> PixelFormat;

    /// Length in pixels.
    fn length(&self) -> usize;

    /// `true` while no storage exists.
    fn is_empty(&self) -> bool;

    /// Writes `data` starting at byte `offset`.
    fn upload(&mut self, offset: usize, data: &[u8]) -> bool;

    /// Reads into `buffer` starting at byte `offset`.
    fn retrieve(&self, offset: usize, buffer: &mut [u8]) -> bool;
}

/// An execution context owning image resources and dispatch
/// facilities.
///
/// Devices live for the session. [`clean_up`](Self::clean_up)
/// reclaims unused pool capacity without touching live objects;
/// [`synchronize`](Self::synchronize) is the sole blocking point that
/// joins outstanding asynchronous work.
pub trait ApiBackendDevice {
    /// Blocks until all outstanding asynchronous work finished.
    fn synchronize(&self);

    /// Creates an empty 1D pixel array.
    fn create_pixel_array(&self) -> FxResult<PixelArray>;

    /// Creates a zeroed 1D pixel array of `length` pixels.
    fn create_pixel_array_with_len(
        &self,
        format: PixelFormat,
        length: usize,
    ) -> FxResult<PixelArray>;

    /// Creates a 1D pixel array from `length` pixels of `data`.
    fn create_pixel_array_with_data(
        &self,
        format: PixelFormat,
        length: usize,
        data: &[u8],
    ) -> FxResult<PixelArray>;

    /// Creates an empty image object.
    fn create_image(&self) -> FxResult<ImageObject>;

    /// Creates a zeroed image object.
    fn create_image_sized(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
    ) -> FxResult<ImageObject>;

    /// Creates an image object from a tightly packed pixel buffer.
    fn create_image_with_data(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<ImageObject>;

    /// Destroys an image this device created.
    ///
    /// Returns `false` — and leaves the object untouched — for
    /// resources not owned by this device.
    fn destroy_image(&self, image: &mut ImageObject) -> bool;

    /// Destroys a pixel array this device created; `false` for
    /// foreign resources.
    fn destroy_pixel_array(&self, array: &mut PixelArray) -> bool;

    /// Bytes held by the shared allocator on behalf of this device.
    fn managed_memory_consumption(&self) -> usize;

    /// Bytes held by backend-native storage (buffers, textures).
    fn backend_memory_consumption(&self) -> usize;

    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// The backend's identity tag.
    fn backend_id(&self) -> BackendId;

    /// Releases unused pooled resources; returns how many were freed.
    fn clean_up(&self) -> usize;

    /// The shared buffer allocator.
    fn allocator(&self) -> Arc<StdDynamicPoolAllocator>;

    /// Replaces the shared buffer allocator for future creations.
    fn set_allocator(&self, allocator: Arc<StdDynamicPoolAllocator>);
}

/// Forwards a method call to whichever backend variant is present.
macro_rules! match_backend {
    ($self:expr, $inner:ident => $e:expr) => {
        match $self {
            Self::Cpu($inner) => $e,
            #[cfg(feature = "wgpu")]
            Self::Gpu($inner) => $e,
        }
    };
}

/// A backend device, tagged with its realization at construction.
pub enum Device {
    /// CPU tiled-kernel backend.
    Cpu(cpu::BackendDevice),
    /// GPU shader backend.
    #[cfg(feature = "wgpu")]
    Gpu(gpu::BackendDevice),
}

impl Device {
    /// Creates a CPU device with a default worker pool and allocator.
    pub fn new_cpu() -> Self {
        Self::Cpu(cpu::BackendDevice::new())
    }

    /// Creates a GPU device on the best available adapter.
    #[cfg(feature = "wgpu")]
    pub fn new_gpu() -> FxResult<Self> {
        Ok(Self::Gpu(gpu::BackendDevice::new()?))
    }

    /// The CPU realization, when this is a CPU device.
    pub fn as_cpu(&self) -> Option<&cpu::BackendDevice> {
        match self {
            Self::Cpu(device) => Some(device),
            #[cfg(feature = "wgpu")]
            _ => None,
        }
    }

    /// The GPU realization, when this is a GPU device.
    #[cfg(feature = "wgpu")]
    pub fn as_gpu(&self) -> Option<&gpu::BackendDevice> {
        match self {
            Self::Gpu(device) => Some(device),
            _ => None,
        }
    }
}

impl ApiBackendDevice for Device {
    fn synchronize(&self) {
        match_backend!(self, d => d.synchronize())
    }

    fn create_pixel_array(&self) -> FxResult<PixelArray> {
        match_backend!(self, d => d.create_pixel_array())
    }

    fn create_pixel_array_with_len(
        &self,
        format: PixelFormat,
        length: usize,
    ) -> FxResult<PixelArray> {
        match_backend!(self, d => d.create_pixel_array_with_len(format, length))
    }

    fn create_pixel_array_with_data(
        &self,
        format: PixelFormat,
        length: usize,
        data: &[u8],
    ) -> FxResult<PixelArray> {
        match_backend!(self, d => d.create_pixel_array_with_data(format, length, data))
    }

    fn create_image(&self) -> FxResult<ImageObject> {
        match_backend!(self, d => d.create_image())
    }

    fn create_image_sized(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
    ) -> FxResult<ImageObject> {
        match_backend!(self, d => d.create_image_sized(format, width, height))
    }

    fn create_image_with_data(
        &self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<ImageObject> {
        match_backend!(self, d => d.create_image_with_data(format, width, height, data))
    }

    fn destroy_image(&self, image: &mut ImageObject) -> bool {
        match_backend!(self, d => d.destroy_image(image))
    }

    fn destroy_pixel_array(&self, array: &mut PixelArray) -> bool {
        match_backend!(self, d => d.destroy_pixel_array(array))
    }

    fn managed_memory_consumption(&self) -> usize {
        match_backend!(self, d => d.managed_memory_consumption())
    }

    fn backend_memory_consumption(&self) -> usize {
        match_backend!(self, d => d.backend_memory_consumption())
    }

    fn name(&self) -> &'static str {
        match_backend!(self, d => d.name())
    }

    fn backend_id(&self) -> BackendId {
        match_backend!(self, d => d.backend_id())
    }

    fn clean_up(&self) -> usize {
        match_backend!(self, d => d.clean_up())
    }

    fn allocator(&self) -> Arc<StdDynamicPoolAllocator> {
        match_backend!(self, d => d.allocator())
    }

    fn set_allocator(&self, allocator: Arc<StdDynamicPoolAllocator>) {
        match_backend!(self, d => d.set_allocator(allocator))
    }
}

/// A 2D image object, tagged with its realization at construction.
pub enum ImageObject {
    /// Buffer-backed CPU image.
    Cpu(cpu::ImageObject),
    /// Tiled GPU image.
    #[cfg(feature = "wgpu")]
    Gpu(gpu::ImageObject),
}

impl ImageObject {
    /// The CPU realization, when this is a CPU image.
    pub fn as_cpu(&self) -> Option<&cpu::ImageObject> {
        match self {
            Self::Cpu(image) => Some(image),
            #[cfg(feature = "wgpu")]
            _ => None,
        }
    }

    /// The CPU realization, mutable.
    pub fn as_cpu_mut(&mut self) -> Option<&mut cpu::ImageObject> {
        match self {
            Self::Cpu(image) => Some(image),
            #[cfg(feature = "wgpu")]
            _ => None,
        }
    }

    /// The GPU realization, when this is a GPU image.
    #[cfg(feature = "wgpu")]
    pub fn as_gpu(&self) -> Option<&gpu::ImageObject> {
        match self {
            Self::Gpu(image) => Some(image),
            _ => None,
        }
    }

    /// The GPU realization, mutable.
    #[cfg(feature = "wgpu")]
    pub fn as_gpu_mut(&mut self) -> Option<&mut gpu::ImageObject> {
        match self {
            Self::Gpu(image) => Some(image),
            _ => None,
        }
    }
}

impl ApiImageObject for ImageObject {
    fn create(&mut self, format: PixelFormat, width: i32, height: i32) -> FxResult<()> {
        match_backend!(self, i => i.create(format, width, height))
    }

    fn create_from_data(
        &mut self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<()> {
        match_backend!(self, i => i.create_from_data(format, width, height, data))
    }

    fn create_from_bitmap(&mut self, bitmap: &Bitmap) -> FxResult<()> {
        match_backend!(self, i => i.create_from_bitmap(bitmap))
    }

    fn create_from_bitmap_region(&mut self, bitmap: &Bitmap, rect: Rect32I) -> FxResult<()> {
        match_backend!(self, i => i.create_from_bitmap_region(bitmap, rect))
    }

    fn create_from_bitmap_info(&mut self, info: &BitmapInfo) -> FxResult<()> {
        match_backend!(self, i => i.create_from_bitmap_info(info))
    }

    fn retrieve(&self, buffer: &mut [u8]) -> bool {
        match_backend!(self, i => i.retrieve(buffer))
    }

    fn retrieve_region(&self, buffer: &mut [u8], rect: Rect32I) -> bool {
        match_backend!(self, i => i.retrieve_region(buffer, rect))
    }

    fn retrieve_bitmap(&self, bitmap: &mut Bitmap) -> bool {
        match_backend!(self, i => i.retrieve_bitmap(bitmap))
    }

    fn retrieve_bitmap_region(&self, bitmap: &mut Bitmap, rect: Rect32I) -> bool {
        match_backend!(self, i => i.retrieve_bitmap_region(bitmap, rect))
    }

    fn upload(&mut self, data: &[u8]) -> bool {
        match_backend!(self, i => i.upload(data))
    }

    fn upload_region(&mut self, data: &[u8], rect: Rect32I, dest_x: i32, dest_y: i32) -> bool {
        match_backend!(self, i => i.upload_region(data, rect, dest_x, dest_y))
    }

    fn upload_bitmap(&mut self, bitmap: &Bitmap) -> bool {
        match_backend!(self, i => i.upload_bitmap(bitmap))
    }

    fn upload_bitmap_region(
        &mut self,
        bitmap: &Bitmap,
        rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        match_backend!(self, i => i.upload_bitmap_region(bitmap, rect, dest_x, dest_y))
    }

    fn copy(
        &mut self,
        source: &ImageObject,
        source_rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        match_backend!(self, i => i.copy(source, source_rect, dest_x, dest_y))
    }

    fn discard_buffers(&mut self) {
        match_backend!(self, i => i.discard_buffers())
    }

    fn synchronize(&mut self) {
        match_backend!(self, i => i.synchronize())
    }

    fn width(&self) -> i32 {
        match_backend!(self, i => i.width())
    }

    fn height(&self) -> i32 {
        match_backend!(self, i => i.height())
    }

    fn format(&self) -> PixelFormat {
        match_backend!(self, i => i.format())
    }

    fn backend_id(&self) -> BackendId {
        match_backend!(self, i => i.backend_id())
    }

    fn is_empty(&self) -> bool {
        match_backend!(self, i => i.is_empty())
    }
}

/// A 1D pixel array, tagged with its realization at construction.
pub enum PixelArray {
    /// CPU buffer.
    Cpu(cpu::PixelArray),
    /// GPU 1D texture.
    #[cfg(feature = "wgpu")]
    Gpu(gpu::PixelArray),
}

impl PixelArray {
    /// The CPU realization, when present.
    pub fn as_cpu(&self) -> Option<&cpu::PixelArray> {
        match self {
            Self::Cpu(array) => Some(array),
            #[cfg(feature = "wgpu")]
            _ => None,
        }
    }

    /// The GPU realization, when present.
    #[cfg(feature = "wgpu")]
    pub fn as_gpu(&self) -> Option<&gpu::PixelArray> {
        match self {
            Self::Gpu(array) => Some(array),
            _ => None,
        }
    }
}

impl ApiPixelArray for PixelArray {
    fn reset(&mut self) {
        match_backend!(self, a => a.reset())
    }

    fn format(&self) -> PixelFormat {
        match_backend!(self, a => a.format())
    }

    fn length(&self) -> usize {
        match_backend!(self, a => a.length())
    }

    fn is_empty(&self) -> bool {
        match_backend!(self, a => a.is_empty())
    }

    fn upload(&mut self, offset: usize, data: &[u8]) -> bool {
        match_backend!(self, a => a.upload(offset, data))
    }

    fn retrieve(&self, offset: usize, buffer: &mut [u8]) -> bool {
        match_backend!(self, a => a.retrieve(offset, buffer))
    }
}
