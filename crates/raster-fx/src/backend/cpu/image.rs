//! The CPU image object: a contiguous pixel buffer.
//!
//! Storage comes from the device's shared pool allocator when one is
//! attached, falling back to a plain aligned heap block when the pool
//! cannot serve the request. Construction validates the pixel format
//! against the layouts the CPU kernels are specialized for; everything
//! else (uploads, retrieves, copies) follows the boolean
//! no-partial-writes contract.

use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::Arc;

use raster_core::{Bitmap, BitmapInfo, Blob, PixelFormat, Rect32I, StdDynamicPoolAllocator};
use tracing::debug;

use crate::device::{ApiImageObject, BackendId};
use crate::{FxError, FxResult, ImageObject as AnyImageObject};

/// Pixel layouts the CPU kernel set is specialized for.
pub const SUPPORTED_FORMATS: [PixelFormat; 4] = [
    PixelFormat::Rgb8,
    PixelFormat::Rgba8,
    PixelFormat::Rgb16,
    PixelFormat::Rgba16,
];

/// `true` if the CPU backend has kernels for `format`.
#[inline]
pub fn is_supported_format(format: PixelFormat) -> bool {
    SUPPORTED_FORMATS.contains(&format)
}

/// A 64-byte aligned, zero-initialized heap block.
///
/// The fallback storage when no pool entry is available; alignment
/// matches the pool's so element-typed views work on either.
struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuf {
    const ALIGNMENT: usize = 64;

    fn new(len: usize) -> Self {
        debug_assert!(len > 0);

        let layout = Layout::from_size_align(len, Self::ALIGNMENT).expect("pixel buffer layout");
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).unwrap_or_else(|| alloc::handle_alloc_error(layout));

        Self { ptr, layout }
    }

    #[inline]
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: allocated with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: plain bytes; exclusivity is governed by PixelStore's
// contract.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

enum Storage {
    Pooled(Blob),
    Heap(AlignedBuf),
}

/// Shared pixel storage for one image.
///
/// Kernel jobs hold `Arc` clones of the store, so a buffer can never
/// dangle under in-flight work. There is deliberately no per-buffer
/// lock: the engine contract is single-writer-at-a-time per
/// destination object, with concurrent reads of an unwritten source
/// permitted. Dispatch enforces the writer side by taking the
/// destination `&mut`.
pub struct PixelStore {
    storage: UnsafeCell<Storage>,
    len: usize,
}

// SAFETY: mutation only happens through bytes_mut, whose callers
// uphold the single-writer contract above.
unsafe impl Send for PixelStore {}
unsafe impl Sync for PixelStore {}

impl PixelStore {
    fn new(storage: Storage, len: usize) -> Arc<Self> {
        Arc::new(Self {
            storage: UnsafeCell::new(storage),
            len,
        })
    }

    /// Logical buffer length in bytes (pool entries may be larger).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the store holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The pixel bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: readers may alias; writers are bound by the
        // single-writer contract.
        let storage = unsafe { &*self.storage.get() };
        match storage {
            Storage::Pooled(blob) => &blob.as_slice()[..self.len],
            Storage::Heap(buf) => unsafe { std::slice::from_raw_parts(buf.as_ptr(), self.len) },
        }
    }

    /// The pixel bytes, mutable through a shared reference.
    ///
    /// # Safety
    ///
    /// The caller must be the only writer for the duration of the
    /// borrow, and no reader may observe the written range
    /// concurrently. Dispatch guarantees this by handing each kernel
    /// job a disjoint destination area.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn bytes_mut(&self) -> &mut [u8] {
        let storage = unsafe { &mut *self.storage.get() };
        match storage {
            Storage::Pooled(blob) => &mut blob.as_mut_slice()[..self.len],
            Storage::Heap(buf) => unsafe {
                std::slice::from_raw_parts_mut(buf.as_ptr(), self.len)
            },
        }
    }
}

/// A kernel-facing view of one CPU image.
///
/// Carries the store plus the geometry a kernel needs for stride
/// arithmetic. Cloning is cheap; clones keep the buffer alive across
/// worker threads.
#[derive(Clone)]
pub struct KernelView {
    store: Arc<PixelStore>,
    width: i32,
    height: i32,
    format: PixelFormat,
}

impl KernelView {
    /// Image width — also the pixel stride of every row.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Image height.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Pixel layout.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Row stride in pixels. Kernels must use this — not the area
    /// width — for pointer arithmetic.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize
    }

    /// The raw bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.store.bytes()
    }

    /// The buffer as typed channel elements.
    #[inline]
    pub fn channels<T: bytemuck::Pod>(&self) -> &[T] {
        bytemuck::cast_slice(self.store.bytes())
    }

    /// The buffer as mutable typed channel elements.
    ///
    /// # Safety
    ///
    /// Same single-writer contract as [`PixelStore::bytes_mut`].
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn channels_mut<T: bytemuck::Pod>(&self) -> &mut [T] {
        bytemuck::cast_slice_mut(unsafe { self.store.bytes_mut() })
    }
}

/// A CPU-backed 2D pixel buffer.
pub struct ImageObject {
    store: Option<Arc<PixelStore>>,
    format: PixelFormat,
    width: i32,
    height: i32,
    allocator: Option<Arc<StdDynamicPoolAllocator>>,
    id: u64,
    owner: u64,
}

impl ImageObject {
    /// Creates an empty, unowned image without an allocator.
    pub fn new() -> Self {
        Self {
            store: None,
            format: PixelFormat::Empty,
            width: 0,
            height: 0,
            allocator: None,
            id: super::super::next_object_id(),
            owner: 0,
        }
    }

    pub(crate) fn with_allocator(
        allocator: Option<Arc<StdDynamicPoolAllocator>>,
        owner: u64,
    ) -> Self {
        Self {
            allocator,
            owner,
            ..Self::new()
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    /// Byte size of the pixel plane (0 when empty).
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.len())
    }

    /// `true` while the image draws its storage from the pool.
    pub fn contains_allocator(&self) -> bool {
        self.allocator.is_some()
    }

    /// The kernel-facing view, when storage exists.
    pub fn kernel_view(&self) -> Option<KernelView> {
        self.store.as_ref().map(|store| KernelView {
            store: Arc::clone(store),
            width: self.width,
            height: self.height,
            format: self.format,
        })
    }

    /// The pixel bytes, when storage exists.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.store.as_ref().map(|s| s.bytes())
    }

    fn bounds(&self) -> Rect32I {
        Rect32I::from_size(self.width, self.height)
    }

    fn validate_create(format: PixelFormat, width: i32, height: i32) -> FxResult<usize> {
        if !is_supported_format(format) {
            return Err(FxError::unsupported_format(format));
        }

        if width <= 0 || height <= 0 {
            return Err(raster_core::Error::invalid_dimensions(
                width,
                height,
                "image extents must be positive",
            )
            .into());
        }

        Ok(format.plane_byte_size(width as usize, height as usize))
    }

    fn allocate(&mut self, format: PixelFormat, width: i32, height: i32) -> FxResult<()> {
        let len = Self::validate_create(format, width, height)?;

        let storage = match &self.allocator {
            Some(pool) => match pool.alloc(len) {
                Ok(mut blob) => {
                    blob.as_mut_slice()[..len].fill(0);
                    Storage::Pooled(blob)
                }
                Err(err) => {
                    debug!("pool allocation of {len} bytes failed, using heap: {err}");
                    Storage::Heap(AlignedBuf::new(len))
                }
            },
            None => Storage::Heap(AlignedBuf::new(len)),
        };

        self.store = Some(PixelStore::new(storage, len));
        self.format = format;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn copy_rows(
        &mut self,
        data: &[u8],
        data_stride_px: usize,
        src_origin: (i32, i32),
        dest: Rect32I,
    ) {
        let pixel = self.format.pixel_size();
        let dst_stride = self.width as usize * pixel;
        let src_stride = data_stride_px * pixel;
        let row_len = dest.width as usize * pixel;

        let store = self.store.as_ref().expect("storage present");
        // SAFETY: &mut self makes this call the only writer.
        let bytes = unsafe { store.bytes_mut() };

        for dy in 0..dest.height {
            let src_off =
                (src_origin.1 + dy) as usize * src_stride + src_origin.0 as usize * pixel;
            let dst_off = (dest.y + dy) as usize * dst_stride + dest.x as usize * pixel;
            bytes[dst_off..dst_off + row_len]
                .copy_from_slice(&data[src_off..src_off + row_len]);
        }
    }

    fn read_rows(&self, source: Rect32I, buffer: &mut [u8], buffer_stride_px: usize) {
        let pixel = self.format.pixel_size();
        let src_stride = self.width as usize * pixel;
        let out_stride = buffer_stride_px * pixel;
        let row_len = source.width as usize * pixel;

        let bytes = self.store.as_ref().expect("storage present").bytes();

        for dy in 0..source.height {
            let src_off = (source.y + dy) as usize * src_stride + source.x as usize * pixel;
            let dst_off = dy as usize * out_stride;
            buffer[dst_off..dst_off + row_len]
                .copy_from_slice(&bytes[src_off..src_off + row_len]);
        }
    }

    fn copy_from_cpu(
        &mut self,
        source: &ImageObject,
        source_rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        let pixel = self.format.pixel_size();
        let src_view = match source.kernel_view() {
            Some(view) => view,
            None => return false,
        };

        let dst_store = self.store.as_ref().expect("storage present");
        let dst_stride = self.width as usize * pixel;
        let src_stride = source.width as usize * pixel;
        let row_len = source_rect.width as usize * pixel;

        // SAFETY: &mut self makes this call the only writer.
        let dst = unsafe { dst_store.bytes_mut() };
        let src = src_view.bytes();

        for dy in 0..source_rect.height {
            let src_off =
                (source_rect.y + dy) as usize * src_stride + source_rect.x as usize * pixel;
            let dst_off = (dest_y + dy) as usize * dst_stride + dest_x as usize * pixel;
            dst[dst_off..dst_off + row_len].copy_from_slice(&src[src_off..src_off + row_len]);
        }

        true
    }

    fn copy_cross_backend(
        &mut self,
        source: &AnyImageObject,
        source_rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        let bytes = self
            .format
            .plane_byte_size(source_rect.width as usize, source_rect.height as usize);

        // stage through the shared pool where possible
        if let Some(pool) = self.allocator.clone() {
            if let Ok(mut blob) = pool.alloc(bytes) {
                let staging = &mut blob.as_mut_slice()[..bytes];
                return source.retrieve_region(staging, source_rect)
                    && self.upload_region(staging, source_rect, dest_x, dest_y);
            }
        }

        let mut staging = vec![0u8; bytes];
        source.retrieve_region(&mut staging, source_rect)
            && self.upload_region(&staging, source_rect, dest_x, dest_y)
    }
}

impl Default for ImageObject {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiImageObject for ImageObject {
    fn create(&mut self, format: PixelFormat, width: i32, height: i32) -> FxResult<()> {
        self.allocate(format, width, height)
    }

    fn create_from_data(
        &mut self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<()> {
        let len = Self::validate_create(format, width, height)?;

        if data.len() != len {
            return Err(raster_core::Error::BufferSizeMismatch {
                expected: len,
                actual: data.len(),
            }
            .into());
        }

        self.allocate(format, width, height)?;
        self.copy_rows(
            data,
            width as usize,
            (0, 0),
            Rect32I::from_size(width, height),
        );
        Ok(())
    }

    fn create_from_bitmap(&mut self, bitmap: &Bitmap) -> FxResult<()> {
        self.create_from_data(bitmap.format(), bitmap.width(), bitmap.height(), bitmap.data())
    }

    fn create_from_bitmap_region(&mut self, bitmap: &Bitmap, rect: Rect32I) -> FxResult<()> {
        let bitmap_bounds = Rect32I::from_size(bitmap.width(), bitmap.height());

        if !bitmap_bounds.contains_rect(&rect) || rect.is_empty() {
            return Err(raster_core::Error::invalid_region(
                rect,
                bitmap.width(),
                bitmap.height(),
            )
            .into());
        }

        self.allocate(bitmap.format(), rect.width, rect.height)?;
        self.copy_rows(
            bitmap.data(),
            bitmap.width() as usize,
            (rect.x, rect.y),
            Rect32I::from_size(rect.width, rect.height),
        );
        Ok(())
    }

    fn create_from_bitmap_info(&mut self, info: &BitmapInfo) -> FxResult<()> {
        self.allocate(info.format, info.width, info.height)
    }

    fn retrieve(&self, buffer: &mut [u8]) -> bool {
        if self.is_empty() {
            debug!("retrieve rejected: image is empty");
            return false;
        }

        if buffer.len() != self.byte_size() {
            debug!(
                "retrieve rejected: buffer holds {} bytes, image {}",
                buffer.len(),
                self.byte_size()
            );
            return false;
        }

        buffer.copy_from_slice(self.store.as_ref().expect("storage present").bytes());
        true
    }

    fn retrieve_region(&self, buffer: &mut [u8], rect: Rect32I) -> bool {
        if self.is_empty() || rect.is_empty() || !self.bounds().contains_rect(&rect) {
            debug!("retrieve_region rejected: {rect} outside {}x{}", self.width, self.height);
            return false;
        }

        let expected = self
            .format
            .plane_byte_size(rect.width as usize, rect.height as usize);
        if buffer.len() != expected {
            debug!(
                "retrieve_region rejected: buffer holds {} bytes, region needs {expected}",
                buffer.len()
            );
            return false;
        }

        self.read_rows(rect, buffer, rect.width as usize);
        true
    }

    fn retrieve_bitmap(&self, bitmap: &mut Bitmap) -> bool {
        if self.is_empty()
            || bitmap.format() != self.format
            || bitmap.width() != self.width
            || bitmap.height() != self.height
        {
            debug!("retrieve_bitmap rejected: shape mismatch");
            return false;
        }

        let bytes = self.store.as_ref().expect("storage present").bytes();
        bitmap.data_mut().copy_from_slice(bytes);
        true
    }

    fn retrieve_bitmap_region(&self, bitmap: &mut Bitmap, rect: Rect32I) -> bool {
        if self.is_empty()
            || rect.is_empty()
            || bitmap.format() != self.format
            || !self.bounds().contains_rect(&rect)
            || bitmap.width() < rect.width
            || bitmap.height() < rect.height
        {
            debug!("retrieve_bitmap_region rejected: {rect} does not fit");
            return false;
        }

        let stride_px = bitmap.width() as usize;
        self.read_rows(rect, bitmap.data_mut(), stride_px);
        true
    }

    fn upload(&mut self, data: &[u8]) -> bool {
        if self.is_empty() {
            debug!("upload rejected: image is empty");
            return false;
        }

        if data.len() != self.byte_size() {
            debug!(
                "upload rejected: buffer holds {} bytes, image {}",
                data.len(),
                self.byte_size()
            );
            return false;
        }

        let (width, height) = (self.width, self.height);
        self.copy_rows(data, width as usize, (0, 0), Rect32I::from_size(width, height));
        true
    }

    fn upload_region(&mut self, data: &[u8], rect: Rect32I, dest_x: i32, dest_y: i32) -> bool {
        let dest = Rect32I::new(dest_x, dest_y, rect.width, rect.height);

        if self.is_empty() || rect.is_empty() || !self.bounds().contains_rect(&dest) {
            debug!("upload_region rejected: {dest} outside {}x{}", self.width, self.height);
            return false;
        }

        let expected = self
            .format
            .plane_byte_size(rect.width as usize, rect.height as usize);
        if data.len() != expected {
            debug!(
                "upload_region rejected: buffer holds {} bytes, region needs {expected}",
                data.len()
            );
            return false;
        }

        self.copy_rows(data, rect.width as usize, (0, 0), dest);
        true
    }

    fn upload_bitmap(&mut self, bitmap: &Bitmap) -> bool {
        if self.is_empty()
            || bitmap.format() != self.format
            || bitmap.width() != self.width
            || bitmap.height() != self.height
        {
            debug!("upload_bitmap rejected: shape mismatch");
            return false;
        }

        self.upload(bitmap.data())
    }

    fn upload_bitmap_region(
        &mut self,
        bitmap: &Bitmap,
        rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        let bitmap_bounds = Rect32I::from_size(bitmap.width(), bitmap.height());
        let dest = Rect32I::new(dest_x, dest_y, rect.width, rect.height);

        if self.is_empty()
            || rect.is_empty()
            || bitmap.format() != self.format
            || !bitmap_bounds.contains_rect(&rect)
            || !self.bounds().contains_rect(&dest)
        {
            debug!("upload_bitmap_region rejected: {rect} -> {dest} does not fit");
            return false;
        }

        self.copy_rows(bitmap.data(), bitmap.width() as usize, (rect.x, rect.y), dest);
        true
    }

    fn copy(
        &mut self,
        source: &AnyImageObject,
        source_rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        if self.is_empty() || source.is_empty() || source_rect.is_empty() {
            debug!("copy rejected: empty operand");
            return false;
        }

        if source.format() != self.format {
            debug!(
                "copy rejected: source format {} != destination {}",
                source.format(),
                self.format
            );
            return false;
        }

        let source_bounds = Rect32I::from_size(source.width(), source.height());
        if !source_bounds.contains_rect(&source_rect) {
            debug!("copy rejected: {source_rect} outside source bounds");
            return false;
        }

        if dest_x < 0
            || dest_y < 0
            || dest_x + source_rect.width > self.width
            || dest_y + source_rect.height > self.height
        {
            debug!("copy rejected: region does not fit destination at ({dest_x}, {dest_y})");
            return false;
        }

        match source {
            AnyImageObject::Cpu(src) => self.copy_from_cpu(src, source_rect, dest_x, dest_y),
            #[cfg(feature = "wgpu")]
            AnyImageObject::Gpu(_) => {
                self.copy_cross_backend(source, source_rect, dest_x, dest_y)
            }
        }
    }

    fn discard_buffers(&mut self) {
        self.store = None;
        self.format = PixelFormat::Empty;
        self.width = 0;
        self.height = 0;
    }

    fn synchronize(&mut self) {
        // buffer writes are immediate on this backend; kept for
        // interface symmetry
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn backend_id(&self) -> BackendId {
        BackendId::Cpu
    }

    fn is_empty(&self) -> bool {
        self.store.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_image(format: PixelFormat, w: i32, h: i32, byte: u8) -> ImageObject {
        let mut image = ImageObject::new();
        let data = vec![byte; format.plane_byte_size(w as usize, h as usize)];
        image.create_from_data(format, w, h, &data).unwrap();
        image
    }

    #[test]
    fn test_create_validates_format() {
        let mut image = ImageObject::new();
        assert!(matches!(
            image.create(PixelFormat::Mono32F, 4, 4),
            Err(FxError::UnsupportedFormat { .. })
        ));
        assert!(image.create(PixelFormat::Rgb8, 4, 4).is_ok());
        assert!(!image.is_empty());
        assert_eq!(image.byte_size(), 48);
    }

    #[test]
    fn test_create_validates_dimensions() {
        let mut image = ImageObject::new();
        assert!(image.create(PixelFormat::Rgb8, 0, 4).is_err());
        assert!(image.create(PixelFormat::Rgb8, 4, -2).is_err());
    }

    #[test]
    fn test_upload_retrieve_round_trip() {
        for format in SUPPORTED_FORMATS {
            let mut image = ImageObject::new();
            image.create(format, 8, 8).unwrap();

            let len = image.byte_size();
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            assert!(image.upload(&data));

            let mut out = vec![0u8; len];
            assert!(image.retrieve(&mut out));
            assert_eq!(out, data, "round trip broken for {format}");
        }
    }

    #[test]
    fn test_region_round_trip_uses_stride() {
        let mut image = filled_image(PixelFormat::Rgb8, 8, 8, 0);

        let rect = Rect32I::new(2, 3, 3, 2);
        let patch: Vec<u8> = (0..rect.area() as usize * 3).map(|i| i as u8 + 1).collect();
        assert!(image.upload_region(&patch, rect, 2, 3));

        let mut out = vec![0u8; patch.len()];
        assert!(image.retrieve_region(&mut out, rect));
        assert_eq!(out, patch);

        // pixels outside the region stay untouched
        let mut whole = vec![0u8; image.byte_size()];
        assert!(image.retrieve(&mut whole));
        assert_eq!(whole[0], 0);
        let off = image.format().pixel_size() * (3 * 8 + 1);
        assert_eq!(whole[off], 0);
    }

    #[test]
    fn test_region_validation_never_partially_writes() {
        let mut image = filled_image(PixelFormat::Rgb8, 4, 4, 7);

        let rect = Rect32I::new(2, 2, 4, 4);
        let patch = vec![0u8; 48];
        assert!(!image.upload_region(&patch, rect, 2, 2));

        let mut out = vec![0u8; image.byte_size()];
        assert!(image.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 7), "rejected upload wrote bytes");
    }

    #[test]
    fn test_wrong_buffer_length_is_rejected() {
        let image = filled_image(PixelFormat::Rgb8, 4, 4, 1);
        let mut short = vec![0u8; 10];
        assert!(!image.retrieve(&mut short));
    }

    #[test]
    fn test_bitmap_round_trip() {
        let mut bitmap = Bitmap::new(PixelFormat::Rgba8, 4, 4).unwrap();
        bitmap.fill(&[1, 2, 3, 4]).unwrap();

        let mut image = ImageObject::new();
        image.create_from_bitmap(&bitmap).unwrap();

        let mut out = Bitmap::new(PixelFormat::Rgba8, 4, 4).unwrap();
        assert!(image.retrieve_bitmap(&mut out));
        assert_eq!(out, bitmap);
    }

    #[test]
    fn test_create_from_bitmap_region() {
        let mut bitmap = Bitmap::new(PixelFormat::Rgb8, 8, 8).unwrap();
        bitmap.fill(&[5, 6, 7]).unwrap();

        let mut image = ImageObject::new();
        image
            .create_from_bitmap_region(&bitmap, Rect32I::new(2, 2, 3, 4))
            .unwrap();
        assert_eq!((image.width(), image.height()), (3, 4));

        let mut out = vec![0u8; image.byte_size()];
        assert!(image.retrieve(&mut out));
        assert!(out.chunks(3).all(|px| px == [5, 6, 7]));
    }

    #[test]
    fn test_copy_same_backend() {
        let src = AnyImageObject::Cpu(filled_image(PixelFormat::Rgb8, 4, 4, 9));
        let mut dst = filled_image(PixelFormat::Rgb8, 8, 8, 0);

        assert!(dst.copy(&src, Rect32I::from_size(4, 4), 2, 2));

        let mut out = vec![0u8; dst.byte_size()];
        assert!(dst.retrieve(&mut out));
        let px = |x: usize, y: usize| out[(y * 8 + x) * 3];
        assert_eq!(px(2, 2), 9);
        assert_eq!(px(5, 5), 9);
        assert_eq!(px(1, 2), 0);
        assert_eq!(px(6, 2), 0);
    }

    #[test]
    fn test_copy_rejects_format_mismatch() {
        let src = AnyImageObject::Cpu(filled_image(PixelFormat::Rgba8, 4, 4, 9));
        let mut dst = filled_image(PixelFormat::Rgb8, 8, 8, 0);
        assert!(!dst.copy(&src, Rect32I::from_size(4, 4), 0, 0));
    }

    #[test]
    fn test_copy_rejects_oversized_destination_offset() {
        let src = AnyImageObject::Cpu(filled_image(PixelFormat::Rgb8, 4, 4, 9));
        let mut dst = filled_image(PixelFormat::Rgb8, 8, 8, 0);

        // 4 wide at x=5 ends at 9 > 8
        assert!(!dst.copy(&src, Rect32I::from_size(4, 4), 5, 0));
        assert!(!dst.copy(&src, Rect32I::from_size(4, 4), 0, 6));
        assert!(dst.copy(&src, Rect32I::from_size(4, 4), 4, 4));
    }

    #[test]
    fn test_discard_buffers() {
        let mut image = filled_image(PixelFormat::Rgb8, 4, 4, 1);
        image.discard_buffers();
        assert!(image.is_empty());
        assert_eq!(image.format(), PixelFormat::Empty);
        assert_eq!(image.width(), 0);
    }

    #[test]
    fn test_kernel_view_stride() {
        let image = filled_image(PixelFormat::Rgb8, 6, 3, 2);
        let view = image.kernel_view().unwrap();
        assert_eq!(view.stride(), 6);
        assert_eq!(view.bytes().len(), 6 * 3 * 3);
        assert_eq!(view.channels::<u8>().len(), 6 * 3 * 3);
    }
}
