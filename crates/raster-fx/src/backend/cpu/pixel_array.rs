//! 1D pixel buffers on the CPU backend.
//!
//! Pixel arrays hold lookup data — baked tone curves, weight tables —
//! that kernels index per channel value.

use raster_core::PixelFormat;
use tracing::debug;

use crate::device::ApiPixelArray;

/// A 1D typed pixel buffer.
pub struct PixelArray {
    format: PixelFormat,
    length: usize,
    data: Vec<u8>,
    id: u64,
    owner: u64,
}

impl PixelArray {
    /// Creates an empty, unowned array.
    pub fn new() -> Self {
        Self {
            format: PixelFormat::Empty,
            length: 0,
            data: Vec::new(),
            id: super::super::next_object_id(),
            owner: 0,
        }
    }

    pub(crate) fn with_owner(owner: u64) -> Self {
        Self {
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

    /// (Re)creates zeroed storage for `length` pixels.
    pub fn reset_with_len(&mut self, format: PixelFormat, length: usize) {
        self.format = format;
        self.length = length;
        self.data = vec![0; length * format.pixel_size()];
    }

    /// (Re)creates storage holding `length` pixels of `data`.
    pub fn reset_with_data(&mut self, format: PixelFormat, length: usize, data: &[u8]) -> bool {
        let bytes = length * format.pixel_size();
        if data.len() != bytes {
            debug!(
                "pixel array reset rejected: {} bytes given, {bytes} needed",
                data.len()
            );
            return false;
        }

        self.format = format;
        self.length = length;
        self.data = data.to_vec();
        true
    }

    /// Total byte size of the buffer.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// The raw bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// The buffer as typed elements.
    #[inline]
    pub fn elements<T: bytemuck::Pod>(&self) -> &[T] {
        bytemuck::cast_slice(&self.data)
    }
}

impl Default for PixelArray {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiPixelArray for PixelArray {
    fn reset(&mut self) {
        self.format = PixelFormat::Empty;
        self.length = 0;
        self.data = Vec::new();
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn length(&self) -> usize {
        self.length
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn upload(&mut self, offset: usize, data: &[u8]) -> bool {
        let end = offset + data.len();
        if end > self.data.len() {
            debug!("pixel array upload rejected: {end} exceeds {}", self.data.len());
            return false;
        }

        self.data[offset..end].copy_from_slice(data);
        true
    }

    fn retrieve(&self, offset: usize, buffer: &mut [u8]) -> bool {
        let end = offset + buffer.len();
        if end > self.data.len() {
            debug!("pixel array retrieve rejected: {end} exceeds {}", self.data.len());
            return false;
        }

        buffer.copy_from_slice(&self.data[offset..end]);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_and_upload() {
        let mut array = PixelArray::new();
        assert!(array.is_empty());

        array.reset_with_len(PixelFormat::Mono8, 256);
        assert_eq!(array.length(), 256);
        assert_eq!(array.byte_size(), 256);

        assert!(array.upload(10, &[1, 2, 3]));
        let mut out = [0u8; 3];
        assert!(array.retrieve(10, &mut out));
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn test_bounds_rejected() {
        let mut array = PixelArray::new();
        array.reset_with_len(PixelFormat::Mono8, 16);

        assert!(!array.upload(15, &[0, 0]));
        let mut out = [0u8; 4];
        assert!(!array.retrieve(14, &mut out));
    }

    #[test]
    fn test_float_elements() {
        let mut array = PixelArray::new();
        let lut: Vec<f32> = (0..8).map(|i| i as f32 / 7.0).collect();
        assert!(array.reset_with_data(
            PixelFormat::Mono32F,
            lut.len(),
            bytemuck::cast_slice(&lut)
        ));
        assert_eq!(array.elements::<f32>(), &lut[..]);
    }
}
