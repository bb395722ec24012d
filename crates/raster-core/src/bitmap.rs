//! CPU-side bitmaps: the import/export exchange type.
//!
//! A [`Bitmap`] is the triple the engine exchanges with file I/O
//! collaborators — a fully populated byte buffer plus format and
//! dimensions. Image objects upload from and retrieve into bitmaps;
//! nothing here knows about codecs.

use crate::{Error, PixelFormat, Rect32I, Result};

/// Format and dimensions without pixel data.
///
/// Used to create image objects sized like a bitmap that has not been
/// loaded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapInfo {
    /// Pixel layout.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl BitmapInfo {
    /// Creates a new info triple.
    #[inline]
    pub const fn new(format: PixelFormat, width: i32, height: i32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }
}

/// An owned pixel buffer with format and dimensions.
///
/// Rows are tightly packed: the stride is always
/// `width * format.pixel_size()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    format: PixelFormat,
    width: i32,
    height: i32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Creates a zero-filled bitmap.
    pub fn new(format: PixelFormat, width: i32, height: i32) -> Result<Self> {
        if format == PixelFormat::Empty {
            return Err(Error::unsupported_format(format));
        }

        if width <= 0 || height <= 0 {
            return Err(Error::invalid_dimensions(
                width,
                height,
                "bitmap extents must be positive",
            ));
        }

        let len = format.plane_byte_size(width as usize, height as usize);
        Ok(Self {
            format,
            width,
            height,
            data: vec![0; len],
        })
    }

    /// Creates a bitmap taking ownership of `data`.
    ///
    /// The buffer length must match the plane size exactly.
    pub fn from_data(format: PixelFormat, width: i32, height: i32, data: Vec<u8>) -> Result<Self> {
        let bitmap = Self::new(format, width, height)?;
        let expected = bitmap.size_in_bytes();

        if data.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { data, ..bitmap })
    }

    /// Creates a zero-filled bitmap from an info triple.
    pub fn from_info(info: &BitmapInfo) -> Result<Self> {
        Self::new(info.format, info.width, info.height)
    }

    /// Pixel layout.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Format and dimensions as an info triple.
    #[inline]
    pub fn info(&self) -> BitmapInfo {
        BitmapInfo::new(self.format, self.width, self.height)
    }

    /// `true` if the bitmap holds no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total buffer length in bytes.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    /// Row stride in bytes.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.pixel_size()
    }

    /// The whole buffer.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The whole buffer, mutable.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One row of pixels.
    #[inline]
    pub fn row(&self, y: i32) -> &[u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// One row of pixels, mutable.
    #[inline]
    pub fn row_mut(&mut self, y: i32) -> &mut [u8] {
        let stride = self.stride();
        let start = y as usize * stride;
        &mut self.data[start..start + stride]
    }

    /// Byte offset of the pixel at (x, y).
    #[inline]
    pub fn pixel_offset(&self, x: i32, y: i32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.pixel_size()
    }

    /// The bytes of the pixel at (x, y).
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> &[u8] {
        let offset = self.pixel_offset(x, y);
        &self.data[offset..offset + self.format.pixel_size()]
    }

    /// Writes `pixel` into every pixel of the bitmap.
    ///
    /// The pattern length must equal the pixel size.
    pub fn fill(&mut self, pixel: &[u8]) -> Result<()> {
        let size = self.format.pixel_size();

        if pixel.len() != size {
            return Err(Error::BufferSizeMismatch {
                expected: size,
                actual: pixel.len(),
            });
        }

        for chunk in self.data.chunks_exact_mut(size) {
            chunk.copy_from_slice(pixel);
        }

        Ok(())
    }

    /// Copies `source_rect` from `source` to (dest_x, dest_y).
    ///
    /// Formats must match and both rectangles must lie fully inside
    /// their bitmaps; nothing is written otherwise.
    pub fn copy_region(
        &mut self,
        source: &Bitmap,
        source_rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> Result<()> {
        if self.format != source.format {
            return Err(Error::unsupported_format(source.format));
        }

        let source_bounds = Rect32I::from_size(source.width, source.height);
        if !source_bounds.contains_rect(&source_rect) {
            return Err(Error::invalid_region(source_rect, source.width, source.height));
        }

        let dest_rect = Rect32I::new(dest_x, dest_y, source_rect.width, source_rect.height);
        let dest_bounds = Rect32I::from_size(self.width, self.height);
        if !dest_bounds.contains_rect(&dest_rect) {
            return Err(Error::invalid_region(dest_rect, self.width, self.height));
        }

        let pixel_size = self.format.pixel_size();
        let row_len = source_rect.width as usize * pixel_size;

        for dy in 0..source_rect.height {
            let src_off = source.pixel_offset(source_rect.x, source_rect.y + dy);
            let dst_off = self.pixel_offset(dest_x, dest_y + dy);
            self.data[dst_off..dst_off + row_len]
                .copy_from_slice(&source.data[src_off..src_off + row_len]);
        }

        Ok(())
    }

    /// A new bitmap holding the pixels of `rect`.
    pub fn crop(&self, rect: Rect32I) -> Result<Bitmap> {
        let mut out = Bitmap::new(self.format, rect.width, rect.height)?;
        out.copy_region(self, rect, 0, 0)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_input() {
        assert!(Bitmap::new(PixelFormat::Empty, 4, 4).is_err());
        assert!(Bitmap::new(PixelFormat::Rgb8, 0, 4).is_err());
        assert!(Bitmap::new(PixelFormat::Rgb8, 4, -1).is_err());
    }

    #[test]
    fn test_from_data_length_check() {
        let ok = Bitmap::from_data(PixelFormat::Rgb8, 2, 2, vec![7; 12]);
        assert!(ok.is_ok());

        let bad = Bitmap::from_data(PixelFormat::Rgb8, 2, 2, vec![7; 13]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_fill_and_pixel() {
        let mut bmp = Bitmap::new(PixelFormat::Rgb8, 4, 4).unwrap();
        bmp.fill(&[10, 20, 30]).unwrap();
        assert_eq!(bmp.pixel(3, 3), &[10, 20, 30]);
        assert_eq!(bmp.row(0).len(), 12);
        assert!(bmp.fill(&[1, 2]).is_err());
    }

    #[test]
    fn test_copy_region() {
        let mut src = Bitmap::new(PixelFormat::Rgb8, 4, 4).unwrap();
        src.fill(&[1, 2, 3]).unwrap();

        let mut dst = Bitmap::new(PixelFormat::Rgb8, 8, 8).unwrap();
        dst.copy_region(&src, Rect32I::new(1, 1, 2, 2), 5, 5).unwrap();

        assert_eq!(dst.pixel(5, 5), &[1, 2, 3]);
        assert_eq!(dst.pixel(6, 6), &[1, 2, 3]);
        assert_eq!(dst.pixel(4, 5), &[0, 0, 0]);
        assert_eq!(dst.pixel(7, 5), &[0, 0, 0]);
    }

    #[test]
    fn test_copy_region_out_of_bounds() {
        let src = Bitmap::new(PixelFormat::Rgb8, 4, 4).unwrap();
        let mut dst = Bitmap::new(PixelFormat::Rgb8, 4, 4).unwrap();

        // source rect outside the source
        assert!(dst
            .copy_region(&src, Rect32I::new(2, 2, 4, 4), 0, 0)
            .is_err());
        // destination offset pushes the rect outside the destination
        assert!(dst
            .copy_region(&src, Rect32I::new(0, 0, 2, 2), 3, 3)
            .is_err());
    }

    #[test]
    fn test_crop() {
        let mut src = Bitmap::new(PixelFormat::Rgba8, 4, 4).unwrap();
        src.fill(&[9, 9, 9, 255]).unwrap();
        let cropped = src.crop(Rect32I::new(1, 1, 2, 3)).unwrap();
        assert_eq!(cropped.width(), 2);
        assert_eq!(cropped.height(), 3);
        assert_eq!(cropped.pixel(0, 0), &[9, 9, 9, 255]);
    }
}
