//! GPU tile textures.
//!
//! One [`Texture`] backs one tile of a GPU image. The logical pixel
//! format is the engine's [`PixelFormat`]; on the device, RGB layouts
//! are stored as their RGBA partner (there are no 3-channel color
//! formats on modern APIs), and upload/retrieve pack and unpack the
//! third channel so the external byte contract stays exactly 3
//! channels wide.

use std::sync::Arc;
use std::sync::mpsc;

use raster_core::{PixelFormat, Rect32I};
use tracing::debug;

use super::context::Context;
use super::resource::{GpuResource, UsageCounter};
use crate::{FxError, FxResult};

/// Maps a logical format to the wgpu texture format storing it.
pub(crate) fn device_format(
    format: PixelFormat,
    features: wgpu::Features,
) -> FxResult<wgpu::TextureFormat> {
    use wgpu::TextureFormat as Tf;

    let needs_16bit_norm = matches!(
        format,
        PixelFormat::Mono16
            | PixelFormat::Rgb16
            | PixelFormat::Rgba16
            | PixelFormat::Mono16S
            | PixelFormat::Rgb16S
            | PixelFormat::Rgba16S
    );

    if needs_16bit_norm && !features.contains(wgpu::Features::TEXTURE_FORMAT_16BIT_NORM) {
        return Err(FxError::MissingFeature {
            format: format.to_string(),
            feature: "TEXTURE_FORMAT_16BIT_NORM".into(),
        });
    }

    match format {
        PixelFormat::Mono8 => Ok(Tf::R8Unorm),
        PixelFormat::Mono16 => Ok(Tf::R16Unorm),
        PixelFormat::Mono16S => Ok(Tf::R16Snorm),
        PixelFormat::Mono32F => Ok(Tf::R32Float),
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => Ok(Tf::Rgba8Unorm),
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => Ok(Tf::Rgba16Unorm),
        PixelFormat::Rgb16S | PixelFormat::Rgba16S => Ok(Tf::Rgba16Snorm),
        PixelFormat::Rgb32F | PixelFormat::Rgba32F => Ok(Tf::Rgba32Float),
        PixelFormat::Empty => Err(FxError::unsupported_format(format)),
    }
}

/// Channels the device stores per pixel (RGB widens to RGBA).
#[inline]
pub(crate) fn device_channel_count(format: PixelFormat) -> usize {
    match format.channel_count() {
        1 => 1,
        _ => 4,
    }
}

/// Bytes the device stores per pixel.
#[inline]
pub(crate) fn device_pixel_size(format: PixelFormat) -> usize {
    device_channel_count(format) * format.channel_size()
}

/// The byte pattern of a full-scale alpha element.
fn opaque_alpha(format: PixelFormat) -> [u8; 4] {
    match format.channel_size() {
        1 => [u8::MAX, 0, 0, 0],
        2 if format.is_signed() => {
            let bytes = i16::MAX.to_le_bytes();
            [bytes[0], bytes[1], 0, 0]
        }
        2 => {
            let bytes = u16::MAX.to_le_bytes();
            [bytes[0], bytes[1], 0, 0]
        }
        _ => 1.0_f32.to_le_bytes(),
    }
}

/// Expands tightly packed logical pixels into device layout.
pub(crate) fn expand_to_device(format: PixelFormat, src: &[u8]) -> Vec<u8> {
    let logical = format.pixel_size();
    let device = device_pixel_size(format);

    if logical == device {
        return src.to_vec();
    }

    let element = format.channel_size();
    let alpha = opaque_alpha(format);
    let mut out = vec![0u8; src.len() / logical * device];

    for (src_px, dst_px) in src.chunks_exact(logical).zip(out.chunks_exact_mut(device)) {
        dst_px[..logical].copy_from_slice(src_px);
        dst_px[logical..logical + element].copy_from_slice(&alpha[..element]);
    }

    out
}

/// Contracts device-layout pixels back into the logical layout.
pub(crate) fn contract_from_device(format: PixelFormat, src: &[u8], dst: &mut [u8]) {
    let logical = format.pixel_size();
    let device = device_pixel_size(format);

    if logical == device {
        dst.copy_from_slice(src);
        return;
    }

    for (src_px, dst_px) in src.chunks_exact(device).zip(dst.chunks_exact_mut(logical)) {
        dst_px.copy_from_slice(&src_px[..logical]);
    }
}

/// One tile's worth of GPU pixel storage.
pub struct Texture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: i32,
    height: i32,
    format: PixelFormat,
    usage: UsageCounter,
}

impl Texture {
    /// Creates a zeroed texture of the given logical format.
    pub fn new(
        ctx: &Context,
        format: PixelFormat,
        width: i32,
        height: i32,
    ) -> FxResult<Arc<Self>> {
        if width <= 0 || height <= 0 {
            return Err(raster_core::Error::invalid_dimensions(
                width,
                height,
                "texture extents must be positive",
            )
            .into());
        }

        let wgpu_format = device_format(format, ctx.features())?;

        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("raster_tile"),
            size: wgpu::Extent3d {
                width: width as u32,
                height: height as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Arc::new(Self {
            texture,
            view,
            width,
            height,
            format,
            usage: UsageCounter::new(),
        }))
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

    /// Logical pixel layout.
    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The sampling/attachment view.
    #[inline]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    fn bounds(&self) -> Rect32I {
        Rect32I::from_size(self.width, self.height)
    }

    /// Writes a tightly packed logical-format region at `rect`.
    pub fn upload(&self, ctx: &Context, data: &[u8], rect: Rect32I) -> bool {
        if rect.is_empty() || !self.bounds().contains_rect(&rect) {
            debug!("texture upload rejected: {rect} outside {}x{}", self.width, self.height);
            return false;
        }

        let expected = self
            .format
            .plane_byte_size(rect.width as usize, rect.height as usize);
        if data.len() != expected {
            debug!(
                "texture upload rejected: {} bytes given, region needs {expected}",
                data.len()
            );
            return false;
        }

        let staging = expand_to_device(self.format, data);
        let bytes_per_row = rect.width as usize * device_pixel_size(self.format);

        ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x as u32,
                    y: rect.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &staging,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row as u32),
                rows_per_image: Some(rect.height as u32),
            },
            wgpu::Extent3d {
                width: rect.width as u32,
                height: rect.height as u32,
                depth_or_array_layers: 1,
            },
        );

        true
    }

    /// Reads `rect` into a tightly packed logical-format buffer.
    ///
    /// Blocks on the device: readback is synchronous by contract.
    pub fn retrieve(&self, ctx: &Context, buffer: &mut [u8], rect: Rect32I) -> bool {
        if rect.is_empty() || !self.bounds().contains_rect(&rect) {
            debug!("texture retrieve rejected: {rect} outside {}x{}", self.width, self.height);
            return false;
        }

        let expected = self
            .format
            .plane_byte_size(rect.width as usize, rect.height as usize);
        if buffer.len() != expected {
            debug!(
                "texture retrieve rejected: buffer holds {} bytes, region needs {expected}",
                buffer.len()
            );
            return false;
        }

        let device_row = rect.width as usize * device_pixel_size(self.format);
        let padded_row =
            device_row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);

        let readback = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("raster_tile_readback"),
            size: (padded_row * rect.height as usize) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raster_tile_retrieve"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x as u32,
                    y: rect.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row as u32),
                    rows_per_image: Some(rect.height as u32),
                },
            },
            wgpu::Extent3d {
                width: rect.width as u32,
                height: rect.height as u32,
                depth_or_array_layers: 1,
            },
        );

        ctx.queue().submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        ctx.wait_idle();

        match receiver.recv() {
            Ok(Ok(())) => {}
            other => {
                debug!("texture retrieve failed: map_async returned {other:?}");
                return false;
            }
        }

        {
            let mapped = slice.get_mapped_range();
            let logical_row = rect.width as usize * self.format.pixel_size();

            for row in 0..rect.height as usize {
                let src = &mapped[row * padded_row..row * padded_row + device_row];
                let dst = &mut buffer[row * logical_row..(row + 1) * logical_row];
                contract_from_device(self.format, src, dst);
            }
        }

        readback.unmap();
        true
    }
}

impl GpuResource for Texture {
    fn gpu_memory_consumption(&self) -> usize {
        self.width as usize * self.height as usize * device_pixel_size(self.format)
    }

    fn cpu_memory_consumption(&self) -> usize {
        size_of::<Self>()
    }

    fn usage(&self) -> &UsageCounter {
        &self.usage
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_layout_widths() {
        assert_eq!(device_channel_count(PixelFormat::Mono8), 1);
        assert_eq!(device_channel_count(PixelFormat::Rgb8), 4);
        assert_eq!(device_channel_count(PixelFormat::Rgba8), 4);
        assert_eq!(device_pixel_size(PixelFormat::Rgb16), 8);
        assert_eq!(device_pixel_size(PixelFormat::Rgb32F), 16);
    }

    #[test]
    fn test_expand_contract_round_trip() {
        let src: Vec<u8> = (0..4 * 3).collect();
        let expanded = expand_to_device(PixelFormat::Rgb8, &src);
        assert_eq!(expanded.len(), 4 * 4);
        assert_eq!(&expanded[..3], &src[..3]);
        assert_eq!(expanded[3], 255);

        let mut back = vec![0u8; src.len()];
        contract_from_device(PixelFormat::Rgb8, &expanded, &mut back);
        assert_eq!(back, src);
    }

    #[test]
    fn test_expand_is_identity_for_rgba() {
        let src: Vec<u8> = (0..8).collect();
        assert_eq!(expand_to_device(PixelFormat::Rgba8, &src), src);
    }

    #[test]
    fn test_alpha_pattern_per_width() {
        let rgb16: Vec<u8> = vec![0; 6];
        let expanded = expand_to_device(PixelFormat::Rgb16, &rgb16);
        assert_eq!(&expanded[6..8], &u16::MAX.to_le_bytes());

        let rgb32f: Vec<u8> = vec![0; 12];
        let expanded = expand_to_device(PixelFormat::Rgb32F, &rgb32f);
        assert_eq!(&expanded[12..16], &1.0_f32.to_le_bytes());
    }
}
