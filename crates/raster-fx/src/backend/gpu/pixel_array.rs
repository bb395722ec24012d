//! 1D pixel buffers on the GPU backend.
//!
//! Stored as 1D textures so kernels can look values up per channel —
//! the curve-driven operations bind these as their LUT parameter.

use std::sync::mpsc;

use raster_core::PixelFormat;
use tracing::debug;

use super::context::Context;
use super::texture::{contract_from_device, device_format, device_pixel_size, expand_to_device};
use crate::FxResult;
use crate::backend::next_object_id;
use crate::device::ApiPixelArray;

struct Storage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// A 1D typed pixel buffer backed by a 1D texture.
pub struct PixelArray {
    ctx: std::sync::Arc<Context>,
    storage: Option<Storage>,
    format: PixelFormat,
    length: usize,
    id: u64,
    owner: u64,
}

impl PixelArray {
    pub(crate) fn new(ctx: std::sync::Arc<Context>, owner: u64) -> Self {
        Self {
            ctx,
            storage: None,
            format: PixelFormat::Empty,
            length: 0,
            id: next_object_id(),
            owner,
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

    /// Device-side byte size.
    pub fn byte_size(&self) -> usize {
        self.length * device_pixel_size(self.format)
    }

    /// The texture view kernels bind.
    ///
    /// # Panics
    ///
    /// Panics when the array is empty; submit only populated arrays
    /// as effect parameters.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.storage.as_ref().expect("pixel array storage").view
    }

    /// (Re)creates zeroed storage for `length` pixels.
    pub fn reset_with_len(&mut self, format: PixelFormat, length: usize) -> FxResult<()> {
        let wgpu_format = device_format(format, self.ctx.features())?;

        if length == 0 {
            return Err(raster_core::Error::invalid_dimensions(
                0,
                1,
                "pixel array length must be positive",
            )
            .into());
        }

        let texture = self.ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("raster_pixel_array"),
            size: wgpu::Extent3d {
                width: length as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D1,
            format: wgpu_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        self.storage = Some(Storage { texture, view });
        self.format = format;
        self.length = length;
        Ok(())
    }

    /// Creates a standalone array holding `length` pixels of `data`.
    ///
    /// Standalone arrays are unowned; operations use them for
    /// transient lookup data without registering them with a device.
    pub fn from_data(
        ctx: &std::sync::Arc<Context>,
        format: PixelFormat,
        length: usize,
        data: &[u8],
    ) -> FxResult<Self> {
        let mut array = Self::new(std::sync::Arc::clone(ctx), 0);
        array.reset_with_data(format, length, data)?;
        Ok(array)
    }

    /// (Re)creates storage holding `length` pixels of `data`.
    pub fn reset_with_data(
        &mut self,
        format: PixelFormat,
        length: usize,
        data: &[u8],
    ) -> FxResult<()> {
        if data.len() != length * format.pixel_size() {
            return Err(raster_core::Error::BufferSizeMismatch {
                expected: length * format.pixel_size(),
                actual: data.len(),
            }
            .into());
        }

        self.reset_with_len(format, length)?;
        self.upload(0, data);
        Ok(())
    }
}

impl ApiPixelArray for PixelArray {
    fn reset(&mut self) {
        self.storage = None;
        self.format = PixelFormat::Empty;
        self.length = 0;
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn length(&self) -> usize {
        self.length
    }

    fn is_empty(&self) -> bool {
        self.storage.is_none()
    }

    fn upload(&mut self, offset: usize, data: &[u8]) -> bool {
        let pixel = self.format.pixel_size();
        let Some(storage) = &self.storage else {
            debug!("pixel array upload rejected: empty array");
            return false;
        };

        if pixel == 0 || offset % pixel != 0 || data.len() % pixel != 0 {
            debug!("pixel array upload rejected: unaligned access");
            return false;
        }

        let first = offset / pixel;
        let count = data.len() / pixel;
        if first + count > self.length {
            debug!(
                "pixel array upload rejected: {} pixels at {first} exceed length {}",
                count, self.length
            );
            return false;
        }

        let staging = expand_to_device(self.format, data);

        self.ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: first as u32,
                    y: 0,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &staging,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(staging.len() as u32),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: count as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        true
    }

    fn retrieve(&self, offset: usize, buffer: &mut [u8]) -> bool {
        let pixel = self.format.pixel_size();
        let Some(storage) = &self.storage else {
            debug!("pixel array retrieve rejected: empty array");
            return false;
        };

        if pixel == 0 || offset % pixel != 0 || buffer.len() % pixel != 0 {
            debug!("pixel array retrieve rejected: unaligned access");
            return false;
        }

        let first = offset / pixel;
        let count = buffer.len() / pixel;
        if first + count > self.length {
            debug!(
                "pixel array retrieve rejected: {count} pixels at {first} exceed length {}",
                self.length
            );
            return false;
        }

        let device_len = count * device_pixel_size(self.format);
        let padded = device_len.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);

        let readback = self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("raster_pixel_array_readback"),
            size: padded as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder =
            self.ctx
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("raster_pixel_array_retrieve"),
                });

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &storage.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: first as u32,
                    y: 0,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: count as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
        );

        self.ctx.queue().submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.ctx.wait_idle();

        if !matches!(receiver.recv(), Ok(Ok(()))) {
            debug!("pixel array retrieve failed: map_async error");
            return false;
        }

        {
            let mapped = slice.get_mapped_range();
            contract_from_device(self.format, &mapped[..device_len], buffer);
        }

        readback.unmap();
        true
    }
}

impl std::fmt::Debug for PixelArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelArray")
            .field("format", &self.format)
            .field("length", &self.length)
            .finish()
    }
}
