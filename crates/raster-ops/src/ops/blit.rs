//! Copy an area from source to destination through the kernel path.

use std::sync::Arc;

use raster_core::{PixelFormat, Rect32I};
use raster_fx::backend::cpu;
use raster_fx::{Device, ImageObject};
use tracing::debug;

use crate::channel::PixelChannel;
use crate::dispatch::{CpuKernel, cpu_execute_tile_based};
use crate::ops::compatible_operands;

fn kernel_blit<T: PixelChannel>(dst: &cpu::KernelView, src: &cpu::KernelView, area: Rect32I) {
    let channels = dst.format().channel_count();
    let dst_stride = dst.stride();
    let src_stride = src.stride();
    // SAFETY: dispatch hands each job a disjoint destination tile.
    let out: &mut [T] = unsafe { dst.channels_mut::<T>() };
    let input: &[T] = src.channels::<T>();

    for p in 0..(area.width as usize * area.height as usize) {
        let y = p / area.width as usize;
        let x = p % area.width as usize;
        let dst_off = ((area.y as usize + y) * dst_stride + area.x as usize + x) * channels;
        let src_off = ((area.y as usize + y) * src_stride + area.x as usize + x) * channels;

        out[dst_off..dst_off + channels].copy_from_slice(&input[src_off..src_off + channels]);
    }
}

fn blit_cpu(
    device: &cpu::BackendDevice,
    destination: &mut cpu::ImageObject,
    source: &cpu::ImageObject,
    area: Rect32I,
) -> bool {
    use raster_fx::ApiImageObject;

    let kernel: CpuKernel = match destination.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
            Arc::new(|dst, src, tile| kernel_blit::<u8>(dst, src, tile))
        }
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => {
            Arc::new(|dst, src, tile| kernel_blit::<u16>(dst, src, tile))
        }
        other => {
            debug!("blit: no kernel specialization for {other}");
            return false;
        }
    };

    cpu_execute_tile_based(device, destination, source, area, kernel, false)
}

#[cfg(feature = "gpu")]
mod gpu_op {
    use super::*;
    use raster_fx::backend::gpu;
    use raster_fx::backend::gpu::{EffectParameterValue, ParameterDecl, ParameterKind, Texture};

    use crate::operation::{GpuImageOperation, GpuOpCommon};

    pub(super) const KERNEL: &str = r#"
@group(0) @binding(1) var main_texture: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return textureLoad(main_texture, vec2<i32>(pos.xy), 0);
}
"#;

    pub(super) struct GpuBlit {
        common: GpuOpCommon,
        texture_id: usize,
    }

    impl GpuBlit {
        pub(super) fn new() -> Self {
            Self {
                common: GpuOpCommon::new(),
                texture_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuBlit {
        fn name(&self) -> &'static str {
            "blit"
        }

        fn kernel_source(&self) -> &'static str {
            KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [ParameterDecl::new("MainTexture", ParameterKind::Texture)];
            if !self.common.initialize(device, "blit", KERNEL, &decls) {
                return false;
            }

            self.texture_id = self.common.parameter("MainTexture");
            true
        }

        fn effect(&self) -> Option<&std::sync::Arc<gpu::Effect>> {
            self.common.effect()
        }

        fn submit_parameters(
            &mut self,
            _device: &gpu::BackendDevice,
            _destination: &gpu::ImageObject,
            _source: &gpu::ImageObject,
            _area: Rect32I,
            texture: &std::sync::Arc<Texture>,
            _tx: usize,
            _ty: usize,
        ) {
            let effect = self.common.effect().expect("initialized");
            effect.apply_parameter(
                self.texture_id,
                EffectParameterValue::Texture(std::sync::Arc::clone(texture)),
            );
        }
    }
}

/// Copies `area` from `source` into `destination`.
pub fn blit(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
) -> bool {
    if !compatible_operands(destination, source, area) {
        return false;
    }

    match (device, destination, source) {
        (Device::Cpu(dev), ImageObject::Cpu(dst), ImageObject::Cpu(src)) => {
            blit_cpu(dev, dst, src, area)
        }
        #[cfg(feature = "gpu")]
        (Device::Gpu(dev), ImageObject::Gpu(dst), ImageObject::Gpu(src)) => {
            let mut op = gpu_op::GpuBlit::new();
            crate::dispatch::render_tiled_image_operation(dev, dst, src, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("blit rejected: device and image backends differ");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_fx::{ApiBackendDevice, ApiImageObject};

    #[test]
    fn test_blit_region() {
        let device = Device::new_cpu();

        let data: Vec<u8> = (0..8 * 8 * 3).map(|i| (i % 240) as u8).collect();
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 8, 8, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 8, 8)
            .unwrap();

        let area = Rect32I::new(1, 1, 5, 6);
        assert!(blit(&device, &mut destination, &source, area));

        let expected_region_len = 5 * 6 * 3;
        let mut got = vec![0u8; expected_region_len];
        let mut want = vec![0u8; expected_region_len];
        assert!(destination.retrieve_region(&mut got, area));
        assert!(source.retrieve_region(&mut want, area));
        assert_eq!(got, want);

        // outside the area stays zero
        let mut corner = vec![0u8; 3];
        assert!(destination.retrieve_region(&mut corner, Rect32I::new(0, 0, 1, 1)));
        assert_eq!(corner, vec![0, 0, 0]);
    }

    #[test]
    fn test_blit_rejects_dimension_mismatch() {
        let device = Device::new_cpu();
        let source = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 8, 8)
            .unwrap();

        assert!(!blit(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(4, 4)
        ));
    }
}
