//! Weighted monochrome conversion.
//!
//! Replaces each pixel's color channels with the weighted sum of its
//! RGB channels. The weight triple is the mixer filters' knob; the
//! Rec. 709 luma weights are the usual default.

use std::sync::Arc;

use raster_core::{PixelFormat, Rect32I};
use raster_fx::backend::cpu;
use raster_fx::{Device, ImageObject};
use tracing::debug;

use crate::channel::PixelChannel;
use crate::dispatch::{CpuKernel, cpu_execute_tile_based};
use crate::ops::compatible_operands;

/// Rec. 709 luma weights.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

fn kernel_monochrome<T: PixelChannel>(
    dst: &cpu::KernelView,
    src: &cpu::KernelView,
    area: Rect32I,
    weights: [f32; 3],
) {
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

        let luma = input[src_off].to_f32() * weights[0]
            + input[src_off + 1].to_f32() * weights[1]
            + input[src_off + 2].to_f32() * weights[2];
        let value = T::from_f32(luma);

        out[dst_off] = value;
        out[dst_off + 1] = value;
        out[dst_off + 2] = value;

        if channels == 4 {
            out[dst_off + 3] = input[src_off + 3];
        }
    }
}

fn monochrome_cpu(
    device: &cpu::BackendDevice,
    destination: &mut cpu::ImageObject,
    source: &cpu::ImageObject,
    area: Rect32I,
    weights: [f32; 3],
) -> bool {
    use raster_fx::ApiImageObject;

    let kernel: CpuKernel = match destination.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => Arc::new(move |dst, src, tile| {
            kernel_monochrome::<u8>(dst, src, tile, weights)
        }),
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => Arc::new(move |dst, src, tile| {
            kernel_monochrome::<u16>(dst, src, tile, weights)
        }),
        other => {
            debug!("convert_to_monochrome: no kernel specialization for {other}");
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
@group(0) @binding(0) var<uniform> params: array<vec4<f32>, 1>;
@group(0) @binding(1) var main_texture: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let c = textureLoad(main_texture, vec2<i32>(pos.xy), 0);
    let luma = dot(c.rgb, params[0].xyz);
    return vec4<f32>(vec3<f32>(luma), c.a);
}
"#;

    pub(super) struct GpuMonochrome {
        common: GpuOpCommon,
        weights: [f32; 3],
        weights_id: usize,
        texture_id: usize,
    }

    impl GpuMonochrome {
        pub(super) fn new(weights: [f32; 3]) -> Self {
            Self {
                common: GpuOpCommon::new(),
                weights,
                weights_id: 0,
                texture_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuMonochrome {
        fn name(&self) -> &'static str {
            "convert_to_monochrome"
        }

        fn kernel_source(&self) -> &'static str {
            KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [
                ParameterDecl::new("Weights", ParameterKind::Vec3),
                ParameterDecl::new("MainTexture", ParameterKind::Texture),
            ];
            if !self
                .common
                .initialize(device, "convert_to_monochrome", KERNEL, &decls)
            {
                return false;
            }

            self.weights_id = self.common.parameter("Weights");
            self.texture_id = self.common.parameter("MainTexture");
            true
        }

        fn effect(&self) -> Option<&Arc<gpu::Effect>> {
            self.common.effect()
        }

        fn submit_parameters(
            &mut self,
            _device: &gpu::BackendDevice,
            _destination: &gpu::ImageObject,
            _source: &gpu::ImageObject,
            _area: Rect32I,
            texture: &Arc<Texture>,
            _tx: usize,
            _ty: usize,
        ) {
            let effect = self.common.effect().expect("initialized");
            effect.apply_parameter(self.weights_id, EffectParameterValue::Vec3(self.weights));
            effect.apply_parameter(
                self.texture_id,
                EffectParameterValue::Texture(Arc::clone(texture)),
            );
        }
    }
}

/// Replaces color with the weighted channel sum.
pub fn convert_to_monochrome(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    weights: [f32; 3],
) -> bool {
    if !compatible_operands(destination, source, area) {
        return false;
    }

    match (device, destination, source) {
        (Device::Cpu(dev), ImageObject::Cpu(dst), ImageObject::Cpu(src)) => {
            monochrome_cpu(dev, dst, src, area, weights)
        }
        #[cfg(feature = "gpu")]
        (Device::Gpu(dev), ImageObject::Gpu(dst), ImageObject::Gpu(src)) => {
            let mut op = gpu_op::GpuMonochrome::new(weights);
            crate::dispatch::render_tiled_image_operation(dev, dst, src, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("convert_to_monochrome rejected: device and image backends differ");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_fx::{ApiBackendDevice, ApiImageObject};

    #[test]
    fn test_equal_weights_average() {
        let device = Device::new_cpu();

        let mut data = Vec::with_capacity(2 * 2 * 3);
        for _ in 0..4 {
            data.extend_from_slice(&[30, 60, 90]);
        }

        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 2, 2, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 2, 2)
            .unwrap();

        let third = 1.0 / 3.0;
        assert!(convert_to_monochrome(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(2, 2),
            [third, third, third]
        ));

        let mut out = vec![0u8; 2 * 2 * 3];
        assert!(destination.retrieve(&mut out));
        for px in out.chunks(3) {
            assert_eq!(px, &[60, 60, 60]);
        }
    }

    #[test]
    fn test_alpha_preserved() {
        let device = Device::new_cpu();

        let mut data = Vec::with_capacity(2 * 2 * 4);
        for _ in 0..4 {
            data.extend_from_slice(&[100, 50, 0, 77]);
        }

        let source = device
            .create_image_with_data(PixelFormat::Rgba8, 2, 2, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgba8, 2, 2)
            .unwrap();

        assert!(convert_to_monochrome(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(2, 2),
            LUMA_WEIGHTS
        ));

        let mut out = vec![0u8; 2 * 2 * 4];
        assert!(destination.retrieve(&mut out));
        for px in out.chunks(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 77);
        }
    }
}
