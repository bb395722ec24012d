//! Fill an area with a constant color.

use std::sync::Arc;

use raster_core::{PixelFormat, Rect32I};
use raster_fx::backend::cpu;
use raster_fx::{Device, ImageObject};
use tracing::debug;

use crate::channel::PixelChannel;
use crate::dispatch::{CpuKernelInPlace, cpu_execute_tile_based_in_place};
use crate::ops::area_in_image;

fn kernel_fill<T: PixelChannel>(dst: &cpu::KernelView, area: Rect32I, color: [f32; 4]) {
    let channels = dst.format().channel_count();
    let stride = dst.stride();
    // SAFETY: dispatch hands each job a disjoint destination tile.
    let out: &mut [T] = unsafe { dst.channels_mut::<T>() };

    let mut value = [T::from_f32(0.0); 4];
    for (slot, component) in value.iter_mut().zip(color).take(channels) {
        *slot = T::from_f32(component);
    }

    for p in 0..(area.width as usize * area.height as usize) {
        let y = p / area.width as usize;
        let x = p % area.width as usize;
        let off = ((area.y as usize + y) * stride + area.x as usize + x) * channels;

        for c in 0..channels {
            out[off + c] = value[c];
        }
    }
}

fn fill_cpu(
    device: &cpu::BackendDevice,
    destination: &mut cpu::ImageObject,
    area: Rect32I,
    color: [f32; 4],
) -> bool {
    use raster_fx::ApiImageObject;

    let kernel: CpuKernelInPlace = match destination.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
            Arc::new(move |dst, tile| kernel_fill::<u8>(dst, tile, color))
        }
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => {
            Arc::new(move |dst, tile| kernel_fill::<u16>(dst, tile, color))
        }
        other => {
            debug!("fill: no kernel specialization for {other}");
            return false;
        }
    };

    cpu_execute_tile_based_in_place(device, destination, area, kernel, false)
}

#[cfg(feature = "gpu")]
mod gpu_op {
    use super::*;
    use raster_fx::backend::gpu;
    use raster_fx::backend::gpu::{EffectParameterValue, ParameterDecl, ParameterKind, Texture};

    use crate::operation::{GpuImageOperation, GpuOpCommon};

    pub(super) const KERNEL: &str = r#"
@group(0) @binding(0) var<uniform> params: array<vec4<f32>, 1>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    return params[0];
}
"#;

    pub(super) struct GpuFill {
        common: GpuOpCommon,
        color: [f32; 4],
        color_id: usize,
    }

    impl GpuFill {
        pub(super) fn new(color: [f32; 4]) -> Self {
            Self {
                common: GpuOpCommon::new(),
                color,
                color_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuFill {
        fn name(&self) -> &'static str {
            "fill"
        }

        fn kernel_source(&self) -> &'static str {
            KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [ParameterDecl::new("Color", ParameterKind::Vec4)];
            if !self.common.initialize(device, "fill", KERNEL, &decls) {
                return false;
            }

            self.color_id = self.common.parameter("Color");
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
            _texture: &std::sync::Arc<Texture>,
            _tx: usize,
            _ty: usize,
        ) {
            let effect = self.common.effect().expect("initialized");
            effect.apply_parameter(self.color_id, EffectParameterValue::Vec4(self.color));
        }
    }
}

/// Fills `area` of `destination` with `color` (normalized RGBA).
pub fn fill(device: &Device, destination: &mut ImageObject, area: Rect32I, color: [f32; 4]) -> bool {
    if !area_in_image(destination, area) {
        return false;
    }

    match (device, destination) {
        (Device::Cpu(dev), ImageObject::Cpu(dst)) => fill_cpu(dev, dst, area, color),
        #[cfg(feature = "gpu")]
        (Device::Gpu(dev), ImageObject::Gpu(dst)) => {
            let mut op = gpu_op::GpuFill::new(color);
            crate::dispatch::render_tiled_image_operation(dev, dst, dst, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("fill rejected: device and image backends differ");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_fx::{ApiBackendDevice, ApiImageObject};

    #[test]
    fn test_fill_region_cpu() {
        let device = Device::new_cpu();
        let mut image = device
            .create_image_sized(PixelFormat::Rgb8, 8, 8)
            .unwrap();

        assert!(fill(
            &device,
            &mut image,
            Rect32I::new(2, 2, 4, 4),
            [1.0, 0.5, 0.0, 1.0]
        ));

        let mut out = vec![0u8; 8 * 8 * 3];
        assert!(image.retrieve(&mut out));

        let px = |x: usize, y: usize| &out[(y * 8 + x) * 3..(y * 8 + x) * 3 + 3];
        assert_eq!(px(2, 2), &[255, 128, 0]);
        assert_eq!(px(5, 5), &[255, 128, 0]);
        assert_eq!(px(1, 2), &[0, 0, 0]);
        assert_eq!(px(6, 6), &[0, 0, 0]);
    }

    #[test]
    fn test_fill_rejects_out_of_bounds() {
        let device = Device::new_cpu();
        let mut image = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        assert!(!fill(
            &device,
            &mut image,
            Rect32I::new(2, 2, 4, 4),
            [1.0; 4]
        ));
    }
}
