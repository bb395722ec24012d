//! Brightness adjustment: linear factor and curve-driven variants.
//!
//! The linear variant scales every channel by a factor, clamping at
//! the representable range. The curve variant remaps each channel
//! through a baked lookup table — the table holds normalized output
//! values, indexed by normalized input value.

use std::sync::Arc;

use raster_core::{PixelFormat, Rect32I};
use raster_fx::backend::cpu;
use raster_fx::{Device, ImageObject};
use tracing::debug;

use crate::channel::PixelChannel;
use crate::dispatch::{CpuKernel, cpu_execute_tile_based};
use crate::ops::compatible_operands;

fn kernel_linear_adjustment<T: PixelChannel>(
    dst: &cpu::KernelView,
    src: &cpu::KernelView,
    area: Rect32I,
    factor: f32,
) {
    let channels = dst.format().channel_count();
    let color_channels = channels.min(3);
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

        for c in 0..color_channels {
            out[dst_off + c] = input[src_off + c].scale_clamped(factor);
        }

        if channels == 4 {
            out[dst_off + 3] = input[src_off + 3];
        }
    }
}

fn kernel_curve_adjustment<T: PixelChannel>(
    dst: &cpu::KernelView,
    src: &cpu::KernelView,
    area: Rect32I,
    curve: &[f32],
) {
    let channels = dst.format().channel_count();
    let color_channels = channels.min(3);
    let dst_stride = dst.stride();
    let src_stride = src.stride();
    let top = (curve.len() - 1) as f32;
    // SAFETY: dispatch hands each job a disjoint destination tile.
    let out: &mut [T] = unsafe { dst.channels_mut::<T>() };
    let input: &[T] = src.channels::<T>();

    for p in 0..(area.width as usize * area.height as usize) {
        let y = p / area.width as usize;
        let x = p % area.width as usize;
        let dst_off = ((area.y as usize + y) * dst_stride + area.x as usize + x) * channels;
        let src_off = ((area.y as usize + y) * src_stride + area.x as usize + x) * channels;

        for c in 0..color_channels {
            let index = (input[src_off + c].to_f32().clamp(0.0, 1.0) * top).round() as usize;
            out[dst_off + c] = T::from_f32(curve[index]);
        }

        if channels == 4 {
            out[dst_off + 3] = input[src_off + 3];
        }
    }
}

fn linear_cpu(
    device: &cpu::BackendDevice,
    destination: &mut cpu::ImageObject,
    source: &cpu::ImageObject,
    area: Rect32I,
    factor: f32,
) -> bool {
    use raster_fx::ApiImageObject;

    let kernel: CpuKernel = match destination.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => Arc::new(move |dst, src, tile| {
            kernel_linear_adjustment::<u8>(dst, src, tile, factor)
        }),
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => Arc::new(move |dst, src, tile| {
            kernel_linear_adjustment::<u16>(dst, src, tile, factor)
        }),
        other => {
            debug!("adjust_brightness: no kernel specialization for {other}");
            return false;
        }
    };

    cpu_execute_tile_based(device, destination, source, area, kernel, false)
}

fn curve_cpu(
    device: &cpu::BackendDevice,
    destination: &mut cpu::ImageObject,
    source: &cpu::ImageObject,
    area: Rect32I,
    curve: Arc<Vec<f32>>,
) -> bool {
    use raster_fx::ApiImageObject;

    let kernel: CpuKernel = match destination.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => Arc::new(move |dst, src, tile| {
            kernel_curve_adjustment::<u8>(dst, src, tile, &curve)
        }),
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => Arc::new(move |dst, src, tile| {
            kernel_curve_adjustment::<u16>(dst, src, tile, &curve)
        }),
        other => {
            debug!("adjust_brightness_curve: no kernel specialization for {other}");
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

    pub(super) const LINEAR_KERNEL: &str = r#"
@group(0) @binding(0) var<uniform> params: array<vec4<f32>, 1>;
@group(0) @binding(1) var main_texture: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let c = textureLoad(main_texture, vec2<i32>(pos.xy), 0);
    let factor = params[0].x;
    let rgb = clamp(c.rgb * factor, vec3<f32>(0.0), vec3<f32>(1.0));
    return vec4<f32>(rgb, c.a);
}
"#;

    pub(super) const CURVE_KERNEL: &str = r#"
@group(0) @binding(1) var main_texture: texture_2d<f32>;
@group(0) @binding(2) var curve_texture: texture_1d<f32>;

fn curve_sample(v: f32) -> f32 {
    let len = i32(textureDimensions(curve_texture));
    let index = clamp(i32(round(clamp(v, 0.0, 1.0) * f32(len - 1))), 0, len - 1);
    return textureLoad(curve_texture, index, 0).x;
}

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let c = textureLoad(main_texture, vec2<i32>(pos.xy), 0);
    return vec4<f32>(curve_sample(c.r), curve_sample(c.g), curve_sample(c.b), c.a);
}
"#;

    pub(super) struct GpuLinearBrightness {
        common: GpuOpCommon,
        factor: f32,
        factor_id: usize,
        texture_id: usize,
    }

    impl GpuLinearBrightness {
        pub(super) fn new(factor: f32) -> Self {
            Self {
                common: GpuOpCommon::new(),
                factor,
                factor_id: 0,
                texture_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuLinearBrightness {
        fn name(&self) -> &'static str {
            "adjust_brightness"
        }

        fn kernel_source(&self) -> &'static str {
            LINEAR_KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [
                ParameterDecl::new("Factor", ParameterKind::Float),
                ParameterDecl::new("MainTexture", ParameterKind::Texture),
            ];
            if !self
                .common
                .initialize(device, "adjust_brightness", LINEAR_KERNEL, &decls)
            {
                return false;
            }

            self.factor_id = self.common.parameter("Factor");
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
            effect.apply_parameter(self.factor_id, EffectParameterValue::Float(self.factor));
            effect.apply_parameter(
                self.texture_id,
                EffectParameterValue::Texture(Arc::clone(texture)),
            );
        }
    }

    pub(super) struct GpuCurveBrightness {
        common: GpuOpCommon,
        curve: Arc<gpu::PixelArray>,
        texture_id: usize,
        curve_id: usize,
    }

    impl GpuCurveBrightness {
        pub(super) fn new(curve: Arc<gpu::PixelArray>) -> Self {
            Self {
                common: GpuOpCommon::new(),
                curve,
                texture_id: 0,
                curve_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuCurveBrightness {
        fn name(&self) -> &'static str {
            "adjust_brightness_curve"
        }

        fn kernel_source(&self) -> &'static str {
            CURVE_KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [
                ParameterDecl::new("MainTexture", ParameterKind::Texture),
                ParameterDecl::new("Curve", ParameterKind::PixelArray),
            ];
            if !self
                .common
                .initialize(device, "adjust_brightness_curve", CURVE_KERNEL, &decls)
            {
                return false;
            }

            self.texture_id = self.common.parameter("MainTexture");
            self.curve_id = self.common.parameter("Curve");
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
            effect.apply_parameter(
                self.texture_id,
                EffectParameterValue::Texture(Arc::clone(texture)),
            );
            effect.apply_parameter(
                self.curve_id,
                EffectParameterValue::PixelArray(Arc::clone(&self.curve)),
            );
        }
    }
}

/// `destination = clamp(source * factor)` per channel.
pub fn adjust_brightness(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    factor: f32,
) -> bool {
    if !compatible_operands(destination, source, area) {
        return false;
    }

    match (device, destination, source) {
        (Device::Cpu(dev), ImageObject::Cpu(dst), ImageObject::Cpu(src)) => {
            linear_cpu(dev, dst, src, area, factor)
        }
        #[cfg(feature = "gpu")]
        (Device::Gpu(dev), ImageObject::Gpu(dst), ImageObject::Gpu(src)) => {
            let mut op = gpu_op::GpuLinearBrightness::new(factor);
            crate::dispatch::render_tiled_image_operation(dev, dst, src, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("adjust_brightness rejected: device and image backends differ");
            false
        }
    }
}

/// Remaps every channel through a baked curve lookup table.
///
/// `curve` holds normalized output values; it needs at least two
/// entries.
pub fn adjust_brightness_curve(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    curve: &[f32],
) -> bool {
    if curve.len() < 2 {
        debug!("adjust_brightness_curve rejected: curve table too short");
        return false;
    }

    if !compatible_operands(destination, source, area) {
        return false;
    }

    match (device, destination, source) {
        (Device::Cpu(dev), ImageObject::Cpu(dst), ImageObject::Cpu(src)) => {
            curve_cpu(dev, dst, src, area, Arc::new(curve.to_vec()))
        }
        #[cfg(feature = "gpu")]
        (Device::Gpu(dev), ImageObject::Gpu(dst), ImageObject::Gpu(src)) => {
            use raster_fx::backend::gpu;

            let array = match gpu::PixelArray::from_data(
                dev.context(),
                PixelFormat::Mono32F,
                curve.len(),
                bytemuck::cast_slice(curve),
            ) {
                Ok(array) => Arc::new(array),
                Err(err) => {
                    debug!("adjust_brightness_curve: curve upload failed: {err}");
                    return false;
                }
            };

            let mut op = gpu_op::GpuCurveBrightness::new(array);
            crate::dispatch::render_tiled_image_operation(dev, dst, src, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("adjust_brightness_curve rejected: device and image backends differ");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_fx::{ApiBackendDevice, ApiImageObject};

    #[test]
    fn test_linear_brightness_scenario() {
        // 4x4 RGB8 filled with (10, 20, 30), factor 2.0 -> (20, 40, 60)
        let device = Device::new_cpu();

        let mut data = Vec::with_capacity(4 * 4 * 3);
        for _ in 0..16 {
            data.extend_from_slice(&[10, 20, 30]);
        }

        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 4, 4, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        assert!(adjust_brightness(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(4, 4),
            2.0
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        for px in out.chunks(3) {
            assert_eq!(px, &[20, 40, 60]);
        }
    }

    #[test]
    fn test_linear_brightness_clamps_at_full_scale() {
        let device = Device::new_cpu();

        let data = vec![200u8; 2 * 2 * 3];
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 2, 2, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 2, 2)
            .unwrap();

        assert!(adjust_brightness(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(2, 2),
            2.0
        ));

        let mut out = vec![0u8; 2 * 2 * 3];
        assert!(destination.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_partial_area_leaves_rest_untouched() {
        let device = Device::new_cpu();

        let data = vec![100u8; 4 * 4 * 3];
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 4, 4, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        assert!(adjust_brightness(
            &device,
            &mut destination,
            &source,
            Rect32I::new(0, 0, 2, 2),
            2.0
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        let px = |x: usize, y: usize| out[(y * 4 + x) * 3];
        assert_eq!(px(0, 0), 200);
        assert_eq!(px(1, 1), 200);
        assert_eq!(px(2, 2), 0);
        assert_eq!(px(3, 0), 0);
    }

    #[test]
    fn test_idempotent_reapplication() {
        let device = Device::new_cpu();

        let data: Vec<u8> = (0..4 * 4 * 3).map(|i| (i * 7 % 251) as u8).collect();
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 4, 4, &data)
            .unwrap();
        let mut first = device.create_image_sized(PixelFormat::Rgb8, 4, 4).unwrap();
        let mut second = device.create_image_sized(PixelFormat::Rgb8, 4, 4).unwrap();

        let area = Rect32I::from_size(4, 4);
        assert!(adjust_brightness(&device, &mut first, &source, area, 1.37));
        assert!(adjust_brightness(&device, &mut second, &source, area, 1.37));

        let mut a = vec![0u8; data.len()];
        let mut b = vec![0u8; data.len()];
        assert!(first.retrieve(&mut a));
        assert!(second.retrieve(&mut b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_curve_adjustment_inverts() {
        let device = Device::new_cpu();

        // inversion curve: f(x) = 1 - x over 256 samples
        let curve: Vec<f32> = (0..256).map(|i| 1.0 - i as f32 / 255.0).collect();

        let data = vec![0u8; 2 * 2 * 3];
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 2, 2, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 2, 2)
            .unwrap();

        assert!(adjust_brightness_curve(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(2, 2),
            &curve
        ));

        let mut out = vec![0u8; 2 * 2 * 3];
        assert!(destination.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_curve_rejects_short_table() {
        let device = Device::new_cpu();
        let source = device
            .create_image_sized(PixelFormat::Rgb8, 2, 2)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 2, 2)
            .unwrap();

        assert!(!adjust_brightness_curve(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(2, 2),
            &[1.0]
        ));
    }
}
