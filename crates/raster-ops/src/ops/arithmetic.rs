//! Per-channel arithmetic: scalar add/subtract/multiply, plus the
//! two-source multiply merge.
//!
//! Scalar operands are normalized: `add(0.5)` lifts every channel by
//! half the full scale, on every depth.

use std::sync::Arc;

use raster_core::{PixelFormat, Rect32I};
use raster_fx::backend::cpu;
use raster_fx::{Device, ImageObject};
use tracing::debug;

use crate::channel::PixelChannel;
use crate::dispatch::{
    CpuKernel, CpuMergeKernel, cpu_execute_tile_based, cpu_execute_tile_based_merge,
};
use crate::ops::compatible_operands;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithmeticMode {
    Add,
    Subtract,
    Multiply,
}

impl ArithmeticMode {
    fn apply(self, channel: f32, value: f32) -> f32 {
        match self {
            Self::Add => channel + value,
            Self::Subtract => channel - value,
            Self::Multiply => channel * value,
        }
    }

    #[cfg(feature = "gpu")]
    const fn shader_index(self) -> f32 {
        match self {
            Self::Add => 0.0,
            Self::Subtract => 1.0,
            Self::Multiply => 2.0,
        }
    }
}

fn kernel_arithmetic<T: PixelChannel>(
    dst: &cpu::KernelView,
    src: &cpu::KernelView,
    area: Rect32I,
    mode: ArithmeticMode,
    value: f32,
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
            out[dst_off + c] = T::from_f32(mode.apply(input[src_off + c].to_f32(), value));
        }

        if channels == 4 {
            out[dst_off + 3] = input[src_off + 3];
        }
    }
}

fn kernel_merge_multiply<T: PixelChannel>(
    dst: &cpu::KernelView,
    first: &cpu::KernelView,
    second: &cpu::KernelView,
    area: Rect32I,
) {
    let channels = dst.format().channel_count();
    let color_channels = channels.min(3);
    let dst_stride = dst.stride();
    let first_stride = first.stride();
    let second_stride = second.stride();
    // SAFETY: dispatch hands each job a disjoint destination tile.
    let out: &mut [T] = unsafe { dst.channels_mut::<T>() };
    let a: &[T] = first.channels::<T>();
    let b: &[T] = second.channels::<T>();

    for p in 0..(area.width as usize * area.height as usize) {
        let y = p / area.width as usize;
        let x = p % area.width as usize;
        let dst_off = ((area.y as usize + y) * dst_stride + area.x as usize + x) * channels;
        let a_off = ((area.y as usize + y) * first_stride + area.x as usize + x) * channels;
        let b_off = ((area.y as usize + y) * second_stride + area.x as usize + x) * channels;

        for c in 0..color_channels {
            out[dst_off + c] = T::from_f32(a[a_off + c].to_f32() * b[b_off + c].to_f32());
        }

        if channels == 4 {
            out[dst_off + 3] = a[a_off + 3];
        }
    }
}

fn arithmetic_cpu(
    device: &cpu::BackendDevice,
    destination: &mut cpu::ImageObject,
    source: &cpu::ImageObject,
    area: Rect32I,
    mode: ArithmeticMode,
    value: f32,
) -> bool {
    use raster_fx::ApiImageObject;

    let kernel: CpuKernel = match destination.format() {
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => Arc::new(move |dst, src, tile| {
            kernel_arithmetic::<u8>(dst, src, tile, mode, value)
        }),
        PixelFormat::Rgb16 | PixelFormat::Rgba16 => Arc::new(move |dst, src, tile| {
            kernel_arithmetic::<u16>(dst, src, tile, mode, value)
        }),
        other => {
            debug!("arithmetic: no kernel specialization for {other}");
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
    let value = params[0].x;
    let mode = i32(params[0].y);

    var rgb = c.rgb;
    if mode == 0 {
        rgb = c.rgb + vec3<f32>(value);
    } else if mode == 1 {
        rgb = c.rgb - vec3<f32>(value);
    } else {
        rgb = c.rgb * value;
    }

    return vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)), c.a);
}
"#;

    pub(super) const MERGE_KERNEL: &str = r#"
@group(0) @binding(1) var first_texture: texture_2d<f32>;
@group(0) @binding(2) var second_texture: texture_2d<f32>;

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let p = vec2<i32>(pos.xy);
    let a = textureLoad(first_texture, p, 0);
    let b = textureLoad(second_texture, p, 0);
    return vec4<f32>(a.rgb * b.rgb, a.a);
}
"#;

    pub(super) struct GpuArithmetic {
        common: GpuOpCommon,
        mode: ArithmeticMode,
        value: f32,
        value_id: usize,
        texture_id: usize,
    }

    impl GpuArithmetic {
        pub(super) fn new(mode: ArithmeticMode, value: f32) -> Self {
            Self {
                common: GpuOpCommon::new(),
                mode,
                value,
                value_id: 0,
                texture_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuArithmetic {
        fn name(&self) -> &'static str {
            "arithmetic"
        }

        fn kernel_source(&self) -> &'static str {
            KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [
                ParameterDecl::new("Value", ParameterKind::Vec2),
                ParameterDecl::new("MainTexture", ParameterKind::Texture),
            ];
            if !self.common.initialize(device, "arithmetic", KERNEL, &decls) {
                return false;
            }

            self.value_id = self.common.parameter("Value");
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
                self.value_id,
                EffectParameterValue::Vec2([self.value, self.mode.shader_index()]),
            );
            effect.apply_parameter(
                self.texture_id,
                EffectParameterValue::Texture(std::sync::Arc::clone(texture)),
            );
        }
    }

    pub(super) struct GpuMergeMultiply {
        common: GpuOpCommon,
        first_id: usize,
        second_id: usize,
    }

    impl GpuMergeMultiply {
        pub(super) fn new() -> Self {
            Self {
                common: GpuOpCommon::new(),
                first_id: 0,
                second_id: 0,
            }
        }
    }

    impl GpuImageOperation for GpuMergeMultiply {
        fn name(&self) -> &'static str {
            "merge_multiply"
        }

        fn kernel_source(&self) -> &'static str {
            MERGE_KERNEL
        }

        fn initialize(&mut self, device: &gpu::BackendDevice) -> bool {
            let decls = [
                ParameterDecl::new("FirstTexture", ParameterKind::Texture),
                ParameterDecl::new("SecondTexture", ParameterKind::Texture),
            ];
            if !self
                .common
                .initialize(device, "merge_multiply", MERGE_KERNEL, &decls)
            {
                return false;
            }

            self.first_id = self.common.parameter("FirstTexture");
            self.second_id = self.common.parameter("SecondTexture");
            true
        }

        fn effect(&self) -> Option<&std::sync::Arc<gpu::Effect>> {
            self.common.effect()
        }

        fn submit_merge_parameters(
            &mut self,
            _device: &gpu::BackendDevice,
            _destination: &gpu::ImageObject,
            _source: &gpu::ImageObject,
            _area: Rect32I,
            texture: &std::sync::Arc<Texture>,
            other_texture: &std::sync::Arc<Texture>,
            _tx: usize,
            _ty: usize,
        ) {
            let effect = self.common.effect().expect("initialized");
            effect.apply_parameter(
                self.first_id,
                EffectParameterValue::Texture(std::sync::Arc::clone(texture)),
            );
            effect.apply_parameter(
                self.second_id,
                EffectParameterValue::Texture(std::sync::Arc::clone(other_texture)),
            );
        }
    }
}

fn arithmetic(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    mode: ArithmeticMode,
    value: f32,
) -> bool {
    if !compatible_operands(destination, source, area) {
        return false;
    }

    match (device, destination, source) {
        (Device::Cpu(dev), ImageObject::Cpu(dst), ImageObject::Cpu(src)) => {
            arithmetic_cpu(dev, dst, src, area, mode, value)
        }
        #[cfg(feature = "gpu")]
        (Device::Gpu(dev), ImageObject::Gpu(dst), ImageObject::Gpu(src)) => {
            let mut op = gpu_op::GpuArithmetic::new(mode, value);
            crate::dispatch::render_tiled_image_operation(dev, dst, src, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("arithmetic rejected: device and image backends differ");
            false
        }
    }
}

/// `destination = clamp(source + value)` per channel.
pub fn add(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    value: f32,
) -> bool {
    arithmetic(device, destination, source, area, ArithmeticMode::Add, value)
}

/// `destination = clamp(source - value)` per channel.
pub fn subtract(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    value: f32,
) -> bool {
    arithmetic(
        device,
        destination,
        source,
        area,
        ArithmeticMode::Subtract,
        value,
    )
}

/// `destination = clamp(source * value)` per channel.
pub fn multiply(
    device: &Device,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    value: f32,
) -> bool {
    arithmetic(
        device,
        destination,
        source,
        area,
        ArithmeticMode::Multiply,
        value,
    )
}

/// `destination = source0 * source1` per channel (two-source merge).
pub fn merge_multiply(
    device: &Device,
    destination: &mut ImageObject,
    source0: &ImageObject,
    source1: &ImageObject,
    area: Rect32I,
) -> bool {
    if !compatible_operands(destination, source0, area)
        || !compatible_operands(destination, source1, area)
    {
        return false;
    }

    match (device, destination, source0, source1) {
        (
            Device::Cpu(dev),
            ImageObject::Cpu(dst),
            ImageObject::Cpu(a),
            ImageObject::Cpu(b),
        ) => {
            use raster_fx::ApiImageObject;

            let kernel: CpuMergeKernel = match dst.format() {
                PixelFormat::Rgb8 | PixelFormat::Rgba8 => Arc::new(|dst, a, b, tile| {
                    kernel_merge_multiply::<u8>(dst, a, b, tile)
                }),
                PixelFormat::Rgb16 | PixelFormat::Rgba16 => Arc::new(|dst, a, b, tile| {
                    kernel_merge_multiply::<u16>(dst, a, b, tile)
                }),
                other => {
                    debug!("merge_multiply: no kernel specialization for {other}");
                    return false;
                }
            };

            cpu_execute_tile_based_merge(dev, dst, a, b, area, kernel, false)
        }
        #[cfg(feature = "gpu")]
        (
            Device::Gpu(dev),
            ImageObject::Gpu(dst),
            ImageObject::Gpu(a),
            ImageObject::Gpu(b),
        ) => {
            let mut op = gpu_op::GpuMergeMultiply::new();
            crate::dispatch::render_tiled_merge_operation(dev, dst, a, b, area, &mut op)
        }
        #[cfg(feature = "gpu")]
        _ => {
            debug!("merge_multiply rejected: device and image backends differ");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_fx::{ApiBackendDevice, ApiImageObject};

    fn image_filled(device: &Device, value: u8) -> ImageObject {
        let data = vec![value; 4 * 4 * 3];
        device
            .create_image_with_data(PixelFormat::Rgb8, 4, 4, &data)
            .unwrap()
    }

    #[test]
    fn test_add_clamps() {
        let device = Device::new_cpu();
        let source = image_filled(&device, 200);
        let mut destination = image_filled(&device, 0);

        // +0.5 of full scale = +128, clamped at 255
        assert!(add(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(4, 4),
            0.5
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 255));
    }

    #[test]
    fn test_subtract() {
        let device = Device::new_cpu();
        let source = image_filled(&device, 128);
        let mut destination = image_filled(&device, 0);

        assert!(subtract(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(4, 4),
            0.25
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        // 128/255 - 0.25 = 0.2519...; denormalized and rounded: 64
        assert!(out.iter().all(|&b| b == 64));
    }

    #[test]
    fn test_multiply_matches_brightness_semantics() {
        let device = Device::new_cpu();
        let source = image_filled(&device, 60);
        let mut destination = image_filled(&device, 0);

        assert!(multiply(
            &device,
            &mut destination,
            &source,
            Rect32I::from_size(4, 4),
            2.0
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 120));
    }

    #[test]
    fn test_merge_multiply() {
        let device = Device::new_cpu();
        let half = image_filled(&device, 128);
        let full = image_filled(&device, 255);
        let mut destination = image_filled(&device, 0);

        assert!(merge_multiply(
            &device,
            &mut destination,
            &half,
            &full,
            Rect32I::from_size(4, 4)
        ));

        let mut out = vec![0u8; 4 * 4 * 3];
        assert!(destination.retrieve(&mut out));
        assert!(out.iter().all(|&b| b == 128));
    }
}
