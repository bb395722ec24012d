//! Compiled shader effects and their parameter tables.
//!
//! An [`Effect`] is one compiled program: the shared full-quad vertex
//! stage plus a per-effect fragment stage, built into a render
//! pipeline per destination format. Parameters are declared once,
//! resolved to slots at creation, and submitted per tile:
//!
//! - scalar, vector and matrix parameters pack into one uniform block
//!   (16-byte slots, declaration order),
//! - texture and pixel-array parameters occupy bind-group entries in
//!   declaration order, starting at binding 1.
//!
//! Binding state is explicit: [`Effect::bind`] marks the effect
//! active on a [`RenderContext`], draws validate against it, and
//! [`Effect::unbind`] clears it. Rebinding while another effect is
//! bound is a precondition violation, not a queue.
//!
//! # Shader conventions
//!
//! Fragment stages are WGSL `fs_main` entry points reading
//! `@builtin(position)`; the uniform block sits at `@group(0)
//! @binding(0)` as `array<vec4<f32>, N>`, textures follow from
//! binding 1. Kernels read source texels with `textureLoad` — tile
//! and fragment coordinates are identical by construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use raster_core::Rect32I;
use tracing::debug;

use super::context::Context;
use super::pixel_array::PixelArray;
use super::render_target::RenderTarget;
use super::resource::{GpuResource, UsageCounter};
use super::texture::{Texture, device_format};
use crate::backend::next_object_id;
use crate::FxResult;

/// The shared vertex stage: one triangle covering the whole tile.
pub const VERTEX_STAGE: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(index) / 2) * 4.0 - 1.0;
    let y = f32(i32(index) & 1) * 4.0 - 1.0;
    return vec4<f32>(x, y, 0.0, 1.0);
}
"#;

/// Declared type of one effect parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Scalar integer (stored as f32 in the uniform block).
    Int,
    /// Scalar float.
    Float,
    /// Two-component vector.
    Vec2,
    /// Three-component vector.
    Vec3,
    /// Four-component vector.
    Vec4,
    /// 3x3 matrix (three padded rows).
    Mat3,
    /// 4x4 matrix.
    Mat4,
    /// A 2D tile texture.
    Texture,
    /// A 1D pixel array (lookup table).
    PixelArray,
}

impl ParameterKind {
    /// Uniform slots (16 bytes each) the kind occupies; 0 for
    /// texture-like kinds.
    const fn uniform_slots(self) -> usize {
        match self {
            Self::Int | Self::Float | Self::Vec2 | Self::Vec3 | Self::Vec4 => 1,
            Self::Mat3 => 3,
            Self::Mat4 => 4,
            Self::Texture | Self::PixelArray => 0,
        }
    }

    const fn is_texture(self) -> bool {
        matches!(self, Self::Texture | Self::PixelArray)
    }
}

/// One entry of an effect's parameter declaration.
#[derive(Debug, Clone)]
pub struct ParameterDecl {
    /// Parameter name, unique within the effect.
    pub name: &'static str,
    /// Declared type.
    pub kind: ParameterKind,
}

impl ParameterDecl {
    /// Creates a declaration entry.
    pub const fn new(name: &'static str, kind: ParameterKind) -> Self {
        Self { name, kind }
    }
}

/// A value submitted for one parameter.
#[derive(Clone)]
pub enum EffectParameterValue {
    /// Scalar integer.
    Int(i32),
    /// Scalar float.
    Float(f32),
    /// Two-component vector.
    Vec2([f32; 2]),
    /// Three-component vector.
    Vec3([f32; 3]),
    /// Four-component vector.
    Vec4([f32; 4]),
    /// 3x3 matrix, row-major.
    Mat3([f32; 9]),
    /// 4x4 matrix, row-major.
    Mat4([f32; 16]),
    /// A 2D tile texture.
    Texture(Arc<Texture>),
    /// A 1D pixel array.
    PixelArray(Arc<PixelArray>),
}

impl EffectParameterValue {
    fn kind(&self) -> ParameterKind {
        match self {
            Self::Int(_) => ParameterKind::Int,
            Self::Float(_) => ParameterKind::Float,
            Self::Vec2(_) => ParameterKind::Vec2,
            Self::Vec3(_) => ParameterKind::Vec3,
            Self::Vec4(_) => ParameterKind::Vec4,
            Self::Mat3(_) => ParameterKind::Mat3,
            Self::Mat4(_) => ParameterKind::Mat4,
            Self::Texture(_) => ParameterKind::Texture,
            Self::PixelArray(_) => ParameterKind::PixelArray,
        }
    }
}

enum TextureBinding {
    Texture(Arc<Texture>),
    PixelArray(Arc<PixelArray>),
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Byte offset into the uniform block.
    Uniform(usize),
    /// Index into the texture binding list (binding = 1 + index).
    Texture(usize),
}

struct Parameter {
    name: &'static str,
    kind: ParameterKind,
    slot: Slot,
}

struct Staging {
    uniform_bytes: Vec<u8>,
    textures: Vec<Option<TextureBinding>>,
    bind_group: Option<wgpu::BindGroup>,
}

/// The single active-program slot of one GPU device.
///
/// Passed explicitly through bind/draw/unbind instead of living in
/// ambient global state; the device hands it out behind a mutex, which
/// also serializes submission.
#[derive(Debug, Default)]
pub struct RenderContext {
    active: Option<u64>,
}

impl RenderContext {
    /// A context with no active effect.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the currently bound effect, if any.
    #[inline]
    pub fn active_effect(&self) -> Option<u64> {
        self.active
    }
}

/// A compiled kernel program with named parameters.
pub struct Effect {
    id: u64,
    name: String,
    kernel_source: String,
    module: wgpu::ShaderModule,
    bind_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: Mutex<HashMap<wgpu::TextureFormat, Arc<wgpu::RenderPipeline>>>,
    params: Vec<Parameter>,
    uniform: wgpu::Buffer,
    uniform_size: usize,
    staging: Mutex<Staging>,
    usage: UsageCounter,
}

impl Effect {
    /// Compiles an effect from its fragment stage and parameter
    /// declaration.
    pub fn new(
        ctx: &Context,
        name: &str,
        kernel_source: &str,
        decls: &[ParameterDecl],
    ) -> FxResult<Arc<Self>> {
        let mut params = Vec::with_capacity(decls.len());
        let mut uniform_slots = 0usize;
        let mut texture_count = 0usize;
        let mut layout_entries = Vec::new();

        for decl in decls {
            let slot = if decl.kind.is_texture() {
                let index = texture_count;
                texture_count += 1;

                layout_entries.push(wgpu::BindGroupLayoutEntry {
                    binding: (1 + index) as u32,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: if decl.kind == ParameterKind::PixelArray {
                            wgpu::TextureViewDimension::D1
                        } else {
                            wgpu::TextureViewDimension::D2
                        },
                        multisampled: false,
                    },
                    count: None,
                });

                Slot::Texture(index)
            } else {
                let offset = uniform_slots * 16;
                uniform_slots += decl.kind.uniform_slots();
                Slot::Uniform(offset)
            };

            params.push(Parameter {
                name: decl.name,
                kind: decl.kind,
                slot,
            });
        }

        let uniform_size = (uniform_slots.max(1)) * 16;

        // binding 0 is always the uniform block; shaders without
        // scalar parameters simply never read it
        layout_entries.insert(
            0,
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        );

        let device = ctx.device();

        let source = format!("{VERTEX_STAGE}\n{kernel_source}");
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(name),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(name),
            entries: &layout_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&bind_layout],
            push_constant_ranges: &[],
        });

        let uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(name),
            size: uniform_size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Arc::new(Self {
            id: next_object_id(),
            name: name.to_owned(),
            kernel_source: kernel_source.to_owned(),
            module,
            bind_layout,
            pipeline_layout,
            pipelines: Mutex::new(HashMap::new()),
            params,
            uniform,
            uniform_size,
            staging: Mutex::new(Staging {
                uniform_bytes: vec![0; uniform_size],
                textures: (0..texture_count).map(|_| None).collect(),
                bind_group: None,
            }),
            usage: UsageCounter::new(),
        }))
    }

    /// Process-unique effect id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Effect name (for labels and diagnostics).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fragment source this effect was compiled from — the pool's
    /// reuse key.
    #[inline]
    pub fn kernel_source(&self) -> &str {
        &self.kernel_source
    }

    /// `true` if a parameter of that name was declared.
    pub fn contains_parameter(&self, name: &str) -> bool {
        self.parameter_id(name).is_some()
    }

    /// Resolves a parameter name to its id.
    pub fn parameter_id(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Submits a value for the parameter `id`.
    ///
    /// The value's type must match the declaration; a mismatch is
    /// rejected without touching state.
    pub fn apply_parameter(&self, id: usize, value: EffectParameterValue) -> bool {
        let Some(param) = self.params.get(id) else {
            debug!("effect {}: unknown parameter id {id}", self.name);
            return false;
        };

        if param.kind != value.kind() {
            debug!(
                "effect {}: parameter {} declared {:?}, got {:?}",
                self.name,
                param.name,
                param.kind,
                value.kind()
            );
            return false;
        }

        let mut staging = self.staging.lock().expect("effect staging");

        match (param.slot, value) {
            (Slot::Uniform(offset), value) => {
                let floats: Vec<f32> = match value {
                    EffectParameterValue::Int(v) => vec![v as f32],
                    EffectParameterValue::Float(v) => vec![v],
                    EffectParameterValue::Vec2(v) => v.to_vec(),
                    EffectParameterValue::Vec3(v) => v.to_vec(),
                    EffectParameterValue::Vec4(v) => v.to_vec(),
                    EffectParameterValue::Mat3(v) => {
                        // three vec4-padded rows
                        let mut rows = vec![0.0; 12];
                        for r in 0..3 {
                            rows[r * 4..r * 4 + 3].copy_from_slice(&v[r * 3..r * 3 + 3]);
                        }
                        rows
                    }
                    EffectParameterValue::Mat4(v) => v.to_vec(),
                    _ => unreachable!("texture kinds have texture slots"),
                };

                let bytes: &[u8] = bytemuck::cast_slice(&floats);
                staging.uniform_bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
            (Slot::Texture(index), EffectParameterValue::Texture(texture)) => {
                staging.textures[index] = Some(TextureBinding::Texture(texture));
                staging.bind_group = None;
            }
            (Slot::Texture(index), EffectParameterValue::PixelArray(array)) => {
                staging.textures[index] = Some(TextureBinding::PixelArray(array));
                staging.bind_group = None;
            }
            _ => unreachable!("kind checked above"),
        }

        true
    }

    /// Marks this effect active on the render context.
    ///
    /// Not reentrant: fails while any effect (including this one) is
    /// bound.
    pub fn bind(&self, rc: &mut RenderContext) -> bool {
        if let Some(active) = rc.active {
            debug!(
                "effect {}: bind rejected, effect {active} still bound",
                self.name
            );
            return false;
        }

        rc.active = Some(self.id);
        true
    }

    /// Clears the active slot; `false` if another effect was bound.
    pub fn unbind(&self, rc: &mut RenderContext) -> bool {
        if rc.active != Some(self.id) {
            debug!("effect {}: unbind rejected, not the bound effect", self.name);
            return false;
        }

        rc.active = None;
        true
    }

    /// Rebuilds the texture bindings in declaration order.
    ///
    /// Every declared texture parameter must have a submitted value;
    /// call after the per-tile parameter submission, before the draw.
    pub fn update_texture_parameters(&self, ctx: &Context) -> bool {
        let mut staging = self.staging.lock().expect("effect staging");

        // detach the bindings from the staging borrow so the bind
        // group can be stored back into it
        let mut held = Vec::with_capacity(staging.textures.len());
        for (index, binding) in staging.textures.iter().enumerate() {
            match binding {
                Some(TextureBinding::Texture(texture)) => {
                    held.push(TextureBinding::Texture(Arc::clone(texture)));
                }
                Some(TextureBinding::PixelArray(array)) => {
                    held.push(TextureBinding::PixelArray(Arc::clone(array)));
                }
                None => {
                    debug!(
                        "effect {}: texture parameter {index} was never submitted",
                        self.name
                    );
                    return false;
                }
            }
        }

        let mut entries = Vec::with_capacity(1 + held.len());
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: self.uniform.as_entire_binding(),
        });

        for (index, binding) in held.iter().enumerate() {
            let view = match binding {
                TextureBinding::Texture(texture) => texture.view(),
                TextureBinding::PixelArray(array) => array.view(),
            };

            entries.push(wgpu::BindGroupEntry {
                binding: (1 + index) as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.name),
            layout: &self.bind_layout,
            entries: &entries,
        });

        drop(entries);
        staging.bind_group = Some(bind_group);
        true
    }

    /// Draws the full-tile quad into `target`, constrained to the
    /// tile-local `area`.
    ///
    /// The effect must be bound on `rc` and
    /// [`update_texture_parameters`](Self::update_texture_parameters)
    /// must have succeeded since the last texture change.
    pub fn draw(
        &self,
        ctx: &Context,
        rc: &RenderContext,
        target: &RenderTarget,
        area: Rect32I,
    ) -> bool {
        if rc.active != Some(self.id) {
            debug!("effect {}: draw rejected, effect not bound", self.name);
            return false;
        }

        let target_bounds = Rect32I::from_size(target.width(), target.height());
        if area.is_empty() || !target_bounds.contains_rect(&area) {
            debug!(
                "effect {}: draw rejected, {area} outside target {}x{}",
                self.name,
                target.width(),
                target.height()
            );
            return false;
        }

        let pipeline = match self.pipeline_for(ctx, target) {
            Some(pipeline) => pipeline,
            None => return false,
        };

        let staging = self.staging.lock().expect("effect staging");
        let Some(bind_group) = staging.bind_group.as_ref() else {
            debug!(
                "effect {}: draw rejected, texture parameters not updated",
                self.name
            );
            return false;
        };

        ctx.queue()
            .write_buffer(&self.uniform, 0, &staging.uniform_bytes);

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&self.name),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&self.name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.set_viewport(
                0.0,
                0.0,
                target.width() as f32,
                target.height() as f32,
                0.0,
                1.0,
            );
            pass.set_scissor_rect(
                area.x as u32,
                area.y as u32,
                area.width as u32,
                area.height as u32,
            );
            pass.draw(0..3, 0..1);
        }

        ctx.queue().submit(Some(encoder.finish()));
        true
    }

    fn pipeline_for(&self, ctx: &Context, target: &RenderTarget) -> Option<Arc<wgpu::RenderPipeline>> {
        let format = match device_format(target.texture().format(), ctx.features()) {
            Ok(format) => format,
            Err(err) => {
                debug!("effect {}: no pipeline target format: {err}", self.name);
                return None;
            }
        };

        let mut pipelines = self.pipelines.lock().expect("pipeline cache");

        let pipeline = pipelines.entry(format).or_insert_with(|| {
            Arc::new(
                ctx.device()
                    .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(&self.name),
                        layout: Some(&self.pipeline_layout),
                        vertex: wgpu::VertexState {
                            module: &self.module,
                            entry_point: Some("vs_main"),
                            buffers: &[],
                            compilation_options: Default::default(),
                        },
                        fragment: Some(wgpu::FragmentState {
                            module: &self.module,
                            entry_point: Some("fs_main"),
                            targets: &[Some(wgpu::ColorTargetState {
                                format,
                                blend: None,
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                            compilation_options: Default::default(),
                        }),
                        primitive: wgpu::PrimitiveState::default(),
                        depth_stencil: None,
                        multisample: wgpu::MultisampleState::default(),
                        multiview: None,
                        cache: None,
                    }),
            )
        });

        Some(Arc::clone(pipeline))
    }
}

impl GpuResource for Effect {
    fn gpu_memory_consumption(&self) -> usize {
        self.uniform_size
    }

    fn cpu_memory_consumption(&self) -> usize {
        size_of::<Self>() + self.kernel_source.len()
    }

    fn usage(&self) -> &UsageCounter {
        &self.usage
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.name)
            .field("parameters", &self.params.len())
            .finish()
    }
}
