//! The GPU backend: wgpu context, tiled images, shader effects.

mod context;
mod device;
mod effect;
mod image;
mod pixel_array;
mod pool;
mod render_target;
mod resource;
mod texture;

pub use context::{Context, MAX_TILE_EDGE};
pub use device::BackendDevice;
pub use effect::{
    Effect, EffectParameterValue, ParameterDecl, ParameterKind, RenderContext, VERTEX_STAGE,
};
pub use image::ImageObject;
pub use pixel_array::PixelArray;
pub use pool::{EffectPool, ResourcePool, TexturePool};
pub use render_target::RenderTarget;
pub use resource::{GpuResource, UsageCounter};
pub use texture::Texture;
