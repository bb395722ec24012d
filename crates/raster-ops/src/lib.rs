//! Tile dispatch and image operations for the raster engine.
//!
//! This crate drives the backends from `raster-fx`:
//!
//! - [`dispatch`] — the tile executors: worker-pool kernels on the
//!   CPU, per-tile render passes on the GPU (feature `gpu`)
//! - [`operation`] — the [`GpuImageOperation`] abstraction operations
//!   implement (feature `gpu`)
//! - [`ops`] — the basic operation set (fill, blit, arithmetic,
//!   brightness, monochrome), each a backend-dispatching front
//! - [`filter`] — the `process(device, destination, source) -> bool`
//!   consumer contract
//!
//! [`GpuImageOperation`]: operation::GpuImageOperation

pub mod channel;
pub mod dispatch;
pub mod filter;
pub mod ops;

#[cfg(feature = "gpu")]
pub mod operation;

pub use channel::PixelChannel;
pub use filter::{BrightnessFilter, Filter};
pub use ops::{
    add, adjust_brightness, adjust_brightness_curve, blit, convert_to_monochrome, fill,
    merge_multiply, multiply, subtract,
};

#[cfg(feature = "gpu")]
pub use operation::{GpuImageOperation, GpuOpCommon};
