//! Core types for the raster engine.
//!
//! This crate carries everything the backends agree on before any
//! rendering happens:
//!
//! - [`PixelFormat`] — the closed pixel layout table
//! - [`Rect32I`] — area-of-effect rectangles
//! - [`Bitmap`] / [`BitmapInfo`] — the import/export exchange triple
//! - [`Curve`] — tone curves and their baked lookup tables
//! - [`pool`] — the pooled buffer allocators backing hot rendering
//!   paths
//! - [`Error`] — the shared failure taxonomy

pub mod bitmap;
pub mod curve;
pub mod error;
pub mod format;
pub mod pool;
pub mod rect;

pub use bitmap::{Bitmap, BitmapInfo};
pub use curve::{Curve, CurvePoint};
pub use error::{Error, Result};
pub use format::PixelFormat;
pub use pool::{
    AllocatorPolicy, Blob, DynamicPoolAllocator, FixedPoolAllocator, GenericPolicy, PoolRef,
    StdDynamicPoolAllocator,
};
pub use rect::Rect32I;
