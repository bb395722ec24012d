//! Backend devices and image objects for the raster engine.
//!
//! Two interchangeable execution backends sit behind one interface:
//! a CPU path running tiled pixel kernels on a bounded worker pool,
//! and a GPU path rendering per-tile shader passes through wgpu
//! (behind the `wgpu` cargo feature).
//!
//! # Architecture
//!
//! ```text
//! Device / ImageObject (enum-tagged unions, chosen at construction)
//!     ├── backend::cpu — worker pool + buffer-backed images
//!     └── backend::gpu — wgpu context + tiled textures + effects
//! ```
//!
//! Filters never see a backend pointer they could miscast: the unions
//! carry the variant chosen at construction, and the dispatch helpers
//! in `raster-ops` are typed against the concrete backends.
//!
//! # Example
//!
//! ```rust
//! use raster_core::PixelFormat;
//! use raster_fx::{ApiBackendDevice, ApiImageObject, Device};
//!
//! let device = Device::new_cpu();
//! let mut image = device
//!     .create_image_sized(PixelFormat::Rgb8, 64, 64)
//!     .unwrap();
//! assert_eq!(image.width(), 64);
//! assert!(device.destroy_image(&mut image));
//! ```

pub mod backend;
pub mod device;

pub use device::{
    ApiBackendDevice, ApiImageObject, ApiPixelArray, BackendId, Device, ImageObject, PixelArray,
};

use thiserror::Error;

/// Result type alias using [`FxError`].
pub type FxResult<T> = std::result::Result<T, FxError>;

/// Failure modes of backend devices and image objects.
#[derive(Debug, Error)]
pub enum FxError {
    /// A core-layer failure (regions, buffers, allocator).
    #[error(transparent)]
    Core(#[from] raster_core::Error),

    /// The pixel format is not usable on this backend.
    #[error("unsupported pixel format: {format}")]
    UnsupportedFormat {
        /// Format name
        format: String,
    },

    /// No suitable GPU adapter was found.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The GPU device could not be created.
    #[error("failed to create device: {0}")]
    DeviceCreation(String),

    /// The GPU device lacks a feature the format requires.
    #[error("missing device feature for format {format}: {feature}")]
    MissingFeature {
        /// Format name
        format: String,
        /// Feature description
        feature: String,
    },

    /// An operation received objects from different backends.
    #[error("backend mismatch: expected {expected}, got {actual}")]
    BackendMismatch {
        /// Backend the call site expected
        expected: BackendId,
        /// Backend it got
        actual: BackendId,
    },
}

impl FxError {
    /// Creates an [`FxError::UnsupportedFormat`].
    #[inline]
    pub fn unsupported_format(format: impl std::fmt::Display) -> Self {
        Self::UnsupportedFormat {
            format: format.to_string(),
        }
    }
}
