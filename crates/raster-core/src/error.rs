//! Error types for raster-core operations.
//!
//! One [`Error`] enum covers buffer, format, dimension, and allocator
//! failure modes. Backend crates wrap it into their own error types;
//! the filter boundary flattens everything to the boolean contract.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by core types and the pooled allocators.
#[derive(Debug, Error)]
pub enum Error {
    /// A region does not fit the addressed plane.
    #[error("region ({rx}, {ry}, {rw}x{rh}) exceeds bounds {width}x{height}")]
    InvalidRegion {
        /// Region X origin
        rx: i32,
        /// Region Y origin
        ry: i32,
        /// Region width
        rw: i32,
        /// Region height
        rh: i32,
        /// Plane width
        width: i32,
        /// Plane height
        height: i32,
    },

    /// The pixel format is not usable for this operation.
    #[error("unsupported pixel format: {format}")]
    UnsupportedFormat {
        /// Format name
        format: String,
    },

    /// Width or height is invalid for the requested object.
    #[error("invalid dimensions: {width}x{height} ({reason})")]
    InvalidDimensions {
        /// Requested width
        width: i32,
        /// Requested height
        height: i32,
        /// Why the dimensions are rejected
        reason: String,
    },

    /// A caller-supplied buffer does not match the expected size.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        /// Expected byte count
        expected: usize,
        /// Provided byte count
        actual: usize,
    },

    /// An allocation request could not be served.
    #[error("failed to allocate {requested} bytes: {reason}")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Failure reason
        reason: String,
    },

    /// Pool bookkeeping is corrupt: an entry grown for a request was
    /// not found on the retry scan. This is a hard error, never
    /// silently substituted with another entry.
    #[error("pool integrity violation: no entry of {requested} bytes after growth")]
    PoolIntegrity {
        /// Aligned byte length that was grown for
        requested: usize,
    },
}

impl Error {
    /// Creates an [`Error::InvalidRegion`].
    #[inline]
    pub fn invalid_region(rect: crate::Rect32I, width: i32, height: i32) -> Self {
        Self::InvalidRegion {
            rx: rect.x,
            ry: rect.y,
            rw: rect.width,
            rh: rect.height,
            width,
            height,
        }
    }

    /// Creates an [`Error::UnsupportedFormat`].
    #[inline]
    pub fn unsupported_format(format: impl std::fmt::Display) -> Self {
        Self::UnsupportedFormat {
            format: format.to_string(),
        }
    }

    /// Creates an [`Error::InvalidDimensions`].
    #[inline]
    pub fn invalid_dimensions(width: i32, height: i32, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            width,
            height,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::AllocationFailed`].
    #[inline]
    pub fn allocation_failed(requested: usize, reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            requested,
            reason: reason.into(),
        }
    }

    /// `true` for bounds/region errors.
    #[inline]
    pub fn is_bounds_error(&self) -> bool {
        matches!(self, Self::InvalidRegion { .. })
    }

    /// `true` for allocator errors, including integrity violations.
    #[inline]
    pub fn is_allocation_error(&self) -> bool {
        matches!(
            self,
            Self::AllocationFailed { .. } | Self::PoolIntegrity { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Rect32I;

    #[test]
    fn test_invalid_region_message() {
        let err = Error::invalid_region(Rect32I::new(10, 20, 100, 50), 64, 48);
        let msg = err.to_string();
        assert!(msg.contains("100x50"));
        assert!(msg.contains("64x48"));
        assert!(err.is_bounds_error());
    }

    #[test]
    fn test_pool_integrity_is_allocation_error() {
        let err = Error::PoolIntegrity { requested: 4096 };
        assert!(err.is_allocation_error());
        assert!(err.to_string().contains("4096"));
    }

    #[test]
    fn test_unsupported_format() {
        let err = Error::unsupported_format(crate::PixelFormat::Mono32F);
        assert!(err.to_string().contains("Mono32F"));
    }
}
