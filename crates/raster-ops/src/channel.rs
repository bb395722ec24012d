//! Channel element types the CPU kernels are specialized over.
//!
//! A small closed trait replaces per-kernel type switching: every
//! operation front matches on [`PixelFormat`] once and calls the
//! monomorphized kernel for the matching element type.
//!
//! [`PixelFormat`]: raster_core::PixelFormat

/// One channel element of a supported CPU pixel layout.
pub trait PixelChannel: bytemuck::Pod + Send + Sync + 'static {
    /// Full-scale channel value as f32.
    const FULL_SCALE: f32;

    /// Normalizes to [0, 1].
    fn to_f32(self) -> f32;

    /// Denormalizes from [0, 1], clamping and rounding.
    fn from_f32(v: f32) -> Self;

    /// Multiplies by `factor`, clamping to the representable range.
    fn scale_clamped(self, factor: f32) -> Self;
}

impl PixelChannel for u8 {
    const FULL_SCALE: f32 = u8::MAX as f32;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / Self::FULL_SCALE
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        (v.clamp(0.0, 1.0) * Self::FULL_SCALE).round() as u8
    }

    #[inline]
    fn scale_clamped(self, factor: f32) -> Self {
        (self as f32 * factor).clamp(0.0, Self::FULL_SCALE).round() as u8
    }
}

impl PixelChannel for u16 {
    const FULL_SCALE: f32 = u16::MAX as f32;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32 / Self::FULL_SCALE
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        (v.clamp(0.0, 1.0) * Self::FULL_SCALE).round() as u16
    }

    #[inline]
    fn scale_clamped(self, factor: f32) -> Self {
        (self as f32 * factor).clamp(0.0, Self::FULL_SCALE).round() as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_round_trip() {
        for v in [0u8, 1, 127, 254, 255] {
            assert_eq!(u8::from_f32(v.to_f32()), v);
        }
    }

    #[test]
    fn test_u16_round_trip() {
        for v in [0u16, 1, 32767, 65534, 65535] {
            assert_eq!(u16::from_f32(v.to_f32()), v);
        }
    }

    #[test]
    fn test_scale_clamps() {
        assert_eq!(10u8.scale_clamped(2.0), 20);
        assert_eq!(200u8.scale_clamped(2.0), 255);
        assert_eq!(100u8.scale_clamped(0.0), 0);
        assert_eq!(40000u16.scale_clamped(2.0), 65535);
    }

    #[test]
    fn test_from_f32_clamps() {
        assert_eq!(u8::from_f32(-0.5), 0);
        assert_eq!(u8::from_f32(1.5), 255);
        assert_eq!(u16::from_f32(0.5), 32768);
    }
}
