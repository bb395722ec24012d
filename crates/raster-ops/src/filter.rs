//! The filter consumer contract.
//!
//! Filters are the outermost engine surface: given a device and a
//! destination/source pair, they run their operations over the whole
//! image and report plain success or failure. Format and emptiness
//! checks happen here, before any dispatch.

use raster_core::{Curve, Rect32I};
use raster_fx::{ApiImageObject, Device, ImageObject};
use tracing::debug;

use crate::ops;

/// A parametric image filter.
pub trait Filter {
    /// Filter name, for presets and diagnostics.
    fn name(&self) -> &str;

    /// Applies the filter from `source` into `destination`.
    ///
    /// Returns `false` when preconditions fail or any dispatch step
    /// fails; `destination` may then be partially written but never
    /// corrupted beyond its own bounds.
    fn process(
        &self,
        device: &Device,
        destination: &mut ImageObject,
        source: &ImageObject,
    ) -> bool;
}

/// Brightness adjustment as a filter: a tone curve baked once and
/// applied to the whole image.
pub struct BrightnessFilter {
    curve: Curve,
    baked: Vec<f32>,
}

impl BrightnessFilter {
    /// Samples the curve holds per baked table.
    const BAKED_SAMPLES: usize = 1024;

    /// Creates the filter from a tone curve.
    pub fn new(curve: Curve) -> Self {
        let baked = curve.bake(Self::BAKED_SAMPLES);
        Self { curve, baked }
    }

    /// A plain linear gain filter.
    pub fn linear(gain: f32) -> Self {
        Self::new(Curve::linear(gain))
    }

    /// The underlying curve.
    pub fn curve(&self) -> &Curve {
        &self.curve
    }
}

impl Filter for BrightnessFilter {
    fn name(&self) -> &str {
        "brightness"
    }

    fn process(
        &self,
        device: &Device,
        destination: &mut ImageObject,
        source: &ImageObject,
    ) -> bool {
        if source.is_empty() || destination.is_empty() {
            debug!("brightness filter rejected: empty image");
            return false;
        }

        if source.format() != destination.format() {
            debug!("brightness filter rejected: format mismatch");
            return false;
        }

        let area = Rect32I::from_size(source.width(), source.height());
        ops::adjust_brightness_curve(device, destination, source, area, &self.baked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raster_core::{CurvePoint, PixelFormat};
    use raster_fx::ApiBackendDevice;

    #[test]
    fn test_identity_filter_preserves_pixels() {
        let device = Device::new_cpu();

        let data: Vec<u8> = (0..4 * 4 * 3).map(|i| (i * 11 % 256) as u8).collect();
        let source = device
            .create_image_with_data(PixelFormat::Rgb8, 4, 4, &data)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        let filter = BrightnessFilter::new(Curve::from_points(vec![
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(1.0, 1.0),
        ]));
        assert!(filter.process(&device, &mut destination, &source));

        let mut out = vec![0u8; data.len()];
        assert!(destination.retrieve(&mut out));

        for (got, want) in out.iter().zip(&data) {
            assert!((*got as i32 - *want as i32).abs() <= 1, "{got} vs {want}");
        }
    }

    #[test]
    fn test_filter_rejects_format_mismatch() {
        let device = Device::new_cpu();
        let source = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgba8, 4, 4)
            .unwrap();

        let filter = BrightnessFilter::linear(1.0);
        assert!(!filter.process(&device, &mut destination, &source));
    }

    #[test]
    fn test_filter_rejects_empty_image() {
        let device = Device::new_cpu();
        let source = device.create_image().unwrap();
        let mut destination = device
            .create_image_sized(PixelFormat::Rgb8, 4, 4)
            .unwrap();

        let filter = BrightnessFilter::linear(1.0);
        assert!(!filter.process(&device, &mut destination, &source));
    }
}
