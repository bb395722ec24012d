//! The basic operation set.
//!
//! Each operation ships a CPU kernel family (monomorphized over
//! [`PixelChannel`]) and a GPU operation, behind one front function
//! that dispatches on the backend tag. Fronts return the boolean
//! contract: `false` means a precondition was violated (or a tile
//! failed) and the destination may not be fully written.
//!
//! [`PixelChannel`]: crate::channel::PixelChannel

mod arithmetic;
mod blit;
mod brightness;
mod fill;
mod monochrome;

pub use arithmetic::{add, merge_multiply, multiply, subtract};
pub use blit::blit;
pub use brightness::{adjust_brightness, adjust_brightness_curve};
pub use fill::fill;
pub use monochrome::convert_to_monochrome;

use raster_core::Rect32I;
use raster_fx::{ApiImageObject, ImageObject};
use tracing::debug;

/// Common destination/source precondition: non-empty, same format,
/// same dimensions, area inside both.
pub(crate) fn compatible_operands(
    destination: &ImageObject,
    source: &ImageObject,
    area: Rect32I,
) -> bool {
    if destination.is_empty() || source.is_empty() {
        debug!("operation rejected: empty operand");
        return false;
    }

    if destination.format() != source.format() {
        debug!(
            "operation rejected: format mismatch ({} vs {})",
            destination.format(),
            source.format()
        );
        return false;
    }

    if destination.width() != source.width() || destination.height() != source.height() {
        debug!("operation rejected: dimension mismatch");
        return false;
    }

    area_in_image(destination, area)
}

/// Destination-only precondition: non-empty, area inside.
pub(crate) fn area_in_image(destination: &ImageObject, area: Rect32I) -> bool {
    if destination.is_empty() {
        debug!("operation rejected: empty destination");
        return false;
    }

    let bounds = Rect32I::from_size(destination.width(), destination.height());
    if area.is_empty() || !bounds.contains_rect(&area) {
        debug!(
            "operation rejected: {area} outside {}x{}",
            destination.width(),
            destination.height()
        );
        return false;
    }

    true
}
