//! Tile render dispatch on the GPU backend.
//!
//! Drives one [`GpuImageOperation`] across the destination's tile
//! grid: intersect each tile's base rectangle with the target area,
//! skip empty intersections, translate to tile-local coordinates,
//! then bind/submit/draw into that tile's render target. Sparse by
//! construction — a localized edit touches only the tiles it
//! intersects.
//!
//! Calls are sequential: GPU submission runs single-threaded through
//! the device's render context, whose lock is held for the whole
//! dispatch. A failed tile aborts the call but leaves already-drawn
//! tiles in place — dispatch is not atomic.

use raster_core::Rect32I;
use raster_fx::ApiImageObject;
use raster_fx::backend::gpu::{BackendDevice, ImageObject};
use tracing::debug;

use crate::operation::GpuImageOperation;

fn check_compatible(
    destination: &ImageObject,
    source: &ImageObject,
    area: Rect32I,
) -> bool {
    if destination.tile_count() != source.tile_count() {
        debug!(
            "tile dispatch rejected: tile counts differ ({} vs {})",
            destination.tile_count(),
            source.tile_count()
        );
        return false;
    }

    if destination.width() != source.width() || destination.height() != source.height() {
        debug!("tile dispatch rejected: dimensions differ");
        return false;
    }

    let bounds = Rect32I::from_size(destination.width(), destination.height());
    if area.is_empty() || !bounds.contains_rect(&area) {
        debug!("tile dispatch rejected: {area} outside image bounds");
        return false;
    }

    true
}

/// Renders a single-source operation over `area`.
///
/// Returns `false` — with no drawing performed — when the operation
/// fails to initialize or the objects are incompatible; returns
/// `false` with earlier tiles drawn when a mid-run tile fails.
pub fn render_tiled_image_operation(
    device: &BackendDevice,
    destination: &ImageObject,
    source: &ImageObject,
    area: Rect32I,
    operation: &mut dyn GpuImageOperation,
) -> bool {
    if !operation.initialize(device) {
        debug!("render_tiled_image_operation: failed to initialize operation");
        return false;
    }

    if !check_compatible(destination, source, area) {
        return false;
    }

    let effect = match operation.effect() {
        Some(effect) => std::sync::Arc::clone(effect),
        None => return false,
    };

    let horizontal = source.count_horizontal_tiles();
    let vertical = source.count_vertical_tiles();

    let mut rc = device.render_context();
    if !effect.bind(&mut rc) {
        return false;
    }

    let mut ok = true;

    'tiles: for ty in 0..vertical {
        for tx in 0..horizontal {
            let base_area = destination.tile_area(tx, ty);
            let Some(hit) = base_area.intersect(&area) else {
                continue;
            };

            let render_area = hit.translated(-base_area.x, -base_area.y);
            let source_tile = source.tile_texture(tx, ty);

            operation.submit_parameters(
                device,
                destination,
                source,
                base_area,
                source_tile,
                tx,
                ty,
            );

            if !effect.update_texture_parameters(device.context()) {
                ok = false;
                break 'tiles;
            }

            let target = destination.tile_render_target(tx, ty);
            if !effect.draw(device.context(), &rc, target, render_area) {
                ok = false;
                break 'tiles;
            }
        }
    }

    effect.unbind(&mut rc);
    ok
}

/// Renders a two-source merge operation over `area`.
///
/// Both sources must share the destination's tile layout and
/// dimensions.
pub fn render_tiled_merge_operation(
    device: &BackendDevice,
    destination: &ImageObject,
    source0: &ImageObject,
    source1: &ImageObject,
    area: Rect32I,
    operation: &mut dyn GpuImageOperation,
) -> bool {
    if !operation.initialize(device) {
        debug!("render_tiled_merge_operation: failed to initialize operation");
        return false;
    }

    if !check_compatible(destination, source0, area)
        || !check_compatible(destination, source1, area)
    {
        return false;
    }

    let effect = match operation.effect() {
        Some(effect) => std::sync::Arc::clone(effect),
        None => return false,
    };

    let horizontal = source0.count_horizontal_tiles();
    let vertical = source0.count_vertical_tiles();

    let mut rc = device.render_context();
    if !effect.bind(&mut rc) {
        return false;
    }

    let mut ok = true;

    'tiles: for ty in 0..vertical {
        for tx in 0..horizontal {
            let base_area = destination.tile_area(tx, ty);
            let Some(hit) = base_area.intersect(&area) else {
                continue;
            };

            let render_area = hit.translated(-base_area.x, -base_area.y);
            let first_tile = source0.tile_texture(tx, ty);
            let second_tile = source1.tile_texture(tx, ty);

            operation.submit_merge_parameters(
                device,
                destination,
                source0,
                base_area,
                first_tile,
                second_tile,
                tx,
                ty,
            );

            if !effect.update_texture_parameters(device.context()) {
                ok = false;
                break 'tiles;
            }

            let target = destination.tile_render_target(tx, ty);
            if !effect.draw(device.context(), &rc, target, render_area) {
                ok = false;
                break 'tiles;
            }
        }
    }

    effect.unbind(&mut rc);
    ok
}
