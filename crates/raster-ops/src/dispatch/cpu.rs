//! Tile-based kernel execution on the CPU backend.
//!
//! The target area is split into bounded tiles, each submitted to the
//! device's worker pool as one job. Jobs hold `Arc` views of the pixel
//! stores, so buffers outlive in-flight work; destination tiles are
//! disjoint, which is what makes the shared-store writes race-free.
//!
//! With `manual_sync = false` the call joins the pool before
//! returning. With `manual_sync = true` it returns immediately and
//! callers must `device.synchronize()` before relying on results.

use std::sync::Arc;

use raster_core::Rect32I;
use raster_fx::backend::cpu::{BackendDevice, ImageObject, KernelView};
use raster_fx::{ApiBackendDevice, ApiImageObject};
use tracing::debug;

/// Edge length of one CPU dispatch tile.
pub const CPU_TILE_EDGE: i32 = 1024;

/// A pixel kernel over (destination, source, area).
pub type CpuKernel = Arc<dyn Fn(&KernelView, &KernelView, Rect32I) + Send + Sync>;

/// A pixel kernel over (destination, area) for in-place operations.
pub type CpuKernelInPlace = Arc<dyn Fn(&KernelView, Rect32I) + Send + Sync>;

/// A pixel kernel over (destination, two sources, area).
pub type CpuMergeKernel = Arc<dyn Fn(&KernelView, &KernelView, &KernelView, Rect32I) + Send + Sync>;

fn area_fits(image_width: i32, image_height: i32, area: Rect32I) -> bool {
    Rect32I::from_size(image_width, image_height).contains_rect(&area)
}

/// Splits `area` into dispatch tiles.
fn dispatch_tiles(area: Rect32I) -> Vec<Rect32I> {
    let mut tiles = Vec::new();

    let mut y = 0;
    while y < area.height {
        let th = CPU_TILE_EDGE.min(area.height - y);
        let mut x = 0;
        while x < area.width {
            let tw = CPU_TILE_EDGE.min(area.width - x);
            tiles.push(Rect32I::new(area.x + x, area.y + y, tw, th));
            x += CPU_TILE_EDGE;
        }
        y += CPU_TILE_EDGE;
    }

    tiles
}

/// Runs `kernel` over `area`, one worker-pool job per dispatch tile.
pub fn cpu_execute_tile_based(
    device: &BackendDevice,
    destination: &mut ImageObject,
    source: &ImageObject,
    area: Rect32I,
    kernel: CpuKernel,
    manual_sync: bool,
) -> bool {
    let (Some(dst), Some(src)) = (destination.kernel_view(), source.kernel_view()) else {
        debug!("cpu dispatch rejected: empty operand");
        return false;
    };

    if area.is_empty()
        || !area_fits(destination.width(), destination.height(), area)
        || !area_fits(source.width(), source.height(), area)
    {
        debug!("cpu dispatch rejected: {area} outside operands");
        return false;
    }

    for tile in dispatch_tiles(area) {
        let kernel = Arc::clone(&kernel);
        let dst = dst.clone();
        let src = src.clone();
        device
            .worker_pool()
            .spawn(move || kernel(&dst, &src, tile));
    }

    if !manual_sync {
        device.synchronize();
    }

    true
}

/// Runs an in-place `kernel` over `area` of `destination`.
pub fn cpu_execute_tile_based_in_place(
    device: &BackendDevice,
    destination: &mut ImageObject,
    area: Rect32I,
    kernel: CpuKernelInPlace,
    manual_sync: bool,
) -> bool {
    let Some(dst) = destination.kernel_view() else {
        debug!("cpu dispatch rejected: empty destination");
        return false;
    };

    if area.is_empty() || !area_fits(destination.width(), destination.height(), area) {
        debug!("cpu dispatch rejected: {area} outside destination");
        return false;
    }

    for tile in dispatch_tiles(area) {
        let kernel = Arc::clone(&kernel);
        let dst = dst.clone();
        device.worker_pool().spawn(move || kernel(&dst, tile));
    }

    if !manual_sync {
        device.synchronize();
    }

    true
}

/// Runs a two-source merge `kernel` over `area`.
pub fn cpu_execute_tile_based_merge(
    device: &BackendDevice,
    destination: &mut ImageObject,
    source0: &ImageObject,
    source1: &ImageObject,
    area: Rect32I,
    kernel: CpuMergeKernel,
    manual_sync: bool,
) -> bool {
    let (Some(dst), Some(src0), Some(src1)) = (
        destination.kernel_view(),
        source0.kernel_view(),
        source1.kernel_view(),
    ) else {
        debug!("cpu merge dispatch rejected: empty operand");
        return false;
    };

    if area.is_empty()
        || !area_fits(destination.width(), destination.height(), area)
        || !area_fits(source0.width(), source0.height(), area)
        || !area_fits(source1.width(), source1.height(), area)
    {
        debug!("cpu merge dispatch rejected: {area} outside operands");
        return false;
    }

    for tile in dispatch_tiles(area) {
        let kernel = Arc::clone(&kernel);
        let dst = dst.clone();
        let src0 = src0.clone();
        let src1 = src1.clone();
        device
            .worker_pool()
            .spawn(move || kernel(&dst, &src0, &src1, tile));
    }

    if !manual_sync {
        device.synchronize();
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_tiles_cover_area_exactly() {
        let area = Rect32I::new(100, 200, 2500, 1100);
        let tiles = dispatch_tiles(area);

        let total: i64 = tiles.iter().map(|t| t.area()).sum();
        assert_eq!(total, area.area());

        for pair in tiles.iter().enumerate() {
            for other in tiles.iter().skip(pair.0 + 1) {
                assert!(pair.1.intersect(other).is_none(), "tiles overlap");
            }
            assert!(area.contains_rect(pair.1));
        }
    }

    #[test]
    fn test_small_area_is_one_tile() {
        let tiles = dispatch_tiles(Rect32I::new(0, 0, 64, 64));
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0], Rect32I::from_size(64, 64));
    }
}
