//! Tile dispatch for both backends.

pub mod cpu;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use cpu::{
    CPU_TILE_EDGE, CpuKernel, CpuKernelInPlace, CpuMergeKernel, cpu_execute_tile_based,
    cpu_execute_tile_based_in_place, cpu_execute_tile_based_merge,
};

#[cfg(feature = "gpu")]
pub use gpu::{render_tiled_image_operation, render_tiled_merge_operation};
