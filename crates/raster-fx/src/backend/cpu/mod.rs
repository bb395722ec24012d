//! The CPU backend: buffer-backed images and a bounded worker pool.

mod device;
mod image;
mod pixel_array;
mod worker;

pub use device::BackendDevice;
pub use image::{ImageObject, KernelView, PixelStore, SUPPORTED_FORMATS, is_supported_format};
pub use pixel_array::PixelArray;
pub use worker::WorkerPool;
