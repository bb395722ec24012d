//! The wgpu execution context.
//!
//! One context per GPU device: instance, adapter, logical device and
//! queue, plus the captured limits the tiling code consults.

use std::sync::Arc;

use crate::{FxError, FxResult};

/// Largest tile edge the engine uses even when the adapter allows
/// more. Keeps per-tile work bounded for partial-area updates.
pub const MAX_TILE_EDGE: u32 = 1024;

/// The GPU execution context shared by every resource of one device.
pub struct Context {
    device: wgpu::Device,
    queue: wgpu::Queue,
    features: wgpu::Features,
    max_texture_dimension: u32,
}

impl Context {
    /// Probes for a usable adapter without creating a device.
    pub fn is_available() -> bool {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::HighPerformance,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .is_some()
        })
    }

    /// Creates a context on the best available adapter.
    pub fn new() -> FxResult<Arc<Self>> {
        pollster::block_on(Self::new_async())
    }

    /// Creates a context asynchronously.
    pub async fn new_async() -> FxResult<Arc<Self>> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(FxError::NoAdapter)?;

        // 16-bit normalized texture formats back the RGB16/RGBA16
        // image formats; take the feature when the adapter has it.
        let optional = wgpu::Features::TEXTURE_FORMAT_16BIT_NORM;
        let features = adapter.features() & optional;

        let adapter_limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("raster_gpu_device"),
                    required_features: features,
                    required_limits: adapter_limits.clone(),
                    memory_hints: wgpu::MemoryHints::Performance,
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| FxError::DeviceCreation(e.to_string()))?;

        Ok(Arc::new(Self {
            device,
            queue,
            features,
            max_texture_dimension: adapter_limits.max_texture_dimension_2d,
        }))
    }

    /// The logical wgpu device.
    #[inline]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The submission queue.
    #[inline]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Features granted at device creation.
    #[inline]
    pub fn features(&self) -> wgpu::Features {
        self.features
    }

    /// Largest texture edge the adapter supports.
    #[inline]
    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    /// The tile edge images on this context use.
    #[inline]
    pub fn tile_edge(&self) -> i32 {
        self.max_texture_dimension.min(MAX_TILE_EDGE) as i32
    }

    /// Blocks until all submitted GPU work finished.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("max_texture_dimension", &self.max_texture_dimension)
            .field("features", &self.features)
            .finish()
    }
}
