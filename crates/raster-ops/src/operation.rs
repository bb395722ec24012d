//! The GPU image-operation abstraction.
//!
//! A [`GpuImageOperation`] describes one kernel: its fragment source,
//! a one-time parameter resolution step, and a per-tile submission
//! step that receives the tile's source texture and grid position.
//! Operations implement the variant their call site needs —
//! single-source or two-source merge; invoking the other one is a
//! logic bug and panics.

use std::sync::Arc;

use raster_core::Rect32I;
use raster_fx::backend::gpu::{
    BackendDevice, Effect, EffectPool, ImageObject, ParameterDecl, Texture,
};
use tracing::debug;

/// One GPU kernel and its parameter plumbing.
pub trait GpuImageOperation {
    /// Operation name, used for effect labels and panics.
    fn name(&self) -> &'static str;

    /// The fragment-stage WGSL source.
    fn kernel_source(&self) -> &'static str;

    /// Compiles or reuses the effect and resolves parameter ids.
    /// Idempotent; `true` once the operation is ready to submit.
    fn initialize(&mut self, device: &BackendDevice) -> bool;

    /// The compiled effect, once initialized.
    fn effect(&self) -> Option<&Arc<Effect>>;

    /// Submits per-tile parameters for a single-source dispatch.
    ///
    /// `area` is the tile's base rectangle, `texture` the matching
    /// source tile.
    fn submit_parameters(
        &mut self,
        device: &BackendDevice,
        destination: &ImageObject,
        source: &ImageObject,
        area: Rect32I,
        texture: &Arc<Texture>,
        tx: usize,
        ty: usize,
    ) {
        let _ = (device, destination, source, area, texture, tx, ty);
        panic!("{} is not a single-source operation", self.name());
    }

    /// Submits per-tile parameters for a two-source merge dispatch.
    fn submit_merge_parameters(
        &mut self,
        device: &BackendDevice,
        destination: &ImageObject,
        source: &ImageObject,
        area: Rect32I,
        texture: &Arc<Texture>,
        other_texture: &Arc<Texture>,
        tx: usize,
        ty: usize,
    ) {
        let _ = (
            device,
            destination,
            source,
            area,
            texture,
            other_texture,
            tx,
            ty,
        );
        panic!("{} is not a merge operation", self.name());
    }
}

/// Effect bootstrap shared by the operation implementations.
///
/// Acquires the pooled effect for the kernel source on first
/// initialization and releases its usage on drop, keeping the pool's
/// counters symmetric.
pub struct GpuOpCommon {
    effect: Option<(Arc<Effect>, Arc<EffectPool>)>,
}

impl GpuOpCommon {
    /// An uninitialized bootstrap.
    pub fn new() -> Self {
        Self { effect: None }
    }

    /// The effect, once acquired.
    pub fn effect(&self) -> Option<&Arc<Effect>> {
        self.effect.as_ref().map(|(effect, _)| effect)
    }

    /// Acquires the pooled effect compiled from `kernel_source`.
    pub fn initialize(
        &mut self,
        device: &BackendDevice,
        name: &'static str,
        kernel_source: &str,
        decls: &[ParameterDecl],
    ) -> bool {
        if self.effect.is_some() {
            return true;
        }

        let pool = Arc::clone(device.effect_pool());
        match pool.acquire_from_source(device.context(), name, kernel_source, decls) {
            Ok(effect) => {
                self.effect = Some((effect, pool));
                true
            }
            Err(err) => {
                debug!("operation {name}: effect compilation failed: {err}");
                false
            }
        }
    }

    /// Resolves a parameter name, panicking on a declaration mismatch.
    pub fn parameter(&self, name: &str) -> usize {
        self.effect()
            .and_then(|effect| effect.parameter_id(name))
            .unwrap_or_else(|| panic!("parameter {name} not declared"))
    }
}

impl Default for GpuOpCommon {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GpuOpCommon {
    fn drop(&mut self) {
        if let Some((effect, _pool)) = self.effect.take() {
            effect.usage().release();
        }
    }
}
