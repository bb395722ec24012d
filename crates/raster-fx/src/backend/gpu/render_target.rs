//! Render targets over tile textures.

use std::sync::Arc;

use super::texture::Texture;

/// The drawable side of one tile.
///
/// Tile dispatch binds this as the color attachment while sampling
/// the matching source tile's texture.
#[derive(Clone)]
pub struct RenderTarget {
    texture: Arc<Texture>,
}

impl RenderTarget {
    /// Wraps a tile texture as an attachment.
    pub fn new(texture: Arc<Texture>) -> Self {
        Self { texture }
    }

    /// The tile texture backing this target.
    #[inline]
    pub fn texture(&self) -> &Arc<Texture> {
        &self.texture
    }

    /// The attachment view.
    #[inline]
    pub fn view(&self) -> &wgpu::TextureView {
        self.texture.view()
    }

    /// Target width in pixels.
    #[inline]
    pub fn width(&self) -> i32 {
        self.texture.width()
    }

    /// Target height in pixels.
    #[inline]
    pub fn height(&self) -> i32 {
        self.texture.height()
    }
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
