//! The GPU image object: a grid of tile textures.
//!
//! Images larger than the tile edge are partitioned into a grid; every
//! tile owns a texture and a render target over it. Tile areas
//! partition the image exactly — no overlap, no gap — which is what
//! the dispatch loops rely on when they intersect a target area with
//! the grid.
//!
//! Uploads and retrieves scatter/gather across the intersecting tiles;
//! any multi-object operation requires identical tile counts and
//! matching dimensions.

use std::sync::Arc;

use raster_core::{Bitmap, BitmapInfo, PixelFormat, Rect32I};
use tracing::debug;

use super::context::Context;
use super::pool::TexturePool;
use super::render_target::RenderTarget;
use super::resource::GpuResource;
use super::texture::Texture;
use crate::backend::next_object_id;
use crate::device::{ApiImageObject, BackendId};
use crate::{FxResult, ImageObject as AnyImageObject};

struct Tile {
    texture: Arc<Texture>,
    target: RenderTarget,
    area: Rect32I,
}

/// A tiled, GPU-backed 2D pixel buffer.
pub struct ImageObject {
    ctx: Arc<Context>,
    texture_pool: Arc<TexturePool>,
    tiles: Vec<Tile>,
    horizontal_tiles: usize,
    vertical_tiles: usize,
    width: i32,
    height: i32,
    format: PixelFormat,
    id: u64,
    owner: u64,
}

fn tile_count_for(extent: i32, edge: i32) -> usize {
    (extent as usize).div_ceil(edge as usize)
}

impl ImageObject {
    pub(crate) fn new(ctx: Arc<Context>, texture_pool: Arc<TexturePool>, owner: u64) -> Self {
        Self {
            ctx,
            texture_pool,
            tiles: Vec::new(),
            horizontal_tiles: 0,
            vertical_tiles: 0,
            width: 0,
            height: 0,
            format: PixelFormat::Empty,
            id: next_object_id(),
            owner,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn owner(&self) -> u64 {
        self.owner
    }

    /// Number of tiles in the grid.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Tiles per row.
    #[inline]
    pub fn count_horizontal_tiles(&self) -> usize {
        self.horizontal_tiles
    }

    /// Tiles per column.
    #[inline]
    pub fn count_vertical_tiles(&self) -> usize {
        self.vertical_tiles
    }

    fn tile(&self, tx: usize, ty: usize) -> &Tile {
        &self.tiles[ty * self.horizontal_tiles + tx]
    }

    /// The logical rectangle owned by tile (`tx`, `ty`); edge tiles
    /// may be smaller than the tile edge.
    pub fn tile_area(&self, tx: usize, ty: usize) -> Rect32I {
        self.tile(tx, ty).area
    }

    /// The tile texture at grid position (`tx`, `ty`).
    pub fn tile_texture(&self, tx: usize, ty: usize) -> &Arc<Texture> {
        &self.tile(tx, ty).texture
    }

    /// The render target over tile (`tx`, `ty`).
    pub fn tile_render_target(&self, tx: usize, ty: usize) -> &RenderTarget {
        &self.tile(tx, ty).target
    }

    /// The area of the tile containing pixel (`x`, `y`).
    pub fn tile_area_at_position(&self, x: i32, y: i32) -> Rect32I {
        let edge = self.ctx.tile_edge();
        self.tile_area((x / edge) as usize, (y / edge) as usize)
    }

    /// The texture of the tile containing pixel (`x`, `y`).
    pub fn tile_texture_at_position(&self, x: i32, y: i32) -> &Arc<Texture> {
        let edge = self.ctx.tile_edge();
        self.tile_texture((x / edge) as usize, (y / edge) as usize)
    }

    /// The render target of the tile containing pixel (`x`, `y`).
    pub fn tile_render_target_at_position(&self, x: i32, y: i32) -> &RenderTarget {
        let edge = self.ctx.tile_edge();
        self.tile_render_target((x / edge) as usize, (y / edge) as usize)
    }

    /// The context this image renders through.
    #[inline]
    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Device-side bytes across all tiles.
    pub fn gpu_memory_consumption(&self) -> usize {
        self.tiles
            .iter()
            .map(|t| t.texture.gpu_memory_consumption())
            .sum()
    }

    /// Logical plane byte size (0 when empty).
    pub fn byte_size(&self) -> usize {
        self.format
            .plane_byte_size(self.width as usize, self.height as usize)
    }

    fn bounds(&self) -> Rect32I {
        Rect32I::from_size(self.width, self.height)
    }

    fn release_tiles(&mut self) {
        for tile in self.tiles.drain(..) {
            tile.texture.usage().release();
        }
        self.horizontal_tiles = 0;
        self.vertical_tiles = 0;
    }

    fn build_tiles(&mut self, format: PixelFormat, width: i32, height: i32) -> FxResult<()> {
        if width <= 0 || height <= 0 {
            return Err(raster_core::Error::invalid_dimensions(
                width,
                height,
                "image extents must be positive",
            )
            .into());
        }

        let edge = self.ctx.tile_edge();
        let horizontal = tile_count_for(width, edge);
        let vertical = tile_count_for(height, edge);

        let mut tiles = Vec::with_capacity(horizontal * vertical);

        for ty in 0..vertical {
            for tx in 0..horizontal {
                let x = tx as i32 * edge;
                let y = ty as i32 * edge;
                let area = Rect32I::new(x, y, (width - x).min(edge), (height - y).min(edge));

                let texture = match self
                    .texture_pool
                    .acquire(&self.ctx, format, area.width, area.height)
                {
                    Ok(texture) => texture,
                    Err(err) => {
                        // hand back what this call already took
                        for tile in &tiles {
                            tile.texture.usage().release();
                        }
                        return Err(err);
                    }
                };

                // pooled textures may carry stale pixels
                let zeros = vec![
                    0u8;
                    format.plane_byte_size(area.width as usize, area.height as usize)
                ];
                texture.upload(
                    &self.ctx,
                    &zeros,
                    Rect32I::from_size(area.width, area.height),
                );

                let target = RenderTarget::new(Arc::clone(&texture));
                tiles.push(Tile {
                    texture,
                    target,
                    area,
                });
            }
        }

        self.release_tiles();
        self.tiles = tiles;
        self.horizontal_tiles = horizontal;
        self.vertical_tiles = vertical;
        self.width = width;
        self.height = height;
        self.format = format;
        Ok(())
    }

    /// Gathers the rows of `region` (relative to `data_origin` with
    /// `stride_px`) into a tightly packed buffer.
    fn pack_rows(
        data: &[u8],
        stride_px: usize,
        pixel: usize,
        data_origin: (i32, i32),
        region: Rect32I,
    ) -> Vec<u8> {
        let row_len = region.width as usize * pixel;
        let mut out = vec![0u8; row_len * region.height as usize];

        for dy in 0..region.height {
            let sx = (region.x - data_origin.0) as usize;
            let sy = (region.y - data_origin.1 + dy) as usize;
            let src_off = (sy * stride_px + sx) * pixel;
            out[dy as usize * row_len..(dy as usize + 1) * row_len]
                .copy_from_slice(&data[src_off..src_off + row_len]);
        }

        out
    }

    /// Scatters a tightly packed `region` buffer into `data`.
    fn unpack_rows(
        data: &mut [u8],
        stride_px: usize,
        pixel: usize,
        data_origin: (i32, i32),
        region: Rect32I,
        packed: &[u8],
    ) {
        let row_len = region.width as usize * pixel;

        for dy in 0..region.height {
            let dx = (region.x - data_origin.0) as usize;
            let dy_abs = (region.y - data_origin.1 + dy) as usize;
            let dst_off = (dy_abs * stride_px + dx) * pixel;
            data[dst_off..dst_off + row_len]
                .copy_from_slice(&packed[dy as usize * row_len..(dy as usize + 1) * row_len]);
        }
    }

    /// Writes `dest` (global coordinates) from `data`, whose origin is
    /// `data_origin` and whose stride is `stride_px` pixels.
    fn scatter_upload(
        &mut self,
        data: &[u8],
        stride_px: usize,
        data_origin: (i32, i32),
        dest: Rect32I,
    ) -> bool {
        let pixel = self.format.pixel_size();

        for tile_index in 0..self.tiles.len() {
            let tile_area = self.tiles[tile_index].area;
            let Some(hit) = tile_area.intersect(&dest) else {
                continue;
            };

            let packed = Self::pack_rows(data, stride_px, pixel, data_origin, hit);
            let local = hit.translated(-tile_area.x, -tile_area.y);

            if !self.tiles[tile_index]
                .texture
                .upload(&self.ctx, &packed, local)
            {
                return false;
            }
        }

        true
    }

    /// Reads `source` (global coordinates) into `data`, whose origin
    /// is `data_origin` and whose stride is `stride_px` pixels.
    fn gather_retrieve(
        &self,
        data: &mut [u8],
        stride_px: usize,
        data_origin: (i32, i32),
        source: Rect32I,
    ) -> bool {
        let pixel = self.format.pixel_size();

        for tile in &self.tiles {
            let Some(hit) = tile.area.intersect(&source) else {
                continue;
            };

            let local = hit.translated(-tile.area.x, -tile.area.y);
            let mut packed =
                vec![0u8; self.format.plane_byte_size(hit.width as usize, hit.height as usize)];

            if !tile.texture.retrieve(&self.ctx, &mut packed, local) {
                return false;
            }

            Self::unpack_rows(data, stride_px, pixel, data_origin, hit, &packed);
        }

        true
    }
}

impl ApiImageObject for ImageObject {
    fn create(&mut self, format: PixelFormat, width: i32, height: i32) -> FxResult<()> {
        self.build_tiles(format, width, height)
    }

    fn create_from_data(
        &mut self,
        format: PixelFormat,
        width: i32,
        height: i32,
        data: &[u8],
    ) -> FxResult<()> {
        let expected = format.plane_byte_size(width.max(0) as usize, height.max(0) as usize);
        if data.len() != expected {
            return Err(raster_core::Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
            }
            .into());
        }

        self.build_tiles(format, width, height)?;

        if !self.upload(data) {
            return Err(raster_core::Error::allocation_failed(
                expected,
                "tile upload failed during creation",
            )
            .into());
        }

        Ok(())
    }

    fn create_from_bitmap(&mut self, bitmap: &Bitmap) -> FxResult<()> {
        self.create_from_data(bitmap.format(), bitmap.width(), bitmap.height(), bitmap.data())
    }

    fn create_from_bitmap_region(&mut self, bitmap: &Bitmap, rect: Rect32I) -> FxResult<()> {
        let bitmap_bounds = Rect32I::from_size(bitmap.width(), bitmap.height());

        if !bitmap_bounds.contains_rect(&rect) || rect.is_empty() {
            return Err(raster_core::Error::invalid_region(
                rect,
                bitmap.width(),
                bitmap.height(),
            )
            .into());
        }

        self.build_tiles(bitmap.format(), rect.width, rect.height)?;

        let dest = Rect32I::from_size(rect.width, rect.height);
        if !self.scatter_upload(
            bitmap.data(),
            bitmap.width() as usize,
            (-rect.x, -rect.y),
            dest,
        ) {
            return Err(raster_core::Error::allocation_failed(
                self.byte_size(),
                "tile upload failed during creation",
            )
            .into());
        }

        Ok(())
    }

    fn create_from_bitmap_info(&mut self, info: &BitmapInfo) -> FxResult<()> {
        self.build_tiles(info.format, info.width, info.height)
    }

    fn retrieve(&self, buffer: &mut [u8]) -> bool {
        if self.is_empty() {
            debug!("retrieve rejected: image is empty");
            return false;
        }

        if buffer.len() != self.byte_size() {
            debug!(
                "retrieve rejected: buffer holds {} bytes, image {}",
                buffer.len(),
                self.byte_size()
            );
            return false;
        }

        self.gather_retrieve(buffer, self.width as usize, (0, 0), self.bounds())
    }

    fn retrieve_region(&self, buffer: &mut [u8], rect: Rect32I) -> bool {
        if self.is_empty() || rect.is_empty() || !self.bounds().contains_rect(&rect) {
            debug!("retrieve_region rejected: {rect} outside {}x{}", self.width, self.height);
            return false;
        }

        let expected = self
            .format
            .plane_byte_size(rect.width as usize, rect.height as usize);
        if buffer.len() != expected {
            debug!(
                "retrieve_region rejected: buffer holds {} bytes, region needs {expected}",
                buffer.len()
            );
            return false;
        }

        self.gather_retrieve(buffer, rect.width as usize, (rect.x, rect.y), rect)
    }

    fn retrieve_bitmap(&self, bitmap: &mut Bitmap) -> bool {
        if self.is_empty()
            || bitmap.format() != self.format
            || bitmap.width() != self.width
            || bitmap.height() != self.height
        {
            debug!("retrieve_bitmap rejected: shape mismatch");
            return false;
        }

        let bounds = self.bounds();
        let stride = self.width as usize;
        self.gather_retrieve(bitmap.data_mut(), stride, (0, 0), bounds)
    }

    fn retrieve_bitmap_region(&self, bitmap: &mut Bitmap, rect: Rect32I) -> bool {
        if self.is_empty()
            || rect.is_empty()
            || bitmap.format() != self.format
            || !self.bounds().contains_rect(&rect)
            || bitmap.width() < rect.width
            || bitmap.height() < rect.height
        {
            debug!("retrieve_bitmap_region rejected: {rect} does not fit");
            return false;
        }

        let stride = bitmap.width() as usize;
        self.gather_retrieve(bitmap.data_mut(), stride, (rect.x, rect.y), rect)
    }

    fn upload(&mut self, data: &[u8]) -> bool {
        if self.is_empty() {
            debug!("upload rejected: image is empty");
            return false;
        }

        if data.len() != self.byte_size() {
            debug!(
                "upload rejected: buffer holds {} bytes, image {}",
                data.len(),
                self.byte_size()
            );
            return false;
        }

        let bounds = self.bounds();
        let stride = self.width as usize;
        self.scatter_upload(data, stride, (0, 0), bounds)
    }

    fn upload_region(&mut self, data: &[u8], rect: Rect32I, dest_x: i32, dest_y: i32) -> bool {
        let dest = Rect32I::new(dest_x, dest_y, rect.width, rect.height);

        if self.is_empty() || rect.is_empty() || !self.bounds().contains_rect(&dest) {
            debug!("upload_region rejected: {dest} outside {}x{}", self.width, self.height);
            return false;
        }

        let expected = self
            .format
            .plane_byte_size(rect.width as usize, rect.height as usize);
        if data.len() != expected {
            debug!(
                "upload_region rejected: buffer holds {} bytes, region needs {expected}",
                data.len()
            );
            return false;
        }

        self.scatter_upload(data, rect.width as usize, (dest_x, dest_y), dest)
    }

    fn upload_bitmap(&mut self, bitmap: &Bitmap) -> bool {
        if self.is_empty()
            || bitmap.format() != self.format
            || bitmap.width() != self.width
            || bitmap.height() != self.height
        {
            debug!("upload_bitmap rejected: shape mismatch");
            return false;
        }

        self.upload(bitmap.data())
    }

    fn upload_bitmap_region(
        &mut self,
        bitmap: &Bitmap,
        rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        let bitmap_bounds = Rect32I::from_size(bitmap.width(), bitmap.height());
        let dest = Rect32I::new(dest_x, dest_y, rect.width, rect.height);

        if self.is_empty()
            || rect.is_empty()
            || bitmap.format() != self.format
            || !bitmap_bounds.contains_rect(&rect)
            || !self.bounds().contains_rect(&dest)
        {
            debug!("upload_bitmap_region rejected: {rect} -> {dest} does not fit");
            return false;
        }

        self.scatter_upload(
            bitmap.data(),
            bitmap.width() as usize,
            (dest.x - rect.x, dest.y - rect.y),
            dest,
        )
    }

    fn copy(
        &mut self,
        source: &AnyImageObject,
        source_rect: Rect32I,
        dest_x: i32,
        dest_y: i32,
    ) -> bool {
        if self.is_empty() || source.is_empty() || source_rect.is_empty() {
            debug!("copy rejected: empty operand");
            return false;
        }

        if source.format() != self.format {
            debug!(
                "copy rejected: source format {} != destination {}",
                source.format(),
                self.format
            );
            return false;
        }

        let source_bounds = Rect32I::from_size(source.width(), source.height());
        if !source_bounds.contains_rect(&source_rect) {
            debug!("copy rejected: {source_rect} outside source bounds");
            return false;
        }

        if dest_x < 0
            || dest_y < 0
            || dest_x + source_rect.width > self.width
            || dest_y + source_rect.height > self.height
        {
            debug!("copy rejected: region does not fit destination at ({dest_x}, {dest_y})");
            return false;
        }

        // both directions stage through host memory; this is the
        // canonical migration path for cross-backend sources
        let bytes = self
            .format
            .plane_byte_size(source_rect.width as usize, source_rect.height as usize);
        let mut staging = vec![0u8; bytes];

        source.retrieve_region(&mut staging, source_rect)
            && self.upload_region(&staging, source_rect, dest_x, dest_y)
    }

    fn discard_buffers(&mut self) {
        self.release_tiles();
        self.format = PixelFormat::Empty;
        self.width = 0;
        self.height = 0;
    }

    fn synchronize(&mut self) {
        self.ctx.wait_idle();
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn backend_id(&self) -> BackendId {
        BackendId::Gpu
    }

    fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl Drop for ImageObject {
    fn drop(&mut self) {
        self.release_tiles();
    }
}

impl std::fmt::Debug for ImageObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageObject")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("tiles", &self.tiles.len())
            .finish()
    }
}
