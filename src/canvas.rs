use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use uuid::Uuid;

use crate::compositor::BlendMode;
use crate::error::{CanvasError, CanvasResult};
use crate::ops::draw::DrawOp;

// ============================================================================
// TILED BITMAP
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// Largest canvas we are willing to allocate (in pixels).
const MAX_PIXELS: u64 = 256_000_000;

/// A pixel with zero alpha, returned by reference for missing chunks.
static TRANSPARENT_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Sparse raster split into `CHUNK_SIZE`² tiles.
///
/// Tiles live behind `Arc`, so cloning a bitmap only bumps reference counts
/// and a write copies just the tile it touches. History snapshots rely on
/// this: fifty full-canvas captures share every tile the user never painted.
///
/// Pixels outside `width × height` are always transparent, including the
/// unused tail of edge tiles.
#[derive(Clone)]
pub struct TiledBitmap {
    width: u32,
    height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<RgbaImage>>>,
}

impl TiledBitmap {
    /// Whether a `width × height` bitmap may be allocated at all.
    pub fn size_allowed(width: u32, height: u32) -> bool {
        width > 0 && height > 0 && (width as u64) * (height as u64) <= MAX_PIXELS
    }

    /// Create a fully transparent bitmap. Zero or oversized dimensions
    /// collapse to 1×1; resizes check `size_allowed` first instead.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = if !Self::size_allowed(width, height) {
            log::warn!("bitmap dimensions {}x{} rejected, using 1x1", width, height);
            (1, 1)
        } else {
            (width, height)
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * chunks_per_col) as usize],
        }
    }

    /// Import from a flat `RgbaImage`. Fully transparent tiles are not stored.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let mut img = Self::new(src.width(), src.height());
        if img.width != src.width() || img.height != src.height() {
            return img;
        }
        let (width, height) = (img.width, img.height);
        let per_row = img.chunks_per_row as usize;
        let raw = src.as_raw();

        let tiles: Vec<Option<Arc<RgbaImage>>> = (0..img.chunks.len())
            .into_par_iter()
            .map(|flat| {
                let base_x = (flat % per_row) as u32 * CHUNK_SIZE;
                let base_y = (flat / per_row) as u32 * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(width - base_x) as usize;
                let ch = CHUNK_SIZE.min(height - base_y);
                let stride = CHUNK_SIZE as usize * 4;
                let mut tile = RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE);
                let mut has_content = false;
                {
                    let dst: &mut [u8] = tile.as_mut();
                    for ly in 0..ch {
                        let src_start = ((base_y + ly) * width + base_x) as usize * 4;
                        let row = &raw[src_start..src_start + cw * 4];
                        has_content |= row.chunks_exact(4).any(|px| px[3] != 0);
                        let dst_start = ly as usize * stride;
                        dst[dst_start..dst_start + cw * 4].copy_from_slice(row);
                    }
                }
                has_content.then(|| Arc::new(tile))
            })
            .collect();

        img.chunks = tiles;
        img
    }

    /// Flatten into a contiguous `RgbaImage`.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let stride = self.width as usize * 4;
        let out_raw: &mut [u8] = out.as_mut();
        for (cx, cy) in self.chunk_keys() {
            let Some(tile) = self.get_chunk(cx, cy) else { continue };
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            let cw = CHUNK_SIZE.min(self.width - base_x) as usize;
            let ch = CHUNK_SIZE.min(self.height - base_y) as usize;
            let tile_raw = tile.as_raw();
            for ly in 0..ch {
                let src = ly * CHUNK_SIZE as usize * 4;
                let dst = (base_y as usize + ly) * stride + base_x as usize * 4;
                out_raw[dst..dst + cw * 4].copy_from_slice(&tile_raw[src..src + cw * 4]);
            }
        }
        out
    }

    #[inline(always)]
    fn flat_index(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    // ---- pixel access -------------------------------------------------------

    /// Read a pixel. Out-of-range coordinates read as transparent.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &Rgba<u8> {
        if x >= self.width || y >= self.height {
            return &TRANSPARENT_PIXEL;
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        self.chunks[idx]
            .as_ref()
            .map(|c| c.get_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE))
            .unwrap_or(&TRANSPARENT_PIXEL)
    }

    /// Write a pixel, creating or un-sharing its tile. Out-of-range writes
    /// are dropped.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = self.flat_index(x / CHUNK_SIZE, y / CHUNK_SIZE);
        if pixel[3] == 0 && self.chunks[idx].is_none() {
            return;
        }
        let tile = self.chunks[idx]
            .get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(tile).put_pixel(x % CHUNK_SIZE, y % CHUNK_SIZE, pixel);
    }

    /// Read-only access to a tile, if it has been allocated.
    pub fn get_chunk(&self, cx: u32, cy: u32) -> Option<&RgbaImage> {
        self.chunks.get(self.flat_index(cx, cy)).and_then(|c| c.as_deref())
    }

    /// Coordinates of allocated tiles.
    pub fn chunk_keys(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let per_row = self.chunks_per_row;
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(move |(i, _)| (i as u32 % per_row, i as u32 / per_row))
    }

    /// True when no pixel has any coverage.
    pub fn is_blank(&self) -> bool {
        self.chunks
            .iter()
            .flatten()
            .all(|tile| tile.pixels().all(|px| px[3] == 0))
    }

    // ---- bulk operations ----------------------------------------------------

    /// Drop every tile.
    pub fn clear(&mut self) {
        self.chunks.iter_mut().for_each(|slot| *slot = None);
    }

    /// Copy of this bitmap at a new size. Content stays anchored at the
    /// top-left corner; new area is transparent; nothing is rescaled.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut out = Self::new(width, height);
        for (cx, cy) in self.chunk_keys() {
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            if base_x >= out.width || base_y >= out.height {
                continue;
            }
            let Some(tile) = self.chunks[self.flat_index(cx, cy)].as_ref() else { continue };
            let keep_w = CHUNK_SIZE.min(out.width - base_x);
            let keep_h = CHUNK_SIZE.min(out.height - base_y);
            let slot = out.flat_index(cx, cy);
            if keep_w == CHUNK_SIZE && keep_h == CHUNK_SIZE {
                out.chunks[slot] = Some(Arc::clone(tile));
                continue;
            }
            // Edge tile cut by the new border: blank what fell outside.
            let mut cut = (**tile).clone();
            for (lx, ly, px) in cut.enumerate_pixels_mut() {
                if lx >= keep_w || ly >= keep_h {
                    *px = TRANSPARENT_PIXEL;
                }
            }
            out.chunks[slot] = Some(Arc::new(cut));
        }
        out
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Approximate bytes owned exclusively by this bitmap. Tiles shared with
    /// snapshots only count their pointer.
    pub fn memory_bytes(&self) -> usize {
        let tile_bytes = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
        self.chunks
            .iter()
            .flatten()
            .map(|tile| {
                if Arc::strong_count(tile) == 1 {
                    tile_bytes
                } else {
                    std::mem::size_of::<usize>() * 2
                }
            })
            .sum()
    }
}

impl fmt::Debug for TiledBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiledBitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("tiles", &self.chunk_keys().count())
            .finish()
    }
}

// ============================================================================
// LAYERS
// ============================================================================

/// Stable handle for a layer. Survives reordering and history restores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId(Uuid);

impl LayerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group is plenty to tell layers apart in logs.
        let s = self.0.simple().to_string();
        write!(f, "{}", &s[..8])
    }
}

#[derive(Clone, Debug)]
pub struct Layer {
    id: LayerId,
    pub name: String,
    pub visible: bool,
    opacity: f32,
    pub blend_mode: BlendMode,
    pub pixels: TiledBitmap,
}

impl Layer {
    pub fn new(name: String, width: u32, height: u32) -> Self {
        Self {
            id: LayerId::new(),
            name,
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            pixels: TiledBitmap::new(width, height),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Clamped to `[0, 1]`; NaN is ignored.
    pub fn set_opacity(&mut self, opacity: f32) {
        if !opacity.is_nan() {
            self.opacity = opacity.clamp(0.0, 1.0);
        }
    }
}

/// The layer store: an ordered bottom-to-top list of layers sharing one size,
/// with exactly one active layer.
#[derive(Clone, Debug)]
pub struct LayerStack {
    layers: Vec<Layer>,
    active: usize,
    width: u32,
    height: u32,
}

impl LayerStack {
    /// A stack holding a single blank layer.
    pub fn new(width: u32, height: u32) -> Self {
        let first = Layer::new("Layer 1".to_string(), width, height);
        let (width, height) = (first.pixels.width(), first.pixels.height());
        Self { layers: vec![first], active: 0, width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_id(&self) -> LayerId {
        self.layers[self.active].id
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active]
    }

    pub fn index_of(&self, id: LayerId) -> CanvasResult<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(CanvasError::InvalidLayer(id))
    }

    pub fn layer(&self, id: LayerId) -> CanvasResult<&Layer> {
        let idx = self.index_of(id)?;
        Ok(&self.layers[idx])
    }

    fn layer_mut(&mut self, id: LayerId) -> CanvasResult<&mut Layer> {
        let idx = self.index_of(id)?;
        Ok(&mut self.layers[idx])
    }

    /// Append a transparent layer on top and make it active.
    pub fn add_layer(&mut self) -> LayerId {
        let name = format!("Layer {}", self.layers.len() + 1);
        let layer = Layer::new(name, self.width, self.height);
        let id = layer.id;
        self.layers.push(layer);
        self.active = self.layers.len() - 1;
        log::debug!("added layer {} ({} total)", id, self.layers.len());
        id
    }

    pub fn set_active(&mut self, id: LayerId) -> CanvasResult<()> {
        self.active = self.index_of(id)?;
        Ok(())
    }

    /// Rasterise `op` into the addressed layer.
    pub fn paint(&mut self, id: LayerId, op: &DrawOp) -> CanvasResult<()> {
        let layer = self.layer_mut(id)?;
        op.apply(&mut layer.pixels);
        Ok(())
    }

    pub fn set_visibility(&mut self, id: LayerId, visible: bool) -> CanvasResult<()> {
        self.layer_mut(id)?.visible = visible;
        Ok(())
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> CanvasResult<()> {
        self.layer_mut(id)?.set_opacity(opacity);
        Ok(())
    }

    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> CanvasResult<()> {
        self.layer_mut(id)?.blend_mode = mode;
        Ok(())
    }

    /// Swap in a whole bitmap (shape previews restore their pre-gesture
    /// pixels this way). Re-anchored if the size differs.
    pub fn set_pixels(&mut self, id: LayerId, pixels: TiledBitmap) -> CanvasResult<()> {
        let (w, h) = (self.width, self.height);
        let layer = self.layer_mut(id)?;
        layer.pixels = if pixels.width() == w && pixels.height() == h {
            pixels
        } else {
            pixels.resized(w, h)
        };
        Ok(())
    }

    pub fn clear_layer(&mut self, id: LayerId) -> CanvasResult<()> {
        self.layer_mut(id)?.pixels.clear();
        Ok(())
    }

    /// Resize every layer in lockstep, keeping content pinned to the origin.
    /// Sizes no bitmap may take are refused and the stack is left alone.
    /// Returns whether anything changed.
    pub fn resize_all(&mut self, width: u32, height: u32) -> bool {
        if width == self.width && height == self.height {
            return false;
        }
        if !TiledBitmap::size_allowed(width, height) {
            log::warn!("refusing to resize canvas to {}x{}", width, height);
            return false;
        }
        for layer in &mut self.layers {
            layer.pixels = layer.pixels.resized(width, height);
        }
        self.width = width;
        self.height = height;
        log::debug!("resized {} layers to {}x{}", self.layers.len(), width, height);
        true
    }

    /// Bytes held exclusively by the live layers.
    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(|l| l.pixels.memory_bytes()).sum()
    }
}
