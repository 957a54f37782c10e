//! Per-level tile index.
//!
//! One [`TileIndex`] is built per pyramid level (and per associated image)
//! from the page geometry and its tile location arrays. It answers the only
//! geometric question region reads need: which stored tiles cover a pixel
//! rectangle, and how each tile's pixels map into the output buffer.

use bytes::Bytes;

use crate::error::ImageError;
use crate::format::tiff::{TiffPage, TileData};
use crate::tile::decode::TileCodec;

// =============================================================================
// Geometry
// =============================================================================

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One stored tile: its grid position, byte range, and valid extent.
///
/// Edge tiles are stored at the nominal tile size but only the clipped
/// `valid_width` x `valid_height` top-left portion holds image pixels.
#[derive(Debug, Clone, Copy)]
pub struct TileRef {
    /// Column in the tile grid
    pub tile_x: u32,

    /// Row in the tile grid
    pub tile_y: u32,

    /// Byte offset of the compressed tile in the file (0 = blank tile)
    pub offset: u64,

    /// Compressed byte count (0 = blank tile)
    pub byte_count: u64,

    /// Image pixels covered horizontally by this tile
    pub valid_width: u32,

    /// Image pixels covered vertically by this tile
    pub valid_height: u32,
}

impl TileRef {
    /// Whether the file stores no bytes for this tile (sparse region).
    pub fn is_blank(&self) -> bool {
        self.offset == 0 || self.byte_count == 0
    }
}

/// One tile's contribution to a region read.
#[derive(Debug, Clone, Copy)]
pub struct TileCover {
    /// The covering tile
    pub tile: TileRef,

    /// Source rectangle within the decoded tile
    pub src: Rect,

    /// Destination rectangle within the region output buffer; same
    /// dimensions as `src`
    pub dst: Rect,
}

// =============================================================================
// TileIndex
// =============================================================================

/// The tile geometry and locations of one image page.
#[derive(Debug)]
pub struct TileIndex {
    /// Level width in pixels
    pub width: u32,

    /// Level height in pixels
    pub height: u32,

    /// Nominal tile width
    pub tile_width: u32,

    /// Nominal tile height
    pub tile_height: u32,

    /// Tiles per row
    pub tiles_x: u32,

    /// Tile rows
    pub tiles_y: u32,

    /// The codec configuration shared by every tile of the page
    pub codec: TileCodec,

    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl TileIndex {
    /// Build the index for a page from its loaded tile arrays.
    pub fn build(page: &TiffPage, data: TileData) -> Self {
        let (tiles_x, tiles_y) = page.tile_grid();
        let jpeg_tables: Option<Bytes> = data.jpeg_tables;
        TileIndex {
            width: page.width,
            height: page.height,
            tile_width: page.tile_width,
            tile_height: page.tile_height,
            tiles_x,
            tiles_y,
            codec: TileCodec {
                compression: page.compression,
                samples_per_pixel: page.samples_per_pixel,
                bits_per_sample: page.bits_per_sample,
                tile_width: page.tile_width,
                tile_height: page.tile_height,
                jpeg_tables,
            },
            offsets: data.offsets,
            byte_counts: data.byte_counts,
        }
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Look up a tile by grid position.
    pub fn tile(&self, tile_x: u32, tile_y: u32) -> Option<TileRef> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        let idx = tile_y as usize * self.tiles_x as usize + tile_x as usize;
        let valid_width = (self.width - tile_x * self.tile_width).min(self.tile_width);
        let valid_height = (self.height - tile_y * self.tile_height).min(self.tile_height);
        Some(TileRef {
            tile_x,
            tile_y,
            offset: self.offsets[idx],
            byte_count: self.byte_counts[idx],
            valid_width,
            valid_height,
        })
    }

    /// The tiles covering a pixel rectangle, with per-tile source and
    /// destination rectangles, in row-major tile order.
    ///
    /// The rectangle must lie inside the level extent; a rectangle that
    /// escapes it (or is empty) fails with [`ImageError::OutOfBounds`].
    pub fn tiles_covering(&self, region: Rect) -> Result<Vec<TileCover>, ImageError> {
        let out_of_bounds = || ImageError::OutOfBounds {
            x: region.x as i64,
            y: region.y as i64,
            width: region.width,
            height: region.height,
            level_width: self.width,
            level_height: self.height,
        };

        if region.width == 0 || region.height == 0 {
            return Err(out_of_bounds());
        }
        let end_x = region.x as u64 + region.width as u64;
        let end_y = region.y as u64 + region.height as u64;
        if end_x > self.width as u64 || end_y > self.height as u64 {
            return Err(out_of_bounds());
        }

        let first_tx = region.x / self.tile_width;
        let last_tx = (end_x as u32 - 1) / self.tile_width;
        let first_ty = region.y / self.tile_height;
        let last_ty = (end_y as u32 - 1) / self.tile_height;

        let mut covers = Vec::new();
        for ty in first_ty..=last_ty {
            for tx in first_tx..=last_tx {
                let tile = self.tile(tx, ty).ok_or_else(out_of_bounds)?;

                let tile_x0 = tx * self.tile_width;
                let tile_y0 = ty * self.tile_height;
                let x0 = region.x.max(tile_x0);
                let y0 = region.y.max(tile_y0);
                let x1 = (end_x as u32).min(tile_x0 + tile.valid_width);
                let y1 = (end_y as u32).min(tile_y0 + tile.valid_height);
                if x1 <= x0 || y1 <= y0 {
                    continue;
                }

                covers.push(TileCover {
                    tile,
                    src: Rect {
                        x: x0 - tile_x0,
                        y: y0 - tile_y0,
                        width: x1 - x0,
                        height: y1 - y0,
                    },
                    dst: Rect {
                        x: x0 - region.x,
                        y: y0 - region.y,
                        width: x1 - x0,
                        height: y1 - y0,
                    },
                });
            }
        }

        Ok(covers)
    }
}

// =============================================================================
// Tests
// =============================================================================
