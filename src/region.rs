//! Region extraction.
//!
//! A region read names a pixel rectangle on one pyramid level and yields a
//! dense interleaved buffer plus scoped metadata. Every covering tile is
//! fetched and decoded concurrently; the joining loop composites decoded
//! pixels into the output buffer. A read is all-or-nothing: the first tile
//! failure aborts the remaining fetches and surfaces a single error, never a
//! partially filled buffer.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::error::ImageError;
use crate::io::RangeReader;
use crate::meta::{adjust_channel_names, ImageMetadata};
use crate::tile::{DecodedTile, Rect, TileCover, TileIndex};

// =============================================================================
// RegionRequest
// =============================================================================

/// A rectangular read on one pyramid level.
///
/// `x`/`y` are in the level's pixel coordinates and may be negative or run
/// past the level edge; pixels outside the level are zero-filled, and only a
/// request with no intersection at all is an error.
#[derive(Debug, Clone, Copy)]
pub struct RegionRequest {
    /// Pyramid level to read from
    pub level: usize,

    /// Left edge, level coordinates
    pub x: i64,

    /// Top edge, level coordinates
    pub y: i64,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Requested channel count; `None` uses the image's advertised count
    pub channels: Option<u16>,
}

impl RegionRequest {
    /// A level-0 read at the image's advertised channel count.
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        RegionRequest {
            level: 0,
            x,
            y,
            width,
            height,
            channels: None,
        }
    }

    /// Select a pyramid level.
    pub fn at_level(mut self, level: usize) -> Self {
        self.level = level;
        self
    }

    /// Override the output channel count.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }
}

// =============================================================================
// Region
// =============================================================================

/// A materialized region: dense interleaved pixels plus scoped metadata.
#[derive(Debug, Clone)]
pub struct Region {
    data: Vec<u8>,
    metadata: ImageMetadata,
}

impl Region {
    /// Interleaved sample bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Region shape in `dims` order (Y, X, C).
    pub fn shape(&self) -> &[u64] {
        self.metadata.shape()
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.metadata.ndim()
    }

    /// Channel names, post-normalization.
    pub fn channel_names(&self) -> &[String] {
        self.metadata.channel_names()
    }

    /// The region's scoped metadata descriptor.
    pub fn metadata(&self) -> &ImageMetadata {
        &self.metadata
    }

    /// Extents by dimension-order string, e.g. "XYC".
    pub fn size(&self, order: &str) -> Result<Vec<u64>, ImageError> {
        self.metadata.size(order)
    }

    /// Regions are always materialized on the CPU.
    pub fn device(&self) -> &str {
        "cpu"
    }

    /// Region pixels are always resident once the read returns.
    pub fn is_loaded(&self) -> bool {
        true
    }
}

// =============================================================================
// RegionReader
// =============================================================================

/// Executes region reads against one pyramid level.
pub(crate) struct RegionReader<R> {
    reader: Arc<R>,
    index: Arc<TileIndex>,
    level: usize,
    downsample: f64,
}

impl<R: RangeReader + 'static> RegionReader<R> {
    pub(crate) fn new(
        reader: Arc<R>,
        index: Arc<TileIndex>,
        level: usize,
        downsample: f64,
    ) -> Self {
        RegionReader {
            reader,
            index,
            level,
            downsample,
        }
    }

    /// Read a region. `normalized_channels` is the image's advertised
    /// channel count; the request may override it.
    pub(crate) async fn read(
        &self,
        request: &RegionRequest,
        image_meta: &ImageMetadata,
        normalized_channels: u16,
    ) -> Result<Region, ImageError> {
        let out_channels = match request.channels {
            Some(c) if c > 0 => c,
            _ => normalized_channels,
        };
        let bytes_per_sample = image_meta.dtype().bytes();

        let clipped = self.clip(request)?;
        debug!(
            level = self.level,
            x = request.x,
            y = request.y,
            width = request.width,
            height = request.height,
            channels = out_channels,
            "reading region"
        );

        let mut covers = self.index.tiles_covering(clipped)?;
        // Shift destinations from clipped-rect space into output space.
        let pad_x = (clipped.x as i64 - request.x) as u32;
        let pad_y = (clipped.y as i64 - request.y) as u32;
        for cover in &mut covers {
            cover.dst.x += pad_x;
            cover.dst.y += pad_y;
        }

        let out_stride = request.width as usize * out_channels as usize * bytes_per_sample;
        let mut output = vec![0u8; out_stride * request.height as usize];

        let mut tasks: JoinSet<Result<(TileCover, DecodedTile), ImageError>> = JoinSet::new();
        for cover in covers {
            let reader = Arc::clone(&self.reader);
            let codec = self.index.codec.clone();
            let level = self.level;
            tasks.spawn(async move {
                let tile = if cover.tile.is_blank() {
                    codec.blank_tile()
                } else {
                    let raw = reader
                        .read_exact_at(cover.tile.offset, cover.tile.byte_count as usize)
                        .await?;
                    codec.decode(&raw).map_err(|e| ImageError::Decode {
                        level,
                        tile_x: cover.tile.tile_x,
                        tile_y: cover.tile.tile_y,
                        message: e.to_string(),
                    })?
                };
                Ok((cover, tile))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| ImageError::Decode {
                level: self.level,
                tile_x: 0,
                tile_y: 0,
                message: format!("tile task failed: {}", e),
            })?;
            match result {
                Ok((cover, tile)) => {
                    // A corrupted byte count can decode to fewer pixels than
                    // the tile's valid extent; refuse to composite it.
                    if tile.width < cover.src.x + cover.src.width
                        || tile.height < cover.src.y + cover.src.height
                    {
                        tasks.abort_all();
                        return Err(ImageError::Decode {
                            level: self.level,
                            tile_x: cover.tile.tile_x,
                            tile_y: cover.tile.tile_y,
                            message: format!(
                                "decoded tile is {}x{}, expected at least {}x{}",
                                tile.width,
                                tile.height,
                                cover.src.x + cover.src.width,
                                cover.src.y + cover.src.height
                            ),
                        });
                    }
                    blit(&mut output, request.width, out_channels, &tile, &cover);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        let channel_names =
            adjust_channel_names(image_meta.channel_names(), out_channels);
        let metadata = image_meta.scoped_for_region(
            request.x,
            request.y,
            request.width,
            request.height,
            channel_names,
            self.downsample,
        );

        Ok(Region {
            data: output,
            metadata,
        })
    }

    /// Intersect the request with the level extent.
    fn clip(&self, request: &RegionRequest) -> Result<Rect, ImageError> {
        let out_of_bounds = || ImageError::OutOfBounds {
            x: request.x,
            y: request.y,
            width: request.width,
            height: request.height,
            level_width: self.index.width,
            level_height: self.index.height,
        };

        if request.width == 0 || request.height == 0 {
            return Err(out_of_bounds());
        }
        let x0 = request.x.max(0);
        let y0 = request.y.max(0);
        let x1 = (request.x + request.width as i64).min(self.index.width as i64);
        let y1 = (request.y + request.height as i64).min(self.index.height as i64);
        if x1 <= x0 || y1 <= y0 {
            return Err(out_of_bounds());
        }
        Ok(Rect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

// =============================================================================
// Compositing
// =============================================================================

/// Copy one decoded tile's covered pixels into the output buffer, mapping
/// the tile's native channel count onto the requested one.
///
/// Expansion rules: a 1-sample source replicates gray into R/G/B, a 2-sample
/// source is gray+alpha (gray replicated, stored alpha kept); any channel
/// past the source's is filled with the opaque sentinel (all sample bits
/// set). A smaller output keeps the leading channels.
fn blit(
    output: &mut [u8],
    out_width: u32,
    out_channels: u16,
    tile: &DecodedTile,
    cover: &TileCover,
) {
    let bps = tile.bytes_per_sample;
    let src_channels = tile.channels as usize;
    let dst_channels = out_channels as usize;
    let src_stride = tile.row_stride();
    let dst_stride = out_width as usize * dst_channels * bps;
    let width = cover.src.width as usize;

    for row in 0..cover.src.height as usize {
        let src_row = (cover.src.y as usize + row) * src_stride
            + cover.src.x as usize * src_channels * bps;
        let dst_row = (cover.dst.y as usize + row) * dst_stride
            + cover.dst.x as usize * dst_channels * bps;

        if src_channels == dst_channels {
            let len = width * src_channels * bps;
            output[dst_row..dst_row + len]
                .copy_from_slice(&tile.data[src_row..src_row + len]);
            continue;
        }

        for px in 0..width {
            let src_px = src_row + px * src_channels * bps;
            let dst_px = dst_row + px * dst_channels * bps;
            for c in 0..dst_channels {
                let mapped = channel_source(src_channels, dst_channels, c);
                let dst = &mut output[dst_px + c * bps..dst_px + (c + 1) * bps];
                match mapped {
                    Some(sc) => {
                        dst.copy_from_slice(&tile.data[src_px + sc * bps..src_px + (sc + 1) * bps]);
                    }
                    None => dst.fill(0xFF),
                }
            }
        }
    }
}

/// Which source channel feeds output channel `c`, or `None` for the opaque
/// sentinel.
fn channel_source(src: usize, dst: usize, c: usize) -> Option<usize> {
    match src {
        1 => {
            if c == 0 || (dst >= 3 && c < 3) {
                Some(0)
            } else {
                None
            }
        }
        2 if dst == 4 => {
            if c < 3 {
                Some(0)
            } else {
                Some(1)
            }
        }
        _ => {
            if c < src {
                Some(c)
            } else {
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
