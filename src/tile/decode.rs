//! Tile payload decoding.
//!
//! Each stored tile is decoded independently into interleaved samples.
//! Supported schemes are uncompressed, Deflate (both the registered and the
//! legacy Adobe code), and JPEG. SVS-style JPEG tiles are abbreviated
//! streams: the quantization/Huffman tables live once in the page's
//! JPEGTables tag and are spliced in front of every tile before decoding.

use std::io::{Cursor, Read};

use bytes::Bytes;
use image::ImageDecoder;
use thiserror::Error;

use crate::format::tiff::Compression;

/// Marker bytes: start of image.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Marker bytes: end of image.
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// A decode failure for one tile.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("compression scheme {0:?} is not supported")]
    UnsupportedCompression(Compression),

    #[error("JPEG decode failed: {0}")]
    Jpeg(String),

    #[error("Deflate decode failed: {0}")]
    Deflate(String),

    #[error("tile data is truncated: {actual} bytes, expected a multiple of {row_stride}")]
    Truncated { actual: usize, row_stride: usize },

    #[error("decoded tile is {actual_width}x{actual_height}, expected {width}x{height}")]
    DimensionMismatch {
        actual_width: u32,
        actual_height: u32,
        width: u32,
        height: u32,
    },
}

/// A decoded tile: interleaved samples at the source's native channel count.
#[derive(Debug, Clone)]
pub struct DecodedTile {
    /// Decoded width in pixels
    pub width: u32,

    /// Decoded height in pixels (may be under the nominal tile height for
    /// the last strip of a strip-organized page)
    pub height: u32,

    /// Interleaved channels per pixel
    pub channels: u16,

    /// Bytes per sample (1 or 2)
    pub bytes_per_sample: usize,

    /// Samples, row-major, little-endian for multi-byte types
    pub data: Vec<u8>,
}

impl DecodedTile {
    /// Byte stride of one row.
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.channels as usize * self.bytes_per_sample
    }
}

// =============================================================================
// TileCodec
// =============================================================================

/// The decode configuration shared by all tiles of a page.
#[derive(Debug, Clone)]
pub struct TileCodec {
    /// Compression scheme
    pub compression: Compression,

    /// Stored samples per pixel
    pub samples_per_pixel: u16,

    /// Bits per sample
    pub bits_per_sample: u16,

    /// Nominal tile width
    pub tile_width: u32,

    /// Nominal tile height
    pub tile_height: u32,

    /// Shared JPEGTables payload for abbreviated JPEG tiles
    pub jpeg_tables: Option<Bytes>,
}

impl TileCodec {
    fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// A fully blank tile (sparse files store no bytes for empty tiles).
    pub fn blank_tile(&self) -> DecodedTile {
        let bytes_per_sample = self.bytes_per_sample();
        let len = self.tile_width as usize
            * self.tile_height as usize
            * self.samples_per_pixel as usize
            * bytes_per_sample;
        DecodedTile {
            width: self.tile_width,
            height: self.tile_height,
            channels: self.samples_per_pixel,
            bytes_per_sample,
            data: vec![0; len],
        }
    }

    /// Decode one tile's stored bytes.
    pub fn decode(&self, raw: &[u8]) -> Result<DecodedTile, DecodeError> {
        match self.compression {
            Compression::None => self.wrap_raster(raw.to_vec()),
            Compression::Deflate | Compression::AdobeDeflate => {
                let mut inflated = Vec::new();
                let mut decoder = flate2::read::ZlibDecoder::new(raw);
                decoder
                    .read_to_end(&mut inflated)
                    .map_err(|e| DecodeError::Deflate(e.to_string()))?;
                self.wrap_raster(inflated)
            }
            Compression::Jpeg => self.decode_jpeg(raw),
            other => Err(DecodeError::UnsupportedCompression(other)),
        }
    }

    /// Interpret an uncompressed raster at the page's geometry. Strip pages
    /// may deliver fewer rows than nominal in their last strip.
    fn wrap_raster(&self, data: Vec<u8>) -> Result<DecodedTile, DecodeError> {
        let bytes_per_sample = self.bytes_per_sample();
        let row_stride =
            self.tile_width as usize * self.samples_per_pixel as usize * bytes_per_sample;
        if row_stride == 0 || data.len() % row_stride != 0 {
            return Err(DecodeError::Truncated {
                actual: data.len(),
                row_stride,
            });
        }
        let height = (data.len() / row_stride) as u32;
        if height > self.tile_height {
            return Err(DecodeError::DimensionMismatch {
                actual_width: self.tile_width,
                actual_height: height,
                width: self.tile_width,
                height: self.tile_height,
            });
        }
        Ok(DecodedTile {
            width: self.tile_width,
            height,
            channels: self.samples_per_pixel,
            bytes_per_sample,
            data,
        })
    }

    fn decode_jpeg(&self, raw: &[u8]) -> Result<DecodedTile, DecodeError> {
        let stream = match &self.jpeg_tables {
            Some(tables) => merge_jpeg_tables(tables, raw),
            None => Bytes::copy_from_slice(raw),
        };

        let decoder = image::codecs::jpeg::JpegDecoder::new(Cursor::new(stream))
            .map_err(|e| DecodeError::Jpeg(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        if width > self.tile_width || height > self.tile_height {
            return Err(DecodeError::DimensionMismatch {
                actual_width: width,
                actual_height: height,
                width: self.tile_width,
                height: self.tile_height,
            });
        }
        let color = decoder.color_type();
        let mut data = vec![0u8; decoder.total_bytes() as usize];
        decoder
            .read_image(&mut data)
            .map_err(|e| DecodeError::Jpeg(e.to_string()))?;

        Ok(DecodedTile {
            width,
            height,
            channels: color.channel_count() as u16,
            bytes_per_sample: color.bytes_per_pixel() as usize / color.channel_count() as usize,
            data,
        })
    }
}

/// Splice a shared JPEGTables payload in front of an abbreviated tile
/// stream: drop the tables' EOI and the tile's SOI, keep everything else.
fn merge_jpeg_tables(tables: &[u8], tile: &[u8]) -> Bytes {
    let tables_body = if tables.len() >= 4
        && tables[..2] == JPEG_SOI
        && tables[tables.len() - 2..] == JPEG_EOI
    {
        &tables[..tables.len() - 2]
    } else {
        // Malformed tables tag; pass the tile through untouched.
        return Bytes::copy_from_slice(tile);
    };

    let tile_body = if tile.len() >= 2 && tile[..2] == JPEG_SOI {
        &tile[2..]
    } else {
        tile
    };

    let mut merged = Vec::with_capacity(tables_body.len() + tile_body.len());
    merged.extend_from_slice(tables_body);
    merged.extend_from_slice(tile_body);
    Bytes::from(merged)
}

// =============================================================================
// Tests
// =============================================================================
