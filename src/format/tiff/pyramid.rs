//! Pyramid and associated-image classification over the IFD chain.
//!
//! A pyramidal TIFF carries several IFDs: the resolution levels of the main
//! image plus auxiliary images (thumbnail, label, macro). This module walks
//! the chain, interprets each IFD as a [`TiffPage`], and splits pages into
//! the sorted level pyramid and a named set of associated images.
//!
//! Classification rules:
//! 1. A page whose description names it ("label", "macro", "thumbnail") is
//!    an associated image under that name.
//! 2. Strip-organized pages are associated images (the pyramid itself must
//!    be tiled); the first unnamed one is the "thumbnail".
//! 3. Remaining tiled pages are level candidates, sorted by area; a
//!    candidate joins the pyramid when its downsample is consistent with the
//!    base aspect ratio and non-decreasing.

use bytes::Bytes;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, FieldType, Photometric, SampleFormat, TiffTag};
use super::values::ValueReader;

/// Safety limit on the number of IFDs walked.
const MAX_IFDS: usize = 100;

/// Relative tolerance when matching a level's aspect ratio to the base.
const ASPECT_TOLERANCE: f64 = 0.1;

// =============================================================================
// TiffPage
// =============================================================================

/// One IFD interpreted as an image page.
///
/// Strip-organized pages are modeled as a one-column tile grid: each strip is
/// a full-width tile of `rows_per_strip` height, so the tile index and the
/// region reader never special-case strips.
#[derive(Debug, Clone)]
pub struct TiffPage {
    /// Index of the IFD in the file's chain
    pub ifd_index: usize,

    /// Index of this page in the level pyramid (0 = full resolution);
    /// meaningless for associated images
    pub level_index: usize,

    /// Page width in pixels
    pub width: u32,

    /// Page height in pixels
    pub height: u32,

    /// Nominal tile width (page width for strip organization)
    pub tile_width: u32,

    /// Nominal tile height (rows per strip for strip organization)
    pub tile_height: u32,

    /// Whether the page uses tile organization
    pub tiled: bool,

    /// Downsample factor relative to level 0 (1.0 for level 0)
    pub downsample: f64,

    /// Compression scheme
    pub compression: Compression,

    /// Photometric interpretation
    pub photometric: Photometric,

    /// Samples per pixel as stored
    pub samples_per_pixel: u16,

    /// Bits per sample (uniform across samples)
    pub bits_per_sample: u16,

    /// Sample format
    pub sample_format: SampleFormat,

    /// ImageDescription contents, if present
    pub description: Option<String>,

    /// Pixels per resolution unit in X/Y, if declared
    pub resolution: Option<(f64, f64)>,

    /// Resolution unit tag value (2=inch, 3=centimeter)
    pub resolution_unit: Option<u16>,

    /// The parsed IFD, kept for metadata export and tile-array loading
    pub ifd: Ifd,
}

impl TiffPage {
    /// Interpret an IFD as a page.
    ///
    /// Returns `None` for IFDs that do not describe pixel data (no
    /// dimensions, or neither tile nor strip offsets).
    pub async fn from_ifd<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: Ifd,
        ifd_index: usize,
    ) -> Result<Option<Self>, TiffError> {
        let values = ValueReader::new(reader, header);

        let width = match ifd.get(TiffTag::ImageWidth) {
            Some(e) => values.read_uint(e).await? as u32,
            None => return Ok(None),
        };
        let height = match ifd.get(TiffTag::ImageLength) {
            Some(e) => values.read_uint(e).await? as u32,
            None => return Ok(None),
        };
        if width == 0 || height == 0 {
            return Ok(None);
        }

        let tiled = ifd.is_tiled();
        let (tile_width, tile_height) = if tiled {
            let tw = values
                .read_uint(ifd.get(TiffTag::TileWidth).ok_or(TiffError::MissingTag(
                    "TileWidth",
                ))?)
                .await? as u32;
            let th = values
                .read_uint(ifd.get(TiffTag::TileLength).ok_or(TiffError::MissingTag(
                    "TileLength",
                ))?)
                .await? as u32;
            if tw == 0 || th == 0 {
                return Err(TiffError::InvalidTagValue {
                    tag: "TileWidth",
                    message: "zero tile dimension".to_string(),
                });
            }
            (tw, th)
        } else if ifd.get(TiffTag::StripOffsets).is_some() {
            let rows = match ifd.get(TiffTag::RowsPerStrip) {
                Some(e) => (values.read_uint(e).await? as u32).min(height),
                None => height,
            };
            (width, rows.max(1))
        } else {
            return Ok(None);
        };

        let compression = match ifd.get(TiffTag::Compression) {
            Some(e) => {
                let raw = values.read_uint(e).await? as u16;
                Compression::from_u16(raw).ok_or(TiffError::InvalidTagValue {
                    tag: "Compression",
                    message: format!("unknown compression {}", raw),
                })?
            }
            None => Compression::None,
        };

        let photometric = match ifd.get(TiffTag::PhotometricInterpretation) {
            Some(e) => {
                let raw = values.read_uint(e).await? as u16;
                Photometric::from_u16(raw).ok_or(TiffError::InvalidTagValue {
                    tag: "PhotometricInterpretation",
                    message: format!("unknown photometric {}", raw),
                })?
            }
            None => Photometric::MinIsBlack,
        };

        let samples_per_pixel = match ifd.get(TiffTag::SamplesPerPixel) {
            Some(e) => values.read_uint(e).await? as u16,
            None => 1,
        };

        let bits_per_sample = match ifd.get(TiffTag::BitsPerSample) {
            Some(e) => {
                let bits = values.read_uint_array(e).await?;
                let first = *bits.first().unwrap_or(&8);
                if bits.iter().any(|&b| b != first) {
                    return Err(TiffError::InvalidTagValue {
                        tag: "BitsPerSample",
                        message: format!("non-uniform bits per sample: {:?}", bits),
                    });
                }
                first as u16
            }
            None => 8,
        };

        let sample_format = match ifd.get(TiffTag::SampleFormat) {
            Some(e) => {
                let raw = values.read_uint(e).await? as u16;
                SampleFormat::from_u16(raw).ok_or(TiffError::InvalidTagValue {
                    tag: "SampleFormat",
                    message: format!("unknown sample format {}", raw),
                })?
            }
            None => SampleFormat::Uint,
        };

        let description = match ifd.get(TiffTag::ImageDescription) {
            Some(e) => Some(values.read_string(e).await?),
            None => None,
        };

        let resolution = match (ifd.get(TiffTag::XResolution), ifd.get(TiffTag::YResolution)) {
            (Some(x), Some(y)) => Some((
                values.read_rational(x).await?,
                values.read_rational(y).await?,
            )),
            _ => None,
        };

        let resolution_unit = match ifd.get(TiffTag::ResolutionUnit) {
            Some(e) => Some(values.read_uint(e).await? as u16),
            None => None,
        };

        Ok(Some(TiffPage {
            ifd_index,
            level_index: 0,
            width,
            height,
            tile_width,
            tile_height,
            tiled,
            downsample: 1.0,
            compression,
            photometric,
            samples_per_pixel,
            bits_per_sample,
            sample_format,
            description,
            resolution,
            resolution_unit,
            ifd,
        }))
    }

    /// Number of tiles in X and Y.
    pub fn tile_grid(&self) -> (u32, u32) {
        (
            self.width.div_ceil(self.tile_width),
            self.height.div_ceil(self.tile_height),
        )
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// The classified contents of a pyramidal TIFF.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    /// The file header
    pub header: TiffHeader,

    /// Pyramid levels, sorted by resolution (0 = highest)
    pub levels: Vec<TiffPage>,

    /// Associated images keyed by name ("thumbnail", "label", "macro")
    pub associated: Vec<(String, TiffPage)>,
}

impl TiffPyramid {
    /// Parse the file and classify its pages.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_bytes = reader
            .read_exact_at(0, BIGTIFF_HEADER_SIZE.min(reader.size() as usize))
            .await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let mut pages = Vec::new();
        let mut offset = header.first_ifd_offset;
        while offset != 0 && pages.len() < MAX_IFDS {
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_bytes = reader
                .read_exact_at(offset, Ifd::byte_size(entry_count, &header))
                .await?;
            let ifd = Ifd::parse(&ifd_bytes, &header)?;
            let next = ifd.next_ifd_offset;

            if let Some(page) = TiffPage::from_ifd(reader, &header, ifd, pages.len()).await? {
                pages.push(page);
            }

            offset = next;
        }

        Ok(Self::classify(header, pages))
    }

    fn classify(header: TiffHeader, pages: Vec<TiffPage>) -> Self {
        let mut candidates: Vec<TiffPage> = Vec::new();
        let mut associated: Vec<(String, TiffPage)> = Vec::new();

        for page in pages {
            if let Some(name) = Self::associated_name(&page) {
                let name = Self::unique_name(&associated, name);
                associated.push((name, page));
            } else if page.tiled {
                candidates.push(page);
            } else {
                // Unnamed strip page; by convention the first one is the
                // slide thumbnail.
                let name = Self::unique_name(&associated, "thumbnail");
                associated.push((name, page));
            }
        }

        candidates.sort_by(|a, b| {
            let area_a = a.width as u64 * a.height as u64;
            let area_b = b.width as u64 * b.height as u64;
            area_b.cmp(&area_a)
        });

        let mut levels: Vec<TiffPage> = Vec::new();
        for mut page in candidates {
            if levels.is_empty() {
                page.level_index = 0;
                page.downsample = 1.0;
                levels.push(page);
                continue;
            }
            let base = &levels[0];
            let ds_x = base.width as f64 / page.width as f64;
            let ds_y = base.height as f64 / page.height as f64;
            let aspect_ok = (ds_x / ds_y - 1.0).abs() <= ASPECT_TOLERANCE;
            let downsample = (ds_x + ds_y) / 2.0;
            let monotonic = downsample + 1e-9
                >= levels.last().map(|l| l.downsample).unwrap_or(1.0);

            if aspect_ok && monotonic {
                page.level_index = levels.len();
                page.downsample = downsample;
                levels.push(page);
            } else {
                warn!(
                    ifd = page.ifd_index,
                    width = page.width,
                    height = page.height,
                    "tiled page is not a consistent pyramid level, keeping it as an associated image"
                );
                let name = Self::unique_name(&associated, "image");
                associated.push((name, page));
            }
        }

        TiffPyramid {
            header,
            levels,
            associated,
        }
    }

    fn associated_name(page: &TiffPage) -> Option<&'static str> {
        let description = page.description.as_deref()?;
        let lower = description.to_ascii_lowercase();
        for name in ["label", "macro", "thumbnail"] {
            if lower.contains(name) {
                return Some(name);
            }
        }
        None
    }

    fn unique_name(associated: &[(String, TiffPage)], base: &str) -> String {
        if !associated.iter().any(|(n, _)| n == base) {
            return base.to_string();
        }
        let mut i = 2;
        loop {
            let candidate = format!("{}-{}", base, i);
            if !associated.iter().any(|(n, _)| n == &candidate) {
                return candidate;
            }
            i += 1;
        }
    }

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Get a level by index.
    pub fn level(&self, level: usize) -> Option<&TiffPage> {
        self.levels.get(level)
    }

    /// Find the level with the smallest downsample >= the requested factor,
    /// falling back to the lowest-resolution level.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        self.levels
            .iter()
            .filter(|l| l.downsample >= downsample * 0.99)
            .min_by(|a, b| a.downsample.total_cmp(&b.downsample))
            .or_else(|| self.levels.last())
            .map(|l| l.level_index)
    }
}

// =============================================================================
// Tile array loading
// =============================================================================

/// Loaded tile (or strip) location arrays for one page.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Byte offset of each tile in the file, row-major
    pub offsets: Vec<u64>,

    /// Byte count of each tile
    pub byte_counts: Vec<u64>,

    /// JPEGTables payload shared by abbreviated tile streams, if present
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load the offset/byte-count arrays for a page.
    pub async fn load<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        page: &TiffPage,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let (offsets_tag, counts_tag, offsets_name, counts_name) = if page.tiled {
            (
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
                "TileOffsets",
                "TileByteCounts",
            )
        } else {
            (
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
                "StripOffsets",
                "StripByteCounts",
            )
        };

        let offsets = values
            .read_uint_array(
                page.ifd
                    .get(offsets_tag)
                    .ok_or(TiffError::MissingTag(offsets_name))?,
            )
            .await?;
        let byte_counts = values
            .read_uint_array(
                page.ifd
                    .get(counts_tag)
                    .ok_or(TiffError::MissingTag(counts_name))?,
            )
            .await?;

        let (tiles_x, tiles_y) = page.tile_grid();
        let expected = tiles_x as usize * tiles_y as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: offsets_name,
                message: format!(
                    "expected {} tile locations, got {}/{}",
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match page.ifd.get(TiffTag::JpegTables) {
            Some(e) => Some(values.read_bytes(e).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }
}

// =============================================================================
// Metadata export
// =============================================================================

/// Export the recognized tags of an IFD as a JSON map, for the "tiff"
/// metadata namespace. Values are decoded to their natural JSON shape;
/// location arrays are summarized by length rather than dumped.
pub async fn ifd_metadata<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<Map<String, Value>, TiffError> {
    let values = ValueReader::new(reader, header);
    let mut map = Map::new();

    for entry in ifd.entries.values() {
        let tag = match TiffTag::from_u16(entry.tag_id) {
            Some(t) => t,
            None => continue,
        };

        let value = match tag {
            TiffTag::ImageDescription => json!(values.read_string(entry).await?),
            TiffTag::XResolution | TiffTag::YResolution => {
                json!(values.read_rational(entry).await?)
            }
            TiffTag::TileOffsets
            | TiffTag::TileByteCounts
            | TiffTag::StripOffsets
            | TiffTag::StripByteCounts => json!({ "count": entry.count }),
            TiffTag::JpegTables => json!({ "bytes": entry.count }),
            TiffTag::BitsPerSample | TiffTag::SampleFormat => {
                json!(values.read_uint_array(entry).await?)
            }
            _ => match entry.field_type {
                Some(FieldType::Ascii) => json!(values.read_string(entry).await?),
                _ => json!(values.read_uint(entry).await?),
            },
        };

        map.insert(tag.name().to_string(), value);
    }

    Ok(map)
}

// =============================================================================
// Tests
// =============================================================================
