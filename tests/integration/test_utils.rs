//! In-memory TIFF fixture builder.
//!
//! Produces little-endian classic TIFF files with any number of pages,
//! tiled or strip-organized, uncompressed or Deflate. Pixel values come
//! from a per-page function so tests can verify reads pixel by pixel.

use std::io::Write;

use slidekit::io::MemoryRangeReader;
use slidekit::{ImageHandle, OpenOptions};

/// Value of one sample at (x, y, channel).
pub type PixelFn = fn(u32, u32, u16) -> u8;

/// A deterministic gradient that differs per channel and never aliases
/// across a 256-pixel span.
pub fn gradient(x: u32, y: u32, c: u16) -> u8 {
    (x as usize * 7 + y as usize * 13 + c as usize * 29) as u8
}

// =============================================================================
// Page specification
// =============================================================================

pub struct PageSpec {
    width: u32,
    height: u32,
    /// `Some(edge)` = square tiles, `None` = strips
    tile_size: Option<u32>,
    rows_per_strip: u32,
    channels: u16,
    deflate: bool,
    /// Overrides the Compression tag without compressing (for negative tests)
    compression_override: Option<u16>,
    /// Truncates the first chunk's stored payload (simulates a corrupted
    /// byte count)
    truncate_first_chunk: Option<usize>,
    description: Option<String>,
    pixel: PixelFn,
}

impl PageSpec {
    pub fn tiled(width: u32, height: u32, tile: u32, channels: u16) -> Self {
        PageSpec {
            width,
            height,
            tile_size: Some(tile),
            rows_per_strip: 0,
            channels,
            deflate: false,
            compression_override: None,
            truncate_first_chunk: None,
            description: None,
            pixel: |_, _, _| 0,
        }
    }

    pub fn stripped(width: u32, height: u32, rows_per_strip: u32, channels: u16) -> Self {
        PageSpec {
            width,
            height,
            tile_size: None,
            rows_per_strip,
            channels,
            deflate: false,
            compression_override: None,
            truncate_first_chunk: None,
            description: None,
            pixel: |_, _, _| 0,
        }
    }

    pub fn pixels(mut self, f: PixelFn) -> Self {
        self.pixel = f;
        self
    }

    pub fn description(mut self, d: &str) -> Self {
        self.description = Some(d.to_string());
        self
    }

    pub fn deflate(mut self) -> Self {
        self.deflate = true;
        self
    }

    pub fn compression_tag(mut self, value: u16) -> Self {
        self.compression_override = Some(value);
        self
    }

    pub fn truncate_first_chunk(mut self, bytes: usize) -> Self {
        self.truncate_first_chunk = Some(bytes);
        self
    }

    /// Chunk payloads: tiles padded to the nominal tile size, strips holding
    /// only their valid rows.
    fn chunks(&self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        match self.tile_size {
            Some(tile) => {
                for ty in 0..self.height.div_ceil(tile) {
                    for tx in 0..self.width.div_ceil(tile) {
                        let mut blob = Vec::new();
                        for row in 0..tile {
                            for col in 0..tile {
                                let (x, y) = (tx * tile + col, ty * tile + row);
                                for c in 0..self.channels {
                                    blob.push(if x < self.width && y < self.height {
                                        (self.pixel)(x, y, c)
                                    } else {
                                        0
                                    });
                                }
                            }
                        }
                        chunks.push(blob);
                    }
                }
            }
            None => {
                let rows = self.rows_per_strip.max(1);
                for y0 in (0..self.height).step_by(rows as usize) {
                    let mut blob = Vec::new();
                    for y in y0..(y0 + rows).min(self.height) {
                        for x in 0..self.width {
                            for c in 0..self.channels {
                                blob.push((self.pixel)(x, y, c));
                            }
                        }
                    }
                    chunks.push(blob);
                }
            }
        }

        let mut chunks: Vec<Vec<u8>> = if self.deflate {
            chunks
                .into_iter()
                .map(|blob| {
                    let mut enc = flate2::write::ZlibEncoder::new(
                        Vec::new(),
                        flate2::Compression::default(),
                    );
                    enc.write_all(&blob).unwrap();
                    enc.finish().unwrap()
                })
                .collect()
        } else {
            chunks
        };

        if let Some(bytes) = self.truncate_first_chunk {
            chunks[0].truncate(bytes);
        }
        chunks
    }

    fn compression_value(&self) -> u16 {
        if let Some(v) = self.compression_override {
            return v;
        }
        if self.deflate {
            8
        } else {
            1
        }
    }
}

// =============================================================================
// IFD entry encoding
// =============================================================================

enum Value {
    Inline([u8; 4]),
    External(Vec<u8>),
}

struct Entry {
    tag: u16,
    field_type: u16,
    count: u32,
    value: Value,
}

fn short(tag: u16, v: u16) -> Entry {
    let mut field = [0u8; 4];
    field[..2].copy_from_slice(&v.to_le_bytes());
    Entry { tag, field_type: 3, count: 1, value: Value::Inline(field) }
}

fn long(tag: u16, v: u32) -> Entry {
    Entry { tag, field_type: 4, count: 1, value: Value::Inline(v.to_le_bytes()) }
}

fn shorts(tag: u16, values: &[u16]) -> Entry {
    let count = values.len() as u32;
    if values.len() <= 2 {
        let mut field = [0u8; 4];
        for (i, v) in values.iter().enumerate() {
            field[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        Entry { tag, field_type: 3, count, value: Value::Inline(field) }
    } else {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Entry { tag, field_type: 3, count, value: Value::External(bytes) }
    }
}

fn longs(tag: u16, values: &[u32]) -> Entry {
    let count = values.len() as u32;
    if values.len() == 1 {
        Entry { tag, field_type: 4, count, value: Value::Inline(values[0].to_le_bytes()) }
    } else {
        let bytes = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Entry { tag, field_type: 4, count, value: Value::External(bytes) }
    }
}

fn ascii(tag: u16, text: &str) -> Entry {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    let count = bytes.len() as u32;
    if bytes.len() <= 4 {
        let mut field = [0u8; 4];
        field[..bytes.len()].copy_from_slice(&bytes);
        Entry { tag, field_type: 2, count, value: Value::Inline(field) }
    } else {
        Entry { tag, field_type: 2, count, value: Value::External(bytes) }
    }
}

// =============================================================================
// TiffBuilder
// =============================================================================

pub struct TiffBuilder {
    pages: Vec<PageSpec>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        TiffBuilder { pages: Vec::new() }
    }

    pub fn page(mut self, page: PageSpec) -> Self {
        self.pages.push(page);
        self
    }

    pub fn build(self) -> Vec<u8> {
        // Classic little-endian header; first-IFD offset patched below.
        let mut file = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];

        let mut per_page_entries: Vec<Vec<Entry>> = Vec::new();
        for page in &self.pages {
            align(&mut file);
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for blob in page.chunks() {
                align(&mut file);
                offsets.push(file.len() as u32);
                counts.push(blob.len() as u32);
                file.extend_from_slice(&blob);
            }

            let mut entries = vec![
                long(256, page.width),
                long(257, page.height),
                shorts(258, &vec![8u16; page.channels as usize]),
                short(259, page.compression_value()),
                short(262, if page.channels >= 3 { 2 } else { 1 }),
                short(277, page.channels),
            ];
            if let Some(d) = &page.description {
                entries.push(ascii(270, d));
            }
            match page.tile_size {
                Some(tile) => {
                    entries.push(short(322, tile as u16));
                    entries.push(short(323, tile as u16));
                    entries.push(longs(324, &offsets));
                    entries.push(longs(325, &counts));
                }
                None => {
                    entries.push(longs(273, &offsets));
                    entries.push(long(278, page.rows_per_strip));
                    entries.push(longs(279, &counts));
                }
            }
            // TIFF requires ascending tag order within an IFD
            entries.sort_by_key(|e| e.tag);
            per_page_entries.push(entries);
        }

        let mut prev_link: usize = 4; // header's first-IFD offset field
        for entries in per_page_entries {
            // External values first, then the IFD itself
            let mut value_fields: Vec<[u8; 4]> = Vec::new();
            for entry in &entries {
                match &entry.value {
                    Value::Inline(field) => value_fields.push(*field),
                    Value::External(data) => {
                        align(&mut file);
                        let offset = file.len() as u32;
                        file.extend_from_slice(data);
                        value_fields.push(offset.to_le_bytes());
                    }
                }
            }

            align(&mut file);
            let ifd_offset = file.len() as u32;
            file[prev_link..prev_link + 4].copy_from_slice(&ifd_offset.to_le_bytes());

            file.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for (entry, field) in entries.iter().zip(&value_fields) {
                file.extend_from_slice(&entry.tag.to_le_bytes());
                file.extend_from_slice(&entry.field_type.to_le_bytes());
                file.extend_from_slice(&entry.count.to_le_bytes());
                file.extend_from_slice(field);
            }
            prev_link = file.len();
            file.extend_from_slice(&0u32.to_le_bytes());
        }

        file
    }
}

fn align(file: &mut Vec<u8>) {
    if file.len() % 2 == 1 {
        file.push(0);
    }
}

// =============================================================================
// Open helpers
// =============================================================================

pub async fn open_mem(data: Vec<u8>) -> ImageHandle<MemoryRangeReader> {
    try_open_mem(data).await.expect("fixture should open")
}

pub async fn try_open_mem(
    data: Vec<u8>,
) -> Result<ImageHandle<MemoryRangeReader>, slidekit::ImageError> {
    ImageHandle::from_reader(
        MemoryRangeReader::new(data, "mem://fixture"),
        OpenOptions::default(),
    )
    .await
}
