//! TIFF tag, field-type, and enumerated-value vocabulary.
//!
//! Only the tags needed to describe a tiled (or stripped) pyramidal image
//! are defined; unknown tags are preserved verbatim in the raw metadata
//! namespace but otherwise ignored.

// =============================================================================
// Field Types
// =============================================================================

/// TIFF field types that determine how tag values are encoded.
///
/// The per-element byte size decides whether a value is stored inline in the
/// IFD entry or behind an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit ASCII character
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two LONGs: numerator, denominator
    Rational = 5,
    /// Undefined byte data
    Undefined = 7,
    /// Unsigned 64-bit integer (BigTIFF only)
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }

    /// Create a `FieldType` from its numeric value.
    ///
    /// Returns `None` for unsupported or unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Check if `count` values of this type fit inline in the entry's
    /// value/offset field (4 bytes for classic TIFF, 8 for BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let total = self.size_in_bytes() as u64 * count;
        total <= if is_bigtiff { 8 } else { 4 }
    }
}

// =============================================================================
// Tags
// =============================================================================

/// TIFF tag IDs relevant to pyramidal image parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    /// Image width in pixels
    ImageWidth = 256,
    /// Image height (length) in pixels
    ImageLength = 257,
    /// Bits per sample (one value per sample)
    BitsPerSample = 258,
    /// Compression scheme
    Compression = 259,
    /// Photometric interpretation (gray, RGB, YCbCr, ...)
    PhotometricInterpretation = 262,
    /// Description string (vendor metadata lives here in SVS files)
    ImageDescription = 270,
    /// Byte offsets of strips (strip-organized pages)
    StripOffsets = 273,
    /// Number of samples per pixel
    SamplesPerPixel = 277,
    /// Rows per strip (strip-organized pages)
    RowsPerStrip = 278,
    /// Byte counts of strips
    StripByteCounts = 279,
    /// Pixels per resolution unit in X
    XResolution = 282,
    /// Pixels per resolution unit in Y
    YResolution = 283,
    /// Chunky vs planar sample layout
    PlanarConfiguration = 284,
    /// Unit for XResolution/YResolution (1=none, 2=inch, 3=centimeter)
    ResolutionUnit = 296,
    /// Width of each tile in pixels
    TileWidth = 322,
    /// Height of each tile in pixels
    TileLength = 323,
    /// Byte offsets of each tile
    TileOffsets = 324,
    /// Byte counts of each tile
    TileByteCounts = 325,
    /// Sample format (1=uint, 2=int, 3=float)
    SampleFormat = 339,
    /// JPEG quantization/Huffman tables shared by abbreviated tile streams
    JpegTables = 347,
}

impl TiffTag {
    /// Create a `TiffTag` from its numeric value.
    ///
    /// Unknown tags are not an error; they are simply not interpreted.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            270 => Some(TiffTag::ImageDescription),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            282 => Some(TiffTag::XResolution),
            283 => Some(TiffTag::YResolution),
            284 => Some(TiffTag::PlanarConfiguration),
            296 => Some(TiffTag::ResolutionUnit),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            339 => Some(TiffTag::SampleFormat),
            347 => Some(TiffTag::JpegTables),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Name used as the key in the "tiff" metadata namespace.
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::XResolution => "XResolution",
            TiffTag::YResolution => "YResolution",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::ResolutionUnit => "ResolutionUnit",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::SampleFormat => "SampleFormat",
            TiffTag::JpegTables => "JPEGTables",
        }
    }
}

// =============================================================================
// Compression
// =============================================================================

/// TIFF compression scheme identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// No compression
    None = 1,
    /// LZW (not supported)
    Lzw = 5,
    /// "Old-style" JPEG (not supported)
    OldJpeg = 6,
    /// Baseline JPEG
    Jpeg = 7,
    /// Deflate/zlib
    Deflate = 8,
    /// Adobe Deflate (same codec, different tag value)
    AdobeDeflate = 32946,
    /// Aperio JPEG 2000 YCbCr (not supported)
    AperioJp2kYcbcr = 33003,
    /// Aperio JPEG 2000 RGB (not supported)
    AperioJp2kRgb = 33005,
}

impl Compression {
    /// Create a `Compression` from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32946 => Some(Compression::AdobeDeflate),
            33003 => Some(Compression::AperioJp2kYcbcr),
            33005 => Some(Compression::AperioJp2kRgb),
            _ => None,
        }
    }

    /// Check if this crate can decode tiles with this compression.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            Compression::None | Compression::Jpeg | Compression::Deflate | Compression::AdobeDeflate
        )
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::AperioJp2kYcbcr => "Aperio JPEG 2000 (YCbCr)",
            Compression::AperioJp2kRgb => "Aperio JPEG 2000 (RGB)",
        }
    }
}

// =============================================================================
// Photometric Interpretation
// =============================================================================

/// TIFF photometric interpretation values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Photometric {
    /// Grayscale, 0 = white
    MinIsWhite = 0,
    /// Grayscale, 0 = black
    MinIsBlack = 1,
    /// RGB color
    Rgb = 2,
    /// Palette color (not supported)
    Palette = 3,
    /// YCbCr (JPEG-compressed color)
    YCbCr = 6,
}

impl Photometric {
    /// Create a `Photometric` from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Photometric::MinIsWhite),
            1 => Some(Photometric::MinIsBlack),
            2 => Some(Photometric::Rgb),
            3 => Some(Photometric::Palette),
            6 => Some(Photometric::YCbCr),
            _ => None,
        }
    }
}

// =============================================================================
// Sample Format
// =============================================================================

/// TIFF sample format values (tag 339).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SampleFormat {
    /// Unsigned integer samples
    Uint = 1,
    /// Signed integer samples
    Int = 2,
    /// IEEE floating-point samples
    Float = 3,
}

impl SampleFormat {
    /// Create a `SampleFormat` from its numeric value, defaulting to `Uint`
    /// for the baseline-TIFF "unspecified" value 4.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 | 4 => Some(SampleFormat::Uint),
            2 => Some(SampleFormat::Int),
            3 => Some(SampleFormat::Float),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
