use thiserror::Error;

/// I/O errors that can occur when reading byte ranges from an image source.
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reading from the underlying file or buffer
    #[error("Read error: {0}")]
    Read(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Source not found
    #[error("Source not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing the TIFF container structure.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from an IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in an IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// The public error taxonomy surfaced by [`crate::ImageHandle`] and friends.
///
/// Header parse failures abort `open`. Usage errors (`InvalidAxis`,
/// `InvalidLevel`, `OutOfBounds`) are recoverable by retrying with corrected
/// arguments. `Decode` aborts the enclosing region read; partial buffers are
/// never returned.
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    /// File is not a format this crate can read
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    /// Container header failed to parse
    #[error("Corrupt header: {0}")]
    CorruptHeader(#[from] TiffError),

    /// I/O failure reading the source
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// A dimension-order string referenced an axis not present in `dims`,
    /// or referenced an axis twice
    #[error("Invalid axis '{axis}' for dimension order \"{dims}\"")]
    InvalidAxis { axis: char, dims: String },

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: image has {level_count} level(s)")]
    InvalidLevel { level: usize, level_count: usize },

    /// Requested region does not intersect the level's valid extent
    #[error(
        "Region ({x}, {y}) {width}x{height} is outside level bounds {level_width}x{level_height}"
    )]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    /// A tile failed to decode; the whole region read is aborted
    #[error("Failed to decode tile ({tile_x}, {tile_y}) at level {level}: {message}")]
    Decode {
        level: usize,
        tile_x: u32,
        tile_y: u32,
        message: String,
    },

    /// No associated image with the given name
    #[error("Unknown associated image: {name}")]
    UnknownAssociatedImage { name: String },

    /// Operation attempted on a closed handle
    #[error("Image handle is closed")]
    ClosedHandle,
}
