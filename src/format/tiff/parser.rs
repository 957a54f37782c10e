//! TIFF/BigTIFF header and IFD parsing.
//!
//! Classic TIFF headers are 8 bytes (byte order, version 42, 4-byte first-IFD
//! offset); BigTIFF headers are 16 bytes (version 43, declared 8-byte offset
//! size, 8-byte first-IFD offset). Every multi-byte value after the first two
//! magic bytes is read in the declared byte order.
//!
//! An IFD (Image File Directory) is a counted list of fixed-size entries
//! followed by the offset of the next IFD. Entries whose value fits in the
//! value/offset field carry it inline; larger values live at the offset.

use std::collections::BTreeMap;

use crate::error::TiffError;

use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

const MAGIC_LITTLE_ENDIAN: u16 = 0x4949; // "II"
const MAGIC_BIG_ENDIAN: u16 = 0x4D4D; // "MM"

const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

/// Size of a classic TIFF header in bytes.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of a BigTIFF header in bytes.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "II" (Intel)
    LittleEndian,
    /// "MM" (Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from the first two bytes of a slice.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    /// Read a u32 from the first four bytes of a slice.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    /// Read a u64 from the first eight bytes of a slice.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let raw = [
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ];
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset of the first IFD
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// `file_size` is used to validate the first IFD offset.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        // The magic is a byte pattern, so read order does not matter here.
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            MAGIC_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            MAGIC_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        match version {
            VERSION_TIFF => {
                let first_ifd_offset = byte_order.read_u32(&bytes[4..8]) as u64;
                if first_ifd_offset >= file_size {
                    return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: false,
                    first_ifd_offset,
                })
            }
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                let first_ifd_offset = byte_order.read_u64(&bytes[8..16]);
                if first_ifd_offset >= file_size {
                    return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
                }
                Ok(TiffHeader {
                    byte_order,
                    is_bigtiff: true,
                    first_ifd_offset,
                })
            }
            _ => Err(TiffError::InvalidVersion(version)),
        }
    }

    /// Size of one IFD entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn ifd_entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry-count field at the start of an IFD.
    #[inline]
    pub const fn ifd_count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of the next-IFD-offset field at the end of an IFD.
    #[inline]
    pub const fn ifd_next_offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    /// Size of the value/offset field inside an entry.
    #[inline]
    pub const fn value_field_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One parsed IFD entry.
///
/// The raw value/offset field is kept as bytes; interpreting it as inline
/// data or as an offset is done on demand by
/// [`super::values::ValueReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    /// Numeric tag ID
    pub tag_id: u16,

    /// Recognized field type, if any
    pub field_type: Option<FieldType>,

    /// Raw field type value as stored in the file
    pub field_type_raw: u16,

    /// Number of values
    pub count: u64,

    /// Raw bytes of the value/offset field (4 bytes classic, 8 BigTIFF)
    pub value_field: Vec<u8>,

    /// Whether the value is stored inline in `value_field`
    pub is_inline: bool,
}

impl IfdEntry {
    /// Interpret the value field as an offset into the file.
    pub fn value_offset(&self, byte_order: ByteOrder) -> u64 {
        if self.value_field.len() >= 8 {
            byte_order.read_u64(&self.value_field)
        } else {
            byte_order.read_u32(&self.value_field) as u64
        }
    }

    /// The inline value bytes, truncated to the declared data size.
    ///
    /// Only meaningful when `is_inline` is true.
    pub fn inline_bytes(&self) -> &[u8] {
        let size = self
            .field_type
            .map(|t| t.size_in_bytes() as u64 * self.count)
            .unwrap_or(0) as usize;
        &self.value_field[..size.min(self.value_field.len())]
    }

    /// Total byte size of this entry's data.
    pub fn data_size(&self) -> u64 {
        self.field_type
            .map(|t| t.size_in_bytes() as u64 * self.count)
            .unwrap_or(0)
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// One parsed Image File Directory.
#[derive(Debug, Clone, Default)]
pub struct Ifd {
    /// Entries keyed by numeric tag ID (TIFF requires ascending tag order,
    /// which a sorted map preserves for the metadata namespace)
    pub entries: BTreeMap<u16, IfdEntry>,

    /// Offset of the next IFD in the chain (0 = end)
    pub next_ifd_offset: u64,
}

impl Ifd {
    /// Total byte size of an IFD with `entry_count` entries, including the
    /// count field and the trailing next-IFD offset.
    pub fn byte_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.ifd_count_size()
            + entry_count as usize * header.ifd_entry_size()
            + header.ifd_next_offset_size()
    }

    /// Parse an IFD from raw bytes that start at the IFD's count field.
    pub fn parse(bytes: &[u8], header: &TiffHeader) -> Result<Self, TiffError> {
        let order = header.byte_order;
        let count_size = header.ifd_count_size();
        if bytes.len() < count_size {
            return Err(TiffError::FileTooSmall {
                required: count_size as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_count = if header.is_bigtiff {
            order.read_u64(&bytes[..8])
        } else {
            order.read_u16(&bytes[..2]) as u64
        };

        let needed = Self::byte_size(entry_count, header);
        if bytes.len() < needed {
            return Err(TiffError::FileTooSmall {
                required: needed as u64,
                actual: bytes.len() as u64,
            });
        }

        let entry_size = header.ifd_entry_size();
        let value_size = header.value_field_size();
        let mut entries = BTreeMap::new();

        for i in 0..entry_count as usize {
            let at = count_size + i * entry_size;
            let raw = &bytes[at..at + entry_size];

            let tag_id = order.read_u16(&raw[0..2]);
            let field_type_raw = order.read_u16(&raw[2..4]);
            let field_type = FieldType::from_u16(field_type_raw);
            let count = if header.is_bigtiff {
                order.read_u64(&raw[4..12])
            } else {
                order.read_u32(&raw[4..8]) as u64
            };
            let value_field = raw[entry_size - value_size..].to_vec();

            let is_inline = field_type
                .map(|t| t.fits_inline(count, header.is_bigtiff))
                .unwrap_or(false);

            entries.insert(
                tag_id,
                IfdEntry {
                    tag_id,
                    field_type,
                    field_type_raw,
                    count,
                    value_field,
                    is_inline,
                },
            );
        }

        let next_at = count_size + entry_count as usize * entry_size;
        let next_ifd_offset = if header.is_bigtiff {
            order.read_u64(&bytes[next_at..next_at + 8])
        } else {
            order.read_u32(&bytes[next_at..next_at + 4]) as u64
        };

        Ok(Ifd {
            entries,
            next_ifd_offset,
        })
    }

    /// Look up an entry by recognized tag.
    pub fn get(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.get(&tag.as_u16())
    }

    /// Check whether this IFD declares tile organization.
    pub fn is_tiled(&self) -> bool {
        self.get(TiffTag::TileWidth).is_some() && self.get(TiffTag::TileOffsets).is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================
