//! Reading and interpreting IFD entry values.
//!
//! Entry values are either inline in the entry's value/offset field or stored
//! at an offset elsewhere in the file. [`ValueReader`] hides that distinction
//! and converts raw bytes into the numeric shapes the rest of the parser
//! needs.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Reads and decodes IFD entry values against a [`RangeReader`].
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Fetch the raw data bytes for an entry, inline or from its offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry.data_size() as usize;
        if entry.is_inline {
            Ok(Bytes::copy_from_slice(&entry.inline_bytes()[..size]))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            Ok(self.reader.read_exact_at(offset, size).await?)
        }
    }

    /// Read a single unsigned integer value (SHORT, LONG, or LONG8).
    pub async fn read_uint(&self, entry: &IfdEntry) -> Result<u64, TiffError> {
        let bytes = self.read_bytes(entry).await?;
        let order = self.header.byte_order;
        // A zero count (or a lying one) yields fewer bytes than the field
        // type needs; reject it instead of indexing past the slice.
        let needed = entry.field_type.map(FieldType::size_in_bytes).unwrap_or(0);
        if bytes.len() < needed || needed == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "uint",
                message: format!(
                    "expected {} value byte(s), got {} (count {})",
                    needed,
                    bytes.len(),
                    entry.count
                ),
            });
        }
        match entry.field_type {
            Some(FieldType::Byte) => Ok(bytes[0] as u64),
            Some(FieldType::Short) => Ok(order.read_u16(&bytes) as u64),
            Some(FieldType::Long) => Ok(order.read_u32(&bytes) as u64),
            Some(FieldType::Long8) => Ok(order.read_u64(&bytes)),
            _ => Err(TiffError::InvalidTagValue {
                tag: "uint",
                message: format!("unexpected field type {}", entry.field_type_raw),
            }),
        }
    }

    /// Read an array of unsigned integers, widened to u64.
    ///
    /// Accepts SHORT, LONG, and LONG8 arrays; tile offset/byte-count arrays
    /// use LONG in classic TIFF and LONG8 in BigTIFF.
    pub async fn read_uint_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let bytes = self.read_bytes(entry).await?;
        let order = self.header.byte_order;
        let count = entry.count as usize;
        let mut values = Vec::with_capacity(count);
        match entry.field_type {
            Some(FieldType::Short) => {
                for chunk in bytes.chunks_exact(2).take(count) {
                    values.push(order.read_u16(chunk) as u64);
                }
            }
            Some(FieldType::Long) => {
                for chunk in bytes.chunks_exact(4).take(count) {
                    values.push(order.read_u32(chunk) as u64);
                }
            }
            Some(FieldType::Long8) => {
                for chunk in bytes.chunks_exact(8).take(count) {
                    values.push(order.read_u64(chunk));
                }
            }
            _ => {
                return Err(TiffError::InvalidTagValue {
                    tag: "uint array",
                    message: format!("unexpected field type {}", entry.field_type_raw),
                })
            }
        }
        if values.len() != count {
            return Err(TiffError::InvalidTagValue {
                tag: "uint array",
                message: format!("expected {} values, got {}", count, values.len()),
            });
        }
        Ok(values)
    }

    /// Read the first RATIONAL value as a float.
    pub async fn read_rational(&self, entry: &IfdEntry) -> Result<f64, TiffError> {
        if entry.field_type != Some(FieldType::Rational) {
            return Err(TiffError::InvalidTagValue {
                tag: "rational",
                message: format!("unexpected field type {}", entry.field_type_raw),
            });
        }
        let bytes = self.read_bytes(entry).await?;
        if bytes.len() < 8 {
            return Err(TiffError::InvalidTagValue {
                tag: "rational",
                message: "value too short".to_string(),
            });
        }
        let order = self.header.byte_order;
        let numerator = order.read_u32(&bytes[0..4]) as f64;
        let denominator = order.read_u32(&bytes[4..8]) as f64;
        if denominator == 0.0 {
            return Err(TiffError::InvalidTagValue {
                tag: "rational",
                message: "zero denominator".to_string(),
            });
        }
        Ok(numerator / denominator)
    }

    /// Read an ASCII entry as a string, trimming trailing NULs.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}
