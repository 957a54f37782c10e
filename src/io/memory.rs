//! Range reader backed by an in-memory buffer.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

use super::RangeReader;

/// Reads byte ranges from an in-memory buffer.
///
/// Useful for sources that are already resident (small images, network
/// payloads) and as the test vehicle for the parser and region reader.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    /// Wrap a buffer in a range reader.
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size: self.data.len() as u64,
        })?;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}
