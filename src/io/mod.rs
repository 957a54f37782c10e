//! I/O layer: random-access byte-range reading over image sources.
//!
//! The container parser and the tile decoder never touch files directly;
//! everything goes through the [`RangeReader`] trait so the same code can
//! read from local files, in-memory buffers, or any other backend that can
//! serve byte ranges.

mod file;
mod memory;

pub use file::FileRangeReader;
pub use memory::MemoryRangeReader;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from an image source.
///
/// Implementations must be thread-safe: multiple in-flight reads on the same
/// reader are issued concurrently during a region read.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the source in bytes.
    fn size(&self) -> u64;

    /// A unique identifier for this source (for logging).
    fn identifier(&self) -> &str;
}
