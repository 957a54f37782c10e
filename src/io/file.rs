//! Range reader backed by a local file.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

use super::RangeReader;

/// Reads byte ranges from a file on the local filesystem.
///
/// Positioned reads are issued on the blocking pool so that large tile reads
/// do not stall the async runtime. The file handle is shared, so concurrent
/// reads from one reader are safe.
#[derive(Debug, Clone)]
pub struct FileRangeReader {
    file: Arc<File>,
    size: u64,
    path: String,
}

impl FileRangeReader {
    /// Open a file for range reading.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path_str = path.as_ref().display().to_string();
        let opened = path_str.clone();
        let (file, size) = tokio::task::spawn_blocking(move || -> Result<(File, u64), IoError> {
            let file = File::open(&opened).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    IoError::NotFound(opened.clone())
                } else {
                    IoError::Read(e.to_string())
                }
            })?;
            let size = file
                .metadata()
                .map_err(|e| IoError::Read(e.to_string()))?
                .len();
            Ok((file, size))
        })
        .await
        .map_err(|e| IoError::Read(e.to_string()))??;

        Ok(Self {
            file: Arc::new(file),
            size,
            path: path_str,
        })
    }

    fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            file.read_exact_at(buf, offset)
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut pos = 0;
            while pos < buf.len() {
                let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
                if n == 0 {
                    return Err(std::io::ErrorKind::UnexpectedEof.into());
                }
                pos += n;
            }
            Ok(())
        }
    }
}

#[async_trait]
impl RangeReader for FileRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        if offset + len as u64 > self.size {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            });
        }

        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            Self::read_at(&file, offset, &mut buf).map_err(|e| IoError::Read(e.to_string()))?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| IoError::Read(e.to_string()))?
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.path
    }
}
