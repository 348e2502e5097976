//! On-disk storage for received batches.
//!
//! Each connection gets its own batch directory under the storage root,
//! named by local arrival time with millisecond precision:
//!
//! ```text
//! ReceivedData/
//!   20261019143005123/      <- YYYYMMDDHHMMSSmmm
//!     car.jpg
//!     plate.txt
//!   20261019143005123-1/    <- second batch in the same millisecond
//! ```
//!
//! The leaf directory is created exclusively, so two sessions never share
//! a batch directory even when their timestamps collide.

use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::error::TransferError;
use crate::header::FileMetadata;

/// Upper bound on `-N` suffixes tried for one timestamp.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Storage root shared by all connections.
#[derive(Debug, Clone)]
pub struct BatchStore {
    root: PathBuf,
}

impl BatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh batch directory stamped with the current time.
    pub async fn create_batch(&self) -> Result<BatchDir, TransferError> {
        self.create_batch_at(Local::now()).await
    }

    async fn create_batch_at(&self, now: DateTime<Local>) -> Result<BatchDir, TransferError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| TransferError::storage(&self.root, e))?;

        let base = batch_name(now);
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{base}-{attempt}")
            };
            let path = self.root.join(name);

            match fs::create_dir(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Created batch directory");
                    return Ok(BatchDir { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(TransferError::storage(path, e)),
            }
        }

        Err(TransferError::storage(
            self.root.join(base),
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "no free batch directory name for this timestamp",
            ),
        ))
    }
}

/// Fixed-width batch directory name: `YYYYMMDDHHMMSSmmm`.
pub fn batch_name(now: DateTime<Local>) -> String {
    now.format("%Y%m%d%H%M%S%3f").to_string()
}

/// A batch directory owned by one transfer session.
#[derive(Debug)]
pub struct BatchDir {
    path: PathBuf,
}

impl BatchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one received file into the batch.
    ///
    /// Plain-text payloads are decoded as UTF-8 (invalid sequences replaced)
    /// and stored as text; everything else is stored verbatim. An existing
    /// file with the same name is overwritten.
    pub async fn write_file(
        &self,
        meta: &FileMetadata,
        data: &[u8],
    ) -> Result<PathBuf, TransferError> {
        let path = self.path.join(&meta.name);

        let result = if meta.is_text() {
            let text = String::from_utf8_lossy(data);
            fs::write(&path, text.as_bytes()).await
        } else {
            fs::write(&path, data).await
        };

        result.map_err(|e| TransferError::storage(&path, e))?;
        Ok(path)
    }
}
