//! Per-connection transfer session.
//!
//! A session walks a fixed sequence of states:
//!
//! ```text
//! AwaitHeaderLength -> AwaitHeaderBytes -> ParseHeader -> ValidateHeader
//!   -> PrepareDestination -> AwaitFile(0..n) -> Done
//! ```
//!
//! Any failure moves the session to `Aborted` and the connection is
//! dropped. Files already written stay on disk; no partial-skip recovery
//! is attempted because the stream position is no longer trustworthy.

use std::path::PathBuf;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::error::TransferError;
use crate::framing;
use crate::header::{self, FileMetadata};
use crate::storage::BatchStore;

/// Current step of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitHeaderLength,
    AwaitHeaderBytes,
    ParseHeader,
    ValidateHeader,
    PrepareDestination,
    /// Receiving the body of file `index` (zero-based, header order).
    AwaitFile { index: usize },
    Done,
    Aborted,
}

/// A file persisted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: usize,
}

/// Outcome of a successful session.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub batch_dir: PathBuf,
    pub files: Vec<SavedFile>,
    pub total_bytes: u64,
}

/// State of one accepted connection. Never shared between connections.
pub struct TransferSession<'a> {
    store: &'a BatchStore,
    state: SessionState,
    bytes_consumed: u64,
}

impl<'a> TransferSession<'a> {
    pub fn new(store: &'a BatchStore) -> Self {
        Self {
            store,
            state: SessionState::AwaitHeaderLength,
            bytes_consumed: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes of completed frames read so far, length prefix included.
    ///
    /// A frame cut short by the peer is not counted.
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Drive the session to completion over `stream`.
    pub async fn run<S>(&mut self, stream: &mut S) -> Result<TransferSummary, TransferError>
    where
        S: AsyncRead + Unpin,
    {
        let result = self.process(stream).await;
        self.state = match result {
            Ok(_) => SessionState::Done,
            Err(_) => SessionState::Aborted,
        };
        result
    }

    async fn process<S>(&mut self, stream: &mut S) -> Result<TransferSummary, TransferError>
    where
        S: AsyncRead + Unpin,
    {
        let prefix = framing::read_exact(stream, framing::HEADER_LEN_PREFIX).await?;
        self.bytes_consumed += prefix.len() as u64;
        let header_len = framing::decode_header_len(&prefix)?;

        self.state = SessionState::AwaitHeaderBytes;
        let header_bytes = framing::read_exact(stream, header_len).await?;
        self.bytes_consumed += header_len as u64;

        self.state = SessionState::ParseHeader;
        let header_text = String::from_utf8_lossy(&header_bytes);
        debug!(header = %header_text, "Raw header received");
        let entries = header::parse(&header_text)?;

        self.state = SessionState::ValidateHeader;
        let files = header::validate(entries)?;

        self.state = SessionState::PrepareDestination;
        let batch = self.store.create_batch().await?;

        let count = files.len();
        let mut saved = Vec::with_capacity(count);
        let mut total_bytes = 0u64;

        for (index, meta) in files.iter().enumerate() {
            self.state = SessionState::AwaitFile { index };
            let data = framing::read_exact(stream, meta.size).await?;
            self.bytes_consumed += data.len() as u64;

            let path = batch.write_file(meta, &data).await?;
            total_bytes += data.len() as u64;

            info!(
                file = %meta.name,
                bytes = data.len(),
                index = index + 1,
                count,
                "Saved"
            );
            saved.push(saved_file(meta, path));
        }

        Ok(TransferSummary {
            batch_dir: batch.path().to_path_buf(),
            files: saved,
            total_bytes,
        })
    }
}

fn saved_file(meta: &FileMetadata, path: PathBuf) -> SavedFile {
    SavedFile {
        name: meta.name.clone(),
        path,
        size: meta.size,
    }
}
