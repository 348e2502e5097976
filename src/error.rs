//! Error types for the receiver.
//!
//! `TransferError` is scoped to a single connection: it is logged with the
//! peer's identity and the connection is dropped. `ServerError` is fatal to
//! the accept loop. Configuration errors live in [`crate::config`].

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Stable tag for each connection failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnexpectedEndOfStream,
    Io,
    InvalidHeaderSize,
    InvalidHeaderFormat,
    InvalidFileName,
    InvalidFileSize,
    StorageError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnexpectedEndOfStream => "unexpected_end_of_stream",
            ErrorKind::Io => "io",
            ErrorKind::InvalidHeaderSize => "invalid_header_size",
            ErrorKind::InvalidHeaderFormat => "invalid_header_format",
            ErrorKind::InvalidFileName => "invalid_file_name",
            ErrorKind::InvalidFileSize => "invalid_file_size",
            ErrorKind::StorageError => "storage_error",
        };
        f.write_str(name)
    }
}

/// Failure of a single transfer session.
#[derive(Debug)]
pub enum TransferError {
    /// Peer closed the stream in the middle of a frame.
    UnexpectedEndOfStream { expected: usize, received: usize },
    /// Socket read failed for a reason other than EOF.
    Io(io::Error),
    /// Declared header length is negative or above the cap.
    InvalidHeaderSize(i32),
    /// Header is not a JSON array of file entries, or is empty.
    InvalidHeaderFormat(String),
    /// Entry name is empty after sanitization.
    InvalidFileName(String),
    /// Entry size is zero, negative, or above the per-file cap.
    InvalidFileSize { name: String, size: i64 },
    /// Batch directory or file could not be created or written.
    Storage { path: PathBuf, source: io::Error },
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::UnexpectedEndOfStream { .. } => ErrorKind::UnexpectedEndOfStream,
            TransferError::Io(_) => ErrorKind::Io,
            TransferError::InvalidHeaderSize(_) => ErrorKind::InvalidHeaderSize,
            TransferError::InvalidHeaderFormat(_) => ErrorKind::InvalidHeaderFormat,
            TransferError::InvalidFileName(_) => ErrorKind::InvalidFileName,
            TransferError::InvalidFileSize { .. } => ErrorKind::InvalidFileSize,
            TransferError::Storage { .. } => ErrorKind::StorageError,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::Storage {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::UnexpectedEndOfStream { expected, received } => write!(
                f,
                "Stream closed after {received} of {expected} expected bytes"
            ),
            TransferError::Io(e) => write!(f, "Read failed: {e}"),
            TransferError::InvalidHeaderSize(len) => write!(f, "Invalid header size: {len}"),
            TransferError::InvalidHeaderFormat(msg) => write!(f, "Invalid header format: {msg}"),
            TransferError::InvalidFileName(name) => write!(f, "Invalid file name: {name:?}"),
            TransferError::InvalidFileSize { name, size } => {
                write!(f, "Invalid file size for {name}: {size}")
            }
            TransferError::Storage { path, source } => {
                write!(f, "Failed to write '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(e) => Some(e),
            TransferError::Storage { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors that stop the accept loop.
#[derive(Debug)]
pub enum ServerError {
    Bind(String, io::Error),
    Accept(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind(addr, e) => write!(f, "Failed to bind '{addr}': {e}"),
            ServerError::Accept(e) => write!(f, "Failed to accept connection: {e}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind(_, e) | ServerError::Accept(e) => Some(e),
        }
    }
}
