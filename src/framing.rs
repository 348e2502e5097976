//! Exact-count reads over a byte stream.
//!
//! The wire format is:
//!
//! ```text
//! +----------------------+---------------------------+----------------------+
//! | header_len (i32, BE) | header (header_len bytes) | file bodies, in order |
//! +----------------------+---------------------------+----------------------+
//!        4 bytes              UTF-8 JSON array          exactly `size` each
//! ```
//!
//! Every read in the protocol goes through [`read_exact`], which keeps
//! reading across short reads and reports a peer close mid-frame as
//! [`TransferError::UnexpectedEndOfStream`].

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::TransferError;

/// Size of the header length prefix.
pub const HEADER_LEN_PREFIX: usize = 4;

/// Maximum accepted header size (10 MiB).
pub const MAX_HEADER_SIZE: usize = 10 * 1024 * 1024;

/// Read exactly `count` bytes from `stream`.
///
/// Short reads are continued from the current offset. A read returning zero
/// bytes before `count` bytes were collected fails the frame.
pub async fn read_exact<R>(stream: &mut R, count: usize) -> Result<Bytes, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::zeroed(count);
    let mut offset = 0;

    while offset < count {
        let n = stream
            .read(&mut buffer[offset..])
            .await
            .map_err(TransferError::Io)?;
        if n == 0 {
            return Err(TransferError::UnexpectedEndOfStream {
                expected: count,
                received: offset,
            });
        }
        offset += n;
    }

    Ok(buffer.freeze())
}

/// Decode the 4-byte big-endian header length and check it against the cap.
///
/// Rejecting here happens before any header bytes are read.
pub fn decode_header_len(prefix: &[u8]) -> Result<usize, TransferError> {
    let mut raw = [0u8; HEADER_LEN_PREFIX];
    raw.copy_from_slice(&prefix[..HEADER_LEN_PREFIX]);
    let len = i32::from_be_bytes(raw);

    match usize::try_from(len) {
        Ok(n) if n <= MAX_HEADER_SIZE => Ok(n),
        _ => Err(TransferError::InvalidHeaderSize(len)),
    }
}
