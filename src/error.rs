//! Error types for the record stream.

use thiserror::Error;

/// Errors surfaced by the appender and by iterator construction.
///
/// Per-record corruption is never reported through this type: a damaged or
/// undecodable record is treated as a missing record by [`crate::iterator::RecordIterator`].
/// `StreamError` is reserved for failures that prevent an operation from
/// being attempted at all.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Underlying OS I/O error (open, fstat, mmap, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `append_payload` was asked to write more than
    /// [`crate::envelope::MAX_PAYLOAD_LEN`] bytes of payload.
    #[error("payload of {len} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { len: usize, max: usize },

    /// A write to the append-mode file made no progress across every retry
    /// attempt.
    #[error("record stream write never made progress after {attempts} attempts")]
    WriteStalled { attempts: u32 },

    /// The structured-message adapter failed to serialize a message before
    /// handing its bytes to the appender.
    #[cfg(feature = "message")]
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] postcard::Error),
}

/// Result alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, StreamError>;
