//! Structured-message adapter over the raw bytes-in/bytes-out record stream.
//!
//! This is a thin convenience layer: pack a `serde`-serializable value with
//! `postcard`, then hand the bytes to [`crate::appender::Appender`]; on
//! read, pull the next record and try to deserialize it. A record that
//! decodes and checksums but fails to deserialize (a stale schema, for
//! instance) is skipped exactly like a corrupted one — it is semantically
//! stale, not structurally invalid, but the effect on the caller is the
//! same: keep scanning.

use std::fs::File;

use serde::{Serialize, de::DeserializeOwned};

use crate::appender::Appender;
use crate::envelope::Generation;
use crate::error::{Result, StreamError};
use crate::iterator::RecordIterator;

/// Serializes `message` with `postcard` and appends it as a record.
pub fn append_message<T: Serialize>(file: &File, generation: Generation, message: &T) -> Result<()> {
    let bytes = postcard::to_allocvec(message).map_err(StreamError::Serialize)?;
    Appender::append_payload(file, generation, &bytes)
}

/// Pulls records from `it` until one deserializes as `T`, returning
/// `(generation, message)`, or `None` once the stream is exhausted.
///
/// Records whose payload bytes fail to deserialize as `T` are skipped; this
/// never returns an error for that reason, matching the adapter's "bytes
/// that don't parse are as good as missing" contract.
pub fn next_message<T: DeserializeOwned>(it: &mut RecordIterator) -> Option<(Generation, T)> {
    loop {
        let (generation, payload) = it.next()?;
        if let Ok(message) = postcard::from_bytes(&payload) {
            return Some((generation, message));
        }
        tracing::warn!(generation, "record stream: message failed to deserialize, skipping");
    }
}
