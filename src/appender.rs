//! Appends encoded, CRC-protected envelopes to an append-mode file.
//!
//! Every write is immediately followed by a trailing marker (see
//! [`crate::codec::MARKER`]): the beginning and end of a record stream act
//! as implicit markers, and writing the next one's header eagerly —
//! instead of waiting for the start of the next call — improves crash
//! recovery, since corruption in practice mostly truncates the tail of the
//! file rather than mangling its middle.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;

use bytes::BytesMut;

use crate::codec::{self, MARKER};
use crate::envelope::{self, Generation, MAX_PAYLOAD_LEN};
use crate::error::{Result, StreamError};

/// Number of attempts `append_payload` makes before giving up.
const NUM_TRIES: u32 = 3;

/// Appends records to a file opened in append mode.
///
/// `Appender` does not own the file descriptor: callers open it (typically
/// with `OpenOptions::new().append(true).create(true)`) and are responsible
/// for closing it. This mirrors the borrowed-fd ownership model in the
/// design notes: no heap allocation is required beyond the encode buffer,
/// and all buffers here are bounded by a few KiB.
pub struct Appender;

impl Appender {
    /// Ensures `file` ends with the marker, appending one if it does not
    /// already. Safe to call on an empty file or any number of times in a
    /// row: a file that already ends with the marker is left untouched.
    pub fn append_initial(file: &File) -> Result<()> {
        if Self::fd_ends_with_marker(file)? {
            return Ok(());
        }
        Self::append_to_fd(file, &MARKER)
    }

    /// Packs `(generation, payload)` into an envelope, encodes it, and
    /// appends the result plus a trailing marker to `file`.
    ///
    /// Returns [`StreamError::PayloadTooLarge`] without writing anything if
    /// `payload` exceeds [`MAX_PAYLOAD_LEN`].
    pub fn append_payload(file: &File, generation: Generation, payload: &[u8]) -> Result<()> {
        let encoded = Self::encode_record(generation, payload)?;
        Self::append_to_fd(file, &encoded)
    }

    /// Packs and encodes a record exactly as [`Self::append_payload`] does,
    /// but writes it through any [`Write`] implementor instead of an
    /// append-mode file descriptor.
    ///
    /// There is no retry and no short-write compensation: this is meant for
    /// private, temporary streams (a scratch file, an in-memory buffer)
    /// where a partial write means the whole stream is discarded, not for
    /// the durable append-mode log [`Self::append_payload`] targets.
    pub fn write_payload<W: Write>(
        mut writer: W,
        generation: Generation,
        payload: &[u8],
    ) -> Result<()> {
        let encoded = Self::encode_record(generation, payload)?;
        writer.write_all(&encoded)?;
        Ok(())
    }

    /// Writes a bare marker through any [`Write`] implementor, for callers
    /// establishing an empty stream without an append-mode fd.
    pub fn write_initial<W: Write>(mut writer: W) -> Result<()> {
        writer.write_all(&MARKER)?;
        Ok(())
    }

    /// Packs `(generation, payload)` into an envelope, encodes it, and
    /// appends a trailing marker, producing the exact bytes
    /// [`Self::append_payload`] and [`Self::write_payload`] both write.
    fn encode_record(generation: Generation, payload: &[u8]) -> Result<BytesMut> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(StreamError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut raw = BytesMut::with_capacity(envelope::HEADER_LEN + payload.len());
        envelope::pack_into(&mut raw, generation, payload);

        let mut encoded = BytesMut::new();
        codec::encode_into(&mut encoded, &raw);
        encoded.extend_from_slice(&MARKER);
        Ok(encoded)
    }

    fn fd_ends_with_marker(file: &File) -> Result<bool> {
        let len = file.metadata()?.len();
        if len < MARKER.len() as u64 {
            return Ok(false);
        }

        let mut buf = [0u8; MARKER.len()];
        match file.read_exact_at(&mut buf, len - MARKER.len() as u64) {
            Ok(()) => Ok(buf == MARKER),
            Err(_) => Ok(false),
        }
    }

    /// Writes `buf` to `file`, retrying up to [`NUM_TRIES`] times on short
    /// writes.
    ///
    /// The first attempt writes `buf` as given, on the assumption that the
    /// previous call left a trailing marker in place. If any attempt is
    /// short, every subsequent attempt prepends a fresh marker: the
    /// previously written trailing marker can no longer be assumed present
    /// at the new end-of-file, since the short write (or a concurrent
    /// writer) may have invalidated that assumption. On terminal failure
    /// after at least one short write, a best-effort write of just the
    /// marker is attempted to reduce damage to the next record.
    fn append_to_fd(mut file: &File, buf: &[u8]) -> Result<()> {
        let mut prepend_marker = false;
        let mut last_err = None;

        for _ in 0..NUM_TRIES {
            let mut attempt = BytesMut::with_capacity(MARKER.len() + buf.len());
            if prepend_marker {
                attempt.extend_from_slice(&MARKER);
            }
            attempt.extend_from_slice(buf);

            match file.write(&attempt) {
                Ok(written) if written == attempt.len() => return Ok(()),
                Ok(0) => {
                    // No progress; just retry.
                }
                Ok(_) => {
                    prepend_marker = true;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "short or interrupted record stream write");
                    last_err = Some(err);
                }
            }
        }

        if prepend_marker {
            // Best-effort: a failure here is not reported, same as a
            // terminal storage failure would leave the writer with nothing
            // more it can do.
            let _ = file.write(&MARKER);
        }

        Err(match last_err {
            Some(err) => StreamError::Io(err),
            None => StreamError::WriteStalled { attempts: NUM_TRIES },
        })
    }
}
