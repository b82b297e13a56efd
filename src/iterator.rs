//! Forward iterator that recovers intact records from a record stream.
//!
//! The iterator never surfaces per-record corruption: a damaged, truncated,
//! or malformed record is silently skipped and scanning resumes at the next
//! marker. Only exhaustion of `[cursor, stop_at)` ends the sequence. This
//! matches the recovery philosophy of treating any record-level failure as
//! equivalent to a missing record.

use std::fs::File;

use bytes::Bytes;
use memmap2::Mmap;

use crate::codec::{self, MARKER};
use crate::envelope::{self, Generation};
use crate::error::Result;

/// Maximum encoded record size this iterator will attempt to decode.
///
/// Twice the write-side payload bound so that a future writer schema using
/// larger payloads than the current reader expects is still readable, up to
/// this ceiling.
pub const READ_BUF_LEN: usize = 1024;

enum Backing {
    Buf(Bytes),
    Mapped(Mmap),
}

impl Backing {
    fn as_slice(&self) -> &[u8] {
        match self {
            Backing::Buf(b) => b,
            Backing::Mapped(m) => m,
        }
    }
}

/// A forward-only cursor over a record stream backed by a byte buffer or a
/// memory-mapped file.
pub struct RecordIterator {
    backing: Backing,
    /// Offset of the lowest byte that is part of this iterator's addressable
    /// range (always 0 for buffer-backed streams).
    begin: usize,
    /// Exclusive upper bound of the underlying data.
    end: usize,
    /// Current caller-visible upper bound; `next` never returns a record
    /// whose marker/start lies at or past this offset.
    stop_at: usize,
    /// Lowest offset at which a nonzero byte appears; anything before it is
    /// a leading sparse hole or zero padding, never part of a record.
    first_nonzero: usize,
    /// Current read position.
    cursor: usize,
    /// Whether the next call to `next` should treat `cursor` as the start of
    /// a record without requiring a preceding marker.
    first_record: bool,
    /// Set once the iterator has signalled end-of-stream; pins it there.
    exhausted: bool,
}

impl RecordIterator {
    /// Builds an iterator directly over an in-memory buffer.
    #[must_use]
    pub fn from_buf(buf: &[u8]) -> Self {
        let bytes = Bytes::copy_from_slice(buf);
        let end = bytes.len();
        RecordIterator {
            backing: Backing::Buf(bytes),
            begin: 0,
            end,
            stop_at: end,
            first_nonzero: 0,
            cursor: 0,
            first_record: true,
            exhausted: false,
        }
    }

    /// Builds an iterator over a file by `fstat`-ing its size and, if
    /// nonempty, memory-mapping it read-only.
    ///
    /// Skips any leading sparse hole (with [`Self::find_first_data`] when
    /// the `seek_data` feature is enabled, a no-op otherwise) and any
    /// leading zero bytes: no valid record can begin with a zero byte,
    /// since the marker's first byte is `0xFE`.
    pub fn from_fd(file: &File) -> Result<Self> {
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Ok(RecordIterator {
                backing: Backing::Buf(Bytes::new()),
                begin: 0,
                end: 0,
                stop_at: 0,
                first_nonzero: 0,
                cursor: 0,
                first_record: true,
                exhausted: false,
            });
        }

        // SAFETY: the mapping is read-only and this crate never assumes the
        // backing file is not concurrently modified; a torn read simply
        // looks like corruption, which `next` already tolerates.
        let mapped = unsafe { Mmap::map(file)? };

        let first_data = Self::find_first_data(file, len);
        let search_start = first_data.min(len);
        let first_nonzero = find_first_nonzero(&mapped[search_start..len]) + search_start;

        tracing::debug!(len, first_nonzero, "opened record stream from file");

        Ok(RecordIterator {
            backing: Backing::Mapped(mapped),
            begin: 0,
            end: len,
            stop_at: len,
            first_nonzero,
            cursor: first_nonzero,
            first_record: true,
            exhausted: false,
        })
    }

    #[cfg(feature = "seek_data")]
    fn find_first_data(file: &File, len: usize) -> usize {
        use std::os::unix::io::AsRawFd;

        // SEEK_DATA jumps past a leading sparse hole; absence of the
        // feature (or an error, e.g. a filesystem without hole support)
        // falls back to scanning from the start, which `find_first_nonzero`
        // already does correctly, just without the shortcut.
        let offset = unsafe { libc::lseek(file.as_raw_fd(), 0, libc::SEEK_DATA) };
        if offset < 0 {
            0
        } else {
            (offset as usize).min(len)
        }
    }

    #[cfg(not(feature = "seek_data"))]
    fn find_first_data(_file: &File, _len: usize) -> usize {
        0
    }

    /// The size of this iterator's full addressable range, in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.end - self.begin
    }

    /// Moves the cursor to `begin + offset`.
    ///
    /// Fails (returning `false`, leaving the iterator unchanged) if `offset`
    /// is before the first possibly-valid byte or past the current
    /// `stop_at`. Landing exactly on `first_nonzero` is treated as the
    /// stream start (no leading marker required); any other offset is
    /// treated as if it is itself a marker position.
    #[must_use]
    pub fn locate_at(&mut self, offset: usize) -> bool {
        if offset < self.first_nonzero - self.begin || offset > self.stop_at - self.begin {
            return false;
        }

        if offset == self.first_nonzero - self.begin {
            self.first_record = true;
            self.cursor = self.first_nonzero;
        } else {
            self.first_record = false;
            self.cursor = self.begin + offset;
        }
        self.exhausted = false;
        true
    }

    /// Clamps the iterator's upper bound to `begin + offset`. A no-op if
    /// `offset` exceeds the underlying size.
    pub fn stop_at(&mut self, offset: usize) {
        if offset > self.end - self.begin {
            return;
        }
        self.stop_at = self.begin + offset;
    }

    /// Returns the next `(generation, payload)` pair, or `None` once the
    /// stream is exhausted.
    ///
    /// Once `None` is returned, every subsequent call also returns `None`.
    pub fn next(&mut self) -> Option<(Generation, Bytes)> {
        if self.exhausted {
            return None;
        }

        while self.cursor < self.stop_at {
            if let Some(record) = self.next_record() {
                return Some(record);
            }
        }

        self.exhausted = true;
        self.cursor = self.end;
        None
    }

    fn next_record(&mut self) -> Option<(Generation, Bytes)> {
        let slice = self.backing.as_slice();

        // `header_pos` is the offset of the marker that introduces this
        // record (or, for the very first record in the stream, the offset
        // at which it begins without any marker at all). It is the position
        // `stop_at` classifies a record by.
        let (header_pos, encoded_start) = if self.first_record {
            self.first_record = false;
            (self.cursor, self.cursor)
        } else {
            let relative = codec::find_marker(&slice[self.cursor..self.end]);
            let marker_pos = self.cursor + relative;
            if marker_pos >= self.stop_at {
                self.cursor = self.end;
                return None;
            }
            (marker_pos, marker_pos + MARKER.len())
        };

        if header_pos >= self.stop_at {
            self.cursor = self.end;
            return None;
        }

        let next_relative = codec::find_marker(&slice[encoded_start..self.end]);
        let encoded_end = encoded_start + next_relative;
        self.cursor = encoded_end;

        let encoded_len = encoded_end - encoded_start;
        if encoded_len > READ_BUF_LEN {
            tracing::warn!(encoded_len, "record stream: oversized candidate, skipping");
            return None;
        }

        let decoded = codec::decode(&slice[encoded_start..encoded_end])?;
        if decoded.len() < envelope::HEADER_LEN {
            tracing::warn!("record stream: truncated header, skipping");
            return None;
        }

        let decoded = Bytes::from(decoded);
        match envelope::verify(&decoded) {
            Some(record) => Some(record),
            None => {
                tracing::warn!("record stream: CRC mismatch, skipping corrupted record");
                None
            }
        }
    }
}

/// Returns the offset of the first nonzero byte in `buf`, or `buf.len()` if
/// it is all zeros.
fn find_first_nonzero(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b != 0).unwrap_or(buf.len())
}
