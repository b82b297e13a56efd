//! The fixed header wrapped around every record payload.
//!
//! # Envelope layout
//!
//! ```text
//! [crc:u32][generation:u32][payload:bytes]
//!     4B          4B           variable
//! ```
//!
//! `crc` is CRC32C (Castagnoli) over the whole envelope with the `crc`
//! field itself held at `0xFFFF_FFFF` during the computation, then
//! overwritten with the result. The all-ones initializer defeats CRC32C's
//! zero-prefix weakness: a record preceded by a run of zero bytes (a sparse
//! hole, or a partially zero-filled region left by a short write) must not
//! accidentally checksum. Integers are serialized in host byte order; this
//! on-disk format is not intended to be portable across endianness.

use bytes::{Bytes, BytesMut};

/// Size of the fixed `{crc, generation}` header, in bytes.
pub const HEADER_LEN: usize = 8;

/// Maximum payload size this crate will append.
///
/// Read-side decoding tolerates more (see [`crate::iterator::READ_BUF_LEN`])
/// so that a future writer schema can grow without breaking older readers.
pub const MAX_PAYLOAD_LEN: usize = 512;

/// An application-supplied tag echoed verbatim on read. Not interpreted by
/// this crate.
pub type Generation = u32;

/// Computes the envelope CRC32C with the header's `crc` field pinned to
/// `0xFFFF_FFFF`, matching both `pack` and `verify`.
fn envelope_crc32c(generation: Generation, payload: &[u8]) -> u32 {
    let mut crc = crc32c::crc32c(&u32::MAX.to_ne_bytes());
    crc = crc32c::crc32c_append(crc, &generation.to_ne_bytes());
    crc32c::crc32c_append(crc, payload)
}

/// Packs `generation` and `payload` into a `{crc, generation, payload}`
/// envelope, appending the bytes to `dst`.
///
/// # Panics
///
/// Panics if `payload.len() > MAX_PAYLOAD_LEN`; callers are expected to have
/// already rejected oversized payloads (see
/// [`crate::appender::Appender::append_payload`]).
pub fn pack_into(dst: &mut BytesMut, generation: Generation, payload: &[u8]) {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "envelope payload of {} bytes exceeds MAX_PAYLOAD_LEN",
        payload.len()
    );

    let crc = envelope_crc32c(generation, payload);
    dst.reserve(HEADER_LEN + payload.len());
    dst.extend_from_slice(&crc.to_ne_bytes());
    dst.extend_from_slice(&generation.to_ne_bytes());
    dst.extend_from_slice(payload);
}

/// Convenience wrapper around [`pack_into`] that allocates a fresh buffer.
#[must_use]
pub fn pack(generation: Generation, payload: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    pack_into(&mut dst, generation, payload);
    dst.freeze()
}

/// Parses and checksums a decoded envelope, returning `(generation,
/// payload)` on success.
///
/// Fails if `bytes.len() < HEADER_LEN` or the stored CRC does not match the
/// recomputed one. `payload` borrows from `bytes` (via [`Bytes::slice`]) so
/// a successful verify does not copy the payload again.
#[must_use]
pub fn verify(bytes: &Bytes) -> Option<(Generation, Bytes)> {
    if bytes.len() < HEADER_LEN {
        return None;
    }

    let stored_crc = u32::from_ne_bytes(bytes[0..4].try_into().expect("4-byte slice"));
    let generation = u32::from_ne_bytes(bytes[4..8].try_into().expect("4-byte slice"));
    let payload = bytes.slice(HEADER_LEN..);

    let computed_crc = envelope_crc32c(generation, &payload);
    if stored_crc != computed_crc {
        return None;
    }

    Some((generation, payload))
}
