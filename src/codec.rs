//! Byte-stuffing codec that removes a 2-byte marker from arbitrary data.
//!
//! This is a variant of consistent overhead byte stuffing (COBS) that
//! forbids a 2-byte sequence instead of a single byte. The sequence does not
//! have to be aligned, which matters because short writes on POSIX can fail
//! at byte granularity: an append that loses its last byte must not be able
//! to desynchronize a reader scanning for the marker.
//!
//! We pick `0xFE 0xFD` because it does not occur inside small signed or
//! unsigned integers of any width or endianness, inside varints, or inside
//! floats/doubles with exponents near small integers — common payload
//! shapes that would otherwise shorten the runs between markers. Run
//! lengths are encoded in base 253 (`RADIX`) so that no run-length field can
//! itself contain the marker's first byte followed by its second.
//!
//! The first run of a record is length-prefixed with one byte (max 252
//! literal bytes); every later run uses a 2-byte little-endian base-253
//! length (max 64008 literal bytes). Both encoder and decoder behave as if
//! the input ends with a virtual marker, which removes the special case of
//! a message whose natural encoding would end in an ambiguous short run.

use bytes::{Bytes, BytesMut};

/// The 2-byte sequence that never appears in an encoded stream.
pub const MARKER: [u8; 2] = [0xFE, 0xFD];

/// Base used for run-length digits. Chosen so that no digit can contain
/// either byte of [`MARKER`].
const RADIX: usize = 0xFD;

/// Maximum literal run length encodable in the first, 1-byte run header.
pub const MAX_INITIAL_RUN: usize = RADIX - 1;

/// Maximum literal run length encodable in a 2-byte run header.
pub const MAX_REMAINING_RUN: usize = RADIX * RADIX - 1;

/// Inputs larger than this are rejected by [`stuffed_bound`] with the
/// overflow sentinel rather than risk overflowing the bound computation.
const MAX_INPUT_LEN: usize = usize::MAX / 4;

/// Returns the index of the first occurrence of [`MARKER`] in `buf`, or
/// `buf.len()` if it does not occur.
#[must_use]
pub fn find_marker(buf: &[u8]) -> usize {
    if buf.len() < MARKER.len() {
        return buf.len();
    }

    // `windows` keeps this a simple byte-by-byte scan; platforms that want
    // the aligned-u16-read trick from the original C implementation can
    // specialize this function without changing its contract.
    buf.windows(MARKER.len())
        .position(|w| w == MARKER)
        .unwrap_or(buf.len())
}

/// Returns the worst-case encoded length for a payload of `in_size` bytes,
/// adding the marker's length when `with_header` is set.
///
/// Returns `usize::MAX` as an overflow sentinel when `in_size` exceeds an
/// internal cap, mirroring the original's `SIZE_MAX` return for absurdly
/// large inputs.
#[must_use]
pub fn stuffed_bound(in_size: usize, with_header: bool) -> usize {
    if in_size > MAX_INPUT_LEN {
        return usize::MAX;
    }

    let mut bound = in_size + if with_header { MARKER.len() + 1 } else { 1 };
    if in_size < MAX_INITIAL_RUN {
        return bound;
    }

    let remaining = in_size - MAX_INITIAL_RUN;
    bound += 2 * (1 + remaining / MAX_REMAINING_RUN);
    bound
}

/// A safe, compile-time-computable over-approximation of [`stuffed_bound`].
///
/// Unlike `stuffed_bound`, this never looks at the exact position of a
/// marker and so always overestimates by up to one spare run header; it is
/// meant for sizing stack or pre-allocated buffers, not for tight bounds
/// checks.
#[must_use]
pub const fn stuffed_bound_const(in_size: usize) -> usize {
    MARKER.len() + in_size + MARKER.len() * (2 + in_size / (RADIX * RADIX - 1))
}

/// Encodes `src` into `dst`, appending the bytes so that the marker never
/// appears in the appended range.
///
/// `decode` is the exact inverse: `decode(encode(src)) == src` for every
/// `src`, including inputs that themselves contain the marker.
pub fn encode_into(dst: &mut BytesMut, src: &[u8]) {
    dst.reserve(stuffed_bound(src.len(), false));

    let mut first = true;
    let mut rest = src;
    loop {
        let max_run = if first { MAX_INITIAL_RUN } else { MAX_REMAINING_RUN };
        let window = &rest[..max_run.min(rest.len())];
        let run_len = find_marker(window);

        if first {
            dst.extend_from_slice(&[run_len as u8]);
            first = false;
        } else {
            encode_run_len(dst, run_len);
        }
        dst.extend_from_slice(&rest[..run_len]);
        rest = &rest[run_len..];

        if run_len < max_run {
            // A run shorter than the maximum is implicitly followed by a
            // marker: either the one we just found in `rest`, or the
            // virtual one past the end of input.
            if rest.is_empty() {
                break;
            }
            debug_assert!(
                rest.len() >= MARKER.len() && rest[..MARKER.len()] == MARKER,
                "a short run must stop exactly at a marker occurrence"
            );
            rest = &rest[MARKER.len()..];
        }
    }
}

/// Convenience wrapper around [`encode_into`] that allocates a fresh buffer.
#[must_use]
pub fn encode(src: &[u8]) -> Bytes {
    let mut dst = BytesMut::new();
    encode_into(&mut dst, src);
    dst.freeze()
}

/// Writes a 2-byte little-endian base-[`RADIX`] run length.
fn encode_run_len(dst: &mut BytesMut, len: usize) {
    debug_assert!(len <= MAX_REMAINING_RUN);
    dst.extend_from_slice(&[(len % RADIX) as u8, (len / RADIX) as u8]);
}

/// Reads a 2-byte little-endian base-[`RADIX`] run length.
fn decode_run_len(bytes: [u8; 2]) -> usize {
    bytes[0] as usize + RADIX * bytes[1] as usize
}

/// Decodes a byte-stuffed buffer produced by [`encode`]/[`encode_into`].
///
/// Returns `None` on any malformed input: a truncated run header, a run
/// length exceeding the current maximum or the remaining input, or a
/// missing marker where one was required. Never reads past `enc.len()` and
/// never produces more than `enc.len() - 1` bytes of output.
#[must_use]
pub fn decode(enc: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(enc.len().saturating_sub(1));
    let mut first = true;
    let mut rest = enc;

    loop {
        let max_run = if first { MAX_INITIAL_RUN } else { MAX_REMAINING_RUN };

        let run_len = if first {
            let len = *rest.first()? as usize;
            rest = &rest[1..];
            first = false;
            len
        } else {
            if rest.len() < 2 {
                return None;
            }
            let len = decode_run_len([rest[0], rest[1]]);
            rest = &rest[2..];
            len
        };

        if run_len > max_run || run_len > rest.len() {
            return None;
        }

        out.extend_from_slice(&rest[..run_len]);
        rest = &rest[run_len..];

        if run_len < max_run {
            if rest.is_empty() {
                // The virtual terminating marker: stop without emitting it.
                break;
            }
            if rest.len() < MARKER.len() {
                return None;
            }
            out.extend_from_slice(&MARKER);
        }
    }

    Some(out)
}
