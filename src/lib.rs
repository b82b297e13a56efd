//! A corruption-resilient append-only record stream for small,
//! self-delimiting binary payloads.
//!
//! Records are wrapped in an 8-byte `{crc, generation}` envelope, byte-
//! stuffed so a 2-byte marker never occurs inside the encoded stream, and
//! appended to a file opened in append mode. A forward iterator recovers
//! every intact record from a possibly-damaged file: corrupted or malformed
//! records are silently skipped rather than surfaced as errors, and
//! scanning always resumes at the next marker.
//!
//! This is built for configuration-style logs: writes are rare, payloads
//! are small (at most [`envelope::MAX_PAYLOAD_LEN`] bytes), and durability
//! matters more than throughput. It is not a general-purpose WAL: there is
//! no random access, no in-place update or deletion, and no transactions
//! spanning more than one record.
//!
//! ```no_run
//! use std::fs::OpenOptions;
//! use durable_record_stream::{Appender, RecordIterator};
//!
//! # fn main() -> durable_record_stream::Result<()> {
//! let file = OpenOptions::new().create(true).append(true).read(true).open("events.log")?;
//! Appender::append_initial(&file)?;
//! Appender::append_payload(&file, 1, b"hello")?;
//!
//! let mut it = RecordIterator::from_fd(&file)?;
//! while let Some((generation, payload)) = it.next() {
//!     println!("{generation}: {payload:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod appender;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod iterator;

#[cfg(feature = "message")]
pub mod message;

pub use appender::Appender;
pub use envelope::Generation;
pub use error::{Result, StreamError};
pub use iterator::RecordIterator;

#[cfg(feature = "message")]
pub use message::{append_message, next_message};
