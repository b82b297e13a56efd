//! Concrete end-to-end scenarios for the record stream: each mirrors a
//! specific corruption or boundary condition the format is meant to
//! survive.

use std::io::{Seek, SeekFrom, Write as _};

use bytes::Bytes;
use durable_record_stream::{Appender, RecordIterator};
use tempfile::tempfile;
use test_case::test_case;

#[test]
fn trivial_empty_file_yields_nothing() {
    let file = tempfile().unwrap();
    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert_eq!(it.size(), 0);
    assert!(it.next().is_none());
}

#[test]
fn single_short_record() {
    let file = tempfile().unwrap();
    Appender::append_payload(&file, 7, b"hello").unwrap();

    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert_eq!(it.next(), Some((7, Bytes::from_static(b"hello"))));
    assert!(it.next().is_none());
}

#[test]
fn adversarial_payload_with_embedded_markers() {
    let file = tempfile().unwrap();
    let payload = [0xFE, 0xFD, 0xFE, 0xFD, 0xFE, 0xFD];
    Appender::append_payload(&file, 1, &payload).unwrap();

    let mut it = RecordIterator::from_fd(&file).unwrap();
    let (generation, got) = it.next().expect("adversarial payload decodes");
    assert_eq!(generation, 1);
    assert_eq!(&got[..], &payload[..]);
    assert!(it.next().is_none());
}

#[test]
fn skip_a_corrupt_middle_record() {
    let file = tempfile().unwrap();
    Appender::append_payload(&file, 1, b"a").unwrap();
    let middle_start = file.metadata().unwrap().len();
    Appender::append_payload(&file, 2, b"b").unwrap();
    let middle_end = file.metadata().unwrap().len();
    Appender::append_payload(&file, 3, b"c").unwrap();

    let flip_at = middle_start + (middle_end - middle_start) / 2;
    let mut patch = [0u8; 1];
    {
        use std::os::unix::fs::FileExt;
        file.read_exact_at(&mut patch, flip_at).unwrap();
        patch[0] ^= 0xFF;
        file.write_all_at(&patch, flip_at).unwrap();
    }

    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert_eq!(it.next(), Some((1, Bytes::from_static(b"a"))));
    assert_eq!(it.next(), Some((3, Bytes::from_static(b"c"))));
    assert!(it.next().is_none());
}

#[test]
fn trailing_garbage_stops_cleanly() {
    let mut file = tempfile().unwrap();
    Appender::append_payload(&file, 5, b"ok").unwrap();
    file.seek(SeekFrom::End(0)).unwrap();
    file.write_all(&[0xABu8; 200]).unwrap();

    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert_eq!(it.next(), Some((5, Bytes::from_static(b"ok"))));
    assert!(it.next().is_none());
}

#[test]
fn sparse_leading_hole_is_skipped() {
    let mut file = tempfile().unwrap();
    file.seek(SeekFrom::Start(4096)).unwrap();
    Appender::append_payload(&file, 9, b"x").unwrap();

    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert_eq!(it.next(), Some((9, Bytes::from_static(b"x"))));
    assert!(it.next().is_none());
}

#[test]
fn maximum_length_payload() {
    let file = tempfile().unwrap();
    let payload = vec![0x5A_u8; durable_record_stream::envelope::MAX_PAYLOAD_LEN];
    Appender::append_payload(&file, 42, &payload).unwrap();

    let mut it = RecordIterator::from_fd(&file).unwrap();
    let (generation, got) = it.next().expect("maximum length payload decodes");
    assert_eq!(generation, 42);
    assert_eq!(&got[..], &payload[..]);
    assert!(it.next().is_none());
}

#[test]
fn append_initial_is_idempotent_across_many_calls() {
    let file = tempfile().unwrap();
    for _ in 0..5 {
        Appender::append_initial(&file).unwrap();
    }
    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert!(it.next().is_none(), "a stream with only an initial marker reads as empty");
}

#[test_case(3; "three records")]
#[test_case(50; "fifty records")]
fn stream_round_trip_preserves_order_and_generations(n: u32) {
    let file = tempfile().unwrap();
    for generation in 0..n {
        let payload = format!("payload-{generation}");
        Appender::append_payload(&file, generation, payload.as_bytes()).unwrap();
    }

    let mut it = RecordIterator::from_fd(&file).unwrap();
    for generation in 0..n {
        let expected_payload = format!("payload-{generation}");
        let (got_generation, got_payload) = it.next().expect("every appended record is read back");
        assert_eq!(got_generation, generation);
        assert_eq!(&got_payload[..], expected_payload.as_bytes());
    }
    assert!(it.next().is_none());
}

#[test]
fn resynchronization_after_truncation_damages_only_the_trailing_record() {
    let file = tempfile().unwrap();
    Appender::append_payload(&file, 1, b"first").unwrap();
    let boundary = file.metadata().unwrap().len();
    Appender::append_payload(&file, 2, b"second").unwrap();

    // Truncate partway through the second record.
    let full_len = file.metadata().unwrap().len();
    let truncate_at = boundary + (full_len - boundary) / 2;
    file.set_len(truncate_at).unwrap();

    let mut it = RecordIterator::from_fd(&file).unwrap();
    assert_eq!(it.next(), Some((1, Bytes::from_static(b"first"))));
    assert!(it.next().is_none());
}

#[test]
fn locate_at_and_stop_at_partition_a_stream_without_overlap() {
    let file = tempfile().unwrap();
    Appender::append_payload(&file, 1, b"a").unwrap();
    let split = file.metadata().unwrap().len() as usize;
    Appender::append_payload(&file, 2, b"b").unwrap();
    Appender::append_payload(&file, 3, b"c").unwrap();

    let mut first_half = RecordIterator::from_fd(&file).unwrap();
    first_half.stop_at(split);
    let mut first_half_records = Vec::new();
    while let Some(record) = first_half.next() {
        first_half_records.push(record);
    }

    let mut second_half = RecordIterator::from_fd(&file).unwrap();
    assert!(second_half.locate_at(split));
    let mut second_half_records = Vec::new();
    while let Some(record) = second_half.next() {
        second_half_records.push(record);
    }

    let mut whole = RecordIterator::from_fd(&file).unwrap();
    let mut whole_records = Vec::new();
    while let Some(record) = whole.next() {
        whole_records.push(record);
    }

    let mut combined = first_half_records;
    combined.extend(second_half_records);
    assert_eq!(combined, whole_records);
}
