//! End-to-end behavior of the blocking endpoint pair.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use ringpipe::{PipeClosed, PipeReader, pipe};

fn drain(reader: &mut PipeReader) -> Vec<u8> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 32];
    loop {
        let n = reader.read(&mut chunk);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    out
}

#[test]
fn small_burst_then_eof() {
    let (mut writer, mut reader) = pipe(16);
    writer.write_all(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
    writer.close();

    assert_eq!(drain(&mut reader), vec![0, 1, 2, 3, 4, 5, 6, 7]);
}

#[test]
fn wraparound_preserves_order() {
    let (mut writer, mut reader) = pipe(8);
    writer.write_all(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(reader.read(&mut buf), 4);
    assert_eq!(&buf, &[0, 1, 2, 3]);

    // This write wraps around the end of the ring.
    writer.write_all(&[8, 9, 10, 11]).unwrap();
    writer.close();

    assert_eq!(drain(&mut reader), vec![4, 5, 6, 7, 8, 9, 10, 11]);
}

#[test]
fn producer_blocks_then_unblocks() {
    let (mut writer, mut reader) = pipe(4);

    let producer = thread::spawn(move || {
        writer.write_all(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
    });

    let mut seen = Vec::new();
    while let Some(byte) = reader.read_byte() {
        seen.push(byte);
    }
    producer.join().unwrap();

    assert_eq!(seen, (0..10).collect::<Vec<u8>>());
}

#[test]
fn reader_blocks_then_unblocks() {
    let (mut writer, mut reader) = pipe(64);

    let consumer = thread::spawn(move || {
        let mut buf = [0u8; 4];
        let first = reader.read(&mut buf);
        let byte = buf[0];
        let second = reader.read(&mut buf);
        (first, byte, second)
    });

    // Give the reader time to park before anything arrives.
    thread::sleep(Duration::from_millis(50));
    writer.write_all(&[42]).unwrap();
    writer.close();

    assert_eq!(consumer.join().unwrap(), (1, 42, 0));
}

#[test]
fn close_then_drain() {
    let (mut writer, mut reader) = pipe(16);
    writer.write_all(&[1, 2, 3]).unwrap();
    drop(writer);

    assert_eq!(drain(&mut reader), vec![1, 2, 3]);
}

#[test]
fn random_write_schedules_are_lossless() {
    const SEEDS: [u64; 4] = [987654321, 42, 7, 123456789];

    for &capacity in &[1usize, 2, 4, 8, 64, 8192] {
        for &seed in &SEEDS {
            let mut rng = StdRng::seed_from_u64(seed ^ capacity as u64);
            let mut pattern = vec![0u8; 2 * capacity.next_power_of_two()];
            rng.fill_bytes(&mut pattern);

            let ops = if capacity > 1024 { 50 } else { 400 };
            let mut chunks = Vec::with_capacity(ops);
            let mut expected = Vec::new();
            for _ in 0..ops {
                let len = rng.gen_range(0..pattern.len());
                let offset = rng.gen_range(0..=pattern.len() - len);
                chunks.push((offset, len));
                expected.extend_from_slice(&pattern[offset..offset + len]);
            }

            let (mut writer, mut reader) = pipe(capacity);
            let pattern = &pattern;
            let chunks = &chunks;
            let received = thread::scope(|scope| {
                scope.spawn(move || {
                    for &(offset, len) in chunks {
                        writer.write_all(&pattern[offset..offset + len]).unwrap();
                    }
                });

                let mut out = Vec::new();
                let mut buf = vec![0u8; capacity.max(16)];
                loop {
                    let n = reader.read(&mut buf);
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
                out
            });

            assert_eq!(received, expected, "capacity {capacity} seed {seed}");
        }
    }
}

#[test]
fn occupancy_never_exceeds_capacity() {
    let (mut writer, mut reader) = pipe(8);
    let capacity = reader.capacity();

    let producer = thread::spawn(move || {
        let bytes: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        writer.write_all(&bytes).unwrap();
    });

    let mut received = 0usize;
    let mut buf = [0u8; 8];
    loop {
        assert!(reader.available() <= capacity);
        let n = reader.read(&mut buf);
        if n == 0 {
            break;
        }
        received += n;
    }
    producer.join().unwrap();
    assert_eq!(received, 5000);
}

#[test]
fn writer_parks_at_capacity() {
    let (mut writer, mut reader) = pipe(8);
    let done = Arc::new(AtomicBool::new(false));
    let done_flag = done.clone();

    let producer = thread::spawn(move || {
        writer.write_all(&[7u8; 100]).unwrap();
        done_flag.store(true, Ordering::SeqCst);
    });

    // The writer fills the pipe and must suspend with exactly `capacity`
    // bytes outstanding.
    while reader.available() < 8 {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(20));
    assert_eq!(reader.available(), 8);
    assert!(!done.load(Ordering::SeqCst));

    let mut received = 0;
    let mut buf = [0u8; 16];
    while received < 100 {
        let n = reader.read(&mut buf);
        assert!(n > 0);
        assert!(buf[..n].iter().all(|&b| b == 7));
        received += n;
    }
    producer.join().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn close_is_idempotent_on_both_ends() {
    let (mut writer, mut reader) = pipe(4);
    writer.close();
    writer.close();
    reader.close();
    reader.close();
    assert!(writer.is_closed());
    assert!(reader.is_closed());
}

#[test]
fn zero_length_requests_never_block() {
    let (mut writer, mut reader) = pipe(4);
    // No counterpart is running; returning at all proves no suspension.
    writer.write_all(&[]).unwrap();
    assert_eq!(reader.read(&mut []), 0);
    assert_eq!(reader.skip(0), 0);
}

#[test]
fn capacity_rounds_up_to_power_of_two() {
    for requested in 1..=64usize {
        let (writer, reader) = pipe(requested);
        let effective = requested.next_power_of_two();
        assert_eq!(writer.capacity(), effective);
        assert_eq!(reader.capacity(), effective);
    }

    // The rounded capacity is real: a pipe built for 5 holds 8 bytes
    // without blocking.
    let (mut writer, _reader) = pipe(5);
    writer.write_all(&[0u8; 8]).unwrap();
}

#[test]
#[should_panic(expected = "capacity must be 1 or greater")]
fn zero_capacity_is_rejected() {
    let _ = pipe(0);
}

#[test]
fn skip_discards_without_copying() {
    let (mut writer, mut reader) = pipe(8);
    writer.write_all(&[1, 2, 3, 4, 5]).unwrap();

    assert_eq!(reader.skip(3), 3);
    let mut buf = [0u8; 8];
    assert_eq!(reader.read(&mut buf), 2);
    assert_eq!(&buf[..2], &[4, 5]);

    writer.close();
    assert_eq!(reader.skip(1), 0);
}

#[test]
fn skip_drains_the_tail_after_close() {
    let (mut writer, reader) = pipe(16);

    let skipper = thread::spawn(move || {
        let mut reader = reader;
        let skipped = reader.skip(10);
        (skipped, reader.skip(1))
    });

    thread::sleep(Duration::from_millis(50));
    writer.write_all(&[9, 9, 9]).unwrap();
    writer.close();

    // The bytes committed before the close are skipped, then end of
    // stream.
    assert_eq!(skipper.join().unwrap(), (3, 0));
}

#[test]
fn write_fails_once_reader_is_gone() {
    let (mut writer, reader) = pipe(4);
    drop(reader);

    assert_eq!(writer.write_all(&[1, 2]), Err(PipeClosed));
}

#[test]
fn io_trait_round_trip() {
    let (mut writer, mut reader) = pipe(32);

    let producer = thread::spawn(move || {
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        write!(writer, " world").unwrap();
    });

    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    producer.join().unwrap();

    assert_eq!(text, "hello world");
}

#[test]
fn io_write_error_is_broken_pipe() {
    let (mut writer, reader) = pipe(4);
    drop(reader);

    let err = Write::write(&mut writer, &[1]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}
