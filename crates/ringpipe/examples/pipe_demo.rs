//! Streams a payload from a producer thread to the main thread.
//!
//! Run with `RUST_LOG=trace` to watch the park-slot traffic while the
//! producer outruns the consumer.

use std::io::Read;
use std::thread;
use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (mut writer, mut reader) = ringpipe::pipe(ringpipe::DEFAULT_CAPACITY);

    let start = Instant::now();
    let producer = thread::spawn(move || {
        let chunk = [0x42u8; 1024];
        for produced in 1..=256 {
            writer.write_all(&chunk).expect("reader hung up");
            if produced % 64 == 0 {
                info!(chunks = produced, "produced");
            }
        }
        // Dropping the writer closes the pipe and releases the reader.
    });

    let mut sink = Vec::new();
    reader
        .read_to_end(&mut sink)
        .expect("pipe reads cannot fail");
    producer.join().expect("producer panicked");

    info!(bytes = sink.len(), elapsed = ?start.elapsed(), "drained");
}
