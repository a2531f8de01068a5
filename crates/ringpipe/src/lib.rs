//! A bounded, in-memory, single-producer single-consumer byte pipe.
//!
//! The pipe connects one writer endpoint to one reader endpoint inside the
//! same process through a fixed-capacity ring buffer, giving the two tasks
//! operating-system-pipe semantics (backpressure, ordered delivery, EOF on
//! close) without a kernel round trip and without ever holding a lock
//! while a task is suspended.
//!
//! # Design
//!
//! - **Lock-free ring.** Two monotonic 64-bit cursors, each owned by one
//!   side and published with release/acquire ordering, address a
//!   power-of-two buffer by bitmask. Occupancy is always the cursor
//!   difference, so full and empty are never ambiguous.
//! - **One parked task, ever.** Blocking and wake-up run through a single
//!   atomic park slot. A side that needs to wait registers itself with a
//!   compare-and-swap; a side that finds its peer already registered does
//!   not park at all, because a parked peer has by definition finished all
//!   the work the current side was waiting on. It is woken and the current
//!   side retries. Close is a terminal swap that wakes whoever is parked.
//! - **Blocking, async, or mixed.** Wake handles are [`std::task::Waker`]s
//!   throughout: blocking endpoints park their thread behind an unparker
//!   waker, async endpoints register the task waker, and the two kinds can
//!   be paired freely.
//!
//! # Example
//!
//! ```
//! use std::io::Read;
//!
//! let (mut writer, mut reader) = ringpipe::pipe(64);
//!
//! let producer = std::thread::spawn(move || {
//!     writer.write_all(b"through the pipe").unwrap();
//!     // Dropping the writer closes the pipe and unblocks the reader.
//! });
//!
//! let mut received = Vec::new();
//! reader.read_to_end(&mut received).unwrap();
//! producer.join().unwrap();
//!
//! assert_eq!(received, b"through the pipe");
//! ```

mod asynk;
mod park;
mod pipe;
mod ring;
mod utils;

use std::sync::Arc;

pub use asynk::{AsyncPipeReader, AsyncPipeWriter};
pub use pipe::{PipeReader, PipeWriter};

use pipe::Inner;

/// Capacity used when callers have no particular size in mind.
pub const DEFAULT_CAPACITY: usize = 8192;

/// Error returned by writer operations once the pipe has been closed.
///
/// Readers never see this error: for them, closure surfaces as end of
/// stream after the remaining bytes have been drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("pipe closed")]
pub struct PipeClosed;

impl From<PipeClosed> for std::io::Error {
    fn from(err: PipeClosed) -> Self {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, err)
    }
}

/// Creates a pipe with blocking endpoints on both ends.
///
/// `capacity` is rounded up to the next power of two.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let inner = Arc::new(Inner::new(capacity));
    (PipeWriter::new(inner.clone()), PipeReader::new(inner))
}

/// Creates a pipe with asynchronous endpoints on both ends.
///
/// `capacity` is rounded up to the next power of two.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn async_pipe(capacity: usize) -> (AsyncPipeWriter, AsyncPipeReader) {
    let inner = Arc::new(Inner::new(capacity));
    (AsyncPipeWriter::new(inner.clone()), AsyncPipeReader::new(inner))
}

/// Creates a pipe with a blocking writer and an asynchronous reader.
///
/// `capacity` is rounded up to the next power of two.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn blocking_async_pipe(capacity: usize) -> (PipeWriter, AsyncPipeReader) {
    let inner = Arc::new(Inner::new(capacity));
    (PipeWriter::new(inner.clone()), AsyncPipeReader::new(inner))
}

/// Creates a pipe with an asynchronous writer and a blocking reader.
///
/// `capacity` is rounded up to the next power of two.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn async_blocking_pipe(capacity: usize) -> (AsyncPipeWriter, PipeReader) {
    let inner = Arc::new(Inner::new(capacity));
    (AsyncPipeWriter::new(inner.clone()), PipeReader::new(inner))
}
