//! Shared pipe state and the blocking endpoint pair.

use std::io;
use std::sync::Arc;
use std::task::{Wake, Waker};

use crate::PipeClosed;
use crate::park::{ParkSlot, Side, Wait};
use crate::ring::RingBuffer;

/// State shared by the two endpoints, dropped when the last one goes away.
pub(crate) struct Inner {
    pub(crate) ring: RingBuffer,
    pub(crate) slot: ParkSlot,
}

impl Inner {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            slot: ParkSlot::new(),
        }
    }
}

/// A waker that unparks the thread that created it.
///
/// Bridges the blocking endpoints into the waker-based park protocol, so a
/// blocking side can be woken by an asynchronous peer and vice versa.
struct ThreadUnparker {
    thread: std::thread::Thread,
}

impl Wake for ThreadUnparker {
    fn wake(self: Arc<Self>) {
        self.thread.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.thread.unpark();
    }
}

fn current_thread_waker() -> Waker {
    Waker::from(Arc::new(ThreadUnparker {
        thread: std::thread::current(),
    }))
}

// ══════════════════════════════════════════════════════════════════════════════
// Writer
// ══════════════════════════════════════════════════════════════════════════════

/// Blocking write half of a pipe.
///
/// Bytes are delivered to the reader in submission order. Writes block
/// while the pipe is full and fail with [`PipeClosed`] once either end has
/// been closed. Dropping the writer closes the pipe.
pub struct PipeWriter {
    inner: Arc<Inner>,
}

impl PipeWriter {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Effective capacity: the requested capacity rounded up to the next
    /// power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.ring.capacity()
    }

    /// Returns `true` once either end has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.slot.is_closed()
    }

    /// Writes a single byte, blocking while the pipe is full.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), PipeClosed> {
        self.write_all(&[byte])
    }

    /// Writes the whole of `src`, blocking while the pipe is full.
    ///
    /// Either every byte is enqueued or the pipe was closed with bytes
    /// still pending; there are no partial writes. An empty `src` returns
    /// immediately without touching the pipe.
    pub fn write_all(&mut self, src: &[u8]) -> Result<(), PipeClosed> {
        if src.is_empty() {
            return Ok(());
        }
        if self.inner.slot.is_closed() {
            return Err(PipeClosed);
        }

        let mut offset = 0;
        // Built lazily: most writes never block.
        let mut unparker = None;
        loop {
            // SAFETY: this endpoint is the single producer.
            offset += unsafe { self.inner.ring.try_write(&src[offset..]) };
            if offset == src.len() {
                return Ok(());
            }

            let waker = unparker.get_or_insert_with(current_thread_waker);
            if self.inner.slot.wait(Side::Writer, waker) == Wait::Closed {
                return Err(PipeClosed);
            }
        }
    }

    /// Closes the pipe, waking a parked reader. Idempotent.
    ///
    /// Bytes already enqueued stay readable; the reader sees them before
    /// end of stream.
    pub fn close(&mut self) {
        self.inner.slot.close();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.inner.slot.close();
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        PipeWriter::write_all(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Reader
// ══════════════════════════════════════════════════════════════════════════════

/// Blocking read half of a pipe.
///
/// Reads return as soon as at least one byte is available and block only
/// while the pipe is empty and open. Once the pipe is closed and drained,
/// reads return zero. Dropping the reader closes the pipe.
pub struct PipeReader {
    inner: Arc<Inner>,
}

impl PipeReader {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Effective capacity: the requested capacity rounded up to the next
    /// power of two.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.ring.capacity()
    }

    /// Returns `true` once either end has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.slot.is_closed()
    }

    /// Lower bound on the bytes readable right now without blocking.
    #[inline]
    pub fn available(&self) -> usize {
        self.inner.ring.available()
    }

    /// Reads into `dst`, blocking only while the pipe is empty and open.
    ///
    /// Returns the number of bytes copied: at least one once data arrives,
    /// and zero either at end of stream (the pipe is closed and fully
    /// drained) or when `dst` is empty.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        if dst.is_empty() {
            return 0;
        }

        let mut unparker = None;
        loop {
            // SAFETY: this endpoint is the single consumer.
            let n = unsafe { self.inner.ring.try_read(dst) };
            if n > 0 {
                return n;
            }

            let waker = unparker.get_or_insert_with(current_thread_waker);
            if self.inner.slot.wait(Side::Reader, waker) == Wait::Closed {
                // Bytes committed before the close drain before end of
                // stream is signalled.
                if self.inner.ring.available() > 0 {
                    continue;
                }
                return 0;
            }
        }
    }

    /// Reads one byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        if self.read(&mut byte) == 0 {
            None
        } else {
            Some(byte[0])
        }
    }

    /// Discards up to `n` bytes, blocking only while the pipe is empty and
    /// open, and returns how many were discarded (zero at end of stream).
    pub fn skip(&mut self, n: u64) -> u64 {
        if n == 0 {
            return 0;
        }

        let mut unparker = None;
        loop {
            // SAFETY: this endpoint is the single consumer.
            let skipped = unsafe { self.inner.ring.try_skip(n) };
            if skipped > 0 {
                return skipped;
            }

            let waker = unparker.get_or_insert_with(current_thread_waker);
            if self.inner.slot.wait(Side::Reader, waker) == Wait::Closed {
                if self.inner.ring.available() > 0 {
                    continue;
                }
                return 0;
            }
        }
    }

    /// Closes the pipe, waking a parked writer. Idempotent.
    pub fn close(&mut self) {
        self.inner.slot.close();
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        self.inner.slot.close();
    }
}

impl io::Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(PipeReader::read(self, buf))
    }
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::pipe;
    use std::thread;

    #[test]
    fn burst_then_close() {
        let (mut writer, mut reader) = pipe(16);
        writer.write_all(&[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        writer.close();

        let mut out = [0u8; 16];
        assert_eq!(reader.read(&mut out), 8);
        assert_eq!(&out[..8], &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(reader.read(&mut out), 0);
    }

    #[test]
    fn write_after_close_fails() {
        let (mut writer, reader) = pipe(16);
        drop(reader);

        assert_eq!(writer.write_all(&[1]), Err(crate::PipeClosed));
        assert!(writer.is_closed());
    }

    #[test]
    fn empty_write_succeeds_even_when_closed() {
        let (mut writer, reader) = pipe(16);
        drop(reader);

        assert_eq!(writer.write_all(&[]), Ok(()));
    }

    #[test]
    fn blocking_stress() {
        const COUNT: usize = 100_000;
        let (mut writer, mut reader) = pipe(64);

        let producer = thread::spawn(move || {
            let bytes: Vec<u8> = (0..COUNT).map(|i| i as u8).collect();
            writer.write_all(&bytes).unwrap();
        });

        let mut received = Vec::with_capacity(COUNT);
        let mut chunk = [0u8; 48];
        loop {
            let n = reader.read(&mut chunk);
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);
        }

        producer.join().unwrap();
        assert_eq!(received.len(), COUNT);
        for (i, byte) in received.iter().enumerate() {
            assert_eq!(*byte, i as u8);
        }
    }
}
