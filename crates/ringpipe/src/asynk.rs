//! Asynchronous endpoint pair.
//!
//! The async endpoints run the same park protocol as the blocking ones,
//! registering the task waker from the current `Context` as the wake
//! handle. Because the handle type is shared, a pipe may pair an async
//! endpoint with a blocking one in either direction.
//!
//! The inherent futures ([`write_all`](AsyncPipeWriter::write_all),
//! [`read`](AsyncPipeReader::read), [`skip`](AsyncPipeReader::skip))
//! withdraw their registration when dropped mid-wait, so cancelling them
//! is equivalent to a spurious wakeup. A registration left behind by a
//! bare `poll_read`/`poll_write` caller is cleared by the endpoint's next
//! operation or by dropping the endpoint.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::io::{AsyncRead, AsyncWrite};

use crate::PipeClosed;
use crate::park::{Arm, Side, Wait};
use crate::pipe::Inner;

// ══════════════════════════════════════════════════════════════════════════════
// Writer
// ══════════════════════════════════════════════════════════════════════════════

/// Asynchronous write half of a pipe.
///
/// Bytes are delivered to the reader in submission order. Writes yield
/// while the pipe is full and fail with [`PipeClosed`] once either end has
/// been closed. Dropping the writer closes the pipe.
pub struct AsyncPipeWriter {
    inner: Arc<Inner>,
    parked: bool,
}

impl AsyncPipeWriter {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            parked: false,
        }
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

    /// Writes the whole of `src`, yielding while the pipe is full.
    ///
    /// Either every byte is enqueued or the pipe was closed with bytes
    /// still pending; there are no partial writes. An empty `src` resolves
    /// immediately without touching the pipe.
    pub async fn write_all(&mut self, src: &[u8]) -> Result<(), PipeClosed> {
        WriteAll {
            writer: self,
            src,
            offset: 0,
        }
        .await
    }

    /// Writes a single byte, yielding while the pipe is full.
    pub async fn write_byte(&mut self, byte: u8) -> Result<(), PipeClosed> {
        self.write_all(&[byte]).await
    }

    /// Closes the pipe, waking a parked reader. Idempotent.
    pub fn close(&mut self) {
        self.inner.slot.close();
    }

    /// Clears a registration carried over from a previous poll. A failed
    /// transition means the pipe closed while this side was suspended.
    fn unpark(&mut self) -> Wait {
        if self.parked {
            self.parked = false;
            self.inner.slot.disarm(Side::Writer)
        } else {
            Wait::Retry
        }
    }

    /// Withdraws an armed registration on cancellation.
    fn cancel(&mut self) {
        if self.parked {
            self.parked = false;
            let _ = self.inner.slot.disarm(Side::Writer);
        }
    }

    /// One attempt to move bytes: the shared skeleton behind `poll_write`
    /// and `write_all`. Never called with an empty `src`.
    fn poll_write_some(
        &mut self,
        cx: &mut Context<'_>,
        src: &[u8],
    ) -> Poll<Result<usize, PipeClosed>> {
        if self.unpark() == Wait::Closed || self.inner.slot.is_closed() {
            return Poll::Ready(Err(PipeClosed));
        }

        loop {
            // SAFETY: this endpoint is the single producer.
            let n = unsafe { self.inner.ring.try_write(src) };
            if n > 0 {
                return Poll::Ready(Ok(n));
            }

            match self.inner.slot.arm(Side::Writer, cx.waker()) {
                Arm::Parked => {
                    self.parked = true;
                    return Poll::Pending;
                }
                Arm::Retry => {}
                Arm::Closed => return Poll::Ready(Err(PipeClosed)),
            }
        }
    }
}

impl Drop for AsyncPipeWriter {
    fn drop(&mut self) {
        self.inner.slot.close();
    }
}

impl AsyncWrite for AsyncPipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        match self.get_mut().poll_write_some(cx, buf) {
            Poll::Ready(Ok(n)) => Poll::Ready(Ok(n)),
            Poll::Ready(Err(err)) => Poll::Ready(Err(err.into())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().close();
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for AsyncPipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPipeWriter")
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Future returned by [`AsyncPipeWriter::write_all`].
struct WriteAll<'w, 'b> {
    writer: &'w mut AsyncPipeWriter,
    src: &'b [u8],
    offset: usize,
}

impl Future for WriteAll<'_, '_> {
    type Output = Result<(), PipeClosed>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        while this.offset < this.src.len() {
            match this.writer.poll_write_some(cx, &this.src[this.offset..]) {
                Poll::Ready(Ok(n)) => this.offset += n,
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl Drop for WriteAll<'_, '_> {
    fn drop(&mut self) {
        self.writer.cancel();
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Reader
// ══════════════════════════════════════════════════════════════════════════════

/// Asynchronous read half of a pipe.
///
/// Reads resolve as soon as at least one byte is available and yield only
/// while the pipe is empty and open. Once the pipe is closed and drained,
/// reads resolve to zero. Dropping the reader closes the pipe.
pub struct AsyncPipeReader {
    inner: Arc<Inner>,
    parked: bool,
}

impl AsyncPipeReader {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            parked: false,
        }
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

    /// Lower bound on the bytes readable right now without yielding.
    #[inline]
    pub fn available(&self) -> usize {
        self.inner.ring.available()
    }

    /// Reads into `dst`, yielding only while the pipe is empty and open.
    ///
    /// Resolves to the number of bytes copied: at least one once data
    /// arrives, and zero either at end of stream or when `dst` is empty.
    pub async fn read(&mut self, dst: &mut [u8]) -> usize {
        ReadSome { reader: self, dst }.await
    }

    /// Reads one byte, or `None` at end of stream.
    pub async fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        if self.read(&mut byte).await == 0 {
            None
        } else {
            Some(byte[0])
        }
    }

    /// Discards up to `n` bytes, yielding only while the pipe is empty and
    /// open, and resolves to how many were discarded (zero at end of
    /// stream).
    pub async fn skip(&mut self, n: u64) -> u64 {
        SkipBytes { reader: self, n }.await
    }

    /// Closes the pipe, waking a parked writer. Idempotent.
    pub fn close(&mut self) {
        self.inner.slot.close();
    }

    fn unpark(&mut self) -> Wait {
        if self.parked {
            self.parked = false;
            self.inner.slot.disarm(Side::Reader)
        } else {
            Wait::Retry
        }
    }

    fn cancel(&mut self) {
        if self.parked {
            self.parked = false;
            let _ = self.inner.slot.disarm(Side::Reader);
        }
    }

    /// One attempt to copy bytes out: the shared skeleton behind
    /// `poll_read` and `read`. Never called with an empty `dst`.
    fn poll_read_some(&mut self, cx: &mut Context<'_>, dst: &mut [u8]) -> Poll<usize> {
        if self.unpark() == Wait::Closed {
            // Bytes committed before the close drain before end of stream.
            // SAFETY: this endpoint is the single consumer.
            return Poll::Ready(unsafe { self.inner.ring.try_read(dst) });
        }

        loop {
            // SAFETY: this endpoint is the single consumer.
            let n = unsafe { self.inner.ring.try_read(dst) };
            if n > 0 {
                return Poll::Ready(n);
            }

            match self.inner.slot.arm(Side::Reader, cx.waker()) {
                Arm::Parked => {
                    self.parked = true;
                    return Poll::Pending;
                }
                Arm::Retry => {}
                Arm::Closed => {
                    // SAFETY: this endpoint is the single consumer.
                    return Poll::Ready(unsafe { self.inner.ring.try_read(dst) });
                }
            }
        }
    }

    fn poll_skip(&mut self, cx: &mut Context<'_>, n: u64) -> Poll<u64> {
        if self.unpark() == Wait::Closed {
            // SAFETY: this endpoint is the single consumer.
            return Poll::Ready(unsafe { self.inner.ring.try_skip(n) });
        }

        loop {
            // SAFETY: this endpoint is the single consumer.
            let skipped = unsafe { self.inner.ring.try_skip(n) };
            if skipped > 0 {
                return Poll::Ready(skipped);
            }

            match self.inner.slot.arm(Side::Reader, cx.waker()) {
                Arm::Parked => {
                    self.parked = true;
                    return Poll::Pending;
                }
                Arm::Retry => {}
                Arm::Closed => {
                    // SAFETY: this endpoint is the single consumer.
                    return Poll::Ready(unsafe { self.inner.ring.try_skip(n) });
                }
            }
        }
    }
}

impl Drop for AsyncPipeReader {
    fn drop(&mut self) {
        self.inner.slot.close();
    }
}

impl AsyncRead for AsyncPipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        self.get_mut().poll_read_some(cx, buf).map(Ok)
    }
}

impl std::fmt::Debug for AsyncPipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncPipeReader")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Future returned by [`AsyncPipeReader::read`].
struct ReadSome<'r, 'b> {
    reader: &'r mut AsyncPipeReader,
    dst: &'b mut [u8],
}

impl Future for ReadSome<'_, '_> {
    type Output = usize;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.dst.is_empty() {
            return Poll::Ready(0);
        }
        this.reader.poll_read_some(cx, this.dst)
    }
}

impl Drop for ReadSome<'_, '_> {
    fn drop(&mut self) {
        self.reader.cancel();
    }
}

/// Future returned by [`AsyncPipeReader::skip`].
struct SkipBytes<'r> {
    reader: &'r mut AsyncPipeReader,
    n: u64,
}

impl Future for SkipBytes<'_> {
    type Output = u64;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.n == 0 {
            return Poll::Ready(0);
        }
        this.reader.poll_skip(cx, this.n)
    }
}

impl Drop for SkipBytes<'_> {
    fn drop(&mut self) {
        self.reader.cancel();
    }
}
