//! The fixed-capacity byte ring shared by the two pipe endpoints.
//!
//! Two monotonically increasing 64-bit cursors address the ring: `write_pos`
//! counts every byte ever enqueued and `read_pos` every byte ever consumed.
//! Occupancy is their difference, which makes full and empty unambiguous,
//! and a cursor maps to a buffer index with a single mask because the
//! capacity is rounded up to a power of two. At one gigabyte per second the
//! cursors take centuries to overflow.
//!
//! Transfers that straddle the wrap point are performed as at most two
//! contiguous bulk copies; there is no per-byte loop in the hot path.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::utils::CachePadded;

/// An SPSC byte ring.
///
/// The cursors are cache-padded so that publishing progress on one side
/// does not invalidate the other side's line.
pub(crate) struct RingBuffer {
    /// Total bytes ever written. Only advanced by the writer.
    write_pos: CachePadded<AtomicU64>,

    /// Total bytes ever consumed. Only advanced by the reader.
    read_pos: CachePadded<AtomicU64>,

    /// Backing storage. A slot is valid between the cursors and scratch
    /// everywhere else.
    buffer: Box<[UnsafeCell<u8>]>,

    /// Bit mask for the buffer index (capacity - 1 for power-of-two).
    mask: u64,
}

// Synchronization happens through the cursors: a slot is only touched by
// the side that currently owns it.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// Creates a ring, rounding `capacity` up to the next power of two.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or exceeds `1 << (usize::BITS - 2)`.
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "the capacity must be 1 or greater");
        assert!(
            capacity <= (1 << (usize::BITS - 2)),
            "the capacity may not exceed {}",
            1usize << (usize::BITS - 2)
        );

        let capacity = capacity.next_power_of_two();
        let mut buffer = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buffer.push(UnsafeCell::new(0));
        }

        Self {
            write_pos: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
            buffer: buffer.into(),
            mask: capacity as u64 - 1,
        }
    }

    /// Effective capacity (always a power of two).
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Lower-bound snapshot of the bytes currently readable.
    ///
    /// Relaxed loads are enough for an advisory count. When called from the
    /// reader the result can only undercount: the read cursor is the
    /// reader's own and the write cursor never decreases.
    #[inline]
    pub(crate) fn available(&self) -> usize {
        let wp = self.write_pos.load(Ordering::Relaxed);
        let rp = self.read_pos.load(Ordering::Relaxed);
        wp.wrapping_sub(rp) as usize
    }

    /// Copies as much of `src` as currently fits, returning the number of
    /// bytes accepted (zero when the ring is full).
    ///
    /// # Safety
    ///
    /// Must only be called from the single producer side.
    pub(crate) unsafe fn try_write(&self, src: &[u8]) -> usize {
        // Reads of the buffer must happen-before the slots are overwritten.
        let rp = self.read_pos.load(Ordering::Acquire);
        // Writer-owned cursor, no synchronization required.
        let wp = self.write_pos.load(Ordering::Relaxed);

        let free = self.capacity() - (wp - rp) as usize;
        let n = src.len().min(free);
        if n == 0 {
            return 0;
        }

        let mut copied = 0;
        let mut pos = wp;
        while copied < n {
            let index = (pos & self.mask) as usize;
            let contiguous = (self.capacity() - index).min(n - copied);
            // SAFETY: the mask keeps the index in bounds and the slots up
            // to `free` bytes past `wp` are scratch owned by the writer.
            unsafe {
                let dst = self.buffer.get_unchecked(index).get();
                std::ptr::copy_nonoverlapping(src.as_ptr().add(copied), dst, contiguous);
            }
            copied += contiguous;
            pos += contiguous as u64;
        }

        // Writes to the buffer must happen-before the reader observes the
        // advanced cursor.
        self.write_pos.store(wp + n as u64, Ordering::Release);
        n
    }

    /// Copies up to `dst.len()` readable bytes out of the ring, returning
    /// the number copied (zero when the ring is empty).
    ///
    /// # Safety
    ///
    /// Must only be called from the single consumer side.
    pub(crate) unsafe fn try_read(&self, dst: &mut [u8]) -> usize {
        // Reader-owned cursor, no synchronization required.
        let rp = self.read_pos.load(Ordering::Relaxed);
        // Writes to the buffer must happen-before reading the new limit.
        let wp = self.write_pos.load(Ordering::Acquire);

        let n = ((wp - rp) as usize).min(dst.len());
        if n == 0 {
            return 0;
        }

        let mut copied = 0;
        let mut pos = rp;
        while copied < n {
            let index = (pos & self.mask) as usize;
            let contiguous = (self.capacity() - index).min(n - copied);
            // SAFETY: the mask keeps the index in bounds and the slots up
            // to `n` bytes past `rp` hold valid data.
            unsafe {
                let src = self.buffer.get_unchecked(index).get() as *const u8;
                std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr().add(copied), contiguous);
            }
            copied += contiguous;
            pos += contiguous as u64;
        }

        // Reads from the buffer must happen-before the writer reuses the
        // slots.
        self.read_pos.store(rp + n as u64, Ordering::Release);
        n
    }

    /// Advances the read cursor by up to `n` bytes without copying,
    /// returning how far it moved.
    ///
    /// Relaxed cursor traffic is sufficient here: no buffer contents are
    /// read, and the read cursor is only ever advanced by the reader
    /// itself. A second reader would need the acquire/release pairing that
    /// [`try_read`](Self::try_read) uses.
    ///
    /// # Safety
    ///
    /// Must only be called from the single consumer side.
    pub(crate) unsafe fn try_skip(&self, n: u64) -> u64 {
        let rp = self.read_pos.load(Ordering::Relaxed);
        let wp = self.write_pos.load(Ordering::Relaxed);

        let skipped = (wp - rp).min(n);
        if skipped > 0 {
            self.read_pos.store(rp + skipped, Ordering::Relaxed);
        }
        skipped
    }
}
