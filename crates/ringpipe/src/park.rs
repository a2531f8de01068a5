//! The slot where one pipe endpoint parks while waiting for the other.
//!
//! The slot is a single atomic tag word with four states: nobody waiting,
//! writer parked, reader parked, closed. Every transition is a CAS or a
//! swap, so at most one side is ever parked and close is terminal. The wake
//! handle of a parked side is a [`Waker`] stored in that side's own waiter
//! cell, published before the tag is raised; the cell's lock is only held
//! for the few instructions needed to store or take a handle, never across
//! a suspension.
//!
//! The liveness rule is the interesting part: a side that finds the *other*
//! side already parked does not park itself. The peer can only have parked
//! after making all the progress it could, which is exactly the progress
//! the current side is missing, so the current side wakes the peer and
//! retries its own work instead. Together with close waking whichever side
//! is parked, no schedule leaves both sides asleep.
//!
//! Unifying the handle type as a `Waker` lets blocking and asynchronous
//! endpoints share the protocol: a blocking caller parks its thread behind
//! an unparker waker, an asynchronous caller registers the task waker from
//! its `Context`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Waker;

use parking_lot::Mutex;
use tracing::trace;

use crate::utils::CachePadded;

const EMPTY: usize = 0;
const CLOSED: usize = 1;
const WRITER_PARKED: usize = 2;
const READER_PARKED: usize = 3;

/// Which endpoint is running the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Writer,
    Reader,
}

impl Side {
    #[inline]
    fn tag(self) -> usize {
        match self {
            Side::Writer => WRITER_PARKED,
            Side::Reader => READER_PARKED,
        }
    }

    #[inline]
    fn peer_tag(self) -> usize {
        match self {
            Side::Writer => READER_PARKED,
            Side::Reader => WRITER_PARKED,
        }
    }
}

/// Outcome of one pass through the wait protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// The other side has made progress since the caller last looked;
    /// retry the operation.
    Retry,
    /// The pipe is closed.
    Closed,
}

/// Result of attempting to register as the parked side.
pub(crate) enum Arm {
    /// The caller's handle is registered and announced; suspend until
    /// woken, then call [`ParkSlot::disarm`].
    Parked,
    /// The peer was parked instead and has been woken; retry the
    /// operation without suspending.
    Retry,
    /// The pipe is closed.
    Closed,
}

/// The wait-for-the-other-end-or-close primitive.
///
/// All tag transitions are sequentially consistent; the transition doubles
/// as the fence between the data copies and the close observation.
pub(crate) struct ParkSlot {
    state: AtomicUsize,
    writer_waiter: CachePadded<Mutex<Option<Waker>>>,
    reader_waiter: CachePadded<Mutex<Option<Waker>>>,
}

impl ParkSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicUsize::new(EMPTY),
            writer_waiter: CachePadded::new(Mutex::new(None)),
            reader_waiter: CachePadded::new(Mutex::new(None)),
        }
    }

    #[inline]
    fn waiter(&self, tag: usize) -> &Mutex<Option<Waker>> {
        if tag == WRITER_PARKED {
            &self.writer_waiter
        } else {
            &self.reader_waiter
        }
    }

    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CLOSED
    }

    /// Registers `waker` as `side`'s wake handle and attempts the
    /// empty-to-parked transition.
    pub(crate) fn arm(&self, side: Side, waker: &Waker) -> Arm {
        // The handle must be in place before the tag announces it.
        *self.waiter(side.tag()).lock() = Some(waker.clone());

        match self
            .state
            .compare_exchange(EMPTY, side.tag(), Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                trace!(?side, "parked");
                Arm::Parked
            }
            Err(CLOSED) => Arm::Closed,
            Err(prior) => {
                debug_assert_eq!(prior, side.peer_tag());
                // The peer parked first, which means it already advanced
                // past everything the caller is waiting on. Wake it and
                // retry instead of parking.
                self.wake(prior);
                trace!(?side, "woke parked peer");
                Arm::Retry
            }
        }
    }

    /// Clears `side`'s own parked tag after a wakeup.
    ///
    /// Only the parked side itself ever clears its tag, and only close may
    /// replace it, so a failed transition means the pipe closed while the
    /// caller was suspended.
    pub(crate) fn disarm(&self, side: Side) -> Wait {
        match self
            .state
            .compare_exchange(side.tag(), EMPTY, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Wait::Retry,
            Err(_) => Wait::Closed,
        }
    }

    /// Blocking wait: parks the current thread until the peer wakes it or
    /// the pipe closes.
    ///
    /// `waker` must unpark the current thread. A spurious return from
    /// `thread::park` surfaces as [`Wait::Retry`] and is absorbed by the
    /// caller's retry loop.
    pub(crate) fn wait(&self, side: Side, waker: &Waker) -> Wait {
        match self.arm(side, waker) {
            Arm::Parked => {
                std::thread::park();
                self.disarm(side)
            }
            Arm::Retry => Wait::Retry,
            Arm::Closed => Wait::Closed,
        }
    }

    /// Marks the pipe closed and wakes whichever side was parked.
    ///
    /// Idempotent: once closed the state never changes again.
    pub(crate) fn close(&self) {
        let prior = self.state.swap(CLOSED, Ordering::SeqCst);
        if prior == WRITER_PARKED || prior == READER_PARKED {
            trace!("closed; waking parked side");
            self.wake(prior);
        }
    }

    fn wake(&self, tag: usize) {
        // Taking the handle instead of waking by reference keeps the cell
        // clear for the owner's next registration and turns a duplicate
        // wake into a no-op.
        let waker = self.waiter(tag).lock().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}
