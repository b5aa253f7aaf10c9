//! The shared call region and its futex-style wait/wake primitive (§3, §4.2, §4.3, §8 "Lock
//! liveness").
//!
//! Rust has no portable `SharedArrayBuffer` + `Atomics.wait`, so the wait primitive here is built
//! from an [`AtomicU32`] lock word backed by a [`parking_lot::Condvar`]: the atomic is what the
//! wire format actually specifies (§3's "the `lock` word is only ever stored via atomic
//! operations"), and the condvar is purely a local wake-up channel so the waiting thread doesn't
//! spin.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::wire::{Header, RegionLayout, LOCK_COMPLETED, LOCK_PENDING};

/// Outcome of blocking on a call region's lock word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The responder completed the call and woke the waiter.
    Completed,
    /// The timeout elapsed before the lock word reached [`LOCK_COMPLETED`].
    TimedOut,
}

/// One in-flight call's shared buffer plus its wait/wake machinery.
///
/// A single `SharedRegion` is used for exactly one call: the guest stub allocates one, the
/// dispatcher fills it in, and both sides then drop it.
pub struct SharedRegion {
    lock: AtomicU32,
    wake: Mutex<()>,
    condvar: Condvar,
    buffer: Mutex<Vec<u8>>,
}

impl SharedRegion {
    /// Allocates a region sized to hold `layout.total_size` bytes, already containing a header
    /// for `method_id` with `lock = 0`.
    #[must_use]
    pub fn new(method_id: u32, layout: RegionLayout) -> Arc<Self> {
        let mut buffer = vec![0u8; layout.total_size];
        let header = Header::new(method_id);
        buffer[..Header::SIZE].copy_from_slice(header.as_bytes_for_region());
        Arc::new(SharedRegion {
            lock: AtomicU32::new(LOCK_PENDING),
            wake: Mutex::new(()),
            condvar: Condvar::new(),
            buffer: Mutex::new(buffer),
        })
    }

    /// Runs `f` with exclusive mutable access to the underlying bytes. Used by both sides to
    /// pack/unpack params, results, and binary payloads; never held across a suspension point
    /// (§5).
    pub fn with_bytes<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut buffer = self.buffer.lock();
        f(&mut buffer)
    }

    /// Store `errno` into the header, then `lock = 1`, then wake any waiter (§4.3 step 6).
    pub fn complete(&self, errno: u16) {
        {
            let mut buffer = self.buffer.lock();
            buffer[8..10].copy_from_slice(&errno.to_le_bytes());
        }
        let _guard = self.wake.lock();
        self.lock.store(LOCK_COMPLETED, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Reads the `errno` field out of the header. Only meaningful once [`Self::wait`] reports
    /// [`WaitOutcome::Completed`].
    #[must_use]
    pub fn errno(&self) -> u16 {
        let buffer = self.buffer.lock();
        u16::from_le_bytes([buffer[8], buffer[9]])
    }

    /// Blocks the calling thread until the lock word reaches [`LOCK_COMPLETED`] or `timeout`
    /// elapses. `None` blocks indefinitely.
    #[must_use]
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        if self.lock.load(Ordering::Acquire) == LOCK_COMPLETED {
            return WaitOutcome::Completed;
        }
        let mut guard = self.wake.lock();
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if self.lock.load(Ordering::Acquire) == LOCK_COMPLETED {
                return WaitOutcome::Completed;
            }
            match deadline {
                None => {
                    self.condvar.wait(&mut guard);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        // One last check: the responder may have completed between our last
                        // load and here.
                        return if self.lock.load(Ordering::Acquire) == LOCK_COMPLETED {
                            WaitOutcome::Completed
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                    let remaining = deadline - now;
                    let result = self.condvar.wait_for(&mut guard, remaining);
                    if result.timed_out() && self.lock.load(Ordering::Acquire) != LOCK_COMPLETED {
                        return WaitOutcome::TimedOut;
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock.load(Ordering::Acquire) == LOCK_COMPLETED
    }
}

trait HeaderBytes {
    fn as_bytes_for_region(&self) -> &[u8];
}

impl HeaderBytes for Header {
    fn as_bytes_for_region(&self) -> &[u8] {
        zerocopy::IntoBytes::as_bytes(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn completes_and_wakes_a_waiter() {
        let layout = RegionLayout::compute(0, 0, 0, 0);
        let region = SharedRegion::new(0, layout);
        let responder = Arc::clone(&region);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            responder.complete(0);
        });
        let outcome = region.wait(Some(Duration::from_secs(5)));
        assert_eq!(outcome, WaitOutcome::Completed);
        assert_eq!(region.errno(), 0);
        handle.join().unwrap();
    }

    #[test]
    fn times_out_when_never_completed() {
        let layout = RegionLayout::compute(0, 0, 0, 0);
        let region = SharedRegion::new(0, layout);
        let outcome = region.wait(Some(Duration::from_millis(30)));
        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[test]
    fn already_completed_never_blocks() {
        let layout = RegionLayout::compute(0, 0, 0, 0);
        let region = SharedRegion::new(0, layout);
        region.complete(5);
        let outcome = region.wait(Some(Duration::from_millis(1)));
        assert_eq!(outcome, WaitOutcome::Completed);
        assert_eq!(region.errno(), 5);
    }
}
