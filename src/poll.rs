//! `poll_oneoff` and the monotonic/realtime clock sources (§4.8).

use std::time::{Duration, Instant, SystemTime};

use crate::time::time_from_system_time;

/// Which clock a `clock_*` call or a timer subscription names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    /// Nanoseconds from an arbitrary epoch, never decreasing.
    Monotonic,
    /// Nanoseconds since 1970-01-01T00:00:00Z, non-monotonic.
    Realtime,
}

/// Source of both clocks, built once at process start so `Monotonic` has a stable origin.
pub struct Clock {
    monotonic_origin: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Clock {
            monotonic_origin: Instant::now(),
        }
    }
}

impl Clock {
    #[must_use]
    pub fn now_ns(&self, clock: ClockId) -> u64 {
        match clock {
            ClockId::Monotonic => self.monotonic_origin.elapsed().as_nanos() as u64,
            ClockId::Realtime => {
                let (secs, nanos) = time_from_system_time(&SystemTime::now());
                (secs.max(0) as u64) * 1_000_000_000 + nanos as u64
            }
        }
    }

    /// Driver-reported clock resolution; both clocks advertise nanosecond resolution here.
    #[must_use]
    pub fn resolution_ns(&self, _clock: ClockId) -> u64 {
        1
    }
}

/// One subscription passed to `poll_oneoff`: either a monotonic-clock deadline or an FD
/// readiness query.
#[derive(Debug, Clone, Copy)]
pub enum Subscription {
    ClockDeadline { deadline_ns: u64 },
    FdReadable { fd: u32 },
    FdWritable { fd: u32 },
}

/// One ready event `poll_oneoff` reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Clock,
    FdReadable(u32),
    FdWritable(u32),
}

/// Evaluates a list of subscriptions against the current monotonic time and a readiness probe,
/// returning every event that is ready right now, in subscription order (§4.8: "returns at least
/// one ready event when any subscription is ready; it may return more. Ties are broken by
/// subscription order.").
///
/// `is_fd_ready` is supplied by the dispatcher, since only it knows how to ask a driver for
/// `bytes_available` (§4.5).
pub fn poll_oneoff(
    clock: &Clock,
    subscriptions: &[Subscription],
    mut is_fd_ready: impl FnMut(u32, bool) -> bool,
) -> Vec<PollEvent> {
    let now = clock.now_ns(ClockId::Monotonic);
    let mut ready = Vec::new();
    for subscription in subscriptions {
        match *subscription {
            Subscription::ClockDeadline { deadline_ns } => {
                if now >= deadline_ns {
                    ready.push(PollEvent::Clock);
                }
            }
            Subscription::FdReadable { fd } => {
                if is_fd_ready(fd, true) {
                    ready.push(PollEvent::FdReadable(fd));
                }
            }
            Subscription::FdWritable { fd } => {
                if is_fd_ready(fd, false) {
                    ready.push(PollEvent::FdWritable(fd));
                }
            }
        }
    }
    ready
}

/// Blocks the calling (service-worker) thread until at least one subscription is ready,
/// re-checking on a short tick. Used by the dispatcher for a clock-only subscription set, where
/// nothing but time passing could ever make `poll_oneoff` return non-empty.
pub fn poll_oneoff_blocking(
    clock: &Clock,
    subscriptions: &[Subscription],
    mut is_fd_ready: impl FnMut(u32, bool) -> bool,
    tick: Duration,
) -> Vec<PollEvent> {
    loop {
        let ready = poll_oneoff(clock, subscriptions, &mut is_fd_ready);
        if !ready.is_empty() {
            return ready;
        }
        std::thread::sleep(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_decreases() {
        let clock = Clock::default();
        let first = clock.now_ns(ClockId::Monotonic);
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.now_ns(ClockId::Monotonic);
        assert!(second >= first);
    }

    #[test]
    fn expired_deadline_is_ready() {
        let clock = Clock::default();
        let events = poll_oneoff(&clock, &[Subscription::ClockDeadline { deadline_ns: 0 }], |_, _| false);
        assert_eq!(events, vec![PollEvent::Clock]);
    }

    #[test]
    fn blocking_poll_waits_for_a_future_deadline() {
        let clock = Clock::default();
        let deadline = clock.now_ns(ClockId::Monotonic) + Duration::from_millis(10).as_nanos() as u64;
        let events = poll_oneoff_blocking(&clock, &[Subscription::ClockDeadline { deadline_ns: deadline }], |_, _| false, Duration::from_millis(1));
        assert_eq!(events, vec![PollEvent::Clock]);
        assert!(clock.now_ns(ClockId::Monotonic) >= deadline);
    }

    #[test]
    fn fd_readiness_is_reported_in_subscription_order() {
        let clock = Clock::default();
        let subs = [
            Subscription::FdReadable { fd: 3 },
            Subscription::FdWritable { fd: 4 },
        ];
        let events = poll_oneoff(&clock, &subs, |fd, readable| fd == 3 && readable || fd == 4 && !readable);
        assert_eq!(events, vec![PollEvent::FdReadable(3), PollEvent::FdWritable(4)]);
    }
}
