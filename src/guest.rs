//! The guest-side stub, `HostConnection::call` (§4.2).
//!
//! The guest worker blocks on the shared region's lock word while a service worker performs the
//! actual call. This module only knows how to allocate a region, pack/unpack it, and block — it
//! is handed a `post` callback rather than owning a [`crate::transport::WorkerTransport`]
//! directly, so it stays usable from both real workers and the in-process test harness (§4.12).

use std::time::Duration;

use crate::errno::Errno;
use crate::shared_region::{SharedRegion, WaitOutcome};
use crate::wire::{ArgumentWriter, RegionLayout};

/// Describes the binary payload a call needs copied in before posting and copied back out after
/// completion — the "reverse-transfer" plan of §4.1.
#[derive(Debug, Clone, Default)]
pub struct TransferPlan {
    pub binary_in: Vec<u8>,
    pub binary_out_len: usize,
}

/// Result of a completed or timed-out call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub errno: Errno,
    /// The call's fixed-size scalar result, if any — populated only on success.
    pub result: Vec<u8>,
    /// Populated only when `errno == Errno::Success` and the call carried an output payload.
    pub binary_out: Vec<u8>,
}

/// The guest-side half of one worker's connection to the service dispatcher.
pub struct HostConnection<P>
where
    P: Fn(std::sync::Arc<SharedRegion>) + Send + Sync,
{
    post: P,
}

impl<P> HostConnection<P>
where
    P: Fn(std::sync::Arc<SharedRegion>) + Send + Sync,
{
    #[must_use]
    pub fn new(post: P) -> Self {
        HostConnection { post }
    }

    /// Packs `params` (already-serialized scalar bytes) and `transfers.binary_in`, posts the
    /// region, and blocks for a result. Mirrors §4.2's five steps exactly.
    ///
    /// `result_len` is the call's fixed-size scalar result width (0 for calls with none) — the
    /// guest knows it statically from the method's signature, the same way it knows `params`'s
    /// width.
    ///
    /// `binary_in` is framed with a 4-byte little-endian length prefix ahead of its real bytes:
    /// the region's total size is always rounded up to a multiple of 4 (§3), so without an
    /// explicit length the dispatcher could not tell real trailing bytes from alignment padding
    /// once it reconstructs the layout from the region's size alone.
    pub fn call(&self, method_id: u32, params: &[u8], result_len: usize, transfers: &TransferPlan, timeout: Option<Duration>) -> CallOutcome {
        let framed_len = if transfers.binary_in.is_empty() { 0 } else { 4 + transfers.binary_in.len() };
        let layout = RegionLayout::compute(params.len(), result_len, framed_len, transfers.binary_out_len);
        let region = SharedRegion::new(method_id, layout);

        region.with_bytes(|bytes| {
            let mut writer = ArgumentWriter::new(&mut bytes[layout.params_range()]);
            writer.put_bytes(params);
            if !transfers.binary_in.is_empty() {
                let mut writer = ArgumentWriter::new(&mut bytes[layout.binary_in_range()]);
                writer.put(&(transfers.binary_in.len() as u32));
                writer.put_bytes(&transfers.binary_in);
            }
        });

        (self.post)(std::sync::Arc::clone(&region));

        match region.wait(timeout) {
            WaitOutcome::TimedOut => CallOutcome {
                errno: Errno::TimedOut,
                result: Vec::new(),
                binary_out: Vec::new(),
            },
            WaitOutcome::Completed => {
                let errno_code = region.errno();
                let errno = Errno::try_from(errno_code).unwrap_or(Errno::UnknownError);
                let (result, binary_out) = if errno.is_success() {
                    region.with_bytes(|bytes| (bytes[layout.result_range()].to_vec(), bytes[layout.binary_out_range()].to_vec()))
                } else {
                    (Vec::new(), Vec::new())
                };
                CallOutcome { errno, result, binary_out }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// A fake service side: reads the header, writes `errno` and an output payload at its real
    /// `binary_out_range()`, completes.
    fn respond_with(region: Arc<SharedRegion>, layout: RegionLayout, errno: u16, out: &'static [u8]) {
        thread::spawn(move || {
            region.with_bytes(|bytes| {
                let range = layout.binary_out_range();
                if out.len() <= range.end - range.start {
                    bytes[range.start..range.start + out.len()].copy_from_slice(out);
                }
            });
            region.complete(errno);
        });
    }

    #[test]
    fn successful_call_returns_the_output_payload() {
        let layout = RegionLayout::compute(0, 0, 0, 2);
        let conn = HostConnection::new(move |region| respond_with(region, layout, 0, b"ok"));
        let transfers = TransferPlan {
            binary_in: Vec::new(),
            binary_out_len: 2,
        };
        let outcome = conn.call(0, &[], 0, &transfers, Some(Duration::from_secs(5)));
        assert_eq!(outcome.errno, Errno::Success);
        assert_eq!(outcome.binary_out, b"ok");
    }

    #[test]
    fn timeout_returns_without_reading_results() {
        let conn = HostConnection::new(|_region| {
            // Never completes.
        });
        let outcome = conn.call(0, &[], 0, &TransferPlan::default(), Some(Duration::from_millis(20)));
        assert_eq!(outcome.errno, Errno::TimedOut);
        assert!(outcome.binary_out.is_empty());
    }

    #[test]
    fn failed_call_carries_no_output_payload() {
        let layout = RegionLayout::compute(0, 0, 0, 0);
        let conn = HostConnection::new(move |region| respond_with(region, layout, Errno::NoEntry.code(), b""));
        let outcome = conn.call(0, &[], 0, &TransferPlan::default(), Some(Duration::from_secs(5)));
        assert_eq!(outcome.errno, Errno::NoEntry);
        assert!(outcome.binary_out.is_empty());
    }
}
