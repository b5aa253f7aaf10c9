//! Structured logging and tracing conventions (§4.10, §6.3, §6.4).
//!
//! Driver- and session-level events go through `log`; the dispatcher wraps each call in a
//! `tracing` span and additionally forwards a formatted line to the process's configured
//! [`TraceSink`], matching the `trace`/`trace_summary` control records of §6.3.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TraceSink;
use crate::errno::Errno;
use crate::wire::MethodId;

/// Per-process call counters, reported in the final `trace_summary` line (§6.3).
#[derive(Default)]
pub struct TraceCounters {
    calls: AtomicU64,
    errors: AtomicU64,
}

impl TraceCounters {
    pub fn record(&self, errno: Errno) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !errno.is_success() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Emits a `tracing` span for one dispatched call and, if a sink is configured, a formatted trace
/// line. Call once per completed call from [`crate::dispatcher`].
pub fn trace_call(sink: Option<&dyn TraceSink>, counters: &TraceCounters, method: MethodId, errno: Errno) {
    let span = tracing::info_span!("call", method = method.name(), errno = errno.code());
    let _enter = span.enter();
    if errno.is_success() {
        tracing::debug!(method = method.name(), "call completed");
    } else {
        tracing::warn!(method = method.name(), errno = %errno, "call failed");
    }
    counters.record(errno);
    if let Some(sink) = sink {
        sink.trace(&format!("{} -> {}", method.name(), errno));
    }
}

/// Emits the final summary line once a process tears down (§7 "surfaces as a non-zero exit with a
/// diagnostic on the trace sink" for the failure path; this covers the normal-exit path too).
pub fn trace_summary(sink: Option<&dyn TraceSink>, counters: &TraceCounters, exit_code: i32) {
    let summary = format!(
        "exit_code={exit_code} calls={} errors={}",
        counters.calls(),
        counters.errors()
    );
    tracing::info!(exit_code, calls = counters.calls(), errors = counters.errors(), "process exited");
    if let Some(sink) = sink {
        sink.trace_summary(&summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        lines: Mutex<Vec<String>>,
        summaries: Mutex<Vec<String>>,
    }

    impl TraceSink for RecordingSink {
        fn trace(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
        fn trace_summary(&self, summary: &str) {
            self.summaries.lock().unwrap().push(summary.to_string());
        }
    }

    #[test]
    fn counters_tally_calls_and_errors() {
        let counters = TraceCounters::default();
        let sink = RecordingSink {
            lines: Mutex::new(Vec::new()),
            summaries: Mutex::new(Vec::new()),
        };
        trace_call(Some(&sink), &counters, MethodId::FdRead, Errno::Success);
        trace_call(Some(&sink), &counters, MethodId::FdWrite, Errno::NotCapable);
        assert_eq!(counters.calls(), 2);
        assert_eq!(counters.errors(), 1);
        assert_eq!(sink.lines.lock().unwrap().len(), 2);

        trace_summary(Some(&sink), &counters, 0);
        assert_eq!(sink.summaries.lock().unwrap().len(), 1);
    }
}
