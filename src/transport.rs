//! The worker transport collaborator (§6.3) and an in-process reference implementation used by
//! tests and the self-test harness (§4.12, §4.13).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::shared_region::SharedRegion;

/// Small JSON-shaped control records exchanged alongside call regions (§6.3).
#[derive(Debug, Clone)]
pub enum ControlMessage {
    StartMain,
    StartThread { tid: u32 },
    WorkerReady { handle: u32 },
    WorkerDone { handle: u32, exit_code: i32 },
    Trace { line: String },
    TraceSummary { summary: String },
}

/// Either a call (a shared region pair) or a control record.
#[derive(Clone)]
pub enum Message {
    Call(Arc<SharedRegion>),
    Control(ControlMessage),
}

/// Opaque handle to a spawned worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerHandle(pub u32);

/// The collaborator described in §6.3: posts messages, lets the core register a receive
/// callback, and spawns/terminates worker threads.
pub trait WorkerTransport: Send + Sync {
    fn post(&self, handle: WorkerHandle, message: Message);
    fn spawn_worker(&self, script_uri: &str) -> WorkerHandle;
    fn terminate(&self, handle: WorkerHandle);
}

struct WorkerState {
    sender: mpsc::UnboundedSender<Message>,
    join: Option<std::thread::JoinHandle<()>>,
}

/// In-process transport that runs each "worker" as an OS thread draining an
/// [`tokio::sync::mpsc`] channel, for self-tests and demos that need a `WorkerTransport` without
/// a real extension host (§4.13).
pub struct LoopbackTransport {
    workers: Mutex<HashMap<u32, WorkerState>>,
    next_id: AtomicU32,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        LoopbackTransport {
            workers: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }
}

impl LoopbackTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a worker thread that runs `body` against each message it receives, returning the
    /// handle other code can [`WorkerTransport::post`] to.
    pub fn spawn_with<F>(&self, mut body: F) -> WorkerHandle
    where
        F: FnMut(Message) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let join = std::thread::Builder::new()
            .name(format!("loopback-worker-{id}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to start loopback worker runtime");
                runtime.block_on(async {
                    while let Some(message) = rx.recv().await {
                        body(message);
                    }
                });
            })
            .expect("failed to spawn loopback worker thread");
        self.workers.lock().insert(id, WorkerState { sender: tx, join: Some(join) });
        WorkerHandle(id)
    }
}

impl WorkerTransport for LoopbackTransport {
    fn post(&self, handle: WorkerHandle, message: Message) {
        if let Some(worker) = self.workers.lock().get(&handle.0) {
            let _ = worker.sender.send(message);
        }
    }

    fn spawn_worker(&self, _script_uri: &str) -> WorkerHandle {
        // A bare LoopbackTransport has nothing to execute for an arbitrary script URI; callers
        // that need a runnable worker use `spawn_with` directly. This satisfies the trait for
        // collaborators that only ever post to workers they spawned themselves out-of-band.
        self.spawn_with(|_message| {})
    }

    fn terminate(&self, handle: WorkerHandle) {
        let worker = self.workers.lock().remove(&handle.0);
        if let Some(mut worker) = worker {
            drop(worker.sender);
            if let Some(join) = worker.join.take() {
                let _ = join.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;

    #[test]
    fn posted_messages_reach_the_worker_body() {
        let transport = LoopbackTransport::new();
        let (tx, rx) = std_mpsc::channel();
        let handle = transport.spawn_with(move |message| {
            if let Message::Control(ControlMessage::WorkerReady { handle }) = message {
                let _ = tx.send(handle);
            }
        });
        transport.post(handle, Message::Control(ControlMessage::WorkerReady { handle: 9 }));
        let received = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(received, 9);
        transport.terminate(handle);
    }
}
