//! The process model: one main worker, zero or more auxiliary workers, and the exit cascade that
//! tears them down (§4.9).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::fd_table::SharedFdTable;

/// Why a process's `run` future resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `proc_exit(rval)` was called explicitly, or the main worker returned without calling it
    /// (treated as `proc_exit(0)`, §4.9).
    Exited(i32),
    /// `terminate()` was invoked from the host side.
    Terminated,
}

impl ExitReason {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ExitReason::Exited(rval) => rval,
            ExitReason::Terminated => 0,
        }
    }
}

struct AuxiliaryWorker {
    shutdown: Option<oneshot::Sender<()>>,
}

struct Inner {
    auxiliary: HashMap<u32, AuxiliaryWorker>,
    next_tid: u32,
    exited: bool,
}

/// Shared handle every worker's dispatcher holds, used to run the shutdown cascades described in
/// §4.9. All workers of one process share one `Process`, the FD table, and the inode trees (§4.9:
/// "all connections share the FD table and inode trees").
pub struct Process {
    fd_table: SharedFdTable,
    inner: Mutex<Inner>,
    exit_tx: Mutex<Option<oneshot::Sender<ExitReason>>>,
}

impl Process {
    #[must_use]
    pub fn new(fd_table: SharedFdTable) -> (Arc<Self>, oneshot::Receiver<ExitReason>) {
        let (tx, rx) = oneshot::channel();
        let process = Arc::new(Process {
            fd_table,
            inner: Mutex::new(Inner {
                auxiliary: HashMap::new(),
                next_tid: 1,
                exited: false,
            }),
            exit_tx: Mutex::new(Some(tx)),
        });
        (process, rx)
    }

    /// Registers a newly spawned auxiliary worker, returning its thread id and a receiver it
    /// should select on to know when it must tear itself down.
    pub fn spawn_thread(&self) -> (u32, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        let tid = inner.next_tid;
        inner.next_tid += 1;
        inner.auxiliary.insert(tid, AuxiliaryWorker { shutdown: Some(tx) });
        (tid, rx)
    }

    /// `thread-exit(tid)`: tears down only that worker's resources, never the process (§4.9).
    pub fn thread_exit(&self, tid: u32) {
        let mut inner = self.inner.lock();
        inner.auxiliary.remove(&tid);
    }

    /// `proc_exit(rval)`, or the implicit `proc_exit(0)` on a clean main-worker return: signals
    /// `rval` to the process's `run` future, terminates every auxiliary worker, closes every FD,
    /// and tears down pipes/terminals transitively via FD closure (§4.9).
    pub fn proc_exit(&self, rval: i32) {
        self.shutdown(ExitReason::Exited(rval));
    }

    /// External `terminate()`: runs the same cascade as `proc_exit(0)` but from the host side
    /// (§4.9).
    pub fn terminate(&self) {
        self.shutdown(ExitReason::Terminated);
    }

    fn shutdown(&self, reason: ExitReason) {
        let auxiliary = {
            let mut inner = self.inner.lock();
            if inner.exited {
                return;
            }
            inner.exited = true;
            std::mem::take(&mut inner.auxiliary)
        };
        for (_, mut worker) in auxiliary {
            if let Some(shutdown) = worker.shutdown.take() {
                let _ = shutdown.send(());
            }
        }
        if let Some(tx) = self.exit_tx.lock().take() {
            let _ = tx.send(reason);
        }
    }

    #[must_use]
    pub fn fd_table(&self) -> &SharedFdTable {
        &self.fd_table
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.inner.lock().exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd_table::FdTable;

    fn fd_table() -> SharedFdTable {
        Arc::new(FdTable::new(|_| {}))
    }

    #[tokio::test]
    async fn proc_exit_resolves_run_future_with_rval() {
        let (process, rx) = Process::new(fd_table());
        process.proc_exit(7);
        assert_eq!(rx.await.unwrap(), ExitReason::Exited(7));
        assert!(process.has_exited());
    }

    #[tokio::test]
    async fn proc_exit_tears_down_auxiliary_workers() {
        let (process, _rx) = Process::new(fd_table());
        let (_tid, aux_rx) = process.spawn_thread();
        process.proc_exit(0);
        aux_rx.await.unwrap();
    }

    #[tokio::test]
    async fn thread_exit_does_not_touch_the_process() {
        let (process, _rx) = Process::new(fd_table());
        let (tid, _aux_rx) = process.spawn_thread();
        process.thread_exit(tid);
        assert!(!process.has_exited());
    }

    #[tokio::test]
    async fn terminate_runs_the_same_cascade_as_proc_exit() {
        let (process, rx) = Process::new(fd_table());
        process.terminate();
        assert_eq!(rx.await.unwrap(), ExitReason::Terminated);
    }
}
