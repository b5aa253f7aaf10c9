//! In-process loopback test harness (§4.12): runs a real [`Dispatcher`] on its own OS thread,
//! reachable through a [`LoopbackTransport`], and hands back a [`HostConnection`] any test can
//! call through exactly as a guest worker would.

use std::sync::Arc;

use wasi_shm_host::config::ProcessOptions;
use wasi_shm_host::driver::fs::FileSystemDriver;
use wasi_shm_host::fd_table::{FdFlags, FdTable, FileDescriptor, FileType};
use wasi_shm_host::host_adapter::MemoryHostFileSystem;
use wasi_shm_host::process::Process;
use wasi_shm_host::rights::Rights;
use wasi_shm_host::shared_region::SharedRegion;
use wasi_shm_host::transport::{LoopbackTransport, Message, WorkerHandle, WorkerTransport};
use wasi_shm_host::{Dispatcher, DriverRegistry, HostConnection};

pub mod wasi_calls;

/// fd 3 is the conventional first non-stdio preopen; every harness mounts an in-memory file
/// system there so path-based scenarios have a root to work against.
pub const ROOT_FD: u32 = 3;

/// A running dispatcher plus the transport + handle a [`HostConnection`] needs to reach it.
pub struct Harness {
    transport: Arc<LoopbackTransport>,
    handle: WorkerHandle,
}

impl Harness {
    /// Starts a dispatcher with one in-memory mounted file system at fd 3 and the given `args`.
    #[must_use]
    pub fn new(args: Vec<String>) -> Self {
        let fd_table = Arc::new(FdTable::new(|_| {}));
        let mut drivers = DriverRegistry::new();
        let adapter: Arc<MemoryHostFileSystem> = Arc::new(MemoryHostFileSystem::new());
        drivers.insert(0, Arc::new(FileSystemDriver::new(0, "/", "", adapter)));
        fd_table.insert_at(
            ROOT_FD,
            FileDescriptor {
                device_id: 0,
                kind: FileType::Directory,
                rights_base: Rights::all(),
                rights_inheriting: Rights::all(),
                fdflags: FdFlags::empty(),
                inode_id: 0,
                cursor: Default::default(),
                driver_id: 0,
            },
        );
        let (process, _exit_rx) = Process::new(Arc::clone(&fd_table));
        let mut options = ProcessOptions::new();
        options.set_args(args).expect("args accepted at startup");
        let dispatcher = Arc::new(Dispatcher::new(fd_table, drivers, process, options));

        let transport = Arc::new(LoopbackTransport::new());
        let handle = transport.spawn_with({
            let dispatcher = Arc::clone(&dispatcher);
            move |message| {
                if let Message::Call(region) = message {
                    futures::executor::block_on(dispatcher.dispatch(region, None));
                }
            }
        });

        Harness { transport, handle }
    }

    /// A guest-side connection posting calls through this harness's dispatcher thread.
    #[must_use]
    pub fn connection(&self) -> HostConnection<impl Fn(Arc<SharedRegion>) + Send + Sync> {
        let transport = Arc::clone(&self.transport);
        let handle = self.handle;
        HostConnection::new(move |region| transport.post(handle, Message::Call(region)))
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.transport.terminate(self.handle);
    }
}
