//! A synchronous cross-worker RPC runtime for the WASI preview-1 syscall surface.
//!
//! Two compute workers never share memory directly. Instead, a guest worker allocates a small
//! shared region (§3), packs a call into it, and blocks on an atomic lock word until a service
//! worker's [`dispatcher::Dispatcher`] wakes it back up with a result. The wire format, the
//! futex-style wait primitive, the WASI method surface, and the virtual file system backing it
//! are all defined in this crate; the actual cross-worker transport (message passing between OS
//! threads, web workers, or otherwise) is a collaborator the embedder supplies through
//! [`transport::WorkerTransport`].

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod config;
pub mod container;
pub mod dispatcher;
pub mod driver;
pub mod errno;
pub mod fd_table;
pub mod guest;
pub mod host_adapter;
pub mod host_error;
pub mod poll;
pub mod process;
pub mod rights;
pub mod shared_region;
pub mod time;
pub mod trace;
pub mod transport;
pub mod vfs;
pub mod wire;

pub use config::{MountEntry, ProcessOptions, StdioOptions};
pub use dispatcher::{CancelFlag, Dispatcher, DriverRegistry};
pub use errno::Errno;
pub use fd_table::{FdTable, FileDescriptor, FileType, SharedFdTable};
pub use guest::{CallOutcome, HostConnection, TransferPlan};
pub use host_adapter::{HostFileSystem, MemoryHostFileSystem};
pub use process::Process;
pub use rights::Rights;
pub use shared_region::SharedRegion;
pub use transport::{LoopbackTransport, WorkerTransport};
pub use wire::MethodId;
