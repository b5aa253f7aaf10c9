//! The process-wide file-descriptor table (§3 "FileDescriptor", §4.4).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errno::Errno;
use crate::rights::Rights;

/// What an FD is backed by. Every driver supports only the kinds its capability set makes sense
/// for; the dispatcher never needs to downcast because the FD itself carries this tag plus the
/// driver handle (§9 "Dynamic dispatch on device drivers").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    CharacterDevice,
    Pipe,
    Socket,
}

/// Per-kind mutable state that doesn't belong in the shared inode (e.g. the read/write cursor).
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCursorState {
    pub offset: u64,
}

/// One entry in the FD table.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub device_id: u32,
    pub kind: FileType,
    pub rights_base: Rights,
    pub rights_inheriting: Rights,
    pub fdflags: FdFlags,
    pub inode_id: u64,
    pub cursor: FileCursorState,
    /// Identifies which driver instance owns this FD's device; the dispatcher looks the driver
    /// up by this id rather than storing a trait object inline, so `FileDescriptor` stays
    /// `Clone`.
    pub driver_id: u32,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FdFlags: u16 {
        const APPEND   = 1 << 0;
        const DSYNC    = 1 << 1;
        const NONBLOCK = 1 << 2;
        const RSYNC    = 1 << 3;
        const SYNC     = 1 << 4;
    }
}

struct Inner {
    entries: HashMap<u32, FileDescriptor>,
    next_id: u32,
    preopen_handles: Vec<u32>,
}

/// Allocation, lifecycle, and renumbering of FDs (§4.4).
///
/// Preopens occupy 0 (stdin), 1 (stdout), 2 (stderr), then each mount point starting at 3 in
/// declaration order; this is the external contract `fd_prestat_get` reports (§6).
pub struct FdTable {
    inner: Mutex<Inner>,
    on_close: Box<dyn Fn(u64) + Send + Sync>,
}

impl FdTable {
    /// `on_close` is invoked with an FD's `inode_id` every time that FD is removed, so the VFS
    /// can drop the inode's refcount (§4.4 close policy).
    #[must_use]
    pub fn new(on_close: impl Fn(u64) + Send + Sync + 'static) -> Self {
        FdTable {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                next_id: 3,
                preopen_handles: Vec::new(),
            }),
            on_close: Box::new(on_close),
        }
    }

    /// Installs an FD at a specific handle, for preopens (0/1/2 and mount points) that must land
    /// at a known number rather than the next free one.
    pub fn insert_at(&self, handle: u32, fd: FileDescriptor) {
        let mut inner = self.inner.lock();
        inner.entries.insert(handle, fd);
        inner.preopen_handles.push(handle);
        if handle >= inner.next_id {
            inner.next_id = handle + 1;
        }
    }

    /// Allocates the next unused handle (≥ 3) and inserts `fd` there.
    pub fn allocate(&self, fd: FileDescriptor) -> u32 {
        let mut inner = self.inner.lock();
        let handle = inner.next_id;
        inner.next_id += 1;
        inner.entries.insert(handle, fd);
        handle
    }

    #[must_use]
    pub fn get(&self, handle: u32) -> Option<FileDescriptor> {
        self.inner.lock().entries.get(&handle).cloned()
    }

    pub fn get_checked(&self, handle: u32) -> Result<FileDescriptor, Errno> {
        self.get(handle).ok_or(Errno::BadFileDescriptor)
    }

    /// Removes an FD, calling `on_close` with its `inode_id`.
    pub fn remove(&self, handle: u32) -> Result<(), Errno> {
        let removed = {
            let mut inner = self.inner.lock();
            inner.entries.remove(&handle)
        };
        match removed {
            Some(fd) => {
                (self.on_close)(fd.inode_id);
                Ok(())
            }
            None => Err(Errno::BadFileDescriptor),
        }
    }

    /// Atomically replaces `to` with whatever is at `from`, closing `to`'s prior holder if any,
    /// then removing `from`.
    pub fn renumber(&self, from: u32, to: u32) -> Result<(), Errno> {
        let displaced = {
            let mut inner = self.inner.lock();
            let moved = inner.entries.remove(&from).ok_or(Errno::BadFileDescriptor)?;
            inner.entries.insert(to, moved)
        };
        if let Some(displaced) = displaced {
            (self.on_close)(displaced.inode_id);
        }
        Ok(())
    }

    pub fn update(&self, handle: u32, f: impl FnOnce(&mut FileDescriptor)) -> Result<(), Errno> {
        let mut inner = self.inner.lock();
        let fd = inner.entries.get_mut(&handle).ok_or(Errno::BadFileDescriptor)?;
        f(fd);
        Ok(())
    }

    /// Snapshot of every preopen, in ascending handle order — the order `fd_prestat_get` must
    /// report.
    #[must_use]
    pub fn preopens(&self) -> Vec<(u32, FileDescriptor)> {
        let inner = self.inner.lock();
        let mut preopens: Vec<_> = inner
            .preopen_handles
            .iter()
            .filter_map(|handle| inner.entries.get(handle).map(|fd| (*handle, fd.clone())))
            .collect();
        preopens.sort_by_key(|(handle, _)| *handle);
        preopens
    }
}

/// Shared handle to the process-wide table, held by every worker's dispatcher.
pub type SharedFdTable = Arc<FdTable>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn table() -> FdTable {
        FdTable::new(|_| {})
    }

    fn sample_fd(inode_id: u64) -> FileDescriptor {
        FileDescriptor {
            device_id: 0,
            kind: FileType::File,
            rights_base: Rights::FD_READ,
            rights_inheriting: Rights::empty(),
            fdflags: FdFlags::empty(),
            inode_id,
            cursor: FileCursorState::default(),
            driver_id: 0,
        }
    }

    #[test]
    fn allocate_starts_at_three() {
        let table = table();
        let handle = table.allocate(sample_fd(1));
        assert_eq!(handle, 3);
        let handle2 = table.allocate(sample_fd(2));
        assert_eq!(handle2, 4);
    }

    #[test]
    fn fd_lifecycle_matches_testable_property() {
        let closed = Arc::new(AtomicU64::new(u64::MAX));
        let closed_clone = Arc::clone(&closed);
        let table = FdTable::new(move |inode_id| closed_clone.store(inode_id, Ordering::SeqCst));
        let handle = table.allocate(sample_fd(42));
        table.remove(handle).unwrap();
        assert!(table.get(handle).is_none());
        assert_eq!(table.get_checked(handle).unwrap_err(), Errno::BadFileDescriptor);
        assert_eq!(closed.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn renumber_replaces_target_and_closes_its_prior_holder() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let closed_clone = Arc::clone(&closed);
        let table = FdTable::new(move |inode_id| closed_clone.lock().push(inode_id));
        let a = table.allocate(sample_fd(1));
        let b = table.allocate(sample_fd(2));
        table.renumber(a, b).unwrap();
        assert!(table.get(a).is_none());
        assert_eq!(table.get(b).unwrap().inode_id, 1);
        assert_eq!(*closed.lock(), vec![2]);
    }

    #[test]
    fn preopens_are_reported_in_ascending_order() {
        let table = table();
        table.insert_at(1, sample_fd(100));
        table.insert_at(0, sample_fd(101));
        table.insert_at(2, sample_fd(102));
        let preopens = table.preopens();
        let handles: Vec<u32> = preopens.iter().map(|(h, _)| *h).collect();
        assert_eq!(handles, vec![0, 1, 2]);
    }
}
