//! The device-driver capability set every mounted file system, stdio stream, and pty must honor
//! (§4.5, §9 "Dynamic dispatch on device drivers").
//!
//! A driver implements only the subset of methods its `filetype` supports; everything else falls
//! through to the default body, which logs and returns [`Errno::NoSystem`]. The dispatcher never
//! downcasts a driver to a concrete type — the FD already carries the driver id and the
//! capability tag it needs.

pub mod console;
pub mod fs;
pub mod pipe;
pub mod pty;

use async_trait::async_trait;

use crate::errno::Errno;
use crate::fd_table::{FdFlags, FileDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub filetype: crate::fd_table::FileType,
    pub size: u64,
    pub mtime_ms: u64,
    pub ctime_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub creat: bool,
    pub directory: bool,
    pub excl: bool,
    pub trunc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LookupFlags {
    pub symlink_follow: bool,
}

/// Result of a successful `path_open`: the new FD's numeric handle plus the attributes the
/// dispatcher needs to install it into the FD table.
#[derive(Debug, Clone, Copy)]
pub struct OpenedFile {
    pub inode_id: u64,
    pub filetype: crate::fd_table::FileType,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub filetype: crate::fd_table::FileType,
    pub inode_id: u64,
}

fn unsupported(op: &str) -> Errno {
    log::warn!("{op}: operation not supported by this driver");
    Errno::NoSystem
}

/// Polymorphic capability set a mounted device, stdio stream, pty, or pipe implements (§4.5).
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    fn device_id(&self) -> u32;

    // --- Lifecycle ---
    fn create_stdio_fd(&self, _kind: crate::fd_table::FileType) -> Result<FileDescriptor, Errno> {
        Err(unsupported("create_stdio_fd"))
    }
    async fn fd_close(&self, _inode_id: u64) -> Result<(), Errno> {
        Ok(())
    }

    // --- Metadata ---
    async fn fd_fdstat_get(&self, _inode_id: u64) -> Result<FdFlags, Errno> {
        Err(unsupported("fd_fdstat_get"))
    }
    async fn fd_fdstat_set_flags(&self, _inode_id: u64, _flags: FdFlags) -> Result<(), Errno> {
        Err(unsupported("fd_fdstat_set_flags"))
    }
    async fn fd_filestat_get(&self, _inode_id: u64) -> Result<FileStat, Errno> {
        Err(unsupported("fd_filestat_get"))
    }
    async fn fd_filestat_set_size(&self, _inode_id: u64, _size: u64) -> Result<(), Errno> {
        Err(unsupported("fd_filestat_set_size"))
    }
    /// Stubbed to `no_system` per §9's open question: the source leaves timestamp mutation
    /// unimplemented and this spec preserves that.
    async fn fd_filestat_set_times(&self, _inode_id: u64, _atime_ms: Option<u64>, _mtime_ms: Option<u64>) -> Result<(), Errno> {
        Err(unsupported("fd_filestat_set_times"))
    }
    async fn path_filestat_get(&self, _dir_inode_id: u64, _path: &str) -> Result<FileStat, Errno> {
        Err(unsupported("path_filestat_get"))
    }

    // --- File I/O ---
    async fn fd_read(&self, _inode_id: u64, _cursor: u64, _len: usize) -> Result<Vec<u8>, Errno> {
        Err(unsupported("fd_read"))
    }
    async fn fd_write(&self, _inode_id: u64, _cursor: u64, _data: &[u8], _append: bool) -> Result<usize, Errno> {
        Err(unsupported("fd_write"))
    }
    async fn fd_pread(&self, _inode_id: u64, _offset: u64, _len: usize) -> Result<Vec<u8>, Errno> {
        Err(unsupported("fd_pread"))
    }
    async fn fd_pwrite(&self, _inode_id: u64, _offset: u64, _data: &[u8]) -> Result<usize, Errno> {
        Err(unsupported("fd_pwrite"))
    }
    async fn fd_seek(&self, _inode_id: u64, _cursor: u64, _offset: i64, _whence: Whence) -> Result<u64, Errno> {
        Err(unsupported("fd_seek"))
    }
    async fn fd_tell(&self, _cursor: u64) -> Result<u64, Errno> {
        Err(unsupported("fd_tell"))
    }
    async fn fd_sync(&self, _inode_id: u64) -> Result<(), Errno> {
        Err(unsupported("fd_sync"))
    }
    async fn fd_datasync(&self, _inode_id: u64) -> Result<(), Errno> {
        Err(unsupported("fd_datasync"))
    }
    async fn fd_allocate(&self, _inode_id: u64, _offset: u64, _len: u64) -> Result<(), Errno> {
        Err(unsupported("fd_allocate"))
    }
    async fn fd_advise(&self, _inode_id: u64, _offset: u64, _len: u64, _advice: u8) -> Result<(), Errno> {
        Ok(())
    }

    // --- Directory ---
    async fn fd_readdir(&self, _dir_inode_id: u64) -> Result<Vec<DirEntry>, Errno> {
        Err(unsupported("fd_readdir"))
    }
    async fn path_create_directory(&self, _dir_inode_id: u64, _path: &str) -> Result<(), Errno> {
        Err(unsupported("path_create_directory"))
    }
    async fn path_remove_directory(&self, _dir_inode_id: u64, _path: &str) -> Result<(), Errno> {
        Err(unsupported("path_remove_directory"))
    }
    async fn path_open(
        &self,
        _dir_inode_id: u64,
        _path: &str,
        _oflags: OpenFlags,
        _lookupflags: LookupFlags,
    ) -> Result<OpenedFile, Errno> {
        Err(unsupported("path_open"))
    }
    async fn path_rename(&self, _src_dir: u64, _src_path: &str, _dst_dir: u64, _dst_path: &str) -> Result<(), Errno> {
        Err(unsupported("path_rename"))
    }
    async fn path_unlink_file(&self, _dir_inode_id: u64, _path: &str) -> Result<(), Errno> {
        Err(unsupported("path_unlink_file"))
    }
    async fn path_link(&self, _src_dir: u64, _src_path: &str, _dst_dir: u64, _dst_path: &str) -> Result<(), Errno> {
        Err(unsupported("path_link"))
    }
    async fn path_symlink(&self, _target: &str, _dir_inode_id: u64, _path: &str) -> Result<(), Errno> {
        Err(unsupported("path_symlink"))
    }
    async fn path_readlink(&self, _dir_inode_id: u64, _path: &str) -> Result<String, Errno> {
        Err(unsupported("path_readlink"))
    }

    // --- Prestat ---
    fn fd_prestat_get(&self) -> Option<String> {
        None
    }
    fn fd_prestat_dir_name(&self) -> Option<String> {
        self.fd_prestat_get()
    }

    // --- Polling ---
    /// If absent, poll treats the FD as always ready (§4.5 "optional").
    async fn bytes_available(&self, _inode_id: u64) -> Option<usize> {
        None
    }
}
