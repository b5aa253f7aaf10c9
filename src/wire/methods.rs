//! The dense, versioned `method_id` space (§6.1).
//!
//! `method_id` is a `u32` in `0..=N-1`; an id outside that range (or one the dispatcher has no
//! handler for) produces `no_handler_found` without reading any further bytes. Sockets are an
//! explicit non-goal, so `sock_*` preview-1 calls are intentionally absent.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum MethodId {
    ArgsGet = 0,
    ArgsSizesGet = 1,
    EnvironGet = 2,
    EnvironSizesGet = 3,

    ClockResGet = 4,
    ClockTimeGet = 5,

    FdAdvise = 6,
    FdAllocate = 7,
    FdClose = 8,
    FdDatasync = 9,
    FdFdstatGet = 10,
    FdFdstatSetFlags = 11,
    FdFdstatSetRights = 12,
    FdFilestatGet = 13,
    FdFilestatSetSize = 14,
    FdFilestatSetTimes = 15,
    FdPread = 16,
    FdPrestatGet = 17,
    FdPrestatDirName = 18,
    FdPwrite = 19,
    FdRead = 20,
    FdReaddir = 21,
    FdRenumber = 22,
    FdSeek = 23,
    FdSync = 24,
    FdTell = 25,
    FdWrite = 26,

    PathCreateDirectory = 27,
    PathFilestatGet = 28,
    PathFilestatSetTimes = 29,
    PathLink = 30,
    PathOpen = 31,
    PathReadlink = 32,
    PathRemoveDirectory = 33,
    PathRename = 34,
    PathSymlink = 35,
    PathUnlinkFile = 36,

    PollOneoff = 37,

    ProcExit = 38,
    SchedYield = 39,

    RandomGet = 40,

    ThreadSpawn = 41,

    Noop = 42,
}

impl MethodId {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            MethodId::ArgsGet => "args_get",
            MethodId::ArgsSizesGet => "args_sizes_get",
            MethodId::EnvironGet => "environ_get",
            MethodId::EnvironSizesGet => "environ_sizes_get",
            MethodId::ClockResGet => "clock_res_get",
            MethodId::ClockTimeGet => "clock_time_get",
            MethodId::FdAdvise => "fd_advise",
            MethodId::FdAllocate => "fd_allocate",
            MethodId::FdClose => "fd_close",
            MethodId::FdDatasync => "fd_datasync",
            MethodId::FdFdstatGet => "fd_fdstat_get",
            MethodId::FdFdstatSetFlags => "fd_fdstat_set_flags",
            MethodId::FdFdstatSetRights => "fd_fdstat_set_rights",
            MethodId::FdFilestatGet => "fd_filestat_get",
            MethodId::FdFilestatSetSize => "fd_filestat_set_size",
            MethodId::FdFilestatSetTimes => "fd_filestat_set_times",
            MethodId::FdPread => "fd_pread",
            MethodId::FdPrestatGet => "fd_prestat_get",
            MethodId::FdPrestatDirName => "fd_prestat_dir_name",
            MethodId::FdPwrite => "fd_pwrite",
            MethodId::FdRead => "fd_read",
            MethodId::FdReaddir => "fd_readdir",
            MethodId::FdRenumber => "fd_renumber",
            MethodId::FdSeek => "fd_seek",
            MethodId::FdSync => "fd_sync",
            MethodId::FdTell => "fd_tell",
            MethodId::FdWrite => "fd_write",
            MethodId::PathCreateDirectory => "path_create_directory",
            MethodId::PathFilestatGet => "path_filestat_get",
            MethodId::PathFilestatSetTimes => "path_filestat_set_times",
            MethodId::PathLink => "path_link",
            MethodId::PathOpen => "path_open",
            MethodId::PathReadlink => "path_readlink",
            MethodId::PathRemoveDirectory => "path_remove_directory",
            MethodId::PathRename => "path_rename",
            MethodId::PathSymlink => "path_symlink",
            MethodId::PathUnlinkFile => "path_unlink_file",
            MethodId::PollOneoff => "poll_oneoff",
            MethodId::ProcExit => "proc_exit",
            MethodId::SchedYield => "sched_yield",
            MethodId::RandomGet => "random_get",
            MethodId::ThreadSpawn => "thread_spawn",
            MethodId::Noop => "noop",
        }
    }

    /// True for operations whose handler may legitimately suspend on host I/O, and which the
    /// dispatcher therefore awaits cooperatively rather than resolving synchronously in-line
    /// (§4.3, §5).
    #[must_use]
    pub fn is_asynchronous(self) -> bool {
        matches!(
            self,
            MethodId::FdRead
                | MethodId::FdWrite
                | MethodId::FdPread
                | MethodId::FdPwrite
                | MethodId::FdReaddir
                | MethodId::FdSync
                | MethodId::FdDatasync
                | MethodId::FdFilestatGet
                | MethodId::FdFilestatSetSize
                | MethodId::PathOpen
                | MethodId::PathCreateDirectory
                | MethodId::PathRemoveDirectory
                | MethodId::PathRename
                | MethodId::PathUnlinkFile
                | MethodId::PathFilestatGet
                | MethodId::PollOneoff
        )
    }
}
