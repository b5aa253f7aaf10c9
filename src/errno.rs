//! The wire-level result code (§6.5/§7 of the runtime contract).
//!
//! `Errno` is the only thing that ever crosses the shared region as a call outcome: handlers
//! never propagate a payload-carrying error past the dispatcher boundary (see
//! [`crate::host_error`] for the internal error type that *does* carry a payload, up until that
//! boundary collapses it to one of these numbers).

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// POSIX-like result code returned by every call across the shared region.
///
/// Values below 16384 mirror the POSIX `errno` space (see `libc`); values in `16384..32768` are
/// runtime-specific; values `>= 32768` are reserved for callers and never produced by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Errno {
    /// Success. Never actually stored in the wire `errno` field name, but useful as a return
    /// value from driver methods.
    Success = 0,
    PermissionDenied = 1,
    NoEntry = 2,
    NoSuchProcess = 3,
    Interrupted = 4,
    IoError = 5,
    BadFileDescriptor = 9,
    TryAgain = 11,
    OutOfMemory = 12,
    AccessDenied = 13,
    Busy = 16,
    FileExists = 17,
    CrossDeviceLink = 18,
    NoSuchDevice = 19,
    NotADirectory = 20,
    IsADirectory = 21,
    InvalidArgument = 22,
    TooManyOpenFilesInSystem = 23,
    TooManyOpenFiles = 24,
    FileTooBig = 27,
    NoSpaceLeft = 28,
    InvalidSeek = 29,
    ReadOnlyFileSystem = 30,
    TooManyLinks = 31,
    NameTooLong = 36,
    DirectoryNotEmpty = 39,
    NotCapable = 76,
    TimedOut = 73,
    Overflow = 75,
    /// Runtime-specific: something failed in a handler without a more precise errno.
    UnknownError = 16384,
    /// Runtime-specific: a variable-length result could not be re-fetched after a cache miss.
    LazyResultFailed = 16385,
    /// Runtime-specific: `method_id` did not name a known call.
    NoHandlerFound = 16386,
    /// Runtime-specific: the packed parameter block did not match the method's signature.
    InvalidMessageFormat = 16387,
    /// Runtime-specific: asynchronous work attached to the call was canceled before completing.
    Canceled = 16388,
    /// A driver does not implement the requested capability.
    NoSystem = 38,
}

impl Errno {
    /// Numeric value as written into the shared region's `errno` field.
    #[must_use]
    pub fn code(self) -> u16 {
        self.into()
    }

    /// Best-effort mapping from a raw OS `errno` (as seen from [`std::io::Error`]) to our closed
    /// enum. Codes we don't model collapse to [`Errno::UnknownError`].
    #[must_use]
    pub fn from_raw_os_error(raw: i32) -> Self {
        match raw {
            libc::EPERM => Errno::PermissionDenied,
            libc::ENOENT => Errno::NoEntry,
            libc::ESRCH => Errno::NoSuchProcess,
            libc::EINTR => Errno::Interrupted,
            libc::EIO => Errno::IoError,
            libc::EBADF => Errno::BadFileDescriptor,
            libc::EAGAIN => Errno::TryAgain,
            libc::ENOMEM => Errno::OutOfMemory,
            libc::EACCES => Errno::AccessDenied,
            libc::EBUSY => Errno::Busy,
            libc::EEXIST => Errno::FileExists,
            libc::EXDEV => Errno::CrossDeviceLink,
            libc::ENODEV => Errno::NoSuchDevice,
            libc::ENOTDIR => Errno::NotADirectory,
            libc::EISDIR => Errno::IsADirectory,
            libc::EINVAL => Errno::InvalidArgument,
            libc::ENFILE => Errno::TooManyOpenFilesInSystem,
            libc::EMFILE => Errno::TooManyOpenFiles,
            libc::EFBIG => Errno::FileTooBig,
            libc::ENOSPC => Errno::NoSpaceLeft,
            libc::ESPIPE => Errno::InvalidSeek,
            libc::EROFS => Errno::ReadOnlyFileSystem,
            libc::EMLINK => Errno::TooManyLinks,
            libc::ENAMETOOLONG => Errno::NameTooLong,
            libc::ENOTEMPTY => Errno::DirectoryNotEmpty,
            libc::ENOSYS => Errno::NoSystem,
            libc::ETIMEDOUT => Errno::TimedOut,
            libc::EOVERFLOW => Errno::Overflow,
            _ => Errno::UnknownError,
        }
    }

    /// True if this value represents success (i.e. the call completed without error).
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Errno::Success)
    }
}

impl std::fmt::Display for Errno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({})", self.code())
    }
}

impl From<std::io::Error> for Errno {
    fn from(err: std::io::Error) -> Self {
        err.raw_os_error()
            .map(Errno::from_raw_os_error)
            .unwrap_or(Errno::UnknownError)
    }
}
