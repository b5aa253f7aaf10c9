//! The internal, payload-carrying error type (§9 "Exceptions for control flow").
//!
//! `HostError` exists only inside a handler's call stack. The dispatcher boundary is the last
//! place an error-kind may appear before it collapses to a wire [`Errno`] — nothing downstream of
//! [`crate::dispatcher`] ever sees a `HostError` again.

use thiserror::Error;

use crate::errno::Errno;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no entry at {path}")]
    NoEntry { path: String },
    #[error("{path} already exists")]
    AlreadyExists { path: String },
    #[error("{path} is not a directory")]
    NotADirectory { path: String },
    #[error("{path} is a directory")]
    IsADirectory { path: String },
    #[error("directory {path} is not empty")]
    DirectoryNotEmpty { path: String },
    #[error("fd {fd} is not capable of the requested operation")]
    NotCapable { fd: u32 },
    #[error("fd {fd} is not open")]
    BadFileDescriptor { fd: u32 },
    #[error("host adapter I/O failure: {0}")]
    HostIo(#[from] std::io::Error),
    #[error("handler canceled before completion")]
    Canceled,
    #[error("wire errno {0}")]
    Wire(Errno),
    #[error("unexpected failure: {0}")]
    Other(String),
}

impl HostError {
    /// Collapses this error to the wire-level outcome written into the call region (§3, §6.5).
    #[must_use]
    pub fn to_errno(&self) -> Errno {
        match self {
            HostError::NoEntry { .. } => Errno::NoEntry,
            HostError::AlreadyExists { .. } => Errno::FileExists,
            HostError::NotADirectory { .. } => Errno::NotADirectory,
            HostError::IsADirectory { .. } => Errno::IsADirectory,
            HostError::DirectoryNotEmpty { .. } => Errno::DirectoryNotEmpty,
            HostError::NotCapable { .. } => Errno::NotCapable,
            HostError::BadFileDescriptor { .. } => Errno::BadFileDescriptor,
            HostError::HostIo(err) => Errno::from(std::io::Error::from(err.kind())),
            HostError::Canceled => Errno::Canceled,
            HostError::Wire(errno) => *errno,
            HostError::Other(_) => Errno::UnknownError,
        }
    }
}

impl From<Errno> for HostError {
    fn from(errno: Errno) -> Self {
        HostError::Wire(errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_to_the_expected_errno() {
        let err = HostError::DirectoryNotEmpty { path: "/a".into() };
        assert_eq!(err.to_errno(), Errno::DirectoryNotEmpty);
    }

    #[test]
    fn wraps_a_wire_errno_round_trip() {
        let err: HostError = Errno::NotCapable.into();
        assert_eq!(err.to_errno(), Errno::NotCapable);
    }
}
