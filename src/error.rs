//! Error taxonomy of the access layer.

use std::fmt;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a path string fails canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path contains reserved character {0:?}")]
    ReservedCharacter(char),

    #[error("malformed path root")]
    MalformedRoot,

    #[error("path too long")]
    TooLong,

    #[error("volume name too long")]
    VolumeNameTooLong,

    #[error("path ascends past the root")]
    AscendPastRoot,

    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),

    /// Search patterns may not contain separators.
    #[error("search pattern must be a single segment")]
    InvalidPattern,
}

/// Errors reported by a [`StorageDriver`](crate::StorageDriver) or its streams.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("access denied")]
    AccessDenied,

    #[error("operation not supported by the driver")]
    Unsupported,

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => DriverError::NotFound,
            io::ErrorKind::AlreadyExists => DriverError::AlreadyExists,
            io::ErrorKind::DirectoryNotEmpty => DriverError::DirectoryNotEmpty,
            io::ErrorKind::PermissionDenied => DriverError::AccessDenied,
            io::ErrorKind::Unsupported => DriverError::Unsupported,
            _ => DriverError::Io(err),
        }
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// What kind of entry a lookup expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    File,
    Directory,
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundKind::File => f.write_str("file"),
            NotFoundKind::Directory => f.write_str("directory"),
        }
    }
}

/// Errors surfaced by every public operation of the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    /// Invalid mode/access/share combination or an out-of-range flag value.
    #[error("invalid argument: {0}")]
    Argument(&'static str),

    #[error("{kind} not found: {path}")]
    NotFound { kind: NotFoundKind, path: String },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("access to {path} denied: {reason}")]
    UnauthorizedAccess { path: String, reason: &'static str },

    /// The open-handle registry refused a reservation.
    #[error("sharing violation on {0}")]
    SharingViolation(String),

    #[error("directory {0} is not empty")]
    DirectoryNotEmpty(String),

    #[error("{0} is not supported by this handle")]
    NotSupported(&'static str),

    #[error("I/O error on {path}: {message}")]
    Io {
        path: String,
        message: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl Error {
    pub(crate) fn unauthorized(path: impl fmt::Display, reason: &'static str) -> Self {
        Error::UnauthorizedAccess {
            path: path.to_string(),
            reason,
        }
    }

    pub(crate) fn not_found(kind: NotFoundKind, path: impl fmt::Display) -> Self {
        Error::NotFound {
            kind,
            path: path.to_string(),
        }
    }

    pub(crate) fn io(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Io {
            path: path.to_string(),
            message: message.into(),
            source: None,
        }
    }

    /// Lifts a driver error into the crate taxonomy, attaching the path it concerns.
    pub(crate) fn driver(err: DriverError, path: impl fmt::Display) -> Self {
        let path = path.to_string();
        match err {
            DriverError::NotFound => Error::NotFound {
                kind: NotFoundKind::File,
                path,
            },
            DriverError::AlreadyExists => Error::AlreadyExists(path),
            DriverError::DirectoryNotEmpty => Error::DirectoryNotEmpty(path),
            DriverError::AccessDenied => Error::UnauthorizedAccess {
                path,
                reason: "denied by the storage driver",
            },
            DriverError::Unsupported => Error::NotSupported("driver operation"),
            DriverError::Io(source) => Error::Io {
                path,
                message: source.to_string(),
                source: Some(source),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds_are_mapped() {
        let err: DriverError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(err, DriverError::NotFound));

        let err: DriverError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, DriverError::AccessDenied));

        let err: DriverError = io::Error::other("disk on fire").into();
        assert!(matches!(err, DriverError::Io(_)));
    }

    #[test]
    fn test_driver_error_carries_path() {
        let err = Error::driver(DriverError::AlreadyExists, "\\sd\\a.txt");
        assert!(matches!(&err, Error::AlreadyExists(p) if p == "\\sd\\a.txt"));
        assert_eq!(err.to_string(), "\\sd\\a.txt already exists");

        let err = Error::driver(DriverError::NotFound, "\\sd\\b.txt");
        assert!(matches!(
            err,
            Error::NotFound {
                kind: NotFoundKind::File,
                ..
            }
        ));
    }

    #[test]
    fn test_path_error_converts() {
        let err: Error = PathError::AscendPastRoot.into();
        assert!(matches!(err, Error::Path(PathError::AscendPastRoot)));
        assert_eq!(err.to_string(), "invalid path: path ascends past the root");
    }
}
