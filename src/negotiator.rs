//! File access-mode negotiation.
//!
//! Turns `(path, mode, access, share)` into a [`FileHandle`] whose capability is the
//! intersection of what was requested and what the driver and the file allow:
//!
//! 1. canonicalize the path against the registry's current directory;
//! 2. reject mode/access pairs that can never succeed;
//! 3. reserve the path in the registry (sharing violations stop here, before any
//!    driver call);
//! 4. query attributes: directories are refused, read-only is remembered;
//! 5. open, create, truncate or seek according to the mode;
//! 6. reconcile the driver's stream properties with the request.
//!
//! Any failure after step 3 closes the partially opened stream and releases the
//! reservation before the error is returned.

use std::io::SeekFrom;

use tracing::{debug, warn};

use crate::access::{AccessRequest, FileAccess, OpenMode, ShareMode};
use crate::config::VfsConfig;
use crate::core::{DriverCapability, DriverStream, StorageDriver};
use crate::error::{DriverError, Error, NotFoundKind, Result};
use crate::handle::FileHandle;
use crate::path::{CanonicalPath, canonicalize};
use crate::registry::HandleRegistry;

/// Stateless negotiator over a driver and a registry.
pub struct Negotiator<'a> {
    driver: &'a dyn StorageDriver,
    registry: &'a HandleRegistry,
    config: &'a VfsConfig,
}

struct Opened {
    stream: Box<dyn DriverStream>,
    capability: DriverCapability,
    seek_floor: u64,
}

impl<'a> Negotiator<'a> {
    pub fn new(
        driver: &'a dyn StorageDriver,
        registry: &'a HandleRegistry,
        config: &'a VfsConfig,
    ) -> Self {
        Self {
            driver,
            registry,
            config,
        }
    }

    /// Opens `path` with the given mode, access and share declaration.
    ///
    /// # Errors
    /// * [`Error::Path`] if `path` does not canonicalize.
    /// * [`Error::Argument`] for an empty access set, append without write-only access,
    ///   or a creating/truncating mode without write access.
    /// * [`Error::SharingViolation`] if the registry refuses the reservation.
    /// * [`Error::UnauthorizedAccess`] if a directory sits at `path`, if a read-only file
    ///   would be truncated, or if the requested access exceeds the negotiated one.
    /// * [`Error::AlreadyExists`] / [`Error::NotFound`] per the mode's preconditions.
    pub fn open(
        &self,
        path: &str,
        mode: OpenMode,
        access: FileAccess,
        share: ShareMode,
    ) -> Result<FileHandle> {
        let current_dir = self.registry.current_directory();
        let path = canonicalize(path, &current_dir, &self.config.limits)?;

        let request = AccessRequest::new(access)?;
        request.validate_for(mode)?;

        let reservation = self.registry.reserve(&path, access, share)?;

        match self.negotiate(&path, mode, request) {
            Ok(opened) => {
                debug!(
                    %path,
                    ?mode,
                    can_read = opened.capability.can_read,
                    can_write = opened.capability.can_write,
                    can_seek = opened.capability.can_seek,
                    seek_floor = opened.seek_floor,
                    "file opened"
                );
                Ok(FileHandle::new(
                    path,
                    opened.stream,
                    reservation,
                    opened.capability,
                    opened.seek_floor,
                ))
            }
            Err(err) => {
                debug!(%path, ?mode, error = %err, "open failed");
                drop(reservation);
                Err(err)
            }
        }
    }

    fn negotiate(
        &self,
        path: &CanonicalPath,
        mode: OpenMode,
        request: AccessRequest,
    ) -> Result<Opened> {
        let attributes = self
            .driver
            .attributes(path)
            .map_err(|err| Error::driver(err, path))?;
        let exists = attributes.is_some();
        let is_read_only = attributes.is_some_and(|attrs| attrs.is_read_only());

        if attributes.is_some_and(|attrs| attrs.is_directory()) {
            return Err(Error::unauthorized(path, "a directory exists at this path"));
        }

        match mode {
            OpenMode::CreateNew if exists => return Err(Error::AlreadyExists(path.to_string())),
            OpenMode::Open | OpenMode::Truncate if !exists => {
                return Err(Error::not_found(NotFoundKind::File, path));
            }
            OpenMode::Create | OpenMode::Truncate if is_read_only => {
                return Err(Error::unauthorized(path, "read-only file cannot be truncated"));
            }
            _ => {}
        }

        let mut stream = self
            .driver
            .open(path, self.config.buffer_size)
            .map_err(|err| match err {
                DriverError::NotFound => Error::not_found(
                    NotFoundKind::Directory,
                    path.parent().unwrap_or_else(CanonicalPath::root),
                ),
                err => Error::driver(err, path),
            })?;

        match Self::prepare(stream.as_mut(), path, mode, exists, request, is_read_only) {
            Ok((capability, seek_floor)) => Ok(Opened {
                stream,
                capability,
                seek_floor,
            }),
            Err(err) => {
                if let Err(close_err) = stream.close() {
                    warn!(%path, error = %close_err, "failed to close stream during rollback");
                }
                Err(err)
            }
        }
    }

    /// Applies the mode to a freshly opened stream and reconciles capabilities.
    fn prepare(
        stream: &mut dyn DriverStream,
        path: &CanonicalPath,
        mode: OpenMode,
        exists: bool,
        request: AccessRequest,
        is_read_only: bool,
    ) -> Result<(DriverCapability, u64)> {
        let driver_err = |err| Error::driver(err, path);

        let seek_floor = match mode {
            OpenMode::Create if exists => {
                stream.set_length(0).map_err(driver_err)?;
                0
            }
            OpenMode::Truncate => {
                stream.set_length(0).map_err(driver_err)?;
                0
            }
            OpenMode::Append => stream.seek(SeekFrom::End(0)).map_err(driver_err)?,
            _ => 0,
        };

        let reported = stream.properties();
        let mut capability = DriverCapability {
            can_read: reported.can_read,
            can_write: reported.can_write && !is_read_only,
            can_seek: reported.can_seek,
        };

        if (request.wants_read && !capability.can_read)
            || (request.wants_write && !capability.can_write)
        {
            return Err(Error::unauthorized(
                path,
                "requested access exceeds what the file allows",
            ));
        }

        if !request.wants_write {
            capability.can_write = false;
        } else if !request.wants_read {
            capability.can_read = false;
        }

        Ok((capability, seek_floor))
    }
}
