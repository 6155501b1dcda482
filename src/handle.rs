//! Handles returned by a successful negotiation.

use std::io::SeekFrom;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::core::{DriverCapability, DriverStream};
use crate::error::{DriverError, Error, Result};
use crate::path::CanonicalPath;
use crate::registry::Reservation;

/// An open file.
///
/// Owns the driver stream and the registry reservation of its path and releases both,
/// stream first, on [`close`](FileHandle::close) or drop. Every operation is bounded by
/// the negotiated capability; operations on one handle are serialized by a
/// handle-scoped lock, so a handle may be shared between threads.
pub struct FileHandle {
    path: CanonicalPath,
    can_read: bool,
    can_write: bool,
    can_seek: bool,
    seek_floor: u64,
    stream: Mutex<Option<Box<dyn DriverStream>>>,
    reservation: Option<Reservation>,
}

impl FileHandle {
    pub(crate) fn new(
        path: CanonicalPath,
        stream: Box<dyn DriverStream>,
        reservation: Reservation,
        capability: DriverCapability,
        seek_floor: u64,
    ) -> Self {
        Self {
            path,
            can_read: capability.can_read,
            can_write: capability.can_write,
            can_seek: capability.can_seek,
            seek_floor,
            stream: Mutex::new(Some(stream)),
            reservation: Some(reservation),
        }
    }

    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }

    pub fn can_read(&self) -> bool {
        self.can_read
    }

    pub fn can_write(&self) -> bool {
        self.can_write
    }

    pub fn can_seek(&self) -> bool {
        self.can_seek
    }

    /// Lowest offset this handle may be positioned at; non-zero only in append mode.
    pub fn seek_floor(&self) -> u64 {
        self.seek_floor
    }

    fn with_stream<T>(
        &self,
        f: impl FnOnce(&mut dyn DriverStream) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.stream.lock();
        match guard.as_mut() {
            Some(stream) => f(stream.as_mut()),
            None => Err(Error::io(&self.path, "handle is closed")),
        }
    }

    fn driver_err(&self) -> impl Fn(DriverError) -> Error + '_ {
        move |err| Error::driver(err, &self.path)
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.can_read {
            return Err(Error::NotSupported("read"));
        }
        self.with_stream(|stream| stream.read(buf).map_err(self.driver_err()))
    }

    /// Writes all of `buf`.
    ///
    /// # Errors
    /// [`Error::Io`] if the driver reports zero bytes written before `buf` is drained.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        if !self.can_write {
            return Err(Error::NotSupported("write"));
        }
        self.with_stream(|stream| {
            let mut remaining = buf;
            while !remaining.is_empty() {
                let written = stream.write(remaining).map_err(self.driver_err())?;
                if written == 0 {
                    return Err(Error::io(&self.path, "write made no progress"));
                }
                remaining = &remaining[written.min(remaining.len())..];
            }
            Ok(())
        })
    }

    /// Moves the position; a target below the seek floor is refused and the previous
    /// position kept.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        if !self.can_seek {
            return Err(Error::NotSupported("seek"));
        }
        self.with_stream(|stream| {
            let old = stream.seek(SeekFrom::Current(0)).map_err(self.driver_err())?;
            let new = stream.seek(pos).map_err(self.driver_err())?;
            if new < self.seek_floor {
                stream.seek(SeekFrom::Start(old)).map_err(self.driver_err())?;
                return Err(Error::io(&self.path, "seek before the append floor"));
            }
            Ok(new)
        })
    }

    pub fn position(&self) -> Result<u64> {
        if !self.can_seek {
            return Err(Error::NotSupported("position"));
        }
        self.with_stream(|stream| stream.seek(SeekFrom::Current(0)).map_err(self.driver_err()))
    }

    pub fn set_position(&self, position: u64) -> Result<()> {
        if !self.can_seek {
            return Err(Error::NotSupported("set position"));
        }
        if position < self.seek_floor {
            return Err(Error::io(&self.path, "position before the append floor"));
        }
        self.with_stream(|stream| {
            stream
                .seek(SeekFrom::Start(position))
                .map(|_| ())
                .map_err(self.driver_err())
        })
    }

    pub fn len(&self) -> Result<u64> {
        if !self.can_seek {
            return Err(Error::NotSupported("length"));
        }
        self.with_stream(|stream| stream.length().map_err(self.driver_err()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        if !self.can_write || !self.can_seek {
            return Err(Error::NotSupported("set length"));
        }
        self.with_stream(|stream| stream.set_length(len).map_err(self.driver_err()))
    }

    pub fn flush(&self) -> Result<()> {
        self.with_stream(|stream| stream.flush().map_err(self.driver_err()))
    }

    /// Closes the driver stream, then releases the reservation.
    ///
    /// The reservation is released even when the driver fails to close.
    pub fn close(mut self) -> Result<()> {
        let path = self.path.clone();
        self.release().map_err(|err| Error::driver(err, &path))
    }

    fn release(&mut self) -> std::result::Result<(), DriverError> {
        let stream = self.stream.get_mut().take();
        let result = match stream {
            Some(stream) => stream.close(),
            None => Ok(()),
        };
        if self.reservation.take().is_some() {
            trace!(path = %self.path, "handle released");
        }
        result
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(path = %self.path, error = %err, "failed to close driver stream");
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .field("can_read", &self.can_read)
            .field("can_write", &self.can_write)
            .field("can_seek", &self.can_seek)
            .field("seek_floor", &self.seek_floor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::access::{FileAccess, OpenMode, ShareMode};
    use crate::config::VfsConfig;
    use crate::negotiator::Negotiator;
    use crate::registry::HandleRegistry;
    use crate::vfs::MapFS;

    fn open_with(driver: &MapFS, registry: &HandleRegistry, mode: OpenMode, access: FileAccess) -> FileHandle {
        let config = VfsConfig::default();
        Negotiator::new(driver, registry, &config)
            .open("\\file.bin", mode, access, ShareMode::NONE)
            .unwrap()
    }

    #[test]
    fn test_write_then_read_back() {
        let driver = MapFS::new();
        let registry = HandleRegistry::new();
        let handle = open_with(&driver, &registry, OpenMode::CreateNew, FileAccess::READ_WRITE);

        handle.write(b"hello world").unwrap();
        assert_eq!(handle.position().unwrap(), 11);
        assert_eq!(handle.len().unwrap(), 11);

        handle.set_position(6).unwrap();
        let mut buf = [0u8; 16];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"world");

        handle.set_len(5).unwrap();
        assert_eq!(handle.len().unwrap(), 5);
        handle.flush().unwrap();
        assert!(!handle.is_empty().unwrap());
    }

    #[test]
    fn test_write_drains_short_transfers() {
        let mut driver = MapFS::new();
        driver.set_max_transfer(Some(2));
        let registry = HandleRegistry::new();
        let handle = open_with(&driver, &registry, OpenMode::Create, FileAccess::READ_WRITE);

        handle.write(b"abcdefg").unwrap();
        assert_eq!(handle.len().unwrap(), 7);
    }

    #[test]
    fn test_stalled_write_is_an_error() {
        let mut driver = MapFS::new();
        driver.set_max_transfer(Some(0));
        let registry = HandleRegistry::new();
        let handle = open_with(&driver, &registry, OpenMode::Create, FileAccess::WRITE);

        assert!(matches!(handle.write(b"abc"), Err(Error::Io { .. })));
        handle.write(b"").unwrap();
    }

    #[test]
    fn test_close_releases_stream_and_reservation() {
        let driver = MapFS::new();
        let registry = HandleRegistry::new();
        let handle = open_with(&driver, &registry, OpenMode::OpenOrCreate, FileAccess::READ_WRITE);
        assert_eq!(driver.open_streams(), 1);
        assert_eq!(registry.total_reservations(), 1);

        handle.close().unwrap();
        assert_eq!(driver.open_streams(), 0);
        assert_eq!(registry.total_reservations(), 0);

        // the path can be claimed exclusively again
        let again = open_with(&driver, &registry, OpenMode::Open, FileAccess::READ_WRITE);
        drop(again);
        assert_eq!(registry.total_reservations(), 0);
        assert_eq!(driver.open_streams(), 0);
    }

    #[test]
    fn test_set_len_needs_write() {
        let driver = MapFS::new();
        let registry = HandleRegistry::new();
        open_with(&driver, &registry, OpenMode::CreateNew, FileAccess::WRITE)
            .close()
            .unwrap();
        let reader = open_with(&driver, &registry, OpenMode::Open, FileAccess::READ);
        assert!(matches!(reader.set_len(0), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_concurrent_writes_do_not_interleave() {
        let driver = MapFS::new();
        let registry = HandleRegistry::new();
        let handle = Arc::new(open_with(&driver, &registry, OpenMode::CreateNew, FileAccess::READ_WRITE));

        std::thread::scope(|s| {
            for byte in [b'a', b'b', b'c', b'd'] {
                let handle = Arc::clone(&handle);
                s.spawn(move || handle.write(&[byte; 64]).unwrap());
            }
        });

        assert_eq!(handle.len().unwrap(), 256);
        handle.set_position(0).unwrap();
        let mut buf = vec![0u8; 256];
        assert_eq!(handle.read(&mut buf).unwrap(), 256);
        for chunk in buf.chunks(64) {
            assert!(chunk.iter().all(|&b| b == chunk[0]));
        }
    }
}
