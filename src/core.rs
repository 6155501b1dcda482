//! Contract of the storage driver this layer sits on.
//!
//! A driver performs the physical work (block I/O, directory bookkeeping) and knows
//! nothing about sharing, access modes or path syntax: every path it receives is a
//! [`CanonicalPath`] already validated and reserved by the caller.

use std::io::SeekFrom;

use bitflags::bitflags;

use crate::error::DriverResult;
use crate::path::CanonicalPath;

bitflags! {
    /// Attribute bits reported by a driver (FAT layout).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READ_ONLY = 0x01;
        const HIDDEN = 0x02;
        const SYSTEM = 0x04;
        const DIRECTORY = 0x10;
        const ARCHIVE = 0x20;
        const NORMAL = 0x80;
    }
}

impl FileAttributes {
    pub fn is_directory(&self) -> bool {
        self.contains(FileAttributes::DIRECTORY)
    }

    pub fn is_read_only(&self) -> bool {
        self.contains(FileAttributes::READ_ONLY)
    }
}

/// What an opened stream can physically do, independent of what was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverCapability {
    pub can_read: bool,
    pub can_write: bool,
    pub can_seek: bool,
}

impl DriverCapability {
    pub const FULL: DriverCapability = DriverCapability {
        can_read: true,
        can_write: true,
        can_seek: true,
    };
}

impl Default for DriverCapability {
    fn default() -> Self {
        Self::FULL
    }
}

/// A single child reported by [`StorageDriver::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: String,
    attributes: FileAttributes,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, attributes: FileAttributes) -> DirEntry {
        DirEntry {
            name: name.into(),
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    pub fn is_dir(&self) -> bool {
        self.attributes.is_directory()
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }
}

/// An open stream on a driver file. Calls are blocking.
pub trait DriverStream: Send {
    fn read(&mut self, buf: &mut [u8]) -> DriverResult<usize>;

    /// May transfer fewer bytes than requested; zero means no progress.
    fn write(&mut self, buf: &[u8]) -> DriverResult<usize>;

    fn seek(&mut self, pos: SeekFrom) -> DriverResult<u64>;

    fn set_length(&mut self, len: u64) -> DriverResult<()>;

    fn length(&mut self) -> DriverResult<u64>;

    fn flush(&mut self) -> DriverResult<()>;

    fn close(self: Box<Self>) -> DriverResult<()>;

    fn properties(&self) -> DriverCapability;
}

/// A synchronous storage driver.
pub trait StorageDriver: Send + Sync {
    /// Opens `path`, creating an empty file if it does not exist yet.
    /// The parent directory must exist.
    fn open(&self, path: &CanonicalPath, buffer_size: usize) -> DriverResult<Box<dyn DriverStream>>;

    /// `Ok(None)` when nothing exists at `path`.
    fn attributes(&self, path: &CanonicalPath) -> DriverResult<Option<FileAttributes>>;

    /// The directory bit cannot be changed through this call.
    fn set_attributes(&self, path: &CanonicalPath, attributes: FileAttributes) -> DriverResult<()>;

    /// Removes a file or an empty directory.
    fn delete(&self, path: &CanonicalPath) -> DriverResult<()>;

    /// Creates a single directory; the parent must exist.
    fn create_directory(&self, path: &CanonicalPath) -> DriverResult<()>;

    /// Renames `src` to `dst`. `Ok(false)` means the driver cannot do it (e.g. across
    /// volumes) and the caller must fall back to copy and delete.
    fn rename(&self, src: &CanonicalPath, dst: &CanonicalPath) -> DriverResult<bool>;

    /// Immediate children of a directory.
    fn read_dir(&self, path: &CanonicalPath) -> DriverResult<Vec<DirEntry>>;
}
