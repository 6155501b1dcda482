//! This module provides a storage driver that maps to a real directory on the host system.
//!
//! ### Key Features:
//! - **Isolated root**: every canonical path is resolved below a designated root directory.
//! - **State tracking**: remembers which files and directories it created.
//! - **Auto‑cleanup**: optionally removes created artifacts, and the root parents it had to
//!   create, on drop.
//! - **Attributes**: the read-only bit maps to host permissions.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::core::{DirEntry, DriverCapability, DriverStream, FileAttributes, StorageDriver};
use crate::error::{DriverError, DriverResult};
use crate::path::{CanonicalPath, SEPARATOR};

/// `rename(2)` across mount points.
const EXDEV: i32 = 18;

/// A storage driver rooted at a directory of the host file system.
///
/// Canonical paths map segment by segment below `root`; server paths are refused.
/// Name matching follows the host, so on most Unix systems it is case-sensitive.
///
/// ### Usage notes:
/// - Symlinks are not followed by `delete`; the link itself is removed.
/// - Ensure `root` is writable; `new` checks it.
/// - A rename the host refuses with `EXDEV` is reported as unsupported (`Ok(false)`), so
///   callers fall back to copy and delete.
///
/// ### Example:
/// ```no_run
/// use std::sync::Arc;
/// use vfs_access::{DirFS, Vfs};
///
/// let root = std::env::temp_dir().join("my_vfs");
/// let vfs = Vfs::new(Arc::new(DirFS::new(root).unwrap()));
/// vfs.create_directory("\\docs").unwrap();
/// vfs.write_all_bytes("\\docs\\note.txt", b"Hello").unwrap();
/// assert!(vfs.file_exists("\\docs\\note.txt"));
/// ```
pub struct DirFS {
    root: PathBuf,                      // host-related absolute path
    created: Mutex<BTreeSet<PathBuf>>,  // host-related absolute paths
    created_root_parents: Vec<PathBuf>, // host-related absolute paths
    is_auto_clean: bool,
}

impl DirFS {
    /// Creates a new driver with the root directory at `root`.
    ///
    /// `root` must be an absolute host path. Missing directories on the way are created and
    /// remembered. By default, the `is_auto_clean` flag is set to `true`.
    pub fn new<P: AsRef<Path>>(root: P) -> DriverResult<Self> {
        let root = root.as_ref();

        if root.as_os_str().is_empty() || root.is_relative() {
            return Err(invalid_input("the root path must be absolute"));
        }
        if root.exists() && !root.is_dir() {
            return Err(DriverError::Io(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", root.display()),
            )));
        }

        let mut created_root_parents = Vec::new();
        if !root.exists() {
            created_root_parents.extend(Self::mkdir_all(root)?);
        }
        let root = root.canonicalize()?;

        if !Self::check_permissions(&root) {
            return Err(DriverError::AccessDenied);
        }

        Ok(Self {
            root,
            created: Mutex::new(BTreeSet::new()),
            created_root_parents,
            is_auto_clean: true,
        })
    }

    /// Returns the host root.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Changes auto-clean flag.
    /// If auto-clean flag is true, everything created through this driver is removed on drop.
    pub fn set_auto_clean(&mut self, clean: bool) {
        self.is_auto_clean = clean;
    }

    /// Maps a canonical path to the host.
    pub fn to_host(&self, path: &CanonicalPath) -> DriverResult<PathBuf> {
        if path.is_server() {
            return Err(DriverError::AccessDenied);
        }
        let mut host = self.root.clone();
        host.extend(path.as_str().split(SEPARATOR).filter(|s| !s.is_empty()));
        Ok(host)
    }

    /// Make directories recursively.
    /// * `path` is an absolute host path.
    /// Returns vector of created directories.
    fn mkdir_all(path: &Path) -> DriverResult<Vec<PathBuf>> {
        let mut created = Vec::new();
        let mut built = PathBuf::new();
        for component in path.components() {
            built.push(component);
            if built.exists() {
                if !built.is_dir() {
                    return Err(DriverError::AlreadyExists);
                }
                continue;
            }
            std::fs::create_dir(&built)?;
            created.push(built.clone());
        }
        Ok(created)
    }

    fn check_permissions(path: &Path) -> bool {
        let filename = path.join(".access");
        std::fs::write(&filename, b"check").is_ok() && std::fs::remove_file(filename).is_ok()
    }

    fn attributes_of(metadata: &std::fs::Metadata) -> FileAttributes {
        let mut attributes = if metadata.is_dir() {
            FileAttributes::DIRECTORY
        } else {
            FileAttributes::ARCHIVE
        };
        if metadata.permissions().readonly() {
            attributes |= FileAttributes::READ_ONLY;
        }
        attributes
    }

    /// Removes all artifacts created through this driver, deepest first.
    fn cleanup(&mut self) -> bool {
        let mut is_ok = true;
        let created = std::mem::take(self.created.get_mut());
        for host in created.iter().rev() {
            let result = if host.is_dir() {
                std::fs::remove_dir_all(host)
            } else {
                std::fs::remove_file(host)
            };
            match result {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    is_ok = false;
                    warn!(path = %host.display(), error = %err, "unable to remove");
                }
            }
        }
        is_ok
    }
}

fn invalid_input(message: &'static str) -> DriverError {
    DriverError::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
}

impl StorageDriver for DirFS {
    fn open(&self, path: &CanonicalPath, _buffer_size: usize) -> DriverResult<Box<dyn DriverStream>> {
        let host = self.to_host(path)?;
        if host.is_dir() {
            return Err(DriverError::AccessDenied);
        }
        let existed = host.exists();

        let (file, can_write) = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&host)
        {
            Ok(file) => (file, true),
            Err(err) if existed && err.kind() == io::ErrorKind::PermissionDenied => {
                (File::open(&host)?, false)
            }
            Err(err) => return Err(err.into()),
        };

        if !existed {
            self.created.lock().insert(host);
            trace!(%path, "file created");
        }
        Ok(Box::new(DirStream { file, can_write }))
    }

    fn attributes(&self, path: &CanonicalPath) -> DriverResult<Option<FileAttributes>> {
        let host = self.to_host(path)?;
        match std::fs::metadata(&host) {
            Ok(metadata) => Ok(Some(Self::attributes_of(&metadata))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_attributes(&self, path: &CanonicalPath, attributes: FileAttributes) -> DriverResult<()> {
        let host = self.to_host(path)?;
        let mut permissions = std::fs::metadata(&host)?.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(attributes.is_read_only());
        std::fs::set_permissions(&host, permissions)?;
        Ok(())
    }

    fn delete(&self, path: &CanonicalPath) -> DriverResult<()> {
        if path.is_root() {
            return Err(DriverError::AccessDenied);
        }
        let host = self.to_host(path)?;
        if std::fs::symlink_metadata(&host)?.is_dir() {
            std::fs::remove_dir(&host)?;
        } else {
            std::fs::remove_file(&host)?;
        }
        self.created.lock().remove(&host);
        trace!(%path, "entry deleted");
        Ok(())
    }

    fn create_directory(&self, path: &CanonicalPath) -> DriverResult<()> {
        let host = self.to_host(path)?;
        std::fs::create_dir(&host)?;
        self.created.lock().insert(host);
        trace!(%path, "directory created");
        Ok(())
    }

    fn rename(&self, src: &CanonicalPath, dst: &CanonicalPath) -> DriverResult<bool> {
        let src_host = self.to_host(src)?;
        let dst_host = self.to_host(dst)?;
        if !src_host.exists() {
            return Err(DriverError::NotFound);
        }
        if dst_host.exists() {
            return Err(DriverError::AlreadyExists);
        }

        match std::fs::rename(&src_host, &dst_host) {
            Ok(()) => {}
            Err(err) if err.raw_os_error() == Some(EXDEV) => {
                trace!(%src, %dst, "rename crosses devices");
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        }

        let mut created = self.created.lock();
        let moved: Vec<PathBuf> = created
            .iter()
            .filter(|p| p.starts_with(&src_host))
            .cloned()
            .collect();
        for old in moved {
            created.remove(&old);
            if let Ok(rest) = old.strip_prefix(&src_host) {
                created.insert(dst_host.join(rest));
            }
        }
        trace!(%src, %dst, "entry renamed");
        Ok(true)
    }

    fn read_dir(&self, path: &CanonicalPath) -> DriverResult<Vec<DirEntry>> {
        let host = self.to_host(path)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&host)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy(),
                Self::attributes_of(&metadata),
            ));
        }
        Ok(entries)
    }
}

impl Drop for DirFS {
    fn drop(&mut self) {
        if !self.is_auto_clean {
            return;
        }

        self.cleanup();

        let errors: Vec<_> = self
            .created_root_parents
            .iter()
            .rev()
            .filter_map(|p| std::fs::remove_dir_all(p).err())
            .collect();
        if !errors.is_empty() {
            warn!(?errors, "failed to remove root parents");
        }

        self.created_root_parents.clear();
    }
}

struct DirStream {
    file: File,
    can_write: bool,
}

impl DriverStream for DirStream {
    fn read(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        Ok(self.file.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> DriverResult<usize> {
        if !self.can_write {
            return Err(DriverError::AccessDenied);
        }
        Ok(self.file.write(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> DriverResult<u64> {
        Ok(self.file.seek(pos)?)
    }

    fn set_length(&mut self, len: u64) -> DriverResult<()> {
        if !self.can_write {
            return Err(DriverError::AccessDenied);
        }
        Ok(self.file.set_len(len)?)
    }

    fn length(&mut self) -> DriverResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn flush(&mut self) -> DriverResult<()> {
        Ok(self.file.flush()?)
    }

    fn close(mut self: Box<Self>) -> DriverResult<()> {
        Ok(self.file.flush()?)
    }

    fn properties(&self) -> DriverCapability {
        DriverCapability {
            can_read: true,
            can_write: self.can_write,
            can_seek: true,
        }
    }
}
