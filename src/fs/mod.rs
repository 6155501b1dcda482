//! The file-system facade.
//!
//! [`Vfs`] ties a storage driver to one [`HandleRegistry`] and exposes the desktop-style
//! file and directory operations. Every operation canonicalizes its inputs against the
//! registry's current directory and claims the paths it touches before calling the
//! driver, so a file open elsewhere with a narrow share mode cannot be deleted, moved or
//! overwritten underneath its handle.

mod dir;
mod file;
mod pattern;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::access::{FileAccess, OpenMode, ShareMode};
use crate::config::VfsConfig;
use crate::core::{DriverStream, FileAttributes, StorageDriver};
use crate::error::{Error, NotFoundKind, Result};
use crate::handle::FileHandle;
use crate::negotiator::Negotiator;
use crate::path::{CanonicalPath, canonicalize};
use crate::registry::HandleRegistry;

/// A mounted volume: a driver, its registry and the configuration both are used with.
pub struct Vfs {
    driver: Arc<dyn StorageDriver>,
    registry: HandleRegistry,
    config: VfsConfig,
}

impl Vfs {
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        Self::with_config(driver, VfsConfig::default())
    }

    pub fn with_config(driver: Arc<dyn StorageDriver>, config: VfsConfig) -> Self {
        Self {
            driver,
            registry: HandleRegistry::with_case_sensitivity(config.case_sensitive),
            config,
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn driver(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }

    /// Resolves `path` against the current directory.
    pub fn get_full_path(&self, path: &str) -> Result<CanonicalPath> {
        let current_dir = self.registry.current_directory();
        Ok(canonicalize(path, &current_dir, &self.config.limits)?)
    }

    pub fn current_directory(&self) -> CanonicalPath {
        self.registry.current_directory()
    }

    /// Changes the current directory.
    ///
    /// # Errors
    /// [`Error::NotFound`] if no directory exists at `path`, [`Error::SharingViolation`] if
    /// the directory is locked.
    pub fn set_current_directory(&self, path: &str) -> Result<()> {
        let dir = self.get_full_path(path)?;
        let _reservation = self.registry.reserve_for_read(&dir)?;
        self.require_directory(&dir)?;
        self.registry.set_current_directory(&dir)
    }

    fn negotiator(&self) -> Negotiator<'_> {
        Negotiator::new(self.driver.as_ref(), &self.registry, &self.config)
    }

    /// Opens a file; see [`Negotiator::open`].
    pub fn open(
        &self,
        path: &str,
        mode: OpenMode,
        access: FileAccess,
        share: ShareMode,
    ) -> Result<FileHandle> {
        self.negotiator().open(path, mode, access, share)
    }

    /// Opens an existing file for reading, sharing it with other readers.
    pub fn open_read(&self, path: &str) -> Result<FileHandle> {
        self.open(path, OpenMode::Open, FileAccess::READ, ShareMode::READ)
    }

    /// Opens or creates a file for exclusive writing.
    pub fn open_write(&self, path: &str) -> Result<FileHandle> {
        self.open(path, OpenMode::OpenOrCreate, FileAccess::WRITE, ShareMode::NONE)
    }

    /// Creates or truncates a file for exclusive reading and writing.
    pub fn create(&self, path: &str) -> Result<FileHandle> {
        self.open(path, OpenMode::Create, FileAccess::READ_WRITE, ShareMode::NONE)
    }

    /// Attributes of the file or directory at `path`.
    pub fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        let path = self.get_full_path(path)?;
        let _reservation = self.registry.reserve_for_read(&path)?;
        self.attributes_of(&path)?
            .ok_or_else(|| Error::not_found(NotFoundKind::File, &path))
    }

    /// Replaces the attributes of the entry at `path`. The directory bit is kept as is.
    pub fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<()> {
        let path = self.get_full_path(path)?;
        let _reservation = self
            .registry
            .reserve(&path, FileAccess::WRITE, ShareMode::READ_WRITE)?;
        let current = self
            .attributes_of(&path)?
            .ok_or_else(|| Error::not_found(NotFoundKind::File, &path))?;
        let attributes = attributes.difference(FileAttributes::DIRECTORY)
            | current.intersection(FileAttributes::DIRECTORY);
        self.driver
            .set_attributes(&path, attributes)
            .map_err(|err| Error::driver(err, &path))
    }

    fn attributes_of(&self, path: &CanonicalPath) -> Result<Option<FileAttributes>> {
        self.driver
            .attributes(path)
            .map_err(|err| Error::driver(err, path))
    }

    fn require_directory(&self, dir: &CanonicalPath) -> Result<FileAttributes> {
        match self.attributes_of(dir)? {
            Some(attrs) if attrs.is_directory() => Ok(attrs),
            _ => Err(Error::not_found(NotFoundKind::Directory, dir)),
        }
    }

    /// Fails unless the parent of `path` is an existing directory.
    fn require_parent(&self, path: &CanonicalPath) -> Result<()> {
        match path.parent() {
            Some(parent) => self.require_directory(&parent).map(|_| ()),
            None => Ok(()),
        }
    }

    /// Copies content and attributes from `src` to `dst` directly through driver streams.
    ///
    /// Both paths must already be claimed by the caller.
    fn copy_through_driver(&self, src: &CanonicalPath, dst: &CanonicalPath) -> Result<()> {
        let buffer_size = self.config.buffer_size;
        let mut reader = self
            .driver
            .open(src, buffer_size)
            .map_err(|err| Error::driver(err, src))?;
        let mut writer = match self.driver.open(dst, buffer_size) {
            Ok(writer) => writer,
            Err(err) => {
                close_quietly(reader, src);
                return Err(Error::driver(err, dst));
            }
        };

        let copied = pump(reader.as_mut(), src, writer.as_mut(), dst, buffer_size);
        let closed_dst = writer.close().map_err(|err| Error::driver(err, dst));
        close_quietly(reader, src);
        copied?;
        closed_dst?;

        if let Some(attrs) = self.attributes_of(src)? {
            self.driver
                .set_attributes(dst, attrs)
                .map_err(|err| Error::driver(err, dst))?;
        }
        debug!(%src, %dst, "copied through driver");
        Ok(())
    }
}

/// Truncates `writer`, then moves everything `reader` yields into it.
fn pump(
    reader: &mut dyn DriverStream,
    src: &CanonicalPath,
    writer: &mut dyn DriverStream,
    dst: &CanonicalPath,
    buffer_size: usize,
) -> Result<()> {
    writer.set_length(0).map_err(|err| Error::driver(err, dst))?;
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = reader.read(&mut buf).map_err(|err| Error::driver(err, src))?;
        if n == 0 {
            return Ok(());
        }
        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            let written = writer.write(chunk).map_err(|err| Error::driver(err, dst))?;
            if written == 0 {
                return Err(Error::io(dst, "write made no progress"));
            }
            chunk = &chunk[written.min(chunk.len())..];
        }
    }
}

fn close_quietly(stream: Box<dyn DriverStream>, path: &CanonicalPath) {
    if let Err(err) = stream.close() {
        warn!(%path, error = %err, "failed to close driver stream");
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::vfs::MapFS;

    fn setup_test_vfs() -> (Arc<MapFS>, Vfs) {
        let driver = Arc::new(MapFS::new());
        let vfs = Vfs::new(driver.clone());
        vfs.create_directory("\\sd\\docs").unwrap();
        vfs.write_all_bytes("\\sd\\docs\\a.txt", b"alpha").unwrap();
        vfs.write_all_bytes("\\sd\\readme.md", b"read me").unwrap();
        (driver, vfs)
    }

    mod current_directory {
        use super::*;

        #[test]
        fn test_initially_root() {
            let (_, vfs) = setup_test_vfs();
            assert!(vfs.current_directory().is_root());
            assert_eq!(vfs.registry().total_reservations(), 0);
        }

        #[test]
        fn test_relative_paths_follow_current_directory() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.set_current_directory("\\sd")?;
            assert_eq!(vfs.current_directory(), "\\sd");
            assert_eq!(vfs.get_full_path("docs\\a.txt")?, "\\sd\\docs\\a.txt");
            assert_eq!(vfs.read_all_bytes("docs\\a.txt")?, b"alpha");

            vfs.set_current_directory("docs")?;
            assert_eq!(vfs.current_directory(), "\\sd\\docs");
            vfs.set_current_directory("..")?;
            assert_eq!(vfs.current_directory(), "\\sd");
            Ok(())
        }

        #[test]
        fn test_missing_or_file_target() {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.set_current_directory("\\nope"),
                Err(Error::NotFound {
                    kind: NotFoundKind::Directory,
                    ..
                })
            ));
            assert!(vfs.set_current_directory("\\sd\\readme.md").is_err());
            assert!(vfs.current_directory().is_root());
        }

        #[test]
        fn test_current_directory_is_claimed() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.set_current_directory("\\sd\\docs")?;
            assert_eq!(vfs.registry().total_reservations(), 1);
            assert!(matches!(
                vfs.delete_directory("\\sd\\docs", true),
                Err(Error::SharingViolation(_))
            ));

            vfs.set_current_directory("\\")?;
            assert_eq!(vfs.registry().total_reservations(), 1);
            vfs.delete_directory("\\sd\\docs", true)?;
            Ok(())
        }
    }

    mod attributes {
        use super::*;

        #[test]
        fn test_get_and_set() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.set_attributes("\\sd\\readme.md", FileAttributes::READ_ONLY | FileAttributes::HIDDEN)?;
            let attrs = vfs.get_attributes("\\sd\\readme.md")?;
            assert!(attrs.is_read_only());
            assert!(attrs.contains(FileAttributes::HIDDEN));
            Ok(())
        }

        #[test]
        fn test_directory_bit_not_settable() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.set_attributes("\\sd\\readme.md", FileAttributes::DIRECTORY)?;
            assert!(!vfs.get_attributes("\\sd\\readme.md")?.is_directory());

            vfs.set_attributes("\\sd\\docs", FileAttributes::empty())?;
            assert!(vfs.get_attributes("\\sd\\docs")?.is_directory());
            Ok(())
        }

        #[test]
        fn test_missing_entry() {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.get_attributes("\\sd\\ghost"),
                Err(Error::NotFound { .. })
            ));
            assert!(vfs.set_attributes("\\sd\\ghost", FileAttributes::NORMAL).is_err());
        }

        #[test]
        fn test_reader_blocks_attribute_change() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            let _handle = vfs.open("\\sd\\readme.md", OpenMode::Open, FileAccess::READ, ShareMode::READ)?;
            assert!(matches!(
                vfs.set_attributes("\\sd\\readme.md", FileAttributes::READ_ONLY),
                Err(Error::SharingViolation(_))
            ));
            assert!(!vfs.get_attributes("\\sd\\readme.md")?.is_read_only());
            Ok(())
        }
    }

    mod open {
        use super::*;

        #[test]
        fn test_convenience_openers() -> Result<()> {
            let (driver, vfs) = setup_test_vfs();
            let writer = vfs.open_write("\\sd\\new.bin")?;
            assert!(writer.can_write() && !writer.can_read());
            writer.write(b"12345")?;
            writer.close()?;

            let reader = vfs.open_read("\\sd\\new.bin")?;
            let second = vfs.open_read("\\sd\\new.bin")?;
            assert_eq!(reader.len()?, 5);
            drop((reader, second));

            let created = vfs.create("\\sd\\new.bin")?;
            assert_eq!(created.len()?, 0);
            assert!(matches!(vfs.open_read("\\sd\\new.bin"), Err(Error::SharingViolation(_))));
            drop(created);

            assert_eq!(driver.open_streams(), 0);
            assert_eq!(vfs.registry().total_reservations(), 0);
            Ok(())
        }
    }
}
