use tracing::debug;

use super::Vfs;
use crate::access::{FileAccess, OpenMode, ShareMode};
use crate::error::{Error, NotFoundKind, Result};

impl Vfs {
    /// True if a file (not a directory) exists at `path`. Never fails; malformed paths
    /// and driver errors read as `false`.
    pub fn file_exists(&self, path: &str) -> bool {
        let Ok(path) = self.get_full_path(path) else {
            return false;
        };
        matches!(self.attributes_of(&path), Ok(Some(attrs)) if !attrs.is_directory())
    }

    /// Deletes a file.
    ///
    /// A missing file is not an error as long as its directory exists.
    ///
    /// # Errors
    /// * [`Error::NotFound`] (directory) if the containing directory does not exist.
    /// * [`Error::UnauthorizedAccess`] if `path` is a directory or a read-only file.
    /// * [`Error::SharingViolation`] if the file is open.
    pub fn delete_file(&self, path: &str) -> Result<()> {
        let path = self.get_full_path(path)?;
        let _reservation = self.registry.reserve_exclusive(&path)?;
        self.require_parent(&path)?;

        match self.attributes_of(&path)? {
            None => Ok(()),
            Some(attrs) if attrs.is_directory() => {
                Err(Error::unauthorized(&path, "path is a directory"))
            }
            Some(attrs) if attrs.is_read_only() => {
                Err(Error::unauthorized(&path, "file is read-only"))
            }
            Some(_) => {
                self.driver
                    .delete(&path)
                    .map_err(|err| Error::driver(err, &path))?;
                debug!(%path, "file deleted");
                Ok(())
            }
        }
    }

    /// Copies `src` to `dst`, including attributes.
    ///
    /// With `overwrite` an existing `dst` is truncated, otherwise it must not exist.
    pub fn copy_file(&self, src: &str, dst: &str, overwrite: bool) -> Result<()> {
        let reader = self.open(src, OpenMode::Open, FileAccess::READ, ShareMode::READ)?;
        let dst_mode = if overwrite {
            OpenMode::Create
        } else {
            OpenMode::CreateNew
        };
        let writer = self.open(dst, dst_mode, FileAccess::WRITE, ShareMode::NONE)?;

        let mut buf = vec![0u8; self.config.buffer_size];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n])?;
        }

        let (src_path, dst_path) = (reader.path().clone(), writer.path().clone());
        // attributes go over while the writer still holds `dst`
        if let Some(attrs) = self.attributes_of(&src_path)? {
            self.driver
                .set_attributes(&dst_path, attrs)
                .map_err(|err| Error::driver(err, &dst_path))?;
        }
        writer.close()?;
        reader.close()?;

        debug!(src = %src_path, dst = %dst_path, "file copied");
        Ok(())
    }

    /// Moves a file, copying and deleting when the driver cannot rename.
    ///
    /// # Errors
    /// * [`Error::NotFound`] if `src` is missing or `dst`'s directory is missing.
    /// * [`Error::AlreadyExists`] if something exists at `dst`.
    /// * [`Error::SharingViolation`] if either path is claimed.
    pub fn move_file(&self, src: &str, dst: &str) -> Result<()> {
        let src = self.get_full_path(src)?;
        let dst = self.get_full_path(dst)?;
        let _src_reservation = self.registry.reserve_exclusive(&src)?;
        let _dst_reservation = self.registry.reserve_exclusive(&dst)?;

        match self.attributes_of(&src)? {
            None => return Err(Error::not_found(NotFoundKind::File, &src)),
            Some(attrs) if attrs.is_directory() => {
                return Err(Error::unauthorized(&src, "path is a directory"));
            }
            Some(_) => {}
        }
        if self.attributes_of(&dst)?.is_some() {
            return Err(Error::AlreadyExists(dst.to_string()));
        }
        self.require_parent(&dst)?;

        let renamed = self
            .driver
            .rename(&src, &dst)
            .map_err(|err| Error::driver(err, &src))?;
        if !renamed {
            debug!(%src, %dst, "rename unsupported, copying");
            if let Err(err) = self.copy_through_driver(&src, &dst) {
                if let Err(cleanup) = self.driver.delete(&dst) {
                    debug!(%dst, error = %cleanup, "partial copy left behind");
                }
                return Err(err);
            }
            self.driver
                .delete(&src)
                .map_err(|err| Error::driver(err, &src))?;
        }
        debug!(%src, %dst, "file moved");
        Ok(())
    }

    /// Reads a whole file.
    pub fn read_all_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let handle = self.open_read(path)?;
        let mut content = Vec::new();
        if handle.can_seek() {
            content.reserve(usize::try_from(handle.len()?).unwrap_or(0));
        }
        let mut buf = vec![0u8; self.config.buffer_size];
        loop {
            let n = handle.read(&mut buf)?;
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
        }
        handle.close()?;
        Ok(content)
    }

    /// Creates or truncates `path` and writes `content` to it.
    pub fn write_all_bytes(&self, path: &str, content: &[u8]) -> Result<()> {
        let handle = self.open(path, OpenMode::Create, FileAccess::WRITE, ShareMode::NONE)?;
        if let Err(err) = handle.write(content) {
            drop(handle);
            return Err(err);
        }
        handle.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;

    use super::*;
    use crate::core::{DriverCapability, FileAttributes};
    use crate::vfs::MapFS;

    /// Helper to create a pre‑populated volume for testing
    fn setup_test_vfs() -> (Arc<MapFS>, Vfs) {
        setup_with(MapFS::new())
    }

    fn setup_with(driver: MapFS) -> (Arc<MapFS>, Vfs) {
        let driver = Arc::new(driver);
        let vfs = Vfs::new(driver.clone());
        vfs.create_directory("\\sd\\docs").unwrap();
        vfs.write_all_bytes("\\sd\\docs\\a.txt", b"alpha").unwrap();
        vfs.write_all_bytes("\\sd\\readme.md", b"read me").unwrap();
        (driver, vfs)
    }

    mod exists {
        use super::*;

        #[test]
        fn test_file_exists() {
            let (_, vfs) = setup_test_vfs();
            assert!(vfs.file_exists("\\sd\\readme.md"));
            assert!(vfs.file_exists("\\SD\\DOCS\\A.TXT"));
            assert!(!vfs.file_exists("\\sd\\docs"));
            assert!(!vfs.file_exists("\\sd\\ghost"));
            assert!(!vfs.file_exists("\\sd\\bad|name"));
            assert!(!vfs.file_exists(""));
        }

        #[test]
        fn test_file_exists_ignores_sharing() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            let _handle = vfs.create("\\sd\\readme.md")?;
            assert!(vfs.file_exists("\\sd\\readme.md"));
            Ok(())
        }
    }

    mod delete {
        use super::*;

        #[test]
        fn test_delete_file() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.delete_file("\\sd\\readme.md")?;
            assert!(!vfs.file_exists("\\sd\\readme.md"));
            Ok(())
        }

        #[test]
        fn test_delete_missing_file_is_noop() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.delete_file("\\sd\\ghost")?;
            Ok(())
        }

        #[test]
        fn test_delete_in_missing_directory() {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.delete_file("\\sd\\nowhere\\ghost"),
                Err(Error::NotFound {
                    kind: NotFoundKind::Directory,
                    ..
                })
            ));
        }

        #[test]
        fn test_delete_refused() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.delete_file("\\sd\\docs"),
                Err(Error::UnauthorizedAccess { .. })
            ));

            vfs.set_attributes("\\sd\\readme.md", FileAttributes::READ_ONLY)?;
            assert!(matches!(
                vfs.delete_file("\\sd\\readme.md"),
                Err(Error::UnauthorizedAccess { .. })
            ));
            assert!(vfs.file_exists("\\sd\\readme.md"));
            Ok(())
        }

        #[test]
        fn test_delete_open_file() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            let handle = vfs.open_read("\\sd\\readme.md")?;
            assert!(matches!(
                vfs.delete_file("\\sd\\readme.md"),
                Err(Error::SharingViolation(_))
            ));
            handle.close()?;
            vfs.delete_file("\\sd\\readme.md")?;
            Ok(())
        }
    }

    mod copy {
        use std::sync::OnceLock;
        use std::sync::atomic::{AtomicBool, Ordering};

        use super::*;
        use crate::core::{DirEntry, DriverStream, StorageDriver};
        use crate::error::DriverResult;
        use crate::path::CanonicalPath;
        use crate::registry::HandleRegistry;

        /// Wraps [`MapFS`] and, whenever attributes are written, checks whether another
        /// handle could still claim the target.
        struct ClaimWatcher {
            inner: MapFS,
            registry: OnceLock<HandleRegistry>,
            claimable_during_set: AtomicBool,
        }

        impl StorageDriver for ClaimWatcher {
            fn open(&self, path: &CanonicalPath, buffer_size: usize) -> DriverResult<Box<dyn DriverStream>> {
                self.inner.open(path, buffer_size)
            }

            fn attributes(&self, path: &CanonicalPath) -> DriverResult<Option<FileAttributes>> {
                self.inner.attributes(path)
            }

            fn set_attributes(&self, path: &CanonicalPath, attributes: FileAttributes) -> DriverResult<()> {
                if let Some(registry) = self.registry.get() {
                    if registry.reserve_for_read(path).is_ok() {
                        self.claimable_during_set.store(true, Ordering::SeqCst);
                    }
                }
                self.inner.set_attributes(path, attributes)
            }

            fn delete(&self, path: &CanonicalPath) -> DriverResult<()> {
                self.inner.delete(path)
            }

            fn create_directory(&self, path: &CanonicalPath) -> DriverResult<()> {
                self.inner.create_directory(path)
            }

            fn rename(&self, src: &CanonicalPath, dst: &CanonicalPath) -> DriverResult<bool> {
                self.inner.rename(src, dst)
            }

            fn read_dir(&self, path: &CanonicalPath) -> DriverResult<Vec<DirEntry>> {
                self.inner.read_dir(path)
            }
        }

        #[test]
        fn test_destination_stays_claimed_while_attributes_copy() -> Result<()> {
            let driver = Arc::new(ClaimWatcher {
                inner: MapFS::new(),
                registry: OnceLock::new(),
                claimable_during_set: AtomicBool::new(false),
            });
            let vfs = Vfs::new(driver.clone());
            let _ = driver.registry.set(vfs.registry().clone());

            vfs.write_all_bytes("\\src.bin", b"payload")?;
            vfs.set_attributes("\\src.bin", FileAttributes::HIDDEN)?;
            driver.claimable_during_set.store(false, Ordering::SeqCst);

            vfs.copy_file("\\src.bin", "\\dst.bin", false)?;
            assert!(!driver.claimable_during_set.load(Ordering::SeqCst));
            assert!(vfs.get_attributes("\\dst.bin")?.contains(FileAttributes::HIDDEN));
            assert_eq!(vfs.read_all_bytes("\\dst.bin")?, b"payload");
            assert_eq!(vfs.registry().total_reservations(), 0);
            Ok(())
        }

        #[test]
        fn test_copy_file() -> Result<()> {
            let (driver, vfs) = setup_test_vfs();
            vfs.set_attributes("\\sd\\readme.md", FileAttributes::HIDDEN)?;
            vfs.copy_file("\\sd\\readme.md", "\\sd\\docs\\copy.md", false)?;

            assert_eq!(vfs.read_all_bytes("\\sd\\docs\\copy.md")?, b"read me");
            assert!(vfs.get_attributes("\\sd\\docs\\copy.md")?.contains(FileAttributes::HIDDEN));
            assert_eq!(vfs.read_all_bytes("\\sd\\readme.md")?, b"read me");
            assert_eq!(driver.open_streams(), 0);
            assert_eq!(vfs.registry().total_reservations(), 0);
            Ok(())
        }

        #[test]
        fn test_copy_large_file_in_chunks() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
            vfs.write_all_bytes("\\sd\\big.bin", &content)?;
            vfs.copy_file("\\sd\\big.bin", "\\sd\\big2.bin", false)?;
            assert_eq!(vfs.read_all_bytes("\\sd\\big2.bin")?, content);
            Ok(())
        }

        #[test]
        fn test_copy_overwrite() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.copy_file("\\sd\\readme.md", "\\sd\\docs\\a.txt", false),
                Err(Error::AlreadyExists(_))
            ));
            assert_eq!(vfs.read_all_bytes("\\sd\\docs\\a.txt")?, b"alpha");

            vfs.copy_file("\\sd\\readme.md", "\\sd\\docs\\a.txt", true)?;
            assert_eq!(vfs.read_all_bytes("\\sd\\docs\\a.txt")?, b"read me");
            Ok(())
        }

        #[test]
        fn test_copy_onto_itself_is_refused() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.copy_file("\\sd\\readme.md", "\\SD\\README.MD", true),
                Err(Error::SharingViolation(_))
            ));
            assert_eq!(vfs.read_all_bytes("\\sd\\readme.md")?, b"read me");
            Ok(())
        }

        #[test]
        fn test_copy_missing_source() {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.copy_file("\\sd\\ghost", "\\sd\\x", false),
                Err(Error::NotFound { .. })
            ));
            assert!(!vfs.file_exists("\\sd\\x"));
        }
    }

    mod moves {
        use super::*;

        #[test]
        fn test_move_file_by_rename() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.move_file("\\sd\\readme.md", "\\sd\\docs\\moved.md")?;
            assert!(!vfs.file_exists("\\sd\\readme.md"));
            assert_eq!(vfs.read_all_bytes("\\sd\\docs\\moved.md")?, b"read me");
            Ok(())
        }

        #[test]
        fn test_move_file_falls_back_to_copy() -> Result<()> {
            let mut driver = MapFS::new();
            driver.set_rename_supported(false);
            let (driver, vfs) = setup_with(driver);
            vfs.set_attributes("\\sd\\readme.md", FileAttributes::HIDDEN)?;

            vfs.move_file("\\sd\\readme.md", "\\sd\\docs\\moved.md")?;
            assert!(!vfs.file_exists("\\sd\\readme.md"));
            assert_eq!(vfs.read_all_bytes("\\sd\\docs\\moved.md")?, b"read me");
            assert!(vfs.get_attributes("\\sd\\docs\\moved.md")?.contains(FileAttributes::HIDDEN));
            assert_eq!(driver.open_streams(), 0);
            assert_eq!(vfs.registry().total_reservations(), 0);
            Ok(())
        }

        #[test]
        fn test_move_file_errors() {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.move_file("\\sd\\ghost", "\\sd\\x"),
                Err(Error::NotFound {
                    kind: NotFoundKind::File,
                    ..
                })
            ));
            assert!(matches!(
                vfs.move_file("\\sd\\readme.md", "\\sd\\docs\\a.txt"),
                Err(Error::AlreadyExists(_))
            ));
            assert!(matches!(
                vfs.move_file("\\sd\\readme.md", "\\sd\\nowhere\\x"),
                Err(Error::NotFound {
                    kind: NotFoundKind::Directory,
                    ..
                })
            ));
            assert!(vfs.file_exists("\\sd\\readme.md"));
        }

        #[test]
        fn test_move_open_file() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            let _handle = vfs.open_read("\\sd\\readme.md")?;
            assert!(matches!(
                vfs.move_file("\\sd\\readme.md", "\\sd\\x"),
                Err(Error::SharingViolation(_))
            ));
            Ok(())
        }
    }

    mod bytes {
        use super::*;

        #[test]
        fn test_write_then_read() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.write_all_bytes("\\sd\\data.bin", &[0xFF, 0x00, 0x7F])?;
            assert_eq!(vfs.read_all_bytes("\\sd\\data.bin")?, vec![0xFF, 0x00, 0x7F]);

            vfs.write_all_bytes("\\sd\\data.bin", b"")?;
            assert!(vfs.read_all_bytes("\\sd\\data.bin")?.is_empty());
            Ok(())
        }

        #[test]
        fn test_read_missing() {
            let (_, vfs) = setup_test_vfs();
            assert!(matches!(
                vfs.read_all_bytes("\\sd\\ghost"),
                Err(Error::NotFound { .. })
            ));
        }

        #[test]
        fn test_write_to_read_only_media() {
            let mut driver = MapFS::new();
            driver.set_capability(DriverCapability {
                can_write: false,
                ..DriverCapability::FULL
            });
            let vfs = Vfs::new(Arc::new(driver));
            assert!(matches!(
                vfs.write_all_bytes("\\new.bin", b"x"),
                Err(Error::UnauthorizedAccess { .. })
            ));
            assert_eq!(vfs.registry().total_reservations(), 0);
        }

        #[test]
        fn test_write_to_read_only_file() -> Result<()> {
            let (_, vfs) = setup_test_vfs();
            vfs.set_attributes("\\sd\\readme.md", FileAttributes::READ_ONLY)?;
            assert!(matches!(
                vfs.write_all_bytes("\\sd\\readme.md", b"overwritten"),
                Err(Error::UnauthorizedAccess { .. })
            ));
            assert_eq!(vfs.read_all_bytes("\\sd\\readme.md")?, b"read me");
            Ok(())
        }
    }
}
