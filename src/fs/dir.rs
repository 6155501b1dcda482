use tracing::{debug, trace};

use super::{Vfs, pattern};
use crate::access::{FileAccess, ShareMode};
use crate::core::DirEntry;
use crate::error::{DriverError, Error, NotFoundKind, Result};
use crate::path::{CanonicalPath, is_in_directory, validate_search_pattern};

impl Vfs {
    /// True if a directory exists at `path`. Never fails.
    pub fn directory_exists(&self, path: &str) -> bool {
        let Ok(path) = self.get_full_path(path) else {
            return false;
        };
        matches!(self.attributes_of(&path), Ok(Some(attrs)) if attrs.is_directory())
    }

    /// Creates a directory and all of its missing parents.
    ///
    /// An existing directory (the root included) is not an error.
    ///
    /// # Errors
    /// * [`Error::AlreadyExists`] if a file occupies `path` or one of its ancestors.
    /// * [`Error::SharingViolation`] if `path` lies in a locked subtree.
    pub fn create_directory(&self, path: &str) -> Result<()> {
        let path = self.get_full_path(path)?;
        let _reservation = self
            .registry
            .reserve(&path, FileAccess::READ_WRITE, ShareMode::READ_WRITE)?;

        let mut missing = Vec::new();
        let mut cursor = Some(path.clone());
        while let Some(current) = cursor {
            match self.attributes_of(&current)? {
                Some(attrs) if attrs.is_directory() => break,
                Some(_) => return Err(Error::AlreadyExists(current.to_string())),
                None => {
                    cursor = current.parent();
                    missing.push(current);
                }
            }
        }

        for dir in missing.into_iter().rev() {
            match self.driver.create_directory(&dir) {
                Ok(()) => trace!(%dir, "directory created"),
                // lost a race with another creator
                Err(DriverError::AlreadyExists) => {
                    if !self.is_directory(&dir)? {
                        return Err(Error::AlreadyExists(dir.to_string()));
                    }
                }
                Err(err) => return Err(Error::driver(err, &dir)),
            }
        }
        Ok(())
    }

    /// Deletes a directory; with `recursive` its whole content goes with it.
    ///
    /// The subtree is locked for the duration, so nothing below it can be opened while
    /// it is being removed.
    ///
    /// # Errors
    /// * [`Error::UnauthorizedAccess`] for the root, a read-only directory, or a
    ///   read-only file met during a recursive delete.
    /// * [`Error::NotFound`] if `path` is missing or is a file.
    /// * [`Error::DirectoryNotEmpty`] if `path` has content and `recursive` is false.
    /// * [`Error::SharingViolation`] if anything at or below `path` is in use.
    pub fn delete_directory(&self, path: &str, recursive: bool) -> Result<()> {
        let path = self.get_full_path(path)?;
        if path.is_root() {
            return Err(Error::unauthorized(&path, "cannot delete the root directory"));
        }
        let attrs = self.require_directory(&path)?;
        if attrs.is_read_only() {
            return Err(Error::unauthorized(&path, "directory is read-only"));
        }

        let _lock = self.registry.lock_directory(&path)?;
        if recursive {
            self.remove_tree(&path, false)?;
        } else {
            self.driver
                .delete(&path)
                .map_err(|err| Error::driver(err, &path))?;
        }
        debug!(%path, recursive, "directory deleted");
        Ok(())
    }

    /// Moves a directory with everything below it.
    ///
    /// Drivers that cannot rename get an iterative copy of the tree followed by a
    /// recursive delete of the source. Both subtrees stay locked until done.
    ///
    /// # Errors
    /// * [`Error::Argument`] if `dst` lies inside `src`.
    /// * [`Error::NotFound`] if `src` is not a directory or `dst`'s parent is missing.
    /// * [`Error::AlreadyExists`] if something exists at `dst`.
    /// * [`Error::SharingViolation`] if either subtree is in use.
    pub fn move_directory(&self, src: &str, dst: &str) -> Result<()> {
        let src = self.get_full_path(src)?;
        let dst = self.get_full_path(dst)?;
        if src.is_root() {
            return Err(Error::unauthorized(&src, "cannot move the root directory"));
        }
        if self.folded_contains(&src, &dst) {
            return Err(Error::Argument("destination lies inside the source directory"));
        }

        self.require_directory(&src)?;
        if self.attributes_of(&dst)?.is_some() {
            return Err(Error::AlreadyExists(dst.to_string()));
        }
        self.require_parent(&dst)?;

        let _src_lock = self.registry.lock_directory(&src)?;
        let _dst_lock = self.registry.lock_directory(&dst)?;

        let renamed = self
            .driver
            .rename(&src, &dst)
            .map_err(|err| Error::driver(err, &src))?;
        if !renamed {
            debug!(%src, %dst, "rename unsupported, copying tree");
            self.copy_tree(&src, &dst)?;
            self.remove_tree(&src, true)?;
        }
        debug!(%src, %dst, "directory moved");
        Ok(())
    }

    /// Files directly inside `path` whose names match `pattern`, sorted.
    pub fn get_files(&self, path: &str, pattern: &str) -> Result<Vec<CanonicalPath>> {
        self.enumerate(path, pattern, DirEntry::is_file)
    }

    /// Subdirectories directly inside `path` whose names match `pattern`, sorted.
    pub fn get_directories(&self, path: &str, pattern: &str) -> Result<Vec<CanonicalPath>> {
        self.enumerate(path, pattern, DirEntry::is_dir)
    }

    fn enumerate(
        &self,
        path: &str,
        pattern: &str,
        keep: fn(&DirEntry) -> bool,
    ) -> Result<Vec<CanonicalPath>> {
        validate_search_pattern(pattern, &self.config.limits)?;
        // trailing dots are significant here: `*.` selects names without an extension
        let pattern = pattern.trim_end_matches(' ');
        let dir = self.get_full_path(path)?;
        let _reservation = self.registry.reserve_for_read(&dir)?;
        self.require_directory(&dir)?;

        let entries = self
            .driver
            .read_dir(&dir)
            .map_err(|err| Error::driver(err, &dir))?;
        let mut found = Vec::new();
        for entry in entries {
            if !keep(&entry) || !pattern::matches(&pattern, entry.name()) {
                continue;
            }
            match self.addressable(&dir, entry.name()) {
                Some(path) => found.push(path),
                None => debug!(%dir, name = entry.name(), "entry name cannot be addressed, skipped"),
            }
        }
        found.sort();
        Ok(found)
    }

    /// Path of child `name` of `dir`, if it survives canonicalization unchanged.
    fn addressable(&self, dir: &CanonicalPath, name: &str) -> Option<CanonicalPath> {
        let verbatim = dir.join_entry(name)?;
        let joined = dir.join(name, &self.config.limits).ok()?;
        (joined == verbatim).then_some(verbatim)
    }

    fn is_directory(&self, path: &CanonicalPath) -> Result<bool> {
        Ok(self.attributes_of(path)?.is_some_and(|attrs| attrs.is_directory()))
    }

    /// True if `path` is `dir` or below it, folding case unless the volume is case-sensitive.
    fn folded_contains(&self, dir: &CanonicalPath, path: &CanonicalPath) -> bool {
        if self.config.case_sensitive {
            path.starts_with_dir(dir)
        } else {
            is_in_directory(&path.as_str().to_uppercase(), &dir.as_str().to_uppercase())
        }
    }

    /// Deletes `root` and everything below it, children first.
    ///
    /// The caller holds a lock on `root`. Unless `force` is set, a read-only file stops
    /// the walk with whatever was already removed staying removed.
    fn remove_tree(&self, root: &CanonicalPath, force: bool) -> Result<()> {
        let mut stack = vec![(root.clone(), true, false)];
        while let Some((path, is_dir, expanded)) = stack.pop() {
            if !is_dir || expanded {
                self.driver
                    .delete(&path)
                    .map_err(|err| Error::driver(err, &path))?;
                trace!(%path, "removed");
                continue;
            }

            let children = self
                .driver
                .read_dir(&path)
                .map_err(|err| Error::driver(err, &path))?;
            stack.push((path.clone(), true, true));
            for child in children {
                let child_path = child_of(&path, child.name())?;
                if !force && child.is_file() && child.attributes().is_read_only() {
                    return Err(Error::unauthorized(&child_path, "file is read-only"));
                }
                stack.push((child_path, child.is_dir(), false));
            }
        }
        Ok(())
    }

    /// Recreates the tree at `src` under `dst`, content and attributes included.
    fn copy_tree(&self, src: &CanonicalPath, dst: &CanonicalPath) -> Result<()> {
        let mut stack = vec![(src.clone(), dst.clone())];
        while let Some((src_dir, dst_dir)) = stack.pop() {
            self.driver
                .create_directory(&dst_dir)
                .map_err(|err| Error::driver(err, &dst_dir))?;
            if let Some(attrs) = self.attributes_of(&src_dir)? {
                self.driver
                    .set_attributes(&dst_dir, attrs)
                    .map_err(|err| Error::driver(err, &dst_dir))?;
            }

            let children = self
                .driver
                .read_dir(&src_dir)
                .map_err(|err| Error::driver(err, &src_dir))?;
            for child in children {
                let from = child_of(&src_dir, child.name())?;
                let to = child_of(&dst_dir, child.name())?;
                if child.is_dir() {
                    stack.push((from, to));
                } else {
                    self.copy_through_driver(&from, &to)?;
                }
            }
        }
        Ok(())
    }
}

/// Tree walks address children by the driver's own spelling of their names.
fn child_of(dir: &CanonicalPath, name: &str) -> Result<CanonicalPath> {
    dir.join_entry(name)
        .ok_or_else(|| Error::io(dir, format!("entry {name:?} cannot be addressed")))
}
