//! Open-handle registry.
//!
//! Tracks every path currently claimed by a handle or a metadata operation, together
//! with the access and share mode of each claim, plus the directories locked for
//! subtree mutation and the process current directory.
//!
//! One registry is constructed per file system and shared by reference; clones are
//! cheap handles onto the same table.
//!
//! ### Sharing rule
//!
//! A new claim `(access, share)` on a path is admitted iff every existing claim `r` on
//! that path has `r.share ⊇ access` and `share ⊇ r.access`. Conflicts fail fast with
//! [`Error::SharingViolation`]; nothing ever blocks waiting for a claim to go away.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::access::{FileAccess, ShareMode};
use crate::error::{Error, Result};
use crate::path::{CanonicalPath, is_in_directory};

#[derive(Debug, Clone, Copy)]
struct Record {
    id: u64,
    access: FileAccess,
    share: ShareMode,
}

struct State {
    open: HashMap<String, Vec<Record>>,
    locked: Vec<String>,
    next_id: u64,
    current_dir: CanonicalPath,
    current_dir_record: Option<(String, u64)>,
}

struct Shared {
    state: Mutex<State>,
    case_sensitive: bool,
}

impl Shared {
    fn key(&self, path: &CanonicalPath) -> String {
        if self.case_sensitive {
            path.as_str().to_string()
        } else {
            path.as_str().to_uppercase()
        }
    }

    fn remove_record(&self, key: &str, id: u64) {
        let mut state = self.state.lock();
        state.remove_record(key, id);
    }

    fn unlock(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(pos) = state.locked.iter().position(|dir| dir == key) {
            state.locked.swap_remove(pos);
        }
        trace!(dir = key, "directory unlocked");
    }
}

impl State {
    fn insert_record(
        &mut self,
        key: &str,
        path: &CanonicalPath,
        access: FileAccess,
        share: ShareMode,
    ) -> Result<u64> {
        if let Some(dir) = self.locked.iter().find(|dir| is_in_directory(key, dir)) {
            debug!(%path, locked = %dir, "reservation refused: directory locked");
            return Err(Error::SharingViolation(path.to_string()));
        }
        if let Some(records) = self.open.get(key) {
            let compatible = records
                .iter()
                .all(|r| r.share.permits(access) && share.permits(r.access));
            if !compatible {
                debug!(%path, ?access, ?share, holders = records.len(), "reservation refused: sharing conflict");
                return Err(Error::SharingViolation(path.to_string()));
            }
        }

        let id = self.next_id;
        self.next_id += 1;
        self.open
            .entry(key.to_string())
            .or_default()
            .push(Record { id, access, share });
        trace!(%path, id, ?access, ?share, "reservation taken");
        Ok(id)
    }

    fn remove_record(&mut self, key: &str, id: u64) {
        if let Some(records) = self.open.get_mut(key) {
            records.retain(|r| r.id != id);
            if records.is_empty() {
                self.open.remove(key);
            }
        }
        trace!(path = key, id, "reservation released");
    }
}

/// The open-handle registry.
#[derive(Clone)]
pub struct HandleRegistry {
    shared: Arc<Shared>,
}

impl HandleRegistry {
    /// Creates an empty registry that folds path case, with the root as current directory.
    pub fn new() -> Self {
        Self::with_case_sensitivity(false)
    }

    pub fn with_case_sensitivity(case_sensitive: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    open: HashMap::new(),
                    locked: Vec::new(),
                    next_id: 0,
                    current_dir: CanonicalPath::root(),
                    current_dir_record: None,
                }),
                case_sensitive,
            }),
        }
    }

    /// Claims `path` with the given access and share declaration.
    ///
    /// # Errors
    /// [`Error::SharingViolation`] if the path lies in a locked directory or an existing
    /// claim on it is incompatible.
    pub fn reserve(
        &self,
        path: &CanonicalPath,
        access: FileAccess,
        share: ShareMode,
    ) -> Result<Reservation> {
        let key = self.shared.key(path);
        let id = self
            .shared
            .state
            .lock()
            .insert_record(&key, path, access, share)?;
        Ok(Reservation {
            shared: Arc::clone(&self.shared),
            key,
            id,
            path: path.clone(),
            access,
            share,
        })
    }

    /// A read claim that tolerates any other handle, used by metadata and enumeration
    /// operations to keep `path` from being deleted or moved meanwhile.
    pub fn reserve_for_read(&self, path: &CanonicalPath) -> Result<Reservation> {
        self.reserve(path, FileAccess::READ, ShareMode::READ_WRITE)
    }

    /// A claim that coexists with nothing, used by file delete and move.
    pub fn reserve_exclusive(&self, path: &CanonicalPath) -> Result<Reservation> {
        self.reserve(path, FileAccess::READ_WRITE, ShareMode::NONE)
    }

    /// Same as dropping the reservation.
    pub fn release(&self, reservation: Reservation) {
        drop(reservation);
    }

    /// Locks the subtree at `dir` against every other claim.
    ///
    /// # Errors
    /// [`Error::SharingViolation`] if anything at or below `dir` is claimed, or if an
    /// overlapping subtree is already locked.
    pub fn lock_directory(&self, dir: &CanonicalPath) -> Result<DirectoryLock> {
        let key = self.shared.key(dir);
        let mut state = self.shared.state.lock();

        let overlapping = state
            .locked
            .iter()
            .any(|locked| is_in_directory(&key, locked) || is_in_directory(locked, &key));
        let busy = state.open.keys().any(|open| is_in_directory(open, &key));
        if overlapping || busy {
            debug!(%dir, overlapping, busy, "directory lock refused");
            return Err(Error::SharingViolation(dir.to_string()));
        }

        state.locked.push(key.clone());
        trace!(%dir, "directory locked");
        Ok(DirectoryLock {
            shared: Arc::clone(&self.shared),
            key,
            path: dir.clone(),
        })
    }

    /// Same as dropping the lock.
    pub fn unlock_directory(&self, lock: DirectoryLock) {
        drop(lock);
    }

    pub fn current_directory(&self) -> CanonicalPath {
        self.shared.state.lock().current_dir.clone()
    }

    /// Makes `dir` the current directory.
    ///
    /// The current directory keeps a read claim on itself until replaced. Existence of
    /// `dir` is the caller's concern.
    pub fn set_current_directory(&self, dir: &CanonicalPath) -> Result<()> {
        let key = self.shared.key(dir);
        let mut state = self.shared.state.lock();
        let id = state.insert_record(&key, dir, FileAccess::READ, ShareMode::READ_WRITE)?;
        if let Some((old_key, old_id)) = state.current_dir_record.replace((key, id)) {
            state.remove_record(&old_key, old_id);
        }
        state.current_dir = dir.clone();
        debug!(%dir, "current directory changed");
        Ok(())
    }

    /// Number of live claims on `path`.
    pub fn reservation_count(&self, path: &CanonicalPath) -> usize {
        let key = self.shared.key(path);
        self.shared
            .state
            .lock()
            .open
            .get(&key)
            .map_or(0, |records| records.len())
    }

    /// Number of live claims on all paths, the current directory's included.
    pub fn total_reservations(&self) -> usize {
        self.shared.state.lock().open.values().map(Vec::len).sum()
    }

    pub fn is_locked(&self, dir: &CanonicalPath) -> bool {
        let key = self.shared.key(dir);
        self.shared.state.lock().locked.contains(&key)
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A live claim on a path; released on drop.
pub struct Reservation {
    shared: Arc<Shared>,
    key: String,
    id: u64,
    path: CanonicalPath,
    access: FileAccess,
    share: ShareMode,
}

impl Reservation {
    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }

    pub fn access(&self) -> FileAccess {
        self.access
    }

    pub fn share(&self) -> ShareMode {
        self.share
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.shared.remove_record(&self.key, self.id);
    }
}

/// An exclusive lock on a directory subtree; released on drop.
pub struct DirectoryLock {
    shared: Arc<Shared>,
    key: String,
    path: CanonicalPath,
}

impl DirectoryLock {
    pub fn path(&self) -> &CanonicalPath {
        &self.path
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        self.shared.unlock(&self.key);
    }
}
