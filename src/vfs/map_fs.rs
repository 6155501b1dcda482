//! In-memory storage driver.

use std::collections::BTreeMap;
use std::io::{self, SeekFrom};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::entry::{Entry, EntryType};
use crate::core::{DirEntry, DriverCapability, DriverStream, FileAttributes, StorageDriver};
use crate::error::{DriverError, DriverResult};
use crate::path::{CanonicalPath, SEPARATOR};

/// A storage driver that keeps every file and directory in memory.
///
/// `MapFS` behaves like a FAT volume: names are case-preserving but matched without
/// regard to case, the root `\` always exists and is a directory, and every entry's
/// parent is a directory.
///
/// ### Internal state
///
/// * `entries` - all entries keyed by their upper-cased canonical path. A `BTreeMap`
///   keeps the hierarchy ordered, so the descendants of a directory form one range.
/// * `capability` - what streams report from [`DriverStream::properties`]. Lowering it
///   simulates read-only or non-seekable media.
/// * `live_streams` - number of streams opened and not yet closed or dropped.
///
/// ### Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vfs_access::{MapFS, Vfs};
///
/// let vfs = Vfs::new(Arc::new(MapFS::new()));
/// vfs.create_directory("\\docs").unwrap();
/// vfs.write_all_bytes("\\docs\\note.txt", b"Hello").unwrap();
/// assert!(vfs.file_exists("\\docs\\note.txt"));
/// ```
pub struct MapFS {
    entries: RwLock<BTreeMap<String, Entry>>,
    capability: DriverCapability,
    rename_supported: bool,
    max_transfer: Option<usize>,
    live_streams: Arc<AtomicUsize>,
}

impl MapFS {
    /// Creates an empty volume holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(SEPARATOR.to_string(), Entry::new("", EntryType::Directory));

        Self {
            entries: RwLock::new(entries),
            capability: DriverCapability::FULL,
            rename_supported: true,
            max_transfer: None,
            live_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sets what streams opened from now on report as their capability.
    pub fn set_capability(&mut self, capability: DriverCapability) {
        self.capability = capability;
    }

    /// When disabled, [`StorageDriver::rename`] answers `Ok(false)` like a driver that
    /// cannot move entries between volumes.
    pub fn set_rename_supported(&mut self, supported: bool) {
        self.rename_supported = supported;
    }

    /// Caps the number of bytes a single stream read or write transfers. `Some(0)` makes
    /// writes stall.
    pub fn set_max_transfer(&mut self, max: Option<usize>) {
        self.max_transfer = max;
    }

    /// Streams currently open on this volume.
    pub fn open_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    fn key(path: &CanonicalPath) -> String {
        path.as_str().to_uppercase()
    }

    /// Prefix shared by the keys of everything below `key`.
    fn child_prefix(key: &str) -> String {
        if key.len() == 1 {
            key.to_string()
        } else {
            format!("{key}{SEPARATOR}")
        }
    }

    /// Every entry strictly below `key`, in key order.
    fn descendants<'a>(entries: &'a BTreeMap<String, Entry>, key: &str) -> Vec<(&'a String, &'a Entry)> {
        let prefix = Self::child_prefix(key);
        entries
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.as_str() != key)
            .collect()
    }

    fn parent_key(path: &CanonicalPath) -> DriverResult<String> {
        match path.parent() {
            Some(parent) => Ok(Self::key(&parent)),
            None => Err(DriverError::AccessDenied),
        }
    }

    fn require_dir(entries: &BTreeMap<String, Entry>, key: &str) -> DriverResult<()> {
        match entries.get(key) {
            Some(entry) if entry.is_dir() => Ok(()),
            _ => Err(DriverError::NotFound),
        }
    }
}

impl Default for MapFS {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageDriver for MapFS {
    fn open(&self, path: &CanonicalPath, _buffer_size: usize) -> DriverResult<Box<dyn DriverStream>> {
        let key = Self::key(path);
        let mut entries = self.entries.write();

        let content = match entries.get(&key) {
            Some(entry) if entry.is_dir() => return Err(DriverError::AccessDenied),
            Some(entry) => entry.content(),
            None => {
                let parent = Self::parent_key(path)?;
                Self::require_dir(&entries, &parent)?;
                let entry = Entry::new(path.file_name().unwrap_or_default(), EntryType::File);
                let content = entry.content();
                entries.insert(key, entry);
                trace!(%path, "file created");
                content
            }
        };

        self.live_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MapStream {
            content,
            position: 0,
            capability: self.capability,
            max_transfer: self.max_transfer,
            live_streams: Arc::clone(&self.live_streams),
        }))
    }

    fn attributes(&self, path: &CanonicalPath) -> DriverResult<Option<FileAttributes>> {
        let entries = self.entries.read();
        Ok(entries.get(&Self::key(path)).map(Entry::attributes))
    }

    fn set_attributes(&self, path: &CanonicalPath, attributes: FileAttributes) -> DriverResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&Self::key(path))
            .ok_or(DriverError::NotFound)?;
        entry.set_attributes(attributes);
        Ok(())
    }

    fn delete(&self, path: &CanonicalPath) -> DriverResult<()> {
        if path.is_root() {
            return Err(DriverError::AccessDenied);
        }
        let key = Self::key(path);
        let mut entries = self.entries.write();
        let entry = entries.get(&key).ok_or(DriverError::NotFound)?;
        if entry.is_dir() && !Self::descendants(&entries, &key).is_empty() {
            return Err(DriverError::DirectoryNotEmpty);
        }
        entries.remove(&key);
        trace!(%path, "entry deleted");
        Ok(())
    }

    fn create_directory(&self, path: &CanonicalPath) -> DriverResult<()> {
        let key = Self::key(path);
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return Err(DriverError::AlreadyExists);
        }
        let parent = Self::parent_key(path)?;
        Self::require_dir(&entries, &parent)?;
        entries.insert(
            key,
            Entry::new(path.file_name().unwrap_or_default(), EntryType::Directory),
        );
        trace!(%path, "directory created");
        Ok(())
    }

    fn rename(&self, src: &CanonicalPath, dst: &CanonicalPath) -> DriverResult<bool> {
        if !self.rename_supported {
            return Ok(false);
        }
        if src.is_root() || dst.is_root() {
            return Err(DriverError::AccessDenied);
        }

        let src_key = Self::key(src);
        let dst_key = Self::key(dst);
        let mut entries = self.entries.write();
        if !entries.contains_key(&src_key) {
            return Err(DriverError::NotFound);
        }
        let new_name = dst.file_name().unwrap_or_default();

        if src_key == dst_key {
            if let Some(entry) = entries.get_mut(&src_key) {
                entry.set_name(new_name);
            }
            return Ok(true);
        }
        if entries.contains_key(&dst_key) {
            return Err(DriverError::AlreadyExists);
        }
        if dst_key.starts_with(&Self::child_prefix(&src_key)) {
            return Err(DriverError::AccessDenied);
        }
        Self::require_dir(&entries, &Self::parent_key(dst)?)?;

        let moved: Vec<String> = Self::descendants(&entries, &src_key)
            .into_iter()
            .map(|(k, _)| k.clone())
            .collect();
        for old_key in moved {
            if let Some(entry) = entries.remove(&old_key) {
                let new_key = format!("{dst_key}{}", &old_key[src_key.len()..]);
                entries.insert(new_key, entry);
            }
        }
        if let Some(mut entry) = entries.remove(&src_key) {
            entry.set_name(new_name);
            entries.insert(dst_key, entry);
        }
        trace!(%src, %dst, "entry renamed");
        Ok(true)
    }

    fn read_dir(&self, path: &CanonicalPath) -> DriverResult<Vec<DirEntry>> {
        let key = Self::key(path);
        let entries = self.entries.read();
        Self::require_dir(&entries, &key)?;

        let prefix_len = Self::child_prefix(&key).len();
        Ok(Self::descendants(&entries, &key)
            .into_iter()
            .filter(|(k, _)| !k[prefix_len..].contains(SEPARATOR))
            .map(|(_, entry)| DirEntry::new(entry.name(), entry.attributes()))
            .collect())
    }
}

/// A cursor over one file's content.
struct MapStream {
    content: Arc<Mutex<Vec<u8>>>,
    position: u64,
    capability: DriverCapability,
    max_transfer: Option<usize>,
    live_streams: Arc<AtomicUsize>,
}

impl MapStream {
    fn limit(&self, len: usize) -> usize {
        self.max_transfer.map_or(len, |max| len.min(max))
    }
}

impl DriverStream for MapStream {
    fn read(&mut self, buf: &mut [u8]) -> DriverResult<usize> {
        if !self.capability.can_read {
            return Err(DriverError::AccessDenied);
        }
        let content = self.content.lock();
        let start = usize::try_from(self.position).unwrap_or(usize::MAX);
        if start >= content.len() {
            return Ok(0);
        }
        let n = self.limit(buf.len()).min(content.len() - start);
        buf[..n].copy_from_slice(&content[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> DriverResult<usize> {
        if !self.capability.can_write {
            return Err(DriverError::AccessDenied);
        }
        let n = self.limit(buf.len());
        let mut content = self.content.lock();
        let start = usize::try_from(self.position)
            .map_err(|_| DriverError::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;
        let end = start + n;
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(&buf[..n]);
        self.position = end as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> DriverResult<u64> {
        if !self.capability.can_seek {
            return Err(DriverError::Unsupported);
        }
        let len = self.content.lock().len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset as i64),
            SeekFrom::End(offset) => len.checked_add(offset),
            SeekFrom::Current(offset) => (self.position as i64).checked_add(offset),
        };
        match target {
            Some(target) if target >= 0 => {
                self.position = target as u64;
                Ok(self.position)
            }
            _ => Err(DriverError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative offset",
            ))),
        }
    }

    fn set_length(&mut self, len: u64) -> DriverResult<()> {
        if !self.capability.can_write {
            return Err(DriverError::AccessDenied);
        }
        let len = usize::try_from(len)
            .map_err(|_| DriverError::Io(io::Error::from(io::ErrorKind::InvalidInput)))?;
        self.content.lock().resize(len, 0);
        Ok(())
    }

    fn length(&mut self) -> DriverResult<u64> {
        Ok(self.content.lock().len() as u64)
    }

    fn flush(&mut self) -> DriverResult<()> {
        Ok(())
    }

    fn close(self: Box<Self>) -> DriverResult<()> {
        Ok(())
    }

    fn properties(&self) -> DriverCapability {
        self.capability
    }
}

impl Drop for MapStream {
    fn drop(&mut self) {
        self.live_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
