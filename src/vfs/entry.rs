use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::FileAttributes;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EntryType {
    File,
    Directory,
}

/// A node of [`MapFS`](super::MapFS).
///
/// File content sits behind its own lock so that open streams keep working on it
/// without holding the map lock.
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    entry_type: EntryType,
    attributes: FileAttributes,
    content: Arc<Mutex<Vec<u8>>>,
}

impl Entry {
    pub fn new(name: impl Into<String>, entry_type: EntryType) -> Entry {
        let attributes = match entry_type {
            EntryType::File => FileAttributes::ARCHIVE,
            EntryType::Directory => FileAttributes::DIRECTORY,
        };
        Entry {
            name: name.into(),
            entry_type,
            attributes,
            content: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Name as it was spelled when the entry was created or last renamed.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    /// Replaces the attributes; the directory bit always follows the entry type.
    pub fn set_attributes(&mut self, attributes: FileAttributes) {
        let mut attributes = attributes.difference(FileAttributes::DIRECTORY);
        if self.is_dir() {
            attributes |= FileAttributes::DIRECTORY;
        }
        self.attributes = attributes;
    }

    pub fn content(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.content)
    }
}
