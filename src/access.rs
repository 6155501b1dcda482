//! Open modes, requested access and share declarations.

use bitflags::bitflags;

use crate::error::{Error, Result};

/// Existence preconditions and truncation behavior of an open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Fails if the file exists.
    CreateNew,
    /// Creates the file, truncating an existing one.
    Create,
    /// Fails if the file does not exist.
    Open,
    OpenOrCreate,
    /// Fails if the file does not exist, otherwise truncates it.
    Truncate,
    /// Opens or creates, positions at the end and forbids seeking before it.
    Append,
}

impl OpenMode {
    /// Modes that may be requested without write access.
    pub fn allows_read_only(&self) -> bool {
        matches!(self, OpenMode::Open | OpenMode::OpenOrCreate)
    }
}

bitflags! {
    /// Access requested by a caller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAccess: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Access other handles may have on the same path while this one is open.
    ///
    /// The bits line up with [`FileAccess`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShareMode: u8 {
        const NONE = 0b00;
        const READ = 0b01;
        const WRITE = 0b10;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl ShareMode {
    /// True if this share declaration tolerates another handle with `access`.
    pub fn permits(&self, access: FileAccess) -> bool {
        self.bits() & access.bits() == access.bits()
    }
}

/// A validated access request: at least one of read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    pub wants_read: bool,
    pub wants_write: bool,
}

impl AccessRequest {
    pub fn new(access: FileAccess) -> Result<Self> {
        if access.is_empty() {
            return Err(Error::Argument("access must include read or write"));
        }
        Ok(Self {
            wants_read: access.contains(FileAccess::READ),
            wants_write: access.contains(FileAccess::WRITE),
        })
    }

    pub fn is_write_only(&self) -> bool {
        self.wants_write && !self.wants_read
    }

    /// Rejects mode/access pairs that can never succeed.
    pub fn validate_for(&self, mode: OpenMode) -> Result<()> {
        if mode == OpenMode::Append && !self.is_write_only() {
            return Err(Error::Argument("append requires write-only access"));
        }
        if !mode.allows_read_only() && !self.wants_write {
            return Err(Error::Argument("mode requires write access"));
        }
        Ok(())
    }
}
