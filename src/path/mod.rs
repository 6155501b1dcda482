//! Path canonicalization and pure path-string operations.
//!
//! Paths use `\` as the separator. A rooted path starts with exactly one separator
//! (`\volume\dir\file`), a server path with exactly two (`\\server\share\file`).
//! Everything else is relative and gets resolved against a current directory.

mod canonical;
mod ops;

use std::fmt;

use crate::config::PathLimits;
use crate::error::PathError;

pub use canonical::{canonicalize, normalize, validate_search_pattern};
pub use ops::{
    change_extension, combine, get_directory_name, get_extension, get_file_name,
    get_file_name_without_extension, get_path_root, has_extension, is_path_rooted,
};

pub const SEPARATOR: char = '\\';

/// Characters that may never appear in a path.
const RESERVED_CHARS: [char; 6] = ['/', '"', '<', '>', '|', ':'];

/// Characters only allowed in search patterns.
const WILDCARD_CHARS: [char; 2] = ['?', '*'];

pub(crate) fn is_reserved(c: char) -> bool {
    RESERVED_CHARS.contains(&c) || (c as u32) < 0x20
}

pub(crate) fn is_wildcard(c: char) -> bool {
    WILDCARD_CHARS.contains(&c)
}

pub(crate) fn check_reserved(path: &str) -> Result<(), PathError> {
    match path.chars().find(|&c| is_reserved(c)) {
        Some(c) => Err(PathError::ReservedCharacter(c)),
        None => Ok(()),
    }
}

/// Returns true if `path` equals `dir` or lies somewhere below it.
///
/// Both arguments must be canonical (or canonical paths folded the same way).
pub(crate) fn is_in_directory(path: &str, dir: &str) -> bool {
    if dir.len() == 1 && dir.starts_with(SEPARATOR) {
        return path.starts_with(SEPARATOR) && !path.starts_with("\\\\");
    }
    match path.strip_prefix(dir) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// A fully resolved, validated absolute path.
///
/// Produced only by [`canonicalize`] (or derived from another canonical path), so it
/// always starts with a root marker, contains no `.`/`..` segments, no reserved
/// characters and no trailing separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(String);

impl CanonicalPath {
    /// The root `\`.
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    pub(crate) fn from_normalized(path: String) -> Self {
        debug_assert!(path.starts_with(SEPARATOR));
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// True for `\\server\...` paths.
    pub fn is_server(&self) -> bool {
        self.0.starts_with("\\\\")
    }

    /// Last segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.0.rsplit(SEPARATOR).next()
    }

    /// Containing directory, `None` when this path is a root.
    pub fn parent(&self) -> Option<CanonicalPath> {
        let root = ops::root_length(&self.0);
        if self.0.len() <= root {
            return None;
        }
        let end = self.0[root..].rfind(SEPARATOR).map_or(root, |i| root + i);
        Some(Self(self.0[..end].to_string()))
    }

    /// Appends a single child segment.
    pub fn join(&self, name: &str, limits: &PathLimits) -> Result<CanonicalPath, PathError> {
        if name.contains(SEPARATOR) || name.chars().all(|c| c == '.' || c == ' ') {
            return Err(PathError::InvalidSegment(name.to_string()));
        }
        let combined = combine(&self.0, name)?;
        normalize(&combined, false, limits).map(Self)
    }

    /// Appends a name exactly as a driver reported it, without normalizing it.
    ///
    /// `None` for names no path segment can carry (empty, `.`, `..`, or containing the
    /// separator).
    pub(crate) fn join_entry(&self, name: &str) -> Option<CanonicalPath> {
        if name.is_empty() || name == "." || name == ".." || name.contains(SEPARATOR) {
            return None;
        }
        let mut path = self.0.clone();
        if !self.is_root() {
            path.push(SEPARATOR);
        }
        path.push_str(name);
        Some(Self(path))
    }

    /// True if `self` equals `dir` or lies below it (case-sensitive).
    pub fn starts_with_dir(&self, dir: &CanonicalPath) -> bool {
        is_in_directory(&self.0, &dir.0)
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for CanonicalPath {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CanonicalPath {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
