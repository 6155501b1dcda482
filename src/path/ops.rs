//! Substring operations over raw or canonical path strings.
//!
//! None of these touch storage. Each one rejects reserved characters up front and
//! otherwise works by scanning from the end of the string.

use super::{SEPARATOR, check_reserved};
use crate::error::PathError;

/// Length of the root marker: `\` for rooted paths, `\\server\share` for server paths,
/// nothing for relative ones.
pub(crate) fn root_length(path: &str) -> usize {
    let bytes = path.as_bytes();
    let sep = SEPARATOR as u8;
    if bytes.first() != Some(&sep) {
        return 0;
    }
    if bytes.get(1) != Some(&sep) {
        return 1;
    }
    let mut i = 2;
    let mut separators = 2;
    while i < bytes.len() {
        if bytes[i] == sep {
            separators -= 1;
            if separators == 0 {
                break;
            }
        }
        i += 1;
    }
    i
}

fn file_name_start(path: &str) -> usize {
    path.rfind(SEPARATOR).map_or(0, |i| i + 1)
}

pub fn is_path_rooted(path: &str) -> Result<bool, PathError> {
    check_reserved(path)?;
    Ok(path.starts_with(SEPARATOR))
}

/// Joins two paths with exactly one separator.
///
/// An empty operand yields the other one; a rooted `b` replaces `a` entirely.
pub fn combine(a: &str, b: &str) -> Result<String, PathError> {
    check_reserved(a)?;
    check_reserved(b)?;

    if b.is_empty() {
        return Ok(a.to_string());
    }
    if a.is_empty() || b.starts_with(SEPARATOR) {
        return Ok(b.to_string());
    }
    if a.ends_with(SEPARATOR) {
        Ok(format!("{a}{b}"))
    } else {
        Ok(format!("{a}{SEPARATOR}{b}"))
    }
}

pub fn get_path_root(path: &str) -> Result<&str, PathError> {
    check_reserved(path)?;
    Ok(&path[..root_length(path)])
}

/// Everything before the last separator.
///
/// Returns `None` (not an empty string) when `path` is nothing but a root.
pub fn get_directory_name(path: &str) -> Result<Option<&str>, PathError> {
    check_reserved(path)?;
    let root = root_length(path);
    if path.len() <= root {
        return Ok(None);
    }
    let end = path[root..].rfind(SEPARATOR).map_or(root, |i| root + i);
    Ok(Some(&path[..end]))
}

pub fn get_file_name(path: &str) -> Result<&str, PathError> {
    check_reserved(path)?;
    Ok(&path[file_name_start(path)..])
}

/// Extension including the leading dot, or `""`.
///
/// A name ending with a dot has no extension.
pub fn get_extension(path: &str) -> Result<&str, PathError> {
    let name = get_file_name(path)?;
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() => Ok(&name[dot..]),
        _ => Ok(""),
    }
}

pub fn has_extension(path: &str) -> Result<bool, PathError> {
    get_extension(path).map(|ext| !ext.is_empty())
}

pub fn get_file_name_without_extension(path: &str) -> Result<&str, PathError> {
    let name = get_file_name(path)?;
    match name.rfind('.') {
        Some(dot) => Ok(&name[..dot]),
        None => Ok(name),
    }
}

/// Replaces the extension of the last segment.
///
/// `None` strips the extension. A new extension without a leading dot gets one.
pub fn change_extension(path: &str, extension: Option<&str>) -> Result<String, PathError> {
    check_reserved(path)?;
    let name_start = file_name_start(path);
    let stem_end = path[name_start..]
        .rfind('.')
        .map_or(path.len(), |dot| name_start + dot);

    let mut changed = path[..stem_end].to_string();
    if let Some(extension) = extension {
        if !path.is_empty() {
            check_reserved(extension)?;
            if !extension.starts_with('.') {
                changed.push('.');
            }
            changed.push_str(extension);
        }
    }
    Ok(changed)
}
