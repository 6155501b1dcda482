use std::borrow::Cow;

use super::{CanonicalPath, SEPARATOR, check_reserved, combine, is_reserved, is_wildcard};
use crate::config::PathLimits;
use crate::error::PathError;

enum Root {
    Relative,
    Rooted,
    Server,
}

enum Segment<'a> {
    Current,
    Parent,
    Name(&'a str),
}

fn classify_root(path: &str) -> Result<Root, PathError> {
    let leading = path.chars().take_while(|&c| c == SEPARATOR).count();
    match leading {
        0 => Ok(Root::Relative),
        1 => Ok(Root::Rooted),
        2 if path.len() > 2 => Ok(Root::Server),
        _ => Err(PathError::MalformedRoot),
    }
}

fn check_length(path: &str, root: &Root, limits: &PathLimits) -> Result<(), PathError> {
    match root {
        Root::Rooted => {
            let rest = &path[SEPARATOR.len_utf8()..];
            let volume_len = rest
                .split(SEPARATOR)
                .next()
                .map_or(0, |volume| volume.chars().count());
            if volume_len >= limits.max_volume_name_length {
                return Err(PathError::VolumeNameTooLong);
            }
            if rest.chars().count() - volume_len >= limits.max_path_length {
                return Err(PathError::TooLong);
            }
        }
        Root::Relative | Root::Server => {
            if path.chars().count() >= limits.max_unrooted_path_length {
                return Err(PathError::TooLong);
            }
        }
    }
    Ok(())
}

/// Segments made only of dots and spaces are navigation or garbage.
/// Ordinary names lose their trailing dots and spaces.
fn classify_segment(segment: &str) -> Result<Segment<'_>, PathError> {
    if segment.chars().all(|c| c == '.' || c == ' ') {
        return match segment.trim_end_matches(' ') {
            "." => Ok(Segment::Current),
            ".." if segment == ".." => Ok(Segment::Parent),
            _ => Err(PathError::InvalidSegment(segment.to_string())),
        };
    }
    Ok(Segment::Name(segment.trim_end_matches(['.', ' '])))
}

/// Validates and normalizes `path` without resolving it against a current directory.
///
/// Rooted and server inputs keep their root marker; relative inputs come back relative.
/// With `pattern` set, wildcards (`?`, `*`) are accepted but the input must be a bare
/// single-segment pattern.
///
/// # Errors
/// * [`PathError::Empty`] for an empty input.
/// * [`PathError::ReservedCharacter`] for reserved or control characters anywhere, and
///   for wildcards outside pattern mode.
/// * [`PathError::MalformedRoot`] for three or more leading separators, or a server
///   path without a server name.
/// * [`PathError::VolumeNameTooLong`] / [`PathError::TooLong`] when a length ceiling of
///   `limits` is reached.
/// * [`PathError::InvalidSegment`] for segments of dots and spaces other than `.` or `..`.
/// * [`PathError::AscendPastRoot`] when `..` has nothing left to pop.
pub fn normalize(path: &str, pattern: bool, limits: &PathLimits) -> Result<String, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    check_reserved(path)?;

    let root = classify_root(path)?;
    check_length(path, &root, limits)?;

    if pattern && path.contains(SEPARATOR) {
        return Err(PathError::InvalidPattern);
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        if segment.chars().count() > limits.max_filename_length {
            return Err(PathError::TooLong);
        }
        if let Some(c) = segment
            .chars()
            .find(|&c| is_reserved(c) || (!pattern && is_wildcard(c)))
        {
            return Err(PathError::ReservedCharacter(c));
        }
        match classify_segment(segment)? {
            Segment::Current => {}
            Segment::Parent => {
                if segments.pop().is_none() {
                    return Err(PathError::AscendPastRoot);
                }
            }
            Segment::Name(name) => segments.push(name),
        }
    }

    let mut normalized = String::with_capacity(path.len());
    match root {
        Root::Rooted => normalized.push(SEPARATOR),
        Root::Server => {
            if segments.is_empty() {
                return Err(PathError::MalformedRoot);
            }
            normalized.push(SEPARATOR);
            normalized.push(SEPARATOR);
        }
        Root::Relative => {}
    }
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            normalized.push(SEPARATOR);
        }
        normalized.push_str(segment);
    }
    // `.` and `..` may have moved a different segment into the volume position
    check_length(&normalized, &root, limits)?;
    Ok(normalized)
}

/// Resolves `raw` against `current_dir` and normalizes the result into a [`CanonicalPath`].
///
/// Rooted inputs ignore `current_dir`. Idempotent: canonicalizing a canonical path
/// yields the same path.
pub fn canonicalize(
    raw: &str,
    current_dir: &CanonicalPath,
    limits: &PathLimits,
) -> Result<CanonicalPath, PathError> {
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    check_reserved(raw)?;

    let full = if raw.starts_with(SEPARATOR) {
        Cow::Borrowed(raw)
    } else {
        Cow::Owned(combine(current_dir.as_str(), raw)?)
    };
    normalize(&full, false, limits).map(CanonicalPath::from_normalized)
}

/// Validates a directory search pattern such as `*.txt`.
pub fn validate_search_pattern(pattern: &str, limits: &PathLimits) -> Result<String, PathError> {
    let normalized = normalize(pattern, true, limits)?;
    if normalized.is_empty() {
        return Err(PathError::InvalidPattern);
    }
    Ok(normalized)
}
