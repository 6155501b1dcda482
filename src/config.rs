//! Tunables of the access layer.

/// Length ceilings enforced while canonicalizing paths.
///
/// Lengths are counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathLimits {
    /// Ceiling for everything after the volume segment of a rooted path.
    pub max_path_length: usize,
    /// Ceiling for server (`\\server\...`) and relative inputs.
    pub max_unrooted_path_length: usize,
    /// Longest allowed single segment.
    pub max_filename_length: usize,
    /// Longest allowed first segment of a rooted path.
    pub max_volume_name_length: usize,
}

impl Default for PathLimits {
    fn default() -> Self {
        Self {
            max_path_length: 258,
            max_unrooted_path_length: 260,
            max_filename_length: 255,
            max_volume_name_length: 32,
        }
    }
}

/// Configuration of a [`Vfs`](crate::Vfs) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsConfig {
    pub limits: PathLimits,
    /// Buffer-size hint handed to the driver on open; also the copy chunk size.
    pub buffer_size: usize,
    /// When `false` the registry treats paths differing only in case as the same file.
    pub case_sensitive: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            limits: PathLimits::default(),
            buffer_size: 4096,
            case_sensitive: false,
        }
    }
}

impl VfsConfig {
    pub fn with_limits(mut self, limits: PathLimits) -> Self {
        self.limits = limits;
        self
    }

    /// A zero size is bumped to one byte.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}
