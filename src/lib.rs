//! Path canonicalization, access-mode negotiation and open-handle coordination for
//! virtual file systems. Sits between a desktop-style file API and a raw storage driver
//! (memory card, flash volume, host directory) that knows nothing about sharing.
//!
//! ### Overview
//!
//! `vfs-access` turns user supplied paths into canonical `\`-separated paths, decides
//! what a requested open may actually do on the underlying driver, and keeps a registry
//! of every claimed path so that conflicting opens, deletes and moves fail fast with a
//! sharing violation instead of corrupting each other.
//! It defines the [`StorageDriver`] trait and ships two drivers: [`MapFS`], an in-memory
//! volume, and [`DirFS`], which maps onto a host directory.
//!
//! **Key ideas**:
//! - **Canonical paths**: every operation resolves its input against the current
//!   directory first; [`CanonicalPath`] values are always absolute and validated.
//! - **Negotiated handles**: a [`FileHandle`] never claims more than the driver stream
//!   can do, and a read-only file never yields a writable handle.
//! - **Sharing**: [`HandleRegistry`] admits a claim only when every holder's share mode
//!   tolerates it and its own share mode tolerates every holder.
//! - **Subtree locks**: recursive deletes and moves lock the whole directory tree.
//!
//! ```
//! use std::sync::Arc;
//! use vfs_access::{MapFS, Vfs};
//!
//! let vfs = Vfs::new(Arc::new(MapFS::new()));
//! vfs.create_directory("\\sd\\logs").unwrap();
//! vfs.set_current_directory("\\sd").unwrap();
//! vfs.write_all_bytes("logs\\boot.txt", b"ok").unwrap();
//!
//! let reader = vfs.open_read("\\SD\\LOGS\\BOOT.TXT").unwrap();
//! assert!(vfs.delete_file("logs\\boot.txt").is_err());
//! reader.close().unwrap();
//! vfs.delete_file("logs\\boot.txt").unwrap();
//! ```

mod access;
mod config;
mod core;
mod error;
mod fs;
mod handle;
mod negotiator;
pub mod path;
mod registry;
mod vfs;

pub use access::{AccessRequest, FileAccess, OpenMode, ShareMode};
pub use config::{PathLimits, VfsConfig};
pub use self::core::{DirEntry, DriverCapability, DriverStream, FileAttributes, StorageDriver};
pub use error::{DriverError, DriverResult, Error, NotFoundKind, PathError, Result};
pub use fs::Vfs;
pub use handle::FileHandle;
pub use negotiator::Negotiator;
pub use path::CanonicalPath;
pub use registry::{DirectoryLock, HandleRegistry, Reservation};
pub use vfs::{DirFS, MapFS};
