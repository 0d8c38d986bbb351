//! An ext4-inspired filesystem that lives inside a single host file.
//!
//! [`FileSystem`] is the entry point: [`FileSystem::init_filesystem`]
//! formats a new host file and [`FileSystem::mount`] opens an existing
//! one. Every other operation hangs off the returned handle.

mod bitmap;
mod codec;
mod crc32;
mod descriptor;
mod device;
mod directory;
mod error;
mod extent;
mod file;
mod fs;
mod inode;
mod path;
mod superblock;

pub use descriptor::OpenFlags;
pub use directory::{FT_DIR, FT_REG, FT_SYMLINK, FT_UNKNOWN};
pub use error::{Error, Result};
pub use fs::{FileSystem, FormatOptions, FsStats, Stat};
pub use inode::{S_IFDIR, S_IFLNK, S_IFREG};
