//! Crate-wide error type.

use thiserror::Error;

/// Every fallible operation in this crate returns this alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds, one variant per recognizable failure mode.
#[derive(Debug, Error)]
pub enum Error {
    /// Host read/write against the backing file failed, or a block number
    /// fell outside the device.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record's magic number or internal consistency check failed.
    #[error("corrupt on-disk structure: {0}")]
    Corrupt(&'static str),

    /// No free block or inode was available.
    #[error("no space left on device")]
    NoSpace,

    /// A path component does not exist.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The creation target already exists.
    #[error("already exists: {0}")]
    Exists(String),

    /// Expected a directory, found something else.
    #[error("not a directory: {0}")]
    NotDir(String),

    /// Expected a non-directory, found a directory.
    #[error("is a directory: {0}")]
    IsDir(String),

    /// A directory removal target is not empty.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Symlink resolution exceeded the depth limit.
    #[error("too many levels of symbolic links")]
    Loop,

    /// An unknown file descriptor was used.
    #[error("bad file descriptor: {0}")]
    BadFd(u32),

    /// A bad argument was passed.
    #[error("invalid argument: {0}")]
    Inval(&'static str),
}
