//! Open file descriptor table.
//!
//! Descriptors are handed out starting at 3, leaving 0-2 free the way a
//! host process reserves stdin/stdout/stderr, even though this crate
//! does not wire them to anything itself.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Plain bitflags for `openf`, kept as a `u32` newtype rather than pulling
/// in the `bitflags` crate for five constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const RDONLY: u32 = 0;
    pub const WRONLY: u32 = 1;
    pub const RDWR: u32 = 2;
    pub const CREAT: u32 = 1 << 2;
    pub const TRUNC: u32 = 1 << 3;

    pub fn access(self) -> u32 {
        self.0 & 0b11
    }

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn readable(self) -> bool {
        matches!(self.access(), Self::RDONLY | Self::RDWR)
    }

    pub fn writable(self) -> bool {
        matches!(self.access(), Self::WRONLY | Self::RDWR)
    }
}

/// One open file: the inode it refers to and the cursor used by reads
/// and writes that don't pass an explicit offset.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub inode_num: u32,
    pub offset: u64,
    pub flags: OpenFlags,
}

/// Maps small integer descriptors to open files, for one `FileSystem`
/// instance (no cross-instance sharing).
#[derive(Debug, Default)]
pub struct FdTable {
    next_fd: u32,
    open: HashMap<u32, OpenFile>,
}

const FIRST_FD: u32 = 3;

impl FdTable {
    pub fn new() -> Self {
        Self {
            next_fd: FIRST_FD,
            open: HashMap::new(),
        }
    }

    pub fn insert(&mut self, inode_num: u32, flags: OpenFlags) -> u32 {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.open.insert(fd, OpenFile { inode_num, offset: 0, flags });
        fd
    }

    pub fn get(&self, fd: u32) -> Result<&OpenFile> {
        self.open.get(&fd).ok_or(Error::BadFd(fd))
    }

    pub fn get_mut(&mut self, fd: u32) -> Result<&mut OpenFile> {
        self.open.get_mut(&fd).ok_or(Error::BadFd(fd))
    }

    /// Removes `fd`, returning the inode it referred to so the caller can
    /// decide whether to finalize a pending deletion.
    pub fn remove(&mut self, fd: u32) -> Result<u32> {
        self.open.remove(&fd).map(|f| f.inode_num).ok_or(Error::BadFd(fd))
    }

    /// Whether any descriptor still refers to `inode_num` ("deferred
    /// deletion").
    pub fn is_open(&self, inode_num: u32) -> bool {
        self.open.values().any(|f| f.inode_num == inode_num)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fds_start_at_three_and_increase() {
        let mut table = FdTable::new();
        let a = table.insert(10, OpenFlags(OpenFlags::RDONLY));
        let b = table.insert(11, OpenFlags(OpenFlags::RDONLY));
        assert_eq!(a, 3);
        assert_eq!(b, 4);
    }

    #[test]
    fn bad_fd_errors() {
        let table = FdTable::new();
        assert!(matches!(table.get(99), Err(Error::BadFd(99))));
    }

    #[test]
    fn is_open_tracks_shared_inode() {
        let mut table = FdTable::new();
        let fd = table.insert(5, OpenFlags(OpenFlags::RDWR));
        assert!(table.is_open(5));
        table.remove(fd).unwrap();
        assert!(!table.is_open(5));
    }
}
