//! Inodes and the per-group inode table.

use crate::codec::{get_u32, get_u64, put_u32, put_u64, require_len};
use crate::device::BlockDevice;
use crate::error::Result;
use crate::superblock::{GroupDescriptor, SuperBlock, INODE_SIZE};

/// POSIX-style file type bits packed into the high bits of `mode`.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;

/// Bytes of inline extent-tree root stored in every inode.
pub const EXTENT_ROOT_SIZE: usize = 48;

/// A single inode record.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub links_count: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub flags: u32,
    /// Inline root of this file's extent tree.
    pub extent_root: [u8; EXTENT_ROOT_SIZE],
}

impl Inode {
    pub fn new(mode: u32, now: u32) -> Self {
        let mut extent_root = [0u8; EXTENT_ROOT_SIZE];
        crate::extent::init_leaf(&mut extent_root);
        Self {
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            links_count: 0,
            atime: now,
            ctime: now,
            mtime: now,
            flags: 0,
            extent_root,
        }
    }

    /// An all-zero record, written back over a deleted inode's slot.
    pub fn zeroed() -> Self {
        Self {
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            links_count: 0,
            atime: 0,
            ctime: 0,
            mtime: 0,
            flags: 0,
            extent_root: [0u8; EXTENT_ROOT_SIZE],
        }
    }

    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.file_type() == S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    pub fn pack(&self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        put_u32(&mut buf, 0, self.mode);
        put_u32(&mut buf, 4, self.uid);
        put_u32(&mut buf, 8, self.gid);
        put_u64(&mut buf, 12, self.size);
        put_u32(&mut buf, 20, self.links_count);
        put_u32(&mut buf, 24, self.atime);
        put_u32(&mut buf, 28, self.ctime);
        put_u32(&mut buf, 32, self.mtime);
        put_u32(&mut buf, 36, self.flags);
        buf[40..88].copy_from_slice(&self.extent_root);
        buf
    }

    pub fn unpack(buf: &[u8]) -> Result<Self> {
        require_len(buf, INODE_SIZE, "inode: short read")?;
        let mut extent_root = [0u8; EXTENT_ROOT_SIZE];
        extent_root.copy_from_slice(&buf[40..88]);
        Ok(Self {
            mode: get_u32(buf, 0),
            uid: get_u32(buf, 4),
            gid: get_u32(buf, 8),
            size: get_u64(buf, 12),
            links_count: get_u32(buf, 20),
            atime: get_u32(buf, 24),
            ctime: get_u32(buf, 28),
            mtime: get_u32(buf, 32),
            flags: get_u32(buf, 36),
            extent_root,
        })
    }
}

fn locate(sb: &SuperBlock, groups: &[GroupDescriptor], inode_num: u32) -> (u64, usize) {
    let g = sb.inode_group(inode_num);
    let index = sb.inode_index_in_group(inode_num);
    let byte_off = index * INODE_SIZE as u64;
    let block_no = groups[g as usize].inode_table_block + byte_off / sb.block_size as u64;
    let local_off = (byte_off % sb.block_size as u64) as usize;
    (block_no, local_off)
}

/// Reads inode `inode_num` from its group's inode table.
pub fn read_inode(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    inode_num: u32,
) -> Result<Inode> {
    let (block_no, local_off) = locate(sb, groups, inode_num);
    let buf = device.read_block(block_no)?;
    Inode::unpack(&buf[local_off..local_off + INODE_SIZE])
}

/// Writes inode `inode_num` back to its group's inode table.
pub fn write_inode(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    inode_num: u32,
    inode: &Inode,
) -> Result<()> {
    let (block_no, local_off) = locate(sb, groups, inode_num);
    let mut buf = device.read_block(block_no)?;
    buf[local_off..local_off + INODE_SIZE].copy_from_slice(&inode.pack());
    device.write_block(block_no, &buf)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip() {
        let mut inode = Inode::new(S_IFREG | 0o644, 1_700_000_000);
        inode.links_count = 1;
        inode.size = 4096;
        inode.extent_root[0] = 0xAB;

        let packed = inode.pack();
        let unpacked = Inode::unpack(&packed).unwrap();
        assert_eq!(unpacked.mode, inode.mode);
        assert_eq!(unpacked.size, inode.size);
        assert_eq!(unpacked.extent_root, inode.extent_root);
        assert!(unpacked.is_regular());
    }

    #[test]
    fn file_type_checks() {
        let dir = Inode::new(S_IFDIR | 0o755, 0);
        assert!(dir.is_dir());
        assert!(!dir.is_regular());
        let link = Inode::new(S_IFLNK | 0o777, 0);
        assert!(link.is_symlink());
    }
}
