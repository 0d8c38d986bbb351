//! Superblock & group descriptors.

use crate::codec::{get_u32, get_u64, put_u32, put_u64, require_len};
use crate::crc32;
use crate::device::BlockDevice;
use crate::error::{Error, Result};

/// On-disk size of the superblock record.
pub const SUPERBLOCK_SIZE: usize = 56;
/// Bytes of the superblock covered by its checksum.
const CHECKSUM_COVERED: usize = 52;
/// On-disk size of one group descriptor record.
pub const GROUP_DESC_SIZE: usize = 32;
/// Size of one inode record.
pub const INODE_SIZE: usize = 88;
/// Root directory inode number.
pub const ROOT_INODE: u32 = 2;

/// Global filesystem header, stored at block 0 offset 0.
#[derive(Debug, Clone, Copy)]
pub struct SuperBlock {
    pub fs_size_blocks: u64,
    pub block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub total_inodes: u64,
    pub free_blocks_count: u64,
    pub free_inodes_count: u64,
    pub first_data_block: u32,
}

impl SuperBlock {
    pub fn pack(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        put_u64(&mut buf, 0, self.fs_size_blocks);
        put_u32(&mut buf, 8, self.block_size);
        put_u32(&mut buf, 12, self.blocks_per_group);
        put_u32(&mut buf, 16, self.inodes_per_group);
        put_u64(&mut buf, 20, self.total_inodes);
        put_u64(&mut buf, 28, self.free_blocks_count);
        put_u64(&mut buf, 36, self.free_inodes_count);
        put_u32(&mut buf, 44, self.first_data_block);
        // bytes 48..52 are reserved, already zeroed
        let checksum = crc32::checksum(&buf[0..CHECKSUM_COVERED]);
        put_u32(&mut buf, 52, checksum);
        buf
    }

    pub fn unpack(buf: &[u8]) -> Result<Self> {
        require_len(buf, SUPERBLOCK_SIZE, "superblock: short read")?;
        let checksum = get_u32(buf, 52);
        let expected = crc32::checksum(&buf[0..CHECKSUM_COVERED]);
        if checksum != expected {
            return Err(Error::Corrupt("superblock: checksum mismatch"));
        }
        Ok(Self {
            fs_size_blocks: get_u64(buf, 0),
            block_size: get_u32(buf, 8),
            blocks_per_group: get_u32(buf, 12),
            inodes_per_group: get_u32(buf, 16),
            total_inodes: get_u64(buf, 20),
            free_blocks_count: get_u64(buf, 28),
            free_inodes_count: get_u64(buf, 36),
            first_data_block: get_u32(buf, 44),
        })
    }

    /// Number of block groups covering this filesystem.
    pub fn group_count(&self) -> u64 {
        ceil_div(self.fs_size_blocks, self.blocks_per_group as u64)
    }

    /// Number of blocks occupied by one group's inode table.
    pub fn inode_table_blocks(&self) -> u64 {
        ceil_div(
            self.inodes_per_group as u64 * INODE_SIZE as u64,
            self.block_size as u64,
        )
    }

    /// First block belonging to group `i` (bitmap block).
    pub fn group_start(&self, i: u64) -> u64 {
        self.first_data_block as u64 + i * self.blocks_per_group as u64
    }

    /// Which group owns inode `n` (1-based).
    pub fn inode_group(&self, inode_num: u32) -> u64 {
        (inode_num as u64 - 1) / self.inodes_per_group as u64
    }

    /// Index of inode `n` within its group.
    pub fn inode_index_in_group(&self, inode_num: u32) -> u64 {
        (inode_num as u64 - 1) % self.inodes_per_group as u64
    }
}

/// Per-group metadata.
#[derive(Debug, Clone, Copy)]
pub struct GroupDescriptor {
    pub block_bitmap_block: u64,
    pub inode_bitmap_block: u64,
    pub inode_table_block: u64,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
}

impl GroupDescriptor {
    pub fn pack(&self) -> [u8; GROUP_DESC_SIZE] {
        let mut buf = [0u8; GROUP_DESC_SIZE];
        put_u64(&mut buf, 0, self.block_bitmap_block);
        put_u64(&mut buf, 8, self.inode_bitmap_block);
        put_u64(&mut buf, 16, self.inode_table_block);
        put_u32(&mut buf, 24, self.free_blocks_count);
        put_u32(&mut buf, 28, self.free_inodes_count);
        buf
    }

    pub fn unpack(buf: &[u8]) -> Result<Self> {
        require_len(buf, GROUP_DESC_SIZE, "group descriptor: short read")?;
        Ok(Self {
            block_bitmap_block: get_u64(buf, 0),
            inode_bitmap_block: get_u64(buf, 8),
            inode_table_block: get_u64(buf, 16),
            free_blocks_count: get_u32(buf, 24),
            free_inodes_count: get_u32(buf, 28),
        })
    }
}

pub fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Byte offset of the `i`th group descriptor, relative to the start of block 0.
fn descriptor_byte_offset(i: u64) -> u64 {
    SUPERBLOCK_SIZE as u64 + i * GROUP_DESC_SIZE as u64
}

/// Reads the superblock from block 0 and the whole group descriptor table,
/// which may spill past block 0.
pub fn read_superblock_and_groups(
    device: &mut BlockDevice,
) -> Result<(SuperBlock, Vec<GroupDescriptor>)> {
    let block0 = device.read_block(0)?;
    let sb = SuperBlock::unpack(&block0)?;
    let group_count = sb.group_count();

    let block_size = device.block_size() as u64;
    let mut groups = Vec::with_capacity(group_count as usize);
    let mut cached_block_no = 0u64;
    let mut cached: Vec<u8> = block0;

    for i in 0..group_count {
        let off = descriptor_byte_offset(i);
        let block_no = off / block_size;
        let local_off = (off % block_size) as usize;

        if block_no != cached_block_no {
            cached = device.read_block(block_no)?;
            cached_block_no = block_no;
        }
        let desc = GroupDescriptor::unpack(&cached[local_off..local_off + GROUP_DESC_SIZE])?;
        groups.push(desc);
    }

    Ok((sb, groups))
}

/// Writes the superblock back to block 0.
pub fn write_superblock(device: &mut BlockDevice, sb: &SuperBlock) -> Result<()> {
    let mut block0 = device.read_block(0)?;
    let packed = sb.pack();
    block0[0..SUPERBLOCK_SIZE].copy_from_slice(&packed);
    device.write_block(0, &block0)
}

/// Writes back only the block containing group descriptor `i`.
pub fn write_group_descriptor(
    device: &mut BlockDevice,
    i: u64,
    desc: &GroupDescriptor,
) -> Result<()> {
    let block_size = device.block_size() as u64;
    let off = descriptor_byte_offset(i);
    let block_no = off / block_size;
    let local_off = (off % block_size) as usize;

    let mut block = device.read_block(block_no)?;
    block[local_off..local_off + GROUP_DESC_SIZE].copy_from_slice(&desc.pack());
    device.write_block(block_no, &block)
}
