//! File data I/O: read, write, and truncate over a file's extent tree.
//! Writes only ever extend a file; gaps created by writing past the
//! current end, or by an upward truncate, are materialized as real
//! zeroed blocks — this filesystem has no sparse files.

use crate::bitmap::{alloc_block, free_block};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::extent;
use crate::inode::Inode;
use crate::superblock::{ceil_div, GroupDescriptor, SuperBlock};

/// Reads up to `buf.len()` bytes starting at `offset`, returning the
/// number of bytes actually read (short only at end of file).
pub fn read(device: &mut BlockDevice, sb: &SuperBlock, inode: &Inode, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if offset >= inode.size {
        return Ok(0);
    }
    let bs = sb.block_size as u64;
    let avail = inode.size - offset;
    let to_read = (buf.len() as u64).min(avail) as usize;

    let mut done = 0usize;
    let mut pos = offset;
    while done < to_read {
        let b = pos / bs;
        let in_block_off = (pos % bs) as usize;
        let take = (bs as usize - in_block_off).min(to_read - done);

        match extent::lookup(device, &inode.extent_root, b as u32)? {
            Some(physical) => {
                let block_buf = device.read_block(physical)?;
                buf[done..done + take].copy_from_slice(&block_buf[in_block_off..in_block_off + take]);
            }
            None => {
                buf[done..done + take].fill(0);
            }
        }
        pos += take as u64;
        done += take;
    }
    Ok(done)
}

/// Writes `data` at `offset`, extending the file and zero-filling any gap
/// before `offset` if it lies past the current end of file.
pub fn write(
    device: &mut BlockDevice,
    sb: &mut SuperBlock,
    groups: &mut [GroupDescriptor],
    inode: &mut Inode,
    offset: u64,
    data: &[u8],
    hint_group: u64,
) -> Result<usize> {
    let bs = sb.block_size as u64;
    let end_offset = offset + data.len() as u64;

    let current_blocks = ceil_div(inode.size, bs);
    let target_blocks = ceil_div(end_offset.max(inode.size), bs);

    for b in current_blocks..target_blocks {
        let physical = alloc_block(device, sb, groups, hint_group)?;
        device.write_block(physical, &vec![0u8; bs as usize])?;
        extent::append(device, sb, groups, &mut inode.extent_root, b as u32, physical, hint_group)?;
    }

    let mut remaining = data;
    let mut pos = offset;
    let mut written = 0usize;
    while !remaining.is_empty() {
        let b = pos / bs;
        let in_block_off = (pos % bs) as usize;
        let take = (bs as usize - in_block_off).min(remaining.len());

        let physical = extent::lookup(device, &inode.extent_root, b as u32)?
            .ok_or(Error::Corrupt("write: block missing after allocation"))?;
        let mut block_buf = device.read_block(physical)?;
        block_buf[in_block_off..in_block_off + take].copy_from_slice(&remaining[..take]);
        device.write_block(physical, &block_buf)?;

        remaining = &remaining[take..];
        pos += take as u64;
        written += take;
    }

    if end_offset > inode.size {
        inode.size = end_offset;
    }
    Ok(written)
}

/// Grows or shrinks a file to exactly `new_size` bytes, zero-filling any
/// newly exposed region on growth.
pub fn truncate(
    device: &mut BlockDevice,
    sb: &mut SuperBlock,
    groups: &mut [GroupDescriptor],
    inode: &mut Inode,
    new_size: u64,
) -> Result<()> {
    let bs = sb.block_size as u64;

    if new_size >= inode.size {
        let current_blocks = ceil_div(inode.size, bs);
        let target_blocks = ceil_div(new_size, bs);
        for b in current_blocks..target_blocks {
            let physical = alloc_block(device, sb, groups, 0)?;
            device.write_block(physical, &vec![0u8; bs as usize])?;
            extent::append(device, sb, groups, &mut inode.extent_root, b as u32, physical, 0)?;
        }
        inode.size = new_size;
        return Ok(());
    }

    let target_blocks = ceil_div(new_size, bs) as u32;
    let freed = extent::truncate_to(device, &mut inode.extent_root, target_blocks)?;
    for block in freed {
        free_block(device, sb, groups, block)?;
    }

    if new_size % bs != 0 {
        if let Some(physical) = extent::lookup(device, &inode.extent_root, (new_size / bs) as u32)? {
            let mut block_buf = device.read_block(physical)?;
            let off = (new_size % bs) as usize;
            block_buf[off..].fill(0);
            device.write_block(physical, &block_buf)?;
        }
    }

    inode.size = new_size;
    Ok(())
}
