//! Directory entries: a directory's data is a sequence of blocks each
//! packed with variable-length records, ext2-style. A deleted
//! entry is left in place with `inode == 0`; its slack is absorbed into
//! the previous record rather than compacted.

use crate::bitmap::alloc_block;
use crate::codec::{get_u32, get_u8, put_u32, put_u8};
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::extent;
use crate::inode::Inode;
use crate::superblock::{ceil_div, GroupDescriptor, SuperBlock};

/// `inode_num` u32, `entry_len` u32, `name_len` u32, `file_type` u8,
/// `reserved` u8, then `name` bytes.
const ENTRY_HEADER: usize = 14;
pub const MAX_NAME_LEN: usize = 255;

pub const FT_UNKNOWN: u8 = 0;
pub const FT_REG: u8 = 1;
pub const FT_DIR: u8 = 2;
pub const FT_SYMLINK: u8 = 3;

#[derive(Debug, Clone)]
struct DirEntry {
    inode: u32,
    rec_len: u32,
    file_type: u8,
    name: Vec<u8>,
}

/// Directory entry found during a scan, with its physical location so the
/// caller can patch it in place.
struct Located {
    block_no: u64,
    off: usize,
    entry: DirEntry,
}

fn dirent_len(name_len: usize) -> u32 {
    let base = ENTRY_HEADER + name_len;
    ((base + 3) & !3) as u32
}

fn pack_entry(buf: &mut [u8], off: usize, entry: &DirEntry) {
    put_u32(buf, off, entry.inode);
    put_u32(buf, off + 4, entry.rec_len);
    put_u32(buf, off + 8, entry.name.len() as u32);
    put_u8(buf, off + 12, entry.file_type);
    put_u8(buf, off + 13, 0);
    buf[off + ENTRY_HEADER..off + ENTRY_HEADER + entry.name.len()].copy_from_slice(&entry.name);
}

fn unpack_entry(buf: &[u8], off: usize) -> DirEntry {
    let inode = get_u32(buf, off);
    let rec_len = get_u32(buf, off + 4);
    let name_len = get_u32(buf, off + 8) as usize;
    let file_type = get_u8(buf, off + 12);
    let name = buf[off + ENTRY_HEADER..off + ENTRY_HEADER + name_len].to_vec();
    DirEntry {
        inode,
        rec_len,
        file_type,
        name,
    }
}

fn num_blocks(dir_inode: &Inode, bs: u64) -> u64 {
    ceil_div(dir_inode.size, bs)
}

/// Looks up `name` in `dir_inode`, returning its inode number and file
/// type if present.
pub fn lookup(device: &mut BlockDevice, sb: &SuperBlock, dir_inode: &Inode, name: &str) -> Result<Option<(u32, u8)>> {
    let bs = sb.block_size as u64;
    let name = name.as_bytes();

    for b in 0..num_blocks(dir_inode, bs) {
        let physical = match extent::lookup(device, &dir_inode.extent_root, b as u32)? {
            Some(p) => p,
            None => continue,
        };
        let block = device.read_block(physical)?;
        let mut off = 0usize;
        while off < block.len() {
            let entry = unpack_entry(&block, off);
            if entry.rec_len == 0 {
                break;
            }
            if entry.inode != 0 && entry.name == name {
                return Ok(Some((entry.inode, entry.file_type)));
            }
            off += entry.rec_len as usize;
        }
    }
    Ok(None)
}

/// Lists every live entry in `dir_inode`, in on-disk order.
pub fn read_all(device: &mut BlockDevice, sb: &SuperBlock, dir_inode: &Inode) -> Result<Vec<(String, u32, u8)>> {
    let bs = sb.block_size as u64;
    let mut out = Vec::new();

    for b in 0..num_blocks(dir_inode, bs) {
        let physical = match extent::lookup(device, &dir_inode.extent_root, b as u32)? {
            Some(p) => p,
            None => continue,
        };
        let block = device.read_block(physical)?;
        let mut off = 0usize;
        while off < block.len() {
            let entry = unpack_entry(&block, off);
            if entry.rec_len == 0 {
                break;
            }
            if entry.inode != 0 {
                let name = String::from_utf8_lossy(&entry.name).into_owned();
                out.push((name, entry.inode, entry.file_type));
            }
            off += entry.rec_len as usize;
        }
    }
    Ok(out)
}

fn find_locate(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    dir_inode: &Inode,
    name: &str,
) -> Result<Option<Located>> {
    let bs = sb.block_size as u64;
    let name = name.as_bytes();

    for b in 0..num_blocks(dir_inode, bs) {
        let physical = match extent::lookup(device, &dir_inode.extent_root, b as u32)? {
            Some(p) => p,
            None => continue,
        };
        let block = device.read_block(physical)?;
        let mut off = 0usize;
        while off < block.len() {
            let entry = unpack_entry(&block, off);
            if entry.rec_len == 0 {
                break;
            }
            if entry.inode != 0 && entry.name == name {
                return Ok(Some(Located {
                    block_no: physical,
                    off,
                    entry,
                }));
            }
            off += entry.rec_len as usize;
        }
    }
    Ok(None)
}

/// Allocates a fresh block for `dir_inode`, formats it as a single free
/// record spanning the whole block, and returns its physical block
/// number.
fn append_new_block(
    device: &mut BlockDevice,
    sb: &mut SuperBlock,
    groups: &mut [GroupDescriptor],
    dir_inode: &mut Inode,
    hint_group: u64,
) -> Result<u64> {
    let bs = sb.block_size as u32;
    let physical = alloc_block(device, sb, groups, hint_group)?;

    let mut block = vec![0u8; bs as usize];
    let free_entry = DirEntry {
        inode: 0,
        rec_len: bs,
        file_type: FT_UNKNOWN,
        name: Vec::new(),
    };
    pack_entry(&mut block, 0, &free_entry);
    device.write_block(physical, &block)?;

    let logical = ceil_div(dir_inode.size, sb.block_size as u64) as u32;
    extent::append(device, sb, groups, &mut dir_inode.extent_root, logical, physical, hint_group)?;
    dir_inode.size += sb.block_size as u64;
    Ok(physical)
}

/// Inserts `name -> inode_num` into `dir_inode`, reusing deleted or
/// slack space before growing the directory by a block.
pub fn insert(
    device: &mut BlockDevice,
    sb: &mut SuperBlock,
    groups: &mut [GroupDescriptor],
    dir_inode: &mut Inode,
    name: &str,
    inode_num: u32,
    file_type: u8,
    hint_group: u64,
) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') {
        return Err(Error::Inval("directory: bad entry name"));
    }
    if lookup(device, sb, dir_inode, name)?.is_some() {
        return Err(Error::Exists(name.to_string()));
    }

    let needed = dirent_len(name.len());
    let bs = sb.block_size as u64;

    for b in 0..num_blocks(dir_inode, bs) {
        let physical = match extent::lookup(device, &dir_inode.extent_root, b as u32)? {
            Some(p) => p,
            None => continue,
        };
        let mut block = device.read_block(physical)?;
        let mut off = 0usize;
        while off < block.len() {
            let entry = unpack_entry(&block, off);
            if entry.rec_len == 0 {
                break;
            }

            if entry.inode == 0 && entry.rec_len >= needed {
                let new_entry = DirEntry {
                    inode: inode_num,
                    rec_len: entry.rec_len,
                    file_type,
                    name: name.as_bytes().to_vec(),
                };
                pack_entry(&mut block, off, &new_entry);
                device.write_block(physical, &block)?;
                return Ok(());
            }

            let used = dirent_len(entry.name.len());
            let slack = entry.rec_len - used;
            if entry.inode != 0 && slack >= needed {
                let mut shrunk = entry.clone();
                shrunk.rec_len = used;
                pack_entry(&mut block, off, &shrunk);

                let new_entry = DirEntry {
                    inode: inode_num,
                    rec_len: slack,
                    file_type,
                    name: name.as_bytes().to_vec(),
                };
                pack_entry(&mut block, off + used as usize, &new_entry);
                device.write_block(physical, &block)?;
                return Ok(());
            }

            off += entry.rec_len as usize;
        }
    }

    let physical = append_new_block(device, sb, groups, dir_inode, hint_group)?;
    let mut block = device.read_block(physical)?;
    let free = unpack_entry(&block, 0);
    let bs32 = sb.block_size;

    if free.rec_len - needed >= dirent_len(0) {
        let new_entry = DirEntry {
            inode: inode_num,
            rec_len: needed,
            file_type,
            name: name.as_bytes().to_vec(),
        };
        pack_entry(&mut block, 0, &new_entry);
        let remainder = DirEntry {
            inode: 0,
            rec_len: bs32 - needed,
            file_type: FT_UNKNOWN,
            name: Vec::new(),
        };
        pack_entry(&mut block, needed as usize, &remainder);
    } else {
        let new_entry = DirEntry {
            inode: inode_num,
            rec_len: bs32,
            file_type,
            name: name.as_bytes().to_vec(),
        };
        pack_entry(&mut block, 0, &new_entry);
    }
    device.write_block(physical, &block)?;
    Ok(())
}

/// Removes `name` from `dir_inode`, absorbing its slack into the
/// previous record rather than compacting the block.
pub fn remove(device: &mut BlockDevice, sb: &SuperBlock, dir_inode: &Inode, name: &str) -> Result<u32> {
    let located = find_locate(device, sb, dir_inode, name)?
        .ok_or_else(|| Error::NotFound(name.to_string()))?;
    let removed_inode = located.entry.inode;

    let mut block = device.read_block(located.block_no)?;

    if located.off == 0 {
        let mut cleared = located.entry.clone();
        cleared.inode = 0;
        cleared.file_type = FT_UNKNOWN;
        cleared.name = Vec::new();
        pack_entry(&mut block, 0, &cleared);
    } else {
        let mut prev_off = 0usize;
        loop {
            let prev = unpack_entry(&block, prev_off);
            let next_off = prev_off + prev.rec_len as usize;
            if next_off == located.off {
                let mut merged = prev;
                merged.rec_len += located.entry.rec_len;
                pack_entry(&mut block, prev_off, &merged);
                break;
            }
            prev_off = next_off;
        }
    }

    device.write_block(located.block_no, &block)?;
    Ok(removed_inode)
}

/// Writes the `.` and `..` entries into a freshly allocated directory
/// (called right after an inode is created with `S_IFDIR`).
pub fn init_directory(
    device: &mut BlockDevice,
    sb: &mut SuperBlock,
    groups: &mut [GroupDescriptor],
    dir_inode: &mut Inode,
    self_ino: u32,
    parent_ino: u32,
    hint_group: u64,
) -> Result<()> {
    let physical = append_new_block(device, sb, groups, dir_inode, hint_group)?;
    let mut block = device.read_block(physical)?;
    let bs = sb.block_size;

    let dot_len = dirent_len(1);
    let dotdot_len = dirent_len(2);
    let rest = bs - dot_len - dotdot_len;

    pack_entry(
        &mut block,
        0,
        &DirEntry {
            inode: self_ino,
            rec_len: dot_len,
            file_type: FT_DIR,
            name: b".".to_vec(),
        },
    );
    pack_entry(
        &mut block,
        dot_len as usize,
        &DirEntry {
            inode: parent_ino,
            rec_len: dotdot_len + rest,
            file_type: FT_DIR,
            name: b"..".to_vec(),
        },
    );
    device.write_block(physical, &block)?;
    Ok(())
}

/// True once only `.` and `..` remain (rmdir precondition).
pub fn is_empty(device: &mut BlockDevice, sb: &SuperBlock, dir_inode: &Inode) -> Result<bool> {
    let entries = read_all(device, sb, dir_inode)?;
    Ok(entries.iter().all(|(name, _, _)| name == "." || name == ".."))
}
