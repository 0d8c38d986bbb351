//! Top-level filesystem handle and the Host API.
//!
//! `FileSystem` owns everything: the open host file, the mounted
//! superblock and group descriptors, and one process's table of open
//! descriptors and current directory. There is no global state — every
//! operation hangs off an explicit `&mut FileSystem`.

use std::fs::OpenOptions;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::bitmap::{alloc_inode, free_block, free_inode};
use crate::descriptor::{FdTable, OpenFlags};
use crate::device::BlockDevice;
use crate::directory::{self, FT_DIR, FT_REG, FT_SYMLINK};
use crate::error::{Error, Result};
use crate::extent;
use crate::inode::{self, Inode, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use crate::superblock::{
    self, ceil_div, GroupDescriptor, SuperBlock, GROUP_DESC_SIZE, INODE_SIZE, ROOT_INODE, SUPERBLOCK_SIZE,
};
use crate::{file, path};

/// Tunable parameters for `init_filesystem`. Any field left `None`
/// gets a size-derived default the way `mkfs`-style formatters in this
/// codebase pick one.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    pub block_size: Option<u32>,
    pub blocks_per_group: Option<u32>,
    pub inodes_per_group: Option<u32>,
}

const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Everything `stat`/`lstat` expose about an inode.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub inode_num: u32,
    pub mode: u32,
    pub links_count: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }
}

/// Aggregate space usage, as reported by `df`.
#[derive(Debug, Clone, Copy)]
pub struct FsStats {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
}

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn normalize_join(base: &str, rel: &str) -> String {
    let mut stack: Vec<&str> = if rel.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|s| !s.is_empty()).collect()
    };
    for comp in rel.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            c => stack.push(c),
        }
    }
    format!("/{}", stack.join("/"))
}

/// A mounted filesystem: one host file, plus the process-local state that
/// hangs off it. There is no global state.
pub struct FileSystem {
    device: BlockDevice,
    sb: SuperBlock,
    groups: Vec<GroupDescriptor>,
    fds: FdTable,
    cwd: u32,
    cwd_path: String,
}

impl FileSystem {
    /// Formats `path` as a new filesystem of `total_size_bytes` and mounts
    /// it, the way `Ext2Factory::create` formats a host file in one pass.
    pub fn init_filesystem(path: &Path, total_size_bytes: u64, options: FormatOptions) -> Result<Self> {
        let block_size = options.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
        if block_size == 0 || block_size % 512 != 0 {
            return Err(Error::Inval("init_filesystem: block_size must be a multiple of 512"));
        }
        let block_count = total_size_bytes / block_size as u64;
        if block_count < 8 {
            return Err(Error::Inval("init_filesystem: device too small"));
        }

        let blocks_per_group = options.blocks_per_group.unwrap_or(block_size * 8);
        if blocks_per_group == 0 || blocks_per_group > block_size * 8 {
            return Err(Error::Inval("init_filesystem: blocks_per_group exceeds one bitmap block"));
        }

        info!("formatting {} blocks of {} bytes", block_count, block_size);

        // Fixed point: the superblock + group descriptor table region
        // determines first_data_block, but its length depends on the
        // group count, which depends on how many blocks remain once that
        // region is reserved.
        let mut first_data_block: u32 = 1;
        for _ in 0..4 {
            let fs_size_blocks = block_count.saturating_sub(first_data_block as u64);
            let group_count = ceil_div(fs_size_blocks, blocks_per_group as u64).max(1);
            let region_bytes = SUPERBLOCK_SIZE as u64 + group_count * GROUP_DESC_SIZE as u64;
            let region_blocks = ceil_div(region_bytes, block_size as u64) as u32;
            if region_blocks == first_data_block {
                break;
            }
            first_data_block = region_blocks;
        }
        let fs_size_blocks = block_count - first_data_block as u64;
        let group_count = ceil_div(fs_size_blocks, blocks_per_group as u64).max(1);

        let inodes_per_group = options.inodes_per_group.unwrap_or((blocks_per_group / 4).max(8));
        if inodes_per_group as u64 * INODE_SIZE as u64 > blocks_per_group as u64 * block_size as u64 {
            return Err(Error::Inval("init_filesystem: inodes_per_group too large for its group"));
        }
        let inode_table_blocks =
            ceil_div(inodes_per_group as u64 * INODE_SIZE as u64, block_size as u64) as u32;

        let host_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        host_file.set_len(total_size_bytes)?;
        let mut device = BlockDevice::new(host_file, block_size, block_count);

        let mut groups = Vec::with_capacity(group_count as usize);
        let mut total_free_blocks = 0u64;
        let mut total_free_inodes = 0u64;

        for g in 0..group_count {
            let group_start = first_data_block as u64 + g * blocks_per_group as u64;
            let blocks_here = fs_size_blocks
                .saturating_sub(g * blocks_per_group as u64)
                .min(blocks_per_group as u64);

            let block_bitmap_block = group_start;
            let inode_bitmap_block = group_start + 1;
            let inode_table_block = group_start + 2;
            let meta_blocks = 2 + inode_table_blocks as u64;

            let mut block_bitmap = vec![0u8; block_size as usize];
            for bit in 0..blocks_here {
                if bit < meta_blocks {
                    block_bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
                }
            }
            for bit in blocks_here..(blocks_per_group as u64) {
                block_bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
            }
            device.write_block(block_bitmap_block, &block_bitmap)?;

            let mut inode_bitmap = vec![0u8; block_size as usize];
            if g == 0 {
                inode_bitmap[0] |= 0b11; // inode 1 (reserved) and inode 2 (root)
            }
            device.write_block(inode_bitmap_block, &inode_bitmap)?;

            for b in 0..inode_table_blocks as u64 {
                device.write_block(inode_table_block + b, &vec![0u8; block_size as usize])?;
            }

            let free_blocks_here = blocks_here.saturating_sub(meta_blocks) as u32;
            let free_inodes_here = if g == 0 { inodes_per_group - 2 } else { inodes_per_group };

            total_free_blocks += free_blocks_here as u64;
            total_free_inodes += free_inodes_here as u64;

            groups.push(GroupDescriptor {
                block_bitmap_block,
                inode_bitmap_block,
                inode_table_block,
                free_blocks_count: free_blocks_here,
                free_inodes_count: free_inodes_here,
            });
        }

        let mut sb = SuperBlock {
            fs_size_blocks,
            block_size,
            blocks_per_group,
            inodes_per_group,
            total_inodes: group_count * inodes_per_group as u64,
            free_blocks_count: total_free_blocks,
            free_inodes_count: total_free_inodes,
            first_data_block,
        };

        superblock::write_superblock(&mut device, &sb)?;
        for (i, gd) in groups.iter().enumerate() {
            superblock::write_group_descriptor(&mut device, i as u64, gd)?;
        }

        let now = now_unix();
        let mut root_inode = Inode::new(S_IFDIR | 0o755, now);
        root_inode.links_count = 2;
        inode::write_inode(&mut device, &sb, &groups, ROOT_INODE, &root_inode)?;
        directory::init_directory(&mut device, &mut sb, &mut groups, &mut root_inode, ROOT_INODE, ROOT_INODE, 0)?;
        inode::write_inode(&mut device, &sb, &groups, ROOT_INODE, &root_inode)?;

        device.flush()?;
        debug!("format complete: {} groups, {} inodes", group_count, sb.total_inodes);

        Ok(Self {
            device,
            sb,
            groups,
            fds: FdTable::new(),
            cwd: ROOT_INODE,
            cwd_path: "/".to_string(),
        })
    }

    /// Mounts an already-formatted host file.
    pub fn mount(path: &Path) -> Result<Self> {
        let host_file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = host_file.metadata()?.len();

        // Block size isn't known until the superblock is read; probe with
        // the smallest legal block to bootstrap, then re-open at the real
        // size once known.
        let mut probe = BlockDevice::new(host_file, 512, len / 512);
        let (sb, groups) = superblock::read_superblock_and_groups(&mut probe)?;

        let host_file = OpenOptions::new().read(true).write(true).open(path)?;
        let block_count = len / sb.block_size as u64;
        let device = BlockDevice::new(host_file, sb.block_size, block_count);

        info!("mounted {} ({} blocks, {} groups)", path.display(), block_count, groups.len());
        Ok(Self {
            device,
            sb,
            groups,
            fds: FdTable::new(),
            cwd: ROOT_INODE,
            cwd_path: "/".to_string(),
        })
    }

    fn resolve(&mut self, p: &str, follow_last: bool) -> Result<u32> {
        path::resolve(&mut self.device, &self.sb, &self.groups, ROOT_INODE, self.cwd, p, follow_last)
    }

    fn resolve_parent<'a>(&mut self, p: &'a str) -> Result<(u32, &'a str)> {
        path::resolve_parent(&mut self.device, &self.sb, &self.groups, ROOT_INODE, self.cwd, p)
    }

    fn read_inode(&mut self, ino: u32) -> Result<Inode> {
        inode::read_inode(&mut self.device, &self.sb, &self.groups, ino)
    }

    fn write_inode(&mut self, ino: u32, inode_obj: &Inode) -> Result<()> {
        inode::write_inode(&mut self.device, &self.sb, &self.groups, ino, inode_obj)
    }

    fn delete_inode(&mut self, ino: u32) -> Result<()> {
        let mut inode_obj = self.read_inode(ino)?;
        let freed = extent::truncate_to(&mut self.device, &mut inode_obj.extent_root, 0)?;
        for block in freed {
            free_block(&mut self.device, &mut self.sb, &mut self.groups, block)?;
        }
        self.write_inode(ino, &Inode::zeroed())?;
        free_inode(&mut self.device, &mut self.sb, &mut self.groups, ino)?;
        debug!("inode {} deleted", ino);
        Ok(())
    }

    /// Opens or creates a file, returning a descriptor.
    pub fn openf(&mut self, path_str: &str, flags: OpenFlags) -> Result<u32> {
        match self.resolve(path_str, true) {
            Ok(ino) => {
                let mut inode_obj = self.read_inode(ino)?;
                if inode_obj.is_dir() {
                    return Err(Error::IsDir(path_str.to_string()));
                }
                if flags.has(OpenFlags::TRUNC) && flags.writable() {
                    file::truncate(&mut self.device, &mut self.sb, &mut self.groups, &mut inode_obj, 0)?;
                    inode_obj.mtime = now_unix();
                    self.write_inode(ino, &inode_obj)?;
                }
                Ok(self.fds.insert(ino, flags))
            }
            Err(Error::NotFound(_)) if flags.has(OpenFlags::CREAT) => {
                let (parent_ino, name) = self.resolve_parent(path_str)?;
                let name = name.to_string();
                let mut parent_obj = self.read_inode(parent_ino)?;
                if !parent_obj.is_dir() {
                    return Err(Error::NotDir(path_str.to_string()));
                }

                let now = now_unix();
                let hint = self.sb.inode_group(parent_ino);
                let new_ino = alloc_inode(&mut self.device, &mut self.sb, &mut self.groups, hint, false)?;
                let mut new_inode = Inode::new(S_IFREG | 0o644, now);
                new_inode.links_count = 1;
                self.write_inode(new_ino, &new_inode)?;

                directory::insert(
                    &mut self.device,
                    &mut self.sb,
                    &mut self.groups,
                    &mut parent_obj,
                    &name,
                    new_ino,
                    FT_REG,
                    hint,
                )?;
                self.write_inode(parent_ino, &parent_obj)?;

                Ok(self.fds.insert(new_ino, flags))
            }
            Err(e) => Err(e),
        }
    }

    /// Reads from `fd` at its current cursor, advancing it.
    pub fn read(&mut self, fd: u32, buf: &mut [u8]) -> Result<usize> {
        let open = self.fds.get(fd)?.clone();
        if !open.flags.readable() {
            return Err(Error::Inval("read: descriptor not open for reading"));
        }
        let inode_obj = self.read_inode(open.inode_num)?;
        let n = file::read(&mut self.device, &self.sb, &inode_obj, open.offset, buf)?;
        self.fds.get_mut(fd)?.offset += n as u64;
        Ok(n)
    }

    /// Reads from `fd` at an explicit offset, without touching its cursor.
    pub fn read_at(&mut self, fd: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let open = self.fds.get(fd)?.clone();
        if !open.flags.readable() {
            return Err(Error::Inval("read_at: descriptor not open for reading"));
        }
        let inode_obj = self.read_inode(open.inode_num)?;
        file::read(&mut self.device, &self.sb, &inode_obj, offset, buf)
    }

    /// Writes to `fd` at its current cursor, advancing it.
    pub fn write(&mut self, fd: u32, data: &[u8]) -> Result<usize> {
        let open = self.fds.get(fd)?.clone();
        if !open.flags.writable() {
            return Err(Error::Inval("write: descriptor not open for writing"));
        }
        let mut inode_obj = self.read_inode(open.inode_num)?;
        let offset = open.offset;

        let hint = self.sb.inode_group(open.inode_num);
        let n = file::write(&mut self.device, &mut self.sb, &mut self.groups, &mut inode_obj, offset, data, hint)?;
        let now = now_unix();
        inode_obj.mtime = now;
        inode_obj.ctime = now;
        self.write_inode(open.inode_num, &inode_obj)?;
        self.fds.get_mut(fd)?.offset = offset + n as u64;
        Ok(n)
    }

    /// Writes to `fd` at an explicit offset, without touching its cursor.
    pub fn write_at(&mut self, fd: u32, offset: u64, data: &[u8]) -> Result<usize> {
        let open = self.fds.get(fd)?.clone();
        if !open.flags.writable() {
            return Err(Error::Inval("write_at: descriptor not open for writing"));
        }
        let mut inode_obj = self.read_inode(open.inode_num)?;
        let hint = self.sb.inode_group(open.inode_num);
        let n = file::write(&mut self.device, &mut self.sb, &mut self.groups, &mut inode_obj, offset, data, hint)?;
        let now = now_unix();
        inode_obj.mtime = now;
        inode_obj.ctime = now;
        self.write_inode(open.inode_num, &inode_obj)?;
        Ok(n)
    }

    /// Grows or shrinks an open file to exactly `new_size` bytes.
    pub fn ftruncate(&mut self, fd: u32, new_size: u64) -> Result<()> {
        let open = self.fds.get(fd)?.clone();
        if !open.flags.writable() {
            return Err(Error::Inval("ftruncate: descriptor not open for writing"));
        }
        let mut inode_obj = self.read_inode(open.inode_num)?;
        file::truncate(&mut self.device, &mut self.sb, &mut self.groups, &mut inode_obj, new_size)?;
        let now = now_unix();
        inode_obj.mtime = now;
        inode_obj.ctime = now;
        self.write_inode(open.inode_num, &inode_obj)?;
        Ok(())
    }

    /// Closes `fd`, finalizing any deletion deferred by `unlink` while it
    /// was still open.
    pub fn close(&mut self, fd: u32) -> Result<()> {
        let ino = self.fds.remove(fd)?;
        if !self.fds.is_open(ino) {
            let inode_obj = self.read_inode(ino)?;
            if inode_obj.links_count == 0 {
                self.delete_inode(ino)?;
            }
        }
        Ok(())
    }

    /// Removes a directory entry for a non-directory, deferring inode
    /// deletion while a descriptor is still open on it.
    pub fn unlink(&mut self, path_str: &str) -> Result<()> {
        let (parent_ino, name) = self.resolve_parent(path_str)?;
        let name = name.to_string();
        let parent_obj = self.read_inode(parent_ino)?;
        let (ino, ftype) = directory::lookup(&mut self.device, &self.sb, &parent_obj, &name)?
            .ok_or_else(|| Error::NotFound(path_str.to_string()))?;
        if ftype == FT_DIR {
            return Err(Error::IsDir(path_str.to_string()));
        }

        directory::remove(&mut self.device, &self.sb, &parent_obj, &name)?;

        let mut inode_obj = self.read_inode(ino)?;
        inode_obj.links_count = inode_obj.links_count.saturating_sub(1);
        inode_obj.ctime = now_unix();
        self.write_inode(ino, &inode_obj)?;

        if inode_obj.links_count == 0 && !self.fds.is_open(ino) {
            self.delete_inode(ino)?;
        }
        Ok(())
    }

    /// Creates an empty directory.
    pub fn mkdir(&mut self, path_str: &str) -> Result<()> {
        let (parent_ino, name) = self.resolve_parent(path_str)?;
        let name = name.to_string();
        let mut parent_obj = self.read_inode(parent_ino)?;
        if !parent_obj.is_dir() {
            return Err(Error::NotDir(path_str.to_string()));
        }
        if directory::lookup(&mut self.device, &self.sb, &parent_obj, &name)?.is_some() {
            return Err(Error::Exists(path_str.to_string()));
        }

        let now = now_unix();
        let hint = self.sb.inode_group(parent_ino);
        let new_ino = alloc_inode(&mut self.device, &mut self.sb, &mut self.groups, hint, true)?;
        let mut new_inode = Inode::new(S_IFDIR | 0o755, now);
        new_inode.links_count = 2;
        self.write_inode(new_ino, &new_inode)?;
        directory::init_directory(&mut self.device, &mut self.sb, &mut self.groups, &mut new_inode, new_ino, parent_ino, hint)?;
        self.write_inode(new_ino, &new_inode)?;

        directory::insert(&mut self.device, &mut self.sb, &mut self.groups, &mut parent_obj, &name, new_ino, FT_DIR, hint)?;
        parent_obj.links_count += 1;
        parent_obj.ctime = now;
        self.write_inode(parent_ino, &parent_obj)?;
        Ok(())
    }

    /// Removes an empty directory.
    pub fn rmdir(&mut self, path_str: &str) -> Result<()> {
        let (parent_ino, name) = self.resolve_parent(path_str)?;
        let name = name.to_string();
        let mut parent_obj = self.read_inode(parent_ino)?;
        let (ino, ftype) = directory::lookup(&mut self.device, &self.sb, &parent_obj, &name)?
            .ok_or_else(|| Error::NotFound(path_str.to_string()))?;
        if ftype != FT_DIR {
            return Err(Error::NotDir(path_str.to_string()));
        }

        let dir_obj = self.read_inode(ino)?;
        if !directory::is_empty(&mut self.device, &self.sb, &dir_obj)? {
            return Err(Error::NotEmpty(path_str.to_string()));
        }

        directory::remove(&mut self.device, &self.sb, &parent_obj, &name)?;
        self.delete_inode(ino)?;
        parent_obj.links_count = parent_obj.links_count.saturating_sub(1);
        self.write_inode(parent_ino, &parent_obj)?;
        Ok(())
    }

    /// Removes a directory and everything under it (supplemental).
    pub fn rmdir_recursive(&mut self, path_str: &str) -> Result<()> {
        let (parent_ino, name) = self.resolve_parent(path_str)?;
        let name = name.to_string();
        let mut parent_obj = self.read_inode(parent_ino)?;
        let (ino, ftype) = directory::lookup(&mut self.device, &self.sb, &parent_obj, &name)?
            .ok_or_else(|| Error::NotFound(path_str.to_string()))?;
        if ftype != FT_DIR {
            return Err(Error::NotDir(path_str.to_string()));
        }

        self.empty_directory_recursive(ino)?;
        directory::remove(&mut self.device, &self.sb, &parent_obj, &name)?;
        self.delete_inode(ino)?;
        parent_obj.links_count = parent_obj.links_count.saturating_sub(1);
        self.write_inode(parent_ino, &parent_obj)?;
        Ok(())
    }

    fn empty_directory_recursive(&mut self, ino: u32) -> Result<()> {
        let mut dir_obj = self.read_inode(ino)?;
        let entries = directory::read_all(&mut self.device, &self.sb, &dir_obj)?;

        for (name, child_ino, ftype) in entries {
            if name == "." || name == ".." {
                continue;
            }
            if ftype == FT_DIR {
                self.empty_directory_recursive(child_ino)?;
                directory::remove(&mut self.device, &self.sb, &dir_obj, &name)?;
                self.delete_inode(child_ino)?;
                dir_obj.links_count = dir_obj.links_count.saturating_sub(1);
            } else {
                directory::remove(&mut self.device, &self.sb, &dir_obj, &name)?;
                let mut child = self.read_inode(child_ino)?;
                child.links_count = child.links_count.saturating_sub(1);
                self.write_inode(child_ino, &child)?;
                if child.links_count == 0 && !self.fds.is_open(child_ino) {
                    self.delete_inode(child_ino)?;
                }
            }
        }
        self.write_inode(ino, &dir_obj)
    }

    /// Lists the entries of a directory.
    pub fn readdir(&mut self, path_str: &str) -> Result<Vec<(String, u32, u8)>> {
        let ino = self.resolve(path_str, true)?;
        let dir_obj = self.read_inode(ino)?;
        if !dir_obj.is_dir() {
            return Err(Error::NotDir(path_str.to_string()));
        }
        directory::read_all(&mut self.device, &self.sb, &dir_obj)
    }

    fn stat_of(&mut self, ino: u32) -> Result<Stat> {
        let obj = self.read_inode(ino)?;
        Ok(Stat {
            inode_num: ino,
            mode: obj.mode,
            links_count: obj.links_count,
            uid: obj.uid,
            gid: obj.gid,
            size: obj.size,
            atime: obj.atime,
            mtime: obj.mtime,
            ctime: obj.ctime,
        })
    }

    /// Stats the final target of `path`, following a trailing symlink.
    pub fn stat(&mut self, path_str: &str) -> Result<Stat> {
        let ino = self.resolve(path_str, true)?;
        self.stat_of(ino)
    }

    /// Stats `path` itself, without following a trailing symlink.
    pub fn lstat(&mut self, path_str: &str) -> Result<Stat> {
        let ino = self.resolve(path_str, false)?;
        self.stat_of(ino)
    }

    /// Creates a symbolic link at `link_path` pointing at `target`.
    pub fn symlink(&mut self, target: &str, link_path: &str) -> Result<()> {
        let (parent_ino, name) = self.resolve_parent(link_path)?;
        let name = name.to_string();
        let mut parent_obj = self.read_inode(parent_ino)?;
        if !parent_obj.is_dir() {
            return Err(Error::NotDir(link_path.to_string()));
        }
        if directory::lookup(&mut self.device, &self.sb, &parent_obj, &name)?.is_some() {
            return Err(Error::Exists(link_path.to_string()));
        }

        let now = now_unix();
        let hint = self.sb.inode_group(parent_ino);
        let new_ino = alloc_inode(&mut self.device, &mut self.sb, &mut self.groups, hint, false)?;
        let mut new_inode = Inode::new(S_IFLNK | 0o777, now);
        new_inode.links_count = 1;
        self.write_inode(new_ino, &new_inode)?;

        file::write(&mut self.device, &mut self.sb, &mut self.groups, &mut new_inode, 0, target.as_bytes(), hint)?;
        self.write_inode(new_ino, &new_inode)?;

        directory::insert(&mut self.device, &mut self.sb, &mut self.groups, &mut parent_obj, &name, new_ino, FT_SYMLINK, hint)?;
        self.write_inode(parent_ino, &parent_obj)?;
        Ok(())
    }

    /// Reads the text a symlink points at, without following it.
    pub fn readlink(&mut self, path_str: &str) -> Result<String> {
        let ino = self.resolve(path_str, false)?;
        let obj = self.read_inode(ino)?;
        if !obj.is_symlink() {
            return Err(Error::Inval("readlink: not a symbolic link"));
        }
        let mut buf = vec![0u8; obj.size as usize];
        file::read(&mut self.device, &self.sb, &obj, 0, &mut buf)?;
        String::from_utf8(buf).map_err(|_| Error::Corrupt("symlink: target is not valid utf-8"))
    }

    /// Adds another name for an existing non-directory file.
    pub fn link(&mut self, existing_path: &str, new_path: &str) -> Result<()> {
        let existing_ino = self.resolve(existing_path, true)?;
        let mut existing_obj = self.read_inode(existing_ino)?;
        if existing_obj.is_dir() {
            return Err(Error::IsDir(existing_path.to_string()));
        }

        let (parent_ino, name) = self.resolve_parent(new_path)?;
        let name = name.to_string();
        let mut parent_obj = self.read_inode(parent_ino)?;
        if !parent_obj.is_dir() {
            return Err(Error::NotDir(new_path.to_string()));
        }
        if directory::lookup(&mut self.device, &self.sb, &parent_obj, &name)?.is_some() {
            return Err(Error::Exists(new_path.to_string()));
        }

        let ftype = if existing_obj.is_symlink() { FT_SYMLINK } else { FT_REG };
        let hint = self.sb.inode_group(parent_ino);
        directory::insert(&mut self.device, &mut self.sb, &mut self.groups, &mut parent_obj, &name, existing_ino, ftype, hint)?;
        self.write_inode(parent_ino, &parent_obj)?;

        existing_obj.links_count += 1;
        existing_obj.ctime = now_unix();
        self.write_inode(existing_ino, &existing_obj)?;
        Ok(())
    }

    /// Changes the permission bits of an inode (open question,
    /// supplemental: the file type bits of `mode` are ignored).
    pub fn set_mode(&mut self, path_str: &str, mode: u32) -> Result<()> {
        let ino = self.resolve(path_str, true)?;
        let mut obj = self.read_inode(ino)?;
        obj.mode = (obj.mode & S_IFMT) | (mode & 0o7777);
        obj.ctime = now_unix();
        self.write_inode(ino, &obj)
    }

    /// Changes the current working directory.
    pub fn chdir(&mut self, path_str: &str) -> Result<()> {
        let ino = self.resolve(path_str, true)?;
        let obj = self.read_inode(ino)?;
        if !obj.is_dir() {
            return Err(Error::NotDir(path_str.to_string()));
        }
        self.cwd_path = normalize_join(&self.cwd_path, path_str);
        self.cwd = ino;
        Ok(())
    }

    /// Returns the tracked current working directory path.
    pub fn getcwd(&self) -> &str {
        &self.cwd_path
    }

    /// Aggregate space usage (supplemental).
    pub fn df(&self) -> FsStats {
        FsStats {
            block_size: self.sb.block_size,
            total_blocks: self.sb.fs_size_blocks + self.sb.first_data_block as u64,
            free_blocks: self.sb.free_blocks_count,
            total_inodes: self.sb.total_inodes,
            free_inodes: self.sb.free_inodes_count,
        }
    }

    /// Flushes any buffered writes to the host file.
    pub fn sync(&mut self) -> Result<()> {
        self.device.flush()
    }
}
