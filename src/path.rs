//! Path resolution: component walking, `.`/`..`, and symlink following
//! with a depth limit.

use crate::device::BlockDevice;
use crate::directory::{self, FT_SYMLINK};
use crate::error::{Error, Result};
use crate::file;
use crate::inode::{self, Inode};
use crate::superblock::{GroupDescriptor, SuperBlock};

/// Maximum symlink indirections followed before giving up with
/// `Error::Loop`.
pub const MAX_SYMLINK_DEPTH: u32 = 40;

/// Resolves `path` to an inode number, starting at `cwd_inode` for
/// relative paths and `root_inode` for absolute ones. When
/// `follow_last_symlink` is false, a symlink as the final component is
/// returned unresolved (the `lstat`/`unlink`/`symlink`-target case).
pub fn resolve(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    root_inode: u32,
    cwd_inode: u32,
    path: &str,
    follow_last_symlink: bool,
) -> Result<u32> {
    let mut depth = 0u32;
    resolve_internal(device, sb, groups, root_inode, cwd_inode, path, follow_last_symlink, &mut depth)
}

/// Resolves the parent directory of `path` and returns it along with the
/// final path component, for operations that create or remove a name
/// (`mkdir`, `unlink`, `symlink`, `link`, ...).
pub fn resolve_parent<'a>(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    root_inode: u32,
    cwd_inode: u32,
    path: &'a str,
) -> Result<(u32, &'a str)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Inval("path: empty or refers to root"));
    }
    let (parent_path, name) = match trimmed.rfind('/') {
        Some(i) => (&trimmed[..=i], &trimmed[i + 1..]),
        None => ("", trimmed),
    };
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::Inval("path: invalid final component"));
    }
    let parent_ino = if parent_path.is_empty() {
        cwd_inode
    } else {
        resolve(device, sb, groups, root_inode, cwd_inode, parent_path, true)?
    };
    Ok((parent_ino, name))
}

fn resolve_internal(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    root_inode: u32,
    cwd_inode: u32,
    path: &str,
    follow_last_symlink: bool,
    depth: &mut u32,
) -> Result<u32> {
    let mut current = if path.starts_with('/') { root_inode } else { cwd_inode };

    let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let n = components.len();

    for (i, comp) in components.iter().enumerate() {
        let is_last = i + 1 == n;

        if *comp == ".." {
            if current != root_inode {
                let dir = inode::read_inode(device, sb, groups, current)?;
                if !dir.is_dir() {
                    return Err(Error::NotDir(comp.to_string()));
                }
                current = directory::lookup(device, sb, &dir, "..")?
                    .map(|(ino, _)| ino)
                    .ok_or_else(|| Error::Corrupt("directory missing '..' entry"))?;
            }
            continue;
        }

        let dir = inode::read_inode(device, sb, groups, current)?;
        if !dir.is_dir() {
            return Err(Error::NotDir(comp.to_string()));
        }
        let (next_ino, ftype) = directory::lookup(device, sb, &dir, comp)?
            .ok_or_else(|| Error::NotFound(comp.to_string()))?;

        if ftype == FT_SYMLINK && (!is_last || follow_last_symlink) {
            current = follow_symlink(device, sb, groups, root_inode, current, next_ino, depth)?;
        } else {
            current = next_ino;
        }
    }

    Ok(current)
}

fn follow_symlink(
    device: &mut BlockDevice,
    sb: &SuperBlock,
    groups: &[GroupDescriptor],
    root_inode: u32,
    containing_dir: u32,
    link_ino: u32,
    depth: &mut u32,
) -> Result<u32> {
    *depth += 1;
    if *depth > MAX_SYMLINK_DEPTH {
        return Err(Error::Loop);
    }

    let link_inode: Inode = inode::read_inode(device, sb, groups, link_ino)?;
    let mut target = vec![0u8; link_inode.size as usize];
    file::read(device, sb, &link_inode, 0, &mut target)?;
    let target_str =
        String::from_utf8(target).map_err(|_| Error::Corrupt("symlink: target is not valid utf-8"))?;

    resolve_internal(device, sb, groups, root_inode, containing_dir, &target_str, true, depth)
}
