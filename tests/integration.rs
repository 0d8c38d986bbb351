//! End-to-end exercises against a formatted host file, the way the
//! teacher crate's own CLI tools are exercised against a scratch disk
//! image in its own test style.

use std::collections::HashSet;

use loopfs::{Error, FileSystem, FormatOptions, OpenFlags};
use tempfile::NamedTempFile;

const SMALL_FS_BYTES: u64 = 16 * 1024 * 1024;

fn format_small() -> (NamedTempFile, FileSystem) {
    let _ = env_logger::builder().is_test(true).try_init();
    let file = NamedTempFile::new().expect("create scratch file");
    let fs = FileSystem::init_filesystem(file.path(), SMALL_FS_BYTES, FormatOptions::default())
        .expect("format");
    (file, fs)
}

#[test]
fn format_then_mount_round_trips_free_space() {
    let (file, mut fs) = format_small();
    let before = fs.df();
    fs.sync().unwrap();
    drop(fs);

    let mut remounted = FileSystem::mount(file.path()).unwrap();
    let after = remounted.df();
    assert_eq!(before.total_blocks, after.total_blocks);
    assert_eq!(before.free_blocks, after.free_blocks);
    assert_eq!(before.total_inodes, after.total_inodes);
}

#[test]
fn create_write_read_round_trips_file_contents() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/hello.txt", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
    let n = fs.write(fd, b"hello, filesystem").unwrap();
    assert_eq!(n, 18);
    fs.close(fd).unwrap();

    let fd = fs.openf("/hello.txt", OpenFlags(OpenFlags::RDONLY)).unwrap();
    let mut buf = [0u8; 18];
    let n = fs.read(fd, &mut buf).unwrap();
    assert_eq!(n, 18);
    assert_eq!(&buf, b"hello, filesystem");
    fs.close(fd).unwrap();
}

#[test]
fn write_past_eof_zero_fills_the_gap() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/sparse.bin", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
    fs.write_at(fd, 10_000, b"tail").unwrap();
    fs.close(fd).unwrap();

    let fd = fs.openf("/sparse.bin", OpenFlags(OpenFlags::RDONLY)).unwrap();
    let mut buf = vec![0u8; 10_004];
    fs.read(fd, &mut buf).unwrap();
    assert!(buf[0..10_000].iter().all(|&b| b == 0));
    assert_eq!(&buf[10_000..10_004], b"tail");
    fs.close(fd).unwrap();

    let st = fs.stat("/sparse.bin").unwrap();
    assert_eq!(st.size, 10_004);
}

#[test]
fn large_write_spans_many_extents_and_reads_back() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/big.bin", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();

    let mut pattern = Vec::new();
    for i in 0..200_000u32 {
        pattern.extend_from_slice(&i.to_le_bytes());
    }
    fs.write(fd, &pattern).unwrap();
    fs.close(fd).unwrap();

    let fd = fs.openf("/big.bin", OpenFlags(OpenFlags::RDONLY)).unwrap();
    let mut readback = vec![0u8; pattern.len()];
    let n = fs.read(fd, &mut readback).unwrap();
    assert_eq!(n, pattern.len());
    assert_eq!(readback, pattern);
    fs.close(fd).unwrap();
}

#[test]
fn truncate_shrink_frees_blocks_and_zeroes_tail() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/shrink.bin", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
    fs.write(fd, &vec![0xAAu8; 20_000]).unwrap();
    let free_before_shrink = fs.df().free_blocks;

    fs.ftruncate(fd, 100).unwrap();
    assert!(fs.df().free_blocks > free_before_shrink);

    let mut buf = [0u8; 100];
    fs.read_at(fd, 0, &mut buf).unwrap();
    assert!(buf.iter().all(|&b| b == 0xAA));
    fs.close(fd).unwrap();

    let st = fs.stat("/shrink.bin").unwrap();
    assert_eq!(st.size, 100);
}

#[test]
fn truncate_grow_zero_fills_new_tail() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/grow.bin", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
    fs.write(fd, b"abc").unwrap();
    fs.ftruncate(fd, 4096 + 10).unwrap();
    fs.close(fd).unwrap();

    let st = fs.stat("/grow.bin").unwrap();
    assert_eq!(st.size, 4096 + 10);

    let fd = fs.openf("/grow.bin", OpenFlags(OpenFlags::RDONLY)).unwrap();
    let mut buf = vec![0u8; 4096 + 10];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf[0..3], b"abc");
    assert!(buf[3..].iter().all(|&b| b == 0));
    fs.close(fd).unwrap();
}

#[test]
fn mkdir_readdir_and_dot_entries() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/etc").unwrap();
    fs.mkdir("/etc/sub").unwrap();

    let entries = fs.readdir("/etc").unwrap();
    let names: Vec<&str> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert!(names.contains(&"."));
    assert!(names.contains(&".."));
    assert!(names.contains(&"sub"));

    let st = fs.stat("/etc").unwrap();
    assert!(st.is_dir());
}

#[test]
fn mkdir_existing_name_fails() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/dup").unwrap();
    assert!(fs.mkdir("/dup").is_err());
}

#[test]
fn rmdir_requires_empty_directory() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/full").unwrap();
    let fd = fs.openf("/full/file.txt", OpenFlags(OpenFlags::WRONLY | OpenFlags::CREAT)).unwrap();
    fs.close(fd).unwrap();

    assert!(fs.rmdir("/full").is_err());
    fs.unlink("/full/file.txt").unwrap();
    fs.rmdir("/full").unwrap();
    assert!(fs.stat("/full").is_err());
}

#[test]
fn rmdir_recursive_removes_nested_tree() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/tree").unwrap();
    fs.mkdir("/tree/a").unwrap();
    fs.mkdir("/tree/a/b").unwrap();
    let fd = fs.openf("/tree/a/leaf.txt", OpenFlags(OpenFlags::WRONLY | OpenFlags::CREAT)).unwrap();
    fs.write(fd, b"x").unwrap();
    fs.close(fd).unwrap();

    fs.rmdir_recursive("/tree").unwrap();
    assert!(fs.stat("/tree").is_err());
}

#[test]
fn symlink_resolves_to_target_contents() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/real.txt", OpenFlags(OpenFlags::WRONLY | OpenFlags::CREAT)).unwrap();
    fs.write(fd, b"target data").unwrap();
    fs.close(fd).unwrap();

    fs.symlink("/real.txt", "/link.txt").unwrap();

    let fd = fs.openf("/link.txt", OpenFlags(OpenFlags::RDONLY)).unwrap();
    let mut buf = [0u8; 11];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"target data");
    fs.close(fd).unwrap();

    let lst = fs.lstat("/link.txt").unwrap();
    assert!(lst.is_symlink());
    assert_eq!(fs.readlink("/link.txt").unwrap(), "/real.txt");
}

#[test]
fn symlink_loop_is_rejected() {
    let (_file, mut fs) = format_small();
    fs.symlink("/b", "/a").unwrap();
    fs.symlink("/a", "/b").unwrap();
    assert!(fs.openf("/a", OpenFlags(OpenFlags::RDONLY)).is_err());
}

#[test]
fn hard_link_shares_data_and_tracks_link_count() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/orig.txt", OpenFlags(OpenFlags::WRONLY | OpenFlags::CREAT)).unwrap();
    fs.write(fd, b"shared").unwrap();
    fs.close(fd).unwrap();

    fs.link("/orig.txt", "/alias.txt").unwrap();
    assert_eq!(fs.stat("/orig.txt").unwrap().links_count, 2);

    fs.unlink("/orig.txt").unwrap();
    let fd = fs.openf("/alias.txt", OpenFlags(OpenFlags::RDONLY)).unwrap();
    let mut buf = [0u8; 6];
    fs.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"shared");
    fs.close(fd).unwrap();
}

#[test]
fn unlink_while_open_defers_deletion_until_close() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/ephemeral.txt", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
    fs.write(fd, b"still readable").unwrap();

    fs.unlink("/ephemeral.txt").unwrap();
    assert!(fs.stat("/ephemeral.txt").is_err());

    let mut buf = [0u8; 14];
    let n = fs.read(fd, &mut buf).unwrap();
    assert_eq!(n, 14);
    assert_eq!(&buf, b"still readable");

    let free_before_close = fs.df().free_blocks;
    fs.close(fd).unwrap();
    assert!(fs.df().free_blocks >= free_before_close);
}

#[test]
fn chdir_and_getcwd_track_relative_paths() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    fs.chdir("/a").unwrap();
    assert_eq!(fs.getcwd(), "/a");
    fs.chdir("b").unwrap();
    assert_eq!(fs.getcwd(), "/a/b");
    fs.chdir("..").unwrap();
    assert_eq!(fs.getcwd(), "/a");
}

#[test]
fn dot_dot_at_root_stays_at_root() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/x").unwrap();
    let st = fs.stat("/../../x").unwrap();
    assert!(st.is_dir());
}

#[test]
fn set_mode_changes_permission_bits_only() {
    let (_file, mut fs) = format_small();
    let fd = fs.openf("/perm.txt", OpenFlags(OpenFlags::WRONLY | OpenFlags::CREAT)).unwrap();
    fs.close(fd).unwrap();

    let before = fs.stat("/perm.txt").unwrap();
    fs.set_mode("/perm.txt", 0o600).unwrap();
    let after = fs.stat("/perm.txt").unwrap();

    assert_eq!(after.mode & 0o7777, 0o600);
    assert!(after.is_regular());
    assert_eq!(before.mode & !0o7777, after.mode & !0o7777);
}

#[test]
fn df_reflects_allocation_and_freeing() {
    let (_file, mut fs) = format_small();
    let start = fs.df().free_blocks;

    let fd = fs.openf("/space.bin", OpenFlags(OpenFlags::WRONLY | OpenFlags::CREAT)).unwrap();
    fs.write(fd, &vec![1u8; 100_000]).unwrap();
    fs.close(fd).unwrap();
    let after_write = fs.df().free_blocks;
    assert!(after_write < start);

    fs.unlink("/space.bin").unwrap();
    let after_unlink = fs.df().free_blocks;
    assert!(after_unlink > after_write);
}

#[test]
fn opening_a_directory_as_a_file_fails() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/adir").unwrap();
    assert!(fs.openf("/adir", OpenFlags(OpenFlags::RDONLY)).is_err());
}

#[test]
fn unlinking_a_directory_fails() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/adir").unwrap();
    assert!(fs.unlink("/adir").is_err());
}

#[test]
fn eight_mib_image_with_4kib_blocks_has_2048_total_blocks() {
    let file = NamedTempFile::new().expect("create scratch file");
    let fs = FileSystem::init_filesystem(
        file.path(),
        8 * 1024 * 1024,
        FormatOptions { block_size: Some(4096), ..FormatOptions::default() },
    )
    .expect("format");

    let stats = fs.df();
    assert_eq!(stats.block_size, 4096);
    assert_eq!(stats.total_blocks, 2048);
}

#[test]
fn fresh_root_has_inode_two_and_only_dot_entries() {
    let (_file, mut fs) = format_small();
    assert_eq!(fs.stat("/").unwrap().inode_num, 2);

    let entries = fs.readdir("/").unwrap();
    let names: HashSet<&str> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, HashSet::from([".", ".."]));
}

#[test]
fn deleting_every_other_file_keeps_listing_ordered_and_dedup() {
    let (_file, mut fs) = format_small();
    fs.mkdir("/many").unwrap();

    let mut created = Vec::new();
    for i in 0..4000 {
        let name = format!("file_{i:04}");
        let path = format!("/many/{name}");
        let fd = fs.openf(&path, OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
        fs.close(fd).unwrap();
        created.push(name);
    }

    for (i, name) in created.iter().enumerate() {
        if i % 2 == 0 {
            fs.unlink(&format!("/many/{name}")).unwrap();
        }
    }
    let expected: Vec<&str> = created
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, n)| n.as_str())
        .collect();

    let entries = fs.readdir("/many").unwrap();
    let listed: Vec<&str> = entries
        .iter()
        .map(|(n, _, _)| n.as_str())
        .filter(|n| *n != "." && *n != "..")
        .collect();

    assert_eq!(listed, expected);

    let unique: HashSet<&str> = listed.iter().copied().collect();
    assert_eq!(unique.len(), listed.len());
}

#[test]
fn filling_disk_returns_nospace_and_leaves_size_unchanged() {
    let file = NamedTempFile::new().expect("create scratch file");
    let opts = FormatOptions {
        block_size: Some(512),
        blocks_per_group: Some(256),
        inodes_per_group: Some(32),
    };
    let mut fs = FileSystem::init_filesystem(file.path(), 256 * 512, opts).expect("format");

    let fd = fs.openf("/big.bin", OpenFlags(OpenFlags::RDWR | OpenFlags::CREAT)).unwrap();
    let chunk = vec![0xabu8; 4096];
    let mut last_good_size = 0u64;
    loop {
        match fs.write(fd, &chunk) {
            Ok(_) => {
                last_good_size = fs.stat("/big.bin").unwrap().size;
            }
            Err(Error::NoSpace) => break,
            Err(e) => panic!("unexpected error filling disk: {e}"),
        }
    }

    let size_after_failure = fs.stat("/big.bin").unwrap().size;
    assert_eq!(size_after_failure, last_good_size);
}
