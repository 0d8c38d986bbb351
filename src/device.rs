//! Block device: a host file treated as a fixed-size array of
//! equal-sized blocks.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

/// A single host file, opened once at mount and owned by the filesystem
/// for its lifetime.
pub struct BlockDevice {
    file: File,
    block_size: u32,
    block_count: u64,
}

impl BlockDevice {
    /// Wraps an already-open file as a block device of `block_count` blocks
    /// of `block_size` bytes each.
    pub fn new(file: File, block_size: u32, block_count: u64) -> Self {
        Self {
            file,
            block_size,
            block_count,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    fn check_range(&self, block_no: u64) -> Result<()> {
        if block_no >= self.block_count {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("block {block_no} out of range (device has {} blocks)", self.block_count),
            )));
        }
        Ok(())
    }

    /// Reads one whole block into a freshly allocated buffer.
    pub fn read_block(&mut self, block_no: u64) -> Result<Vec<u8>> {
        self.check_range(block_no)?;
        let mut buf = vec![0u8; self.block_size as usize];
        self.file.seek(SeekFrom::Start(block_no * self.block_size as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Writes one whole block. `data.len()` must equal `block_size`.
    pub fn write_block(&mut self, block_no: u64, data: &[u8]) -> Result<()> {
        self.check_range(block_no)?;
        if data.len() != self.block_size as usize {
            return Err(Error::Inval("write_block: data length != block_size"));
        }
        self.file.seek(SeekFrom::Start(block_no * self.block_size as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Flushes buffered writes to the host file.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}
