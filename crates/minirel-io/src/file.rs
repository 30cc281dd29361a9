//! Raw block read/write primitives.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use minirel_core::{Block, BLOCK_BYTES};

use crate::error::{Error, Result};

/// A file of serialized blocks, opened for sequential or positional access.
pub struct BlockFile {
    file: File,
    path: PathBuf,
}

impl BlockFile {
    /// Open an existing file for reading.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            path: path.to_path_buf(),
        })
    }

    /// Create (or truncate) a file for writing.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            file: File::create(path)?,
            path: path.to_path_buf(),
        })
    }

    /// Open a file for appending, creating it if needed.
    pub fn append(path: &Path) -> Result<Self> {
        Ok(Self {
            file: OpenOptions::new().create(true).append(true).open(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read `dst.len()` blocks at the current position. Returns the number
    /// of block I/Os performed.
    pub fn read_blocks(&mut self, dst: &mut [Block]) -> Result<u32> {
        let mut buf = vec![0u8; BLOCK_BYTES];
        for block in dst.iter_mut() {
            self.file.read_exact(&mut buf)?;
            *block = Block::decode(&buf);
        }
        Ok(dst.len() as u32)
    }

    /// Read `dst.len()` blocks starting at the given block offset.
    pub fn read_blocks_at(&mut self, block_offset: u64, dst: &mut [Block]) -> Result<u32> {
        self.file
            .seek(SeekFrom::Start(block_offset * BLOCK_BYTES as u64))?;
        self.read_blocks(dst)
    }

    /// Write `src.len()` blocks at the current position. Returns the number
    /// of block I/Os performed.
    pub fn write_blocks(&mut self, src: &[Block]) -> Result<u32> {
        let mut buf = vec![0u8; BLOCK_BYTES];
        for block in src {
            block.encode(&mut buf);
            self.file.write_all(&buf)?;
        }
        Ok(src.len() as u32)
    }
}

/// Append a single staged block to the file at `path`, creating it on first
/// use. Returns the number of block I/Os performed.
pub fn append_block(path: &Path, block: &Block) -> Result<u32> {
    let mut file = BlockFile::append(path)?;
    file.write_blocks(std::slice::from_ref(block))
}

/// Size of a block file, in blocks. The byte length must divide exactly.
pub fn size_in_blocks(path: &Path) -> Result<u64> {
    let len = std::fs::metadata(path)?.len();
    if len % BLOCK_BYTES as u64 != 0 {
        return Err(Error::Corrupt {
            path: path.display().to_string(),
            reason: format!("byte length {len} is not a multiple of {BLOCK_BYTES}"),
        });
    }
    Ok(len / BLOCK_BYTES as u64)
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}
