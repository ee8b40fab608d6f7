use std::fs::{File as StdFile, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{Result, SimpleDBError};

// Byte-addressed file backend - lets the file manager run on disk or in memory

pub trait File: Send {
    fn size(&self) -> Result<usize>;
    fn resize(&mut self, new_size: usize) -> Result<()>;
    fn read_block(&mut self, offset: usize, size: usize) -> Result<Vec<u8>>;
    fn write_block(&mut self, block: &[u8], offset: usize) -> Result<()>;
}

pub struct PosixFile {
    file: StdFile,
    cached_size: usize,
}

impl PosixFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let cached_size = file.metadata()?.len() as usize;

        Ok(Self { file, cached_size })
    }
}

impl File for PosixFile {
    fn size(&self) -> Result<usize> {
        Ok(self.cached_size)
    }

    fn resize(&mut self, new_size: usize) -> Result<()> {
        if new_size == self.cached_size {
            return Ok(());
        }

        self.file.set_len(new_size as u64)?;
        self.cached_size = new_size;

        Ok(())
    }

    fn read_block(&mut self, offset: usize, size: usize) -> Result<Vec<u8>> {
        if offset + size > self.cached_size {
            return Err(SimpleDBError::Other(format!(
                "Attempt to read past end of file: offset={}, size={}, filesize={}",
                offset, size, self.cached_size
            )));
        }

        let mut buffer = vec![0u8; size];
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn write_block(&mut self, block: &[u8], offset: usize) -> Result<()> {
        if offset + block.len() > self.cached_size {
            self.resize(offset + block.len())?;
        }

        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(block)?;
        // Log and data pages must be on disk when this returns
        self.file.sync_data()?;

        Ok(())
    }
}

// In-memory file implementation - useful for testing without hitting disk
#[derive(Default)]
pub struct MemoryFile {
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn get_data(&self) -> &[u8] {
        &self.data
    }
}

impl File for MemoryFile {
    fn size(&self) -> Result<usize> {
        Ok(self.data.len())
    }

    fn resize(&mut self, new_size: usize) -> Result<()> {
        self.data.resize(new_size, 0);
        Ok(())
    }

    fn read_block(&mut self, offset: usize, size: usize) -> Result<Vec<u8>> {
        if offset + size > self.data.len() {
            return Err(SimpleDBError::Other(format!(
                "Attempt to read past end of file: offset={}, size={}, filesize={}",
                offset,
                size,
                self.data.len()
            )));
        }

        Ok(self.data[offset..offset + size].to_vec())
    }

    fn write_block(&mut self, block: &[u8], offset: usize) -> Result<()> {
        if offset + block.len() > self.data.len() {
            self.resize(offset + block.len())?;
        }

        self.data[offset..offset + block.len()].copy_from_slice(block);
        Ok(())
    }
}
