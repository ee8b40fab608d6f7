use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use parking_lot::Mutex;

use crate::common::{Result, SimpleDBError};
use crate::storage::{BlockId, File, MemoryFile, Page, PosixFile};

/// Block-level I/O counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub blocks_read: u64,
    pub blocks_written: u64,
}

/// Reads and writes fixed-size blocks. The only component that touches disk.
pub struct FileManager {
    db_directory: Option<PathBuf>,
    block_size: usize,
    is_new: bool,
    open_files: Mutex<HashMap<String, Box<dyn File>>>,
    blocks_read: AtomicU64,
    blocks_written: AtomicU64,
}

impl FileManager {
    pub fn new(db_directory: &Path, block_size: usize) -> Result<Self> {
        let is_new = !db_directory.exists();
        if is_new {
            fs::create_dir_all(db_directory)?;
        }

        // Temporary tables do not survive a restart
        for entry in fs::read_dir(db_directory)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with("temp") {
                debug!("removing leftover temporary file {:?}", entry.path());
                fs::remove_file(entry.path())?;
            }
        }

        info!(
            "file manager on {:?} (block size {}, new: {})",
            db_directory, block_size, is_new
        );

        Ok(Self {
            db_directory: Some(db_directory.to_path_buf()),
            block_size,
            is_new,
            open_files: Mutex::new(HashMap::new()),
            blocks_read: AtomicU64::new(0),
            blocks_written: AtomicU64::new(0),
        })
    }

    /// File manager whose files live in memory. Contents vanish with it.
    pub fn in_memory(block_size: usize) -> Self {
        Self {
            db_directory: None,
            block_size,
            is_new: true,
            open_files: Mutex::new(HashMap::new()),
            blocks_read: AtomicU64::new(0),
            blocks_written: AtomicU64::new(0),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Reads a block into `page`. Bytes past the end of the file read as zero.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> Result<()> {
        self.check_page(page)?;
        let offset = self.block_offset(block)?;

        let mut files = self.open_files.lock();
        let file = self.get_file(&mut files, block.filename())?;
        let file_size = file.size()?;

        let data = page.contents_mut();
        data.fill(0);
        if offset < file_size {
            let available = (file_size - offset).min(self.block_size);
            let bytes = file.read_block(offset, available)?;
            data[..available].copy_from_slice(&bytes);
        }

        self.blocks_read.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn write(&self, block: &BlockId, page: &Page) -> Result<()> {
        self.check_page(page)?;
        let offset = self.block_offset(block)?;

        let mut files = self.open_files.lock();
        let file = self.get_file(&mut files, block.filename())?;
        file.write_block(page.contents(), offset)?;

        self.blocks_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Extends the file by one zeroed block and returns its id.
    pub fn append(&self, filename: &str) -> Result<BlockId> {
        let mut files = self.open_files.lock();
        let file = self.get_file(&mut files, filename)?;

        let number = file.size()? / self.block_size;
        let block = BlockId::new(filename, number as i32);
        file.write_block(&vec![0; self.block_size], number * self.block_size)?;

        self.blocks_written.fetch_add(1, Ordering::Relaxed);
        Ok(block)
    }

    /// Number of blocks in the file.
    pub fn length(&self, filename: &str) -> Result<i32> {
        let mut files = self.open_files.lock();
        let file = self.get_file(&mut files, filename)?;
        Ok((file.size()? / self.block_size) as i32)
    }

    pub fn stats(&self) -> BlockStats {
        BlockStats {
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            blocks_written: self.blocks_written.load(Ordering::Relaxed),
        }
    }

    fn get_file<'a>(
        &self,
        files: &'a mut HashMap<String, Box<dyn File>>,
        filename: &str,
    ) -> Result<&'a mut Box<dyn File>> {
        if !files.contains_key(filename) {
            let file: Box<dyn File> = match &self.db_directory {
                Some(dir) => Box::new(PosixFile::open(&dir.join(filename))?),
                None => Box::new(MemoryFile::new()),
            };
            files.insert(filename.to_string(), file);
        }

        files
            .get_mut(filename)
            .ok_or_else(|| SimpleDBError::Other(format!("file {} not open", filename)))
    }

    fn block_offset(&self, block: &BlockId) -> Result<usize> {
        if block.number() < 0 {
            return Err(SimpleDBError::Other(format!(
                "{} does not address a real block",
                block
            )));
        }
        Ok(block.number() as usize * self.block_size)
    }

    fn check_page(&self, page: &Page) -> Result<()> {
        if page.len() != self.block_size {
            return Err(SimpleDBError::Other(format!(
                "page of {} bytes does not match block size {}",
                page.len(),
                self.block_size
            )));
        }
        Ok(())
    }
}
