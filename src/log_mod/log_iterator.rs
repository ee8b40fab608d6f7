use std::sync::Arc;

use crate::common::{Result, SimpleDBError};
use crate::storage::{BlockId, FileManager, Page, INTEGER_BYTES};

/// Cursor over the log file, newest record first.
///
/// Works on its own copy of each block read from disk, never on the log
/// manager's tail page.
pub struct LogIterator {
    file_manager: Arc<FileManager>,
    last_block: BlockId,
    block: BlockId,
    page: Page,
    current_position: usize,
}

impl LogIterator {
    pub(crate) fn new(file_manager: Arc<FileManager>, last_block: BlockId) -> Self {
        let block_size = file_manager.block_size();
        let mut iter = Self {
            file_manager,
            block: last_block.clone(),
            last_block,
            page: Page::new(block_size),
            current_position: block_size,
        };
        iter.restart();
        iter
    }

    /// Rewinds to the newest record.
    pub fn restart(&mut self) {
        // One past the last block, so the first `next` loads it
        self.block = BlockId::new(
            self.last_block.filename(),
            self.last_block.number() + 1,
        );
        self.current_position = self.file_manager.block_size();
    }

    fn move_to_block(&mut self, block: BlockId) -> Result<()> {
        let block_size = self.file_manager.block_size();
        self.block = block;
        self.current_position = block_size;

        self.file_manager.read(&self.block, &mut self.page)?;
        let boundary = self.page.get_int(0)?;
        if boundary < INTEGER_BYTES as i32 || boundary as usize > block_size {
            return Err(SimpleDBError::CorruptLogRecord(format!(
                "boundary {} in log block {}",
                boundary, self.block
            )));
        }
        self.current_position = boundary as usize;
        Ok(())
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let block_size = self.file_manager.block_size();

        while self.current_position >= block_size {
            if self.block.number() <= 0 {
                return None;
            }
            let previous = BlockId::new(self.block.filename(), self.block.number() - 1);
            if let Err(e) = self.move_to_block(previous) {
                return Some(Err(e));
            }
        }

        match self.page.get_bytes(self.current_position) {
            Ok(record) => {
                let record = record.to_vec();
                self.current_position += Page::max_length(record.len());
                Some(Ok(record))
            }
            Err(_) => {
                let position = self.current_position;
                // Skip the rest of this block
                self.current_position = block_size;
                Some(Err(SimpleDBError::CorruptLogRecord(format!(
                    "bad record length at offset {} of log block {}",
                    position, self.block
                ))))
            }
        }
    }
}
