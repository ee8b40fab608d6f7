use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::common::{Lsn, Result, SimpleDBError};
use crate::log_mod::LogIterator;
use crate::storage::{BlockId, FileManager, Page, INTEGER_BYTES};

struct LogState {
    log_page: Page,
    current_block: BlockId,
    latest_lsn: u64,
    last_saved_lsn: u64,
}

/// Append-only log of byte records.
///
/// Block layout:
///
/// ```text
/// | boundary | free space ... | len | record n | len | record n-1 | ... |
/// 0          4                boundary                        block_size
/// ```
///
/// Records are packed from the end of the block towards the front and the
/// integer at offset 0 points at the most recently written one, so a block
/// reads newest-first without an index. Only the last block is cached; it
/// reaches disk when it fills up or when `flush` asks for it.
pub struct LogManager {
    file_manager: Arc<FileManager>,
    log_file: String,
    state: Mutex<LogState>,
}

impl LogManager {
    pub fn new(file_manager: Arc<FileManager>, log_file: &str) -> Result<Self> {
        let block_size = file_manager.block_size();
        let mut log_page = Page::new(block_size);
        let log_size = file_manager.length(log_file)?;

        let current_block = if log_size == 0 {
            Self::append_new_block(&file_manager, log_file, &mut log_page)?
        } else {
            let block = BlockId::new(log_file, log_size - 1);
            file_manager.read(&block, &mut log_page)?;
            let boundary = log_page.get_int(0)?;
            if boundary < INTEGER_BYTES as i32 || boundary as usize > block_size {
                // Torn tail block; leave it to the iterator and start fresh
                warn!("log block {} has invalid boundary {}", block, boundary);
                Self::append_new_block(&file_manager, log_file, &mut log_page)?
            } else {
                block
            }
        };

        Ok(Self {
            file_manager,
            log_file: log_file.to_string(),
            state: Mutex::new(LogState {
                log_page,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Adds a record to the in-memory tail block and returns its LSN.
    pub fn append(&self, log_record: &[u8]) -> Result<Lsn> {
        let block_size = self.file_manager.block_size();
        let bytes_needed = Page::max_length(log_record.len());
        if bytes_needed + INTEGER_BYTES > block_size {
            return Err(SimpleDBError::Other(format!(
                "log record of {} bytes does not fit in a {} byte block",
                log_record.len(),
                block_size
            )));
        }

        let mut state = self.state.lock();
        let mut boundary = state.log_page.get_int(0)? as usize;
        if boundary < bytes_needed + INTEGER_BYTES {
            self.flush_page(&mut state)?;
            let LogState {
                log_page,
                current_block,
                ..
            } = &mut *state;
            *current_block =
                Self::append_new_block(&self.file_manager, &self.log_file, log_page)?;
            boundary = block_size;
        }

        let record_position = boundary - bytes_needed;
        state.log_page.set_bytes(record_position, log_record)?;
        state.log_page.set_int(0, record_position as i32)?;
        state.latest_lsn += 1;

        Ok(Lsn(state.latest_lsn))
    }

    /// Makes every record up to and including `lsn` durable.
    pub fn flush(&self, lsn: Lsn) -> Result<()> {
        let mut state = self.state.lock();
        if lsn.0 > state.last_saved_lsn {
            self.flush_page(&mut state)?;
        }
        Ok(())
    }

    /// Iterates over the log newest-first. Flushes the tail block so the
    /// iterator sees every record appended so far.
    pub fn iterator(&self) -> Result<LogIterator> {
        let current_block = {
            let mut state = self.state.lock();
            self.flush_page(&mut state)?;
            state.current_block.clone()
        };
        Ok(LogIterator::new(
            Arc::clone(&self.file_manager),
            current_block,
        ))
    }

    pub fn latest_lsn(&self) -> Lsn {
        Lsn(self.state.lock().latest_lsn)
    }

    pub fn last_saved_lsn(&self) -> Lsn {
        Lsn(self.state.lock().last_saved_lsn)
    }

    pub fn current_block(&self) -> BlockId {
        self.state.lock().current_block.clone()
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    fn flush_page(&self, state: &mut LogState) -> Result<()> {
        self.file_manager
            .write(&state.current_block, &state.log_page)?;
        trace!(
            "flushed log block {} through lsn {}",
            state.current_block,
            state.latest_lsn
        );
        state.last_saved_lsn = state.latest_lsn;
        Ok(())
    }

    fn append_new_block(
        file_manager: &FileManager,
        log_file: &str,
        log_page: &mut Page,
    ) -> Result<BlockId> {
        let block = file_manager.append(log_file)?;
        log_page.contents_mut().fill(0);
        log_page.set_int(0, file_manager.block_size() as i32)?;
        file_manager.write(&block, log_page)?;
        debug!("allocated log block {}", block);
        Ok(block)
    }
}
