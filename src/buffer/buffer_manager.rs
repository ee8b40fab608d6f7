use std::sync::Arc;
use std::time::Instant;

use log::{trace, warn};
use parking_lot::{Condvar, Mutex};

use crate::common::{DatabaseConfig, Lsn, Result, SimpleDBError, TxNum};
use crate::log_mod::LogManager;
use crate::storage::{BlockId, FileManager, Page};

/// In-memory copy of one block, plus the bookkeeping needed to write it back.
pub struct Buffer {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    contents: Page,
    block: Option<BlockId>,
    pin_count: u32, // Can't evict while > 0
    txnum: Option<TxNum>,
    lsn: Option<Lsn>,
}

impl Buffer {
    pub fn new(file_manager: Arc<FileManager>, log_manager: Arc<LogManager>) -> Self {
        let block_size = file_manager.block_size();
        Self {
            file_manager,
            log_manager,
            contents: Page::new(block_size),
            block: None,
            pin_count: 0,
            txnum: None,
            lsn: None,
        }
    }

    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    /// Records that `txnum` changed the page. `lsn` is the log record that
    /// covers the change, or `None` for an unlogged write.
    pub fn set_modified(&mut self, txnum: TxNum, lsn: Option<Lsn>) {
        self.txnum = Some(txnum);
        if lsn.is_some() {
            self.lsn = lsn;
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count > 0
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count
    }

    pub fn modifying_tx(&self) -> Option<TxNum> {
        self.txnum
    }

    pub fn lsn(&self) -> Option<Lsn> {
        self.lsn
    }

    /// Writes the page back if it is dirty, log first.
    pub fn flush(&mut self) -> Result<()> {
        if self.txnum.is_some() {
            if let Some(lsn) = self.lsn {
                self.log_manager.flush(lsn)?;
            }
            if let Some(block) = &self.block {
                self.file_manager.write(block, &self.contents)?;
                trace!("flushed buffer for {}", block);
            }
            self.txnum = None;
        }
        Ok(())
    }

    fn assign_to_block(&mut self, block: BlockId) -> Result<()> {
        self.flush()?;
        self.file_manager.read(&block, &mut self.contents)?;
        trace!("buffer assigned to {}", block);
        self.block = Some(block);
        self.pin_count = 0;
        self.lsn = None;
        Ok(())
    }

    fn pin(&mut self) {
        self.pin_count += 1;
    }

    fn unpin(&mut self) -> Result<()> {
        if self.pin_count == 0 {
            return Err(SimpleDBError::Other(
                "Cannot unpin a buffer with pin count 0".to_string(),
            ));
        }
        self.pin_count -= 1;
        Ok(())
    }
}

/// Fixed pool of buffers shared by every transaction.
///
/// The `available` counter doubles as the pool monitor: it is held while
/// buffers are searched, assigned, pinned and unpinned, and `freed` is
/// signalled whenever a buffer becomes unpinned.
pub struct BufferManager {
    pool: Vec<Arc<Mutex<Buffer>>>,
    available: Mutex<usize>,
    freed: Condvar,
    config: DatabaseConfig,
}

impl BufferManager {
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        config: &DatabaseConfig,
    ) -> Self {
        let pool = (0..config.buffer_pool_size)
            .map(|_| {
                Arc::new(Mutex::new(Buffer::new(
                    Arc::clone(&file_manager),
                    Arc::clone(&log_manager),
                )))
            })
            .collect();

        Self {
            pool,
            available: Mutex::new(config.buffer_pool_size),
            freed: Condvar::new(),
            config: config.clone(),
        }
    }

    /// Number of unpinned buffers.
    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Pins a buffer to `block`, reading it from disk if it is not cached.
    /// Waits for a buffer to be unpinned when the pool is exhausted and fails
    /// with `BufferAbort` once the configured timeout has passed.
    pub fn pin(&self, block: &BlockId) -> Result<Arc<Mutex<Buffer>>> {
        let deadline = Instant::now() + self.config.buffer_wait_timeout;
        let mut available = self.available.lock();

        loop {
            if let Some(buffer) = self.try_to_pin(block, &mut available)? {
                return Ok(buffer);
            }
            if self.freed.wait_until(&mut available, deadline).timed_out() {
                // One last look; an unpin may have raced the timeout
                if let Some(buffer) = self.try_to_pin(block, &mut available)? {
                    return Ok(buffer);
                }
                warn!("no buffer became available for {}", block);
                return Err(SimpleDBError::BufferAbort {
                    block: block.clone(),
                });
            }
        }
    }

    pub fn unpin(&self, buffer: &Arc<Mutex<Buffer>>) -> Result<()> {
        let mut available = self.available.lock();
        let mut guard = buffer.lock();
        guard.unpin()?;
        if !guard.is_pinned() {
            *available += 1;
            self.freed.notify_all();
        }
        Ok(())
    }

    /// Flushes every buffer last modified by `txnum`.
    pub fn flush_all(&self, txnum: TxNum) -> Result<()> {
        let _available = self.available.lock();
        for buffer in &self.pool {
            let mut guard = buffer.lock();
            if guard.modifying_tx() == Some(txnum) {
                guard.flush()?;
            }
        }
        Ok(())
    }

    /// Flushes every modified buffer regardless of owner.
    pub fn flush_all_modified(&self) -> Result<()> {
        let _available = self.available.lock();
        for buffer in &self.pool {
            buffer.lock().flush()?;
        }
        Ok(())
    }

    fn try_to_pin(
        &self,
        block: &BlockId,
        available: &mut usize,
    ) -> Result<Option<Arc<Mutex<Buffer>>>> {
        let buffer = match self.find_existing(block) {
            Some(buffer) => buffer,
            None => match self.choose_unpinned() {
                Some(buffer) => {
                    buffer.lock().assign_to_block(block.clone())?;
                    buffer
                }
                None => return Ok(None),
            },
        };

        {
            let mut guard = buffer.lock();
            if !guard.is_pinned() {
                *available -= 1;
            }
            guard.pin();
        }

        Ok(Some(buffer))
    }

    fn find_existing(&self, block: &BlockId) -> Option<Arc<Mutex<Buffer>>> {
        self.pool
            .iter()
            .find(|buffer| buffer.lock().block() == Some(block))
            .map(Arc::clone)
    }

    fn choose_unpinned(&self) -> Option<Arc<Mutex<Buffer>>> {
        // Naive replacement: an unassigned buffer if there is one, else the
        // first unpinned one
        let unpinned = || self.pool.iter().filter(|buffer| !buffer.lock().is_pinned());
        unpinned()
            .find(|buffer| buffer.lock().block().is_none())
            .or_else(|| unpinned().next())
            .map(Arc::clone)
    }
}
