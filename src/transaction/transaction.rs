use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::buffer::{Buffer, BufferManager};
use crate::common::{Result, SimpleDBError, TxNum};
use crate::log_mod::LogManager;
use crate::storage::{BlockId, FileManager};
use crate::transaction::{ConcurrencyManager, LockTable, RecoveryManager};

/// The buffers a transaction currently has pinned.
pub struct BufferList {
    buffers: HashMap<BlockId, Arc<Mutex<Buffer>>>,
    pins: Vec<BlockId>, // One entry per pin; a block may appear more than once
    buffer_manager: Arc<BufferManager>,
}

impl BufferList {
    pub fn new(buffer_manager: Arc<BufferManager>) -> Self {
        Self {
            buffers: HashMap::new(),
            pins: Vec::new(),
            buffer_manager,
        }
    }

    pub fn get_buffer(&self, block: &BlockId) -> Result<Arc<Mutex<Buffer>>> {
        self.buffers
            .get(block)
            .cloned()
            .ok_or_else(|| SimpleDBError::BlockNotPinned(block.clone()))
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        let buffer = self.buffer_manager.pin(block)?;
        self.buffers.insert(block.clone(), buffer);
        self.pins.push(block.clone());
        Ok(())
    }

    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        let buffer = self.get_buffer(block)?;
        self.buffer_manager.unpin(&buffer)?;

        if let Some(position) = self.pins.iter().position(|pinned| pinned == block) {
            self.pins.remove(position);
        }
        if !self.pins.contains(block) {
            self.buffers.remove(block);
        }
        Ok(())
    }

    /// Unpins everything. Keeps going after a failure and reports the first one.
    pub fn unpin_all(&mut self) -> Result<()> {
        let mut first_error = None;
        for block in self.pins.drain(..) {
            if let Some(buffer) = self.buffers.get(&block) {
                if let Err(e) = self.buffer_manager.unpin(buffer) {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.buffers.clear();
        first_error.map_or(Ok(()), Err)
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    // Undo failed part way; locks are kept until a retry succeeds
    RollbackPending,
    Finished,
}

/// A unit of work over the shared buffer pool, lock table and log.
///
/// Reads take a shared lock and writes an exclusive lock on the block; every
/// lock is held until `commit` or `rollback`. A lock or buffer timeout, or an
/// I/O failure, inside any operation rolls the transaction back before the
/// error is returned. After `commit` or `rollback` the transaction is closed.
///
/// If the undo itself fails the transaction keeps its locks and only accepts
/// another `rollback`; dropping it retries once more.
pub struct Transaction {
    txnum: TxNum,
    file_manager: Arc<FileManager>,
    buffer_manager: Arc<BufferManager>,
    recovery: RecoveryManager,
    concurrency: ConcurrencyManager,
    buffers: BufferList,
    state: TxState,
}

impl Transaction {
    pub(crate) fn new(
        txnum: TxNum,
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
    ) -> Result<Self> {
        let recovery = RecoveryManager::start(txnum, log_manager, Arc::clone(&buffer_manager))?;
        debug!("transaction {} started", txnum);

        Ok(Self {
            txnum,
            file_manager,
            buffers: BufferList::new(Arc::clone(&buffer_manager)),
            buffer_manager,
            recovery,
            concurrency: ConcurrencyManager::new(txnum, lock_table),
            state: TxState::Active,
        })
    }

    pub fn txnum(&self) -> TxNum {
        self.txnum
    }

    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    /// True after an undo that did not complete.
    pub fn is_rollback_pending(&self) -> bool {
        self.state == TxState::RollbackPending
    }

    /// Forces the transaction's pages and a COMMIT record to disk, then
    /// releases its locks and pins.
    pub fn commit(&mut self) -> Result<()> {
        self.guarded(|tx| tx.recovery.commit())?;
        self.state = TxState::Finished;
        self.concurrency.release_all();
        self.buffers.unpin_all()?;
        debug!("transaction {} committed", self.txnum);
        Ok(())
    }

    /// Undoes the transaction's changes, writes a ROLLBACK record, then
    /// releases its locks. Pins are dropped first so the undo has buffers to
    /// work with. When the undo fails the locks stay held and the
    /// transaction can only be rolled back again.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state == TxState::Finished {
            return Err(SimpleDBError::TransactionClosed(self.txnum));
        }
        self.state = TxState::RollbackPending;

        let unpinned = self.buffers.unpin_all();
        if let Err(e) = self.recovery.rollback() {
            warn!(
                "undo of transaction {} incomplete, keeping its locks: {}",
                self.txnum, e
            );
            return Err(e);
        }

        self.state = TxState::Finished;
        self.concurrency.release_all();
        debug!("transaction {} rolled back", self.txnum);
        unpinned
    }

    pub fn pin(&mut self, block: &BlockId) -> Result<()> {
        self.guarded(|tx| tx.buffers.pin(block))
    }

    pub fn unpin(&mut self, block: &BlockId) -> Result<()> {
        self.guarded(|tx| tx.buffers.unpin(block))
    }

    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> Result<i32> {
        self.guarded(|tx| {
            tx.concurrency.request_shared_lock(block)?;
            let buffer = tx.buffers.get_buffer(block)?;
            let value = buffer.lock().contents().get_int(offset)?;
            Ok(value)
        })
    }

    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> Result<String> {
        self.guarded(|tx| {
            tx.concurrency.request_shared_lock(block)?;
            let buffer = tx.buffers.get_buffer(block)?;
            let value = buffer.lock().contents().get_string(offset)?;
            Ok(value)
        })
    }

    /// Stores `value` at `offset`. With `ok_to_log` the old value is logged
    /// first so the write can be undone; pass `false` only for bytes whose
    /// previous contents are meaningless, such as a freshly appended block.
    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: i32,
        ok_to_log: bool,
    ) -> Result<()> {
        self.guarded(|tx| {
            tx.concurrency.request_exclusive_lock(block)?;
            let buffer = tx.buffers.get_buffer(block)?;
            let mut guard = buffer.lock();
            let lsn = if ok_to_log {
                Some(tx.recovery.set_int(&mut guard, offset, value)?)
            } else {
                None
            };
            guard.contents_mut().set_int(offset, value)?;
            guard.set_modified(tx.txnum, lsn);
            Ok(())
        })
    }

    /// String counterpart of [`Transaction::set_int`].
    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: &str,
        ok_to_log: bool,
    ) -> Result<()> {
        self.guarded(|tx| {
            tx.concurrency.request_exclusive_lock(block)?;
            let buffer = tx.buffers.get_buffer(block)?;
            let mut guard = buffer.lock();
            let lsn = if ok_to_log {
                Some(tx.recovery.set_string(&mut guard, offset, value)?)
            } else {
                None
            };
            guard.contents_mut().set_string(offset, value)?;
            guard.set_modified(tx.txnum, lsn);
            Ok(())
        })
    }

    /// Number of blocks in `filename`. Locks the end-of-file marker
    /// exclusively, so concurrent appends wait for this transaction.
    pub fn size(&mut self, filename: &str) -> Result<i32> {
        self.guarded(|tx| {
            tx.concurrency
                .request_exclusive_lock(&BlockId::end_of_file(filename))?;
            tx.file_manager.length(filename)
        })
    }

    /// Extends `filename` by one block and returns it.
    pub fn append(&mut self, filename: &str) -> Result<BlockId> {
        self.guarded(|tx| {
            tx.concurrency
                .request_exclusive_lock(&BlockId::end_of_file(filename))?;
            tx.file_manager.append(filename)
        })
    }

    pub fn block_size(&self) -> usize {
        self.file_manager.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_manager.available()
    }

    pub fn pinned_buffers(&self) -> usize {
        self.buffers.pin_count()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state == TxState::Active {
            Ok(())
        } else {
            Err(SimpleDBError::TransactionClosed(self.txnum))
        }
    }

    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ensure_active()?;
        match op(self) {
            Err(e) if e.is_abort() => {
                warn!("transaction {} aborting: {}", self.txnum, e);
                if let Err(rollback_error) = self.rollback() {
                    error!(
                        "rollback of transaction {} failed: {}",
                        self.txnum, rollback_error
                    );
                }
                Err(e)
            }
            result => result,
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TxState::Finished {
            warn!("transaction {} dropped unfinished, rolling back", self.txnum);
            if let Err(e) = self.rollback() {
                error!(
                    "rollback of transaction {} failed, its locks stay held: {}",
                    self.txnum, e
                );
            }
        }
    }
}

/// Hands out transactions over one set of shared managers.
pub struct TransactionManager {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
    next_txnum: AtomicI32,
}

impl TransactionManager {
    pub fn new(
        file_manager: Arc<FileManager>,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
    ) -> Self {
        Self {
            file_manager,
            log_manager,
            buffer_manager,
            lock_table,
            next_txnum: AtomicI32::new(1),
        }
    }

    pub fn begin(&self) -> Result<Transaction> {
        let txnum = TxNum(self.next_txnum.fetch_add(1, Ordering::SeqCst));
        Transaction::new(
            txnum,
            Arc::clone(&self.file_manager),
            Arc::clone(&self.log_manager),
            Arc::clone(&self.buffer_manager),
            Arc::clone(&self.lock_table),
        )
    }

    /// Startup recovery. Runs before the first `begin`.
    pub(crate) fn recover(&self) -> Result<()> {
        RecoveryManager::recover(&self.log_manager, &self.buffer_manager)
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lock_table
    }
}
