use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::buffer::{Buffer, BufferManager};
use crate::common::{Lsn, Result, SimpleDBError, TxNum};
use crate::log_mod::LogManager;
use crate::storage::{BlockId, Page};
use crate::transaction::LogRecord;

/// Undo logging for one transaction.
///
/// Commit forces the transaction's pages to disk before the COMMIT record,
/// so a committed transaction never needs redo. Recovery only has to undo
/// transactions without a COMMIT or ROLLBACK record.
pub struct RecoveryManager {
    txnum: TxNum,
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
}

impl RecoveryManager {
    /// Writes the START record and returns the manager for `txnum`.
    pub fn start(
        txnum: TxNum,
        log_manager: Arc<LogManager>,
        buffer_manager: Arc<BufferManager>,
    ) -> Result<Self> {
        LogRecord::Start { txnum }.write_to_log(&log_manager)?;
        Ok(Self {
            txnum,
            log_manager,
            buffer_manager,
        })
    }

    pub fn commit(&self) -> Result<()> {
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = LogRecord::Commit { txnum: self.txnum }.write_to_log(&self.log_manager)?;
        self.log_manager.flush(lsn)
    }

    pub fn rollback(&self) -> Result<()> {
        self.do_rollback()?;
        // Restored values must be on disk before the ROLLBACK record says so
        self.buffer_manager.flush_all(self.txnum)?;
        let lsn = LogRecord::Rollback { txnum: self.txnum }.write_to_log(&self.log_manager)?;
        self.log_manager.flush(lsn)
    }

    /// Logs the integer about to be overwritten at `offset`. Must be called
    /// before the buffer is changed.
    pub fn set_int(&self, buffer: &mut Buffer, offset: usize, _new_value: i32) -> Result<Lsn> {
        let old_value = buffer.contents().get_int(offset)?;
        let block = Self::assigned_block(buffer)?;
        let lsn = LogRecord::SetInt {
            txnum: self.txnum,
            block,
            offset,
            old_value,
        }
        .write_to_log(&self.log_manager)?;
        buffer.set_modified(self.txnum, Some(lsn));
        Ok(lsn)
    }

    /// Logs the string about to be overwritten at `offset`. Must be called
    /// before the buffer is changed.
    pub fn set_string(&self, buffer: &mut Buffer, offset: usize, new_value: &str) -> Result<Lsn> {
        // Refuse before logging anything the buffer write would reject
        let size = buffer.contents().len();
        let needed = Page::max_length(new_value.len());
        if offset.checked_add(needed).map_or(true, |end| end > size) {
            return Err(SimpleDBError::PageOutOfBounds {
                offset,
                len: needed,
                size,
            });
        }

        let old_value = buffer.contents().get_string(offset)?;
        let block = Self::assigned_block(buffer)?;
        let lsn = LogRecord::SetString {
            txnum: self.txnum,
            block,
            offset,
            old_value,
        }
        .write_to_log(&self.log_manager)?;
        buffer.set_modified(self.txnum, Some(lsn));
        Ok(lsn)
    }

    /// Restores the database to a state with no unfinished transactions and
    /// writes a quiescent checkpoint. Runs once at startup, before any
    /// transaction begins.
    ///
    /// Single backward pass: a COMMIT or ROLLBACK marks its transaction as
    /// finished, every update of an unfinished transaction is undone, and the
    /// scan stops at the first CHECKPOINT. A record at the very end of the
    /// log that fails to decode is an interrupted append and is skipped; any
    /// other decode failure aborts recovery.
    pub fn recover(log_manager: &LogManager, buffer_manager: &BufferManager) -> Result<()> {
        buffer_manager.flush_all_modified()?;

        let mut finished = HashSet::new();
        let mut undone = 0usize;
        for (position, bytes) in log_manager.iterator()?.enumerate() {
            let record = match bytes.and_then(|bytes| LogRecord::from_bytes(&bytes)) {
                Ok(record) => record,
                Err(SimpleDBError::CorruptLogRecord(reason)) if position == 0 => {
                    warn!("ignoring incomplete record at end of log: {}", reason);
                    continue;
                }
                Err(e) => return Err(e),
            };

            match &record {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { txnum } | LogRecord::Rollback { txnum } => {
                    finished.insert(*txnum);
                }
                LogRecord::Start { .. } => {}
                LogRecord::SetInt { txnum, .. } | LogRecord::SetString { txnum, .. } => {
                    if !finished.contains(txnum) {
                        debug!("undoing {}", record);
                        record.undo(buffer_manager)?;
                        undone += 1;
                    }
                }
            }
        }

        buffer_manager.flush_all_modified()?;
        let lsn = LogRecord::Checkpoint.write_to_log(log_manager)?;
        log_manager.flush(lsn)?;
        info!("recovery complete: {} updates undone, checkpoint at lsn {}", undone, lsn);
        Ok(())
    }

    fn do_rollback(&self) -> Result<()> {
        for bytes in self.log_manager.iterator()? {
            let record = LogRecord::from_bytes(&bytes?)?;
            if record.tx_number() != Some(self.txnum) {
                continue;
            }
            match record {
                LogRecord::Start { .. } => return Ok(()),
                LogRecord::SetInt { .. } | LogRecord::SetString { .. } => {
                    record.undo(&self.buffer_manager)?
                }
                LogRecord::Checkpoint | LogRecord::Commit { .. } | LogRecord::Rollback { .. } => {}
            }
        }
        Err(SimpleDBError::CorruptLogRecord(format!(
            "no START record for transaction {}",
            self.txnum
        )))
    }

    fn assigned_block(buffer: &Buffer) -> Result<BlockId> {
        buffer
            .block()
            .cloned()
            .ok_or_else(|| SimpleDBError::Other("buffer is not assigned to a block".to_string()))
    }
}
