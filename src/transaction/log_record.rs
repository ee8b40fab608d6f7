use std::fmt;

use crate::buffer::BufferManager;
use crate::common::{Lsn, Result, SimpleDBError, TxNum};
use crate::log_mod::LogManager;
use crate::storage::{BlockId, Page, INTEGER_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogRecordType {
    Checkpoint = 0,
    Start = 1,
    Commit = 2,
    Rollback = 3,
    SetInt = 4,
    SetString = 5,
}

impl TryFrom<i32> for LogRecordType {
    type Error = SimpleDBError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(LogRecordType::Checkpoint),
            1 => Ok(LogRecordType::Start),
            2 => Ok(LogRecordType::Commit),
            3 => Ok(LogRecordType::Rollback),
            4 => Ok(LogRecordType::SetInt),
            5 => Ok(LogRecordType::SetString),
            _ => Err(SimpleDBError::CorruptLogRecord(format!(
                "unknown op code {}",
                value
            ))),
        }
    }
}

/// One entry of the write-ahead log.
///
/// Encoding: every field is a page field, starting with the op code.
///
/// ```text
/// CHECKPOINT: op
/// START, COMMIT, ROLLBACK: op | txnum
/// SETINT:    op | txnum | filename | block number | offset | old int
/// SETSTRING: op | txnum | filename | block number | offset | old string
/// ```
///
/// The SET records carry only the value being overwritten; they exist to be
/// undone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    Checkpoint,
    Start {
        txnum: TxNum,
    },
    Commit {
        txnum: TxNum,
    },
    Rollback {
        txnum: TxNum,
    },
    SetInt {
        txnum: TxNum,
        block: BlockId,
        offset: usize,
        old_value: i32,
    },
    SetString {
        txnum: TxNum,
        block: BlockId,
        offset: usize,
        old_value: String,
    },
}

impl LogRecord {
    pub fn op(&self) -> LogRecordType {
        match self {
            LogRecord::Checkpoint => LogRecordType::Checkpoint,
            LogRecord::Start { .. } => LogRecordType::Start,
            LogRecord::Commit { .. } => LogRecordType::Commit,
            LogRecord::Rollback { .. } => LogRecordType::Rollback,
            LogRecord::SetInt { .. } => LogRecordType::SetInt,
            LogRecord::SetString { .. } => LogRecordType::SetString,
        }
    }

    /// The owning transaction. Checkpoints belong to none.
    pub fn tx_number(&self) -> Option<TxNum> {
        match self {
            LogRecord::Checkpoint => None,
            LogRecord::Start { txnum }
            | LogRecord::Commit { txnum }
            | LogRecord::Rollback { txnum }
            | LogRecord::SetInt { txnum, .. }
            | LogRecord::SetString { txnum, .. } => Some(*txnum),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(&Page::from_bytes(bytes.to_vec())).map_err(|e| match e {
            SimpleDBError::CorruptLogRecord(_) => e,
            other => SimpleDBError::CorruptLogRecord(other.to_string()),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let op = self.op() as i32;
        let page = match self {
            LogRecord::Checkpoint => {
                let mut page = Page::new(INTEGER_BYTES);
                page.set_int(0, op)?;
                page
            }
            LogRecord::Start { txnum }
            | LogRecord::Commit { txnum }
            | LogRecord::Rollback { txnum } => {
                let mut page = Page::new(2 * INTEGER_BYTES);
                page.set_int(0, op)?;
                page.set_int(INTEGER_BYTES, txnum.0)?;
                page
            }
            LogRecord::SetInt {
                txnum,
                block,
                offset,
                old_value,
            } => {
                let value_position = Self::value_position(block);
                let mut page = Page::new(value_position + INTEGER_BYTES);
                Self::encode_update_header(&mut page, op, *txnum, block, *offset)?;
                page.set_int(value_position, *old_value)?;
                page
            }
            LogRecord::SetString {
                txnum,
                block,
                offset,
                old_value,
            } => {
                let value_position = Self::value_position(block);
                let mut page = Page::new(value_position + Page::max_length(old_value.len()));
                Self::encode_update_header(&mut page, op, *txnum, block, *offset)?;
                page.set_string(value_position, old_value)?;
                page
            }
        };
        Ok(page.contents().to_vec())
    }

    /// Appends the record to the log and returns its LSN.
    pub fn write_to_log(&self, log_manager: &LogManager) -> Result<Lsn> {
        log_manager.append(&self.to_bytes()?)
    }

    /// Writes the saved old value back into its block. The page is marked
    /// modified by the record's transaction, without a new log record.
    pub fn undo(&self, buffer_manager: &BufferManager) -> Result<()> {
        let (txnum, block, offset) = match self {
            LogRecord::SetInt {
                txnum,
                block,
                offset,
                ..
            }
            | LogRecord::SetString {
                txnum,
                block,
                offset,
                ..
            } => (*txnum, block, *offset),
            LogRecord::Checkpoint
            | LogRecord::Start { .. }
            | LogRecord::Commit { .. }
            | LogRecord::Rollback { .. } => return Ok(()),
        };

        let buffer = buffer_manager.pin(block)?;
        let restored = {
            let mut guard = buffer.lock();
            let page = guard.contents_mut();
            let result = match self {
                LogRecord::SetInt { old_value, .. } => page.set_int(offset, *old_value),
                LogRecord::SetString { old_value, .. } => page.set_string(offset, old_value),
                _ => Ok(()),
            };
            if result.is_ok() {
                guard.set_modified(txnum, None);
            }
            result
        };
        buffer_manager.unpin(&buffer)?;
        restored
    }

    fn decode(page: &Page) -> Result<Self> {
        let op = LogRecordType::try_from(page.get_int(0)?)?;
        if op == LogRecordType::Checkpoint {
            return Ok(LogRecord::Checkpoint);
        }

        let txnum = TxNum(page.get_int(INTEGER_BYTES)?);
        match op {
            LogRecordType::Checkpoint => Ok(LogRecord::Checkpoint),
            LogRecordType::Start => Ok(LogRecord::Start { txnum }),
            LogRecordType::Commit => Ok(LogRecord::Commit { txnum }),
            LogRecordType::Rollback => Ok(LogRecord::Rollback { txnum }),
            LogRecordType::SetInt | LogRecordType::SetString => {
                let filename_position = 2 * INTEGER_BYTES;
                let filename = page.get_string(filename_position)?;
                let block_position = filename_position + Page::max_length(filename.len());
                let block = BlockId::new(filename, page.get_int(block_position)?);
                let offset_position = block_position + INTEGER_BYTES;
                let offset = page.get_int(offset_position)?;
                if offset < 0 {
                    return Err(SimpleDBError::CorruptLogRecord(format!(
                        "negative offset {}",
                        offset
                    )));
                }
                let offset = offset as usize;
                let value_position = offset_position + INTEGER_BYTES;

                if op == LogRecordType::SetInt {
                    Ok(LogRecord::SetInt {
                        txnum,
                        block,
                        offset,
                        old_value: page.get_int(value_position)?,
                    })
                } else {
                    Ok(LogRecord::SetString {
                        txnum,
                        block,
                        offset,
                        old_value: page.get_string(value_position)?,
                    })
                }
            }
        }
    }

    fn value_position(block: &BlockId) -> usize {
        // op, txnum, filename, block number, offset
        2 * INTEGER_BYTES + Page::max_length(block.filename().len()) + 2 * INTEGER_BYTES
    }

    fn encode_update_header(
        page: &mut Page,
        op: i32,
        txnum: TxNum,
        block: &BlockId,
        offset: usize,
    ) -> Result<()> {
        let filename_position = 2 * INTEGER_BYTES;
        let block_position = filename_position + Page::max_length(block.filename().len());
        page.set_int(0, op)?;
        page.set_int(INTEGER_BYTES, txnum.0)?;
        page.set_string(filename_position, block.filename())?;
        page.set_int(block_position, block.number())?;
        page.set_int(block_position + INTEGER_BYTES, offset as i32)?;
        Ok(())
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Checkpoint => write!(f, "<CHECKPOINT>"),
            LogRecord::Start { txnum } => write!(f, "<START {}>", txnum),
            LogRecord::Commit { txnum } => write!(f, "<COMMIT {}>", txnum),
            LogRecord::Rollback { txnum } => write!(f, "<ROLLBACK {}>", txnum),
            LogRecord::SetInt {
                txnum,
                block,
                offset,
                old_value,
            } => write!(f, "<SETINT {} {} {} {}>", txnum, block, offset, old_value),
            LogRecord::SetString {
                txnum,
                block,
                offset,
                old_value,
            } => write!(f, "<SETSTRING {} {} {} {}>", txnum, block, offset, old_value),
        }
    }
}
