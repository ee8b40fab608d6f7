use thiserror::Error;

use crate::common::TxNum;
use crate::storage::BlockId;

#[derive(Debug, Error)]
pub enum SimpleDBError {
    #[error("No buffer available for {block} before timeout")]
    BufferAbort { block: BlockId },

    #[error("Lock on {block} not granted before timeout")]
    LockAbort { block: BlockId },

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Page access out of bounds: offset={offset}, len={len}, page size={size}")]
    PageOutOfBounds { offset: usize, len: usize, size: usize },

    #[error("String field is not valid UTF-8")]
    InvalidString,

    #[error("Corrupt log record: {0}")]
    CorruptLogRecord(String),

    #[error("Block {0} is not pinned by this transaction")]
    BlockNotPinned(BlockId),

    #[error("Transaction {0} has already finished")]
    TransactionClosed(TxNum),

    #[error("Other error: {0}")]
    Other(String),
}

impl SimpleDBError {
    /// Errors after which the owning transaction must be rolled back.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            SimpleDBError::BufferAbort { .. }
                | SimpleDBError::LockAbort { .. }
                | SimpleDBError::IOError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SimpleDBError>;
