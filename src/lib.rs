pub mod buffer;
pub mod common;
pub mod log_mod;
pub mod storage;
pub mod transaction;

pub use buffer::BufferManager;
pub use common::{DatabaseConfig, Lsn, Result, SimpleDBError, TxNum};
pub use log_mod::LogManager;
pub use storage::{BlockId, FileManager};
pub use transaction::{LockTable, Transaction, TransactionManager};

use std::path::Path;
use std::sync::Arc;

use log::info;

/// An open database: the shared file, log and buffer managers and the lock
/// table, built once and handed to every transaction.
pub struct SimpleDB {
    file_manager: Arc<FileManager>,
    log_manager: Arc<LogManager>,
    buffer_manager: Arc<BufferManager>,
    transaction_manager: TransactionManager,
    config: DatabaseConfig,
}

impl SimpleDB {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::with_config(db_path, DatabaseConfig::default())
    }

    pub fn with_config(db_path: &Path, config: DatabaseConfig) -> Result<Self> {
        let file_manager = Arc::new(FileManager::new(db_path, config.block_size)?);
        Self::open(file_manager, config)
    }

    /// A database whose files live in memory.
    pub fn in_memory(config: DatabaseConfig) -> Result<Self> {
        let file_manager = Arc::new(FileManager::in_memory(config.block_size));
        Self::open(file_manager, config)
    }

    fn open(file_manager: Arc<FileManager>, config: DatabaseConfig) -> Result<Self> {
        let log_manager = Arc::new(LogManager::new(
            Arc::clone(&file_manager),
            &config.log_file,
        )?);
        let buffer_manager = Arc::new(BufferManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            &config,
        ));
        let lock_table = Arc::new(LockTable::new(config.lock_wait_timeout));
        let transaction_manager = TransactionManager::new(
            Arc::clone(&file_manager),
            Arc::clone(&log_manager),
            Arc::clone(&buffer_manager),
            lock_table,
        );

        if file_manager.is_new() {
            info!("creating new database");
        } else {
            info!("recovering existing database");
        }
        transaction_manager.recover()?;

        Ok(Self {
            file_manager,
            log_manager,
            buffer_manager,
            transaction_manager,
            config,
        })
    }

    pub fn new_tx(&self) -> Result<Transaction> {
        self.transaction_manager.begin()
    }

    pub fn file_manager(&self) -> &Arc<FileManager> {
        &self.file_manager
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }

    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffer_manager
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        self.transaction_manager.lock_table()
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}
