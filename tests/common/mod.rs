#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use simpledb_rust::{
    storage::Page, BlockId, BufferManager, DatabaseConfig, FileManager, LogManager, SimpleDB,
};
use tempfile::TempDir;

pub const BLOCK_SIZE: usize = 400;
pub const LOG_FILE: &str = "simpledb.log";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Default configuration with timeouts short enough for tests.
pub fn test_config() -> DatabaseConfig {
    DatabaseConfig::default()
        .with_block_size(BLOCK_SIZE)
        .with_buffer_wait_timeout(Duration::from_millis(500))
        .with_lock_wait_timeout(Duration::from_millis(500))
}

pub fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("db")
}

pub fn open_db(path: &Path) -> SimpleDB {
    open_db_with(path, test_config())
}

pub fn open_db_with(path: &Path, config: DatabaseConfig) -> SimpleDB {
    init_logging();
    SimpleDB::with_config(path, config).expect("open database")
}

/// File, log and buffer managers without the transaction layer.
pub fn setup_managers(
    path: &Path,
    num_buffers: usize,
) -> (Arc<FileManager>, Arc<LogManager>, BufferManager) {
    init_logging();
    let config = test_config().with_buffer_pool_size(num_buffers);
    let file_manager = Arc::new(FileManager::new(path, BLOCK_SIZE).unwrap());
    let log_manager = Arc::new(LogManager::new(Arc::clone(&file_manager), LOG_FILE).unwrap());
    let buffer_manager =
        BufferManager::new(Arc::clone(&file_manager), Arc::clone(&log_manager), &config);
    (file_manager, log_manager, buffer_manager)
}

/// Reads a block straight from disk, bypassing the buffer pool.
pub fn read_block(file_manager: &FileManager, block: &BlockId) -> Page {
    let mut page = Page::new(file_manager.block_size());
    file_manager.read(block, &mut page).unwrap();
    page
}

/// Log record holding a string and a number, as the log tests write them.
pub fn create_log_record(s: &str, n: i32) -> Vec<u8> {
    let number_position = Page::max_length(s.len());
    let mut page = Page::new(number_position + 4);
    page.set_string(0, s).unwrap();
    page.set_int(number_position, n).unwrap();
    page.contents().to_vec()
}
