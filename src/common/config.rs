use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub block_size: usize,
    pub buffer_pool_size: usize,
    pub log_file: String,
    /// How long `BufferManager::pin` waits for a free buffer.
    pub buffer_wait_timeout: Duration,
    /// How long a lock request waits before giving up.
    pub lock_wait_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            block_size: 400,
            buffer_pool_size: 8,
            log_file: "simpledb.log".to_string(),
            buffer_wait_timeout: Duration::from_secs(10),
            lock_wait_timeout: Duration::from_secs(10),
        }
    }
}

impl DatabaseConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_buffer_pool_size(mut self, buffer_pool_size: usize) -> Self {
        self.buffer_pool_size = buffer_pool_size;
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    pub fn with_buffer_wait_timeout(mut self, timeout: Duration) -> Self {
        self.buffer_wait_timeout = timeout;
        self
    }

    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = timeout;
        self
    }
}
