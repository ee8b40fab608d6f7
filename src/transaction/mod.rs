mod concurrency;
mod log_record;
mod recovery;
mod transaction;

pub use concurrency::{ConcurrencyManager, LockTable, LockType};
pub use log_record::{LogRecord, LogRecordType};
pub use recovery::RecoveryManager;
pub use transaction::{BufferList, Transaction, TransactionManager};
