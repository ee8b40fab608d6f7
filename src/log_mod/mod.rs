mod log_iterator;
mod log_manager;

pub use log_iterator::LogIterator;
pub use log_manager::LogManager;
