mod block;
mod file;
mod file_manager;
mod page;

pub use block::BlockId;
pub use file::{File, MemoryFile, PosixFile};
pub use file_manager::{BlockStats, FileManager};
pub use page::{Page, INTEGER_BYTES};
