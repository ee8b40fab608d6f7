use std::fmt;

/// Logical address of a block: file name plus block number within that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId {
    filename: String,
    number: i32,
}

impl BlockId {
    /// Block number reserved for the end-of-file marker that `size` and
    /// `append` lock on.
    pub const END_OF_FILE: i32 = -1;

    pub fn new(filename: impl Into<String>, number: i32) -> Self {
        Self {
            filename: filename.into(),
            number,
        }
    }

    pub fn end_of_file(filename: impl Into<String>) -> Self {
        Self::new(filename, Self::END_OF_FILE)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn number(&self) -> i32 {
        self.number
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[file {}, block {}]", self.filename, self.number)
    }
}
