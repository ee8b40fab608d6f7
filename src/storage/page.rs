use byteorder::{BigEndian, ByteOrder};

use crate::common::{Result, SimpleDBError};

/// Width of every integer field stored in a page.
pub const INTEGER_BYTES: usize = 4;

/// Fixed-size byte array holding the contents of one block.
///
/// Integers are 4-byte big-endian. Byte arrays and strings are stored as a
/// 4-byte length followed by the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size],
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Bytes needed to store a string of `strlen` bytes.
    pub fn max_length(strlen: usize) -> usize {
        INTEGER_BYTES + strlen
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get_int(&self, offset: usize) -> Result<i32> {
        let bytes = self.slice(offset, INTEGER_BYTES)?;
        Ok(BigEndian::read_i32(bytes))
    }

    pub fn set_int(&mut self, offset: usize, value: i32) -> Result<()> {
        let bytes = self.slice_mut(offset, INTEGER_BYTES)?;
        BigEndian::write_i32(bytes, value);
        Ok(())
    }

    pub fn get_bytes(&self, offset: usize) -> Result<&[u8]> {
        let len = self.get_int(offset)?;
        if len < 0 {
            return Err(SimpleDBError::PageOutOfBounds {
                offset,
                len: 0,
                size: self.data.len(),
            });
        }
        self.slice(offset + INTEGER_BYTES, len as usize)
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        // Check the whole field before touching the length prefix
        self.slice(offset, Self::max_length(bytes.len()))?;
        self.set_int(offset, bytes.len() as i32)?;
        self.slice_mut(offset + INTEGER_BYTES, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    pub fn get_string(&self, offset: usize) -> Result<String> {
        let bytes = self.get_bytes(offset)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SimpleDBError::InvalidString)
    }

    pub fn set_string(&mut self, offset: usize, value: &str) -> Result<()> {
        self.set_bytes(offset, value.as_bytes())
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(&self.data[offset..end]),
            _ => Err(SimpleDBError::PageOutOfBounds {
                offset,
                len,
                size: self.data.len(),
            }),
        }
    }

    fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let size = self.data.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(&mut self.data[offset..end]),
            _ => Err(SimpleDBError::PageOutOfBounds { offset, len, size }),
        }
    }
}
