use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::TransferError;

/// One contiguous window of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    /// Position of the slice in the cake (0-based).
    pub index: u64,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw slice data. Empty for the trailing slice of an exact multiple.
    pub data: Vec<u8>,
}

impl Slice {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Number of slices a file of `file_size` bytes is cut into.
///
/// Always `file_size / slice_size + 1`: when the size is an exact multiple
/// the last slice is empty. Recipes in the wild depend on this count.
pub fn slice_count(file_size: u64, slice_size: u64) -> Result<u64, TransferError> {
    if slice_size == 0 {
        return Err(TransferError::InvalidSliceSize);
    }
    Ok(file_size / slice_size + 1)
}

// ---------------------------------------------------------------------------
// SliceReader
// ---------------------------------------------------------------------------

/// Reads a file slice by slice, seeking to `index * slice_size` for each one.
pub struct SliceReader {
    file: File,
    slice_size: u64,
    file_size: u64,
    cake_size: u64,
    next_index: u64,
}

impl SliceReader {
    /// Opens `path` for slicing. Fails on a zero `slice_size`.
    pub fn open(path: &Path, slice_size: usize) -> Result<Self, TransferError> {
        let slice_size = slice_size as u64;
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let cake_size = slice_count(file_size, slice_size)?;
        Ok(Self {
            file,
            slice_size,
            file_size,
            cake_size,
            next_index: 0,
        })
    }

    /// Reads the slice at `index`. Can be called in any order.
    pub fn read_slice(&mut self, index: u64) -> Result<Slice, TransferError> {
        if index >= self.cake_size {
            return Err(TransferError::SliceOutOfRange {
                index,
                cake_size: self.cake_size,
            });
        }

        let offset = index * self.slice_size;
        self.file.seek(SeekFrom::Start(offset))?;

        let expected = self.file_size.saturating_sub(offset).min(self.slice_size);
        let mut data = Vec::with_capacity(expected as usize);
        (&mut self.file).take(self.slice_size).read_to_end(&mut data)?;

        Ok(Slice {
            index,
            offset,
            data,
        })
    }

    /// Reads the next slice in index order. Returns `None` after the last one.
    pub fn next_slice(&mut self) -> Result<Option<Slice>, TransferError> {
        if self.next_index >= self.cake_size {
            return Ok(None);
        }
        let slice = self.read_slice(self.next_index)?;
        self.next_index += 1;
        Ok(Some(slice))
    }

    /// Total number of slices, including a possible empty tail.
    pub fn cake_size(&self) -> u64 {
        self.cake_size
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}
