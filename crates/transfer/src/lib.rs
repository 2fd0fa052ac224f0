//! Slicing and integrity primitives shared by the upload and build pipelines.
//!
//! A "cake" is the whole source file. It is cut into fixed-size slices
//! (`file_size / slice_size + 1` of them, so an exact multiple ends with an
//! empty slice) and verified end-to-end with a single SHA-256 digest.

mod checksum;
mod progress;
mod slicer;
mod validation;

pub use checksum::{
    CHECKSUM_METHOD, ChecksumWriter, StreamingChecksum, calculate_file_checksum, checksum_bytes,
};
pub use progress::SpeedCalculator;
pub use slicer::{Slice, SliceReader, slice_count};
pub use validation::validate_output_name;

/// Default slice size: 8 MB (decimal), the attachment limit of the channel.
pub const DEFAULT_SLICE_SIZE: usize = 8_000_000;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("slice size must be greater than zero")]
    InvalidSliceSize,

    #[error("slice index {index} is outside the cake ({cake_size} slices)")]
    SliceOutOfRange { index: u64, cake_size: u64 },

    #[error("invalid file name: {0}")]
    InvalidName(String),
}
