//! Data types for the upload and build pipelines.

use std::path::PathBuf;
use std::time::Duration;

use cake_recipe::Recipe;

/// Progress event emitted by both pipelines.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    /// A pipeline started on a cake of `cake_size` slices.
    Started {
        name: String,
        cake_size: u64,
        total_bytes: u64,
    },
    /// A slice was stored (upload) or written (build).
    SliceDone {
        index: u64,
        cake_size: u64,
        bytes: u64,
        elapsed: Duration,
        bytes_per_second: f64,
        /// Time left at the current rate; `None` when the total is unknown
        /// or no rate has been measured yet.
        eta: Option<Duration>,
    },
    /// A slice failed and will be retried after `delay`.
    SliceRetrying {
        index: u64,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// Every slice is done.
    Finished { elapsed: Duration },
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub recipe: Recipe,
    /// Where the recipe was written.
    pub recipe_path: PathBuf,
    /// Source file size.
    pub total_bytes: u64,
    pub elapsed: Duration,
}

/// Result of a build that fetched every slice.
///
/// `verified == false` means the output was written but its digest does not
/// match the recipe. The file is left in place either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub expected_checksum: String,
    pub actual_checksum: String,
    pub verified: bool,
    pub elapsed: Duration,
}
