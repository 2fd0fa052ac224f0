//! Upload and build pipelines.
//!
//! This crate implements the **business logic** of storing a file as
//! slices on a remote store. It has no transport of its own: callers hand
//! in any [`RemoteStore`](cake_remote::RemoteStore).
//!
//! # Upload
//!
//! 1. **Checksum** the whole file (streamed)
//! 2. **Slice** it into `file_size / slice_size + 1` windows
//! 3. **Put** each slice in index order, retrying per [`RetryPolicy`]
//! 4. **Write** `<filename>.recipe` once every slice has a locator
//!
//! # Build
//!
//! 1. **Load** and validate the recipe (no network before this passes)
//! 2. **Fetch** slices sorted by index, hashing as they are written
//! 3. **Verify** the digest; a mismatch is reported, the file is kept

pub mod build;
pub mod error;
mod retry;
pub mod types;
pub mod upload;

pub use build::Assembler;
pub use error::{BuildError, UploadError};
pub use retry::RetryPolicy;
pub use types::{BuildOutcome, TransferEvent, UploadOutcome};
pub use upload::Uploader;
