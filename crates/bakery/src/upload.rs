//! Upload pipeline: slice a file onto a remote store and write its recipe.

use std::path::{Path, PathBuf};
use std::time::Instant;

use cake_recipe::{RECIPE_EXTENSION, Recipe, split_file_name};
use cake_remote::RemoteStore;
use cake_transfer::{Slice, SliceReader, SpeedCalculator, calculate_file_checksum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::UploadError;
use crate::retry::{RetryFailure, RetryPolicy, retry_remote};
use crate::types::{TransferEvent, UploadOutcome};

/// Slices files onto a [`RemoteStore`].
///
/// Slices go out strictly one at a time, in index order. A failed put is
/// retried on the same slice according to the [`RetryPolicy`]; nothing is
/// written to disk until every slice has a locator.
pub struct Uploader<'a> {
    store: &'a dyn RemoteStore,
    retry: RetryPolicy,
    recipe_dir: PathBuf,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<TransferEvent>>,
}

impl<'a> Uploader<'a> {
    /// Creates an uploader writing recipes to the current directory.
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            recipe_dir: PathBuf::from("."),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory that receives `<filename>.recipe`.
    pub fn with_recipe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recipe_dir = dir.into();
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sends progress events to `tx`. Events are dropped if the channel is full.
    pub fn with_events(mut self, tx: mpsc::Sender<TransferEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Uploads `path` in slices of `slice_size` bytes and writes its recipe.
    ///
    /// Fails before touching the store if the recipe would be written over
    /// `path` itself.
    pub async fn upload(
        &self,
        path: &Path,
        slice_size: usize,
    ) -> Result<UploadOutcome, UploadError> {
        if slice_size == 0 {
            return Err(UploadError::InvalidSliceSize);
        }
        let started = Instant::now();

        let (filename, format) = split_file_name(path);

        let target = self
            .recipe_dir
            .join(format!("{filename}.{RECIPE_EXTENSION}"));
        if same_file(path, &target) {
            return Err(UploadError::RecipeOverwritesSource(target));
        }

        debug!(path = %path.display(), "computing checksum");
        let checksum = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            move || calculate_file_checksum(&path)
        })
        .await
        .map_err(|e| UploadError::Io(std::io::Error::other(e)))??;

        let mut reader = SliceReader::open(path, slice_size)?;
        let cake_size = reader.cake_size();
        let total_bytes = reader.file_size();
        let mut recipe = Recipe::new(filename, format, cake_size, checksum);

        info!(
            file = %path.display(),
            total_bytes,
            slice_size,
            cake_size,
            checksum = %recipe.checksum,
            "uploading cake"
        );
        self.emit(TransferEvent::Started {
            name: recipe.output_file_name(),
            cake_size,
            total_bytes,
        });

        let mut speed = SpeedCalculator::default();
        speed.start();
        let mut sent: u64 = 0;

        while let Some(slice) = reader.next_slice()? {
            let slice_started = Instant::now();
            let url = self.put_slice(&slice).await?;
            recipe.push_slice(slice.index, url);

            let bytes = slice.len() as u64;
            sent += bytes;
            speed.add_sample(bytes);
            let elapsed = slice_started.elapsed();
            info!(
                index = slice.index,
                cake_size,
                bytes,
                elapsed_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
                "slice uploaded"
            );
            self.emit(TransferEvent::SliceDone {
                index: slice.index,
                cake_size,
                bytes,
                elapsed,
                bytes_per_second: speed.bytes_per_second(),
                eta: speed.eta(total_bytes.saturating_sub(sent)),
            });
        }

        recipe.finish(chrono::Utc::now().timestamp());
        let recipe_path = recipe.save(&self.recipe_dir)?;

        let elapsed = started.elapsed();
        info!(
            recipe = %recipe_path.display(),
            elapsed_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
            "upload complete"
        );
        self.emit(TransferEvent::Finished { elapsed });

        Ok(UploadOutcome {
            recipe,
            recipe_path,
            total_bytes,
            elapsed,
        })
    }

    /// Puts one slice, retrying per policy. The payload is read once and
    /// resent unchanged on every attempt.
    async fn put_slice(&self, slice: &Slice) -> Result<String, UploadError> {
        let store = self.store;
        let data = slice.data.as_slice();
        let index = slice.index;

        retry_remote(
            &self.retry,
            &self.cancel,
            move || store.put(data, index),
            |attempt, delay, err| {
                warn!(
                    index,
                    attempt,
                    delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                    error = %err,
                    "slice upload failed, retrying"
                );
                self.emit(TransferEvent::SliceRetrying {
                    index,
                    attempt,
                    delay,
                    error: err.to_string(),
                });
            },
        )
        .await
        .map_err(|failure| match failure {
            RetryFailure::Exhausted { attempts, last } => UploadError::RetriesExhausted {
                index,
                attempts,
                source: last,
            },
            RetryFailure::Cancelled => UploadError::Cancelled,
        })
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(tx) = &self.events
            && let Err(e) = tx.try_send(event)
        {
            debug!("dropped transfer event: {e}");
        }
    }
}

/// Whether both paths exist and resolve to the same file.
fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
