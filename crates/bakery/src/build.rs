//! Build pipeline: fetch the slices named by a recipe and reassemble the file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use cake_recipe::{RECIPE_VERSION, Recipe, RecipeError};
use cake_remote::RemoteStore;
use cake_transfer::{ChecksumWriter, SpeedCalculator, validate_output_name};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::retry::{RetryFailure, RetryPolicy, retry_remote};
use crate::types::{BuildOutcome, TransferEvent};

/// Reassembles files from recipes.
///
/// The recipe is fully validated before the first fetch. Slices are
/// written in index order and hashed as they are written, so only one
/// slice is held in memory at a time.
pub struct Assembler<'a> {
    store: &'a dyn RemoteStore,
    retry: RetryPolicy,
    output_dir: PathBuf,
    cancel: CancellationToken,
    events: Option<mpsc::Sender<TransferEvent>>,
}

impl<'a> Assembler<'a> {
    /// Creates an assembler writing to the current directory.
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            output_dir: PathBuf::from("."),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
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

    /// Loads the recipe at `recipe_path` and builds its file.
    pub async fn build(&self, recipe_path: &Path) -> Result<BuildOutcome, BuildError> {
        let content = std::fs::read_to_string(recipe_path)?;
        let recipe = parse_recipe(&content)?;
        debug!(path = %recipe_path.display(), "recipe parsed");
        self.build_recipe(&recipe).await
    }

    /// Builds the file described by an in-memory recipe.
    pub async fn build_recipe(&self, recipe: &Recipe) -> Result<BuildOutcome, BuildError> {
        recipe.validate()?;

        let name = recipe.output_file_name();
        validate_output_name(&name).map_err(|_| BuildError::InvalidOutputName(name.clone()))?;

        let started = Instant::now();
        let output_path = self.output_dir.join(&name);
        let cake_size = recipe.cake_size;

        info!(
            output = %output_path.display(),
            cake_size,
            "building cake"
        );
        self.emit(TransferEvent::Started {
            name: name.clone(),
            cake_size,
            total_bytes: 0,
        });

        let file = File::create(&output_path)?;
        let mut writer = ChecksumWriter::new(BufWriter::new(file));
        let mut speed = SpeedCalculator::default();
        speed.start();
        let mut fetched: u64 = 0;
        let mut written: u64 = 0;

        for entry in recipe.ordered_slices() {
            let slice_started = Instant::now();
            let data = self.fetch_slice(entry.index, &entry.url).await?;
            writer.write_all(&data)?;

            let bytes = data.len() as u64;
            speed.add_sample(bytes);
            fetched += 1;
            written += bytes;
            let elapsed = slice_started.elapsed();
            info!(
                index = entry.index,
                cake_size,
                bytes,
                elapsed_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
                "slice fetched"
            );
            self.emit(TransferEvent::SliceDone {
                index: entry.index,
                cake_size,
                bytes,
                elapsed,
                bytes_per_second: speed.bytes_per_second(),
                eta: speed.eta(remaining_estimate(written, fetched, cake_size)),
            });
        }

        let bytes_written = writer.bytes_written();
        let (buffered, actual_checksum) = writer.finish();
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        let verified = actual_checksum.eq_ignore_ascii_case(&recipe.checksum);
        let elapsed = started.elapsed();
        if verified {
            info!(
                output = %output_path.display(),
                bytes_written,
                elapsed_secs = format_args!("{:.2}", elapsed.as_secs_f64()),
                "build complete, checksum verified"
            );
        } else {
            warn!(
                output = %output_path.display(),
                expected = %recipe.checksum,
                actual = %actual_checksum,
                "checksum mismatch, output kept"
            );
        }
        self.emit(TransferEvent::Finished { elapsed });

        Ok(BuildOutcome {
            output_path,
            bytes_written,
            expected_checksum: recipe.checksum.clone(),
            actual_checksum,
            verified,
            elapsed,
        })
    }

    async fn fetch_slice(&self, index: u64, url: &str) -> Result<Vec<u8>, BuildError> {
        let store = self.store;

        retry_remote(
            &self.retry,
            &self.cancel,
            move || store.get(url),
            |attempt, delay, err| {
                warn!(
                    index,
                    attempt,
                    delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
                    error = %err,
                    "slice fetch failed, retrying"
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
            RetryFailure::Exhausted { attempts, last } => BuildError::RetriesExhausted {
                index,
                attempts,
                source: last,
            },
            RetryFailure::Cancelled => BuildError::Cancelled,
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

/// Bytes still to fetch, assuming the remaining slices average the same
/// size as those fetched so far.
fn remaining_estimate(written: u64, fetched: u64, cake_size: u64) -> u64 {
    if fetched == 0 {
        return 0;
    }
    (written / fetched).saturating_mul(cake_size.saturating_sub(fetched))
}

/// Parses a recipe, reporting an unsupported version ahead of other
/// structural problems so older documents get a precise error.
fn parse_recipe(content: &str) -> Result<Recipe, BuildError> {
    match Recipe::from_json(content) {
        Ok(recipe) => Ok(recipe),
        Err(RecipeError::Malformed(e)) => {
            let version = serde_json::from_str::<serde_json::Value>(content)
                .ok()
                .and_then(|v| v.get("version").and_then(|v| v.as_u64()));
            match version {
                Some(found) if found != u64::from(RECIPE_VERSION) => {
                    Err(BuildError::UnsupportedVersion {
                        found: u32::try_from(found).unwrap_or(u32::MAX),
                        supported: RECIPE_VERSION,
                    })
                }
                _ => Err(BuildError::MalformedRecipe(e.to_string())),
            }
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Uploader;
    use cake_recipe::SliceEntry;
    use cake_remote::MemoryStore;
    use cake_transfer::checksum_bytes;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Stores `data` in `slice_size` pieces and returns the matching recipe.
    fn bake(
        store: &MemoryStore,
        name: &str,
        format: &str,
        data: &[u8],
        slice_size: usize,
    ) -> Recipe {
        let cake_size = data.len() as u64 / slice_size as u64 + 1;
        let mut recipe = Recipe::new(name, format, cake_size, checksum_bytes(data));
        for index in 0..cake_size {
            let start = (index as usize * slice_size).min(data.len());
            let end = (start + slice_size).min(data.len());
            recipe.push_slice(index, store.insert(&data[start..end]));
        }
        recipe.finish(1_700_000_000);
        recipe
    }

    fn sample_data() -> Vec<u8> {
        (0..=255u8).cycle().take(1000).collect()
    }

    #[tokio::test]
    async fn upload_then_build_round_trip() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let data = sample_data();
        let path = src.path().join("blob.dat");
        std::fs::write(&path, &data).unwrap();
        let store = MemoryStore::new();

        let uploaded = Uploader::new(&store)
            .with_recipe_dir(src.path())
            .upload(&path, 300)
            .await
            .unwrap();

        let outcome = Assembler::new(&store)
            .with_output_dir(out.path())
            .build(&uploaded.recipe_path)
            .await
            .unwrap();

        assert!(outcome.verified);
        assert_eq!(outcome.output_path, out.path().join("blob.dat"));
        assert_eq!(outcome.bytes_written, 1000);
        assert_eq!(std::fs::read(&outcome.output_path).unwrap(), data);
        assert_eq!(outcome.actual_checksum, outcome.expected_checksum);
    }

    #[tokio::test]
    async fn empty_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let recipe = bake(&store, "empty", "txt", b"", 8);
        assert_eq!(recipe.cake_size, 1);

        let outcome = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap();

        assert!(outcome.verified);
        assert_eq!(outcome.bytes_written, 0);
        assert!(std::fs::read(&outcome.output_path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn slices_are_written_in_index_order() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let data = b"hello, cake world".to_vec();
        let mut recipe = bake(&store, "greeting", "txt", &data, 5);
        recipe.slices.reverse();
        assert_eq!(recipe.slices[0].index, 3);

        let outcome = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap();

        assert!(outcome.verified);
        assert_eq!(std::fs::read(&outcome.output_path).unwrap(), data);
    }

    #[tokio::test]
    async fn corrupted_slice_is_reported_not_fatal() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let data = sample_data();
        let recipe = bake(&store, "blob", "dat", &data, 400);
        assert!(store.corrupt(&recipe.slices[1].url));

        let outcome = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap();

        assert!(!outcome.verified);
        assert_eq!(outcome.bytes_written, data.len() as u64);
        assert_ne!(outcome.actual_checksum, outcome.expected_checksum);
        let written = std::fs::read(&outcome.output_path).unwrap();
        assert_eq!(written.len(), data.len());
        assert_ne!(written, data);
    }

    #[tokio::test]
    async fn building_twice_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let data = sample_data();
        let recipe = bake(&store, "twice", "bin", &data, 128);
        let assembler = Assembler::new(&store).with_output_dir(dir.path());

        let first = assembler.build_recipe(&recipe).await.unwrap();
        let first_bytes = std::fs::read(&first.output_path).unwrap();

        // A longer stale file must be truncated, not partly kept.
        std::fs::write(&first.output_path, vec![0xAA; data.len() * 2]).unwrap();
        let second = assembler.build_recipe(&recipe).await.unwrap();
        let second_bytes = std::fs::read(&second.output_path).unwrap();

        assert!(first.verified && second.verified);
        assert_eq!(first.output_path, second.output_path);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(second_bytes, data);
    }

    #[test]
    fn remaining_estimate_scales_by_average_slice() {
        assert_eq!(remaining_estimate(0, 0, 5), 0);
        assert_eq!(remaining_estimate(300, 3, 5), 200);
        assert_eq!(remaining_estimate(300, 3, 3), 0);
        assert_eq!(remaining_estimate(10, 4, 2), 0);
    }

    #[tokio::test]
    async fn file_without_extension_keeps_bare_name() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let recipe = bake(&store, "Makefile", "", b"all:\n", 16);

        let outcome = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap();

        assert_eq!(outcome.output_path, dir.path().join("Makefile"));
    }

    #[tokio::test]
    async fn missing_checksum_fails_before_any_fetch() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let loc = store.insert(b"abc");
        let path = dir.path().join("broken.recipe");
        let json = format!(
            r#"{{"version": 2, "filename": "broken", "format": "txt", "timestamp": 1,
                "cake_size": 1, "slices": [{{"index": 0, "url": "{loc}"}}],
                "checksum_method": "sha256"}}"#
        );
        std::fs::write(&path, json).unwrap();

        let err = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build(&path)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::MalformedRecipe(_)));
        assert_eq!(store.get_calls(), 0);
        assert!(!dir.path().join("broken.txt").exists());
    }

    #[tokio::test]
    async fn old_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let path = dir.path().join("old.recipe");
        std::fs::write(
            &path,
            r#"{"version": 1, "filename": "old", "format": "txt", "slices": []}"#,
        )
        .unwrap();

        let err = Assembler::new(&store).build(&path).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::UnsupportedVersion {
                found: 1,
                supported: 2
            }
        ));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn wrong_version_with_all_fields_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut recipe = bake(&store, "v3", "bin", b"data", 8);
        recipe.version = 3;

        let err = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnsupportedVersion { found: 3, .. }));
    }

    #[tokio::test]
    async fn duplicate_indices_are_malformed() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut recipe = bake(&store, "dup", "bin", b"0123456789", 4);
        recipe.slices[2] = SliceEntry {
            index: 1,
            url: recipe.slices[1].url.clone(),
        };

        let err = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MalformedRecipe(_)));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let mut recipe = bake(&store, "x", "bin", b"data", 8);
        recipe.filename = "../../etc/evil".into();

        let err = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidOutputName(_)));
        assert_eq!(store.get_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let data = sample_data();
        let recipe = bake(&store, "flaky", "bin", &data, 500);
        store.fail_gets(&recipe.slices[0].url, 2);

        let outcome = Assembler::new(&store)
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap();

        assert!(outcome.verified);
        // 3 attempts for slice 0, one each for slices 1 and 2.
        assert_eq!(store.get_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_exhaustion_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let recipe = bake(&store, "gone", "bin", b"0123456789", 4);
        store.fail_gets(&recipe.slices[1].url, 100);

        let err = Assembler::new(&store)
            .with_retry_policy(RetryPolicy::default().with_max_attempts(Some(2)))
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::RetriesExhausted {
                index: 1,
                attempts: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn no_retry_policy_fails_on_first_error() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let recipe = bake(&store, "once", "bin", b"abc", 8);
        store.fail_gets(&recipe.slices[0].url, 1);

        let err = Assembler::new(&store)
            .with_retry_policy(RetryPolicy::none())
            .with_output_dir(dir.path())
            .build_recipe(&recipe)
            .await
            .unwrap_err();

        assert!(matches!(err, BuildError::RetriesExhausted { attempts: 1, .. }));
        assert_eq!(store.get_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_build() {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::new();
        let recipe = bake(&store, "stop", "bin", b"0123456789", 4);
        store.fail_gets(&recipe.slices[0].url, 100);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);

        let assembler = Assembler::new(&store)
            .with_retry_policy(RetryPolicy::forever(Duration::from_secs(30)))
            .with_output_dir(dir.path())
            .with_cancel_token(cancel.clone())
            .with_events(tx);

        let trigger = async {
            while let Some(event) = rx.recv().await {
                if matches!(event, TransferEvent::SliceRetrying { .. }) {
                    cancel.cancel();
                    break;
                }
            }
        };
        let (result, ()) = tokio::join!(assembler.build_recipe(&recipe), trigger);

        assert!(matches!(result, Err(BuildError::Cancelled)));
    }
}
