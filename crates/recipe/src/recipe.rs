use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cake_transfer::CHECKSUM_METHOD;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RECIPE_EXTENSION, RECIPE_VERSION, RecipeError};

/// Where one slice of the cake was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceEntry {
    /// Position of the slice in the file. This, not the position in the
    /// `slices` array, is the ordering key.
    pub index: u64,
    /// Locator returned by the remote store.
    pub url: String,
}

/// Manifest of an uploaded file.
///
/// Field order matches the documents written by earlier releases. Every
/// field is required when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub version: u32,
    /// Base name of the original file, final extension stripped.
    pub filename: String,
    /// Final extension of the original file, without the dot.
    pub format: String,
    /// Unix seconds at the end of the upload.
    pub timestamp: i64,
    /// Number of slices.
    pub cake_size: u64,
    pub slices: Vec<SliceEntry>,
    pub checksum_method: String,
    /// Hex SHA-256 of the whole original file.
    pub checksum: String,
}

impl Recipe {
    /// Starts a recipe for an upload. Slices are appended as they land.
    pub fn new(
        filename: impl Into<String>,
        format: impl Into<String>,
        cake_size: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            version: RECIPE_VERSION,
            filename: filename.into(),
            format: format.into(),
            timestamp: 0,
            cake_size,
            slices: Vec::with_capacity(cake_size.min(1024) as usize),
            checksum_method: CHECKSUM_METHOD.to_string(),
            checksum: checksum.into(),
        }
    }

    /// Records a successfully stored slice.
    pub fn push_slice(&mut self, index: u64, url: impl Into<String>) {
        self.slices.push(SliceEntry {
            index,
            url: url.into(),
        });
    }

    /// Stamps the completion time.
    pub fn finish(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// `<filename>.recipe`
    pub fn recipe_file_name(&self) -> String {
        format!("{}.{RECIPE_EXTENSION}", self.filename)
    }

    /// Name of the rebuilt file: `<filename>.<format>`, or just `<filename>`
    /// when the original had no extension.
    pub fn output_file_name(&self) -> String {
        if self.format.is_empty() {
            self.filename.clone()
        } else {
            format!("{}.{}", self.filename, self.format)
        }
    }

    /// Slices sorted by `index`, whatever order the document lists them in.
    pub fn ordered_slices(&self) -> Vec<&SliceEntry> {
        let mut slices: Vec<&SliceEntry> = self.slices.iter().collect();
        slices.sort_by_key(|s| s.index);
        slices
    }

    /// Checks the invariants a complete recipe must hold.
    ///
    /// - `version` is the supported one and the checksum method is SHA-256
    /// - `checksum` is 64 hex characters
    /// - exactly `cake_size` slices, every index in `[0, cake_size)` once
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.version != RECIPE_VERSION {
            return Err(RecipeError::UnsupportedVersion {
                found: self.version,
                supported: RECIPE_VERSION,
            });
        }

        if !self.checksum_method.eq_ignore_ascii_case(CHECKSUM_METHOD) {
            return Err(RecipeError::UnsupportedChecksumMethod(
                self.checksum_method.clone(),
            ));
        }

        if self.checksum.len() != 64 || !self.checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(RecipeError::Invalid(format!(
                "checksum is not a SHA-256 hex digest: {:?}",
                self.checksum
            )));
        }

        if self.cake_size == 0 {
            return Err(RecipeError::Invalid("cake_size must be at least 1".into()));
        }

        if self.slices.len() as u64 != self.cake_size {
            return Err(RecipeError::Invalid(format!(
                "expected {} slices, found {}",
                self.cake_size,
                self.slices.len()
            )));
        }

        let mut seen = HashSet::with_capacity(self.slices.len());
        for slice in &self.slices {
            if slice.index >= self.cake_size {
                return Err(RecipeError::Invalid(format!(
                    "slice index {} out of range (cake_size {})",
                    slice.index, self.cake_size
                )));
            }
            if !seen.insert(slice.index) {
                return Err(RecipeError::Invalid(format!(
                    "duplicate slice index {}",
                    slice.index
                )));
            }
        }

        Ok(())
    }

    /// Parses a recipe document. Structure only, see [`Recipe::validate`].
    pub fn from_json(json: &str) -> Result<Self, RecipeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RecipeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads, parses and validates a recipe file.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let content = std::fs::read_to_string(path)?;
        let recipe = Self::from_json(&content)?;
        recipe.validate()?;
        debug!(
            path = %path.display(),
            slices = recipe.slices.len(),
            "recipe loaded"
        );
        Ok(recipe)
    }

    /// Writes `<filename>.recipe` into `dir` and returns its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, RecipeError> {
        let path = dir.join(self.recipe_file_name());
        std::fs::write(&path, self.to_json()?)?;
        debug!(path = %path.display(), "recipe saved");
        Ok(path)
    }
}
