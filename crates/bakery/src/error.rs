//! Pipeline error types.

use cake_recipe::RecipeError;
use cake_remote::RemoteError;
use cake_transfer::TransferError;

/// Errors produced while uploading a file.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("slice size must be greater than zero")]
    InvalidSliceSize,

    #[error("recipe would overwrite the source file {}", .0.display())]
    RecipeOverwritesSource(std::path::PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("recipe error: {0}")]
    Recipe(#[from] RecipeError),

    #[error("slice {index} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        index: u64,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Errors produced while building a file from a recipe.
///
/// A checksum mismatch is not an error; see
/// [`BuildOutcome::verified`](crate::BuildOutcome::verified).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed recipe: {0}")]
    MalformedRecipe(String),

    #[error("unsupported recipe version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid output name: {0}")]
    InvalidOutputName(String),

    #[error("slice {index} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        index: u64,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl From<RecipeError> for BuildError {
    fn from(e: RecipeError) -> Self {
        match e {
            RecipeError::Io(e) => Self::Io(e),
            RecipeError::UnsupportedVersion { found, supported } => {
                Self::UnsupportedVersion { found, supported }
            }
            RecipeError::Malformed(e) => Self::MalformedRecipe(e.to_string()),
            RecipeError::UnsupportedChecksumMethod(m) => {
                Self::MalformedRecipe(format!("unsupported checksum method: {m}"))
            }
            RecipeError::Invalid(msg) => Self::MalformedRecipe(msg),
        }
    }
}
