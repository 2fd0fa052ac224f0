//! Recipe error types.

/// Errors produced while reading, writing or validating a recipe.
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed recipe: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported recipe version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unsupported checksum method: {0}")]
    UnsupportedChecksumMethod(String),

    #[error("invalid recipe: {0}")]
    Invalid(String),
}
