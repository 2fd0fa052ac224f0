//! The recipe: the only artifact shared between upload and build.
//!
//! A recipe is a small JSON document listing, for every slice of a file,
//! where the slice was stored, plus a SHA-256 of the whole file. It is
//! written once after a successful upload and only ever read afterwards.

mod error;
mod naming;
mod recipe;

pub use error::RecipeError;
pub use naming::split_file_name;
pub use recipe::{Recipe, SliceEntry};

/// The only recipe version this crate reads and writes.
pub const RECIPE_VERSION: u32 = 2;

/// File extension of recipe documents.
pub const RECIPE_EXTENSION: &str = "recipe";
