//! Command-line surface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use cake_bakery::RetryPolicy;
use cake_recipe::RECIPE_EXTENSION;
use cake_transfer::DEFAULT_SLICE_SIZE;
use clap::{Parser, Subcommand};

/// Fixed delay of the default upload loop.
const UPLOAD_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(
    name = "cake",
    version,
    about = "Store files as slices on a message channel and bake them back",
    after_help = "Legacy form: `cake -f FILE` uploads, `cake -r RECIPE` builds."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Upload FILE (same as `cake upload FILE`)
    #[arg(short = 'f', value_name = "FILE", conflicts_with = "recipe")]
    pub file: Option<PathBuf>,

    /// Build from RECIPE (same as `cake build RECIPE`)
    #[arg(short = 'r', value_name = "RECIPE")]
    pub recipe: Option<PathBuf>,

    /// Config file (TOML if it ends in .toml, JSON otherwise)
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Slice size in bytes
    #[arg(long, global = true, default_value_t = DEFAULT_SLICE_SIZE,
          value_parser = parse_slice_size)]
    pub slice_size: usize,

    /// Directory that receives the recipe after an upload
    #[arg(long, global = true, default_value = ".")]
    pub recipe_dir: PathBuf,

    /// Directory that receives the baked file
    #[arg(long, global = true, default_value = ".")]
    pub output_dir: PathBuf,

    /// Give up on a slice after N attempts
    #[arg(long, global = true, value_name = "N", conflicts_with = "retry_forever",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Never give up on a slice
    #[arg(long, global = true)]
    pub retry_forever: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Slice FILE onto the channel and write FILE's recipe
    Upload { file: PathBuf },
    /// Fetch the slices named by RECIPE and rebuild the file
    Build { recipe: PathBuf },
}

/// What to run, after folding the legacy flags into subcommands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Upload(PathBuf),
    Build(PathBuf),
}

impl Cli {
    pub fn action(&self) -> anyhow::Result<Action> {
        match (&self.command, &self.file, &self.recipe) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                bail!("-f/-r cannot be combined with a subcommand")
            }
            (Some(Command::Upload { file }), None, None) => Ok(Action::Upload(file.clone())),
            (Some(Command::Build { recipe }), None, None) => Ok(Action::Build(recipe.clone())),
            (None, Some(file), _) => Ok(Action::Upload(file.clone())),
            (None, None, Some(recipe)) => Ok(Action::Build(recipe.clone())),
            (None, None, None) => {
                bail!("nothing to do: use `cake upload FILE` or `cake build RECIPE`")
            }
        }
    }

    /// Retry policy for uploads. Without flags this is the fixed 10 s loop
    /// that only stops when the slice goes through.
    pub fn upload_retry(&self) -> RetryPolicy {
        match self.max_attempts {
            Some(n) => RetryPolicy::forever(UPLOAD_RETRY_DELAY).with_max_attempts(Some(n)),
            None => RetryPolicy::forever(UPLOAD_RETRY_DELAY),
        }
    }

    /// Retry policy for builds: bounded backoff unless told otherwise.
    pub fn build_retry(&self) -> RetryPolicy {
        if self.retry_forever {
            return RetryPolicy::default().with_max_attempts(None);
        }
        match self.max_attempts {
            Some(n) => RetryPolicy::default().with_max_attempts(Some(n)),
            None => RetryPolicy::default(),
        }
    }
}

/// Whether `path` ends in the extension uploads give their recipes.
pub fn has_recipe_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(RECIPE_EXTENSION))
}

fn parse_slice_size(s: &str) -> Result<usize, String> {
    let size: usize = s.parse().map_err(|e| format!("{e}"))?;
    if size == 0 {
        return Err("slice size must be greater than zero".into());
    }
    Ok(size)
}
