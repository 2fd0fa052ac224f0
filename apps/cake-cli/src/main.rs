mod cli;
mod config;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, bail};
use cake_bakery::{Assembler, TransferEvent, Uploader};
use cake_remote::ChannelStore;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::{Action, Cli, has_recipe_extension};
use config::Config;

/// Build finished but the digest did not match.
const EXIT_CHECKSUM_MISMATCH: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let action = cli.action()?;
    let config = Config::resolve(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            ctrl_c.cancel();
        }
    });

    match action {
        Action::Upload(path) => upload(&cli, &config, &path, cancel).await,
        Action::Build(recipe) => build(&cli, &config, &recipe, cancel).await,
    }
}

async fn upload(
    cli: &Cli,
    config: &Config,
    path: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    let store_config = config.to_store_config();
    if !store_config.can_upload() {
        bail!("uploading needs `token` and `channel` in the config file");
    }
    let store = ChannelStore::new(store_config)?;

    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(rx, "uploaded");

    let result = Uploader::new(&store)
        .with_retry_policy(cli.upload_retry())
        .with_recipe_dir(&cli.recipe_dir)
        .with_cancel_token(cancel)
        .with_events(tx)
        .upload(path, cli.slice_size)
        .await;
    let _ = printer.await;

    let outcome = result.with_context(|| format!("upload of {} failed", path.display()))?;
    println!(
        "Uploaded {} bytes in {:.2} s. Recipe written to {}",
        outcome.total_bytes,
        outcome.elapsed.as_secs_f64(),
        outcome.recipe_path.display()
    );
    Ok(ExitCode::SUCCESS)
}

async fn build(
    cli: &Cli,
    config: &Config,
    recipe: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<ExitCode> {
    if !has_recipe_extension(recipe) {
        tracing::warn!(
            path = %recipe.display(),
            "recipe does not end in .{}",
            cake_recipe::RECIPE_EXTENSION
        );
    }
    let store = ChannelStore::new(config.to_store_config())?;

    let (tx, rx) = mpsc::channel(64);
    let printer = spawn_printer(rx, "downloaded");

    let result = Assembler::new(&store)
        .with_retry_policy(cli.build_retry())
        .with_output_dir(&cli.output_dir)
        .with_cancel_token(cancel)
        .with_events(tx)
        .build(recipe)
        .await;
    let _ = printer.await;

    let outcome = result.with_context(|| format!("build from {} failed", recipe.display()))?;
    if outcome.verified {
        println!(
            "Hashes match. Baked {} ({} bytes) in {:.2} s.",
            outcome.output_path.display(),
            outcome.bytes_written,
            outcome.elapsed.as_secs_f64()
        );
        Ok(ExitCode::SUCCESS)
    } else {
        println!(
            "Checksum mismatch for {}: expected {}, got {}.",
            outcome.output_path.display(),
            outcome.expected_checksum,
            outcome.actual_checksum
        );
        Ok(ExitCode::from(EXIT_CHECKSUM_MISMATCH))
    }
}

/// Prints progress lines until every sender is dropped.
fn spawn_printer(mut rx: mpsc::Receiver<TransferEvent>, verb: &'static str) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TransferEvent::Started {
                    name, cake_size, ..
                } => println!("{name}: {cake_size} slices"),
                TransferEvent::SliceDone {
                    index,
                    cake_size,
                    bytes,
                    elapsed,
                    bytes_per_second,
                    eta,
                } => println!(
                    "Slice {}/{cake_size} {verb} ({bytes} bytes, {:.2} s, {:.1} KiB/s{})",
                    index + 1,
                    elapsed.as_secs_f64(),
                    bytes_per_second / 1024.0,
                    eta.map(|d| format!(", ETA {:.0} s", d.as_secs_f64()))
                        .unwrap_or_default()
                ),
                TransferEvent::SliceRetrying {
                    index,
                    attempt,
                    delay,
                    error,
                } => println!(
                    "Slice {index} attempt {attempt} failed: {error}. Retrying in {:.1} s",
                    delay.as_secs_f64()
                ),
                TransferEvent::Finished { .. } => {}
            }
        }
    })
}
