mod cli;
mod error;

use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use ferry_config::{Config, DestinationConfig, SourceConfig};
use ferry_pipeline::{Context, EventSink, Extensions, Outcome, Settings, TransferEvent};
use ferry_source::SourceHandle;
use ferry_storage::BackendHandle;
use figment::providers::Serialized;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Transfer { config, workers, retries } => run_transfer(config.as_deref(), workers, retries).await,
        Command::Restructure { from, to, extensions } => run_restructure(&from, &to, &extensions).await,
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run_transfer(config: Option<&Path>, workers: Option<usize>, retries: Option<u32>) -> Result<ExitCode> {
    let mut figment = Config::figment(config).or_raise(|| ErrorKind::Config)?;
    if let Some(workers) = workers {
        figment = figment.merge(Serialized::default("transfer.max_workers", workers));
    }
    if let Some(retries) = retries {
        figment = figment.merge(Serialized::default("transfer.max_retries", retries));
    }
    let config = Config::from_figment(figment).or_raise(|| ErrorKind::Config)?;
    let settings = Settings::try_from(&config.transfer).or_raise(|| ErrorKind::Config)?;

    let source = build_source(&config.source)?;
    let backend = build_destination(&config.destination)?;
    let (events, receiver) = EventSink::channel(config.transfer.event_buffer);
    let ctx = Context::new(source, backend, settings).with_events(events);
    let reporter = tokio::spawn(report_events(receiver));

    let summary = ferry_pipeline::transfer(Arc::new(ctx)).await.or_raise(|| ErrorKind::Transfer);
    // All senders are gone once the context is dropped, which ends the reporter.
    if let Err(e) = reporter.await {
        tracing::warn!(error = %e, "Event reporter stopped unexpectedly");
    }
    let summary = summary?;
    println!("{summary}");
    Ok(if summary.has_failures() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn run_restructure(from: &Path, to: &Path, extensions: &[String]) -> Result<ExitCode> {
    let extensions = if extensions.is_empty() { Extensions::default() } else { Extensions::new(extensions) };
    if extensions.is_empty() {
        exn::bail!(ErrorKind::Config);
    }
    let summary = ferry_pipeline::restructure(from, to, &extensions).await.or_raise(|| ErrorKind::Restructure)?;
    println!("{} moved, {} skipped", summary.moved, summary.skipped);
    Ok(ExitCode::SUCCESS)
}

fn build_source(config: &SourceConfig) -> Result<SourceHandle> {
    match config {
        #[cfg(feature = "drive")]
        SourceConfig::Drive { root_folder_id, access_token, timeout_secs } => {
            let tree = ferry_source::tree::DriveTree::new(
                "drive",
                root_folder_id.as_str(),
                access_token.as_str(),
                std::time::Duration::from_secs(*timeout_secs),
            )
            .or_raise(|| ErrorKind::Source)?;
            Ok(Arc::new(tree))
        },
        #[cfg(not(feature = "drive"))]
        SourceConfig::Drive { .. } => {
            tracing::error!("Google Drive support was not compiled in (feature `drive`)");
            exn::bail!(ErrorKind::Source)
        },
        SourceConfig::Local { root } => {
            let tree = ferry_source::tree::LocalTree::new("local", root).or_raise(|| ErrorKind::Source)?;
            Ok(Arc::new(tree))
        },
    }
}

fn build_destination(config: &DestinationConfig) -> Result<BackendHandle> {
    match config {
        #[cfg(feature = "s3")]
        DestinationConfig::S3 { bucket, region, endpoint, key_id, key_secret } => Ok(Arc::new(
            ferry_storage::backend::S3Backend::new(
                "s3",
                bucket.as_str(),
                region.as_str(),
                endpoint.as_deref(),
                key_id.as_str(),
                key_secret.as_str(),
            ),
        )),
        #[cfg(not(feature = "s3"))]
        DestinationConfig::S3 { .. } => {
            tracing::error!("S3 support was not compiled in (feature `s3`)");
            exn::bail!(ErrorKind::Destination)
        },
        DestinationConfig::Local { root } => {
            let backend =
                ferry_storage::backend::LocalBackend::new("local", root).or_raise(|| ErrorKind::Destination)?;
            Ok(Arc::new(backend))
        },
    }
}

/// Log progress and outcomes as they arrive.
async fn report_events(mut receiver: mpsc::Receiver<TransferEvent>) {
    while let Some(event) = receiver.recv().await {
        match event {
            TransferEvent::Progress { leaf, bytes, total } => {
                tracing::trace!(%leaf, bytes, total, "Download progress");
            },
            TransferEvent::Finished(report) if report.outcome == Outcome::Succeeded => {
                tracing::debug!(key = %report.key, "Done");
            },
            TransferEvent::Finished(report) => {
                tracing::info!(key = %report.key, outcome = %report.outcome, reason = %report.reason, "Finished");
            },
        }
    }
}
