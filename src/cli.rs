use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ferry", version, about = "Restartable bulk transfer of a media tree into an object store")]
pub struct Cli {
    /// More logging (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,
    /// Less logging (-q warnings, -qq errors only).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub quiet: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Copy every media item of the source tree into the destination store.
    Transfer {
        /// Config file (TOML, YAML or JSON). Defaults to `ferry.toml` in the
        /// platform config directory.
        #[arg(short, long, env = "FERRY_CONFIG")]
        config: Option<PathBuf>,
        /// Override `transfer.max_workers`.
        #[arg(short, long)]
        workers: Option<usize>,
        /// Override `transfer.max_retries`.
        #[arg(short, long)]
        retries: Option<u32>,
    },
    /// Flatten an extracted `resolution/label/file` dataset into `label/file`.
    Restructure {
        from: PathBuf,
        to: PathBuf,
        /// Allowed extension; repeat for several. Defaults to mp4, mov, avi, mkv.
        #[arg(short, long = "extension")]
        extensions: Vec<String>,
    },
}

impl Cli {
    /// Default filter directive, before `RUST_LOG` is considered.
    pub fn log_filter(&self) -> &'static str {
        match (self.verbose, self.quiet) {
            (0, 0) => "info",
            (1, _) => "debug",
            (_, 1) => "warn",
            (0, _) => "error",
            _ => "trace",
        }
    }
}
