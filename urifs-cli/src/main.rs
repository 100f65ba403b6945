// SPDX-License-Identifier: AGPL-3.0-or-later
//! URIFS CLI
//!
//! One set of file commands for every storage URI.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use urifs_core::{UrifsConfig, UrifsResult};
use urifs_vfs::UriFilesystem;

#[derive(Parser)]
#[command(name = "urifs")]
#[command(author, version, about = "URIFS - one file system for every URI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file with backend credentials
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List directory contents
    #[command(alias = "dir")]
    Ls {
        /// URI or path to list (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,

        /// Long format with details
        #[arg(short, long)]
        long: bool,

        /// Human-readable sizes
        #[arg(short = 'H', long)]
        human: bool,
    },

    /// Display file contents
    Cat {
        /// File to display
        path: String,
    },

    /// Display the first bytes of a file
    Head {
        path: String,

        /// Number of bytes
        #[arg(short = 'n', long, default_value_t = 1024)]
        bytes: usize,
    },

    /// Display the last bytes of a file
    Tail {
        path: String,

        /// Number of bytes
        #[arg(short = 'n', long, default_value_t = 1024)]
        bytes: usize,
    },

    /// Copy files or directories, within or across backends
    Cp {
        /// Source URI
        source: String,

        /// Destination URI
        dest: String,

        /// Recursive copy for directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Remove files or directories
    Rm {
        /// URI(s) to remove
        #[arg(required = true)]
        paths: Vec<String>,

        /// Recursive removal for directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Create directories
    Mkdir {
        /// Directory URI(s) to create
        #[arg(required = true)]
        paths: Vec<String>,

        /// Create parent directories as needed
        #[arg(short, long)]
        parents: bool,
    },

    /// Create empty files or update their modification time
    Touch {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show file or directory information
    Stat {
        /// URI to inspect
        path: String,
    },

    /// Exit successfully when the URI exists
    Exists {
        path: String,
    },

    /// List every file below a URI
    Find {
        path: String,

        /// Descend at most this many levels
        #[arg(long)]
        maxdepth: Option<usize>,

        /// Include directories
        #[arg(long)]
        dirs: bool,
    },

    /// Expand a glob pattern
    Glob {
        pattern: String,
    },

    /// Disk usage below a URI
    Du {
        path: String,

        /// Print only the total
        #[arg(short, long)]
        summarize: bool,

        /// Human-readable sizes
        #[arg(short = 'H', long)]
        human: bool,
    },

    /// BLAKE3 checksum of file contents
    Checksum {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Write stdin to a URI
    Put {
        path: String,
    },

    /// List supported URI schemes
    Schemes,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> UrifsResult<UrifsConfig> {
    match path {
        Some(path) => UrifsConfig::load(path),
        None => UrifsConfig::load_default(),
    }
}

async fn run(cli: Cli) -> UrifsResult<ExitCode> {
    let config = load_config(cli.config.as_ref())?;
    let fs = UriFilesystem::from_config(&config)?;

    match cli.command {
        Commands::Ls { path, long, human } => commands::ls(&fs, &path, long, human).await?,
        Commands::Cat { path } => commands::cat(&fs, &path).await?,
        Commands::Head { path, bytes } => commands::head(&fs, &path, bytes).await?,
        Commands::Tail { path, bytes } => commands::tail(&fs, &path, bytes).await?,
        Commands::Cp { source, dest, recursive } => {
            commands::cp(&fs, &source, &dest, recursive).await?
        }
        Commands::Rm { paths, recursive } => commands::rm(&fs, &paths, recursive).await?,
        Commands::Mkdir { paths, parents } => commands::mkdir(&fs, &paths, parents).await?,
        Commands::Touch { paths } => commands::touch(&fs, &paths).await?,
        Commands::Stat { path } => commands::stat(&fs, &path).await?,
        Commands::Exists { path } => {
            if !commands::exists(&fs, &path).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Find { path, maxdepth, dirs } => {
            commands::find(&fs, &path, maxdepth, dirs).await?
        }
        Commands::Glob { pattern } => commands::glob(&fs, &pattern).await?,
        Commands::Du { path, summarize, human } => {
            commands::du(&fs, &path, summarize, human).await?
        }
        Commands::Checksum { paths } => commands::checksum(&fs, &paths).await?,
        Commands::Put { path } => commands::put(&fs, &path).await?,
        Commands::Schemes => commands::schemes(&fs),
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
