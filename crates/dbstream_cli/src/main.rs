//! dbstream CLI
//!
//! Command-line front end for streaming backups and restores.
//!
//! # Commands
//!
//! - `backup` - Stream a backup from the backup utility into a file
//! - `restore` - Write a backup file through the restore sink
//! - `options` - Parse and print an option file
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use dbstream_core::{Config, OptionOverride};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Streams database backups through an external backup utility.
#[derive(Parser)]
#[command(name = "dbstream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database installation directory (defaults to $DBSTREAM_HOME)
    #[arg(global = true, long)]
    home: Option<PathBuf>,

    /// Backup utility program (defaults to <home>/bin/dbadmin)
    #[arg(global = true, long)]
    utility: Option<PathBuf>,

    /// Base directory for the named pipes
    #[arg(global = true, long)]
    work_dir: Option<PathBuf>,

    /// Option file (defaults to <home>/conf/dbstream.conf)
    #[arg(global = true, long)]
    options_file: Option<PathBuf>,

    /// Give up on the backup utility after this many seconds
    #[arg(global = true, long)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Per-call override of a boolean backup option.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Toggle {
    /// Use the option file value
    #[default]
    Default,
    /// Force on
    On,
    /// Force off
    Off,
}

impl From<Toggle> for OptionOverride {
    fn from(toggle: Toggle) -> Self {
        match toggle {
            Toggle::Default => OptionOverride::Default,
            Toggle::On => OptionOverride::On,
            Toggle::Off => OptionOverride::Off,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a backup into a file
    Backup {
        /// Database name
        #[arg(short, long)]
        db: String,

        /// Backup level (0 = full, 1 = big increment, 2 = small increment)
        #[arg(short, long, default_value = "0")]
        level: i32,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Read buffer size in bytes
        #[arg(short, long, default_value = "4096")]
        buffer_size: usize,

        /// Remove archive logs after the backup
        #[arg(long, value_enum, default_value_t)]
        remove_archive: Toggle,

        /// Run the utility in standalone mode
        #[arg(long, value_enum, default_value_t)]
        sa_mode: Toggle,

        /// Skip the consistency check
        #[arg(long, value_enum, default_value_t)]
        no_check: Toggle,

        /// Compress the stream
        #[arg(long, value_enum, default_value_t)]
        compress: Toggle,
    },

    /// Write a backup file into a target directory
    Restore {
        /// Database name
        #[arg(short, long)]
        db: String,

        /// Backup level of the input
        #[arg(short, long, default_value = "0")]
        level: i32,

        /// Backup file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Directory to restore into
        #[arg(short, long)]
        target: PathBuf,

        /// Write chunk size in bytes
        #[arg(short, long, default_value = "4096")]
        buffer_size: usize,
    },

    /// Parse and print an option file
    Options {
        /// Option file (defaults to --options-file or <home>/conf/dbstream.conf)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::from_env().inherit_stderr(cli.verbose);
    if let Some(home) = &cli.home {
        config = config.home(home);
    }
    if let Some(utility) = &cli.utility {
        config = config.utility(utility);
    }
    if let Some(dir) = &cli.work_dir {
        config = config.work_dir(dir);
    }
    if let Some(file) = &cli.options_file {
        config = config.options_file(file);
    }
    if let Some(secs) = cli.timeout {
        config = config.child_timeout(Some(Duration::from_secs(secs)));
    }
    config
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = build_config(&cli);

    match cli.command {
        Commands::Backup {
            db,
            level,
            output,
            buffer_size,
            remove_archive,
            sa_mode,
            no_check,
            compress,
        } => {
            let overrides = commands::backup::Overrides {
                remove_archive: remove_archive.into(),
                sa_mode: sa_mode.into(),
                no_check: no_check.into(),
                compress: compress.into(),
            };
            commands::backup::run(config, &db, level, &output, buffer_size, overrides)?;
        }
        Commands::Restore {
            db,
            level,
            input,
            target,
            buffer_size,
        } => {
            commands::restore::run(config, &db, level, &input, &target, buffer_size)?;
        }
        Commands::Options { file, format } => {
            let path = file
                .or(config.options_file.clone())
                .or_else(|| config.home.as_ref().map(|h| h.join("conf/dbstream.conf")))
                .ok_or("Option file path required: pass --file, --options-file or --home")?;
            commands::options::run(&path, &format)?;
        }
        Commands::Version => {
            println!("dbstream CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("dbstream Core v{}", dbstream_core::VERSION);
        }
    }

    Ok(())
}
