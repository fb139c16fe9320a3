//! # dbstream Core
//!
//! Streams database backups out of, and restores into, an external backup
//! utility that runs as a child process.
//!
//! This crate provides:
//! - A call sequencer enforcing the legal order of API calls
//! - A handle registry allowing one backup and one restore at a time
//! - A backup engine relaying the utility's output through a named pipe
//! - A restore sink writing a backup stream into a target file
//! - The option file parser and work directory management
//!
//! ## Example
//!
//! ```rust,no_run
//! use dbstream_core::{ApiContext, BackupLevel, BackupOptions, Config};
//! use std::io::Write;
//!
//! let ctx = ApiContext::new(Config::from_env());
//! ctx.initialize().unwrap();
//!
//! let handle = ctx
//!     .backup_begin(BackupLevel::Full, "demodb", BackupOptions::new())
//!     .unwrap();
//! let mut out = std::fs::File::create("demodb.bk").unwrap();
//! let mut buf = vec![0u8; 4096];
//! loop {
//!     let outcome = ctx.backup_read(&handle, &mut buf).unwrap();
//!     if outcome.end_of_stream {
//!         break;
//!     }
//!     out.write_all(&buf[..outcome.bytes_read]).unwrap();
//! }
//! ctx.backup_end(&handle).unwrap();
//! ctx.finalize().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod config;
mod context;
mod error;
mod options;
mod path;
mod registry;
mod restore;
mod sequencer;
mod types;
mod workspace;

pub use backup::UtilityCommand;
pub use config::{Config, HOME_ENV, TMP_ENV};
pub use context::ApiContext;
pub use error::{CoreError, CoreResult};
pub use options::{BackupDefaults, OptionDefaults, ResolvedOptions, RestoreDefaults};
pub use path::{
    backup_file_name, check_path_length, validate_db_name, validate_dir, MAX_DB_NAME_LEN,
    MAX_PATH_LEN,
};
pub use registry::{BackupHandle, HandleRegistry, RestoreHandle};
pub use sequencer::CallSequencer;
pub use types::{
    ApiCall, ApiState, BackupLevel, BackupOptions, HandleKind, OptionOverride, ReadOutcome,
    RestoreKind, WorkerState,
};
pub use workspace::{Workspace, WORK_DIR_NAME};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
