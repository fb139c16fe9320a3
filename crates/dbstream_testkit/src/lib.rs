//! # dbstream Testkit
//!
//! Test utilities for dbstream.
//!
//! This crate provides:
//! - A fake backup utility driven by a `/bin/sh` script
//! - Ready-made contexts with temporary directories and fast polling
//! - Helpers for draining backups and inspecting directories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dbstream_testkit::prelude::*;
//!
//! #[test]
//! fn streams_a_backup() {
//!     let env = TestEnv::ready(UtilityMode::Emit(pattern_bytes(10_000)));
//!     let handle = env.backup_begin(BackupLevel::Full, "demodb", BackupOptions::new()).unwrap();
//!     let data = drain_backup(&env, &handle, 4096).unwrap();
//!     assert_eq!(data.len(), 10_000);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod utility;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::utility::*;
    pub use dbstream_core::{
        ApiContext, ApiState, BackupLevel, BackupOptions, CoreError, OptionOverride,
        RestoreKind, WorkerState,
    };
}

pub use fixtures::*;
pub use utility::*;
