//! Test fixtures and context helpers.
//!
//! Provides a fully wired [`ApiContext`] backed by a [`FakeUtility`] and
//! temporary directories, tuned for fast polling.

use crate::utility::{FakeUtility, UtilityMode};
use dbstream_core::{ApiContext, BackupHandle, CoreError, CoreResult, Config};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Upper bound on how long [`drain_backup`] keeps reading.
pub const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// A context with its own work directory and fake utility.
///
/// Fields drop in declaration order, so the context is finalized before its
/// directories disappear.
pub struct TestEnv {
    /// The context under test.
    pub ctx: ApiContext,
    /// The fake backup utility.
    pub utility: FakeUtility,
    base: TempDir,
    target: TempDir,
}

impl TestEnv {
    /// Creates an uninitialized environment running `mode`.
    pub fn new(mode: UtilityMode) -> Self {
        Self::with_config(mode, |config| config)
    }

    /// Like [`new`](Self::new), with a hook to adjust the configuration.
    pub fn with_config(mode: UtilityMode, adjust: impl FnOnce(Config) -> Config) -> Self {
        let utility = FakeUtility::new(mode);
        let base = TempDir::new().expect("Failed to create temp directory");
        let target = TempDir::new().expect("Failed to create temp directory");
        let config = fast_config(&utility, base.path());
        Self {
            ctx: ApiContext::new(adjust(config)),
            utility,
            base,
            target,
        }
    }

    /// Creates and initializes an environment.
    pub fn ready(mode: UtilityMode) -> Self {
        let env = Self::new(mode);
        env.ctx.initialize().expect("Failed to initialize context");
        env
    }

    /// Directory the work directory is created under.
    pub fn base(&self) -> &Path {
        self.base.path()
    }

    /// Scratch directory for restore targets.
    pub fn target(&self) -> &Path {
        self.target.path()
    }

    /// The live work directory.
    pub fn work_dir(&self) -> PathBuf {
        self.ctx.work_dir().expect("Context is not initialized")
    }
}

impl std::ops::Deref for TestEnv {
    type Target = ApiContext;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

/// Configuration pointing at `utility`, with short timeouts.
pub fn fast_config(utility: &FakeUtility, base: &Path) -> Config {
    Config::new()
        .utility(utility.program())
        .utility_args(utility.leading_args())
        .work_dir(base)
        .read_timeout(Duration::from_millis(200))
        .poll_interval(Duration::from_millis(50))
        .kill_grace(Duration::from_secs(2))
}

/// Reads the backup until end-of-stream using `buffer_size`-byte reads.
pub fn drain_backup(
    ctx: &ApiContext,
    handle: &BackupHandle,
    buffer_size: usize,
) -> CoreResult<Vec<u8>> {
    let started = Instant::now();
    let mut buf = vec![0u8; buffer_size];
    let mut out = Vec::new();
    loop {
        let outcome = ctx.backup_read(handle, &mut buf)?;
        if outcome.end_of_stream {
            return Ok(out);
        }
        assert!(outcome.bytes_read <= buffer_size);
        out.extend_from_slice(&buf[..outcome.bytes_read]);
        if started.elapsed() > DRAIN_DEADLINE {
            return Err(CoreError::child_process("backup did not reach end-of-stream"));
        }
    }
}

/// Returns the entries of `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
