//! Context configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the database installation directory.
pub const HOME_ENV: &str = "DBSTREAM_HOME";

/// Environment variable naming an extra candidate for the work directory base.
pub const TMP_ENV: &str = "DBSTREAM_TMP";

/// Configuration for an [`ApiContext`](crate::ApiContext).
#[derive(Debug, Clone)]
pub struct Config {
    /// Database installation directory. Hosts `bin/`, `conf/` and `tmp/`.
    pub home: Option<PathBuf>,

    /// Backup utility program. Defaults to `<home>/bin/dbadmin`.
    pub utility: Option<PathBuf>,

    /// Arguments placed before the backup flags (the utility's subcommand).
    pub utility_args: Vec<String>,

    /// Base directory for the work directory. Defaults to the first usable
    /// of `<home>/tmp`, `$DBSTREAM_TMP` and `/tmp`.
    pub work_dir: Option<PathBuf>,

    /// Extra base directory candidate, tried after `<home>/tmp`.
    pub tmp_dir: Option<PathBuf>,

    /// Option file. Defaults to `<home>/conf/dbstream.conf`.
    pub options_file: Option<PathBuf>,

    /// How long a read waits for each block to become readable.
    pub read_timeout: Duration,

    /// Length of one supervision slice of the worker.
    pub poll_interval: Duration,

    /// Upper bound on the utility's run time (`None` = unbounded).
    pub child_timeout: Option<Duration>,

    /// Time a terminated process group gets before it is killed.
    pub kill_grace: Duration,

    /// Drain block size as a multiple of the filesystem block size.
    pub io_blocks: usize,

    /// Let the utility write to this process's stderr.
    pub inherit_stderr: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: None,
            utility: None,
            utility_args: vec!["backupdb".to_string()],
            work_dir: None,
            tmp_dir: None,
            options_file: None,
            read_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(1),
            child_timeout: None,
            kill_grace: Duration::from_secs(5),
            io_blocks: 8,
            inherit_stderr: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from `DBSTREAM_HOME` and `DBSTREAM_TMP`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.home = env::var_os(HOME_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        config.tmp_dir = env::var_os(TMP_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        config
    }

    /// Sets the installation directory.
    #[must_use]
    pub fn home(mut self, path: impl Into<PathBuf>) -> Self {
        self.home = Some(path.into());
        self
    }

    /// Sets the backup utility program.
    #[must_use]
    pub fn utility(mut self, path: impl Into<PathBuf>) -> Self {
        self.utility = Some(path.into());
        self
    }

    /// Replaces the leading utility arguments.
    #[must_use]
    pub fn utility_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.utility_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the work directory base.
    #[must_use]
    pub fn work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(path.into());
        self
    }

    /// Sets the option file.
    #[must_use]
    pub fn options_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.options_file = Some(path.into());
        self
    }

    /// Sets the per-block read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Sets the worker supervision slice.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bounds the utility's run time.
    #[must_use]
    pub const fn child_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.child_timeout = timeout;
        self
    }

    /// Sets the grace period between SIGTERM and SIGKILL.
    #[must_use]
    pub const fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Sets the drain block multiplier.
    #[must_use]
    pub const fn io_blocks(mut self, blocks: usize) -> Self {
        self.io_blocks = blocks;
        self
    }

    /// Sets whether the utility inherits stderr.
    #[must_use]
    pub const fn inherit_stderr(mut self, value: bool) -> Self {
        self.inherit_stderr = value;
        self
    }
}
