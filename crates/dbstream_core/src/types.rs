//! Core type definitions for dbstream.

use crate::error::CoreError;
use std::fmt;

/// Granularity of a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupLevel {
    /// Complete backup of the database.
    Full = 0,
    /// Changes since the last full backup.
    BigIncrement = 1,
    /// Changes since the last incremental backup.
    SmallIncrement = 2,
}

impl BackupLevel {
    /// All levels in ordinal order.
    pub const ALL: [BackupLevel; 3] = [Self::Full, Self::BigIncrement, Self::SmallIncrement];

    /// Returns the ordinal passed to the backup utility.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }
}

impl TryFrom<i32> for BackupLevel {
    type Error = CoreError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Full),
            1 => Ok(Self::BigIncrement),
            2 => Ok(Self::SmallIncrement),
            other => Err(CoreError::invalid_argument(format!(
                "backup level must be 0, 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for BackupLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::BigIncrement => write!(f, "big-increment"),
            Self::SmallIncrement => write!(f, "small-increment"),
        }
    }
}

/// Destination of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreKind {
    /// Write the backup stream into a file in a target directory.
    ToFile,
    /// Restore directly into a database instance. Not supported.
    ToDatabase,
}

/// The two singleton handle slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// The backup slot.
    Backup,
    /// The restore slot.
    Restore,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backup => write!(f, "backup"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// Lifecycle of the worker that supervises the backup utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker has been started for the current handle.
    NoSpawn = 0,
    /// The worker is running and the utility is (or is about to be) alive.
    Running = 1,
    /// The utility finished successfully, or was cancelled.
    Exited = 2,
    /// The utility failed, could not be launched, or timed out.
    ExitedWithError = 3,
}

impl WorkerState {
    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Exited,
            3 => Self::ExitedWithError,
            _ => Self::NoSpawn,
        }
    }
}

/// Process-wide state of an [`ApiContext`](crate::ApiContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiState {
    /// Not initialized.
    NotReady,
    /// `initialize` is in progress.
    Initializing,
    /// Initialized and idle.
    Ready,
    /// A backup is in flight.
    BackupService,
    /// A restore is in flight.
    RestoreService,
    /// `finalize` is in progress.
    Finalizing,
}

impl fmt::Display for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotReady => "not ready",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::BackupService => "serving a backup",
            Self::RestoreService => "serving a restore",
            Self::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Public entry points, as seen by the call sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCall {
    /// `initialize`
    Initialize,
    /// `finalize`
    Finalize,
    /// `backup_begin`
    BackupBegin,
    /// `backup_read`
    BackupRead,
    /// `backup_end`
    BackupEnd,
    /// `restore_begin`
    RestoreBegin,
    /// `restore_write`
    RestoreWrite,
    /// `restore_end`
    RestoreEnd,
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize => "initialize",
            Self::Finalize => "finalize",
            Self::BackupBegin => "backup begin",
            Self::BackupRead => "backup read",
            Self::BackupEnd => "backup end",
            Self::RestoreBegin => "restore begin",
            Self::RestoreWrite => "restore write",
            Self::RestoreEnd => "restore end",
        };
        f.write_str(name)
    }
}

/// Per-call override of a boolean backup option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionOverride {
    /// Use the value from the option file.
    #[default]
    Default,
    /// Force the option off.
    Off,
    /// Force the option on.
    On,
}

impl OptionOverride {
    /// Applies the override on top of a stored default.
    #[must_use]
    pub const fn resolve(self, default: bool) -> bool {
        match self {
            Self::Default => default,
            Self::Off => false,
            Self::On => true,
        }
    }
}

impl TryFrom<i32> for OptionOverride {
    type Error = CoreError;

    /// Accepts `-1` (default), `0` (off) and `1` (on).
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Default),
            0 => Ok(Self::Off),
            1 => Ok(Self::On),
            other => Err(CoreError::invalid_argument(format!(
                "option override must be -1, 0 or 1, got {other}"
            ))),
        }
    }
}

impl From<bool> for OptionOverride {
    fn from(value: bool) -> Self {
        if value {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// Per-call overrides for a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackupOptions {
    /// Remove archive logs no longer needed after the backup.
    pub remove_archive: OptionOverride,
    /// Run the utility in standalone mode.
    pub sa_mode: OptionOverride,
    /// Skip the consistency check.
    pub no_check: OptionOverride,
    /// Compress the backup stream.
    pub compress: OptionOverride,
}

impl BackupOptions {
    /// Creates options that defer to the option file for everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the remove-archive override.
    #[must_use]
    pub const fn remove_archive(mut self, value: OptionOverride) -> Self {
        self.remove_archive = value;
        self
    }

    /// Sets the standalone-mode override.
    #[must_use]
    pub const fn sa_mode(mut self, value: OptionOverride) -> Self {
        self.sa_mode = value;
        self
    }

    /// Sets the skip-check override.
    #[must_use]
    pub const fn no_check(mut self, value: OptionOverride) -> Self {
        self.no_check = value;
        self
    }

    /// Sets the compression override.
    #[must_use]
    pub const fn compress(mut self, value: OptionOverride) -> Self {
        self.compress = value;
        self
    }
}

/// Result of a single `backup_read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes copied into the caller's buffer.
    pub bytes_read: usize,
    /// The utility has exited and the pipe is drained.
    pub end_of_stream: bool,
}

impl ReadOutcome {
    pub(crate) const fn data(bytes_read: usize) -> Self {
        Self {
            bytes_read,
            end_of_stream: false,
        }
    }

    pub(crate) const fn end() -> Self {
        Self {
            bytes_read: 0,
            end_of_stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_from_raw() {
        assert_eq!(BackupLevel::try_from(0).unwrap(), BackupLevel::Full);
        assert_eq!(BackupLevel::try_from(2).unwrap(), BackupLevel::SmallIncrement);
        assert!(BackupLevel::try_from(3).is_err());
        assert!(BackupLevel::try_from(1004).is_err());
        assert!(BackupLevel::try_from(-1).is_err());
    }

    #[test]
    fn override_from_raw() {
        assert_eq!(OptionOverride::try_from(-1).unwrap(), OptionOverride::Default);
        assert_eq!(OptionOverride::try_from(0).unwrap(), OptionOverride::Off);
        assert_eq!(OptionOverride::try_from(1).unwrap(), OptionOverride::On);
        for bad in [7, -20, 77, 2, -2] {
            assert!(OptionOverride::try_from(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn override_resolution() {
        assert!(OptionOverride::Default.resolve(true));
        assert!(!OptionOverride::Default.resolve(false));
        assert!(!OptionOverride::Off.resolve(true));
        assert!(OptionOverride::On.resolve(false));
    }

    #[test]
    fn worker_state_round_trips_through_u8() {
        for state in [
            WorkerState::NoSpawn,
            WorkerState::Running,
            WorkerState::Exited,
            WorkerState::ExitedWithError,
        ] {
            assert_eq!(WorkerState::from_u8(state.as_u8()), state);
        }
    }
}
