//! The public API surface.

use crate::backup::BackupEngine;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::registry::{BackupHandle, HandleRegistry, RestoreHandle};
use crate::restore::RestoreSink;
use crate::sequencer::{CallSequencer, SequenceGuard};
use crate::types::{ApiCall, ApiState, BackupLevel, BackupOptions, ReadOutcome, RestoreKind};
use crate::workspace::Workspace;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the call sequencer, the handle registry and the runtime set up by
/// [`initialize`](Self::initialize).
///
/// One context allows at most one backup and one restore at a time. Every
/// call is checked against the current [`ApiState`] before anything else
/// happens.
///
/// # Example
///
/// ```rust,ignore
/// use dbstream_core::{ApiContext, BackupLevel, BackupOptions, Config};
///
/// let ctx = ApiContext::new(Config::from_env());
/// ctx.initialize()?;
/// let handle = ctx.backup_begin(BackupLevel::Full, "demodb", BackupOptions::new())?;
/// let mut buf = vec![0u8; 4096];
/// loop {
///     let outcome = ctx.backup_read(&handle, &mut buf)?;
///     if outcome.end_of_stream {
///         break;
///     }
///     sink.write_all(&buf[..outcome.bytes_read])?;
/// }
/// ctx.backup_end(&handle)?;
/// ctx.finalize()?;
/// ```
#[derive(Debug)]
pub struct ApiContext {
    config: Config,
    sequencer: CallSequencer,
    registry: Arc<HandleRegistry>,
    workspace: RwLock<Option<Arc<Workspace>>>,
}

impl ApiContext {
    /// Creates an uninitialized context.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sequencer: CallSequencer::new(),
            registry: Arc::new(HandleRegistry::new()),
            workspace: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the current API state.
    pub fn state(&self) -> ApiState {
        self.sequencer.state()
    }

    /// Returns the work directory while initialized.
    pub fn work_dir(&self) -> Option<PathBuf> {
        self.workspace
            .read()
            .as_ref()
            .map(|ws| ws.work_dir().to_path_buf())
    }

    fn workspace(&self, call: ApiCall) -> CoreResult<Arc<Workspace>> {
        self.workspace
            .read()
            .clone()
            .ok_or_else(|| CoreError::sequence(call, self.state()))
    }

    /// Prepares the work directory and loads option defaults.
    ///
    /// Fails with a sequence error when already initialized.
    pub fn initialize(&self) -> CoreResult<()> {
        self.sequencer.enter(ApiCall::Initialize)?;
        let rollback = SequenceGuard::new(&self.sequencer, ApiCall::Initialize);

        let workspace = Workspace::prepare(&self.config)?;
        *self.workspace.write() = Some(Arc::new(workspace));

        rollback.disarm();
        self.sequencer.complete(ApiCall::Initialize);
        info!("dbstream initialized");
        Ok(())
    }

    /// Releases any live handle, removes the work directory and returns the
    /// context to `NotReady`.
    ///
    /// The state is reset even if a teardown step fails; that failure is
    /// still returned.
    pub fn finalize(&self) -> CoreResult<()> {
        self.sequencer.enter(ApiCall::Finalize)?;

        let released = self.registry.release_all();
        let cleaned = match self.workspace.write().take() {
            Some(workspace) => workspace.cleanup(),
            None => Ok(()),
        };

        self.sequencer.complete(ApiCall::Finalize);
        info!("dbstream finalized");
        released.and(cleaned)
    }

    fn backup_engine<'a>(&'a self, workspace: &'a Workspace) -> BackupEngine<'a> {
        BackupEngine {
            registry: &self.registry,
            workspace,
            config: &self.config,
        }
    }

    /// Starts streaming a backup of `db_name`.
    pub fn backup_begin(
        &self,
        level: BackupLevel,
        db_name: &str,
        options: BackupOptions,
    ) -> CoreResult<BackupHandle> {
        self.sequencer.enter(ApiCall::BackupBegin)?;
        let rollback = SequenceGuard::new(&self.sequencer, ApiCall::BackupBegin);

        let workspace = self.workspace(ApiCall::BackupBegin)?;
        let handle = self
            .backup_engine(&workspace)
            .begin(level, db_name, &options)?;

        rollback.disarm();
        Ok(handle)
    }

    /// Reads the next part of the backup stream into `buf`.
    ///
    /// `(0, false)` means no data arrived within the read timeout;
    /// `end_of_stream` is only reported after the utility exited cleanly and
    /// everything it wrote has been read.
    pub fn backup_read(&self, handle: &BackupHandle, buf: &mut [u8]) -> CoreResult<ReadOutcome> {
        self.sequencer.enter(ApiCall::BackupRead)?;
        let workspace = self.workspace(ApiCall::BackupRead)?;
        self.backup_engine(&workspace).read(handle, buf)
    }

    /// Stops the backup (cancelling the utility if still running) and
    /// cleans up its pipe.
    pub fn backup_end(&self, handle: &BackupHandle) -> CoreResult<()> {
        self.sequencer.enter(ApiCall::BackupEnd)?;
        let workspace = self.workspace(ApiCall::BackupEnd)?;
        self.backup_engine(&workspace).end(handle)?;
        self.sequencer.complete(ApiCall::BackupEnd);
        Ok(())
    }

    fn restore_sink(&self) -> RestoreSink<'_> {
        RestoreSink {
            registry: &self.registry,
        }
    }

    /// Opens `<target_dir>/<db_name>_bk<level>v000` for a restore stream.
    pub fn restore_begin(
        &self,
        level: BackupLevel,
        db_name: &str,
        kind: RestoreKind,
        target_dir: impl AsRef<Path>,
    ) -> CoreResult<RestoreHandle> {
        self.sequencer.enter(ApiCall::RestoreBegin)?;
        let rollback = SequenceGuard::new(&self.sequencer, ApiCall::RestoreBegin);

        let handle = self
            .restore_sink()
            .begin(level, db_name, kind, target_dir.as_ref())?;

        rollback.disarm();
        Ok(handle)
    }

    /// Appends `buf` to the restore file. `level` must match the level the
    /// restore was started with.
    pub fn restore_write(
        &self,
        handle: &RestoreHandle,
        level: BackupLevel,
        buf: &[u8],
    ) -> CoreResult<()> {
        self.sequencer.enter(ApiCall::RestoreWrite)?;
        self.restore_sink().write(handle, level, buf)
    }

    /// Flushes and closes the restore file.
    pub fn restore_end(&self, handle: &RestoreHandle) -> CoreResult<()> {
        self.sequencer.enter(ApiCall::RestoreEnd)?;
        self.restore_sink().end(handle)?;
        self.sequencer.complete(ApiCall::RestoreEnd);
        Ok(())
    }
}

impl Drop for ApiContext {
    fn drop(&mut self) {
        if matches!(self.state(), ApiState::NotReady | ApiState::Initializing) {
            return;
        }
        if let Err(e) = self.finalize() {
            warn!(error = %e, "finalize on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn context() -> (TempDir, ApiContext) {
        let base = tempdir().unwrap();
        let ctx = ApiContext::new(Config::new().utility("/bin/false").work_dir(base.path()));
        (base, ctx)
    }

    #[test]
    fn calls_before_initialize_fail() {
        let (base, ctx) = context();
        assert!(matches!(
            ctx.backup_begin(BackupLevel::Full, "demodb", BackupOptions::new()),
            Err(CoreError::Sequence { .. })
        ));
        let mut buf = [0u8; 8];
        assert!(matches!(
            ctx.backup_read(&BackupHandle::null(), &mut buf),
            Err(CoreError::Sequence { .. })
        ));
        assert!(ctx.backup_end(&BackupHandle::null()).is_err());
        assert!(ctx
            .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, base.path())
            .is_err());
        assert!(matches!(ctx.finalize(), Err(CoreError::Sequence { .. })));
        assert_eq!(ctx.state(), ApiState::NotReady);
    }

    #[test]
    fn initialize_twice_fails() {
        let (_base, ctx) = context();
        ctx.initialize().unwrap();
        assert!(matches!(ctx.initialize(), Err(CoreError::Sequence { .. })));
        assert_eq!(ctx.state(), ApiState::Ready);
        ctx.finalize().unwrap();
        assert!(matches!(ctx.finalize(), Err(CoreError::Sequence { .. })));
        assert_eq!(ctx.state(), ApiState::NotReady);
    }

    #[test]
    fn failed_initialize_rolls_back() {
        let ctx = ApiContext::new(Config::new().work_dir("/nonexistent/dbstream"));
        assert!(ctx.initialize().is_err());
        assert_eq!(ctx.state(), ApiState::NotReady);
    }

    #[test]
    fn finalize_removes_work_dir() {
        let (_base, ctx) = context();
        ctx.initialize().unwrap();
        let work_dir = ctx.work_dir().unwrap();
        assert!(work_dir.is_dir());
        ctx.finalize().unwrap();
        assert!(!work_dir.exists());
        assert!(ctx.work_dir().is_none());
    }

    #[test]
    fn failed_begin_returns_to_ready() {
        let (base, ctx) = context();
        ctx.initialize().unwrap();
        assert!(ctx
            .backup_begin(BackupLevel::Full, "", BackupOptions::new())
            .is_err());
        assert_eq!(ctx.state(), ApiState::Ready);
        assert!(ctx
            .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToDatabase, base.path())
            .is_err());
        assert_eq!(ctx.state(), ApiState::Ready);
    }

    #[test]
    fn restore_through_context() {
        let (base, ctx) = context();
        let target = tempdir().unwrap();
        ctx.initialize().unwrap();

        let handle = ctx
            .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, target.path())
            .unwrap();
        assert_eq!(ctx.state(), ApiState::RestoreService);
        assert!(ctx
            .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, target.path())
            .is_err());
        ctx.restore_write(&handle, BackupLevel::Full, b"payload").unwrap();
        ctx.restore_end(&handle).unwrap();
        assert_eq!(ctx.state(), ApiState::Ready);
        assert!(ctx.restore_end(&handle).is_err());

        assert_eq!(
            std::fs::read(target.path().join("demodb_bk0v000")).unwrap(),
            b"payload"
        );
        drop(ctx);
        assert!(!base.path().join(crate::WORK_DIR_NAME).exists());
    }

    #[test]
    fn finalize_during_restore_closes_handle() {
        let (_base, ctx) = context();
        let target = tempdir().unwrap();
        ctx.initialize().unwrap();
        let handle = ctx
            .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, target.path())
            .unwrap();
        ctx.finalize().unwrap();
        assert_eq!(ctx.state(), ApiState::NotReady);

        ctx.initialize().unwrap();
        assert!(matches!(
            ctx.restore_write(&handle, BackupLevel::Full, b"x"),
            Err(CoreError::Sequence { .. })
        ));
        let fresh = ctx
            .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, target.path())
            .unwrap();
        assert_ne!(fresh, handle);
        assert!(matches!(
            ctx.restore_write(&handle, BackupLevel::Full, b"x"),
            Err(CoreError::InvalidHandle { .. })
        ));
    }
}
