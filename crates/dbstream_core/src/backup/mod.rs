//! Backup streaming engine.
//!
//! A backup runs as follows:
//!
//! 1. `begin` claims the backup slot, creates a FIFO in the work directory
//!    and starts a worker thread.
//! 2. The worker launches the backup utility with `-D <fifo>` in its own
//!    process group and supervises it until it exits or is cancelled.
//! 3. The caller drains the FIFO with `read` until end-of-stream, which is
//!    only reported once the worker has seen the utility exit cleanly and
//!    the FIFO is empty.
//! 4. `end` cancels and joins the worker if needed, unlinks the FIFO and
//!    vacates the slot.

mod command;
mod pipe;
mod worker;

pub use command::UtilityCommand;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::path::{backup_file_path, validate_db_name};
use crate::registry::{BackupHandle, BackupReleaseGuard, HandleRegistry, WorkerShared};
use crate::types::{BackupLevel, BackupOptions, ReadOutcome, WorkerState};
use crate::workspace::Workspace;
use pipe::NamedPipe;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use worker::WorkerParams;

/// Mutable state of the backup slot, guarded by the slot mutex.
#[derive(Debug)]
pub(crate) struct BackupSession {
    level: BackupLevel,
    db_name: String,
    io_size: usize,
    pipe: Option<NamedPipe>,
    worker: Option<JoinHandle<()>>,
    end_of_stream: bool,
}

impl Default for BackupSession {
    fn default() -> Self {
        Self {
            level: BackupLevel::Full,
            db_name: String::new(),
            io_size: 0,
            pipe: None,
            worker: None,
            end_of_stream: false,
        }
    }
}

impl BackupSession {
    /// Cancels and joins the worker, then closes and unlinks the pipe.
    pub(crate) fn teardown(&mut self, worker: &WorkerShared) -> CoreResult<()> {
        let mut result = Ok(());
        if !self.db_name.is_empty() {
            debug!(db = %self.db_name, level = %self.level, "tearing down backup");
        }

        if let Some(join) = self.worker.take() {
            if worker.state() == WorkerState::Running {
                debug!(db = %self.db_name, "cancelling backup worker");
            }
            worker.cancel();
            if join.join().is_err() {
                result = Err(CoreError::child_process("backup worker panicked"));
            }
        }

        if let Some(pipe) = self.pipe.take() {
            if let Err(e) = pipe.close() {
                if result.is_ok() {
                    result = Err(e);
                } else {
                    warn!(error = %e, "pipe cleanup failed after worker failure");
                }
            }
        }

        result
    }
}

/// Borrowed view of everything a backup needs from its context.
pub(crate) struct BackupEngine<'a> {
    pub(crate) registry: &'a Arc<HandleRegistry>,
    pub(crate) workspace: &'a Workspace,
    pub(crate) config: &'a Config,
}

impl BackupEngine<'_> {
    pub(crate) fn begin(
        &self,
        level: BackupLevel,
        db_name: &str,
        options: &BackupOptions,
    ) -> CoreResult<BackupHandle> {
        validate_db_name(db_name)?;

        let handle = self.registry.acquire_backup()?;
        let rollback = BackupReleaseGuard::new(self.registry, handle);

        let resolved = self.workspace.defaults().resolve(options);
        let path = backup_file_path(self.workspace.work_dir(), db_name, level)?;
        let pipe = NamedPipe::create(&path)?;
        let command = UtilityCommand::new(
            self.workspace.utility(),
            &self.config.utility_args,
            pipe.path(),
            level,
            &resolved,
            db_name,
        );
        debug!(?command, "backup utility command");

        {
            let mut session = self.registry.lock_backup(&handle)?;
            session.level = level;
            session.db_name = db_name.to_string();
            session.io_size = self.workspace.io_size();
            session.pipe = Some(pipe);

            self.registry
                .set_worker_state(&handle, WorkerState::Running)?;
            let params = WorkerParams {
                registry: Arc::clone(self.registry),
                handle,
                command,
                db_name: db_name.to_string(),
                poll_interval: self.config.poll_interval,
                child_timeout: self.config.child_timeout,
                kill_grace: self.config.kill_grace,
                inherit_stderr: self.config.inherit_stderr,
            };
            match worker::spawn(params) {
                Ok(join) => session.worker = Some(join),
                Err(e) => {
                    self.registry
                        .set_worker_state(&handle, WorkerState::ExitedWithError)?;
                    return Err(CoreError::child_process(format!(
                        "cannot start backup worker: {e}"
                    )));
                }
            }
        }

        info!(db = %db_name, %level, "backup started");
        Ok(rollback.disarm())
    }

    pub(crate) fn read(&self, handle: &BackupHandle, buf: &mut [u8]) -> CoreResult<ReadOutcome> {
        let mut guard = self.registry.lock_backup(handle)?;
        if buf.is_empty() {
            return Err(CoreError::invalid_argument("read buffer is empty"));
        }

        let session = &mut *guard;
        if session.end_of_stream {
            return Ok(ReadOutcome::end());
        }

        let worker = self.registry.worker();
        let io_size = session.io_size.max(1);
        let timeout = self.config.read_timeout;
        let pipe = session
            .pipe
            .as_mut()
            .ok_or_else(|| CoreError::resource("backup pipe is closed"))?;

        let mut total = 0;
        while total < buf.len() {
            let before = worker.state();
            if before == WorkerState::ExitedWithError {
                return Err(CoreError::child_process(format!(
                    "backup utility for {} failed",
                    session.db_name
                )));
            }

            let end = buf.len().min(total + io_size);
            let n = pipe.read_block(&mut buf[total..end], timeout)?;
            if n == 0 {
                if total == 0 && before == WorkerState::Exited {
                    debug!(db = %session.db_name, "backup stream drained");
                    session.end_of_stream = true;
                    return Ok(ReadOutcome::end());
                }
                break;
            }
            total += n;
        }

        Ok(ReadOutcome::data(total))
    }

    pub(crate) fn end(&self, handle: &BackupHandle) -> CoreResult<()> {
        self.registry.release_backup(handle)?;
        info!("backup ended");
        Ok(())
    }
}
