//! Worker thread that launches and supervises the backup utility.
//!
//! The worker never touches the backup session mutex. It reports through
//! the registry's atomic worker state and observes the cancellation flag
//! between short wait ticks.

use crate::backup::command::UtilityCommand;
use crate::registry::{BackupHandle, HandleRegistry};
use crate::types::WorkerState;
use nix::errno::Errno;
use nix::sys::signal::{killpg, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use parking_lot::{const_mutex, Mutex};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const TICK: Duration = Duration::from_millis(20);

/// Serialises the SIGTERM disposition swap across workers.
static SIGNAL_LOCK: Mutex<()> = const_mutex(());

pub(crate) struct WorkerParams {
    pub(crate) registry: Arc<HandleRegistry>,
    pub(crate) handle: BackupHandle,
    pub(crate) command: UtilityCommand,
    pub(crate) db_name: String,
    pub(crate) poll_interval: Duration,
    pub(crate) child_timeout: Option<Duration>,
    pub(crate) kill_grace: Duration,
    pub(crate) inherit_stderr: bool,
}

/// Starts the worker thread.
pub(crate) fn spawn(params: WorkerParams) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("dbstream-backup-{}", params.db_name))
        .spawn(move || run(params))
}

fn run(params: WorkerParams) {
    let state = supervise(&params);
    debug!(db = %params.db_name, ?state, "backup worker finished");
    if let Err(e) = params.registry.set_worker_state(&params.handle, state) {
        warn!(error = %e, "backup worker outlived its handle");
    }
}

fn supervise(params: &WorkerParams) -> WorkerState {
    let mut child = match params.command.to_command(params.inherit_stderr).spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(
                program = %params.command.program().display(),
                error = %e,
                "cannot launch backup utility"
            );
            return WorkerState::ExitedWithError;
        }
    };

    let pid = match i32::try_from(child.id()) {
        Ok(raw) => Pid::from_raw(raw),
        Err(_) => {
            error!(id = child.id(), "backup utility pid out of range");
            let _ = child.kill();
            let _ = child.wait();
            return WorkerState::ExitedWithError;
        }
    };
    info!(db = %params.db_name, %pid, "backup utility started");

    let started = Instant::now();
    loop {
        match wait_slice(params, pid) {
            Ok(Some(status)) => return classify(status, pid, params.kill_grace),
            Ok(None) => {}
            Err(e) => {
                error!(%pid, error = %e, "cannot wait for backup utility");
                terminate_group(pid, params.kill_grace);
                return WorkerState::ExitedWithError;
            }
        }

        if params.registry.is_cancelled(&params.handle) {
            info!(%pid, "backup cancelled, stopping utility");
            terminate_group(pid, params.kill_grace);
            return WorkerState::Exited;
        }

        if let Some(limit) = params.child_timeout {
            if started.elapsed() >= limit {
                warn!(%pid, ?limit, "backup utility timed out");
                terminate_group(pid, params.kill_grace);
                return WorkerState::ExitedWithError;
            }
        }
    }
}

/// Waits up to one poll interval for the utility to change state.
///
/// Returns early with `Ok(None)` once cancellation is requested.
fn wait_slice(params: &WorkerParams, pid: Pid) -> nix::Result<Option<WaitStatus>> {
    let deadline = Instant::now() + params.poll_interval;
    loop {
        match waitpid(pid, Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => {}
            Ok(
                status @ (WaitStatus::Exited(..)
                | WaitStatus::Signaled(..)
                | WaitStatus::Stopped(..)),
            ) => return Ok(Some(status)),
            Ok(_) => {}
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        if now >= deadline || params.registry.is_cancelled(&params.handle) {
            return Ok(None);
        }
        thread::sleep(TICK.min(deadline - now));
    }
}

fn classify(status: WaitStatus, pid: Pid, grace: Duration) -> WorkerState {
    match status {
        WaitStatus::Exited(_, 0) => {
            info!(%pid, "backup utility exited");
            WorkerState::Exited
        }
        WaitStatus::Exited(_, code) => {
            error!(%pid, code, "backup utility failed");
            WorkerState::ExitedWithError
        }
        WaitStatus::Signaled(_, signal, _) => {
            error!(%pid, %signal, "backup utility killed by signal");
            WorkerState::ExitedWithError
        }
        WaitStatus::Stopped(_, signal) => {
            error!(%pid, %signal, "backup utility stopped, terminating it");
            terminate_group(pid, grace);
            WorkerState::ExitedWithError
        }
        other => {
            error!(%pid, ?other, "unexpected backup utility status");
            WorkerState::ExitedWithError
        }
    }
}

/// Ignores SIGTERM in this process until dropped.
struct SigtermIgnored {
    previous: SigAction,
}

impl SigtermIgnored {
    #[allow(unsafe_code)]
    fn install() -> nix::Result<Self> {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: SIG_IGN runs no handler code.
        let previous = unsafe { sigaction(Signal::SIGTERM, &ignore) }?;
        Ok(Self { previous })
    }
}

impl Drop for SigtermIgnored {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        // SAFETY: reinstalls the disposition that was active before install().
        if let Err(e) = unsafe { sigaction(Signal::SIGTERM, &self.previous) } {
            warn!(error = %e, "cannot restore SIGTERM disposition");
        }
    }
}

/// Sends SIGTERM to the process group led by `pgid` without exposing this
/// process to it.
fn signal_group_term(pgid: Pid) -> nix::Result<()> {
    let _serial = SIGNAL_LOCK.lock();
    let _ignored = SigtermIgnored::install()?;
    killpg(pgid, Signal::SIGTERM)
}

/// Terminates the utility's process group and reaps the leader.
///
/// SIGTERM first (with SIGCONT so stopped members see it). Once `grace` has
/// passed with the leader unreaped or any member still in the group, the
/// whole group gets SIGKILL.
pub(crate) fn terminate_group(pgid: Pid, grace: Duration) {
    match signal_group_term(pgid) {
        Ok(()) => {}
        Err(Errno::ESRCH) => debug!(%pgid, "process group already gone"),
        Err(e) => warn!(%pgid, error = %e, "cannot send SIGTERM to process group"),
    }
    let _ = killpg(pgid, Signal::SIGCONT);

    let deadline = Instant::now() + grace;
    let mut leader_reaped = false;
    loop {
        if !leader_reaped {
            leader_reaped = try_reap(pgid);
        }
        if leader_reaped && group_gone(pgid) {
            debug!(%pgid, "process group terminated");
            return;
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(TICK);
    }

    warn!(%pgid, ?grace, leader_reaped, "process group outlived SIGTERM, killing");
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(%pgid, error = %e, "cannot send SIGKILL to process group"),
    }
    if !leader_reaped {
        loop {
            match waitpid(pgid, None) {
                Err(Errno::EINTR) => continue,
                Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }
}

/// Reaps the group leader without blocking. True once it is gone.
fn try_reap(pid: Pid) -> bool {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(Errno::ECHILD) => {
            debug!(%pid, "process group leader reaped");
            true
        }
        Ok(_) | Err(Errno::EINTR) => false,
        Err(e) => {
            warn!(%pid, error = %e, "cannot reap backup utility");
            true
        }
    }
}

/// True when no process is left in the group.
fn group_gone(pgid: Pid) -> bool {
    matches!(killpg(pgid, None), Err(Errno::ESRCH))
}
