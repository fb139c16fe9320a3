//! Singleton handle slots.
//!
//! A registry owns exactly one backup slot and one restore slot. Claiming a
//! slot is a non-blocking compare-and-swap on its live generation, so a
//! second `begin` of the same kind fails with
//! [`CoreError::HandleBusy`] instead of waiting.
//!
//! Callers only ever see copyable tokens ([`BackupHandle`],
//! [`RestoreHandle`]) naming the registry and the generation they were
//! issued for. A token stops validating the moment its operation ends, so a
//! stale or forged token is rejected before any mutex is touched.

use crate::backup::BackupSession;
use crate::error::{CoreError, CoreResult};
use crate::restore::RestoreSession;
use crate::types::{HandleKind, WorkerState};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use tracing::{debug, warn};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an in-flight backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackupHandle {
    registry: u64,
    generation: u64,
}

/// Handle to an in-flight restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RestoreHandle {
    registry: u64,
    generation: u64,
}

macro_rules! null_handle {
    ($ty:ty) => {
        impl $ty {
            /// A handle that never validates.
            #[must_use]
            pub const fn null() -> Self {
                Self {
                    registry: 0,
                    generation: 0,
                }
            }

            /// Returns true for the null handle.
            #[must_use]
            pub const fn is_null(&self) -> bool {
                self.generation == 0
            }
        }
    };
}

null_handle!(BackupHandle);
null_handle!(RestoreHandle);

/// Worker bookkeeping the supervising thread touches without the slot mutex.
#[derive(Debug, Default)]
pub(crate) struct WorkerShared {
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl WorkerShared {
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.set_state(WorkerState::NoSpawn);
        self.cancelled.store(false, Ordering::Release);
    }
}

struct Slot<S> {
    kind: HandleKind,
    live: AtomicU64,
    session: Mutex<S>,
}

impl<S: Default> Slot<S> {
    fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            live: AtomicU64::new(0),
            session: Mutex::new(S::default()),
        }
    }

    fn claim(&self, generation: u64) -> CoreResult<()> {
        self.live
            .compare_exchange(0, generation, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| CoreError::HandleBusy { kind: self.kind })
    }

    fn is_live(&self, generation: u64) -> bool {
        generation != 0 && self.live.load(Ordering::Acquire) == generation
    }

    fn vacate(&self) {
        self.live.store(0, Ordering::Release);
    }

    fn live_generation(&self) -> Option<u64> {
        match self.live.load(Ordering::Acquire) {
            0 => None,
            generation => Some(generation),
        }
    }
}

/// Owns the backup and restore slots of one context.
pub struct HandleRegistry {
    id: u64,
    next_generation: AtomicU64,
    backup: Slot<BackupSession>,
    worker: WorkerShared,
    restore: Slot<RestoreSession>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("id", &self.id)
            .field("backup_live", &self.backup.live_generation())
            .field("worker_state", &self.worker.state())
            .field("restore_live", &self.restore.live_generation())
            .finish()
    }
}

impl HandleRegistry {
    /// Creates a registry with both slots vacant.
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            next_generation: AtomicU64::new(1),
            backup: Slot::new(HandleKind::Backup),
            worker: WorkerShared::default(),
            restore: Slot::new(HandleKind::Restore),
        }
    }

    fn issue(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Claims the backup slot and resets it.
    pub fn acquire_backup(&self) -> CoreResult<BackupHandle> {
        let generation = self.issue();
        self.backup.claim(generation)?;
        *self.backup.session.lock() = BackupSession::default();
        self.worker.reset();
        debug!(generation, "backup handle acquired");
        Ok(BackupHandle {
            registry: self.id,
            generation,
        })
    }

    /// Claims the restore slot and resets it.
    pub fn acquire_restore(&self) -> CoreResult<RestoreHandle> {
        let generation = self.issue();
        self.restore.claim(generation)?;
        *self.restore.session.lock() = RestoreSession::default();
        debug!(generation, "restore handle acquired");
        Ok(RestoreHandle {
            registry: self.id,
            generation,
        })
    }

    /// Checks that `handle` names the live backup operation of this registry.
    pub fn validate_backup(&self, handle: &BackupHandle) -> CoreResult<()> {
        if handle.registry == self.id && self.backup.is_live(handle.generation) {
            Ok(())
        } else {
            Err(CoreError::InvalidHandle {
                kind: HandleKind::Backup,
            })
        }
    }

    /// Checks that `handle` names the live restore operation of this registry.
    pub fn validate_restore(&self, handle: &RestoreHandle) -> CoreResult<()> {
        if handle.registry == self.id && self.restore.is_live(handle.generation) {
            Ok(())
        } else {
            Err(CoreError::InvalidHandle {
                kind: HandleKind::Restore,
            })
        }
    }

    pub(crate) fn lock_backup(
        &self,
        handle: &BackupHandle,
    ) -> CoreResult<MutexGuard<'_, BackupSession>> {
        self.validate_backup(handle)?;
        let guard = self.backup.session.lock();
        // An end() may have run while we waited for the lock.
        self.validate_backup(handle)?;
        Ok(guard)
    }

    pub(crate) fn lock_restore(
        &self,
        handle: &RestoreHandle,
    ) -> CoreResult<MutexGuard<'_, RestoreSession>> {
        self.validate_restore(handle)?;
        let guard = self.restore.session.lock();
        self.validate_restore(handle)?;
        Ok(guard)
    }

    /// Sets the worker state of the backup identified by `handle`.
    pub fn set_worker_state(&self, handle: &BackupHandle, state: WorkerState) -> CoreResult<()> {
        self.validate_backup(handle)?;
        self.worker.set_state(state);
        Ok(())
    }

    /// Returns the worker state of the backup identified by `handle`.
    pub fn worker_state(&self, handle: &BackupHandle) -> CoreResult<WorkerState> {
        self.validate_backup(handle)?;
        Ok(self.worker.state())
    }

    pub(crate) fn worker(&self) -> &WorkerShared {
        &self.worker
    }

    /// Returns true once the backup identified by `handle` should stop.
    pub(crate) fn is_cancelled(&self, handle: &BackupHandle) -> bool {
        self.validate_backup(handle).is_err() || self.worker.is_cancelled()
    }

    /// Tears down the backup slot and vacates it.
    ///
    /// If teardown fails the slot stays claimed so the caller can retry.
    pub fn release_backup(&self, handle: &BackupHandle) -> CoreResult<()> {
        self.release_backup_inner(handle, false)
    }

    /// Tears down the restore slot and vacates it.
    ///
    /// If teardown fails the slot stays claimed so the caller can retry.
    pub fn release_restore(&self, handle: &RestoreHandle) -> CoreResult<()> {
        self.release_restore_inner(handle, false)
    }

    fn release_backup_inner(&self, handle: &BackupHandle, force: bool) -> CoreResult<()> {
        let mut session = self.lock_backup(handle)?;
        let result = session.teardown(&self.worker);
        if result.is_err() && !force {
            return result;
        }
        *session = BackupSession::default();
        self.worker.reset();
        self.backup.vacate();
        debug!(generation = handle.generation, "backup handle released");
        result
    }

    fn release_restore_inner(&self, handle: &RestoreHandle, force: bool) -> CoreResult<()> {
        let mut session = self.lock_restore(handle)?;
        let result = session.teardown();
        if result.is_err() && !force {
            return result;
        }
        *session = RestoreSession::default();
        self.restore.vacate();
        debug!(generation = handle.generation, "restore handle released");
        result
    }

    /// Releases whichever slots are claimed, vacating them even when teardown
    /// fails. Returns the first failure.
    pub fn release_all(&self) -> CoreResult<()> {
        let mut first = Ok(());

        if let Some(generation) = self.backup.live_generation() {
            let handle = BackupHandle {
                registry: self.id,
                generation,
            };
            match self.release_backup_inner(&handle, true) {
                Ok(()) | Err(CoreError::InvalidHandle { .. }) => {}
                Err(e) => {
                    warn!(error = %e, "failed to release backup handle");
                    first = Err(e);
                }
            }
        }

        if let Some(generation) = self.restore.live_generation() {
            let handle = RestoreHandle {
                registry: self.id,
                generation,
            };
            match self.release_restore_inner(&handle, true) {
                Ok(()) | Err(CoreError::InvalidHandle { .. }) => {}
                Err(e) => {
                    warn!(error = %e, "failed to release restore handle");
                    if first.is_ok() {
                        first = Err(e);
                    }
                }
            }
        }

        first
    }

    /// Returns true if either slot is claimed.
    pub fn any_live(&self) -> bool {
        self.backup.live_generation().is_some() || self.restore.live_generation().is_some()
    }
}

/// Releases a freshly acquired backup handle when dropped, unless disarmed.
pub(crate) struct BackupReleaseGuard<'a> {
    registry: &'a HandleRegistry,
    handle: BackupHandle,
    armed: bool,
}

impl<'a> BackupReleaseGuard<'a> {
    pub(crate) fn new(registry: &'a HandleRegistry, handle: BackupHandle) -> Self {
        Self {
            registry,
            handle,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) -> BackupHandle {
        self.armed = false;
        self.handle
    }
}

impl Drop for BackupReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.registry.release_backup_inner(&self.handle, true) {
                warn!(error = %e, "backup rollback failed");
            }
        }
    }
}

/// Releases a freshly acquired restore handle when dropped, unless disarmed.
pub(crate) struct RestoreReleaseGuard<'a> {
    registry: &'a HandleRegistry,
    handle: RestoreHandle,
    armed: bool,
}

impl<'a> RestoreReleaseGuard<'a> {
    pub(crate) fn new(registry: &'a HandleRegistry, handle: RestoreHandle) -> Self {
        Self {
            registry,
            handle,
            armed: true,
        }
    }

    pub(crate) fn disarm(mut self) -> RestoreHandle {
        self.armed = false;
        self.handle
    }
}

impl Drop for RestoreReleaseGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.registry.release_restore_inner(&self.handle, true) {
                warn!(error = %e, "restore rollback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy() {
        let registry = HandleRegistry::new();
        let first = registry.acquire_backup().unwrap();
        assert!(matches!(
            registry.acquire_backup(),
            Err(CoreError::HandleBusy {
                kind: HandleKind::Backup
            })
        ));
        registry.validate_backup(&first).unwrap();

        // The restore slot is independent.
        let restore = registry.acquire_restore().unwrap();
        registry.validate_restore(&restore).unwrap();
    }

    #[test]
    fn released_handles_go_stale() {
        let registry = HandleRegistry::new();
        let first = registry.acquire_backup().unwrap();
        registry.release_backup(&first).unwrap();
        assert!(registry.validate_backup(&first).is_err());
        assert!(registry.release_backup(&first).is_err());

        let second = registry.acquire_backup().unwrap();
        assert_ne!(first, second);
        assert!(registry.validate_backup(&first).is_err());
        registry.validate_backup(&second).unwrap();
    }

    #[test]
    fn null_and_foreign_handles_are_rejected() {
        let a = HandleRegistry::new();
        let b = HandleRegistry::new();
        assert!(a.validate_backup(&BackupHandle::null()).is_err());
        assert!(a.validate_restore(&RestoreHandle::null()).is_err());
        assert!(BackupHandle::null().is_null());

        let from_b = b.acquire_backup().unwrap();
        let _from_a = a.acquire_backup().unwrap();
        assert!(matches!(
            a.validate_backup(&from_b),
            Err(CoreError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn worker_state_follows_handle() {
        let registry = HandleRegistry::new();
        let handle = registry.acquire_backup().unwrap();
        assert_eq!(registry.worker_state(&handle).unwrap(), WorkerState::NoSpawn);
        registry
            .set_worker_state(&handle, WorkerState::Running)
            .unwrap();
        assert_eq!(registry.worker_state(&handle).unwrap(), WorkerState::Running);
        assert!(!registry.is_cancelled(&handle));

        registry.release_backup(&handle).unwrap();
        assert!(registry
            .set_worker_state(&handle, WorkerState::Exited)
            .is_err());
        assert!(registry.is_cancelled(&handle));
    }

    #[test]
    fn release_all_vacates_both() {
        let registry = HandleRegistry::new();
        let _b = registry.acquire_backup().unwrap();
        let _r = registry.acquire_restore().unwrap();
        assert!(registry.any_live());
        registry.release_all().unwrap();
        assert!(!registry.any_live());
        registry.acquire_backup().unwrap();
    }

    #[test]
    fn guard_releases_unless_disarmed() {
        let registry = HandleRegistry::new();
        let handle = registry.acquire_restore().unwrap();
        drop(RestoreReleaseGuard::new(&registry, handle));
        assert!(registry.validate_restore(&handle).is_err());

        let handle = registry.acquire_restore().unwrap();
        let kept = RestoreReleaseGuard::new(&registry, handle).disarm();
        registry.validate_restore(&kept).unwrap();
    }
}
