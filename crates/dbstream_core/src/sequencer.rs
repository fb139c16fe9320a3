//! API call sequencing.
//!
//! Every public entry point goes through [`CallSequencer::enter`] before it
//! touches anything else. The legal transitions are:
//!
//! | Call                      | Required state                  | Entered state  |
//! |---------------------------|---------------------------------|----------------|
//! | initialize                | not ready                       | initializing   |
//! | finalize                  | anything but not ready/initializing | finalizing |
//! | backup begin              | ready                           | backup service |
//! | backup read / end         | backup service                  | unchanged      |
//! | restore begin             | ready                           | restore service|
//! | restore write / end       | restore service                 | unchanged      |

use crate::error::{CoreError, CoreResult};
use crate::types::{ApiCall, ApiState};
use parking_lot::Mutex;
use tracing::debug;

/// Holds the API state and validates transitions atomically.
#[derive(Debug)]
pub struct CallSequencer {
    state: Mutex<ApiState>,
}

impl Default for CallSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl CallSequencer {
    /// Creates a sequencer in the `NotReady` state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ApiState::NotReady),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ApiState {
        *self.state.lock()
    }

    /// Checks that `call` is legal and applies its entry transition.
    ///
    /// On failure the state is left unchanged.
    pub fn enter(&self, call: ApiCall) -> CoreResult<()> {
        let mut state = self.state.lock();
        let current = *state;
        let next = match (call, current) {
            (ApiCall::Initialize, ApiState::NotReady) => ApiState::Initializing,
            (ApiCall::Finalize, ApiState::NotReady | ApiState::Initializing) => {
                return Err(CoreError::sequence(call, current))
            }
            (ApiCall::Finalize, _) => ApiState::Finalizing,
            (ApiCall::BackupBegin, ApiState::Ready) => ApiState::BackupService,
            (ApiCall::BackupRead | ApiCall::BackupEnd, ApiState::BackupService) => current,
            (ApiCall::RestoreBegin, ApiState::Ready) => ApiState::RestoreService,
            (ApiCall::RestoreWrite | ApiCall::RestoreEnd, ApiState::RestoreService) => current,
            _ => return Err(CoreError::sequence(call, current)),
        };
        if next != current {
            debug!(%call, from = %current, to = %next, "api state transition");
        }
        *state = next;
        Ok(())
    }

    /// Applies the exit transition of a call that succeeded.
    ///
    /// The transition only happens if the state is still the one the call
    /// entered; a `finalize` that completed meanwhile wins.
    pub fn complete(&self, call: ApiCall) {
        let (expected, next) = match call {
            ApiCall::Initialize => (ApiState::Initializing, ApiState::Ready),
            ApiCall::BackupEnd => (ApiState::BackupService, ApiState::Ready),
            ApiCall::RestoreEnd => (ApiState::RestoreService, ApiState::Ready),
            ApiCall::Finalize => (ApiState::Finalizing, ApiState::NotReady),
            _ => return,
        };
        self.transition(call, expected, next);
    }

    /// Undoes the entry transition of a call that failed.
    pub fn rollback(&self, call: ApiCall) {
        let (expected, next) = match call {
            ApiCall::Initialize => (ApiState::Initializing, ApiState::NotReady),
            ApiCall::Finalize => (ApiState::Finalizing, ApiState::NotReady),
            ApiCall::BackupBegin => (ApiState::BackupService, ApiState::Ready),
            ApiCall::RestoreBegin => (ApiState::RestoreService, ApiState::Ready),
            _ => return,
        };
        self.transition(call, expected, next);
    }

    fn transition(&self, call: ApiCall, expected: ApiState, next: ApiState) {
        let mut state = self.state.lock();
        let from = *state;
        if from != expected {
            debug!(%call, %from, %expected, "api state moved on, transition skipped");
            return;
        }
        debug!(%call, %from, to = %next, "api state transition");
        *state = next;
    }
}

/// Rolls a call's entry transition back when dropped, unless disarmed.
pub(crate) struct SequenceGuard<'a> {
    sequencer: &'a CallSequencer,
    call: ApiCall,
    armed: bool,
}

impl<'a> SequenceGuard<'a> {
    pub(crate) fn new(sequencer: &'a CallSequencer, call: ApiCall) -> Self {
        Self {
            sequencer,
            call,
            armed: true,
        }
    }

    /// Keeps the entered state.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sequencer.rollback(self.call);
        }
    }
}
