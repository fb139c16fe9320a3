//! Error types for dbstream core.

use crate::types::{ApiCall, ApiState, HandleKind};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in dbstream core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The call is not legal in the current API state.
    #[error("{call} is not allowed while the API is {state}")]
    Sequence {
        /// The call that was attempted.
        call: ApiCall,
        /// The API state at the time of the call.
        state: ApiState,
    },

    /// An argument failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },

    /// The handle slot is already claimed by another operation.
    #[error("{kind} handle is busy")]
    HandleBusy {
        /// Which slot was busy.
        kind: HandleKind,
    },

    /// The handle is null, stale or belongs to another context.
    #[error("invalid {kind} handle")]
    InvalidHandle {
        /// Which slot the handle was meant for.
        kind: HandleKind,
    },

    /// A filesystem resource (directory, pipe, path) is unusable.
    #[error("resource error: {message}")]
    Resource {
        /// Description of the failure.
        message: String,
    },

    /// The backup utility could not be launched or did not exit cleanly.
    #[error("child process error: {message}")]
    ChildProcess {
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The option file could not be parsed.
    #[error("invalid option file at line {line}: {message}")]
    InvalidOptions {
        /// 1-based line number of the offending line.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// The requested feature is recognised but not supported.
    #[error("unsupported: {feature}")]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl CoreError {
    /// Creates a sequence error.
    pub fn sequence(call: ApiCall, state: ApiState) -> Self {
        Self::Sequence { call, state }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a resource error.
    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource {
            message: message.into(),
        }
    }

    /// Creates a child process error.
    pub fn child_process(message: impl Into<String>) -> Self {
        Self::ChildProcess {
            message: message.into(),
        }
    }

    /// Creates an option file error.
    pub fn invalid_options(line: usize, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            line,
            message: message.into(),
        }
    }

    /// Creates an unsupported feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }
}

impl From<nix::errno::Errno> for CoreError {
    fn from(errno: nix::errno::Errno) -> Self {
        Self::Io(io::Error::from(errno))
    }
}
