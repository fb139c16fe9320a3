//! Error codes and result types.

use dbstream_core::CoreError;
use std::cell::RefCell;
use std::ffi::CString;

/// Result code for FFI functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbsResult {
    /// Operation succeeded.
    Ok = 0,
    /// Generic error.
    Error = 1,
    /// Invalid argument.
    InvalidArgument = 2,
    /// Null pointer.
    NullPointer = 3,
    /// Call made in the wrong API state.
    SequenceError = 4,
    /// Another operation of the same kind is in flight.
    HandleBusy = 5,
    /// Handle is null, stale or unknown.
    InvalidHandle = 6,
    /// Directory, pipe or path problem.
    ResourceError = 7,
    /// Backup utility failed.
    ChildProcessError = 8,
    /// I/O error.
    IoError = 9,
    /// Feature not supported.
    NotSupported = 10,
    /// Option file could not be parsed.
    InvalidOptions = 11,
}

impl DbsResult {
    /// Returns true if the result indicates success.
    pub fn is_ok(self) -> bool {
        self == DbsResult::Ok
    }

    /// Returns true if the result indicates an error.
    pub fn is_err(self) -> bool {
        self != DbsResult::Ok
    }
}

impl From<&CoreError> for DbsResult {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::Sequence { .. } => DbsResult::SequenceError,
            CoreError::InvalidArgument { .. } => DbsResult::InvalidArgument,
            CoreError::HandleBusy { .. } => DbsResult::HandleBusy,
            CoreError::InvalidHandle { .. } => DbsResult::InvalidHandle,
            CoreError::Resource { .. } => DbsResult::ResourceError,
            CoreError::ChildProcess { .. } => DbsResult::ChildProcessError,
            CoreError::Io(_) => DbsResult::IoError,
            CoreError::InvalidOptions { .. } => DbsResult::InvalidOptions,
            CoreError::Unsupported { .. } => DbsResult::NotSupported,
        }
    }
}

/// Error code type for C compatibility.
pub type ErrorCode = i32;

impl From<DbsResult> for ErrorCode {
    fn from(result: DbsResult) -> Self {
        result as ErrorCode
    }
}

impl From<ErrorCode> for DbsResult {
    fn from(code: ErrorCode) -> Self {
        match code {
            0 => DbsResult::Ok,
            2 => DbsResult::InvalidArgument,
            3 => DbsResult::NullPointer,
            4 => DbsResult::SequenceError,
            5 => DbsResult::HandleBusy,
            6 => DbsResult::InvalidHandle,
            7 => DbsResult::ResourceError,
            8 => DbsResult::ChildProcessError,
            9 => DbsResult::IoError,
            10 => DbsResult::NotSupported,
            11 => DbsResult::InvalidOptions,
            _ => DbsResult::Error,
        }
    }
}

// Thread-local storage for last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Sets the last error message.
pub fn set_last_error(message: impl Into<String>) {
    let msg = message.into();
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clears the last error.
pub fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Records `err` as the last error and returns its code.
pub(crate) fn fail(err: &CoreError) -> DbsResult {
    tracing::debug!(error = %err, "ffi call failed");
    set_last_error(err.to_string());
    DbsResult::from(err)
}

/// Maps a core result to a code, recording the error message on failure.
pub(crate) fn status(result: Result<(), CoreError>) -> DbsResult {
    match result {
        Ok(()) => DbsResult::Ok,
        Err(e) => fail(&e),
    }
}

/// Gets the last error message as a C string.
///
/// Returns null if no error is set.
///
/// # Safety
///
/// The returned pointer is valid until the next FFI call on this thread.
#[no_mangle]
pub extern "C" fn dbs_get_last_error() -> *const std::ffi::c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => std::ptr::null(),
    })
}

/// Clears the last error message.
#[no_mangle]
pub extern "C" fn dbs_clear_error() {
    clear_last_error();
}
