//! Backup FFI functions.

use crate::context::{context, BACKUP_ANCHOR};
use crate::error::{clear_last_error, fail, set_last_error, status, DbsResult};
use crate::types::{c_str, DbsBackupHandle, DbsBackupInfo};
use dbstream_core::BackupHandle;
use std::ffi::{c_uint, c_void};

/// Starts a backup.
///
/// # Arguments
///
/// * `info` - Level, database name and option overrides
/// * `out_handle` - Output pointer for the backup handle
///
/// # Safety
///
/// - `info` must point to a valid `DbsBackupInfo` whose `db_name` is a valid
///   null-terminated string
/// - `out_handle` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn dbs_backup_begin(
    info: *const DbsBackupInfo,
    out_handle: *mut *mut DbsBackupHandle,
) -> DbsResult {
    clear_last_error();

    if info.is_null() || out_handle.is_null() {
        set_last_error("null pointer argument");
        return DbsResult::NullPointer;
    }
    let info = &*info;

    let args = info
        .level()
        .and_then(|level| Ok((level, info.options()?, c_str(info.db_name, "db_name")?)));
    let (level, options, db_name) = match args {
        Ok(args) => args,
        Err(e) => return fail(&e),
    };

    match context().backup_begin(level, db_name, options) {
        Ok(handle) => {
            BACKUP_ANCHOR.publish(handle);
            *out_handle = BACKUP_ANCHOR.as_ptr();
            DbsResult::Ok
        }
        Err(e) => fail(&e),
    }
}

/// Reads the next part of the backup stream.
///
/// On success `*data_len` holds the number of bytes written into `buffer`
/// and `*end_of_stream` is true once the stream is complete. `*data_len` of
/// 0 with `*end_of_stream` false means no data arrived in time; call again.
///
/// # Safety
///
/// - `buffer` must be valid for writes of `buffer_size` bytes
/// - `data_len` and `end_of_stream` must be valid pointers
#[no_mangle]
pub unsafe extern "C" fn dbs_backup_read(
    handle: *mut DbsBackupHandle,
    buffer: *mut c_void,
    buffer_size: c_uint,
    data_len: *mut c_uint,
    end_of_stream: *mut bool,
) -> DbsResult {
    clear_last_error();

    if buffer.is_null() || data_len.is_null() || end_of_stream.is_null() {
        set_last_error("null pointer argument");
        return DbsResult::NullPointer;
    }

    let handle = BACKUP_ANCHOR.resolve(handle, BackupHandle::null());
    let buf = std::slice::from_raw_parts_mut(buffer.cast::<u8>(), buffer_size as usize);
    match context().backup_read(&handle, buf) {
        Ok(outcome) => {
            *data_len = outcome.bytes_read as c_uint;
            *end_of_stream = outcome.end_of_stream;
            DbsResult::Ok
        }
        Err(e) => {
            *data_len = 0;
            *end_of_stream = false;
            fail(&e)
        }
    }
}

/// Ends a backup, stopping the utility if it is still running.
#[no_mangle]
pub extern "C" fn dbs_backup_end(handle: *mut DbsBackupHandle) -> DbsResult {
    clear_last_error();
    let handle = BACKUP_ANCHOR.resolve(handle, BackupHandle::null());
    let result = context().backup_end(&handle);
    if result.is_ok() {
        BACKUP_ANCHOR.retract();
    }
    status(result)
}
