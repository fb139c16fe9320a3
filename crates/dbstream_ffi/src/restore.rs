//! Restore FFI functions.

use crate::context::{context, RESTORE_ANCHOR};
use crate::error::{clear_last_error, fail, set_last_error, status, DbsResult};
use crate::types::{c_str, DbsRestoreHandle, DbsRestoreInfo};
use dbstream_core::{BackupLevel, RestoreHandle};
use std::ffi::{c_int, c_uint, c_void};

/// Starts a restore into `<restore_path>/<db_name>_bk<level>v000`.
///
/// # Safety
///
/// - `info` must point to a valid `DbsRestoreInfo` whose strings are valid
///   and null-terminated
/// - `out_handle` must be a valid pointer
#[no_mangle]
pub unsafe extern "C" fn dbs_restore_begin(
    info: *const DbsRestoreInfo,
    out_handle: *mut *mut DbsRestoreHandle,
) -> DbsResult {
    clear_last_error();

    if info.is_null() || out_handle.is_null() {
        set_last_error("null pointer argument");
        return DbsResult::NullPointer;
    }
    let info = &*info;

    let args = info.level().and_then(|level| {
        Ok((
            level,
            info.kind()?,
            c_str(info.db_name, "db_name")?,
            c_str(info.restore_path, "restore_path")?,
        ))
    });
    let (level, kind, db_name, target) = match args {
        Ok(args) => args,
        Err(e) => return fail(&e),
    };

    match context().restore_begin(level, db_name, kind, target) {
        Ok(handle) => {
            RESTORE_ANCHOR.publish(handle);
            *out_handle = RESTORE_ANCHOR.as_ptr();
            DbsResult::Ok
        }
        Err(e) => fail(&e),
    }
}

/// Writes `buffer_size` bytes of backup data.
///
/// `backup_level` must match the level given to `dbs_restore_begin`.
///
/// # Safety
///
/// `buffer` must be valid for reads of `buffer_size` bytes.
#[no_mangle]
pub unsafe extern "C" fn dbs_restore_write(
    handle: *mut DbsRestoreHandle,
    backup_level: c_int,
    buffer: *const c_void,
    buffer_size: c_uint,
) -> DbsResult {
    clear_last_error();

    if buffer.is_null() {
        set_last_error("null pointer argument");
        return DbsResult::NullPointer;
    }
    let level = match BackupLevel::try_from(backup_level) {
        Ok(level) => level,
        Err(e) => return fail(&e),
    };

    let handle = RESTORE_ANCHOR.resolve(handle, RestoreHandle::null());
    let buf = std::slice::from_raw_parts(buffer.cast::<u8>(), buffer_size as usize);
    status(context().restore_write(&handle, level, buf))
}

/// Ends a restore, flushing and closing the output file.
#[no_mangle]
pub extern "C" fn dbs_restore_end(handle: *mut DbsRestoreHandle) -> DbsResult {
    clear_last_error();
    let handle = RESTORE_ANCHOR.resolve(handle, RestoreHandle::null());
    let result = context().restore_end(&handle);
    if result.is_ok() {
        RESTORE_ANCHOR.retract();
    }
    status(result)
}
