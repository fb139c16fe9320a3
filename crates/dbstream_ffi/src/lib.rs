//! # dbstream FFI
//!
//! Stable C ABI for dbstream.
//!
//! This crate provides:
//! - C-compatible function exports over one process-wide context
//! - Opaque handle pointers that are validated by address, never dereferenced
//! - Error code mapping and a thread-local last-error message
//!
//! ## Call order
//!
//! ```text
//! dbs_backup_initialize
//!   dbs_backup_begin -> dbs_backup_read ... -> dbs_backup_end
//!   dbs_restore_begin -> dbs_restore_write ... -> dbs_restore_end
//! dbs_backup_finalize
//! ```

#![warn(missing_docs)]

mod backup;
mod context;
mod error;
mod restore;
mod types;

pub use backup::{dbs_backup_begin, dbs_backup_end, dbs_backup_read};
pub use context::{dbs_backup_finalize, dbs_backup_initialize};
pub use error::{
    clear_last_error, dbs_clear_error, dbs_get_last_error, set_last_error, DbsResult, ErrorCode,
};
pub use restore::{dbs_restore_begin, dbs_restore_end, dbs_restore_write};
pub use types::{
    DbsBackupHandle, DbsBackupInfo, DbsRestoreHandle, DbsRestoreInfo, DBS_RESTORE_TO_DB,
    DBS_RESTORE_TO_FILE,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{c_uint, c_void, CString};
    use tempfile::tempdir;

    // Every call below goes through the single process-wide context, so the
    // whole lifecycle lives in one test.
    #[test]
    fn lifecycle_through_c_abi() {
        let home = tempdir().unwrap();
        std::fs::create_dir(home.path().join("tmp")).unwrap();
        std::env::set_var(dbstream_core::HOME_ENV, home.path());
        let target = tempdir().unwrap();

        let db_name = CString::new("demodb").unwrap();
        let path = CString::new(target.path().to_str().unwrap()).unwrap();
        let info = DbsRestoreInfo {
            backup_level: 0,
            db_name: db_name.as_ptr(),
            restore_type: DBS_RESTORE_TO_FILE,
            restore_path: path.as_ptr(),
        };
        let mut restore: *mut DbsRestoreHandle = std::ptr::null_mut();

        unsafe {
            // Nothing works before initialize.
            assert_eq!(
                dbs_restore_begin(&info, &mut restore),
                DbsResult::SequenceError
            );
            assert!(!dbs_get_last_error().is_null());
            assert_eq!(dbs_backup_finalize(), DbsResult::SequenceError);

            assert_eq!(dbs_backup_initialize(), DbsResult::Ok);
            assert_eq!(dbs_backup_initialize(), DbsResult::SequenceError);

            assert_eq!(
                dbs_restore_begin(std::ptr::null(), &mut restore),
                DbsResult::NullPointer
            );
            let to_db = DbsRestoreInfo {
                restore_type: DBS_RESTORE_TO_DB,
                ..info.clone()
            };
            assert_eq!(
                dbs_restore_begin(&to_db, &mut restore),
                DbsResult::NotSupported
            );

            assert_eq!(dbs_restore_begin(&info, &mut restore), DbsResult::Ok);
            assert!(!restore.is_null());
            assert_eq!(
                dbs_restore_begin(&info, &mut restore),
                DbsResult::SequenceError
            );

            let chunk = b"0123456789";
            for _ in 0..3 {
                assert_eq!(
                    dbs_restore_write(
                        restore,
                        0,
                        chunk.as_ptr().cast::<c_void>(),
                        chunk.len() as c_uint
                    ),
                    DbsResult::Ok
                );
            }
            assert_eq!(
                dbs_restore_write(restore, 2, chunk.as_ptr().cast::<c_void>(), 1),
                DbsResult::InvalidArgument
            );

            // A pointer that is not the handle is rejected without being read.
            let bogus = 0x10usize as *mut DbsRestoreHandle;
            assert_eq!(
                dbs_restore_write(bogus, 0, chunk.as_ptr().cast::<c_void>(), 1),
                DbsResult::InvalidHandle
            );
            assert_eq!(dbs_restore_end(bogus), DbsResult::InvalidHandle);

            assert_eq!(dbs_restore_end(restore), DbsResult::Ok);
            assert_eq!(dbs_restore_end(restore), DbsResult::SequenceError);

            // Reads need a live backup.
            let mut buf = [0u8; 16];
            let mut len: c_uint = 0;
            let mut eos = false;
            assert_eq!(
                dbs_backup_read(
                    std::ptr::null_mut(),
                    buf.as_mut_ptr().cast::<c_void>(),
                    buf.len() as c_uint,
                    &mut len,
                    &mut eos
                ),
                DbsResult::SequenceError
            );

            assert_eq!(dbs_backup_finalize(), DbsResult::Ok);
            assert_eq!(dbs_backup_finalize(), DbsResult::SequenceError);
        }

        let written = std::fs::read(target.path().join("demodb_bk0v000")).unwrap();
        assert_eq!(written.len(), 30);
        assert!(!home
            .path()
            .join("tmp")
            .join(dbstream_core::WORK_DIR_NAME)
            .exists());
    }
}
