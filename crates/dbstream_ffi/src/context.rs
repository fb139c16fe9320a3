//! Process-wide context and lifecycle functions.

use crate::error::{clear_last_error, status, DbsResult};
use crate::types::HandleAnchor;
use dbstream_core::{ApiContext, BackupHandle, Config, RestoreHandle};
use std::sync::OnceLock;

static CONTEXT: OnceLock<ApiContext> = OnceLock::new();

pub(crate) static BACKUP_ANCHOR: HandleAnchor<BackupHandle> = HandleAnchor::new();
pub(crate) static RESTORE_ANCHOR: HandleAnchor<RestoreHandle> = HandleAnchor::new();

/// The one context shared by every FFI caller in this process.
///
/// Built from `DBSTREAM_HOME` / `DBSTREAM_TMP` on first use.
pub(crate) fn context() -> &'static ApiContext {
    CONTEXT.get_or_init(|| ApiContext::new(Config::from_env()))
}

/// Initializes the backup API.
///
/// # Returns
///
/// `DbsResult::Ok` on success, `DbsResult::SequenceError` if already
/// initialized.
#[no_mangle]
pub extern "C" fn dbs_backup_initialize() -> DbsResult {
    clear_last_error();
    status(context().initialize())
}

/// Finalizes the backup API, ending any backup or restore still in flight.
///
/// Outstanding handles become invalid.
#[no_mangle]
pub extern "C" fn dbs_backup_finalize() -> DbsResult {
    clear_last_error();
    let result = context().finalize();
    if result.is_ok() || context().state() == dbstream_core::ApiState::NotReady {
        BACKUP_ANCHOR.retract();
        RESTORE_ANCHOR.retract();
    }
    status(result)
}
