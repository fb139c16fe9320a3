//! Type definitions for FFI.

use dbstream_core::{
    BackupLevel, BackupOptions, CoreError, CoreResult, OptionOverride, RestoreKind,
};
use parking_lot::{const_mutex, Mutex};
use std::ffi::{c_char, c_int, CStr};

/// An opaque backup handle.
///
/// Never dereference or modify directly.
#[repr(C)]
pub struct DbsBackupHandle {
    _private: [u8; 0],
}

/// An opaque restore handle.
#[repr(C)]
pub struct DbsRestoreHandle {
    _private: [u8; 0],
}

/// Restore into a file in `restore_path`.
pub const DBS_RESTORE_TO_FILE: c_int = 0;
/// Restore into a database instance. Rejected with `NotSupported`.
pub const DBS_RESTORE_TO_DB: c_int = 1;

/// Parameters of `dbs_backup_begin`.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct DbsBackupInfo {
    /// 0 = full, 1 = big increment, 2 = small increment.
    pub backup_level: c_int,
    /// Database name (null-terminated UTF-8).
    pub db_name: *const c_char,
    /// -1 = option file default, 0 = off, 1 = on.
    pub remove_archive: c_int,
    /// -1 = option file default, 0 = off, 1 = on.
    pub sa_mode: c_int,
    /// -1 = option file default, 0 = off, 1 = on.
    pub no_check: c_int,
    /// -1 = option file default, 0 = off, 1 = on.
    pub compress: c_int,
}

impl Default for DbsBackupInfo {
    fn default() -> Self {
        Self {
            backup_level: 0,
            db_name: std::ptr::null(),
            remove_archive: -1,
            sa_mode: -1,
            no_check: -1,
            compress: -1,
        }
    }
}

impl DbsBackupInfo {
    pub(crate) fn level(&self) -> CoreResult<BackupLevel> {
        BackupLevel::try_from(self.backup_level)
    }

    pub(crate) fn options(&self) -> CoreResult<BackupOptions> {
        Ok(BackupOptions::new()
            .remove_archive(OptionOverride::try_from(self.remove_archive)?)
            .sa_mode(OptionOverride::try_from(self.sa_mode)?)
            .no_check(OptionOverride::try_from(self.no_check)?)
            .compress(OptionOverride::try_from(self.compress)?))
    }
}

/// Parameters of `dbs_restore_begin`.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct DbsRestoreInfo {
    /// 0 = full, 1 = big increment, 2 = small increment.
    pub backup_level: c_int,
    /// Database name (null-terminated UTF-8).
    pub db_name: *const c_char,
    /// `DBS_RESTORE_TO_FILE` or `DBS_RESTORE_TO_DB`.
    pub restore_type: c_int,
    /// Target directory (null-terminated UTF-8).
    pub restore_path: *const c_char,
}

impl Default for DbsRestoreInfo {
    fn default() -> Self {
        Self {
            backup_level: 0,
            db_name: std::ptr::null(),
            restore_type: DBS_RESTORE_TO_FILE,
            restore_path: std::ptr::null(),
        }
    }
}

impl DbsRestoreInfo {
    pub(crate) fn level(&self) -> CoreResult<BackupLevel> {
        BackupLevel::try_from(self.backup_level)
    }

    pub(crate) fn kind(&self) -> CoreResult<RestoreKind> {
        match self.restore_type {
            DBS_RESTORE_TO_FILE => Ok(RestoreKind::ToFile),
            DBS_RESTORE_TO_DB => Ok(RestoreKind::ToDatabase),
            other => Err(CoreError::invalid_argument(format!(
                "unknown restore type {other}"
            ))),
        }
    }
}

/// Reads a required C string argument.
///
/// # Safety
///
/// `ptr` must be null or point to a valid null-terminated string.
pub(crate) unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> CoreResult<&'a str> {
    if ptr.is_null() {
        return Err(CoreError::invalid_argument(format!("{what} is null")));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| CoreError::invalid_argument(format!("{what} is not valid UTF-8")))
}

/// Static object whose address is handed out as the opaque handle pointer.
///
/// The pointer is only ever compared against the anchor's address, never
/// dereferenced, so garbage input cannot fault.
pub(crate) struct HandleAnchor<H> {
    current: Mutex<Option<H>>,
}

impl<H: Copy> HandleAnchor<H> {
    pub(crate) const fn new() -> Self {
        Self {
            current: const_mutex(None),
        }
    }

    pub(crate) fn as_ptr<T>(&'static self) -> *mut T {
        (self as *const Self).cast_mut().cast()
    }

    pub(crate) fn publish(&self, handle: H) {
        *self.current.lock() = Some(handle);
    }

    pub(crate) fn retract(&self) {
        *self.current.lock() = None;
    }

    /// Returns the live handle if `ptr` is this anchor, otherwise `null`.
    pub(crate) fn resolve<T>(&'static self, ptr: *const T, null: H) -> H {
        if std::ptr::eq(ptr.cast::<u8>(), (self as *const Self).cast::<u8>()) {
            self.current.lock().unwrap_or(null)
        } else {
            null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbstream_core::BackupHandle;

    static ANCHOR: HandleAnchor<BackupHandle> = HandleAnchor::new();
    static OTHER: HandleAnchor<BackupHandle> = HandleAnchor::new();

    #[test]
    fn anchor_resolves_only_its_own_address() {
        let ptr: *mut DbsBackupHandle = ANCHOR.as_ptr();
        assert_eq!(
            ANCHOR.resolve(ptr, BackupHandle::null()),
            BackupHandle::null()
        );
        assert!(ANCHOR
            .resolve(std::ptr::null::<DbsBackupHandle>(), BackupHandle::null())
            .is_null());
        let foreign: *mut DbsBackupHandle = OTHER.as_ptr();
        assert!(ANCHOR.resolve(foreign, BackupHandle::null()).is_null());
        ANCHOR.retract();
    }

    #[test]
    fn backup_info_conversion() {
        let info = DbsBackupInfo {
            backup_level: 1,
            compress: 1,
            no_check: 0,
            ..DbsBackupInfo::default()
        };
        assert_eq!(info.level().unwrap(), BackupLevel::BigIncrement);
        let opts = info.options().unwrap();
        assert_eq!(opts.compress, OptionOverride::On);
        assert_eq!(opts.no_check, OptionOverride::Off);
        assert_eq!(opts.sa_mode, OptionOverride::Default);

        for bad in [7, -20, 77] {
            let info = DbsBackupInfo {
                sa_mode: bad,
                ..DbsBackupInfo::default()
            };
            assert!(info.options().is_err());
        }
        let info = DbsBackupInfo {
            backup_level: 1004,
            ..DbsBackupInfo::default()
        };
        assert!(info.level().is_err());
    }

    #[test]
    fn restore_kind_conversion() {
        let mut info = DbsRestoreInfo::default();
        assert_eq!(info.kind().unwrap(), RestoreKind::ToFile);
        info.restore_type = DBS_RESTORE_TO_DB;
        assert_eq!(info.kind().unwrap(), RestoreKind::ToDatabase);
        info.restore_type = 9;
        assert!(info.kind().is_err());
    }
}
