//! Restore sink: writes a backup stream into a file in a target directory.

use crate::error::{CoreError, CoreResult};
use crate::path::{backup_file_path, validate_db_name, validate_dir};
use crate::registry::{HandleRegistry, RestoreHandle, RestoreReleaseGuard};
use crate::types::{BackupLevel, RestoreKind};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Mutable state of the restore slot, guarded by the slot mutex.
#[derive(Debug)]
pub(crate) struct RestoreSession {
    kind: RestoreKind,
    level: BackupLevel,
    db_name: String,
    path: PathBuf,
    file: Option<File>,
    written: u64,
}

impl Default for RestoreSession {
    fn default() -> Self {
        Self {
            kind: RestoreKind::ToFile,
            level: BackupLevel::Full,
            db_name: String::new(),
            path: PathBuf::new(),
            file: None,
            written: 0,
        }
    }
}

impl RestoreSession {
    /// Flushes and closes the output file.
    pub(crate) fn teardown(&mut self) -> CoreResult<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        debug!(
            db = %self.db_name,
            kind = ?self.kind,
            path = %self.path.display(),
            bytes = self.written,
            "closing restore file"
        );
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

/// Borrowed view of what a restore needs from its context.
pub(crate) struct RestoreSink<'a> {
    pub(crate) registry: &'a HandleRegistry,
}

impl RestoreSink<'_> {
    pub(crate) fn begin(
        &self,
        level: BackupLevel,
        db_name: &str,
        kind: RestoreKind,
        target_dir: &Path,
    ) -> CoreResult<RestoreHandle> {
        if kind == RestoreKind::ToDatabase {
            return Err(CoreError::unsupported("restore into a database instance"));
        }
        validate_dir(target_dir).map_err(|e| {
            CoreError::invalid_argument(format!(
                "restore target {} is unusable: {e}",
                target_dir.display()
            ))
        })?;
        validate_db_name(db_name)?;

        let handle = self.registry.acquire_restore()?;
        let rollback = RestoreReleaseGuard::new(self.registry, handle);

        let path = backup_file_path(target_dir, db_name, level)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .custom_flags(nix::libc::O_CLOEXEC)
            .open(&path)
            .map_err(|e| {
                CoreError::resource(format!("cannot create {}: {e}", path.display()))
            })?;

        {
            let mut session = self.registry.lock_restore(&handle)?;
            session.kind = kind;
            session.level = level;
            session.db_name = db_name.to_string();
            session.path = path;
            session.file = Some(file);
        }

        info!(db = %db_name, %level, "restore started");
        Ok(rollback.disarm())
    }

    pub(crate) fn write(
        &self,
        handle: &RestoreHandle,
        level: BackupLevel,
        buf: &[u8],
    ) -> CoreResult<()> {
        let mut guard = self.registry.lock_restore(handle)?;
        let session = &mut *guard;
        if level != session.level {
            return Err(CoreError::invalid_argument(format!(
                "restore of {} is bound to level {}, got {level}",
                session.db_name, session.level
            )));
        }

        let file = session
            .file
            .as_mut()
            .ok_or_else(|| CoreError::resource("restore file is closed"))?;
        let n = loop {
            match file.write(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if n != buf.len() {
            return Err(CoreError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short write: {n} of {} bytes", buf.len()),
            )));
        }
        session.written += n as u64;
        Ok(())
    }

    pub(crate) fn end(&self, handle: &RestoreHandle) -> CoreResult<()> {
        self.registry.release_restore(handle)?;
        info!("restore ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn writes_land_in_named_file() {
        let dir = tempdir().unwrap();
        let registry = HandleRegistry::new();
        let sink = RestoreSink {
            registry: &registry,
        };

        let handle = sink
            .begin(BackupLevel::BigIncrement, "demodb", RestoreKind::ToFile, dir.path())
            .unwrap();
        sink.write(&handle, BackupLevel::BigIncrement, b"abc").unwrap();
        sink.write(&handle, BackupLevel::BigIncrement, b"").unwrap();
        sink.write(&handle, BackupLevel::BigIncrement, b"defg").unwrap();
        sink.end(&handle).unwrap();

        let path = dir.path().join("demodb_bk1v000");
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdefg");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn level_mismatch_writes_nothing() {
        let dir = tempdir().unwrap();
        let registry = HandleRegistry::new();
        let sink = RestoreSink {
            registry: &registry,
        };
        let handle = sink
            .begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, dir.path())
            .unwrap();
        assert!(matches!(
            sink.write(&handle, BackupLevel::SmallIncrement, b"zzz"),
            Err(CoreError::InvalidArgument { .. })
        ));
        sink.end(&handle).unwrap();
        assert_eq!(
            std::fs::metadata(dir.path().join("demodb_bk0v000"))
                .unwrap()
                .len(),
            0
        );
    }

    #[test]
    fn begin_truncates_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("demodb_bk0v000");
        std::fs::write(&path, b"old contents").unwrap();

        let registry = HandleRegistry::new();
        let sink = RestoreSink {
            registry: &registry,
        };
        let handle = sink
            .begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, dir.path())
            .unwrap();
        sink.write(&handle, BackupLevel::Full, b"new").unwrap();
        sink.end(&handle).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn rejected_begins_leave_slot_free() {
        let dir = tempdir().unwrap();
        let registry = HandleRegistry::new();
        let sink = RestoreSink {
            registry: &registry,
        };

        assert!(matches!(
            sink.begin(BackupLevel::Full, "demodb", RestoreKind::ToDatabase, dir.path()),
            Err(CoreError::Unsupported { .. })
        ));
        assert!(matches!(
            sink.begin(
                BackupLevel::Full,
                "demodb",
                RestoreKind::ToFile,
                &dir.path().join("missing")
            ),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(sink
            .begin(BackupLevel::Full, "", RestoreKind::ToFile, dir.path())
            .is_err());
        assert!(!registry.any_live());
    }

    #[test]
    fn stale_handle_is_rejected_after_end() {
        let dir = tempdir().unwrap();
        let registry = HandleRegistry::new();
        let sink = RestoreSink {
            registry: &registry,
        };
        let handle = sink
            .begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, dir.path())
            .unwrap();
        sink.end(&handle).unwrap();
        assert!(matches!(
            sink.write(&handle, BackupLevel::Full, b"x"),
            Err(CoreError::InvalidHandle { .. })
        ));
        assert!(sink.end(&handle).is_err());
    }
}
