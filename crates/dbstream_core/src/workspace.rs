//! Runtime set up by `initialize`.
//!
//! ```text
//! <home>/
//! ├─ bin/dbadmin          # default backup utility
//! ├─ conf/dbstream.conf   # default option file
//! └─ tmp/                 # preferred work directory base
//!     └─ .dbstream_backup/  # live named pipes (mode 0700)
//! ```

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::options::OptionDefaults;
use crate::path::{check_path_length, is_backup_file_name, validate_dir};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the work directory created under the chosen base.
pub const WORK_DIR_NAME: &str = ".dbstream_backup";

const DEFAULT_UTILITY: &str = "bin/dbadmin";
const DEFAULT_OPTIONS_FILE: &str = "conf/dbstream.conf";
const SYSTEM_TMP: &str = "/tmp";

/// Work directory, I/O size, option defaults and utility of an initialized
/// context.
#[derive(Debug)]
pub struct Workspace {
    work_dir: PathBuf,
    io_size: usize,
    defaults: OptionDefaults,
    utility: PathBuf,
}

impl Workspace {
    /// Resolves the utility, loads the option file and creates the work
    /// directory.
    pub fn prepare(config: &Config) -> CoreResult<Self> {
        let home = match &config.home {
            Some(home) => {
                validate_dir(home).map_err(|e| {
                    CoreError::invalid_argument(format!(
                        "home directory {} is unusable: {e}",
                        home.display()
                    ))
                })?;
                Some(home.as_path())
            }
            None => None,
        };

        let utility = match (&config.utility, home) {
            (Some(utility), _) => utility.clone(),
            (None, Some(home)) => home.join(DEFAULT_UTILITY),
            (None, None) => {
                return Err(CoreError::invalid_argument(
                    "no backup utility configured and no home directory set",
                ))
            }
        };
        check_path_length(&utility)?;

        let options_file = match (&config.options_file, home) {
            (Some(path), _) => Some(path.clone()),
            (None, Some(home)) => Some(home.join(DEFAULT_OPTIONS_FILE)),
            (None, None) => None,
        };
        let defaults = match &options_file {
            Some(path) => OptionDefaults::load(path)?,
            None => OptionDefaults::default(),
        };

        let base = choose_base(config, home)?;
        let work_dir = base.join(WORK_DIR_NAME);
        check_path_length(&work_dir)?;
        create_work_dir(&work_dir)?;

        let block = fs::metadata(&work_dir)?.blksize();
        let block = usize::try_from(block).unwrap_or(4096).max(512);
        let io_size = block.saturating_mul(config.io_blocks.max(1));

        info!(
            work_dir = %work_dir.display(),
            utility = %utility.display(),
            io_size,
            "workspace ready"
        );
        Ok(Self {
            work_dir,
            io_size,
            defaults,
            utility,
        })
    }

    /// Directory holding live pipes.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Drain block size in bytes.
    pub fn io_size(&self) -> usize {
        self.io_size
    }

    /// Option defaults loaded at initialization.
    pub fn defaults(&self) -> &OptionDefaults {
        &self.defaults
    }

    /// Backup utility program.
    pub fn utility(&self) -> &Path {
        &self.utility
    }

    /// Removes stale pipes and then the work directory.
    ///
    /// A directory that still holds other entries is left in place.
    pub fn cleanup(&self) -> CoreResult<()> {
        let entries = match fs::read_dir(&self.work_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let is_fifo = entry.file_type()?.is_fifo();
            let name = entry.file_name();
            if is_fifo && is_backup_file_name(&name.to_string_lossy()) {
                debug!(path = %entry.path().display(), "removing stale pipe");
                fs::remove_file(entry.path())?;
            }
        }

        match fs::remove_dir(&self.work_dir) {
            Ok(()) => {
                debug!(path = %self.work_dir.display(), "work directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.raw_os_error() == Some(nix::libc::ENOTEMPTY) => {
                warn!(
                    path = %self.work_dir.display(),
                    "work directory not empty, leaving it in place"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn choose_base(config: &Config, home: Option<&Path>) -> CoreResult<PathBuf> {
    if let Some(dir) = &config.work_dir {
        validate_dir(dir)?;
        return Ok(dir.clone());
    }

    let mut candidates = Vec::with_capacity(3);
    if let Some(home) = home {
        candidates.push(home.join("tmp"));
    }
    if let Some(tmp) = &config.tmp_dir {
        candidates.push(tmp.clone());
    }
    candidates.push(PathBuf::from(SYSTEM_TMP));

    for candidate in candidates {
        match validate_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) => debug!(path = %candidate.display(), error = %e, "skipping work dir base"),
        }
    }
    Err(CoreError::resource("no usable base for the work directory"))
}

fn create_work_dir(path: &Path) -> CoreResult<()> {
    match DirBuilder::new().mode(0o700).create(path) {
        Ok(()) => {
            debug!(path = %path.display(), "work directory created");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => validate_dir(path),
        Err(e) => Err(CoreError::resource(format!(
            "cannot create {}: {e}",
            path.display()
        ))),
    }
}
