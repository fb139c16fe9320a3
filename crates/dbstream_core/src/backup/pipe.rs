//! Named pipe the backup utility writes into.

use crate::error::{CoreError, CoreResult};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Read end of a FIFO, opened non-blocking. Unlinked on close or drop.
#[derive(Debug)]
pub(crate) struct NamedPipe {
    path: PathBuf,
    file: Option<File>,
}

impl NamedPipe {
    /// Creates the FIFO at `path` (mode 0600), replacing any stale entry, and
    /// opens its read end.
    pub(crate) fn create(path: &Path) -> CoreResult<Self> {
        match fs::symlink_metadata(path) {
            Ok(_) => {
                debug!(path = %path.display(), "removing stale pipe");
                fs::remove_file(path).map_err(|e| {
                    CoreError::resource(format!("cannot remove stale {}: {e}", path.display()))
                })?;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CoreError::resource(format!(
                    "cannot inspect {}: {e}",
                    path.display()
                )))
            }
        }

        mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
            CoreError::resource(format!("cannot create pipe {}: {e}", path.display()))
        })?;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NONBLOCK)
            .open(path);
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(path);
                return Err(CoreError::resource(format!(
                    "cannot open pipe {}: {e}",
                    path.display()
                )));
            }
        };

        debug!(path = %path.display(), "pipe created");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Waits up to `timeout` for data, then performs one read.
    ///
    /// Returns 0 when nothing arrived in time, when no writer is connected,
    /// or when the writer has closed its end.
    pub(crate) fn read_block(&mut self, buf: &mut [u8], timeout: Duration) -> CoreResult<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CoreError::resource("pipe is closed"))?;

        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let ready = {
            let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
            match poll(&mut fds, millis) {
                Ok(0) | Err(Errno::EINTR) => false,
                Ok(_) => true,
                Err(e) => return Err(e.into()),
            }
        };
        if !ready {
            return Ok(0);
        }

        loop {
            match file.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Closes the read end and unlinks the FIFO.
    pub(crate) fn close(mut self) -> CoreResult<()> {
        self.file = None;
        let result = remove_if_present(&self.path);
        self.path = PathBuf::new();
        result
    }
}

impl Drop for NamedPipe {
    fn drop(&mut self) {
        self.file = None;
        if !self.path.as_os_str().is_empty() {
            if let Err(e) = remove_if_present(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to unlink pipe");
            }
        }
    }
}

fn remove_if_present(path: &Path) -> CoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::resource(format!(
            "cannot unlink {}: {e}",
            path.display()
        ))),
    }
}
