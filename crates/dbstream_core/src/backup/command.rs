//! Backup utility command line.

use crate::options::ResolvedOptions;
use crate::types::BackupLevel;
use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Program and argument vector for one backup run.
///
/// ```text
/// <utility> <leading..> -D <pipe> [-r] -l <level> [-S] [--no-check]
///           [-t <n>] [-z] [-e] [--sleep-msecs=<n>] <db_name>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtilityCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl UtilityCommand {
    /// Builds the command for streaming `db_name` at `level` into `pipe`.
    pub fn new(
        program: &Path,
        leading: &[String],
        pipe: &Path,
        level: BackupLevel,
        options: &ResolvedOptions,
        db_name: &str,
    ) -> Self {
        let mut args: Vec<OsString> = leading.iter().map(OsString::from).collect();

        args.push("-D".into());
        args.push(pipe.as_os_str().to_os_string());
        if options.remove_archive {
            args.push("-r".into());
        }
        args.push("-l".into());
        args.push(level.ordinal().to_string().into());
        if options.sa_mode {
            args.push("-S".into());
        }
        if options.no_check {
            args.push("--no-check".into());
        }
        if options.thread_count > 0 {
            args.push("-t".into());
            args.push(options.thread_count.to_string().into());
        }
        if options.compress {
            args.push("-z".into());
        }
        if options.except_active_log {
            args.push("-e".into());
        }
        if options.sleep_msecs > 0 {
            args.push(format!("--sleep-msecs={}", options.sleep_msecs).into());
        }
        args.push(db_name.into());

        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    /// The program to run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the program.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// A `Command` that starts the utility as leader of a new process group
    /// with no stdin or stdout.
    pub(crate) fn to_command(&self, inherit_stderr: bool) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(if inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .process_group(0);
        command
    }
}
