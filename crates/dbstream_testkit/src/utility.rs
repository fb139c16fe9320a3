//! A scriptable stand-in for the backup utility.
//!
//! The fake is a `/bin/sh` script. It records its arguments, finds the
//! `-D <pipe>` destination and then behaves according to its
//! [`UtilityMode`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// What the fake utility does once started.
#[derive(Debug, Clone)]
pub enum UtilityMode {
    /// Copy `data` into the pipe and exit 0.
    Emit(Vec<u8>),
    /// Exit with the given code without opening the pipe.
    Fail(i32),
    /// Write `data` into the pipe, then exit with the given code.
    EmitThenFail(Vec<u8>, i32),
    /// Open the pipe, start a background child, write a few bytes and wait
    /// until killed.
    Stall,
    /// Like `Stall`, but the background child ignores SIGTERM.
    StallIgnoringTerm,
    /// Stop itself with SIGSTOP.
    Stop,
}

/// A fake backup utility living in its own temporary directory.
pub struct FakeUtility {
    dir: TempDir,
    script: PathBuf,
}

impl FakeUtility {
    /// Writes the script for `mode`.
    pub fn new(mode: UtilityMode) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let args_file = dir.path().join("args.txt");
        let pids_file = dir.path().join("pids.txt");
        let fixture = dir.path().join("fixture.bin");

        let body = match &mode {
            UtilityMode::Emit(data) => {
                fs::write(&fixture, data).expect("Failed to write fixture");
                format!("cat '{}' > \"$pipe\" || exit 3\nexit 0\n", fixture.display())
            }
            UtilityMode::Fail(code) => format!("exit {code}\n"),
            UtilityMode::EmitThenFail(data, code) => {
                fs::write(&fixture, data).expect("Failed to write fixture");
                format!("cat '{}' > \"$pipe\"\nexit {code}\n", fixture.display())
            }
            UtilityMode::Stall => stall_body(&pids_file, "sleep 30 &"),
            UtilityMode::StallIgnoringTerm => {
                stall_body(&pids_file, "( trap '' TERM; exec sleep 60 ) &")
            }
            UtilityMode::Stop => "kill -STOP $$\nexit 0\n".to_string(),
        };

        let script_text = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$@\" > '{args}'\n\
             pipe=''\n\
             while [ $# -gt 0 ]; do\n\
             \x20 if [ \"$1\" = '-D' ]; then pipe=\"$2\"; shift; fi\n\
             \x20 shift\n\
             done\n\
             {body}",
            args = args_file.display(),
        );

        let script = dir.path().join("fake_backupdb.sh");
        fs::write(&script, script_text).expect("Failed to write script");
        Self { dir, script }
    }

    /// Program to configure as the backup utility.
    pub fn program(&self) -> &Path {
        Path::new("/bin/sh")
    }

    /// Leading arguments to configure: the script, then the subcommand.
    pub fn leading_args(&self) -> Vec<String> {
        vec![self.script.display().to_string(), "backupdb".to_string()]
    }

    /// Pids recorded by the stall modes: the script itself (which leads the
    /// process group), then its background child.
    pub fn recorded_pids(&self) -> Vec<i32> {
        fs::read_to_string(self.dir.path().join("pids.txt"))
            .map(|text| text.lines().filter_map(|l| l.trim().parse().ok()).collect())
            .unwrap_or_default()
    }

    /// Arguments the script received on its last run (after the script
    /// path), or an empty list if it has not run.
    pub fn recorded_args(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("args.txt"))
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

fn stall_body(pids_file: &Path, child: &str) -> String {
    let pids = pids_file.display();
    format!(
        "exec 3> \"$pipe\"\n\
         echo $$ > '{pids}'\n\
         {child}\n\
         echo $! >> '{pids}'\n\
         printf 'started' >&3\n\
         wait\n\
         exit 0\n"
    )
}

/// Returns true if `pid` exists and is not a zombie.
pub fn process_alive(pid: i32) -> bool {
    proc_stat(pid).is_some_and(|(state, _)| !matches!(state, 'Z' | 'X'))
}

/// Returns true if any live, non-zombie process belongs to group `pgid`.
pub fn group_alive(pgid: i32) -> bool {
    let Ok(entries) = fs::read_dir("/proc") else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().to_str()?.parse::<i32>().ok())
        .filter_map(proc_stat)
        .any(|(state, pgrp)| pgrp == pgid && !matches!(state, 'Z' | 'X'))
}

/// Polls until no process of group `pgid` is alive. False on timeout.
pub fn wait_group_gone(pgid: i32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !group_alive(pgid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// State letter and process group from `/proc/<pid>/stat`.
fn proc_stat(pid: i32) -> Option<(char, i32)> {
    let text = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // The command name may contain spaces; fields resume after the last ')'.
    let rest = &text[text.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let pgrp = fields.nth(1)?.parse().ok()?;
    Some((state, pgrp))
}

/// Deterministic, non-repeating-looking test payload.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}
