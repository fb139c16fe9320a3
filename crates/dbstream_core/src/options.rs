//! Option defaults and the option file.
//!
//! The option file is a small section/key/value text file:
//!
//! ```text
//! # comment
//! [backup]
//! compress = true
//! thread_count = 4
//!
//! [restore]
//! partial_recovery = false
//! ```
//!
//! Section names, keys and boolean literals are case-insensitive. Anything
//! the parser does not recognise is rejected with the offending line number.

use crate::error::{CoreError, CoreResult};
use crate::types::BackupOptions;
use std::io;
use std::path::Path;
use tracing::debug;

/// Defaults applied to every backup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupDefaults {
    /// Remove archive logs after the backup (`-r`).
    pub remove_archive: bool,
    /// Standalone mode (`-S`).
    pub sa_mode: bool,
    /// Skip the consistency check (`--no-check`).
    pub no_check: bool,
    /// Utility thread count (`-t`, omitted when zero).
    pub thread_count: u32,
    /// Compress the stream (`-z`).
    pub compress: bool,
    /// Leave the active log out of the backup (`-e`).
    pub except_active_log: bool,
    /// Throttle interval in milliseconds (`--sleep-msecs`, omitted when zero).
    pub sleep_msecs: u32,
}

/// `[restore]` section values.
///
/// Reserved for restores into a database instance; file restores do not
/// consult them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreDefaults {
    /// Allow a partial recovery.
    pub partial_recovery: bool,
    /// Restore into the database's recorded location.
    pub use_database_location_path: bool,
}

/// Immutable snapshot of the option file, taken at `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionDefaults {
    /// `[backup]` section.
    pub backup: BackupDefaults,
    /// `[restore]` section.
    pub restore: RestoreDefaults,
}

/// Options used for one backup: per-call overrides merged with defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedOptions {
    /// `-r`
    pub remove_archive: bool,
    /// `-S`
    pub sa_mode: bool,
    /// `--no-check`
    pub no_check: bool,
    /// `-z`
    pub compress: bool,
    /// `-t`
    pub thread_count: u32,
    /// `-e`
    pub except_active_log: bool,
    /// `--sleep-msecs`
    pub sleep_msecs: u32,
}

#[derive(Clone, Copy)]
enum Section {
    Backup,
    Restore,
}

impl OptionDefaults {
    /// Loads the option file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> CoreResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "loading option file");
                Self::parse(&text)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no option file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parses option file text.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut defaults = Self::default();
        let mut section = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| {
                    CoreError::invalid_options(line_no, "unterminated section header")
                })?;
                section = Some(match name.trim().to_ascii_lowercase().as_str() {
                    "backup" => Section::Backup,
                    "restore" => Section::Restore,
                    other => {
                        return Err(CoreError::invalid_options(
                            line_no,
                            format!("unknown section [{other}]"),
                        ))
                    }
                });
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| CoreError::invalid_options(line_no, "expected `key = value`"))?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            if key.is_empty() {
                return Err(CoreError::invalid_options(line_no, "missing key"));
            }
            if value.is_empty() {
                return Err(CoreError::invalid_options(
                    line_no,
                    format!("missing value for {key}"),
                ));
            }

            match section {
                None => {
                    return Err(CoreError::invalid_options(
                        line_no,
                        format!("{key} appears outside of a section"),
                    ))
                }
                Some(Section::Backup) => defaults.backup.set(line_no, &key, value)?,
                Some(Section::Restore) => defaults.restore.set(line_no, &key, value)?,
            }
        }

        Ok(defaults)
    }

    /// Merges per-call overrides with the backup defaults.
    pub fn resolve(&self, overrides: &BackupOptions) -> ResolvedOptions {
        let b = &self.backup;
        ResolvedOptions {
            remove_archive: overrides.remove_archive.resolve(b.remove_archive),
            sa_mode: overrides.sa_mode.resolve(b.sa_mode),
            no_check: overrides.no_check.resolve(b.no_check),
            compress: overrides.compress.resolve(b.compress),
            thread_count: b.thread_count,
            except_active_log: b.except_active_log,
            sleep_msecs: b.sleep_msecs,
        }
    }
}

impl BackupDefaults {
    fn set(&mut self, line: usize, key: &str, value: &str) -> CoreResult<()> {
        match key {
            "remove_archive" => self.remove_archive = parse_bool(line, key, value)?,
            "sa_mode" => self.sa_mode = parse_bool(line, key, value)?,
            "no_check" => self.no_check = parse_bool(line, key, value)?,
            "thread_count" => self.thread_count = parse_int(line, key, value)?,
            "compress" => self.compress = parse_bool(line, key, value)?,
            "except_active_log" => self.except_active_log = parse_bool(line, key, value)?,
            "sleep_msecs" => self.sleep_msecs = parse_int(line, key, value)?,
            other => {
                return Err(CoreError::invalid_options(
                    line,
                    format!("unknown backup option {other}"),
                ))
            }
        }
        Ok(())
    }
}

impl RestoreDefaults {
    fn set(&mut self, line: usize, key: &str, value: &str) -> CoreResult<()> {
        match key {
            "partial_recovery" => self.partial_recovery = parse_bool(line, key, value)?,
            "use_database_location_path" => {
                self.use_database_location_path = parse_bool(line, key, value)?;
            }
            other => {
                return Err(CoreError::invalid_options(
                    line,
                    format!("unknown restore option {other}"),
                ))
            }
        }
        Ok(())
    }
}

fn parse_bool(line: usize, key: &str, value: &str) -> CoreResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(CoreError::invalid_options(
            line,
            format!("{key} expects true, false, 1 or 0, got {value:?}"),
        )),
    }
}

fn parse_int(line: usize, key: &str, value: &str) -> CoreResult<u32> {
    let invalid = || {
        CoreError::invalid_options(
            line,
            format!("{key} expects a non-negative integer, got {value:?}"),
        )
    };
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let parsed: i32 = value.parse().map_err(|_| invalid())?;
    u32::try_from(parsed).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptionOverride;
    use proptest::prelude::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "\
# nightly settings
[Backup]
remove_archive = FALSE
sa_mode = 0
no_check = true
thread_count = 4
compress = 1
except_active_log = false
sleep_msecs = 250

  [ restore ]
PARTIAL_RECOVERY = true
use_database_location_path = 0
";

    #[test]
    fn parse_sample() {
        let opts = OptionDefaults::parse(SAMPLE).unwrap();
        assert_eq!(
            opts.backup,
            BackupDefaults {
                remove_archive: false,
                sa_mode: false,
                no_check: true,
                thread_count: 4,
                compress: true,
                except_active_log: false,
                sleep_msecs: 250,
            }
        );
        assert!(opts.restore.partial_recovery);
        assert!(!opts.restore.use_database_location_path);
    }

    #[test]
    fn empty_text_is_defaults() {
        assert_eq!(OptionDefaults::parse("").unwrap(), OptionDefaults::default());
        assert_eq!(
            OptionDefaults::parse("\n# only a comment\n\n").unwrap(),
            OptionDefaults::default()
        );
    }

    fn error_line(text: &str) -> usize {
        match OptionDefaults::parse(text) {
            Err(CoreError::InvalidOptions { line, .. }) => line,
            other => panic!("expected option error, got {other:?}"),
        }
    }

    #[test]
    fn errors_name_the_line() {
        assert_eq!(error_line("[backup]\ncompress = yes\n"), 2);
        assert_eq!(error_line("[backup]\n\nbogus = 1\n"), 3);
        assert_eq!(error_line("compress = 1\n"), 1);
        assert_eq!(error_line("[archive]\n"), 1);
        assert_eq!(error_line("[backup\n"), 1);
        assert_eq!(error_line("[backup]\ncompress\n"), 2);
        assert_eq!(error_line("[backup]\ncompress =\n"), 2);
        assert_eq!(error_line("[restore]\ncompress = 1\n"), 2);
        assert_eq!(error_line("[backup]\nthread_count = -3\n"), 2);
        assert_eq!(error_line("[backup]\nthread_count = 99999999999\n"), 2);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let opts = OptionDefaults::load(&dir.path().join("absent.conf")).unwrap();
        assert_eq!(opts, OptionDefaults::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dbstream.conf");
        std::fs::write(&path, SAMPLE).unwrap();
        let opts = OptionDefaults::load(&path).unwrap();
        assert_eq!(opts.backup.sleep_msecs, 250);
    }

    #[test]
    fn overrides_win_over_defaults() {
        let opts = OptionDefaults::parse(SAMPLE).unwrap();
        let resolved = opts.resolve(
            &BackupOptions::new()
                .remove_archive(OptionOverride::On)
                .no_check(OptionOverride::Off),
        );
        assert!(resolved.remove_archive);
        assert!(!resolved.sa_mode);
        assert!(!resolved.no_check);
        assert!(resolved.compress);
        assert_eq!(resolved.thread_count, 4);
        assert_eq!(resolved.sleep_msecs, 250);
    }

    proptest! {
        #[test]
        fn integers_in_range_parse(n in 0u32..=i32::MAX as u32) {
            let text = format!("[backup]\nthread_count = {n}\n");
            let opts = OptionDefaults::parse(&text).unwrap();
            prop_assert_eq!(opts.backup.thread_count, n);
        }

        #[test]
        fn integers_past_i32_are_rejected(n in (i32::MAX as u64 + 1)..u64::MAX) {
            let text = format!("[backup]\nsleep_msecs = {n}\n");
            prop_assert!(OptionDefaults::parse(&text).is_err());
        }
    }
}
