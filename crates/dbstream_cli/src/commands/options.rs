//! Options command implementation.

use dbstream_core::OptionDefaults;
use serde::Serialize;
use std::path::Path;

/// Option file contents as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct OptionsReport {
    /// Option file path.
    pub path: String,
    /// Whether the file exists (defaults are shown otherwise).
    pub exists: bool,
    /// `[backup]` section.
    pub backup: BackupSection,
    /// `[restore]` section.
    pub restore: RestoreSection,
}

/// `[backup]` values.
#[derive(Debug, Serialize)]
pub struct BackupSection {
    /// remove_archive
    pub remove_archive: bool,
    /// sa_mode
    pub sa_mode: bool,
    /// no_check
    pub no_check: bool,
    /// thread_count
    pub thread_count: u32,
    /// compress
    pub compress: bool,
    /// except_active_log
    pub except_active_log: bool,
    /// sleep_msecs
    pub sleep_msecs: u32,
}

/// `[restore]` values.
#[derive(Debug, Serialize)]
pub struct RestoreSection {
    /// partial_recovery
    pub partial_recovery: bool,
    /// use_database_location_path
    pub use_database_location_path: bool,
}

impl OptionsReport {
    fn new(path: &Path, defaults: &OptionDefaults) -> Self {
        let b = &defaults.backup;
        let r = &defaults.restore;
        Self {
            path: path.display().to_string(),
            exists: path.exists(),
            backup: BackupSection {
                remove_archive: b.remove_archive,
                sa_mode: b.sa_mode,
                no_check: b.no_check,
                thread_count: b.thread_count,
                compress: b.compress,
                except_active_log: b.except_active_log,
                sleep_msecs: b.sleep_msecs,
            },
            restore: RestoreSection {
                partial_recovery: r.partial_recovery,
                use_database_location_path: r.use_database_location_path,
            },
        }
    }
}

/// Runs the options command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let defaults = OptionDefaults::load(path)?;
    let report = OptionsReport::new(path, &defaults);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => print_text_output(&report),
    }

    Ok(())
}

fn print_text_output(report: &OptionsReport) {
    println!("Option file: {}", report.path);
    if !report.exists {
        println!("  (not found, showing defaults)");
    }
    println!();
    println!("[backup]");
    let b = &report.backup;
    println!("  remove_archive     = {}", b.remove_archive);
    println!("  sa_mode            = {}", b.sa_mode);
    println!("  no_check           = {}", b.no_check);
    println!("  thread_count       = {}", b.thread_count);
    println!("  compress           = {}", b.compress);
    println!("  except_active_log  = {}", b.except_active_log);
    println!("  sleep_msecs        = {}", b.sleep_msecs);
    println!();
    println!("[restore]");
    let r = &report.restore;
    println!("  partial_recovery           = {}", r.partial_recovery);
    println!("  use_database_location_path = {}", r.use_database_location_path);
}
