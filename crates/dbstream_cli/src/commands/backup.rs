//! Backup command.
//!
//! Drives a complete backup through the library: initialize, begin, read
//! until end-of-stream, end, finalize.

use dbstream_core::{ApiContext, BackupLevel, BackupOptions, Config, OptionOverride};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Option overrides taken from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// `--remove-archive`
    pub remove_archive: OptionOverride,
    /// `--sa-mode`
    pub sa_mode: OptionOverride,
    /// `--no-check`
    pub no_check: OptionOverride,
    /// `--compress`
    pub compress: OptionOverride,
}

impl From<Overrides> for BackupOptions {
    fn from(o: Overrides) -> Self {
        BackupOptions::new()
            .remove_archive(o.remove_archive)
            .sa_mode(o.sa_mode)
            .no_check(o.no_check)
            .compress(o.compress)
    }
}

/// Streams a backup of `db` into `output`.
pub fn run(
    config: Config,
    db: &str,
    level: i32,
    output: &Path,
    buffer_size: usize,
    overrides: Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = BackupLevel::try_from(level)?;
    if buffer_size == 0 {
        return Err("Buffer size must be greater than zero".into());
    }

    let ctx = ApiContext::new(config);
    ctx.initialize()?;

    info!("Backing up {} ({}) into {:?}", db, level, output);
    let started = Instant::now();
    let handle = ctx.backup_begin(level, db, overrides.into())?;

    let streamed = stream(&ctx, &handle, output, buffer_size);
    if let Err(e) = ctx.backup_end(&handle) {
        warn!("Failed to end backup cleanly: {}", e);
    }
    ctx.finalize()?;
    let bytes = streamed?;

    println!("✓ Backup streamed successfully");
    println!("  Database: {}", db);
    println!("  Level: {}", level);
    println!("  Output: {:?}", output);
    println!("  Size: {} bytes", bytes);
    println!("  Elapsed: {:.2?}", started.elapsed());

    Ok(())
}

fn stream(
    ctx: &ApiContext,
    handle: &dbstream_core::BackupHandle,
    output: &Path,
    buffer_size: usize,
) -> Result<u64, Box<dyn std::error::Error>> {
    let mut file = fs::File::create(output)?;
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let outcome = ctx.backup_read(handle, &mut buf)?;
        if outcome.end_of_stream {
            break;
        }
        file.write_all(&buf[..outcome.bytes_read])?;
        total += outcome.bytes_read as u64;
    }

    file.sync_all()?;
    Ok(total)
}
