//! Restore command.

use dbstream_core::{ApiContext, BackupLevel, Config, RestoreKind};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Writes the backup file `input` into `target` through the restore sink.
pub fn run(
    config: Config,
    db: &str,
    level: i32,
    input: &Path,
    target: &Path,
    buffer_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = BackupLevel::try_from(level)?;
    if buffer_size == 0 {
        return Err("Buffer size must be greater than zero".into());
    }
    let mut file = fs::File::open(input)?;

    let ctx = ApiContext::new(config);
    ctx.initialize()?;

    info!("Restoring {:?} into {:?}", input, target);
    let handle = ctx.restore_begin(level, db, RestoreKind::ToFile, target)?;

    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    let copied: Result<(), Box<dyn std::error::Error>> = loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e.into()),
        };
        if let Err(e) = ctx.restore_write(&handle, level, &buf[..n]) {
            break Err(e.into());
        }
        total += n as u64;
    };

    if let Err(e) = ctx.restore_end(&handle) {
        warn!("Failed to end restore cleanly: {}", e);
        copied?;
        return Err(e.into());
    }
    ctx.finalize()?;
    copied?;

    println!("✓ Restore written successfully");
    println!("  Database: {}", db);
    println!("  Level: {}", level);
    println!(
        "  Path: {:?}",
        target.join(dbstream_core::backup_file_name(db, level))
    );
    println!("  Size: {} bytes", total);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn copies_input_into_target() {
        let work = tempdir().unwrap();
        let target = tempdir().unwrap();
        let input = work.path().join("input.bk");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&input, &payload).unwrap();

        let config = Config::new().utility("/bin/false").work_dir(work.path());
        run(config, "demodb", 1, &input, target.path(), 333).unwrap();

        let restored = fs::read(target.path().join("demodb_bk1v000")).unwrap();
        assert_eq!(restored, payload);
    }
}
