//! Restore streams written through the public API.

use dbstream_testkit::prelude::*;
use std::os::unix::fs::PermissionsExt;

#[test]
fn repeated_writes_are_appended() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let handle = env
        .restore_begin(BackupLevel::SmallIncrement, "demodb", RestoreKind::ToFile, env.target())
        .unwrap();
    assert_eq!(env.state(), ApiState::RestoreService);

    let payload = pattern_bytes(50_000);
    for chunk in payload.chunks(7_000) {
        env.restore_write(&handle, BackupLevel::SmallIncrement, chunk)
            .unwrap();
    }
    env.restore_write(&handle, BackupLevel::SmallIncrement, &[])
        .unwrap();
    env.restore_end(&handle).unwrap();
    assert_eq!(env.state(), ApiState::Ready);

    let path = env.target().join("demodb_bk2v000");
    assert_eq!(std::fs::read(&path).unwrap(), payload);
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn existing_file_is_truncated() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let path = env.target().join("demodb_bk0v000");
    std::fs::write(&path, vec![0xAA; 10_000]).unwrap();

    let handle = env
        .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target())
        .unwrap();
    env.restore_write(&handle, BackupLevel::Full, b"fresh").unwrap();
    env.restore_end(&handle).unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
}

#[test]
fn level_mismatch_is_rejected() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let handle = env
        .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target())
        .unwrap();

    assert!(matches!(
        env.restore_write(&handle, BackupLevel::BigIncrement, b"data"),
        Err(CoreError::InvalidArgument { .. })
    ));
    env.restore_write(&handle, BackupLevel::Full, b"data").unwrap();
    env.restore_end(&handle).unwrap();

    assert_eq!(
        std::fs::read(env.target().join("demodb_bk0v000")).unwrap(),
        b"data"
    );
}

#[test]
fn restore_to_database_is_unsupported() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    assert!(matches!(
        env.restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToDatabase, env.target()),
        Err(CoreError::Unsupported { .. })
    ));
    assert_eq!(env.state(), ApiState::Ready);
}

#[test]
fn unusable_target_directory_is_rejected() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let missing = env.target().join("missing");
    assert!(matches!(
        env.restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, &missing),
        Err(CoreError::InvalidArgument { .. })
    ));

    let file = env.target().join("plain_file");
    std::fs::write(&file, b"x").unwrap();
    assert!(matches!(
        env.restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, &file),
        Err(CoreError::InvalidArgument { .. })
    ));
    assert_eq!(env.state(), ApiState::Ready);
}

#[test]
fn backup_stream_restores_byte_for_byte() {
    let payload = pattern_bytes(120_000);
    let env = TestEnv::ready(UtilityMode::Emit(payload.clone()));

    let backup = env
        .backup_begin(BackupLevel::Full, "demodb", BackupOptions::new())
        .unwrap();
    let streamed = drain_backup(&env, &backup, 16 * 1024).unwrap();
    env.backup_end(&backup).unwrap();

    let restore = env
        .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target())
        .unwrap();
    for chunk in streamed.chunks(9_999) {
        env.restore_write(&restore, BackupLevel::Full, chunk).unwrap();
    }
    env.restore_end(&restore).unwrap();

    assert_eq!(
        std::fs::read(env.target().join("demodb_bk0v000")).unwrap(),
        payload
    );
}
