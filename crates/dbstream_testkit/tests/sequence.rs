//! Call ordering across the public API.

use dbstream_core::{BackupHandle, RestoreHandle};
use dbstream_testkit::prelude::*;

#[test]
fn every_call_fails_before_initialize() {
    let env = TestEnv::new(UtilityMode::Emit(Vec::new()));
    let mut buf = [0u8; 16];

    assert!(matches!(
        env.backup_begin(BackupLevel::Full, "demodb", BackupOptions::new()),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.backup_read(&BackupHandle::null(), &mut buf),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.backup_end(&BackupHandle::null()),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target()),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.restore_write(&RestoreHandle::null(), BackupLevel::Full, b"x"),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.restore_end(&RestoreHandle::null()),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(env.finalize(), Err(CoreError::Sequence { .. })));
    assert_eq!(env.state(), ApiState::NotReady);
}

#[test]
fn double_initialize_and_finalize() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    assert!(matches!(env.initialize(), Err(CoreError::Sequence { .. })));
    assert_eq!(env.state(), ApiState::Ready);

    env.finalize().unwrap();
    assert!(matches!(env.finalize(), Err(CoreError::Sequence { .. })));

    env.initialize().unwrap();
    assert_eq!(env.state(), ApiState::Ready);
}

#[test]
fn out_of_range_arguments_are_rejected() {
    assert!(matches!(
        BackupLevel::try_from(1004),
        Err(CoreError::InvalidArgument { .. })
    ));
    assert!(BackupLevel::try_from(-1).is_err());
    for raw in [7, -20, 77] {
        assert!(matches!(
            OptionOverride::try_from(raw),
            Err(CoreError::InvalidArgument { .. })
        ));
    }
    assert_eq!(OptionOverride::try_from(-1).unwrap(), OptionOverride::Default);
}

#[test]
fn second_backup_begin_is_a_sequence_error() {
    let env = TestEnv::ready(UtilityMode::Stall);
    let handle = env
        .backup_begin(BackupLevel::Full, "demodb", BackupOptions::new())
        .unwrap();
    assert_eq!(env.state(), ApiState::BackupService);

    assert!(matches!(
        env.backup_begin(BackupLevel::Full, "otherdb", BackupOptions::new()),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target()),
        Err(CoreError::Sequence { .. })
    ));
    assert_eq!(env.state(), ApiState::BackupService);

    env.backup_end(&handle).unwrap();
    assert_eq!(env.state(), ApiState::Ready);
    assert!(matches!(
        env.backup_end(&handle),
        Err(CoreError::Sequence { .. })
    ));
}

#[test]
fn backup_calls_are_rejected_during_restore() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let handle = env
        .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target())
        .unwrap();
    let mut buf = [0u8; 16];

    assert!(matches!(
        env.backup_begin(BackupLevel::Full, "demodb", BackupOptions::new()),
        Err(CoreError::Sequence { .. })
    ));
    assert!(matches!(
        env.backup_read(&BackupHandle::null(), &mut buf),
        Err(CoreError::Sequence { .. })
    ));
    assert_eq!(env.state(), ApiState::RestoreService);

    env.restore_end(&handle).unwrap();
}

#[test]
fn null_handle_is_invalid_in_service() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let handle = env
        .restore_begin(BackupLevel::Full, "demodb", RestoreKind::ToFile, env.target())
        .unwrap();

    assert!(matches!(
        env.restore_write(&RestoreHandle::null(), BackupLevel::Full, b"x"),
        Err(CoreError::InvalidHandle { .. })
    ));
    assert!(matches!(
        env.restore_end(&RestoreHandle::null()),
        Err(CoreError::InvalidHandle { .. })
    ));
    assert_eq!(env.state(), ApiState::RestoreService);

    env.restore_end(&handle).unwrap();
    assert_eq!(env.state(), ApiState::Ready);
}

#[test]
fn dropping_an_initialized_context_cleans_up() {
    let env = TestEnv::ready(UtilityMode::Emit(Vec::new()));
    let work_dir = env.work_dir();
    assert!(work_dir.is_dir());

    let TestEnv { ctx, .. } = env;
    drop(ctx);
    assert!(!work_dir.exists());
}
