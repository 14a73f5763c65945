//! Workflow tests against the emulated controller
//!
//! These drive the public `Device` operations end to end and assert on the
//! exact register traffic the emulator recorded.

use rdprog_core::programmer::ProgressReport;
use rdprog_core::{regs, Device, DeviceConfig, Error, PollConfig, ReadProtectionLevel};
use rdprog_dummy::{DummyConfig, DummyFileProgrammer, DummyProbe};
use std::path::PathBuf;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> DeviceConfig {
    let fast = PollConfig {
        poll_delay_us: 0,
        timeout_us: 64,
    };
    DeviceConfig {
        busy_wait: fast,
        halt_wait: fast,
        settle_delay_ms: 0,
        ..DeviceConfig::default()
    }
}

fn device_with(config: DummyConfig) -> (Device<DummyProbe>, rdprog_dummy::DummyHandle) {
    let probe = DummyProbe::new(config);
    let handle = probe.handle();
    (Device::with_config(probe, test_config()), handle)
}

#[test]
fn enable_then_check_from_level0() {
    init_logs();
    let (mut device, handle) = device_with(DummyConfig::default());

    device.enable_rdp().unwrap();

    // The load launch reset the MCU: locks back, new level committed.
    assert!(handle.is_locked());
    assert_eq!(handle.committed_optr() & regs::OPTR_RDP_MASK, 0xBB);

    device.check_rdp(ReadProtectionLevel::Level1).unwrap();
}

#[test]
fn disable_then_check_from_level1() {
    init_logs();
    let (mut device, handle) = device_with(DummyConfig {
        rdp_byte: 0xBB,
        ..DummyConfig::default()
    });

    device.disable_rdp().unwrap();

    assert_eq!(handle.committed_optr() & regs::OPTR_RDP_MASK, 0xAA);
    device.check_rdp(ReadProtectionLevel::Level0).unwrap();
}

#[test]
fn enable_is_idempotent_at_level1() {
    init_logs();
    let (mut device, handle) = device_with(DummyConfig::default());

    device.enable_rdp().unwrap();
    let key_writes = handle.write_count(regs::FLASH_KEYR);
    let optkey_writes = handle.write_count(regs::FLASH_OPTKEYR);
    assert_eq!(key_writes, 2);
    assert_eq!(optkey_writes, 2);

    // Already at level 1: no unlock, no key traffic.
    device.enable_rdp().unwrap();
    assert_eq!(handle.write_count(regs::FLASH_KEYR), key_writes);
    assert_eq!(handle.write_count(regs::FLASH_OPTKEYR), optkey_writes);
}

#[test]
fn level2_fails_every_workflow_without_writes() {
    init_logs();

    let workflows: Vec<fn(&mut Device<DummyProbe>) -> rdprog_core::Result<()>> = vec![
        |d| d.enable_rdp(),
        |d| d.disable_rdp(),
        |d| d.check_rdp(ReadProtectionLevel::Level1),
        |d| d.check_rdp(ReadProtectionLevel::Level2),
    ];

    for workflow in workflows {
        let (mut device, handle) = device_with(DummyConfig {
            rdp_byte: 0xCC,
            ..DummyConfig::default()
        });

        match workflow(&mut device) {
            Err(Error::DeviceLocked) => {}
            other => panic!("expected DeviceLocked, got {:?}", other),
        }

        assert_eq!(handle.write_count(regs::FLASH_KEYR), 0);
        assert_eq!(handle.write_count(regs::FLASH_OPTKEYR), 0);
        assert_eq!(handle.write_count(regs::FLASH_CR), 0);
        assert_eq!(handle.write_count(regs::FLASH_OPTR), 0);
    }
}

#[test]
fn unknown_rdp_byte_is_fatal() {
    init_logs();

    for byte in [0x00u8, 0x5A, 0xFF] {
        let (mut device, _) = device_with(DummyConfig {
            rdp_byte: byte,
            ..DummyConfig::default()
        });

        match device.enable_rdp() {
            Err(Error::UnknownProtectionLevel { byte: b }) => assert_eq!(b, byte),
            other => panic!("expected UnknownProtectionLevel, got {:?}", other),
        }
        match device.disable_rdp() {
            Err(Error::UnknownProtectionLevel { .. }) => {}
            other => panic!("expected UnknownProtectionLevel, got {:?}", other),
        }
        match device.check_rdp(ReadProtectionLevel::Level0) {
            Err(Error::UnknownProtectionLevel { .. }) => {}
            other => panic!("expected UnknownProtectionLevel, got {:?}", other),
        }
    }
}

#[test]
fn check_reports_mismatch() {
    init_logs();
    let (mut device, _) = device_with(DummyConfig::default());

    match device.check_rdp(ReadProtectionLevel::Level1) {
        Err(Error::ProtectionLevelMismatch { expected, actual }) => {
            assert_eq!(expected, ReadProtectionLevel::Level1);
            assert_eq!(actual, ReadProtectionLevel::Level0);
        }
        other => panic!("expected ProtectionLevelMismatch, got {:?}", other),
    }
}

/// Records every reported fraction
struct RecordingProgress(Vec<f64>);

impl ProgressReport for RecordingProgress {
    fn progress(&mut self, fraction: f64) {
        self.0.push(fraction);
    }
}

#[test]
fn program_with_missing_file_touches_no_transport() {
    init_logs();
    let (mut device, handle) = device_with(DummyConfig::default());
    let mut programmer = DummyFileProgrammer::default();
    let mut progress = RecordingProgress(Vec::new());

    let missing = PathBuf::from("/nonexistent/firmware.bin");
    match device.program_device(&missing, &mut programmer, &mut progress) {
        Err(Error::FileNotFound(path)) => assert_eq!(path, missing),
        other => panic!("expected FileNotFound, got {:?}", other),
    }

    assert_eq!(handle.sessions_opened(), 0);
    assert!(handle.writes().is_empty());
    assert!(progress.0.is_empty());
}

#[test]
fn program_writes_image_and_reports_progress() {
    init_logs();
    let (mut device, handle) = device_with(DummyConfig::default());
    let mut programmer = DummyFileProgrammer::new(256);
    let mut progress = RecordingProgress(Vec::new());

    let image: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let path = std::env::temp_dir().join("rdprog-workflow-program.bin");
    std::fs::write(&path, &image).unwrap();

    device
        .program_device(&path, &mut programmer, &mut progress)
        .unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(&handle.flash()[..image.len()], &image[..]);
    assert_eq!(handle.sessions_opened(), 1);

    // One fraction per page, monotonically increasing, ending at 1.0.
    assert_eq!(progress.0.len(), 4);
    assert!(progress.0.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*progress.0.last().unwrap(), 1.0);
}

#[test]
fn uuid_words_come_back_in_read_order() {
    init_logs();
    let (mut device, handle) = device_with(DummyConfig {
        uuid: [0x1122_3344, 0x5566_7788, 0x99AA_BBCC],
        ..DummyConfig::default()
    });

    let uuid = device.read_uuid().unwrap();
    assert_eq!(uuid.words(), &[0x1122_3344, 0x5566_7788, 0x99AA_BBCC]);
    assert_eq!(uuid.to_string(), "11223344-55667788-99aabbcc");

    // Query only; no register writes.
    assert!(handle.writes().is_empty());
}

#[test]
fn halt_that_never_happens_times_out() {
    init_logs();
    let (mut device, _) = device_with(DummyConfig {
        halt_polls: u32::MAX,
        ..DummyConfig::default()
    });

    match device.enable_rdp() {
        Err(Error::TransportTimeout { .. }) => {}
        other => panic!("expected TransportTimeout, got {:?}", other),
    }
}

#[test]
fn run_each_drives_every_probe_independently() {
    init_logs();

    let protected = DummyProbe::new(DummyConfig {
        rdp_byte: 0xBB,
        ..DummyConfig::default()
    });
    let unprotected = DummyProbe::new_default();

    let results = rdprog_core::run_each(
        vec![protected, unprotected],
        &test_config(),
        |device| device.check_rdp(ReadProtectionLevel::Level1),
    );

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(Error::ProtectionLevelMismatch { .. }) => {}
        other => panic!("expected ProtectionLevelMismatch, got {:?}", other),
    }
}
