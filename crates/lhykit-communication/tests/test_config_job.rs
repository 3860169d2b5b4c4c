use lhykit_communication::{
    shared_sink, BufferedPipe, DriverCommand, DriverSetting, DriverWorker, LihuiyuDriver,
    StaticSpeedCode,
};
use lhykit_core::NativePosition;
use lhykit_settings::{DeviceConfig, JogMode};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_saved_config_drives_worker() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("device.toml");
    let config = DeviceConfig {
        board: "B2".to_string(),
        autolock: false,
        opt_jog_mode: JogMode::FinishOut,
        hold_poll_interval_ms: 1,
        ..DeviceConfig::default()
    };
    config.save_to_file(&path).unwrap();
    let loaded = DeviceConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);

    let pipe = BufferedPipe::new();
    let driver = LihuiyuDriver::new(loaded, shared_sink(pipe.clone()), StaticSpeedCode::default());
    let worker = DriverWorker::spawn(driver).unwrap();
    worker
        .submit(DriverCommand::Set(DriverSetting::Relative(true)))
        .unwrap();
    worker.submit(DriverCommand::Jog { x: 3, y: 0 }).unwrap();
    worker.submit(DriverCommand::Jog { x: 3, y: 0 }).unwrap();
    worker.submit(DriverCommand::Home).unwrap();

    let mut received = Vec::new();
    for _ in 0..2000 {
        received.extend(pipe.drain());
        if received.len() >= 28 {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    let driver = worker.shutdown().unwrap();
    received.extend(pipe.drain());

    assert_eq!(driver.native_position(), NativePosition::default());
    assert_eq!(
        String::from_utf8(received).unwrap(),
        "IBcS1P\nIS2P\nIBcS1P\nIS2P\nIPP\n"
    );
}
