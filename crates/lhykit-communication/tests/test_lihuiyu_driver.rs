use lhykit_communication::{
    shared_sink, DriverCommand, DriverWorker, LihuiyuDriver, OutputSink, RecordingClock,
    StaticSpeedCode,
};
use lhykit_core::{
    thread_safe_vec, ConnectionError, DriverEvent, DriverMode, LaserSettings, NativePosition,
    ThreadSafeVec,
};
use lhykit_planner::{CutPrimitive, RasterDirection, RasterImage};
use lhykit_settings::DeviceConfig;
use std::sync::Arc;
use std::time::Duration;

/// Device that consumes everything immediately and keeps each fragment
struct InstantDevice {
    fragments: ThreadSafeVec<Vec<u8>>,
}

impl OutputSink for InstantDevice {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        self.fragments.lock().push(bytes.to_vec());
        Ok(())
    }

    fn len(&self) -> usize {
        0
    }
}

fn driver() -> (LihuiyuDriver, ThreadSafeVec<Vec<u8>>) {
    let fragments = thread_safe_vec();
    let sink = shared_sink(InstantDevice {
        fragments: Arc::clone(&fragments),
    });
    let driver = LihuiyuDriver::new(DeviceConfig::default(), sink, StaticSpeedCode::new("CV"));
    (driver, fragments)
}

fn joined(fragments: &ThreadSafeVec<Vec<u8>>) -> String {
    String::from_utf8(fragments.lock().concat()).unwrap()
}

#[test]
fn test_line_returns_to_rapid() {
    let (mut driver, fragments) = driver();
    let settings = Arc::new(LaserSettings::default());
    driver
        .plot(CutPrimitive::line(
            NativePosition::new(0, 0),
            NativePosition::new(10, 0),
            settings,
        ))
        .unwrap();
    driver.plot_start().unwrap();

    assert_eq!(driver.state(), DriverMode::Rapid);
    assert_eq!(driver.native_position(), NativePosition::new(10, 0));
    assert!(!driver.laser());
    assert_eq!(joined(&fragments), "ICVCNRBS1EDjFNSE-\n");
}

#[test]
fn test_dwell_fires_in_rapid() {
    let (driver, fragments) = driver();
    let clock = RecordingClock::new();
    let mut driver = driver.with_clock(Arc::new(clock.clone()));
    let mut rx = driver.events().subscribe();

    driver
        .plot(CutPrimitive::Dwell {
            start: NativePosition::new(5, 5),
            dwell_time_ms: 50,
        })
        .unwrap();

    assert!(clock.total() >= Duration::from_millis(50));
    assert_eq!(driver.native_position(), NativePosition::new(5, 5));
    assert!(!driver.laser());

    let bytes = joined(&fragments);
    assert_eq!(bytes, "IBeReS1P\nIDS1P\nIUS1P\n");
    let on = bytes.find('D').unwrap();
    let off = bytes.find('U').unwrap();
    assert!(on < off);

    while let Ok(event) = rx.try_recv() {
        if let DriverEvent::ModeChanged(mode) = event {
            assert!(!mode.is_programmed(), "dwell entered {}", mode);
        }
    }
}

#[test]
fn test_raster_alternates_lines() {
    let (mut driver, fragments) = driver();
    let settings = Arc::new(LaserSettings {
        raster_step_y: 2.0,
        ..LaserSettings::default()
    });
    let image = RasterImage::new(4, 3, vec![0; 12]).unwrap();
    driver
        .plot(CutPrimitive::raster(
            NativePosition::new(0, 0),
            image,
            RasterDirection::TopToBottom,
            settings,
        ))
        .unwrap();
    driver.plot_start().unwrap();

    // Firmware steps 2 on every reversal; no relocation is needed.
    assert_eq!(joined(&fragments), "ICVG002NRBS1EDdTDdBDdFNSE-\n");
    assert_eq!(driver.step_index(), 2);
    assert_eq!(driver.native_position(), NativePosition::new(4, 4));
    assert_eq!(driver.state(), DriverMode::Rapid);
}

#[test]
fn test_vertical_raster_with_only_y_step() {
    let (mut driver, fragments) = driver();
    let settings = Arc::new(LaserSettings {
        raster_step_y: 2.0,
        ..LaserSettings::default()
    });
    let image = RasterImage::new(4, 3, vec![0; 12]).unwrap();
    driver
        .plot(CutPrimitive::raster(
            NativePosition::new(0, 0),
            image,
            RasterDirection::LeftToRight,
            settings,
        ))
        .unwrap();
    driver.plot_start().unwrap();

    // Columns sit one firmware step apart, so the program is declared once.
    let bytes = joined(&fragments);
    assert_eq!(bytes, "ICVG002NBRS1EDfLDfRDfLDfFNSE-\n");
    assert!(!bytes.contains("@NSE"));
    assert_eq!(driver.step_index(), 3);
    assert_eq!(driver.native_position(), NativePosition::new(6, 0));
}

#[test]
fn test_swing_raster_returns_with_laser_off() {
    let (mut driver, fragments) = driver();
    let settings = Arc::new(LaserSettings {
        raster_step_y: 2.0,
        raster_swing: true,
        ..LaserSettings::default()
    });
    let image = RasterImage::new(2, 2, vec![0; 4]).unwrap();
    driver
        .plot(CutPrimitive::raster(
            NativePosition::new(0, 0),
            image,
            RasterDirection::TopToBottom,
            settings,
        ))
        .unwrap();
    driver.plot_start().unwrap();

    // Both lines burn rightwards; the step is commanded inside `N..SE`.
    assert_eq!(joined(&fragments), "ICVNRBS1EDbBNRbSEbTNSEDbFNSE-\n");
    assert_eq!(driver.step_index(), 2);
    assert_eq!(driver.native_position(), NativePosition::new(2, 2));
    assert_eq!(driver.state(), DriverMode::Rapid);
}

#[test]
fn test_home_and_rail() {
    let (mut driver, fragments) = driver();
    driver.move_native(40, 40).unwrap();
    driver.plot(CutPrimitive::Home).unwrap();
    driver.unlock_rail().unwrap();
    driver.lock_rail().unwrap();

    assert_eq!(driver.native_position(), NativePosition::default());
    assert!(joined(&fragments).ends_with("IPP\nIS2P\nIS1P\n"));
}

#[test]
fn test_goto_relative_to_origin() {
    let (mut driver, fragments) = driver();
    driver
        .plot(CutPrimitive::SetOrigin {
            start: Some(NativePosition::new(100, 0)),
            set_current: false,
        })
        .unwrap();
    driver
        .plot(CutPrimitive::Goto {
            start: NativePosition::new(0, 20),
        })
        .unwrap();

    assert_eq!(driver.origin(), NativePosition::new(100, 0));
    assert_eq!(driver.native_position(), NativePosition::new(100, 20));
    assert_eq!(joined(&fragments), "IB100RtS1P\n");
}

fn square() -> Vec<CutPrimitive> {
    let settings = Arc::new(LaserSettings::with_speed(30.0));
    let corners = [
        NativePosition::new(0, 0),
        NativePosition::new(400, 0),
        NativePosition::new(400, 400),
        NativePosition::new(0, 400),
        NativePosition::new(0, 0),
    ];
    (0..20)
        .flat_map(|_| {
            corners
                .windows(2)
                .map(|edge| CutPrimitive::line(edge[0], edge[1], Arc::clone(&settings)))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn test_realtime_never_splits_fragments() {
    // Reference run without interruptions.
    let (mut reference, reference_fragments) = driver();
    for cut in square() {
        reference.plot(cut).unwrap();
    }
    reference.plot_start().unwrap();
    let expected = joined(&reference_fragments);

    let (driver, fragments) = driver();
    let worker = DriverWorker::spawn(driver).unwrap();
    let realtime = worker.realtime();
    worker.submit(DriverCommand::Plot(square())).unwrap();
    for _ in 0..20 {
        realtime.pause().unwrap();
        realtime.resume().unwrap();
    }
    worker.shutdown().unwrap();

    let fragments = fragments.lock().clone();
    let realtime_bytes: [&[u8]; 2] = [b"~PN!\n~", b"~PN&\n~"];
    let (realtime_fragments, driver_fragments): (Vec<_>, Vec<_>) = fragments
        .into_iter()
        .partition(|fragment| realtime_bytes.contains(&fragment.as_slice()));
    assert_eq!(realtime_fragments.len(), 40);
    assert_eq!(String::from_utf8(driver_fragments.concat()).unwrap(), expected);
}
