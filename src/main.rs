use anyhow::Context;
use lhykit::{
    init_logging, shared_sink, BufferedPipe, CutPrimitive, DeviceConfig, DriverCommand,
    DriverWorker, LaserSettings, LihuiyuDriver, NativePosition, StaticSpeedCode, BUILD_DATE,
    VERSION,
};
use lhykit_core::units::{mm_to_native, native_to_mm};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Bytes the stand-in device consumes per drain cycle
const DRAIN_CHUNK: usize = 256;

fn load_config() -> anyhow::Result<DeviceConfig> {
    match DeviceConfig::default_path() {
        Ok(path) if path.exists() => DeviceConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display())),
        _ => Ok(DeviceConfig::default()),
    }
}

/// Closed square with its top left corner at `(x_mm, y_mm)`
fn frame(config: &DeviceConfig, x_mm: f64, y_mm: f64, size_mm: f64) -> Vec<CutPrimitive> {
    let native = |mm: f64| mm_to_native(mm, config.native_units_per_mm).round() as i64;
    let (left, top) = (native(x_mm), native(y_mm));
    let (right, bottom) = (native(x_mm + size_mm), native(y_mm + size_mm));
    let corners = [
        NativePosition::new(left, top),
        NativePosition::new(right, top),
        NativePosition::new(right, bottom),
        NativePosition::new(left, bottom),
        NativePosition::new(left, top),
    ];
    let settings = Arc::new(LaserSettings {
        power: 600.0,
        speed: 15.0,
        ..LaserSettings::default()
    });
    corners
        .windows(2)
        .map(|edge| CutPrimitive::line(edge[0], edge[1], Arc::clone(&settings)))
        .collect()
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("LhyKit {} (built {})", VERSION, BUILD_DATE);

    let config = load_config()?;
    tracing::info!("Board {}, {} units/mm", config.board, config.native_units_per_mm);

    let pipe = BufferedPipe::new();
    let driver = LihuiyuDriver::new(
        config.clone(),
        shared_sink(pipe.clone()),
        StaticSpeedCode::default(),
    );
    let worker = DriverWorker::spawn(driver)?;

    // Stand-in for the board: consume the pipe in chunks.
    let running = Arc::new(AtomicBool::new(true));
    let device = {
        let pipe = pipe.clone();
        let running = Arc::clone(&running);
        std::thread::Builder::new()
            .name("lhy-device".to_string())
            .spawn(move || {
                let mut received = Vec::new();
                while running.load(Ordering::SeqCst) || !pipe.peek().is_empty() {
                    received.extend(pipe.consume(DRAIN_CHUNK));
                    std::thread::sleep(Duration::from_millis(2));
                }
                received
            })?
    };

    worker.submit(DriverCommand::Plot(frame(&config, 10.0, 10.0, 20.0)))?;
    worker.submit(DriverCommand::MoveAbsolute {
        x_mm: 0.0,
        y_mm: 0.0,
    })?;
    worker.submit(DriverCommand::Status)?;
    let driver = worker.shutdown()?;

    running.store(false, Ordering::SeqCst);
    let received = device
        .join()
        .map_err(|_| anyhow::anyhow!("device thread panicked"))?;

    let head = driver.native_position();
    let mm = |value: i64| native_to_mm(value as f64, config.native_units_per_mm);
    tracing::info!(
        "Sent {} bytes, head at {:.2}mm, {:.2}mm",
        received.len(),
        mm(head.x),
        mm(head.y)
    );
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&received)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
