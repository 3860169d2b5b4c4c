//! Driver worker thread
//!
//! Owns a [`LihuiyuDriver`] on a dedicated thread and runs submitted jobs in
//! order. Backpressure holds block this thread only. Realtime commands go
//! through the [`RealtimeHandle`] and never queue behind jobs.
//!
//! A reset through the handle interrupts the running job and discards every
//! job submitted before it. Jobs submitted afterwards run normally.

use super::driver::{BlobType, DriverSetting, LihuiyuDriver};
use super::realtime::RealtimeHandle;
use lhykit_core::{DriverEvent, Error, EventDispatcher, Result};
use lhykit_planner::CutPrimitive;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Work the driver thread can run
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    /// Queue cut primitives and run them to completion
    Plot(Vec<CutPrimitive>),
    /// Rapid to a physical position
    MoveAbsolute { x_mm: f64, y_mm: f64 },
    /// Rapid by a physical displacement
    MoveRelative { dx_mm: f64, dy_mm: f64 },
    /// Rapid to a physical position relative to the origin
    MoveOrigin { x_mm: f64, y_mm: f64 },
    /// Jog to native coordinates
    Jog { x: i64, y: i64 },
    Home,
    LockRail,
    UnlockRail,
    /// Fire in place
    Dwell { time_ms: u64 },
    /// Update a driver parameter
    Set(DriverSetting),
    /// Set the origin in native coordinates
    SetOrigin { x: i64, y: i64 },
    /// Publish a status line
    Status,
    /// Forward pre-encoded data
    Blob(BlobType, Vec<u8>),
}

enum Envelope {
    Job {
        id: Uuid,
        generation: u64,
        command: DriverCommand,
    },
    Shutdown,
}

/// Handle to a driver running on its own thread
pub struct DriverWorker {
    tx: mpsc::UnboundedSender<Envelope>,
    handle: Option<std::thread::JoinHandle<LihuiyuDriver>>,
    realtime: RealtimeHandle,
    events: EventDispatcher,
}

impl DriverWorker {
    /// Move `driver` onto a new worker thread
    pub fn spawn(driver: LihuiyuDriver) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let realtime = driver.realtime();
        let events = driver.events().clone();
        let handle = std::thread::Builder::new()
            .name("lhy-driver".to_string())
            .spawn(move || run(driver, rx))?;
        tracing::info!("Driver worker started");
        Ok(Self {
            tx,
            handle: Some(handle),
            realtime,
            events,
        })
    }

    /// Queue a job, returning its id
    pub fn submit(&self, command: DriverCommand) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let generation = self.realtime.reset_count();
        self.tx
            .send(Envelope::Job {
                id,
                generation,
                command,
            })
            .map_err(|_| Error::other("driver worker is not running"))?;
        tracing::debug!("Queued job {}", id);
        Ok(id)
    }

    /// Realtime control of the running driver
    pub fn realtime(&self) -> RealtimeHandle {
        self.realtime.clone()
    }

    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Finish queued jobs, stop the thread and hand the driver back
    pub fn shutdown(mut self) -> Result<LihuiyuDriver> {
        let _ = self.tx.send(Envelope::Shutdown);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::other("driver worker already stopped"))?;
        handle
            .join()
            .map_err(|_| Error::other("driver worker panicked"))
    }
}

impl Drop for DriverWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.tx.send(Envelope::Shutdown);
        }
    }
}

impl std::fmt::Debug for DriverWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverWorker")
            .field("running", &self.handle.is_some())
            .field("realtime", &self.realtime)
            .finish()
    }
}

fn run(mut driver: LihuiyuDriver, mut rx: mpsc::UnboundedReceiver<Envelope>) -> LihuiyuDriver {
    let realtime = driver.realtime();
    let mut handled = 0;
    while let Some(envelope) = rx.blocking_recv() {
        let (id, generation, command) = match envelope {
            Envelope::Job {
                id,
                generation,
                command,
            } => (id, generation, command),
            Envelope::Shutdown => break,
        };

        let resets = realtime.reset_count();
        if resets != handled {
            driver.discard_work();
            handled = resets;
        }
        if generation < handled {
            tracing::debug!("Discarding job {} queued before reset", id);
            continue;
        }

        tracing::info!("Job {} started", id);
        match execute(&mut driver, command) {
            Ok(()) => tracing::info!("Job {} finished", id),
            Err(e) if e.is_cancelled() => {
                tracing::info!("Job {} cancelled", id);
                driver.discard_work();
                handled = realtime.reset_count();
            }
            Err(e) => {
                tracing::error!("Job {} aborted: {}", id, e);
                driver.events().publish(DriverEvent::JobAborted {
                    job: id,
                    reason: e.to_string(),
                });
                driver.discard_work();
            }
        }
    }
    tracing::info!("Driver worker stopped");
    driver
}

fn execute(driver: &mut LihuiyuDriver, command: DriverCommand) -> Result<()> {
    driver.wait_for_holds()?;
    match command {
        DriverCommand::Plot(cuts) => {
            for cut in cuts {
                driver.plot(cut)?;
            }
            driver.plot_start()
        }
        DriverCommand::MoveAbsolute { x_mm, y_mm } => driver.move_abs(x_mm, y_mm),
        DriverCommand::MoveRelative { dx_mm, dy_mm } => driver.move_rel(dx_mm, dy_mm),
        DriverCommand::MoveOrigin { x_mm, y_mm } => driver.move_ori(x_mm, y_mm),
        DriverCommand::Jog { x, y } => driver.jog(x, y),
        DriverCommand::Home => driver.home(),
        DriverCommand::LockRail => driver.lock_rail(),
        DriverCommand::UnlockRail => driver.unlock_rail(),
        DriverCommand::Dwell { time_ms } => driver.dwell(time_ms),
        DriverCommand::Set(setting) => {
            driver.set(setting);
            Ok(())
        }
        DriverCommand::SetOrigin { x, y } => {
            driver.set_origin(x, y);
            Ok(())
        }
        DriverCommand::Status => {
            driver.status();
            Ok(())
        }
        DriverCommand::Blob(blob_type, data) => driver.blob(blob_type, &data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::{shared_sink, BufferedPipe, OutputSink};
    use crate::firmware::lihuiyu::speedcode::StaticSpeedCode;
    use lhykit_core::{thread_safe_vec, ConnectionError, NativePosition, ThreadSafeVec};
    use lhykit_settings::DeviceConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Records writes and reports a settable fill level
    struct GaugeSink {
        written: ThreadSafeVec<u8>,
        level: Arc<AtomicUsize>,
    }

    impl OutputSink for GaugeSink {
        fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), ConnectionError> {
            self.written.lock().extend_from_slice(bytes);
            Ok(())
        }

        fn len(&self) -> usize {
            self.level.load(Ordering::SeqCst)
        }
    }

    fn config() -> DeviceConfig {
        DeviceConfig {
            buffer_max: 10,
            hold_poll_interval_ms: 1,
            ..DeviceConfig::default()
        }
    }

    #[test]
    fn test_jobs_run_in_order() {
        let written = thread_safe_vec();
        let sink = shared_sink(GaugeSink {
            written: Arc::clone(&written),
            level: Arc::new(AtomicUsize::new(0)),
        });
        let driver = LihuiyuDriver::new(config(), sink, StaticSpeedCode::new("CV"));
        let worker = DriverWorker::spawn(driver).unwrap();

        worker.submit(DriverCommand::Jog { x: 10, y: 0 }).unwrap();
        worker.submit(DriverCommand::Jog { x: 10, y: 5 }).unwrap();
        let driver = worker.shutdown().unwrap();

        assert_eq!(driver.native_position(), NativePosition::new(10, 5));
        assert_eq!(
            String::from_utf8(written.lock().clone()).unwrap(),
            "IBjS1P\nIReS1P\n"
        );
    }

    #[test]
    fn test_reset_discards_held_job() {
        let written = thread_safe_vec();
        let level = Arc::new(AtomicUsize::new(1000));
        let sink = shared_sink(GaugeSink {
            written: Arc::clone(&written),
            level: Arc::clone(&level),
        });
        let driver = LihuiyuDriver::new(config(), sink, StaticSpeedCode::new("CV"));
        let worker = DriverWorker::spawn(driver).unwrap();

        worker.submit(DriverCommand::Jog { x: 100, y: 0 }).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        worker.realtime().reset().unwrap();
        level.store(0, Ordering::SeqCst);
        worker.submit(DriverCommand::Jog { x: 0, y: 7 }).unwrap();
        let driver = worker.shutdown().unwrap();

        assert_eq!(driver.native_position(), NativePosition::new(0, 7));
        assert!(!driver.cancel_requested());
        assert_eq!(
            String::from_utf8(written.lock().clone()).unwrap(),
            "~I*\n~IRgS1P\n"
        );
    }

    #[test]
    fn test_fatal_error_publishes_abort() {
        let pipe = BufferedPipe::new();
        pipe.shutdown();
        let driver = LihuiyuDriver::new(config(), shared_sink(pipe), StaticSpeedCode::new("CV"));
        let mut rx = driver.events().subscribe();
        let worker = DriverWorker::spawn(driver).unwrap();

        let id = worker.submit(DriverCommand::Home).unwrap();
        worker.shutdown().unwrap();

        let mut aborted = None;
        while let Ok(event) = rx.try_recv() {
            if let DriverEvent::JobAborted { job, reason } = event {
                aborted = Some((job, reason));
            }
        }
        let (job, reason) = aborted.unwrap();
        assert_eq!(job, id);
        assert!(reason.contains("shutdown"), "{}", reason);
    }

    #[test]
    fn test_submit_after_stop_fails() {
        let driver = LihuiyuDriver::new(
            config(),
            shared_sink(BufferedPipe::new()),
            StaticSpeedCode::default(),
        );
        let worker = DriverWorker::spawn(driver).unwrap();
        let tx = worker.tx.clone();
        worker.shutdown().unwrap();
        assert!(tx
            .send(Envelope::Job {
                id: Uuid::nil(),
                generation: 0,
                command: DriverCommand::Status,
            })
            .is_err());
    }
}
