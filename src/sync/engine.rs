//! Recorder engine
//!
//! Owns the [`SessionController`] and feeds it from two sources: capture
//! cycles and control commands on an mpsc channel, and notifications on the
//! broadcast bus. A single select loop handles both, so transitions and
//! cycles are applied one at a time in arrival order.

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::bus::Notification;
use crate::session::{CommandOutcome, SessionController, StopReport};

use super::{EngineCommand, EngineStatus};

/// Runs the session controller on the async runtime
pub struct RecorderEngine {
    controller: SessionController,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Notification bus subscription
    bus_rx: broadcast::Receiver<Notification>,
    /// Status broadcaster
    status_tx: broadcast::Sender<EngineStatus>,
}

impl RecorderEngine {
    pub fn new(
        controller: SessionController,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        bus_rx: broadcast::Receiver<Notification>,
        status_tx: broadcast::Sender<EngineStatus>,
    ) -> Self {
        Self {
            controller,
            cmd_rx,
            bus_rx,
            status_tx,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Run until shutdown; an active recording is finalized on the way out
    pub async fn run(&mut self) -> Result<()> {
        info!("Recorder engine starting");
        let _ = self.status_tx.send(EngineStatus::Idle);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Cycle(events)) => {
                            self.controller.on_cycle(events);
                            self.send_recording_status();
                        }
                        Some(EngineCommand::Toggle) => self.controller.toggle(),
                        Some(EngineCommand::SetSessionName(name)) => {
                            self.controller.set_session_name(&name);
                        }
                        Some(EngineCommand::SetRecDir(dir)) => {
                            self.controller.set_rec_dir(&dir);
                        }
                        Some(EngineCommand::Shutdown) | None => {
                            info!("Shutdown command received");
                            break;
                        }
                    }
                }

                msg = self.bus_rx.recv() => {
                    match msg {
                        Ok(notification) => self.handle_notification(notification),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Engine fell behind the notification bus, {} notifications skipped", skipped);
                        }
                        Err(RecvError::Closed) => {
                            warn!("Notification bus closed");
                            break;
                        }
                    }
                }
            }
        }

        if let Some(report) = self.controller.shutdown() {
            self.send_saved_status(&report);
        }
        let _ = self.status_tx.send(EngineStatus::Idle);
        info!("Recorder engine stopped");
        Ok(())
    }

    fn handle_notification(&mut self, notification: Notification) {
        debug!("Notification {:?}", notification.subject());
        match self.controller.on_notification(&notification) {
            Ok(CommandOutcome::Started(rec_path)) => {
                info!("Recording to {:?}", rec_path);
                self.send_recording_status();
            }
            Ok(CommandOutcome::Stopped(report)) => {
                self.send_saved_status(&report);
                let _ = self.status_tx.send(EngineStatus::Idle);
            }
            Ok(CommandOutcome::CaptureOffline) => {
                let _ = self
                    .status_tx
                    .send(EngineStatus::Error("World capture is offline".to_string()));
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to start recording: {}", e);
                let _ = self.status_tx.send(EngineStatus::Error(e.to_string()));
            }
        }
    }

    fn send_recording_status(&self) {
        if let Some(session) = self.controller.session() {
            let _ = self.status_tx.send(EngineStatus::Recording {
                rec_path: session.rec_path().to_path_buf(),
                elapsed: self.controller.status_text().to_string(),
                frame_count: session.frame_count(),
            });
        }
    }

    fn send_saved_status(&self, report: &StopReport) {
        for warning in &report.warnings {
            warn!("{:?} not saved: {}", warning.artifact, warning.message);
        }
        let _ = self.status_tx.send(EngineStatus::Saved {
            rec_path: report.rec_path.clone(),
            frame_count: report.frame_count,
            warnings: report.warnings.len(),
        });
    }
}

/// Create command and status channels for the engine
pub fn create_engine_channels() -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<EngineStatus>,
    broadcast::Receiver<EngineStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{self, BroadcastBus, NotificationBus};
    use crate::capture::{CaptureSource, CycleEvents, FakeCapture};
    use crate::session::RecorderSettings;
    use crate::writer::CompressionMode;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    fn settings(root: &Path) -> RecorderSettings {
        let rec_dir = root.join("recordings");
        let user_dir = root.join("user");
        std::fs::create_dir_all(&rec_dir).unwrap();
        std::fs::create_dir_all(&user_dir).unwrap();
        RecorderSettings {
            rec_dir,
            user_dir,
            session_name: "engine".to_string(),
            record_eye: false,
            audio_source: None,
            compression: CompressionMode::LowCpu,
            user_info: BTreeMap::new(),
        }
    }

    struct Running {
        cmd_tx: mpsc::Sender<EngineCommand>,
        status_rx: broadcast::Receiver<EngineStatus>,
        bus: BroadcastBus,
        capture: Arc<FakeCapture>,
        handle: tokio::task::JoinHandle<RecorderEngine>,
    }

    fn spawn_engine(settings: RecorderSettings) -> Running {
        let bus = BroadcastBus::default();
        let capture = Arc::new(FakeCapture::new(16, 16, 30));
        let source: Arc<dyn CaptureSource> = capture.clone();
        let controller = SessionController::new(settings, source, Arc::new(bus.clone()));

        let (cmd_tx, cmd_rx, status_tx, status_rx) = create_engine_channels();
        let mut engine = RecorderEngine::new(controller, cmd_rx, bus.subscribe(), status_tx);
        let handle = tokio::spawn(async move {
            engine.run().await.unwrap();
            engine
        });

        Running {
            cmd_tx,
            status_rx,
            bus,
            capture,
            handle,
        }
    }

    async fn wait_for<F>(status_rx: &mut broadcast::Receiver<EngineStatus>, predicate: F) -> EngineStatus
    where
        F: Fn(&EngineStatus) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match status_rx.recv().await {
                    Ok(status) if predicate(&status) => return status,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("status channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for engine status")
    }

    fn is_recording(status: &EngineStatus) -> bool {
        matches!(status, EngineStatus::Recording { .. })
    }

    fn is_saved(status: &EngineStatus) -> bool {
        matches!(status, EngineStatus::Saved { .. })
    }

    #[tokio::test]
    async fn test_bus_start_cycles_and_shutdown() {
        let root = tempfile::tempdir().unwrap();
        let mut running = spawn_engine(settings(root.path()));

        running.bus.notify_all(Notification::new(bus::SHOULD_START));
        wait_for(&mut running.status_rx, is_recording).await;

        for x in 0..3 {
            let events = CycleEvents::new()
                .with_frame(running.capture.grab().unwrap())
                .with_batch("gaze_positions", vec![json!({"x": x})]);
            running.cmd_tx.send(EngineCommand::Cycle(events)).await.unwrap();
        }
        running.cmd_tx.send(EngineCommand::Shutdown).await.unwrap();

        let saved = wait_for(&mut running.status_rx, is_saved).await;
        let EngineStatus::Saved {
            rec_path,
            frame_count,
            warnings,
        } = saved
        else {
            unreachable!()
        };
        assert_eq!(frame_count, 3);
        assert_eq!(warnings, 0);

        let engine = running.handle.await.unwrap();
        assert!(!engine.controller().is_recording());

        let bytes = std::fs::read(rec_path.join("pupil_data")).unwrap();
        let data: BTreeMap<String, Vec<serde_json::Value>> = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(data["gaze_positions"].len(), 3);
    }

    #[tokio::test]
    async fn test_toggle_round_trip_creates_one_take() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let session_dir: PathBuf = settings.rec_dir.join("engine");
        let mut running = spawn_engine(settings);

        running.cmd_tx.send(EngineCommand::Toggle).await.unwrap();
        wait_for(&mut running.status_rx, is_recording).await;

        running.cmd_tx.send(EngineCommand::Toggle).await.unwrap();
        wait_for(&mut running.status_rx, is_saved).await;

        running.cmd_tx.send(EngineCommand::Shutdown).await.unwrap();
        running.handle.await.unwrap();

        let takes: Vec<_> = std::fs::read_dir(&session_dir).unwrap().flatten().collect();
        assert_eq!(takes.len(), 1);
        assert_eq!(takes[0].file_name(), "000");
    }

    #[tokio::test]
    async fn test_failed_start_reports_error() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        std::fs::write(settings.rec_dir.join("engine"), b"not a directory").unwrap();
        let mut running = spawn_engine(settings);

        running.bus.notify_all(Notification::new(bus::SHOULD_START));
        let status = wait_for(&mut running.status_rx, |s| matches!(s, EngineStatus::Error(_))).await;
        assert!(matches!(status, EngineStatus::Error(message) if message.contains("allocate")));

        running.cmd_tx.send(EngineCommand::Shutdown).await.unwrap();
        let engine = running.handle.await.unwrap();
        assert!(!engine.controller().is_recording());
    }

    #[tokio::test]
    async fn test_session_name_command_applies_to_next_recording() {
        let root = tempfile::tempdir().unwrap();
        let settings = settings(root.path());
        let rec_dir = settings.rec_dir.clone();
        let mut running = spawn_engine(settings);

        running
            .cmd_tx
            .send(EngineCommand::SetSessionName("renamed".to_string()))
            .await
            .unwrap();
        running.cmd_tx.send(EngineCommand::Toggle).await.unwrap();
        let status = wait_for(&mut running.status_rx, is_recording).await;
        assert!(matches!(status, EngineStatus::Recording { rec_path, .. } if rec_path == rec_dir.join("renamed").join("000")));

        running.cmd_tx.send(EngineCommand::Shutdown).await.unwrap();
        running.handle.await.unwrap();
    }
}
