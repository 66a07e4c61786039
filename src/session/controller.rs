//! Recording session controller
//!
//! Owns the Idle/Recording state, the active video writer and the event
//! buffers. Every transition and every cycle takes `&mut self`, so a start or
//! stop can never interleave with ingestion of a cycle.
//!
//! Reacts to notifications:
//! - `recording.should_start`: starts a new recording (optional `session_name`)
//! - `recording.should_stop`: stops the current recording
//! - anything with `record: true`: stored while recording
//!
//! Emits notifications:
//! - `recording.started`: `{rec_path, session_name, record_eye, compression}`
//! - `recording.stopped`: `{rec_path}`

use chrono::{DateTime, Local};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::aggregator::{EventAggregator, NOTIFICATIONS_STREAM};
use super::artifacts::{
    self, AudioBackend, AudioSink, CalibrationStore, FileCalibrationStore, AUDIO_FILE,
    CAMERA_CALIBRATION_FILE,
};
use super::metadata::{self, MetadataRecord};
use super::path::{self, TakeDir};
use crate::bus::{self, Notification, NotificationBus};
use crate::capture::{CaptureSource, CycleEvents};
use crate::error::RecorderResult;
use crate::writer::{self, CompressionMode, FileWriterFactory, VideoWriter, WriterFactory, WriterSpec};

pub const INFO_FILE: &str = "info.csv";
pub const DATA_FILE: &str = "pupil_data";
pub const USER_INFO_FILE: &str = "user_info.csv";

const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// User-facing recorder settings
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    /// Root of all recordings
    pub rec_dir: PathBuf,
    /// Application user directory (calibration, surface definitions)
    pub user_dir: PathBuf,
    /// Session label; may contain separators
    pub session_name: String,
    pub record_eye: bool,
    /// Audio input device, `None` for no audio
    pub audio_source: Option<String>,
    pub compression: CompressionMode,
    /// Free-form fields saved to `user_info.csv`
    pub user_info: BTreeMap<String, String>,
}

/// Result of a command sent to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Recording started in this take directory
    Started(PathBuf),
    Stopped(StopReport),
    AlreadyRunning,
    AlreadyStopped,
    CaptureOffline,
    /// Recordable notification stored
    Recorded,
    /// Recordable notification dropped (no timestamp)
    Rejected,
    Ignored,
}

/// Optional artifacts written at stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Video,
    Data,
    SurfaceDefinitions,
    CameraCalibration,
    Metadata,
    UserInfo,
    Audio,
}

/// A finalization step that failed without aborting the stop
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactWarning {
    pub artifact: Artifact,
    pub message: String,
}

impl ArtifactWarning {
    fn new(artifact: Artifact, err: impl std::fmt::Display) -> Self {
        Self {
            artifact,
            message: err.to_string(),
        }
    }
}

/// Summary of a finished recording
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    pub rec_path: PathBuf,
    pub frame_count: u64,
    pub duration: Duration,
    pub warnings: Vec<ArtifactWarning>,
}

/// The recording in progress
pub struct ActiveSession {
    label: String,
    take: TakeDir,
    recording_id: Uuid,
    started_at: DateTime<Local>,
    started: Instant,
    frame_count: u64,
    compression: CompressionMode,
    audio_source: Option<String>,
    writer: Option<Box<dyn VideoWriter>>,
    audio: Option<Box<dyn AudioSink>>,
    meta_path: PathBuf,
}

impl ActiveSession {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn rec_path(&self) -> &Path {
        &self.take.path
    }

    pub fn take(&self) -> &TakeDir {
        &self.take
    }

    pub fn recording_id(&self) -> Uuid {
        self.recording_id
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    pub fn audio_source(&self) -> Option<&str> {
        self.audio_source.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Session lifecycle state machine
pub struct SessionController {
    settings: RecorderSettings,
    capture: Arc<dyn CaptureSource>,
    bus: Arc<dyn NotificationBus>,
    writers: Box<dyn WriterFactory>,
    audio_backend: Option<Box<dyn AudioBackend>>,
    calibration: Box<dyn CalibrationStore>,
    aggregator: EventAggregator,
    session: Option<ActiveSession>,
    status_text: String,
}

impl SessionController {
    pub fn new(
        mut settings: RecorderSettings,
        capture: Arc<dyn CaptureSource>,
        bus: Arc<dyn NotificationBus>,
    ) -> Self {
        // Refresh names that were generated automatically on an earlier day
        if settings.session_name.is_empty() || is_auto_name(&settings.session_name) {
            settings.session_name = auto_name();
        }
        let calibration = Box::new(FileCalibrationStore::new(&settings.user_dir));

        Self {
            settings,
            capture,
            bus,
            writers: Box::new(FileWriterFactory),
            audio_backend: None,
            calibration,
            aggregator: EventAggregator::new(),
            session: None,
            status_text: String::new(),
        }
    }

    pub fn with_writer_factory(mut self, factory: Box<dyn WriterFactory>) -> Self {
        self.writers = factory;
        self
    }

    pub fn with_audio_backend(mut self, backend: Box<dyn AudioBackend>) -> Self {
        self.audio_backend = Some(backend);
        self
    }

    pub fn with_calibration_store(mut self, store: Box<dyn CalibrationStore>) -> Self {
        self.calibration = store;
        self
    }

    pub fn state(&self) -> RecorderState {
        if self.session.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn aggregator(&self) -> &EventAggregator {
        &self.aggregator
    }

    /// Elapsed recording time as `HH:MM:SS`, empty while idle
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Set the session label; an empty name selects today's date
    pub fn set_session_name(&mut self, name: &str) {
        if name.is_empty() {
            self.settings.session_name = auto_name();
            return;
        }
        if name.contains(std::path::is_separator) {
            warn!("Session name {:?} will create one or more subdirectories", name);
        }
        self.settings.session_name = name.to_string();
    }

    /// Change the recordings directory; invalid input is ignored
    pub fn set_rec_dir(&mut self, candidate: &str) -> bool {
        match path::verify_path(candidate) {
            Some(dir) => {
                info!("Recordings will be saved to {:?}", dir);
                self.settings.rec_dir = dir;
                true
            }
            None => false,
        }
    }

    /// Handle a bus notification
    pub fn on_notification(&mut self, notification: &Notification) -> RecorderResult<CommandOutcome> {
        if notification.is_recordable() && self.session.is_some() {
            let stored = self.aggregator.ingest_notification(notification);
            return Ok(if stored {
                CommandOutcome::Recorded
            } else {
                CommandOutcome::Rejected
            });
        }

        match notification.subject() {
            bus::SHOULD_START => {
                if let Some(outcome) = self.start_guard() {
                    return Ok(outcome);
                }
                let name = notification.get("session_name").and_then(Value::as_str);
                if let Some(name) = name.filter(|n| !n.is_empty()) {
                    self.set_session_name(name);
                }
                self.start()
            }
            bus::SHOULD_STOP => Ok(self.stop()),
            _ => Ok(CommandOutcome::Ignored),
        }
    }

    /// Ask the bus to start or stop, locally and on remote peers
    pub fn toggle(&self) {
        let request = if self.is_recording() {
            Notification::new(bus::SHOULD_STOP)
        } else {
            Notification::new(bus::SHOULD_START)
                .with("session_name", self.settings.session_name.as_str())
        };
        self.bus.notify_all(request.clone());
        self.bus.notify_all(request.with("remote_notify", "all"));
    }

    fn start_guard(&self) -> Option<CommandOutcome> {
        if self.session.is_some() {
            info!("Recording already running!");
            return Some(CommandOutcome::AlreadyRunning);
        }
        if !self.capture.online() {
            error!("Current world capture is offline. Please reconnect or switch to fake capture");
            return Some(CommandOutcome::CaptureOffline);
        }
        None
    }

    /// Start a new recording with the current settings
    ///
    /// Fails only when the take directory, the start metadata or the video
    /// writer cannot be created; the controller then stays idle.
    pub fn start(&mut self) -> RecorderResult<CommandOutcome> {
        if let Some(outcome) = self.start_guard() {
            return Ok(outcome);
        }

        let label = self.settings.session_name.clone();
        let take = path::allocate(&self.settings.rec_dir, &label)?;
        let started_at = Local::now();
        let started = Instant::now();
        let recording_id = Uuid::new_v4();

        let meta_path = take.path.join(INFO_FILE);
        let start_record = MetadataRecord::new()
            .with("Recording Name", &label)
            .with("Start Date", started_at.format("%d.%m.%Y"))
            .with("Start Time", started_at.format("%H:%M:%S"))
            .with("Recording UUID", recording_id);
        metadata::write_start(&meta_path, &start_record)?;

        let mut audio = self.open_audio(&take.path);

        let spec = WriterSpec {
            dir: take.path.clone(),
            frame_rate: self.capture.frame_rate(),
            frame_size: self.capture.frame_size(),
        };
        let compression = self.settings.compression;
        let writer = match writer::open_writer(
            self.writers.as_ref(),
            self.capture.capabilities(),
            &spec,
            compression,
        ) {
            Ok(writer) => writer,
            Err(e) => {
                if let Some(sink) = audio.as_mut() {
                    if let Err(close_err) = sink.close() {
                        warn!("Could not finalize audio: {}", close_err);
                    }
                }
                return Err(e.into());
            }
        };

        self.aggregator.reset();
        self.inject_calibration();

        let rec_path = take.path.clone();
        self.session = Some(ActiveSession {
            label: label.clone(),
            take,
            recording_id,
            started_at,
            started,
            frame_count: 0,
            compression,
            audio_source: self.settings.audio_source.clone(),
            writer: Some(writer),
            audio,
            meta_path,
        });
        self.status_text = format_elapsed(Duration::ZERO);

        info!("Started Recording.");
        self.bus.notify_all(
            Notification::new(bus::STARTED)
                .with("rec_path", rec_path.to_string_lossy().as_ref())
                .with("session_name", label)
                .with("record_eye", self.settings.record_eye)
                .with("compression", compression == CompressionMode::LowCpu),
        );

        Ok(CommandOutcome::Started(rec_path))
    }

    /// Route one cycle's events into the active recording
    pub fn on_cycle(&mut self, events: CycleEvents) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        for (name, items) in events.batches {
            self.aggregator.ingest(&name, items);
        }

        if let (Some(frame), Some(writer)) = (events.frame.as_ref(), session.writer.as_mut()) {
            match writer.write_frame(frame) {
                Ok(()) => session.frame_count += 1,
                Err(e) => warn!("Dropped world frame {}: {}", frame.index, e),
            }
        }

        self.status_text = format_elapsed(session.started.elapsed());
    }

    /// Finalize the current recording
    ///
    /// The video writer is released before anything else is written. Every
    /// later step is best effort; failures end up in the report.
    pub fn stop(&mut self) -> CommandOutcome {
        let Some(mut session) = self.session.take() else {
            info!("Recording already stopped!");
            return CommandOutcome::AlreadyStopped;
        };

        let duration = session.started.elapsed();
        let rec_path = session.take.path.clone();
        let mut warnings = Vec::new();

        if let Some(mut writer) = session.writer.take() {
            if let Err(e) = writer.release() {
                error!("Could not finalize world video: {}", e);
                warnings.push(ArtifactWarning::new(Artifact::Video, e));
            }
        }

        if let Err(e) = artifacts::save_msgpack(&rec_path.join(DATA_FILE), self.aggregator.snapshot()) {
            error!("Could not save recorded data: {}", e);
            warnings.push(ArtifactWarning::new(Artifact::Data, e));
        }

        match artifacts::copy_surface_definitions(&self.settings.user_dir, &rec_path) {
            Ok(_) => debug!("Copied surface definitions"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No surface_definitions data found. You may want this if you do marker tracking.");
            }
            Err(e) => {
                warn!("Could not copy surface definitions: {}", e);
                warnings.push(ArtifactWarning::new(Artifact::SurfaceDefinitions, e));
            }
        }

        let frame_size = self.capture.frame_size();
        match self.calibration.camera_intrinsics(&self.capture.name(), frame_size) {
            Ok(Some(intrinsics)) => {
                let target = rec_path.join(CAMERA_CALIBRATION_FILE);
                if let Err(e) = artifacts::save_msgpack(&target, &intrinsics) {
                    warn!("Could not save camera calibration: {}", e);
                    warnings.push(ArtifactWarning::new(Artifact::CameraCalibration, e));
                }
            }
            Ok(None) => info!("No camera calibration found."),
            Err(e) => {
                warn!("Could not load camera calibration: {}", e);
                warnings.push(ArtifactWarning::new(Artifact::CameraCalibration, e));
            }
        }

        let stop_record = MetadataRecord::new()
            .with("Duration Time", format_elapsed(duration))
            .with("World Camera Frames", session.frame_count)
            .with("World Camera Resolution", format!("{}x{}", frame_size.0, frame_size.1))
            .with("Capture Software Version", SOFTWARE_VERSION)
            .with("Data Format Version", SOFTWARE_VERSION)
            .with("System Info", metadata::system_info());
        if let Err(e) = metadata::append_stop(&session.meta_path, &stop_record) {
            error!("Could not save metadata: {}", e);
            warnings.push(ArtifactWarning::new(Artifact::Metadata, e));
        }

        let user_info: MetadataRecord = self.settings.user_info.iter().collect();
        if let Err(e) = metadata::write_start(&rec_path.join(USER_INFO_FILE), &user_info) {
            error!("Could not save user info: {}", e);
            warnings.push(ArtifactWarning::new(Artifact::UserInfo, e));
        }

        if let Some(mut audio) = session.audio.take() {
            if let Err(e) = audio.close() {
                warn!("Could not finalize audio: {}", e);
                warnings.push(ArtifactWarning::new(Artifact::Audio, e));
            }
        }

        self.aggregator.reset();
        self.status_text.clear();

        info!("Saved Recording.");
        self.bus.notify_all(
            Notification::new(bus::STOPPED).with("rec_path", rec_path.to_string_lossy().as_ref()),
        );

        CommandOutcome::Stopped(StopReport {
            rec_path,
            frame_count: session.frame_count,
            duration,
            warnings,
        })
    }

    /// Stop any active recording before the host tears the recorder down
    pub fn shutdown(&mut self) -> Option<StopReport> {
        match self.stop() {
            CommandOutcome::Stopped(report) => Some(report),
            _ => None,
        }
    }

    fn open_audio(&self, take_dir: &Path) -> Option<Box<dyn AudioSink>> {
        let source = self.settings.audio_source.as_deref()?;
        let Some(backend) = self.audio_backend.as_ref() else {
            warn!("Audio source {:?} selected but no audio backend is available", source);
            return None;
        };
        match backend.open(source, &take_dir.join(AUDIO_FILE)) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!("Could not start audio capture from {:?}: {}", source, e);
                None
            }
        }
    }

    /// Store the last gaze calibration with the recording's notifications
    fn inject_calibration(&mut self) {
        match self.calibration.user_calibration() {
            Ok(Some(data)) => {
                let mut notification = Notification::new(bus::CALIBRATION_DATA).with("record", true);
                for (key, value) in data {
                    notification = notification.with(&key, value);
                }
                self.aggregator
                    .ingest(NOTIFICATIONS_STREAM, vec![notification.into_value()]);
                debug!("Added calibration data to recording");
            }
            Ok(None) => {}
            Err(e) => warn!("Could not load calibration data: {}", e),
        }
    }
}

/// Session name used when none is given: today's date
pub fn auto_name() -> String {
    Local::now().format("%Y_%m_%d").to_string()
}

fn is_auto_name(name: &str) -> bool {
    name.starts_with("20") && name.len() == 10
}

/// Format a duration as `HH:MM:SS`; hours keep counting past 24
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
