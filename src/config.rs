//! Configuration management for gaze-recorder

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::capture::FakeCapture;
use crate::session::{path, RecorderSettings};
use crate::writer::CompressionMode;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Recording configuration
    #[serde(default)]
    pub recording: RecordingConfig,

    /// World capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Application directories
    #[serde(default)]
    pub paths: PathsConfig,

    /// Free-form fields saved with every recording (`user_info.csv`)
    #[serde(default = "default_user_info")]
    pub user_info: BTreeMap<String, String>,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Root directory for recordings
    #[serde(default = "default_rec_dir")]
    pub rec_dir: PathBuf,

    /// Session label; empty or a date selects today's date
    #[serde(default)]
    pub session_name: String,

    /// Ask eye processes to record their videos too
    #[serde(default)]
    pub record_eye: bool,

    /// Audio input device name
    #[serde(default)]
    pub audio_source: Option<String>,

    /// Video compression preference
    #[serde(default)]
    pub compression: CompressionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Whether the source delivers JPEG frames
    #[serde(default)]
    pub jpeg_support: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Calibration and surface definitions live here
    #[serde(default = "default_user_dir")]
    pub user_dir: PathBuf,
}

// Default value functions
fn default_frame_rate() -> u32 {
    30
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_user_info() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("name".to_string(), String::new()),
        ("additional_field".to_string(), "change_me".to_string()),
    ])
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "gaze-recorder", "recorder")
}

fn default_rec_dir() -> PathBuf {
    match directories::UserDirs::new() {
        Some(dirs) => dirs.home_dir().join("recordings"),
        None => std::env::temp_dir().join("gaze-recorder-recordings"),
    }
}

fn default_user_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => std::env::temp_dir().join("gaze-recorder"),
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            rec_dir: default_rec_dir(),
            session_name: String::new(),
            record_eye: false,
            audio_source: None,
            compression: CompressionMode::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            width: default_width(),
            height: default_height(),
            jpeg_support: false,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            user_dir: default_user_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recording: RecordingConfig::default(),
            capture: CaptureConfig::default(),
            paths: PathsConfig::default(),
            user_info: default_user_info(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;

            config.config_path = Some(path.to_path_buf());
            Ok(config)
        } else {
            // Create default config
            let config = Config {
                config_path: Some(path.to_path_buf()),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = project_dirs().context("Failed to determine config directory")?;
        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Settings for the session controller, creating the directories it needs
    ///
    /// An unusable recordings directory falls back to the default one.
    pub fn recorder_settings(&self) -> Result<RecorderSettings> {
        let rec_dir = resolve_rec_dir(&self.recording.rec_dir, &default_rec_dir())?;
        let user_dir = &self.paths.user_dir;
        std::fs::create_dir_all(user_dir)
            .with_context(|| format!("Failed to create user directory: {:?}", user_dir))?;

        Ok(RecorderSettings {
            rec_dir,
            user_dir: user_dir.clone(),
            session_name: self.recording.session_name.clone(),
            record_eye: self.recording.record_eye,
            audio_source: self.recording.audio_source.clone().filter(|s| !s.is_empty()),
            compression: self.recording.compression,
            user_info: self.user_info.clone(),
        })
    }

    /// World capture source described by the `[capture]` section
    pub fn fake_capture(&self) -> FakeCapture {
        FakeCapture::new(self.capture.width, self.capture.height, self.capture.frame_rate)
            .with_jpeg_support(self.capture.jpeg_support)
    }
}

/// Validate the configured recordings directory
///
/// Only the default directory is created on demand. Any other path must
/// already be a writable directory (after `~` expansion).
fn resolve_rec_dir(configured: &Path, default: &Path) -> Result<PathBuf> {
    if configured != default {
        if let Some(dir) = path::verify_path(&configured.to_string_lossy()) {
            return Ok(dir);
        }
        warn!(
            "Recordings directory {:?} is not usable, falling back to {:?}",
            configured, default
        );
    }

    std::fs::create_dir_all(default)
        .with_context(|| format!("Failed to create recordings directory: {:?}", default))?;
    Ok(default.to_path_buf())
}
