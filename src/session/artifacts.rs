//! Side artifacts read from the user directory or written next to a take
//!
//! Calibration data, marker surface definitions and audio are owned by
//! other parts of the application; the recorder only snapshots them.

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::RecorderResult;

pub const USER_CALIBRATION_FILE: &str = "user_calibration_data";
pub const CAMERA_CALIBRATION_FILE: &str = "camera_calibration";
pub const SURFACE_DEFINITIONS_FILE: &str = "surface_definitions";
pub const AUDIO_FILE: &str = "world.wav";

/// Source of calibration data captured alongside a recording
pub trait CalibrationStore: Send {
    /// Most recent gaze calibration, if one was saved
    fn user_calibration(&self) -> RecorderResult<Option<Map<String, Value>>>;

    /// Intrinsics for `camera` at `resolution`, if known
    fn camera_intrinsics(&self, camera: &str, resolution: (u32, u32)) -> RecorderResult<Option<Value>>;
}

/// Reads msgpack calibration files from the user directory
#[derive(Debug, Clone)]
pub struct FileCalibrationStore {
    user_dir: PathBuf,
}

impl FileCalibrationStore {
    pub fn new(user_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_dir: user_dir.into(),
        }
    }

    fn load(&self, file_name: &str) -> RecorderResult<Option<Value>> {
        let path = self.user_dir.join(file_name);
        if !path.is_file() {
            debug!("No {} found in {:?}", file_name, self.user_dir);
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(rmp_serde::from_slice(&bytes)?))
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn user_calibration(&self) -> RecorderResult<Option<Map<String, Value>>> {
        match self.load(USER_CALIBRATION_FILE)? {
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(_) => {
                warn!("{} is not a map, ignoring it", USER_CALIBRATION_FILE);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn camera_intrinsics(&self, camera: &str, resolution: (u32, u32)) -> RecorderResult<Option<Value>> {
        let Some(intrinsics) = self.load(CAMERA_CALIBRATION_FILE)? else {
            return Ok(None);
        };

        if let Some(name) = intrinsics.get("camera_name").and_then(Value::as_str) {
            if name != camera {
                warn!("Camera calibration is for {:?}, not {:?}", name, camera);
                return Ok(None);
            }
        }

        if let Some(stored) = intrinsics.get("resolution").and_then(Value::as_array) {
            let matches = stored.len() == 2
                && stored[0].as_u64() == Some(resolution.0 as u64)
                && stored[1].as_u64() == Some(resolution.1 as u64);
            if !matches {
                warn!(
                    "Camera calibration resolution {:?} does not match {}x{}",
                    stored, resolution.0, resolution.1
                );
                return Ok(None);
            }
        }

        Ok(Some(intrinsics))
    }
}

/// Serialize `value` as msgpack into `path`
pub fn save_msgpack<T: Serialize + ?Sized>(path: &Path, value: &T) -> RecorderResult<()> {
    let bytes = rmp_serde::to_vec_named(value)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Copy the marker surface definitions into the take directory
pub fn copy_surface_definitions(user_dir: &Path, take_dir: &Path) -> std::io::Result<u64> {
    std::fs::copy(
        user_dir.join(SURFACE_DEFINITIONS_FILE),
        take_dir.join(SURFACE_DEFINITIONS_FILE),
    )
}

/// An open audio recording
pub trait AudioSink: Send {
    /// Stop capturing and finalize the file
    fn close(&mut self) -> std::io::Result<()>;
}

/// Opens audio recordings for a named input device
pub trait AudioBackend: Send {
    fn open(&self, source: &str, path: &Path) -> std::io::Result<Box<dyn AudioSink>>;
}
