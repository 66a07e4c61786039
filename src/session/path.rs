//! Recording directory allocation
//!
//! Recordings are saved as `rec_dir/<session label>/<nnn>` where `nnn` is an
//! increasing three-digit counter, so an existing take is never overwritten.
//! The label may contain separators to create nested session directories.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{RecorderError, RecorderResult};

const PROBE_FILE: &str = ".gaze_recorder_write_probe";

/// A freshly created take directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeDir {
    /// `rec_dir/<label>`, possibly shared with earlier takes
    pub session_dir: PathBuf,
    /// `session_dir/<nnn>`, owned by this take only
    pub path: PathBuf,
    pub index: u32,
}

/// Create the session directory (if needed) and the next free take directory
pub fn allocate(base_dir: &Path, label: &str) -> RecorderResult<TakeDir> {
    let session_dir = base_dir.join(label_path(label)?);

    match std::fs::create_dir_all(&session_dir) {
        Ok(()) => debug!("Using recordings session dir {:?}", session_dir),
        Err(source) => {
            return Err(RecorderError::Allocation {
                path: session_dir,
                source,
            })
        }
    }

    let mut index = 0u32;
    loop {
        let path = session_dir.join(format!("{:03}", index));
        match std::fs::create_dir(&path) {
            Ok(()) => {
                debug!("Created new recording dir {:?}", path);
                return Ok(TakeDir {
                    session_dir,
                    path,
                    index,
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!("{:?} exists, trying next counter", path);
                index += 1;
            }
            Err(source) => return Err(RecorderError::Allocation { path, source }),
        }
    }
}

/// Relative path for a session label, keeping only normal components
fn label_path(label: &str) -> RecorderResult<PathBuf> {
    let mut path = PathBuf::new();
    for component in Path::new(label).components() {
        match component {
            Component::Normal(part) => path.push(part),
            other => warn!("Ignoring {:?} in session name {:?}", other, label),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(RecorderError::InvalidLabel(label.to_string()));
    }
    Ok(path)
}

/// Validate a user-supplied recordings directory
///
/// Expands a leading `~`, then requires an existing, writable directory.
pub fn verify_path(candidate: &str) -> Option<PathBuf> {
    let expanded = expand_home(candidate);

    if candidate.trim().is_empty() {
        warn!("Please specify a path.");
        return None;
    }
    if !expanded.is_dir() {
        warn!("{:?} is not a valid path.", expanded);
        return None;
    }
    if !writable_dir(&expanded) {
        warn!("Do not have write access to {:?}.", expanded);
        return None;
    }
    Some(expanded)
}

fn expand_home(candidate: &str) -> PathBuf {
    let rest = match candidate.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(std::path::is_separator) => rest,
        _ => return PathBuf::from(candidate),
    };

    match directories::BaseDirs::new() {
        Some(dirs) => {
            debug!("Expanded user path.");
            dirs.home_dir().join(rest.trim_start_matches(std::path::is_separator))
        }
        None => PathBuf::from(candidate),
    }
}

fn writable_dir(dir: &Path) -> bool {
    let probe = dir.join(PROBE_FILE);
    match std::fs::File::create(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
