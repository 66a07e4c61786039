//! Recorder engine - drives the session controller from commands and bus traffic

mod engine;

pub use engine::{create_engine_channels, RecorderEngine};

use std::path::PathBuf;

use crate::capture::CycleEvents;

/// Commands that can be sent to the recorder engine
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Events produced by one capture cycle
    Cycle(CycleEvents),
    /// Request a start or stop through the notification bus
    Toggle,
    /// Label for the next recording
    SetSessionName(String),
    /// New recordings directory (ignored when invalid)
    SetRecDir(String),
    /// Stop any recording and exit
    Shutdown,
}

/// Status updates from the recorder engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    /// Not recording
    Idle,
    /// A recording is in progress
    Recording {
        rec_path: PathBuf,
        /// Elapsed time as `HH:MM:SS`
        elapsed: String,
        frame_count: u64,
    },
    /// A recording was finalized
    Saved {
        rec_path: PathBuf,
        frame_count: u64,
        /// Number of optional artifacts that could not be written
        warnings: usize,
    },
    /// An error occurred
    Error(String),
}
