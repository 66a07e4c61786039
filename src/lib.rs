//! gaze-recorder
//!
//! Session recording controller for an eye-tracking capture pipeline: owns
//! the start/stop lifecycle, numbered take directories, the world video
//! writer and the per-session event buffers.

pub mod bus;
pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod sync;
pub mod writer;

pub use error::{RecorderError, RecorderResult, WriterError};
