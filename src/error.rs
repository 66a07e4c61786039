//! Error types for the recorder library

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the session controller and its components
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Could not allocate recording directory {path:?}: {source}")]
    Allocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid session label: {0:?}")]
    InvalidLabel(String),

    #[error("Video writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("Could not write metadata file {path:?}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by video writer backends
#[derive(Error, Debug)]
pub enum WriterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame {index} has no {buffer} buffer")]
    MissingBuffer { index: u64, buffer: &'static str },

    #[error("Frame {index} is {actual:?}, writer expects {expected:?}")]
    FrameSize {
        index: u64,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Frame {index} has {actual} pixel bytes, expected {expected}")]
    BufferLength {
        index: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Timestamp serialization failed: {0}")]
    Timestamps(#[from] rmp_serde::encode::Error),

    #[error("Writer already released")]
    Released,
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
