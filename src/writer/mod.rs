//! World video writers
//!
//! Three interchangeable backends persist frames, chosen by capability
//! negotiation with the capture source (cheapest first):
//! - `Passthrough`: copies pre-compressed JPEG buffers, no re-encoding
//! - `Bitstream`: copies the hardware H.264 bitstream
//! - `Transcoding`: encodes raw frames itself

mod bitstream;
mod passthrough;
mod transcode;

pub use bitstream::BitstreamWriter;
pub use passthrough::PassthroughWriter;
pub use transcode::TranscodingWriter;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::capture::{CaptureCapabilities, Frame};
use crate::error::WriterError;

/// Name of the frame timestamp sidecar written next to the video
pub const TIMESTAMPS_FILE: &str = "world_timestamps";

/// Compression mode requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    /// Bigger files, less CPU: reuse compressed frames when the source has them
    #[default]
    LowCpu,
    /// Smaller files, more CPU
    SmallFile,
}

/// Writer backend strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterKind {
    Passthrough,
    Bitstream,
    Transcoding,
}

impl WriterKind {
    /// Video file name inside the take directory
    pub fn file_name(self) -> &'static str {
        match self {
            WriterKind::Passthrough | WriterKind::Transcoding => "world.mjpeg",
            WriterKind::Bitstream => "world.h264",
        }
    }
}

/// Parameters shared by every backend
#[derive(Debug, Clone, PartialEq)]
pub struct WriterSpec {
    /// Take directory the video is written into
    pub dir: PathBuf,
    pub frame_rate: u32,
    pub frame_size: (u32, u32),
}

/// An open world video writer
pub trait VideoWriter: Send {
    fn kind(&self) -> WriterKind;

    /// Path of the video file being written
    fn output_path(&self) -> &Path;

    /// Append one frame
    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError>;

    /// Flush and close the file. Calling it again is a no-op.
    fn release(&mut self) -> Result<(), WriterError>;
}

/// Constructs writer backends
///
/// The default implementation writes plain files; hosts and tests can swap
/// in their own.
pub trait WriterFactory: Send {
    fn open(&self, kind: WriterKind, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>, WriterError>;
}

/// File-backed backends shipped with the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct FileWriterFactory;

impl WriterFactory for FileWriterFactory {
    fn open(&self, kind: WriterKind, spec: &WriterSpec) -> Result<Box<dyn VideoWriter>, WriterError> {
        Ok(match kind {
            WriterKind::Passthrough => Box::new(PassthroughWriter::create(spec)?),
            WriterKind::Bitstream => Box::new(BitstreamWriter::create(spec)?),
            WriterKind::Transcoding => Box::new(TranscodingWriter::create(spec)?),
        })
    }
}

/// Pick the cheapest backend the source allows
///
/// Precedence: pass-through (only when low-CPU mode is requested), then the
/// hardware bitstream, then transcoding.
pub fn select_kind(capabilities: CaptureCapabilities, compression: CompressionMode) -> WriterKind {
    if compression == CompressionMode::LowCpu && capabilities.jpeg_support {
        WriterKind::Passthrough
    } else if capabilities.h264_bitstream {
        WriterKind::Bitstream
    } else {
        WriterKind::Transcoding
    }
}

/// Select and construct the writer for a new recording
pub fn open_writer(
    factory: &dyn WriterFactory,
    capabilities: CaptureCapabilities,
    spec: &WriterSpec,
    compression: CompressionMode,
) -> Result<Box<dyn VideoWriter>, WriterError> {
    let kind = select_kind(capabilities, compression);
    info!(
        "Opening {:?} writer ({}x{} @ {} fps) in {:?}",
        kind, spec.frame_size.0, spec.frame_size.1, spec.frame_rate, spec.dir
    );
    factory.open(kind, spec)
}

/// Append-only video file plus its frame timestamps
///
/// Shared by the file-backed writers. `finish` is idempotent.
#[derive(Debug)]
struct ContainerFile {
    path: PathBuf,
    timestamps_path: PathBuf,
    out: Option<BufWriter<File>>,
    timestamps: Vec<f64>,
}

impl ContainerFile {
    fn create(dir: &Path, file_name: &str) -> Result<Self, WriterError> {
        let path = dir.join(file_name);
        let out = BufWriter::new(File::create(&path)?);
        debug!("Created video file {:?}", path);
        Ok(Self {
            path,
            timestamps_path: dir.join(TIMESTAMPS_FILE),
            out: Some(out),
            timestamps: Vec::new(),
        })
    }

    fn append(&mut self, bytes: &[u8], timestamp: f64) -> Result<(), WriterError> {
        let out = self.out.as_mut().ok_or(WriterError::Released)?;
        out.write_all(bytes)?;
        self.timestamps.push(timestamp);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriterError> {
        let Some(out) = self.out.take() else {
            debug!("Video file {:?} already closed", self.path);
            return Ok(());
        };

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        let bytes = rmp_serde::to_vec(&self.timestamps)?;
        std::fs::write(&self.timestamps_path, bytes)?;

        info!("Closed {:?} ({} frames)", self.path, self.timestamps.len());
        Ok(())
    }
}
