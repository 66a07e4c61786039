//! Writer for hardware-encoded H.264 bitstreams

use std::path::Path;
use tracing::debug;

use super::{ContainerFile, VideoWriter, WriterKind, WriterSpec};
use crate::capture::Frame;
use crate::error::WriterError;

/// Appends Annex-B access units to a raw `.h264` stream
///
/// The stream carries no container-level size, so every frame must match the
/// size the writer was opened with.
#[derive(Debug)]
pub struct BitstreamWriter {
    container: ContainerFile,
    frame_size: (u32, u32),
    frame_rate: u32,
}

impl BitstreamWriter {
    pub fn create(spec: &WriterSpec) -> Result<Self, WriterError> {
        Ok(Self {
            container: ContainerFile::create(&spec.dir, WriterKind::Bitstream.file_name())?,
            frame_size: spec.frame_size,
            frame_rate: spec.frame_rate,
        })
    }
}

impl VideoWriter for BitstreamWriter {
    fn kind(&self) -> WriterKind {
        WriterKind::Bitstream
    }

    fn output_path(&self) -> &Path {
        &self.container.path
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError> {
        if frame.size() != self.frame_size {
            return Err(WriterError::FrameSize {
                index: frame.index,
                expected: self.frame_size,
                actual: frame.size(),
            });
        }
        let buffer = frame.h264.as_deref().ok_or(WriterError::MissingBuffer {
            index: frame.index,
            buffer: "h264",
        })?;
        self.container.append(buffer, frame.timestamp)
    }

    fn release(&mut self) -> Result<(), WriterError> {
        debug!("Releasing H.264 stream recorded at {} fps", self.frame_rate);
        self.container.finish()
    }
}
