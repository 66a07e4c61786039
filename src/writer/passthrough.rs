//! Pass-through writer for sources that already deliver JPEG frames

use std::path::Path;

use super::{ContainerFile, VideoWriter, WriterKind, WriterSpec};
use crate::capture::Frame;
use crate::error::WriterError;

/// Concatenates JPEG buffers into an MJPEG stream without re-encoding
#[derive(Debug)]
pub struct PassthroughWriter {
    container: ContainerFile,
}

impl PassthroughWriter {
    pub fn create(spec: &WriterSpec) -> Result<Self, WriterError> {
        Ok(Self {
            container: ContainerFile::create(&spec.dir, WriterKind::Passthrough.file_name())?,
        })
    }
}

impl VideoWriter for PassthroughWriter {
    fn kind(&self) -> WriterKind {
        WriterKind::Passthrough
    }

    fn output_path(&self) -> &Path {
        &self.container.path
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError> {
        let jpeg = frame.jpeg.as_deref().ok_or(WriterError::MissingBuffer {
            index: frame.index,
            buffer: "jpeg",
        })?;
        self.container.append(jpeg, frame.timestamp)
    }

    fn release(&mut self) -> Result<(), WriterError> {
        self.container.finish()
    }
}
