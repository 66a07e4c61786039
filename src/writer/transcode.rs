//! Generic writer that encodes raw frames itself

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::Path;

use super::{ContainerFile, VideoWriter, WriterKind, WriterSpec};
use crate::capture::Frame;
use crate::error::WriterError;

const JPEG_QUALITY: u8 = 85;

/// Encodes each raw RGB frame as JPEG into an MJPEG stream
#[derive(Debug)]
pub struct TranscodingWriter {
    container: ContainerFile,
    frame_rate: u32,
    scratch: Vec<u8>,
}

impl TranscodingWriter {
    pub fn create(spec: &WriterSpec) -> Result<Self, WriterError> {
        Ok(Self {
            container: ContainerFile::create(&spec.dir, WriterKind::Transcoding.file_name())?,
            frame_rate: spec.frame_rate,
            scratch: Vec::new(),
        })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }
}

impl VideoWriter for TranscodingWriter {
    fn kind(&self) -> WriterKind {
        WriterKind::Transcoding
    }

    fn output_path(&self) -> &Path {
        &self.container.path
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), WriterError> {
        let rgb = frame.rgb.as_deref().ok_or(WriterError::MissingBuffer {
            index: frame.index,
            buffer: "rgb",
        })?;
        let expected = frame.width as usize * frame.height as usize * 3;
        if rgb.len() != expected {
            return Err(WriterError::BufferLength {
                index: frame.index,
                expected,
                actual: rgb.len(),
            });
        }

        self.scratch.clear();
        JpegEncoder::new_with_quality(&mut self.scratch, JPEG_QUALITY).encode(
            rgb,
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )?;
        self.container.append(&self.scratch, frame.timestamp)
    }

    fn release(&mut self) -> Result<(), WriterError> {
        self.container.finish()
    }
}
