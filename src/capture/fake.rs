//! Synthetic capture source
//!
//! Produces a moving gradient at a fixed size. Used by the binary when no
//! camera is attached, and by tests.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use super::{CaptureCapabilities, CaptureSource, Frame};

const FAKE_JPEG_QUALITY: u8 = 80;

/// Gradient test pattern source
#[derive(Debug)]
pub struct FakeCapture {
    width: u32,
    height: u32,
    frame_rate: u32,
    capabilities: CaptureCapabilities,
    online: AtomicBool,
    next_index: AtomicU64,
    epoch: Instant,
}

impl FakeCapture {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate: frame_rate.max(1),
            capabilities: CaptureCapabilities::default(),
            online: AtomicBool::new(true),
            next_index: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Also attach a JPEG buffer to every frame
    pub fn with_jpeg_support(mut self, enabled: bool) -> Self {
        self.capabilities.jpeg_support = enabled;
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Produce the next frame
    pub fn grab(&self) -> Result<Frame, ImageError> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let rgb = self.render(index);

        let jpeg = if self.capabilities.jpeg_support {
            let mut buf = Vec::new();
            JpegEncoder::new_with_quality(&mut buf, FAKE_JPEG_QUALITY).encode(
                &rgb,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            )?;
            Some(buf)
        } else {
            None
        };

        Ok(Frame {
            index,
            timestamp: self.epoch.elapsed().as_secs_f64(),
            width: self.width,
            height: self.height,
            rgb: Some(rgb),
            jpeg,
            h264: None,
        })
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let shift = (index % 256) as u32;
        let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                rgb.push(((x + shift) % 256) as u8);
                rgb.push(((y + shift) % 256) as u8);
                rgb.push(shift as u8);
            }
        }
        rgb
    }
}

impl CaptureSource for FakeCapture {
    fn online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    fn capabilities(&self) -> CaptureCapabilities {
        self.capabilities
    }

    fn name(&self) -> String {
        "Fake Capture".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grab_produces_sized_raw_frames() {
        let capture = FakeCapture::new(8, 4, 30);
        let first = capture.grab().unwrap();
        let second = capture.grab().unwrap();

        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(first.rgb.as_ref().unwrap().len(), 8 * 4 * 3);
        assert!(first.jpeg.is_none());
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn test_non_square_frame_buffer_size() {
        let capture = FakeCapture::new(1920, 1080, 30);
        let frame = capture.grab().unwrap();

        assert_eq!(frame.width, 1920);
        assert_eq!(frame.height, 1080);
        assert_eq!(frame.rgb.unwrap().len(), 1920 * 1080 * 3);
    }

    #[test]
    fn test_jpeg_support_attaches_jpeg_buffer() {
        let capture = FakeCapture::new(16, 16, 30).with_jpeg_support(true);
        assert!(capture.capabilities().jpeg_support);

        let frame = capture.grab().unwrap();
        let jpeg = frame.jpeg.unwrap();
        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_online_toggle() {
        let capture = FakeCapture::new(4, 4, 0);
        assert!(capture.online());
        assert_eq!(capture.frame_rate(), 1);
        capture.set_online(false);
        assert!(!capture.online());
    }
}
