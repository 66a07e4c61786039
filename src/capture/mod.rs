//! Capture source interface
//!
//! The recorder does not grab frames itself. The host capture loop hands it
//! one `CycleEvents` per processed frame and exposes the source's properties
//! through the `CaptureSource` trait.

mod fake;

pub use fake::FakeCapture;

use serde_json::Value;
use std::collections::BTreeMap;

/// A single world camera frame
///
/// A source fills in whichever encodings it produces natively. Writer
/// backends pick the buffer they need.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Monotonic frame index assigned by the source
    pub index: u64,
    /// Capture timestamp in seconds
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    /// Raw RGB8 pixels, `width * height * 3` bytes
    pub rgb: Option<Vec<u8>>,
    /// Pre-compressed JPEG image
    pub jpeg: Option<Vec<u8>>,
    /// H.264 Annex-B access unit from a hardware encoder
    pub h264: Option<Vec<u8>>,
}

impl Frame {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Encodings a capture source can supply without extra work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureCapabilities {
    /// Frames carry a JPEG buffer
    pub jpeg_support: bool,
    /// Frames carry an H.264 bitstream buffer
    pub h264_bitstream: bool,
}

/// Properties of the world capture source queried by the recorder
pub trait CaptureSource: Send + Sync {
    /// Whether the source is currently delivering frames
    fn online(&self) -> bool;

    /// Frame size in pixels (width, height)
    fn frame_size(&self) -> (u32, u32);

    /// Nominal frames per second
    fn frame_rate(&self) -> u32;

    fn capabilities(&self) -> CaptureCapabilities;

    /// Camera name used to look up intrinsics
    fn name(&self) -> String {
        "world".to_string()
    }
}

/// Everything produced during one processing cycle
///
/// `frame` is routed to the video writer. Every named batch is appended to
/// the session's event streams, except the reserved `frame` and `dt` names.
#[derive(Debug, Clone, Default)]
pub struct CycleEvents {
    pub frame: Option<Frame>,
    pub batches: BTreeMap<String, Vec<Value>>,
}

impl CycleEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Add items under a stream name, extending any batch already present
    pub fn with_batch(mut self, name: &str, items: Vec<Value>) -> Self {
        self.batches.entry(name.to_string()).or_default().extend(items);
        self
    }
}
