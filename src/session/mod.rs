//! Recording sessions
//!
//! The [`SessionController`] turns start/stop requests into take directories,
//! a world video, buffered event streams and the metadata files saved next to
//! them.

pub mod aggregator;
pub mod artifacts;
pub mod controller;
pub mod metadata;
pub mod path;

pub use aggregator::EventAggregator;
pub use controller::{
    ActiveSession, Artifact, ArtifactWarning, CommandOutcome, RecorderSettings, RecorderState,
    SessionController, StopReport,
};
pub use metadata::MetadataRecord;
pub use path::TakeDir;
