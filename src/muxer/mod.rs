//! Container muxing module
//!
//! This module handles:
//! - The single-track muxer contract (`ContainerMuxer`) and its state machine
//! - An MP4/M4A file muxer on top of the `mp4` crate
//! - ISOBMFF inspection of finished files

pub mod isobmff;
pub mod mp4_file;
pub mod probe;

use std::path::Path;

use crate::encoder::{EncodedAccessUnit, TrackDescriptor};
use crate::error::Result;

pub use mp4_file::{Mp4FileMuxer, Mp4Opener};
pub use probe::{summarize, AudioTrackSummary, ContainerSummary};

/// Lifecycle of a muxer
///
/// `Uninitialized -> TrackAdded -> Started -> Finalized | Aborted`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    Uninitialized,
    TrackAdded,
    Started,
    Finalized,
    Aborted,
}

impl MuxerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MuxerState::Finalized | MuxerState::Aborted)
    }
}

/// Identifier of a track inside one output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

/// Incremental writer of a single-track container file
pub trait ContainerMuxer {
    /// Register the track. At most once per file.
    fn add_track(&mut self, track: &TrackDescriptor) -> Result<TrackId>;

    /// Begin accepting samples.
    fn start(&mut self) -> Result<()>;

    /// Append one access unit. Timestamps must not go backwards.
    fn write_sample(&mut self, track: TrackId, unit: &EncodedAccessUnit) -> Result<()>;

    /// Write the index structures and publish the file. Exactly once.
    fn finalize(&mut self) -> Result<()>;

    /// Release everything without producing a usable file.
    fn abort(&mut self);

    fn state(&self) -> MuxerState;
}

/// Opens a muxer for an output path
pub trait MuxerOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ContainerMuxer>>;
}
