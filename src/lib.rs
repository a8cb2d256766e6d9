//! WAV to M4A transcoder
//!
//! Converts 16-bit PCM WAV recordings into AAC audio in an MPEG-4 (M4A)
//! container. A conversion reads the RIFF data region in chunks, feeds them
//! through an FFmpeg AAC encoder session and writes the access units with
//! the `mp4` crate.

pub mod api;
pub mod config;
pub mod config_file;
pub mod encoder;
pub mod error;
pub mod ffmpeg;
pub mod muxer;
pub mod pipeline;
pub mod wav;

#[cfg(test)]
mod tests;

pub use api::{transcode_file, transcode_file_async, Outcome};
pub use config::TranscodeConfig;
pub use error::{ErrorKind, Failure, Result, TranscodeError};
pub use pipeline::{ConversionReport, PipelineDriver, PipelineState};
