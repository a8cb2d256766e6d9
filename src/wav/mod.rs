//! PCM WAV input
//!
//! Parses a 16-bit PCM RIFF/WAVE header and exposes the data region as a lazy
//! sequence of fixed-capacity chunks.

pub mod header;
pub mod reader;

pub use header::WavHeader;
pub use reader::{PcmChunk, PcmChunks, WavReader};
