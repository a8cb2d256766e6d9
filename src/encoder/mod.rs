//! Audio encoder abstraction
//!
//! This module handles:
//! - The bounded buffer-exchange contract (`EncoderSession`)
//! - Encoder variants resolved at configure time (`EncoderBackend`)
//! - Fixed-capacity PCM input arenas
//! - The FFmpeg-backed AAC session and its sample converter

pub mod aac;
pub mod buffer;
pub mod converter;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

pub use aac::{FfmpegAacSession, FfmpegBackend};
pub use buffer::{InputSlot, PcmBuffer, SlotPool};

/// Sampling frequencies an AAC AudioSpecificConfig can signal by index
pub const AAC_SAMPLE_RATES: &[u32] = &[
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// AAC frame size (samples per channel per access unit)
pub const AAC_FRAME_SIZE: usize = 1024;

/// AAC object type requested from the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AacProfile {
    Lc,
    He,
    HeV2,
}

impl AacProfile {
    /// `AV_PROFILE_AAC_*` value for `AVCodecContext.profile`
    pub fn av_profile(self) -> i32 {
        match self {
            AacProfile::Lc => 1,
            AacProfile::He => 4,
            AacProfile::HeV2 => 28,
        }
    }
}

/// Which encoder variants a backend may choose from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderPreference {
    /// Hardware when present, otherwise software
    Auto,
    Hardware,
    Software,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    Hardware,
    Software,
}

/// Parameters an encoder session is configured with
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    /// Output sample rate
    pub sample_rate: u32,
    /// Output channel count
    pub channel_count: u16,
    pub bitrate_bps: u64,
    pub profile: AacProfile,
    /// Capacity of each input slot
    pub max_input_chunk_bytes: usize,
    /// Sample rate of the submitted PCM
    pub input_sample_rate: u32,
    /// Channel count of the submitted PCM
    pub input_channels: u16,
    pub input_slots: usize,
    pub max_pending_output: usize,
    pub preference: EncoderPreference,
}

impl EncoderConfig {
    /// Bytes per submitted sample frame (16-bit interleaved)
    pub fn input_block_align(&self) -> usize {
        self.input_channels as usize * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecId {
    Aac,
}

/// Negotiated output format, known once the encoder has produced data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub codec: CodecId,
    pub profile: AacProfile,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate_bps: u64,
    /// Samples per channel in one full access unit
    pub frame_samples: u32,
    /// AudioSpecificConfig bytes
    pub codec_specific_data: Bytes,
}

/// One compressed frame, or the end-of-stream marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAccessUnit {
    pub payload: Bytes,
    pub pts_micros: i64,
    /// Decoded duration reported by the encoder
    pub duration_micros: i64,
    pub is_end_of_stream: bool,
}

impl EncodedAccessUnit {
    pub fn new(payload: Bytes, pts_micros: i64, duration_micros: i64) -> Self {
        Self {
            payload,
            pts_micros,
            duration_micros,
            is_end_of_stream: false,
        }
    }

    /// Empty unit carrying only the end-of-stream flag
    pub fn end_of_stream(pts_micros: i64) -> Self {
        Self {
            payload: Bytes::new(),
            pts_micros,
            duration_micros: 0,
            is_end_of_stream: true,
        }
    }
}

/// A configured, running encoder exchanging buffers with its caller.
///
/// Both wait operations are bounded: they return `None` when nothing is
/// available within `timeout`, which is not an error.
pub trait EncoderSession {
    /// Name of the concrete encoder behind this session.
    fn name(&self) -> &str;

    /// Borrow a free input arena.
    fn acquire_input_slot(&mut self, timeout: Duration) -> Result<Option<InputSlot>>;

    /// Queue the slot's valid bytes at `pts_micros`. With `end_of_stream`
    /// set the slot should be empty and no further input is accepted.
    fn submit(&mut self, slot: InputSlot, pts_micros: i64, end_of_stream: bool) -> Result<()>;

    /// Take the next encoded unit.
    fn retrieve_output(&mut self, timeout: Duration) -> Result<Option<EncodedAccessUnit>>;

    /// Output format, once known.
    fn output_format(&self) -> Option<TrackDescriptor>;

    /// Stop and release the encoder. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Something that can produce encoder sessions
pub trait EncoderBackend: Send + Sync {
    fn name(&self) -> &str;

    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderSession>>;
}

/// Sample count to microseconds, rounding toward negative infinity.
pub fn samples_to_micros(samples: i64, sample_rate: u32) -> i64 {
    (samples as i128 * 1_000_000).div_euclid(sample_rate as i128) as i64
}

/// Microseconds to sample ticks, rounding to nearest.
pub fn micros_to_samples(micros: i64, sample_rate: u32) -> i64 {
    (micros as i128 * sample_rate as i128 + 500_000).div_euclid(1_000_000) as i64
}
