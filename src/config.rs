//! Transcoder configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::encoder::{AacProfile, EncoderConfig, EncoderPreference, AAC_SAMPLE_RATES};
use crate::error::{Result, TranscodeError};

/// Runtime configuration for one WAV to M4A conversion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Output AAC sample rate in Hz
    pub sample_rate: u32,

    /// Output bitrate in kbps
    pub bitrate_k: u32,

    /// Output channel count
    pub channel_count: u16,

    /// AAC profile
    pub profile: AacProfile,

    /// Largest PCM payload one encoder input slot can hold
    pub max_input_chunk_bytes: usize,

    /// Bytes read from the WAV data region per input slot
    pub read_chunk_bytes: usize,

    /// Number of encoder input arenas
    pub input_slots: usize,

    /// Encoded units allowed to queue before input slots are withheld
    pub max_pending_output: usize,

    /// Bounded wait for an input slot, in milliseconds
    pub input_timeout_ms: u64,

    /// Bounded wait for an encoded unit, in milliseconds
    pub output_timeout_ms: u64,

    /// Fail the conversion when neither input nor output moves for this long
    pub stall_timeout_ms: u64,

    /// Encoder backend preference
    pub encoder: EncoderPreference,

    /// Keep the staging file after a failed conversion
    pub keep_partial_output: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            bitrate_k: 64,
            channel_count: 1, // recordings are mono
            profile: AacProfile::Lc,
            max_input_chunk_bytes: 16384,
            read_chunk_bytes: 2048,
            input_slots: 4,
            max_pending_output: 16,
            input_timeout_ms: 10,
            output_timeout_ms: 10,
            stall_timeout_ms: 30_000,
            encoder: EncoderPreference::Auto,
            keep_partial_output: false,
        }
    }
}

impl TranscodeConfig {
    /// Bitrate in bits per second
    pub fn bitrate_bps(&self) -> u64 {
        self.bitrate_k as u64 * 1000
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_millis(self.input_timeout_ms)
    }

    pub fn output_timeout(&self) -> Duration {
        Duration::from_millis(self.output_timeout_ms)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Check that the values describe an encoder we can actually configure.
    pub fn validate(&self) -> Result<()> {
        if !AAC_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(TranscodeError::Config(format!(
                "sample_rate {} is not an AAC sampling frequency",
                self.sample_rate
            )));
        }
        if self.bitrate_k == 0 {
            return Err(TranscodeError::Config("bitrate_k must be positive".into()));
        }
        if !(1..=2).contains(&self.channel_count) {
            return Err(TranscodeError::Config(format!(
                "channel_count {} out of range 1..=2",
                self.channel_count
            )));
        }
        if self.profile != AacProfile::Lc {
            // the container's AudioSpecificConfig is derived from profile, rate
            // and channels, which cannot express the SBR/PS extension fields
            return Err(TranscodeError::Config(format!(
                "profile {:?} is not supported, only AAC-LC can be written to M4A",
                self.profile
            )));
        }
        if self.read_chunk_bytes == 0 || self.read_chunk_bytes > self.max_input_chunk_bytes {
            return Err(TranscodeError::Config(format!(
                "read_chunk_bytes {} must be in 1..={}",
                self.read_chunk_bytes, self.max_input_chunk_bytes
            )));
        }
        if self.input_slots == 0 || self.max_pending_output == 0 {
            return Err(TranscodeError::Config(
                "input_slots and max_pending_output must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Encoder configuration for a source with the given PCM layout.
    pub fn encoder_config(&self, input_sample_rate: u32, input_channels: u16) -> EncoderConfig {
        EncoderConfig {
            sample_rate: self.sample_rate,
            channel_count: self.channel_count,
            bitrate_bps: self.bitrate_bps(),
            profile: self.profile,
            max_input_chunk_bytes: self.max_input_chunk_bytes,
            input_sample_rate,
            input_channels,
            input_slots: self.input_slots,
            max_pending_output: self.max_pending_output,
            preference: self.encoder,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: TranscodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &str) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TranscodeConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.bitrate_bps(), 64_000);
        assert_eq!(config.channel_count, 1);
        assert_eq!(config.max_input_chunk_bytes, 16384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_aac_rate() {
        let config = TranscodeConfig {
            sample_rate: 17000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TranscodeError::Config(_))));
    }

    #[test]
    fn test_rejects_he_profiles() {
        for profile in [AacProfile::He, AacProfile::HeV2] {
            let config = TranscodeConfig {
                profile,
                channel_count: 2,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        }
        let mono_v2: TranscodeConfig = toml::from_str("profile = \"he_v2\"").unwrap();
        assert!(mono_v2.validate().is_err());
    }

    #[test]
    fn test_read_chunk_cannot_exceed_slot() {
        let config = TranscodeConfig {
            read_chunk_bytes: 32768,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TranscodeConfig = toml::from_str("bitrate_k = 96\nprofile = \"lc\"").unwrap();
        assert_eq!(config.bitrate_bps(), 96_000);
        assert_eq!(config.sample_rate, 16000);
    }

    #[test]
    fn test_encoder_config_carries_source_layout() {
        let config = TranscodeConfig::default();
        let enc = config.encoder_config(44100, 2);
        assert_eq!(enc.input_sample_rate, 44100);
        assert_eq!(enc.input_channels, 2);
        assert_eq!(enc.sample_rate, 16000);
        assert_eq!(enc.channel_count, 1);
    }
}
