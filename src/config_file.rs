//! Configuration file support
//!
//! Loads transcoder configuration from sectioned TOML files.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::TranscodeConfig;
use crate::encoder::{AacProfile, EncoderPreference};

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Output audio settings
    pub audio: AudioSettings,
    /// Encoder settings
    pub encoder: Option<EncoderSettings>,
    /// Buffer exchange settings
    pub pipeline: Option<PipelineSettings>,
    /// Output file settings
    pub output: Option<OutputSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Output AAC sample rate in Hz
    pub sample_rate: u32,
    /// Output bitrate in kbps
    pub bitrate_k: u32,
    /// Output channel count
    pub channel_count: Option<u16>,
    /// AAC profile
    pub profile: Option<AacProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Backend preference (auto, hardware, software)
    pub backend: Option<EncoderPreference>,
    /// Largest PCM payload per input slot
    pub max_input_chunk_bytes: Option<usize>,
    /// Number of input slots
    pub input_slots: Option<usize>,
    /// Encoded units allowed to queue
    pub max_pending_output: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Bytes read from the WAV per input slot
    pub read_chunk_bytes: Option<usize>,
    /// Input slot wait in milliseconds
    pub input_timeout_ms: Option<u64>,
    /// Output wait in milliseconds
    pub output_timeout_ms: Option<u64>,
    /// Stall watchdog in milliseconds
    pub stall_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Keep the staging file when a conversion fails
    pub keep_partial_output: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate default configuration file
    pub fn default_config() -> Self {
        let d = TranscodeConfig::default();
        Self {
            audio: AudioSettings {
                sample_rate: d.sample_rate,
                bitrate_k: d.bitrate_k,
                channel_count: Some(d.channel_count),
                profile: Some(d.profile),
            },
            encoder: Some(EncoderSettings {
                backend: Some(d.encoder),
                max_input_chunk_bytes: Some(d.max_input_chunk_bytes),
                input_slots: Some(d.input_slots),
                max_pending_output: Some(d.max_pending_output),
            }),
            pipeline: Some(PipelineSettings {
                read_chunk_bytes: Some(d.read_chunk_bytes),
                input_timeout_ms: Some(d.input_timeout_ms),
                output_timeout_ms: Some(d.output_timeout_ms),
                stall_timeout_ms: Some(d.stall_timeout_ms),
            }),
            output: Some(OutputSettings {
                keep_partial_output: Some(d.keep_partial_output),
            }),
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                format: Some("pretty".to_string()),
            }),
        }
    }

    /// Log level requested by the file, if any
    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().map(|l| l.level.as_str())
    }

    /// Whether the file asks for JSON log lines
    pub fn json_logs(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }

    /// Convert to TranscodeConfig
    pub fn into_transcode_config(self) -> TranscodeConfig {
        let d = TranscodeConfig::default();
        let encoder = self.encoder.as_ref();
        let pipeline = self.pipeline.as_ref();
        TranscodeConfig {
            sample_rate: self.audio.sample_rate,
            bitrate_k: self.audio.bitrate_k,
            channel_count: self.audio.channel_count.unwrap_or(d.channel_count),
            profile: self.audio.profile.unwrap_or(d.profile),
            max_input_chunk_bytes: encoder
                .and_then(|e| e.max_input_chunk_bytes)
                .unwrap_or(d.max_input_chunk_bytes),
            read_chunk_bytes: pipeline
                .and_then(|p| p.read_chunk_bytes)
                .unwrap_or(d.read_chunk_bytes),
            input_slots: encoder.and_then(|e| e.input_slots).unwrap_or(d.input_slots),
            max_pending_output: encoder
                .and_then(|e| e.max_pending_output)
                .unwrap_or(d.max_pending_output),
            input_timeout_ms: pipeline
                .and_then(|p| p.input_timeout_ms)
                .unwrap_or(d.input_timeout_ms),
            output_timeout_ms: pipeline
                .and_then(|p| p.output_timeout_ms)
                .unwrap_or(d.output_timeout_ms),
            stall_timeout_ms: pipeline
                .and_then(|p| p.stall_timeout_ms)
                .unwrap_or(d.stall_timeout_ms),
            encoder: encoder.and_then(|e| e.backend).unwrap_or(d.encoder),
            keep_partial_output: self
                .output
                .and_then(|o| o.keep_partial_output)
                .unwrap_or(d.keep_partial_output),
        }
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigFile::default_config();
    config.to_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_matches_runtime_defaults() {
        let config = ConfigFile::default_config();
        assert_eq!(config.into_transcode_config(), TranscodeConfig::default());
    }

    #[test]
    fn test_minimal_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[audio]\nsample_rate = 44100\nbitrate_k = 128\n")
            .unwrap();

        let loaded = ConfigFile::from_file(temp_file.path()).unwrap();
        assert!(!loaded.json_logs());
        let config = loaded.into_transcode_config();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.bitrate_bps(), 128_000);
        assert_eq!(config.read_chunk_bytes, 2048);
        assert_eq!(config.encoder, EncoderPreference::Auto);
    }

    #[test]
    fn test_sections_override() {
        let toml_text = r#"
[audio]
sample_rate = 16000
bitrate_k = 48

[encoder]
backend = "software"
input_slots = 2

[pipeline]
read_chunk_bytes = 4096

[output]
keep_partial_output = true

[logging]
level = "debug"
format = "json"
"#;
        let loaded: ConfigFile = toml::from_str(toml_text).unwrap();
        assert_eq!(loaded.log_level(), Some("debug"));
        assert!(loaded.json_logs());

        let config = loaded.into_transcode_config();
        assert_eq!(config.encoder, EncoderPreference::Software);
        assert_eq!(config.input_slots, 2);
        assert_eq!(config.read_chunk_bytes, 4096);
        assert!(config.keep_partial_output);
    }

    #[test]
    fn test_generate_default_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        generate_default_config(&path).unwrap();

        let loaded = ConfigFile::from_file(&path).unwrap();
        assert_eq!(loaded.audio.sample_rate, 16000);
        assert_eq!(loaded.audio.bitrate_k, 64);
    }
}
