//! Pipeline driver
//!
//! One driver performs one conversion. It owns the reader, the encoder
//! session and the muxer for the duration of `run` and releases all of them
//! on every exit path.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use super::PipelineState;
use crate::config::TranscodeConfig;
use crate::encoder::{
    samples_to_micros, EncodedAccessUnit, EncoderBackend, EncoderSession, FfmpegBackend,
};
use crate::error::{Result, TranscodeError};
use crate::muxer::{ContainerMuxer, Mp4Opener, MuxerOpener, TrackId};
use crate::wav::{PcmChunks, WavHeader, WavReader};

/// Summary of a successful conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_sample_rate: u32,
    pub input_channels: u16,
    pub input_duration_secs: f64,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bitrate_bps: u64,
    /// Concrete encoder the backend resolved
    pub encoder: String,
    pub access_units: u64,
    pub payload_bytes: u64,
    /// Sum of the encoder-reported unit durations
    pub encoded_duration_secs: f64,
    pub elapsed_ms: u64,
}

/// Resources acquired by a conversion; `fail` releases whatever is present
#[derive(Default)]
struct Resources {
    encoder: Option<Box<dyn EncoderSession>>,
    muxer: Option<Box<dyn ContainerMuxer>>,
}

/// Running totals of the main loop
#[derive(Debug, Default)]
struct Progress {
    frames_submitted: u64,
    units_written: u64,
    payload_bytes: u64,
    encoded_micros: i64,
    track: Option<TrackId>,
}

/// Drives a single WAV to M4A conversion
pub struct PipelineDriver {
    config: TranscodeConfig,
    backend: Box<dyn EncoderBackend>,
    opener: Box<dyn MuxerOpener>,
    state: PipelineState,
}

impl PipelineDriver {
    /// Driver using the FFmpeg AAC encoder and the M4A file muxer.
    pub fn new(config: TranscodeConfig) -> Self {
        let opener = Mp4Opener::new(config.keep_partial_output);
        Self::with_components(config, Box::new(FfmpegBackend::new()), Box::new(opener))
    }

    pub fn with_components(
        config: TranscodeConfig,
        backend: Box<dyn EncoderBackend>,
        opener: Box<dyn MuxerOpener>,
    ) -> Self {
        Self {
            config,
            backend,
            opener,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &TranscodeConfig {
        &self.config
    }

    /// Convert `input` into `output`. Consumes the driver.
    pub fn run(mut self, input: &Path, output: &Path) -> Result<ConversionReport> {
        let started = Instant::now();
        tracing::info!(
            input = %input.display(),
            output = %output.display(),
            backend = self.backend.name(),
            "Starting conversion"
        );

        let mut resources = Resources::default();
        match self.convert(input, output, &mut resources, started) {
            Ok(report) => {
                tracing::info!(
                    output = %output.display(),
                    units = report.access_units,
                    bytes = report.payload_bytes,
                    duration_secs = report.encoded_duration_secs,
                    elapsed_ms = report.elapsed_ms,
                    "Conversion finished"
                );
                Ok(report)
            }
            Err(e) => {
                self.fail(&mut resources, &e);
                Err(e)
            }
        }
    }

    fn convert(
        &mut self,
        input: &Path,
        output: &Path,
        resources: &mut Resources,
        started: Instant,
    ) -> Result<ConversionReport> {
        validate_paths(input, output)?;
        self.config.validate()?;

        let reader = WavReader::open(input)?;
        let header = *reader.header();
        if !(1..=2).contains(&header.channel_count) {
            return Err(TranscodeError::UnsupportedFormat(format!(
                "{} channels, only mono and stereo input is supported",
                header.channel_count
            )));
        }
        tracing::debug!(
            sample_rate = header.sample_rate,
            channels = header.channel_count,
            data_bytes = header.data_length,
            "WAV header parsed"
        );
        let chunks = reader.into_chunks(self.config.read_chunk_bytes)?;

        let encoder_config = self
            .config
            .encoder_config(header.sample_rate, header.channel_count);
        let encoder = resources
            .encoder
            .insert(self.backend.configure(&encoder_config)?);
        let muxer = resources.muxer.insert(self.opener.open(output)?);
        self.transition(PipelineState::Feeding)?;

        let progress = self.pump(chunks, &header, &mut **encoder, &mut **muxer)?;

        muxer.finalize()?;
        encoder.close()?;
        self.transition(PipelineState::Finished)?;

        Ok(ConversionReport {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            input_sample_rate: header.sample_rate,
            input_channels: header.channel_count,
            input_duration_secs: header.duration().as_secs_f64(),
            sample_rate: self.config.sample_rate,
            channel_count: self.config.channel_count,
            bitrate_bps: self.config.bitrate_bps(),
            encoder: encoder.name().to_string(),
            access_units: progress.units_written,
            payload_bytes: progress.payload_bytes,
            encoded_duration_secs: progress.encoded_micros as f64 / 1_000_000.0,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Feed and drain until the encoder reports end of stream. Leaves the
    /// driver in `Finalizing`.
    fn pump(
        &mut self,
        mut chunks: PcmChunks,
        header: &WavHeader,
        encoder: &mut dyn EncoderSession,
        muxer: &mut dyn ContainerMuxer,
    ) -> Result<Progress> {
        let block_align = header.block_align() as u64;
        let input_timeout = self.config.input_timeout();
        let output_timeout = self.config.output_timeout();
        let stall_timeout = self.config.stall_timeout();

        let mut progress = Progress::default();
        let mut last_progress = Instant::now();

        loop {
            let mut moved = false;

            if self.state == PipelineState::Feeding {
                if let Some(mut slot) = encoder.acquire_input_slot(input_timeout)? {
                    let pts =
                        samples_to_micros(progress.frames_submitted as i64, header.sample_rate);
                    match chunks.next() {
                        Some(chunk) => {
                            let chunk = chunk?;
                            slot.buffer_mut().copy_from(chunk.as_bytes())?;
                            progress.frames_submitted += chunk.len() as u64 / block_align;
                            encoder.submit(slot, pts, false)?;
                            self.transition(PipelineState::Draining)?;
                        }
                        None => {
                            encoder.submit(slot, pts, true)?;
                            tracing::debug!(
                                frames = progress.frames_submitted,
                                pts_us = pts,
                                "Input exhausted, end of stream submitted"
                            );
                            self.transition(PipelineState::AwaitingEndOfStream)?;
                        }
                    }
                    moved = true;
                } else {
                    self.transition(PipelineState::Draining)?;
                }
            }

            // drain to exhaustion before feeding again
            while let Some(unit) = encoder.retrieve_output(output_timeout)? {
                moved = true;
                if !unit.payload.is_empty() {
                    write_unit(encoder, muxer, &mut progress, &unit)?;
                }
                if unit.is_end_of_stream {
                    tracing::debug!(
                        units = progress.units_written,
                        end_us = unit.pts_micros,
                        "Encoder end of stream"
                    );
                    self.transition(PipelineState::Finalizing)?;
                    return Ok(progress);
                }
            }

            if self.state == PipelineState::Draining {
                self.transition(PipelineState::Feeding)?;
            }

            if moved {
                last_progress = Instant::now();
            } else if last_progress.elapsed() >= stall_timeout {
                return Err(TranscodeError::EncodeFailure(format!(
                    "no encoder progress for {} ms in state {}",
                    stall_timeout.as_millis(),
                    self.state
                )));
            }
        }
    }

    fn transition(&mut self, next: PipelineState) -> Result<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(TranscodeError::EncodeFailure(format!(
                "illegal pipeline transition {} -> {}",
                self.state, next
            )));
        }
        match next {
            PipelineState::Feeding | PipelineState::Draining => {
                tracing::trace!(from = %self.state, to = %next, "Pipeline state")
            }
            _ => tracing::debug!(from = %self.state, to = %next, "Pipeline state"),
        }
        self.state = next;
        Ok(())
    }

    /// Release everything after an error. The encoder goes first, then the
    /// muxer is aborted so no usable file is published.
    fn fail(&mut self, resources: &mut Resources, error: &TranscodeError) {
        tracing::warn!(
            kind = %error.kind(),
            state = %self.state,
            error = %error,
            "Conversion failed"
        );
        if !self.state.is_terminal() {
            self.state = PipelineState::Failed;
        }

        if let Some(mut encoder) = resources.encoder.take() {
            if let Err(e) = encoder.close() {
                tracing::warn!(error = %e, "Failed to close encoder during cleanup");
            }
        }
        if let Some(mut muxer) = resources.muxer.take() {
            muxer.abort();
        }
    }
}

/// Add the track on first data, then append the unit.
fn write_unit(
    encoder: &dyn EncoderSession,
    muxer: &mut dyn ContainerMuxer,
    progress: &mut Progress,
    unit: &EncodedAccessUnit,
) -> Result<()> {
    let track = match progress.track {
        Some(id) => id,
        None => {
            let descriptor = encoder.output_format().ok_or_else(|| {
                TranscodeError::EncodeFailure("encoded data before output format".into())
            })?;
            let id = muxer.add_track(&descriptor)?;
            muxer.start()?;
            tracing::debug!(
                sample_rate = descriptor.sample_rate,
                channels = descriptor.channel_count,
                asc_bytes = descriptor.codec_specific_data.len(),
                "Output format negotiated"
            );
            progress.track = Some(id);
            id
        }
    };

    muxer.write_sample(track, unit)?;
    progress.units_written += 1;
    progress.payload_bytes += unit.payload.len() as u64;
    progress.encoded_micros += unit.duration_micros;
    Ok(())
}

/// Reject empty paths and converting a file onto itself.
fn validate_paths(input: &Path, output: &Path) -> Result<()> {
    if input.as_os_str().is_empty() {
        return Err(TranscodeError::Config("input path is empty".into()));
    }
    if output.as_os_str().is_empty() {
        return Err(TranscodeError::Config("output path is empty".into()));
    }
    let same = input == output
        || matches!(
            (input.canonicalize(), output.canonicalize()),
            (Ok(a), Ok(b)) if a == b
        );
    if same {
        return Err(TranscodeError::Config(format!(
            "output path {} is the input path",
            output.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_paths() {
        assert!(validate_paths(Path::new("a.wav"), Path::new("a.m4a")).is_ok());
        let empty = validate_paths(Path::new(""), Path::new("a.m4a")).unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::InvalidArgument);
        assert!(validate_paths(Path::new("a.wav"), Path::new("")).is_err());
        assert!(validate_paths(Path::new("a.wav"), Path::new("a.wav")).is_err());
    }

    #[test]
    fn test_new_driver_is_idle() {
        let driver = PipelineDriver::new(TranscodeConfig::default());
        assert_eq!(driver.state(), PipelineState::Idle);
        assert_eq!(driver.config().sample_rate, 16000);
    }
}
