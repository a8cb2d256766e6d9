//! M4A file muxer
//!
//! Samples are appended to a hidden staging file next to the destination.
//! `finalize` writes the `moov` index, syncs, and renames the staging file
//! into place, so the destination path only ever holds a complete file.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use mp4::{
    AacConfig, AudioObjectType, ChannelConfig, FourCC, MediaConfig, Mp4Config, Mp4Sample,
    Mp4Writer, SampleFreqIndex, TrackConfig, TrackType,
};

use super::{ContainerMuxer, MuxerOpener, MuxerState, TrackId};
use crate::encoder::{micros_to_samples, AacProfile, EncodedAccessUnit, TrackDescriptor};
use crate::error::{Result, TranscodeError};

/// Movie-level timescale written to `mvhd`
pub const MOVIE_TIMESCALE: u32 = 1000;

const MAJOR_BRAND: &str = "M4A ";
const COMPATIBLE_BRANDS: &[&str] = &["M4A ", "mp42", "isom"];

/// Opens `Mp4FileMuxer`s
#[derive(Debug, Clone, Default)]
pub struct Mp4Opener {
    pub keep_partial_output: bool,
}

impl Mp4Opener {
    pub fn new(keep_partial_output: bool) -> Self {
        Self {
            keep_partial_output,
        }
    }
}

impl MuxerOpener for Mp4Opener {
    fn open(&self, path: &Path) -> Result<Box<dyn ContainerMuxer>> {
        Ok(Box::new(Mp4FileMuxer::create(
            path,
            self.keep_partial_output,
        )?))
    }
}

/// State of the single audio track
#[derive(Debug, Clone, Copy)]
struct TrackState {
    id: TrackId,
    timescale: u32,
    frame_samples: u32,
    first_pts: Option<i64>,
    last_pts: Option<i64>,
}

/// Single-track AAC muxer writing an `.m4a` file
pub struct Mp4FileMuxer {
    writer: Option<Mp4Writer<BufWriter<File>>>,
    destination: PathBuf,
    staging: PathBuf,
    state: MuxerState,
    track: Option<TrackState>,
    samples_written: u64,
    bytes_written: u64,
    keep_partial_output: bool,
}

impl Mp4FileMuxer {
    /// Create the staging file for `destination` and write the file header.
    pub fn create(destination: &Path, keep_partial_output: bool) -> Result<Self> {
        let staging = staging_path(destination)?;
        let file = File::create(&staging)?;

        let config = Mp4Config {
            major_brand: MAJOR_BRAND.parse::<FourCC>()?,
            minor_version: 0,
            compatible_brands: COMPATIBLE_BRANDS
                .iter()
                .map(|b| b.parse::<FourCC>())
                .collect::<std::result::Result<Vec<_>, _>>()?,
            timescale: MOVIE_TIMESCALE,
        };

        let writer = match Mp4Writer::write_start(BufWriter::new(file), &config) {
            Ok(w) => w,
            Err(e) => {
                let _ = fs::remove_file(&staging);
                return Err(e.into());
            }
        };

        tracing::debug!(
            output = %destination.display(),
            staging = %staging.display(),
            "M4A muxer created"
        );

        Ok(Self {
            writer: Some(writer),
            destination: destination.to_path_buf(),
            staging,
            state: MuxerState::Uninitialized,
            track: None,
            samples_written: 0,
            bytes_written: 0,
            keep_partial_output,
        })
    }

    /// Path the samples are written to until `finalize`
    pub fn staging_path(&self) -> &Path {
        &self.staging
    }

    fn writer_mut(&mut self) -> Result<&mut Mp4Writer<BufWriter<File>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| TranscodeError::Muxing("muxer is closed".into()))
    }

    fn expect_state(&self, expected: MuxerState, op: &str) -> Result<()> {
        if self.state != expected {
            return Err(TranscodeError::Muxing(format!(
                "{} in state {:?}, expected {:?}",
                op, self.state, expected
            )));
        }
        Ok(())
    }

    fn finish_file(&mut self) -> Result<()> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| TranscodeError::Muxing("muxer is closed".into()))?;
        writer.write_end()?;

        let mut buffered = writer.into_writer();
        buffered.flush()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.staging, &self.destination)?;
        Ok(())
    }

    fn remove_staging(&self) {
        if self.keep_partial_output {
            tracing::info!(staging = %self.staging.display(), "Keeping partial output");
            return;
        }
        match fs::remove_file(&self.staging) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(staging = %self.staging.display(), error = %e, "Failed to remove staging file");
            }
        }
    }
}

impl ContainerMuxer for Mp4FileMuxer {
    fn add_track(&mut self, track: &TrackDescriptor) -> Result<TrackId> {
        self.expect_state(MuxerState::Uninitialized, "add_track")?;

        let config = TrackConfig {
            track_type: TrackType::Audio,
            timescale: track.sample_rate,
            language: String::from("und"),
            media_conf: MediaConfig::AacConfig(AacConfig {
                bitrate: u32::try_from(track.bitrate_bps).unwrap_or(u32::MAX),
                profile: object_type(track.profile)?,
                freq_index: freq_index(track.sample_rate)?,
                chan_conf: channel_config(track.channel_count)?,
            }),
        };
        self.writer_mut()?.add_track(&config)?;

        // tracks are numbered from 1 in the order they are added
        let id = TrackId(1);
        self.track = Some(TrackState {
            id,
            timescale: track.sample_rate,
            frame_samples: track.frame_samples,
            first_pts: None,
            last_pts: None,
        });
        self.state = MuxerState::TrackAdded;

        tracing::debug!(
            sample_rate = track.sample_rate,
            channels = track.channel_count,
            bitrate = track.bitrate_bps,
            "Audio track added"
        );
        Ok(id)
    }

    fn start(&mut self) -> Result<()> {
        self.expect_state(MuxerState::TrackAdded, "start")?;
        self.state = MuxerState::Started;
        Ok(())
    }

    fn write_sample(&mut self, track: TrackId, unit: &EncodedAccessUnit) -> Result<()> {
        self.expect_state(MuxerState::Started, "write_sample")?;
        let mut state = match self.track {
            Some(t) if t.id == track => t,
            _ => {
                return Err(TranscodeError::Muxing(format!(
                    "unknown track {:?}",
                    track
                )))
            }
        };
        if unit.payload.is_empty() {
            return Err(TranscodeError::Muxing("empty access unit".into()));
        }
        if let Some(last) = state.last_pts {
            if unit.pts_micros < last {
                return Err(TranscodeError::Muxing(format!(
                    "timestamp {} us precedes previous sample at {} us",
                    unit.pts_micros, last
                )));
            }
        }

        let first = *state.first_pts.get_or_insert(unit.pts_micros);
        let start_time = micros_to_samples(unit.pts_micros - first, state.timescale).max(0) as u64;
        let duration = if unit.duration_micros > 0 {
            micros_to_samples(unit.duration_micros, state.timescale).clamp(1, u32::MAX as i64)
                as u32
        } else {
            state.frame_samples
        };

        let sample = Mp4Sample {
            start_time,
            duration,
            rendering_offset: 0,
            is_sync: true,
            bytes: unit.payload.clone(),
        };
        self.writer_mut()?.write_sample(state.id.0, &sample)?;

        state.last_pts = Some(unit.pts_micros);
        self.track = Some(state);
        self.samples_written += 1;
        self.bytes_written += unit.payload.len() as u64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        match self.state {
            MuxerState::Uninitialized | MuxerState::Started => {}
            state => {
                return Err(TranscodeError::Muxing(format!(
                    "finalize in state {:?}",
                    state
                )))
            }
        }

        if let Err(e) = self.finish_file() {
            self.state = MuxerState::Aborted;
            self.remove_staging();
            return Err(e);
        }

        self.state = MuxerState::Finalized;
        tracing::info!(
            output = %self.destination.display(),
            samples = self.samples_written,
            bytes = self.bytes_written,
            "M4A file finalized"
        );
        Ok(())
    }

    fn abort(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.writer = None;
        self.state = MuxerState::Aborted;
        self.remove_staging();
        tracing::debug!(output = %self.destination.display(), "M4A muxer aborted");
    }

    fn state(&self) -> MuxerState {
        self.state
    }
}

impl Drop for Mp4FileMuxer {
    fn drop(&mut self) {
        self.abort();
    }
}

/// `<dir>/.<name>.<uuid>.part` beside `destination`
fn staging_path(destination: &Path) -> Result<PathBuf> {
    let name = destination.file_name().ok_or_else(|| {
        TranscodeError::Config(format!(
            "output path {} has no file name",
            destination.display()
        ))
    })?;
    let dir = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(dir.join(format!(
        ".{}.{}.part",
        name.to_string_lossy(),
        uuid::Uuid::new_v4()
    )))
}

/// `esds` is built from profile, rate and channels alone, which only
/// describes AAC-LC correctly.
fn object_type(profile: AacProfile) -> Result<AudioObjectType> {
    match profile {
        AacProfile::Lc => Ok(AudioObjectType::AacLowComplexity),
        other => Err(TranscodeError::Muxing(format!(
            "{:?} needs explicit SBR/PS signalling the M4A writer cannot emit",
            other
        ))),
    }
}

fn freq_index(sample_rate: u32) -> Result<SampleFreqIndex> {
    Ok(match sample_rate {
        96000 => SampleFreqIndex::Freq96000,
        88200 => SampleFreqIndex::Freq88200,
        64000 => SampleFreqIndex::Freq64000,
        48000 => SampleFreqIndex::Freq48000,
        44100 => SampleFreqIndex::Freq44100,
        32000 => SampleFreqIndex::Freq32000,
        24000 => SampleFreqIndex::Freq24000,
        22050 => SampleFreqIndex::Freq22050,
        16000 => SampleFreqIndex::Freq16000,
        12000 => SampleFreqIndex::Freq12000,
        11025 => SampleFreqIndex::Freq11025,
        8000 => SampleFreqIndex::Freq8000,
        7350 => SampleFreqIndex::Freq7350,
        other => {
            return Err(TranscodeError::Muxing(format!(
                "{} Hz has no AAC frequency index",
                other
            )))
        }
    })
}

fn channel_config(channels: u16) -> Result<ChannelConfig> {
    match channels {
        1 => Ok(ChannelConfig::Mono),
        2 => Ok(ChannelConfig::Stereo),
        n => Err(TranscodeError::Muxing(format!(
            "{} channels cannot be signalled",
            n
        ))),
    }
}
