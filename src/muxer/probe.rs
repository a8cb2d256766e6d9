//! Summaries of finished M4A files, read straight from the box tree.

use serde::Serialize;

use super::isobmff::{read_u16, read_u32, read_u64, walk_boxes, CONTAINER_BOXES};
use crate::error::{Result, TranscodeError};

/// Facts about the first audio track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrackSummary {
    /// Sample entry type, `mp4a` for AAC
    pub codec: String,
    pub channel_count: u16,
    pub sample_rate: u32,
    /// Media timescale from `mdhd`
    pub timescale: u32,
    /// Media duration in `timescale` units
    pub duration: u64,
    pub sample_count: u32,
}

impl AudioTrackSummary {
    pub fn duration_secs(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.duration as f64 / self.timescale as f64
    }
}

/// Top-level view of an ISOBMFF file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSummary {
    pub major_brand: String,
    pub compatible_brands: Vec<String>,
    pub movie_timescale: u32,
    pub movie_duration: u64,
    pub track_count: usize,
    pub audio: Option<AudioTrackSummary>,
}

impl ContainerSummary {
    pub fn duration_secs(&self) -> f64 {
        if self.movie_timescale == 0 {
            return 0.0;
        }
        self.movie_duration as f64 / self.movie_timescale as f64
    }
}

/// Summarize an in-memory MP4/M4A file.
pub fn summarize(data: &[u8]) -> Result<ContainerSummary> {
    let mut ftyp = None;
    let mut mvhd = None;
    let mut track_count = 0;
    let mut mdhd = None;
    let mut stsd = None;
    let mut stsz = None;

    walk_boxes(data, CONTAINER_BOXES, &mut |btype, payload| match btype {
        b"ftyp" => ftyp = ftyp.or(Some(payload)),
        b"mvhd" => mvhd = mvhd.or(Some(payload)),
        b"tkhd" => track_count += 1,
        b"mdhd" => mdhd = mdhd.or(Some(payload)),
        b"stsd" => stsd = stsd.or(Some(payload)),
        b"stsz" => stsz = stsz.or(Some(payload)),
        _ => {}
    });

    let ftyp = ftyp.ok_or_else(|| malformed("no ftyp box"))?;
    let mvhd = mvhd.ok_or_else(|| malformed("no moov/mvhd box"))?;

    let major_brand = fourcc(ftyp, 0).ok_or_else(|| malformed("short ftyp"))?;
    let compatible_brands = (8..ftyp.len())
        .step_by(4)
        .filter_map(|pos| fourcc(ftyp, pos))
        .collect();
    let (movie_timescale, movie_duration) =
        timescale_and_duration(mvhd).ok_or_else(|| malformed("short mvhd"))?;

    let audio = match (mdhd, stsd) {
        (Some(mdhd), Some(stsd)) => Some(audio_summary(mdhd, stsd, stsz)?),
        _ => None,
    };

    Ok(ContainerSummary {
        major_brand,
        compatible_brands,
        movie_timescale,
        movie_duration,
        track_count,
        audio,
    })
}

fn audio_summary(mdhd: &[u8], stsd: &[u8], stsz: Option<&[u8]>) -> Result<AudioTrackSummary> {
    let (timescale, duration) =
        timescale_and_duration(mdhd).ok_or_else(|| malformed("short mdhd"))?;

    // full box header + entry_count, then the sample entries
    let entries = stsd.get(8..).ok_or_else(|| malformed("short stsd"))?;
    let mut entry = None;
    walk_boxes(entries, &[], &mut |btype, payload| {
        if entry.is_none() {
            entry = Some((*btype, payload));
        }
    });
    let (codec, payload) = entry.ok_or_else(|| malformed("empty stsd"))?;

    // AudioSampleEntry: 8 bytes SampleEntry, 8 reserved, then
    // channelcount(16) samplesize(16) pre_defined(16) reserved(16) samplerate(16.16)
    let channel_count = read_u16(payload, 16).ok_or_else(|| malformed("short sample entry"))?;
    let sample_rate = read_u32(payload, 24)
        .map(|fixed| fixed >> 16)
        .ok_or_else(|| malformed("short sample entry"))?;

    let sample_count = stsz.and_then(|p| read_u32(p, 8)).unwrap_or(0);

    Ok(AudioTrackSummary {
        codec: String::from_utf8_lossy(&codec).into_owned(),
        channel_count,
        sample_rate,
        timescale,
        duration,
        sample_count,
    })
}

/// `(timescale, duration)` from an `mvhd` or `mdhd` payload.
fn timescale_and_duration(payload: &[u8]) -> Option<(u32, u64)> {
    match payload.first()? {
        1 => Some((read_u32(payload, 20)?, read_u64(payload, 24)?)),
        _ => Some((read_u32(payload, 12)?, read_u32(payload, 16)? as u64)),
    }
}

fn fourcc(data: &[u8], pos: usize) -> Option<String> {
    data.get(pos..pos + 4)
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

fn malformed(what: &str) -> TranscodeError {
    TranscodeError::Muxing(format!("not an M4A file: {}", what))
}
