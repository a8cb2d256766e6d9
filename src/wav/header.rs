//! RIFF/WAVE header parsing
//!
//! Walks the top-level RIFF sub-chunks by id instead of assuming the canonical
//! 44-byte layout, so `LIST`/`fact` chunks and extensible `fmt ` bodies are
//! handled.

use std::io::{self, Read, Seek, SeekFrom};
use std::time::Duration;

use crate::error::{Result, TranscodeError};

const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;
/// Upper bound for a `fmt ` body; real ones are 16, 18 or 40 bytes.
const MAX_FMT_BYTES: u32 = 1024;

/// Parsed description of a 16-bit PCM WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
    /// Absolute file offset of the first PCM byte
    pub data_offset: u32,
    /// PCM bytes available from `data_offset`
    pub data_length: u32,
}

impl WavHeader {
    /// Bytes per sample frame (all channels)
    pub fn block_align(&self) -> usize {
        self.channel_count as usize * (self.bits_per_sample as usize / 8)
    }

    /// Whole sample frames in the data region
    pub fn frame_count(&self) -> u64 {
        self.data_length as u64 / self.block_align() as u64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Parse a header from the start of `reader`.
    ///
    /// `file_len` bounds the data region; a declared data length running past
    /// the end of the file (streaming writers leave it unpatched) is clamped.
    pub fn parse<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<Self> {
        let mut riff = [0u8; 12];
        read_exact_or(reader, &mut riff, "file shorter than RIFF header")?;
        if &riff[0..4] != b"RIFF" || &riff[8..12] != b"WAVE" {
            return Err(TranscodeError::MalformedHeader(
                "missing RIFF/WAVE signature".into(),
            ));
        }

        let mut pos: u64 = 12;
        let mut format: Option<FmtChunk> = None;

        loop {
            let mut chunk = [0u8; 8];
            if !read_chunk_header(reader, &mut chunk)? {
                return Err(TranscodeError::MalformedHeader(if format.is_some() {
                    "no data chunk".into()
                } else {
                    "no fmt chunk".into()
                }));
            }
            let id = [chunk[0], chunk[1], chunk[2], chunk[3]];
            let size = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            pos += 8;

            match &id {
                b"fmt " => {
                    if !(16..=MAX_FMT_BYTES).contains(&size) {
                        return Err(TranscodeError::MalformedHeader(format!(
                            "fmt chunk size {}",
                            size
                        )));
                    }
                    let mut body = vec![0u8; size as usize];
                    read_exact_or(reader, &mut body, "truncated fmt chunk")?;
                    format = Some(FmtChunk::parse(&body)?);
                    pos += size as u64;
                    if size % 2 == 1 {
                        reader.seek(SeekFrom::Current(1))?;
                        pos += 1;
                    }
                }
                b"data" => {
                    let fmt = format.ok_or_else(|| {
                        TranscodeError::MalformedHeader("data chunk precedes fmt chunk".into())
                    })?;
                    let available = file_len.saturating_sub(pos);
                    let data_length = if size as u64 > available {
                        tracing::warn!(
                            declared = size,
                            available,
                            "WAV data chunk runs past end of file, clamping"
                        );
                        available as u32
                    } else {
                        size
                    };
                    let data_offset = u32::try_from(pos).map_err(|_| {
                        TranscodeError::MalformedHeader("data chunk beyond 4 GiB".into())
                    })?;
                    return Ok(Self {
                        sample_rate: fmt.sample_rate,
                        channel_count: fmt.channel_count,
                        bits_per_sample: fmt.bits_per_sample,
                        data_offset,
                        data_length,
                    });
                }
                _ => {
                    let skip = size as u64 + (size as u64 % 2);
                    tracing::trace!(chunk = %String::from_utf8_lossy(&id), size, "skipping WAV chunk");
                    reader.seek(SeekFrom::Current(skip as i64))?;
                    pos += skip;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FmtChunk {
    sample_rate: u32,
    channel_count: u16,
    bits_per_sample: u16,
}

impl FmtChunk {
    fn parse(body: &[u8]) -> Result<Self> {
        let u16_at = |i: usize| u16::from_le_bytes([body[i], body[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([body[i], body[i + 1], body[i + 2], body[i + 3]]);

        let mut format_tag = u16_at(0);
        let channel_count = u16_at(2);
        let sample_rate = u32_at(4);
        let bits_per_sample = u16_at(14);

        // WAVE_FORMAT_EXTENSIBLE carries the real tag in the sub-format GUID
        if format_tag == WAVE_FORMAT_EXTENSIBLE {
            if body.len() < 26 {
                return Err(TranscodeError::MalformedHeader(
                    "extensible fmt chunk without sub-format".into(),
                ));
            }
            format_tag = u16_at(24);
        }

        if format_tag != WAVE_FORMAT_PCM {
            return Err(TranscodeError::UnsupportedFormat(format!(
                "format tag 0x{:04x}, only uncompressed PCM is supported",
                format_tag
            )));
        }
        if bits_per_sample != 16 {
            return Err(TranscodeError::UnsupportedFormat(format!(
                "{}-bit samples, only 16-bit PCM is supported",
                bits_per_sample
            )));
        }
        if channel_count == 0 || sample_rate == 0 {
            return Err(TranscodeError::MalformedHeader(format!(
                "fmt chunk declares {} channels at {} Hz",
                channel_count, sample_rate
            )));
        }

        Ok(Self {
            sample_rate,
            channel_count,
            bits_per_sample,
        })
    }
}

fn read_exact_or<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TranscodeError::MalformedHeader(what.to_string()),
        _ => TranscodeError::Io(e),
    })
}

/// Read an 8-byte chunk header; `false` on a clean or partial EOF.
fn read_chunk_header<R: Read>(reader: &mut R, buf: &mut [u8; 8]) -> Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
