//! WAV fixtures generated on the fly

use std::f64::consts::PI;
use std::path::Path;

/// A 440 Hz tone, the same sample on every channel.
pub fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    write_pcm16(path, sample_rate, channels, frames, |i| {
        ((2.0 * PI * 440.0 * i as f64 / sample_rate as f64).sin() * 8000.0) as i16
    });
}

/// Digital silence.
pub fn write_silence_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) {
    write_pcm16(path, sample_rate, channels, frames, |_| 0);
}

fn write_pcm16(
    path: &Path,
    sample_rate: u32,
    channels: u16,
    frames: u32,
    sample: impl Fn(u32) -> i16,
) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        let v = sample(i);
        for _ in 0..channels {
            writer.write_sample(v).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Canonical 44-byte header followed by `data`, with whatever format
/// fields are asked for.
pub fn write_raw_wav(path: &Path, channels: u16, sample_rate: u32, bits: u16, data: &[u8]) {
    let block_align = channels * bits.div_ceil(8);
    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    if data.len() % 2 == 1 {
        out.push(0);
    }
    std::fs::write(path, out).unwrap();
}
