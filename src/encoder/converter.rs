//! Sample converter for the encoder input
//!
//! Converts interleaved 16-bit PCM at the source rate/layout into the
//! encoder's native sample format, rate and layout.

use crate::error::{FfmpegError, Result, TranscodeError};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

/// Format of the PCM handed to the pipeline
pub const INPUT_SAMPLE_FORMAT: Sample = Sample::I16(Type::Packed);

/// Output frames are allocated with this many samples of headroom over the
/// rate-scaled input size.
const OUTPUT_HEADROOM: usize = 256;

/// Channel layout for a supported channel count.
pub fn layout_for(channels: u16) -> Result<ChannelLayout> {
    match channels {
        1 => Ok(ChannelLayout::MONO),
        2 => Ok(ChannelLayout::STEREO),
        n => Err(TranscodeError::UnsupportedFormat(format!(
            "{} channels, only mono and stereo are supported",
            n
        ))),
    }
}

/// Audio converter wrapping FFmpeg's `SwrContext`
pub struct SampleConverter {
    context: resampling::Context,
    input_rate: u32,
    input_layout: ChannelLayout,
    input_block_align: usize,
    output_format: Sample,
    output_layout: ChannelLayout,
    output_rate: u32,
}

impl SampleConverter {
    pub fn new(
        input_rate: u32,
        input_channels: u16,
        output_format: Sample,
        output_rate: u32,
        output_channels: u16,
    ) -> Result<Self> {
        let input_layout = layout_for(input_channels)?;
        let output_layout = layout_for(output_channels)?;

        let context = resampling::Context::get(
            INPUT_SAMPLE_FORMAT,
            input_layout,
            input_rate,
            output_format,
            output_layout,
            output_rate,
        )
        .map_err(|e| {
            FfmpegError::ResamplerCreate(format!(
                "{} Hz/{} ch -> {} Hz/{} ch: {}",
                input_rate, input_channels, output_rate, output_channels, e
            ))
        })?;

        Ok(Self {
            context,
            input_rate,
            input_layout,
            input_block_align: input_channels as usize * 2,
            output_format,
            output_layout,
            output_rate,
        })
    }

    /// Convert a block of interleaved 16-bit PCM.
    ///
    /// Returns `None` while the resampler is still filling its delay line.
    pub fn convert(&mut self, pcm: &[u8]) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let samples = pcm.len() / self.input_block_align;
        if samples == 0 {
            return Ok(None);
        }

        let mut input =
            ffmpeg::util::frame::Audio::new(INPUT_SAMPLE_FORMAT, samples, self.input_layout);
        input.set_rate(self.input_rate);
        input.data_mut(0)[..samples * self.input_block_align]
            .copy_from_slice(&pcm[..samples * self.input_block_align]);

        let capacity = (samples as u64 * self.output_rate as u64).div_ceil(self.input_rate as u64)
            as usize
            + OUTPUT_HEADROOM;
        // allocated but unfilled: swr treats nb_samples as capacity only
        let mut out = self.output_frame(capacity);

        self.context
            .run(&input, &mut out)
            .map_err(|e| FfmpegError::Resample(format!("convert: {}", e)))?;

        if out.samples() == 0 {
            return Ok(None);
        }
        Ok(Some(out))
    }

    /// Drain samples still buffered in the resampler.
    ///
    /// When source and output rates match nothing is buffered and FFmpeg may
    /// report an error for the flush; that is treated as "no samples".
    pub fn flush(&mut self) -> Result<Vec<ffmpeg::util::frame::Audio>> {
        let mut frames = Vec::new();
        loop {
            let mut out = self.output_frame(OUTPUT_HEADROOM * 4);
            match self.context.flush(&mut out) {
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("Resampler flush returned non-fatal error: {}", e);
                    break;
                }
            }
            if out.samples() == 0 {
                break;
            }
            frames.push(out);
        }
        Ok(frames)
    }

    fn output_frame(&self, samples: usize) -> ffmpeg::util::frame::Audio {
        let mut frame =
            ffmpeg::util::frame::Audio::new(self.output_format, samples, self.output_layout);
        frame.set_rate(self.output_rate);
        frame
    }
}
