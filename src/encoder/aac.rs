//! AAC encoder session backed by FFmpeg
//!
//! Wraps an FFmpeg `AVCodecContext` behind the slot/output exchange of
//! `EncoderSession`. Submitted PCM goes through the sample converter into a
//! FIFO that is cut into encoder-sized frames; every packet the codec emits
//! lands in a bounded ready queue.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type};

use super::converter::{layout_for, SampleConverter};
use super::{
    micros_to_samples, samples_to_micros, CodecId, EncodedAccessUnit, EncoderBackend,
    EncoderConfig, EncoderKind, EncoderPreference, EncoderSession, InputSlot, SlotPool,
    TrackDescriptor, AAC_FRAME_SIZE,
};
use crate::error::{ErrorKind, FfmpegError, Result, TranscodeError};

/// A concrete FFmpeg AAC encoder and the sample format it consumes
#[derive(Debug, Clone, Copy)]
struct Candidate {
    name: &'static str,
    kind: EncoderKind,
    format: Sample,
}

/// Encoders tried in order. Platform encoders first, then software.
const CANDIDATES: &[Candidate] = &[
    Candidate {
        name: "aac_at",
        kind: EncoderKind::Hardware,
        format: Sample::I16(Type::Packed),
    },
    Candidate {
        name: "aac_mf",
        kind: EncoderKind::Hardware,
        format: Sample::I16(Type::Packed),
    },
    Candidate {
        name: "libfdk_aac",
        kind: EncoderKind::Software,
        format: Sample::I16(Type::Packed),
    },
    Candidate {
        name: "aac",
        kind: EncoderKind::Software,
        format: Sample::F32(Type::Planar),
    },
];

/// Resolves and opens FFmpeg AAC encoders
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }

    fn candidates(preference: EncoderPreference) -> impl Iterator<Item = &'static Candidate> {
        CANDIDATES.iter().filter(move |c| match preference {
            EncoderPreference::Auto => true,
            EncoderPreference::Hardware => c.kind == EncoderKind::Hardware,
            EncoderPreference::Software => c.kind == EncoderKind::Software,
        })
    }

    /// Names of the encoders this FFmpeg build provides for `preference`.
    pub fn available(preference: EncoderPreference) -> Vec<&'static str> {
        Self::candidates(preference)
            .filter(|c| codec::encoder::find_by_name(c.name).is_some())
            .map(|c| c.name)
            .collect()
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn configure(&self, config: &EncoderConfig) -> Result<Box<dyn EncoderSession>> {
        crate::ffmpeg::init()?;

        let mut last_error = None;
        for candidate in Self::candidates(config.preference) {
            let Some(codec) = codec::encoder::find_by_name(candidate.name) else {
                continue;
            };
            match FfmpegAacSession::open(codec, *candidate, config) {
                Ok(session) => return Ok(Box::new(session)),
                Err(e) if e.kind() == ErrorKind::UnsupportedFormat => return Err(e),
                Err(e) => {
                    tracing::warn!(encoder = candidate.name, error = %e, "AAC encoder failed to open");
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => TranscodeError::EncoderUnavailable(e.to_string()),
            None => TranscodeError::EncoderUnavailable(format!(
                "no {:?} AAC encoder in this FFmpeg build",
                config.preference
            )),
        })
    }
}

/// Converted samples waiting to be cut into encoder frames
struct SampleFifo {
    planes: Vec<Vec<u8>>,
    /// Bytes one sample occupies in each plane
    stride: usize,
}

impl SampleFifo {
    fn new(format: Sample, channels: u16) -> Self {
        let planar = format.is_planar();
        let plane_count = if planar { channels as usize } else { 1 };
        let stride = if planar {
            format.bytes()
        } else {
            format.bytes() * channels as usize
        };
        Self {
            planes: vec![Vec::new(); plane_count],
            stride,
        }
    }

    fn len(&self) -> usize {
        self.planes[0].len() / self.stride
    }

    fn push(&mut self, frame: &ffmpeg::util::frame::Audio) {
        let bytes = frame.samples() * self.stride;
        for (p, plane) in self.planes.iter_mut().enumerate() {
            plane.extend_from_slice(&frame.data(p)[..bytes]);
        }
    }

    fn pop_frame(
        &mut self,
        samples: usize,
        format: Sample,
        layout: ChannelLayout,
        rate: u32,
    ) -> ffmpeg::util::frame::Audio {
        let bytes = samples * self.stride;
        let mut frame = ffmpeg::util::frame::Audio::new(format, samples, layout);
        frame.set_rate(rate);
        for (p, plane) in self.planes.iter_mut().enumerate() {
            frame.data_mut(p)[..bytes].copy_from_slice(&plane[..bytes]);
            plane.drain(..bytes);
        }
        frame
    }
}

/// AAC encoder backed by a real FFmpeg codec context
pub struct FfmpegAacSession {
    encoder: Option<ffmpeg::encoder::audio::Encoder>,
    candidate: Candidate,
    config: EncoderConfig,
    converter: SampleConverter,
    fifo: SampleFifo,
    slots: SlotPool,
    ready: VecDeque<EncodedAccessUnit>,
    layout: ChannelLayout,
    frame_size: usize,
    /// Output-rate sample index of the first submitted sample
    base_pts: Option<i64>,
    samples_sent: i64,
    last_end_micros: i64,
    descriptor: Option<TrackDescriptor>,
    input_eos: bool,
    output_eos: bool,
}

impl FfmpegAacSession {
    fn open(codec: ffmpeg::Codec, candidate: Candidate, config: &EncoderConfig) -> Result<Self> {
        let layout = layout_for(config.channel_count)?;
        let rate = config.sample_rate;

        let context = codec::Context::new_with_codec(codec);
        let mut audio_enc = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderConfigure(format!(
                "{}: cannot get audio encoder handle: {}",
                candidate.name, e
            ))
        })?;

        audio_enc.set_rate(rate as i32);
        audio_enc.set_format(candidate.format);
        audio_enc.set_channel_layout(layout);
        audio_enc.set_bit_rate(config.bitrate_bps as usize);
        audio_enc.set_time_base(ffmpeg::Rational::new(1, rate as i32));
        // raw access units plus an out-of-band AudioSpecificConfig, never ADTS
        audio_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        // SAFETY: the context is allocated and not yet opened; `profile` is a
        // plain int read by avcodec_open2.
        unsafe {
            (*audio_enc.as_mut_ptr()).profile = config.profile.av_profile();
        }

        let encoder = audio_enc.open_as(codec).map_err(|e| {
            FfmpegError::EncoderConfigure(format!("{}: failed to open: {}", candidate.name, e))
        })?;

        let frame_size = match encoder.frame_size() as usize {
            0 => AAC_FRAME_SIZE,
            n => n,
        };

        let converter = SampleConverter::new(
            config.input_sample_rate,
            config.input_channels,
            candidate.format,
            rate,
            config.channel_count,
        )?;

        tracing::debug!(
            encoder = candidate.name,
            kind = ?candidate.kind,
            sample_rate = rate,
            channels = config.channel_count,
            bitrate = config.bitrate_bps,
            frame_size,
            "AAC encoder opened"
        );

        Ok(Self {
            encoder: Some(encoder),
            candidate,
            config: config.clone(),
            converter,
            fifo: SampleFifo::new(candidate.format, config.channel_count),
            slots: SlotPool::new(config.input_slots, config.max_input_chunk_bytes),
            ready: VecDeque::new(),
            layout,
            frame_size,
            base_pts: None,
            samples_sent: 0,
            last_end_micros: 0,
            descriptor: None,
            input_eos: false,
            output_eos: false,
        })
    }

    fn encoder_mut(&mut self) -> Result<&mut ffmpeg::encoder::audio::Encoder> {
        self.encoder
            .as_mut()
            .ok_or_else(|| TranscodeError::EncodeFailure("encoder session is closed".into()))
    }

    /// Feed whole frames from the FIFO; with `final_frame` also the remainder.
    fn encode_buffered(&mut self, final_frame: bool) -> Result<()> {
        let base = self.base_pts.unwrap_or(0);
        loop {
            let available = self.fifo.len();
            let n = if available >= self.frame_size {
                self.frame_size
            } else if final_frame && available > 0 {
                available
            } else {
                break;
            };

            let mut frame =
                self.fifo
                    .pop_frame(n, self.candidate.format, self.layout, self.config.sample_rate);
            frame.set_pts(Some(base + self.samples_sent));
            self.samples_sent += n as i64;

            self.encoder_mut()?
                .send_frame(&frame)
                .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame: {}", e)))?;
            self.drain_packets()?;
        }
        Ok(())
    }

    /// Move every packet the codec has ready into the output queue.
    fn drain_packets(&mut self) -> Result<()> {
        let rate = self.config.sample_rate;
        loop {
            let mut packet = ffmpeg::Packet::empty();
            let received = self.encoder_mut()?.receive_packet(&mut packet);
            match received {
                Ok(()) => {
                    let pts = packet.pts().unwrap_or(self.samples_sent);
                    let duration = packet.duration().max(0);
                    let payload = Bytes::copy_from_slice(packet.data().unwrap_or(&[]));
                    let pts_micros = samples_to_micros(pts, rate);
                    let duration_micros = samples_to_micros(duration, rate);
                    self.last_end_micros = pts_micros + duration_micros;

                    if self.descriptor.is_none() && !payload.is_empty() {
                        self.descriptor = Some(self.describe()?);
                    }
                    self.ready
                        .push_back(EncodedAccessUnit::new(payload, pts_micros, duration_micros));
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => {
                    tracing::debug!(end_us = self.last_end_micros, "AAC encoder drained");
                    self.ready
                        .push_back(EncodedAccessUnit::end_of_stream(self.last_end_micros));
                    self.output_eos = true;
                    return Ok(());
                }
                Err(e) => {
                    return Err(FfmpegError::EncodeFrame(format!("receive_packet: {}", e)).into())
                }
            }
        }
    }

    fn describe(&mut self) -> Result<TrackDescriptor> {
        let encoder = self.encoder_mut()?;
        // SAFETY: the encoder is open; extradata is owned by the context and
        // valid for `extradata_size` bytes until the context is freed.
        let codec_specific_data = unsafe {
            let ctx = encoder.as_ptr();
            if (*ctx).extradata.is_null() || (*ctx).extradata_size <= 0 {
                Bytes::new()
            } else {
                Bytes::copy_from_slice(std::slice::from_raw_parts(
                    (*ctx).extradata,
                    (*ctx).extradata_size as usize,
                ))
            }
        };

        Ok(TrackDescriptor {
            codec: CodecId::Aac,
            profile: self.config.profile,
            sample_rate: self.config.sample_rate,
            channel_count: self.config.channel_count,
            bitrate_bps: self.config.bitrate_bps,
            frame_samples: self.frame_size as u32,
            codec_specific_data,
        })
    }
}

impl EncoderSession for FfmpegAacSession {
    fn name(&self) -> &str {
        self.candidate.name
    }

    /// The codec runs synchronously inside `submit`, so nothing is ever
    /// worth waiting for: the call answers immediately.
    fn acquire_input_slot(&mut self, _timeout: Duration) -> Result<Option<InputSlot>> {
        self.encoder_mut()?;
        if self.input_eos || self.ready.len() >= self.config.max_pending_output {
            return Ok(None);
        }
        Ok(self.slots.acquire())
    }

    fn submit(&mut self, slot: InputSlot, pts_micros: i64, end_of_stream: bool) -> Result<()> {
        self.encoder_mut()?;
        if self.input_eos {
            return Err(TranscodeError::EncodeFailure(
                "input submitted after end of stream".into(),
            ));
        }

        let block_align = self.config.input_block_align();
        let len = slot.buffer().len();
        if len % block_align != 0 {
            return Err(TranscodeError::EncodeFailure(format!(
                "{} bytes is not a whole number of {}-byte sample frames",
                len, block_align
            )));
        }

        if self.base_pts.is_none() {
            self.base_pts = Some(micros_to_samples(pts_micros, self.config.sample_rate));
        }

        let converted = self.converter.convert(slot.buffer().as_bytes());
        self.slots.release(slot)?;
        if let Some(frame) = converted? {
            self.fifo.push(&frame);
        }
        self.encode_buffered(false)?;

        if end_of_stream {
            self.input_eos = true;
            for frame in self.converter.flush()? {
                self.fifo.push(&frame);
            }
            self.encode_buffered(true)?;
            self.encoder_mut()?
                .send_eof()
                .map_err(|e| FfmpegError::EncodeFrame(format!("send_eof: {}", e)))?;
            self.drain_packets()?;
            tracing::debug!(
                samples = self.samples_sent,
                queued = self.ready.len(),
                "end of input submitted"
            );
        }
        Ok(())
    }

    fn retrieve_output(&mut self, _timeout: Duration) -> Result<Option<EncodedAccessUnit>> {
        if let Some(unit) = self.ready.pop_front() {
            return Ok(Some(unit));
        }
        self.encoder_mut()?;
        Ok(None)
    }

    fn output_format(&self) -> Option<TrackDescriptor> {
        self.descriptor.clone()
    }

    fn close(&mut self) -> Result<()> {
        if self.encoder.take().is_some() {
            tracing::debug!(
                encoder = self.candidate.name,
                output_eos = self.output_eos,
                "AAC encoder released"
            );
        }
        self.ready.clear();
        Ok(())
    }
}

impl Drop for FfmpegAacSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
