//! # Sample Format Converter
//!
//! Turns the frames of a [`FrameBuffer`] into planar `f32` channels, the
//! format the platform audio engine plays natively.
//!
//! Integer samples are normalized to [-1.0, 1.0]; interleaved buffers are
//! split into one vector per channel. 32-bit float planar input is only
//! reinterpreted.

use crate::audio_format::{AudioFormat, SampleFormat};
use crate::error::{DecodeError, Result};
use crate::frame_buffer::FrameBuffer;
use bytes::Buf;
use std::time::Duration;
use tracing::{trace, warn};

/// Decoded audio in the platform's native layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    /// One vector of samples per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Converts frame buffers of one stream format to [`PcmBuffer`]s.
#[derive(Debug, Clone)]
pub struct SampleConverter {
    format: AudioFormat,
}

impl SampleConverter {
    /// # Errors
    ///
    /// `ResamplerInitialization` if the format has no channels or no sample rate.
    pub fn new(format: &AudioFormat) -> Result<Self> {
        if format.channel_count() == 0 {
            return Err(DecodeError::resampler("Audio format has no channels"));
        }
        if format.sample_rate() == 0 {
            return Err(DecodeError::resampler("Audio format has a zero sample rate"));
        }

        Ok(Self {
            format: format.clone(),
        })
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Convert every frame of `buffer`, in order.
    ///
    /// # Errors
    ///
    /// `ResamplerInitialization` if the buffer was decoded in another format
    /// than the one this converter was built for.
    pub fn convert(&self, buffer: &FrameBuffer) -> Result<PcmBuffer> {
        if **buffer.audio_format() != self.format {
            return Err(DecodeError::resampler(format!(
                "Buffer format {:?} does not match converter format {:?}",
                buffer.audio_format(),
                self.format
            )));
        }

        let channel_count = self.format.channel_count() as usize;
        let capacity = buffer.sample_count().max(0) as usize;
        let mut channels = vec![Vec::with_capacity(capacity); channel_count];
        let sample_format = self.format.sample_format();

        for frame in buffer.frames() {
            let samples = frame.sample_count().max(0) as usize;
            let planes = frame.planes();

            let plane_size = self.format.plane_size(samples);
            if planes.len() < self.format.plane_count()
                || planes.iter().any(|plane| plane.len() < plane_size)
            {
                warn!(
                    samples,
                    planes = planes.len(),
                    expected_bytes = plane_size,
                    "Frame carries fewer samples than it reports, padding with silence"
                );
            }

            if sample_format.is_planar() {
                for (channel, out) in channels.iter_mut().enumerate() {
                    match planes.get(channel) {
                        Some(plane) => read_plane(plane, sample_format, samples, out),
                        None => out.resize(out.len() + samples, 0.0),
                    }
                }
            } else {
                let plane = planes.first().map(|p| &p[..]).unwrap_or(&[]);
                read_interleaved(plane, sample_format, samples, &mut channels);
            }
        }

        trace!(
            frames = buffer.len(),
            samples = buffer.sample_count(),
            passthrough = !self.format.needs_format_conversion(),
            "Converted frame buffer"
        );

        Ok(PcmBuffer {
            sample_rate: self.format.sample_rate(),
            channels,
        })
    }

    /// Count samples outside [-1.0, 1.0].
    ///
    /// Logs a warning if clipping is detected.
    pub fn validate_samples(samples: &[f32]) -> usize {
        let clipped = samples.iter().filter(|&&s| !(-1.0..=1.0).contains(&s)).count();

        if clipped > 0 {
            warn!(
                "Detected {} clipped samples ({:.2}% of total)",
                clipped,
                (clipped as f64 / samples.len() as f64) * 100.0
            );
        }

        clipped
    }

    /// Clamp samples to [-1.0, 1.0].
    pub fn clamp_samples(samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// Append up to `samples` samples of one planar channel to `out`, padding
/// with silence if the plane is short.
fn read_plane(mut plane: &[u8], format: SampleFormat, samples: usize, out: &mut Vec<f32>) {
    let available = plane.len() / format.bytes_per_sample();
    let readable = samples.min(available);
    for _ in 0..readable {
        out.push(read_sample(&mut plane, format));
    }
    out.resize(out.len() + (samples - readable), 0.0);
}

fn read_interleaved(
    mut plane: &[u8],
    format: SampleFormat,
    samples: usize,
    channels: &mut [Vec<f32>],
) {
    let stride = channels.len();
    let available = plane.len() / (format.bytes_per_sample() * stride.max(1));
    let readable = samples.min(available);
    for _ in 0..readable {
        for out in channels.iter_mut() {
            out.push(read_sample(&mut plane, format));
        }
    }
    for out in channels.iter_mut() {
        out.resize(out.len() + (samples - readable), 0.0);
    }
}

/// Read one native-endian sample and normalize it.
fn read_sample(buf: &mut &[u8], format: SampleFormat) -> f32 {
    match format {
        SampleFormat::U8 | SampleFormat::U8P => (buf.get_u8() as f32 - 128.0) / 128.0,
        SampleFormat::S16 | SampleFormat::S16P => buf.get_i16_ne() as f32 / 32_768.0,
        SampleFormat::S32 | SampleFormat::S32P => {
            (buf.get_i32_ne() as f64 / 2_147_483_648.0) as f32
        }
        SampleFormat::S64 | SampleFormat::S64P => {
            (buf.get_i64_ne() as f64 / 9_223_372_036_854_775_808.0) as f32
        }
        SampleFormat::F32 | SampleFormat::F32P => buf.get_f32_ne(),
        SampleFormat::F64 | SampleFormat::F64P => buf.get_f64_ne() as f32,
    }
}
