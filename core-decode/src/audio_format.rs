//! # Audio Format Descriptor
//!
//! Describes the PCM layout of the frames coming out of the decoder. Built once
//! when a stream is opened and never modified afterwards.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PCM sample format tag.
///
/// Interleaved ("packed") formats store all channels in one plane; the `*P`
/// variants store one plane per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    S64,
    F32,
    F64,
    U8P,
    S16P,
    S32P,
    S64P,
    F32P,
    F64P,
}

impl SampleFormat {
    /// The platform's native format: 32-bit float, non-interleaved.
    pub const NATIVE: SampleFormat = SampleFormat::F32P;

    /// Returns `true` if each channel has its own plane.
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            SampleFormat::U8P
                | SampleFormat::S16P
                | SampleFormat::S32P
                | SampleFormat::S64P
                | SampleFormat::F32P
                | SampleFormat::F64P
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            SampleFormat::F32 | SampleFormat::F64 | SampleFormat::F32P | SampleFormat::F64P
        )
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::U8 | SampleFormat::U8P => 1,
            SampleFormat::S16 | SampleFormat::S16P => 2,
            SampleFormat::S32 | SampleFormat::S32P | SampleFormat::F32 | SampleFormat::F32P => 4,
            SampleFormat::S64 | SampleFormat::S64P | SampleFormat::F64 | SampleFormat::F64P => 8,
        }
    }

    /// The planar variant of this format.
    pub fn to_planar(&self) -> SampleFormat {
        match self {
            SampleFormat::U8 => SampleFormat::U8P,
            SampleFormat::S16 => SampleFormat::S16P,
            SampleFormat::S32 => SampleFormat::S32P,
            SampleFormat::S64 => SampleFormat::S64P,
            SampleFormat::F32 => SampleFormat::F32P,
            SampleFormat::F64 => SampleFormat::F64P,
            planar => *planar,
        }
    }
}

/// Channel layout of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
    /// 5.1 surround
    Surround51,
    /// 7.1 surround
    Surround71,
    /// Any other channel count, without positional information.
    Unspecified(u16),
}

impl ChannelLayout {
    /// Default layout for a channel count.
    pub fn from_channel_count(channels: u16) -> Self {
        match channels {
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::Stereo,
            6 => ChannelLayout::Surround51,
            8 => ChannelLayout::Surround71,
            n => ChannelLayout::Unspecified(n),
        }
    }

    pub fn channel_count(&self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
            ChannelLayout::Surround51 => 6,
            ChannelLayout::Surround71 => 8,
            ChannelLayout::Unspecified(n) => *n,
        }
    }
}

/// PCM characteristics of a decoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    sample_rate: u32,
    channel_layout: ChannelLayout,
    sample_format: SampleFormat,
}

impl AudioFormat {
    /// Create a format with the default layout for `channels`.
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self::with_layout(
            sample_rate,
            ChannelLayout::from_channel_count(channels),
            sample_format,
        )
    }

    pub fn with_layout(
        sample_rate: u32,
        channel_layout: ChannelLayout,
        sample_format: SampleFormat,
    ) -> Self {
        Self {
            sample_rate,
            channel_layout,
            sample_format,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_layout.channel_count()
    }

    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /// Whether frames must be converted before the platform engine can play them.
    ///
    /// False only for 32-bit float, non-interleaved samples.
    pub fn needs_format_conversion(&self) -> bool {
        self.sample_format != SampleFormat::NATIVE
    }

    /// Number of sample planes a frame in this format carries.
    pub fn plane_count(&self) -> usize {
        if self.sample_format.is_planar() {
            self.channel_count() as usize
        } else {
            1
        }
    }

    /// Size in bytes of one plane holding `sample_count` samples per channel.
    pub fn plane_size(&self, sample_count: usize) -> usize {
        let per_plane_channels = if self.sample_format.is_planar() {
            1
        } else {
            self.channel_count() as usize
        };
        sample_count * per_plane_channels * self.sample_format.bytes_per_sample()
    }

    /// Samples per channel covering `duration`, saturating at `i32::MAX`.
    pub fn samples_for_duration(&self, duration: Duration) -> i32 {
        let samples = (duration.as_secs_f64() * self.sample_rate as f64).round();
        if samples >= i32::MAX as f64 {
            i32::MAX
        } else {
            samples as i32
        }
    }
}
