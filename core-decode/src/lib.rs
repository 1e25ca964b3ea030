//! # Decode & Buffering Module
//!
//! Audio decoding and buffering for track playback.
//!
//! ## Overview
//!
//! This module handles:
//! - FFmpeg-compatible result codes and their descriptions
//! - Typed decode errors
//! - Decoded frames and the frame buffers that batch them for scheduling
//! - Audio decoding using symphonia (optional, feature-gated)
//! - The producer/consumer pipeline between decoder and audio engine

pub mod audio_format;
pub mod backend;
pub mod config;
#[cfg(feature = "symphonia-backend")]
pub mod decoder;
pub mod error;
pub mod frame;
pub mod frame_buffer;
pub mod pipeline;
pub mod result_code;
pub mod sample_converter;
pub mod scheduler;

pub use audio_format::{AudioFormat, ChannelLayout, SampleFormat};
pub use backend::{BackendGuard, DecodeBackend};
pub use config::{DecodeConfig, DecodeState, DecodeStats};
#[cfg(feature = "symphonia-backend")]
pub use decoder::{FormatDetector, SymphoniaBackend};
pub use error::{
    DecodeError, DecoderError, DecoderInitializationError, PacketReadError, Result, SeekError,
};
pub use frame::{Frame, FrameData};
pub use frame_buffer::FrameBuffer;
pub use pipeline::{BufferReceiver, DecodeSession, HandOff};
pub use result_code::{BackendErrorStrings, ErrorStringLookup, ResultCode};
pub use sample_converter::{PcmBuffer, SampleConverter};
pub use scheduler::{
    BufferConsumer, ConsumerOutcome, ConsumerSummary, PlaybackScheduler, ScheduledBuffer,
    TrackFailure,
};
