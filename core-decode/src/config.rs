//! # Decode Configuration
//!
//! Configuration types for the decode pipeline.

use crate::audio_format::AudioFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decode pipeline configuration.
///
/// Controls how much audio is accumulated per frame buffer and how many
/// completed buffers may wait for the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Audio accumulated in each frame buffer before it is handed off.
    ///
    /// Converted to a per-buffer sample limit with the stream's sample rate.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_buffer_duration")]
    pub buffer_duration: Duration,

    /// Audio accumulated in the first buffer of a session.
    ///
    /// Kept short so playback can start quickly after open or seek.
    ///
    /// Default: 1 second.
    #[serde(default = "default_initial_buffer_duration")]
    pub initial_buffer_duration: Duration,

    /// Completed buffers that may wait in the hand-off queue.
    ///
    /// The producer pauses while the queue is full.
    ///
    /// Default: 3 buffers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Corrupt packets skipped in a row before decoding gives up.
    ///
    /// Default: 10.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            buffer_duration: default_buffer_duration(),
            initial_buffer_duration: default_initial_buffer_duration(),
            queue_capacity: default_queue_capacity(),
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

impl DecodeConfig {
    /// Create a configuration optimized for low latency.
    ///
    /// - Small buffers (1s, first buffer 0.25s)
    /// - Short queue
    pub fn low_latency() -> Self {
        Self {
            buffer_duration: Duration::from_secs(1),
            initial_buffer_duration: Duration::from_millis(250),
            queue_capacity: 2,
            ..Default::default()
        }
    }

    /// Create a configuration optimized for stability.
    ///
    /// - Large buffers (10s, first buffer 2s)
    /// - Deeper queue
    pub fn high_quality() -> Self {
        Self {
            buffer_duration: Duration::from_secs(10),
            initial_buffer_duration: Duration::from_secs(2),
            queue_capacity: 4,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| format!("Invalid decode config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.buffer_duration.is_zero() {
            return Err("buffer_duration must be > 0".to_string());
        }

        if self.initial_buffer_duration.is_zero() {
            return Err("initial_buffer_duration must be > 0".to_string());
        }

        if self.initial_buffer_duration > self.buffer_duration {
            return Err("initial_buffer_duration cannot exceed buffer_duration".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be > 0".to_string());
        }

        if self.max_consecutive_errors == 0 {
            return Err("max_consecutive_errors must be > 0".to_string());
        }

        Ok(())
    }

    /// Sample limit for a frame buffer of a stream in `format`.
    ///
    /// `first` selects the initial (shorter) target. Never less than 1.
    pub fn max_sample_count(&self, format: &AudioFormat, first: bool) -> i32 {
        let duration = if first {
            self.initial_buffer_duration
        } else {
            self.buffer_duration
        };
        format.samples_for_duration(duration).max(1)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_buffer_duration() -> Duration {
    Duration::from_secs(5)
}

fn default_initial_buffer_duration() -> Duration {
    Duration::from_secs(1)
}

fn default_queue_capacity() -> usize {
    3
}

fn default_max_consecutive_errors() -> usize {
    10
}

// ============================================================================
// Decode State
// ============================================================================

/// Current state of a decode session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeState {
    /// Session created, producer not yet running.
    #[default]
    Idle,
    /// Producer is decoding and handing off buffers.
    Decoding,
    /// End of stream reached and every buffer handed off.
    Completed,
    /// Stopped on request before the end of the stream.
    Stopped,
    /// Decoding failed.
    Failed,
}

impl DecodeState {
    /// Returns `true` if the producer may still hand off buffers.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Decoding)
    }

    /// Returns `true` if the session has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// Statistics about a decode session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Buffers sent to the consumer.
    pub buffers_handed_off: u64,
    /// Frames produced by the backend.
    pub frames_decoded: u64,
    /// Samples (per channel) produced by the backend.
    pub samples_decoded: u64,
    /// Frames too large for an empty buffer, flushed on their own.
    pub oversized_frames: u64,
    /// Frames released without being handed off (stop or failure).
    pub frames_discarded: u64,
}

impl DecodeStats {
    /// Decoded duration in seconds for a stream at `sample_rate`.
    pub fn decoded_seconds(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.samples_decoded as f64 / sample_rate as f64
    }
}
