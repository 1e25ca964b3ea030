//! # Playback Scheduling
//!
//! Consumer side of the decode pipeline. [`BufferConsumer`] receives the
//! hand-offs of a [`DecodeSession`](crate::DecodeSession), converts each
//! buffer to the platform's native PCM layout and forwards it to a
//! [`PlaybackScheduler`], the seam to the platform audio engine.
//!
//! ```rust,no_run
//! use core_decode::{
//!     BufferConsumer, DecodeConfig, DecodeSession, PlaybackScheduler, ScheduledBuffer,
//!     SymphoniaBackend, TrackFailure,
//! };
//!
//! struct Engine;
//!
//! impl PlaybackScheduler for Engine {
//!     fn schedule(&mut self, buffer: ScheduledBuffer) -> core_decode::Result<()> {
//!         println!("{} samples queued", buffer.sample_count);
//!         Ok(())
//!     }
//!     fn end_of_stream(&mut self) {}
//!     fn track_failed(&mut self, failure: TrackFailure) {
//!         eprintln!("{failure}");
//!     }
//! }
//!
//! # async fn example() -> core_decode::Result<()> {
//! let config = DecodeConfig::default();
//! let backend = SymphoniaBackend::open("/path/to/song.flac", &config)?;
//! let (mut session, receiver) = DecodeSession::spawn(backend, config)?;
//!
//! let summary = BufferConsumer::new(receiver, Engine)
//!     .run(session.cancellation_token())
//!     .await;
//! println!("{summary:?}");
//! session.join();
//! # Ok(())
//! # }
//! ```

use crate::error::{DecodeError, Result};
use crate::frame_buffer::FrameBuffer;
use crate::pipeline::{BufferReceiver, HandOff};
use crate::sample_converter::{PcmBuffer, SampleConverter};
use serde::Serialize;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A converted buffer ready for the audio engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    /// Hand-off sequence number of the source buffer.
    pub sequence: u64,
    pub pcm: PcmBuffer,
    /// Samples per channel.
    pub sample_count: i64,
    /// The source buffer went through the terminal path: the last buffer of
    /// the stream, or a single frame too large for any buffer.
    pub terminal: bool,
}

/// A track could not be played.
///
/// Carries the backend's description of the problem, never a raw code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackFailure {
    /// Error kind, e.g. `"decoder"` or `"packet_read"`.
    pub kind: String,
    pub description: String,
}

impl TrackFailure {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
        }
    }
}

impl From<&DecodeError> for TrackFailure {
    fn from(err: &DecodeError) -> Self {
        Self::new(err.kind(), err.description())
    }
}

impl fmt::Display for TrackFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Track failed to play: {}", self.description)
    }
}

/// Receives converted buffers, in stream order.
///
/// Called from the consumer task only, hence `&mut self`.
pub trait PlaybackScheduler: Send {
    /// Queue `buffer` for playback after every previously scheduled buffer.
    fn schedule(&mut self, buffer: ScheduledBuffer) -> Result<()>;

    /// No more buffers will follow.
    fn end_of_stream(&mut self);

    /// The track failed; no more buffers will follow.
    fn track_failed(&mut self, failure: TrackFailure);
}

/// How a consumer run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerOutcome {
    /// The producer reported end of stream.
    EndOfStream,
    /// Decoding, conversion or scheduling failed.
    Failed(TrackFailure),
    /// The cancellation token fired.
    Cancelled,
    /// The producer went away without a final message (it was stopped).
    Disconnected,
}

/// Totals of a consumer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub buffers_scheduled: u64,
    pub samples_scheduled: u64,
    pub outcome: ConsumerOutcome,
}

/// Drains a [`BufferReceiver`] into a [`PlaybackScheduler`].
pub struct BufferConsumer<S: PlaybackScheduler> {
    receiver: BufferReceiver,
    scheduler: S,
    converter: Option<SampleConverter>,
    next_sequence: u64,
}

impl<S: PlaybackScheduler> BufferConsumer<S> {
    pub fn new(receiver: BufferReceiver, scheduler: S) -> Self {
        Self {
            receiver,
            scheduler,
            converter: None,
            next_sequence: 0,
        }
    }

    /// Forward hand-offs until end of stream, failure, cancellation, or the
    /// producer closing the queue.
    pub async fn run(mut self, cancel: CancellationToken) -> ConsumerSummary {
        let mut buffers_scheduled = 0u64;
        let mut samples_scheduled = 0u64;

        let outcome = loop {
            let handoff = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Buffer consumer cancelled");
                    break ConsumerOutcome::Cancelled;
                }
                handoff = self.receiver.recv() => handoff,
            };

            match handoff {
                Some(HandOff::Buffer { sequence, buffer }) => {
                    match self.forward(sequence, buffer) {
                        Ok(samples) => {
                            buffers_scheduled += 1;
                            samples_scheduled += samples;
                        }
                        Err(failure) => {
                            error!("{}", failure);
                            self.scheduler.track_failed(failure.clone());
                            break ConsumerOutcome::Failed(failure);
                        }
                    }
                }
                Some(HandOff::EndOfStream) => {
                    debug!("End of stream received");
                    self.scheduler.end_of_stream();
                    break ConsumerOutcome::EndOfStream;
                }
                Some(HandOff::Failed(failure)) => {
                    warn!("{}", failure);
                    self.scheduler.track_failed(failure.clone());
                    break ConsumerOutcome::Failed(failure);
                }
                None => {
                    debug!("Producer closed the buffer queue");
                    break ConsumerOutcome::Disconnected;
                }
            }
        };

        // Stops the producer if it is still waiting for queue space.
        self.receiver.close();

        info!(
            buffers = buffers_scheduled,
            samples = samples_scheduled,
            ?outcome,
            "Buffer consumer finished"
        );

        ConsumerSummary {
            buffers_scheduled,
            samples_scheduled,
            outcome,
        }
    }

    /// Convert and schedule one buffer. Returns the samples scheduled.
    fn forward(
        &mut self,
        sequence: u64,
        mut buffer: FrameBuffer,
    ) -> std::result::Result<u64, TrackFailure> {
        if sequence != self.next_sequence {
            buffer.close();
            return Err(TrackFailure::new(
                "sequence",
                format!(
                    "Buffer {} arrived out of order, expected {}",
                    sequence, self.next_sequence
                ),
            ));
        }
        self.next_sequence += 1;

        let scheduled = self
            .prepare(sequence, &buffer)
            .map_err(|e| TrackFailure::from(&e));
        buffer.close();
        let scheduled = scheduled?;

        let samples = scheduled.sample_count.max(0) as u64;
        self.scheduler
            .schedule(scheduled)
            .map_err(|e| TrackFailure::from(&e))?;
        Ok(samples)
    }

    fn prepare(&mut self, sequence: u64, buffer: &FrameBuffer) -> Result<ScheduledBuffer> {
        let format = buffer.audio_format();
        let converter = match self.converter.take() {
            Some(converter) if converter.format() == &**format => converter,
            _ => {
                if buffer.needs_format_conversion() {
                    debug!(from = ?format.sample_format(), "Converting to native sample format");
                }
                SampleConverter::new(format)?
            }
        };

        let pcm = converter.convert(buffer);
        self.converter = Some(converter);
        let mut pcm = pcm?;

        // Float sources may overshoot full scale; the engine expects [-1, 1].
        for channel in &mut pcm.channels {
            if SampleConverter::validate_samples(channel) > 0 {
                SampleConverter::clamp_samples(channel);
            }
        }

        Ok(ScheduledBuffer {
            sequence,
            pcm,
            sample_count: buffer.sample_count(),
            terminal: buffer.is_terminal(),
        })
    }
}
