//! # Decode Pipeline
//!
//! Drives a [`DecodeBackend`] on a dedicated producer thread, packs the
//! decoded frames into [`FrameBuffer`]s and hands completed buffers to the
//! consumer through a bounded channel.
//!
//! ## Flow
//!
//! ```text
//! DecodeBackend → Frame → FrameBuffer (until full) → HandOff::Buffer → consumer
//!                                   ↓ on EOF
//!                     drained frames appended as terminal frames
//!                                   ↓
//!                    final HandOff::Buffer, then HandOff::EndOfStream
//! ```
//!
//! A frame rejected by a full buffer triggers a hand-off and is retried on a
//! fresh buffer. A frame larger than the steady-state capacity can never fit,
//! so it is flushed alone through the terminal path. One that only outgrows
//! the shorter first buffer starts the steady-state buffer early.
//!
//! ## Cancellation
//!
//! [`DecodeSession::stop`] cancels a [`CancellationToken`] checked between
//! decodes. Hand-off sends race the same token, so a consumer that stopped
//! reading cannot keep the producer blocked. Frames that were never handed off
//! are closed and counted in [`DecodeStats::frames_discarded`]. The backend is
//! closed on every exit path.

use crate::audio_format::AudioFormat;
use crate::backend::{BackendGuard, DecodeBackend};
use crate::config::{DecodeConfig, DecodeState, DecodeStats};
use crate::error::{DecodeError, DecoderInitializationError, Result};
use crate::frame::Frame;
use crate::frame_buffer::FrameBuffer;
use crate::result_code::ResultCode;
use crate::scheduler::TrackFailure;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Message from the decode producer to the consumer.
#[derive(Debug)]
pub enum HandOff {
    /// A completed buffer. Sequence numbers start at 0 and increase by one.
    Buffer { sequence: u64, buffer: FrameBuffer },
    /// Every buffer of the stream has been handed off.
    EndOfStream,
    /// Decoding failed; no further messages follow.
    Failed(TrackFailure),
}

/// Receiving end of a session's hand-off queue.
pub type BufferReceiver = mpsc::Receiver<HandOff>;

/// State shared between the session handle and its producer thread.
#[derive(Debug, Default)]
struct SessionShared {
    state: Mutex<DecodeState>,
    stats: Mutex<DecodeStats>,
}

/// Handle to a running decode producer.
///
/// Dropping the handle stops the producer without waiting for it.
pub struct DecodeSession {
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DecodeSession {
    /// Start decoding `backend` on a new producer thread.
    ///
    /// Returns the session handle and the receiver for its hand-offs.
    ///
    /// # Errors
    ///
    /// `DecoderInitialization(EINVAL)` if `config` is invalid, or a coded
    /// `DecoderInitialization` error if the thread could not be started. The
    /// backend is closed in both cases.
    pub fn spawn<B>(backend: B, config: DecodeConfig) -> Result<(Self, BufferReceiver)>
    where
        B: DecodeBackend + 'static,
    {
        let backend = BackendGuard::new(backend);

        if let Err(reason) = config.validate() {
            error!("Invalid decode configuration: {}", reason);
            return Err(DecoderInitializationError::new(ResultCode::EINVAL).into());
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let shared = Arc::new(SessionShared::default());
        let cancel = CancellationToken::new();

        let producer_shared = shared.clone();
        let producer_cancel = cancel.clone();
        let handle = std::thread::Builder::new()
            .name("aural-decode".to_string())
            .spawn(move || {
                produce(backend, config, sender, producer_cancel, producer_shared);
            })
            .map_err(|e| {
                error!("Failed to start decode thread: {}", e);
                let code = e
                    .raw_os_error()
                    .map(ResultCode::from_errno)
                    .unwrap_or(ResultCode::EXTERNAL);
                DecodeError::from(DecoderInitializationError::new(code))
            })?;

        Ok((
            Self {
                shared,
                cancel,
                handle: Some(handle),
            },
            receiver,
        ))
    }

    /// Ask the producer to stop. Returns immediately.
    pub fn stop(&self) {
        if self.state().is_active() && !self.cancel.is_cancelled() {
            info!("Stopping decode session");
            self.cancel.cancel();
        }
    }

    /// Wait for the producer thread to exit and return the final state.
    pub fn join(&mut self) -> DecodeState {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Decode thread panicked");
                *self.shared.state.lock() = DecodeState::Failed;
            }
        }
        self.state()
    }

    pub fn state(&self) -> DecodeState {
        *self.shared.state.lock()
    }

    pub fn stats(&self) -> DecodeStats {
        self.shared.stats.lock().clone()
    }

    /// Returns `true` once the producer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(JoinHandle::is_finished)
            .unwrap_or(true)
    }

    /// Token cancelled by [`stop`](Self::stop); consumers may share it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why the producer loop ended.
enum Outcome {
    Completed,
    Stopped,
    Failed(DecodeError),
}

/// The hand-off was not delivered because the session stopped or the
/// consumer went away.
struct Interrupted;

fn produce<B: DecodeBackend>(
    mut backend: BackendGuard<B>,
    config: DecodeConfig,
    sender: mpsc::Sender<HandOff>,
    cancel: CancellationToken,
    shared: Arc<SessionShared>,
) {
    let format = backend.audio_format();
    let first_capacity = config.max_sample_count(&format, true);
    let steady_capacity = config.max_sample_count(&format, false);

    let mut producer = Producer {
        buffer: FrameBuffer::new(format.clone(), first_capacity),
        format,
        steady_capacity,
        sender,
        cancel,
        shared,
        sequence: 0,
    };

    *producer.shared.state.lock() = DecodeState::Decoding;
    let outcome = producer.run(&mut *backend);
    backend.close();

    let state = match outcome {
        Outcome::Completed => DecodeState::Completed,
        Outcome::Stopped => {
            producer.discard_buffer();
            DecodeState::Stopped
        }
        Outcome::Failed(err) => {
            producer.discard_buffer();
            let failure = TrackFailure::from(&err);
            if producer.send(HandOff::Failed(failure)).is_err() {
                debug!("Consumer gone before the failure could be reported");
            }
            DecodeState::Failed
        }
    };

    let stats = producer.shared.stats.lock().clone();
    info!(
        ?state,
        buffers = stats.buffers_handed_off,
        frames = stats.frames_decoded,
        seconds = stats.decoded_seconds(producer.format.sample_rate()),
        discarded = stats.frames_discarded,
        "Decode session finished"
    );
    *producer.shared.state.lock() = state;
}

struct Producer {
    format: Arc<AudioFormat>,
    /// Capacity of every buffer after the first.
    steady_capacity: i32,
    sender: mpsc::Sender<HandOff>,
    cancel: CancellationToken,
    shared: Arc<SessionShared>,
    /// Sequence number of the next hand-off.
    sequence: u64,
    /// Buffer being filled.
    buffer: FrameBuffer,
}

impl Producer {
    #[instrument(skip_all, fields(source = backend.source_name()))]
    fn run<B: DecodeBackend + ?Sized>(&mut self, backend: &mut B) -> Outcome {
        info!(
            sample_rate = self.format.sample_rate(),
            channels = self.format.channel_count(),
            first_capacity = self.buffer.max_sample_count(),
            "Decode session started"
        );

        loop {
            if self.cancel.is_cancelled() {
                info!("Decoding cancelled");
                return Outcome::Stopped;
            }

            match backend.decode_next() {
                Ok(frames) => {
                    self.record_decoded(&frames);
                    let mut frames = frames.into_iter();
                    while let Some(frame) = frames.next() {
                        if self.push(frame).is_err() {
                            self.discard(frames);
                            return Outcome::Stopped;
                        }
                    }
                }
                Err(e) if e.is_eof() => return self.finish(backend),
                Err(e) => {
                    error!("Decoding failed: {}", e);
                    return Outcome::Failed(e);
                }
            }
        }
    }

    /// End of stream: flush the codec, then hand off the final buffer.
    fn finish<B: DecodeBackend + ?Sized>(&mut self, backend: &mut B) -> Outcome {
        debug!("End of packets, draining codec");

        let drained = match backend.drain() {
            Ok(frames) => frames,
            Err(e) if e.is_eof() => Vec::new(),
            Err(e) => {
                error!("Draining codec failed: {}", e);
                return Outcome::Failed(e);
            }
        };
        self.record_decoded(&drained);
        self.buffer.append_terminal_frames(drained);

        if self.hand_off().is_err() || self.send(HandOff::EndOfStream).is_err() {
            return Outcome::Stopped;
        }

        info!("End of stream reached");
        Outcome::Completed
    }

    /// Append `frame`, handing off the current buffer when it is full.
    fn push(&mut self, frame: Frame) -> std::result::Result<(), Interrupted> {
        let mut frame = frame;
        loop {
            match self.buffer.append_frame(frame) {
                Ok(()) => return Ok(()),
                Err(rejected)
                    if self.buffer.is_empty()
                        && rejected.sample_count() <= self.steady_capacity =>
                {
                    debug!(
                        samples = rejected.sample_count(),
                        "Frame outgrows the first buffer, starting a full-size one"
                    );
                    self.buffer = FrameBuffer::new(self.format.clone(), self.steady_capacity);
                    frame = rejected;
                }
                Err(rejected) if self.buffer.is_empty() => {
                    warn!(
                        samples = rejected.sample_count(),
                        max = self.steady_capacity,
                        "Frame larger than buffer capacity, flushing it alone"
                    );
                    self.shared.stats.lock().oversized_frames += 1;
                    self.buffer.append_terminal_frames([rejected]);
                    return self.hand_off();
                }
                Err(rejected) => {
                    if self.hand_off().is_err() {
                        self.discard(std::iter::once(rejected));
                        return Err(Interrupted);
                    }
                    frame = rejected;
                }
            }
        }
    }

    /// Send the current buffer and start a new one at the steady-state capacity.
    fn hand_off(&mut self) -> std::result::Result<(), Interrupted> {
        let buffer = std::mem::replace(
            &mut self.buffer,
            FrameBuffer::new(self.format.clone(), self.steady_capacity),
        );

        if buffer.is_empty() {
            return Ok(());
        }

        let sequence = self.sequence;
        let samples = buffer.sample_count();
        let frames = buffer.len();

        match self.send(HandOff::Buffer { sequence, buffer }) {
            Ok(()) => {
                self.sequence += 1;
                self.shared.stats.lock().buffers_handed_off += 1;
                debug!(sequence, samples, frames, "Handed off frame buffer");
                Ok(())
            }
            Err(HandOff::Buffer { mut buffer, .. }) => {
                let released = buffer.close();
                self.shared.stats.lock().frames_discarded += released as u64;
                Err(Interrupted)
            }
            Err(_) => Err(Interrupted),
        }
    }

    /// Deliver `handoff`, waiting for queue space unless the session is
    /// cancelled first. Undelivered messages are returned.
    fn send(&self, handoff: HandOff) -> std::result::Result<(), HandOff> {
        let permit = futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = self.sender.reserve() => permit.ok(),
            }
        });

        match permit {
            Some(permit) => {
                permit.send(handoff);
                Ok(())
            }
            None => {
                if !self.cancel.is_cancelled() {
                    warn!("Buffer receiver dropped, stopping decode");
                }
                Err(handoff)
            }
        }
    }

    fn record_decoded(&self, frames: &[Frame]) {
        let mut stats = self.shared.stats.lock();
        stats.frames_decoded += frames.len() as u64;
        stats.samples_decoded += frames
            .iter()
            .map(|f| f.sample_count().max(0) as u64)
            .sum::<u64>();
    }

    /// Close frames that will never be handed off.
    fn discard(&self, frames: impl Iterator<Item = Frame>) {
        let mut released = 0u64;
        for mut frame in frames {
            frame.close();
            released += 1;
        }
        if released > 0 {
            self.shared.stats.lock().frames_discarded += released;
        }
    }

    fn discard_buffer(&mut self) {
        let released = self.buffer.close();
        if released > 0 {
            debug!(frames = released, "Discarded partially filled buffer");
            self.shared.stats.lock().frames_discarded += released as u64;
        }
    }
}
