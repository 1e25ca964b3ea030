//! # Frame Buffer
//!
//! A temporary container that accumulates decoded frames until enough samples
//! have been gathered to schedule them for playback.
//!
//! ## Capacity
//!
//! [`FrameBuffer::append_frame`] only accepts a frame if the buffer's sample
//! count stays within `max_sample_count`. A rejected frame is handed back to
//! the caller untouched, which is the signal that the buffer is full and should
//! be handed off before the frame is retried on a new buffer.
//!
//! Terminal frames (the last frames of a stream, or a single frame too large
//! to ever fit) go through [`FrameBuffer::append_terminal_frames`], which
//! ignores the limit.
//!
//! ```rust
//! use core_decode::{AudioFormat, Frame, FrameBuffer, FrameData, SampleFormat};
//! use std::sync::Arc;
//!
//! let format = Arc::new(AudioFormat::new(44100, 2, SampleFormat::F32P));
//! let mut buffer = FrameBuffer::new(format, 4096);
//!
//! assert!(buffer.append_frame(Frame::new(4096, FrameData::default())).is_ok());
//!
//! let rejected = buffer.append_frame(Frame::new(1, FrameData::default()));
//! assert!(rejected.is_err());
//! assert_eq!(buffer.sample_count(), 4096);
//! ```
//!
//! ## Threading
//!
//! No internal locking. A buffer is filled by one producer and then moved, as
//! a whole, to the consumer.

use crate::audio_format::AudioFormat;
use crate::frame::Frame;
use std::sync::Arc;
use tracing::trace;

/// Ordered run of frames bounded by a sample budget.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Frames in stream order.
    frames: Vec<Frame>,

    /// PCM format of every frame in this buffer.
    audio_format: Arc<AudioFormat>,

    /// Sum of the sample counts of `frames`. Wider than a frame's count so
    /// terminal appends past `i32::MAX` stay exact.
    sample_count: i64,

    /// Limit for frames appended through `append_frame`. Set once.
    max_sample_count: i32,

    /// Set once terminal frames have been appended.
    terminal: bool,
}

impl FrameBuffer {
    pub fn new(audio_format: Arc<AudioFormat>, max_sample_count: i32) -> Self {
        debug_assert!(max_sample_count > 0, "max_sample_count must be positive");

        Self {
            frames: Vec::new(),
            audio_format,
            sample_count: 0,
            max_sample_count,
            terminal: false,
        }
    }

    /// Attempts to append a single frame, limited by `max_sample_count`.
    ///
    /// On success the frame is moved into the buffer. If its samples would not
    /// fit, the buffer is left unchanged and the frame is returned in `Err` so
    /// the caller keeps ownership.
    ///
    /// A frame that alone exceeds `max_sample_count` is rejected even by an
    /// empty buffer; such frames must go through
    /// [`append_terminal_frames`](Self::append_terminal_frames).
    pub fn append_frame(&mut self, frame: Frame) -> Result<(), Frame> {
        let total = self.sample_count + i64::from(frame.sample_count());

        if total > i64::from(self.max_sample_count) {
            trace!(
                frame_samples = frame.sample_count(),
                remaining = self.remaining_capacity(),
                max = self.max_sample_count,
                "Frame buffer full"
            );
            return Err(frame);
        }

        self.sample_count = total;
        self.frames.push(frame);
        Ok(())
    }

    /// Appends the final frames of a stream, ignoring `max_sample_count`.
    ///
    /// Every frame is appended, in order. The sample count may exceed the
    /// limit afterwards.
    pub fn append_terminal_frames(&mut self, frames: impl IntoIterator<Item = Frame>) {
        for frame in frames {
            self.sample_count += i64::from(frame.sample_count());
            self.frames.push(frame);
        }
        self.terminal = true;
    }

    /// Whether the samples need converting before the platform engine can play them.
    pub fn needs_format_conversion(&self) -> bool {
        self.audio_format.needs_format_conversion()
    }

    pub fn audio_format(&self) -> &Arc<AudioFormat> {
        &self.audio_format
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn sample_count(&self) -> i64 {
        self.sample_count
    }

    pub fn max_sample_count(&self) -> i32 {
        self.max_sample_count
    }

    /// Samples that can still be appended through `append_frame`.
    pub fn remaining_capacity(&self) -> i32 {
        let remaining = i64::from(self.max_sample_count) - self.sample_count;
        remaining.clamp(0, i64::from(self.max_sample_count)) as i32
    }

    /// Number of frames held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Returns `true` if terminal frames were appended to this buffer.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Releases every frame and empties the buffer. Returns the number of frames released.
    pub fn close(&mut self) -> usize {
        let released = self.frames.len();
        for mut frame in self.frames.drain(..) {
            frame.close();
        }
        self.sample_count = 0;
        released
    }
}
