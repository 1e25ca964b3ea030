//! Test backends shared by the integration suites.

#![allow(dead_code)]

use core_decode::{
    AudioFormat, DecodeBackend, DecodeError, Frame, FrameData, PacketReadError, Result,
    SampleFormat,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backend replaying a fixed script of decode results.
///
/// Once the script is exhausted it reports packet EOF, or keeps producing
/// frames forever when built with [`ScriptedBackend::endless`].
pub struct ScriptedBackend {
    format: Arc<AudioFormat>,
    script: VecDeque<Result<Vec<Frame>>>,
    drained: Vec<i32>,
    endless: Option<i32>,
    pub closed: Arc<AtomicBool>,
    pub close_calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    /// Mono S16P at 1000 Hz, so durations map to round sample counts.
    pub fn new() -> Self {
        Self::with_format(AudioFormat::new(1000, 1, SampleFormat::S16P))
    }

    pub fn with_format(format: AudioFormat) -> Self {
        Self {
            format: Arc::new(format),
            script: VecDeque::new(),
            drained: Vec::new(),
            endless: None,
            closed: Arc::new(AtomicBool::new(false)),
            close_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Next `decode_next` returns frames with these sample counts.
    pub fn then_frames(mut self, counts: &[i32]) -> Self {
        self.script.push_back(Ok(frames(counts)));
        self
    }

    pub fn then_error(mut self, err: impl Into<DecodeError>) -> Self {
        self.script.push_back(Err(err.into()));
        self
    }

    /// Frames returned by `drain` after EOF.
    pub fn with_drained(mut self, counts: &[i32]) -> Self {
        self.drained = counts.to_vec();
        self
    }

    /// Never reach EOF; keep returning one frame of `samples`.
    pub fn endless(mut self, samples: i32) -> Self {
        self.endless = Some(samples);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DecodeBackend for ScriptedBackend {
    fn audio_format(&self) -> Arc<AudioFormat> {
        self.format.clone()
    }

    fn decode_next(&mut self) -> Result<Vec<Frame>> {
        if let Some(step) = self.script.pop_front() {
            return step;
        }
        match self.endless {
            Some(samples) => {
                std::thread::sleep(Duration::from_millis(1));
                Ok(frames(&[samples]))
            }
            None => Err(PacketReadError::EOF.into()),
        }
    }

    fn drain(&mut self) -> Result<Vec<Frame>> {
        Ok(frames(&std::mem::take(&mut self.drained)))
    }

    fn seek(&mut self, _position: Duration) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

/// Frames with the given sample counts and silent S16 mono planes.
pub fn frames(counts: &[i32]) -> Vec<Frame> {
    counts
        .iter()
        .map(|&n| {
            let plane = bytes::Bytes::from(vec![0u8; n.max(0) as usize * 2]);
            Frame::new(n, FrameData::new(vec![plane]))
        })
        .collect()
}
