//! # Decoded Frames
//!
//! A [`Frame`] is one unit of decoded PCM produced by the backend. It owns its
//! sample storage exclusively: frames are moved from the decoder into a
//! [`FrameBuffer`](crate::FrameBuffer), and from there to the consumer, but
//! never copied.

use bytes::Bytes;
use tracing::trace;

/// Sample storage of one frame.
///
/// Planar formats hold one plane per channel; interleaved formats hold a
/// single plane with all channels.
#[derive(Debug, Default)]
pub struct FrameData {
    planes: Vec<Bytes>,
}

impl FrameData {
    pub fn new(planes: Vec<Bytes>) -> Self {
        Self { planes }
    }

    pub fn planes(&self) -> &[Bytes] {
        &self.planes
    }

    /// Total bytes across all planes.
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(Bytes::len).sum()
    }
}

/// One decoded unit of audio.
#[derive(Debug)]
pub struct Frame {
    sample_count: i32,
    data: Option<FrameData>,
}

impl Frame {
    /// Create a frame holding `sample_count` samples per channel.
    pub fn new(sample_count: i32, data: FrameData) -> Self {
        Self {
            sample_count,
            data: Some(data),
        }
    }

    /// Number of samples (per channel) in this frame.
    pub fn sample_count(&self) -> i32 {
        self.sample_count
    }

    /// Sample planes, empty once the frame has been closed.
    pub fn planes(&self) -> &[Bytes] {
        self.data.as_ref().map(FrameData::planes).unwrap_or(&[])
    }

    pub fn byte_len(&self) -> usize {
        self.data.as_ref().map(FrameData::byte_len).unwrap_or(0)
    }

    /// Release the sample storage. Calling this more than once is a no-op.
    ///
    /// The sample count is kept so accounting stays valid after release.
    pub fn close(&mut self) {
        if let Some(data) = self.data.take() {
            trace!(bytes = data.byte_len(), "Released frame storage");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.data.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_frame(samples: i32) -> Frame {
        let plane = Bytes::from(vec![0u8; samples as usize * 4]);
        Frame::new(samples, FrameData::new(vec![plane.clone(), plane]))
    }

    #[test]
    fn test_frame_accessors() {
        let frame = stereo_frame(256);
        assert_eq!(frame.sample_count(), 256);
        assert_eq!(frame.planes().len(), 2);
        assert_eq!(frame.byte_len(), 2 * 256 * 4);
        assert!(!frame.is_closed());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut frame = stereo_frame(128);
        frame.close();
        assert!(frame.is_closed());
        assert!(frame.planes().is_empty());
        assert_eq!(frame.byte_len(), 0);

        frame.close();
        assert!(frame.is_closed());
        assert_eq!(frame.sample_count(), 128);
    }
}
