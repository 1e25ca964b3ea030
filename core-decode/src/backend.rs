//! # Decode Backend Contract
//!
//! The decode backend demuxes a container and decodes its packets into
//! [`Frame`]s. The pipeline only consumes frames and typed errors from it:
//! implementations convert their numeric result codes into [`DecodeError`]s
//! right at the call that produced them.
//!
//! ## End of stream
//!
//! When the demuxer runs out of packets, [`DecodeBackend::decode_next`] returns
//! `Err(DecodeError::PacketRead(PacketReadError::EOF))`. The pipeline then calls
//! [`DecodeBackend::drain`] to collect whatever the codec still holds; those
//! frames become the terminal frames of the stream.
//!
//! [`DecodeError`]: crate::DecodeError

use crate::audio_format::AudioFormat;
use crate::error::Result;
use crate::frame::Frame;
use std::sync::Arc;
use std::time::Duration;

/// A demuxer + codec pair producing decoded frames for one stream.
///
/// Runs on the decode producer thread, hence `Send`.
pub trait DecodeBackend: Send {
    /// PCM format of the frames this backend produces.
    fn audio_format(&self) -> Arc<AudioFormat>;

    /// Read the next packet and decode it into zero or more frames.
    ///
    /// # Errors
    ///
    /// - `PacketRead(PacketReadError::EOF)` once the stream is exhausted
    /// - `PacketRead(_)` if reading failed
    /// - `Decoder(_)` if the packet could not be decoded
    fn decode_next(&mut self) -> Result<Vec<Frame>>;

    /// Flush the frames the codec still buffers after end of stream.
    fn drain(&mut self) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }

    /// Reposition the stream so the next decoded frame starts at `position`.
    ///
    /// # Errors
    ///
    /// Returns `Seek(_)`; the stream stays usable and the caller may retry.
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// Release demuxer and codec resources. Calling this more than once is a no-op.
    fn close(&mut self);

    /// Short description of the source, for logs.
    fn source_name(&self) -> &str {
        "unknown source"
    }
}

impl<B: DecodeBackend + ?Sized> DecodeBackend for Box<B> {
    fn audio_format(&self) -> Arc<AudioFormat> {
        (**self).audio_format()
    }

    fn decode_next(&mut self) -> Result<Vec<Frame>> {
        (**self).decode_next()
    }

    fn drain(&mut self) -> Result<Vec<Frame>> {
        (**self).drain()
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        (**self).seek(position)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn source_name(&self) -> &str {
        (**self).source_name()
    }
}

/// Closes the wrapped backend when dropped, on every exit path.
pub struct BackendGuard<B: DecodeBackend> {
    backend: B,
}

impl<B: DecodeBackend> BackendGuard<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: DecodeBackend> std::ops::Deref for BackendGuard<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.backend
    }
}

impl<B: DecodeBackend> std::ops::DerefMut for BackendGuard<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: DecodeBackend> Drop for BackendGuard<B> {
    fn drop(&mut self) {
        self.backend.close();
    }
}
