//! # Decode Error Types
//!
//! Typed errors for the decode pipeline. Raw backend result codes are wrapped
//! into one of these kinds right next to the backend call that produced them.
//!
//! Four kinds carry the originating [`ResultCode`]; three setup kinds carry a
//! description only. Decoder and packet-read failures have a canonical `EOF`
//! value so the decode loop can recognise end of stream without comparing raw
//! codes:
//!
//! ```rust
//! use core_decode::{DecodeError, PacketReadError, ResultCode, SeekError};
//!
//! let err = DecodeError::from(PacketReadError::EOF);
//! assert!(err.is_eof());
//!
//! // A seek never reports end of stream, even with the same code.
//! assert!(!SeekError::new(ResultCode::EOF).is_eof());
//! ```

use crate::result_code::ResultCode;
use thiserror::Error;

macro_rules! coded_error {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[error("{}", .0.error_description())]
        pub struct $name(ResultCode);

        impl $name {
            pub const fn new(code: ResultCode) -> Self {
                Self(code)
            }

            /// The backend code this error was raised with.
            pub const fn code(&self) -> ResultCode {
                self.0
            }

            /// Readable description of the underlying code.
            pub fn description(&self) -> String {
                self.0.error_description()
            }
        }
    };
}

coded_error!(
    /// Decoding a compressed packet failed.
    DecoderError
);

coded_error!(
    /// Reading the next packet from the demuxed stream failed.
    PacketReadError
);

coded_error!(
    /// Repositioning within the stream failed.
    SeekError
);

coded_error!(
    /// The decoder could not be constructed for the probed stream.
    DecoderInitializationError
);

impl DecoderError {
    /// The codec has no more frames to give.
    pub const EOF: DecoderError = DecoderError(ResultCode::EOF);

    pub const fn is_eof(&self) -> bool {
        self.0.is_eof()
    }
}

impl PacketReadError {
    /// The demuxer reached the end of the stream.
    pub const EOF: PacketReadError = PacketReadError(ResultCode::EOF);

    pub const fn is_eof(&self) -> bool {
        self.0.is_eof()
    }
}

impl SeekError {
    /// Always false: a failed seek is never end of stream.
    pub const fn is_eof(&self) -> bool {
        false
    }
}

/// Errors that can occur while opening, decoding or seeking a stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    // ========================================================================
    // Per-operation failures
    // ========================================================================
    /// Decoding a packet failed.
    #[error("Decoder error: {0}")]
    Decoder(#[from] DecoderError),

    /// Reading a packet failed.
    #[error("Packet read error: {0}")]
    PacketRead(#[from] PacketReadError),

    /// Seeking failed. Recoverable: the caller may retry at another position.
    #[error("Seek error: {0}")]
    Seek(#[from] SeekError),

    // ========================================================================
    // One-time setup failures
    // ========================================================================
    /// The decoder could not be initialized.
    #[error("Decoder initialization error: {0}")]
    DecoderInitialization(#[from] DecoderInitializationError),

    /// The container/format context could not be opened.
    #[error("Format context initialization error: {description}")]
    FormatContextInitialization { description: String },

    /// The codec could not be initialized.
    #[error("Codec initialization error: {description}")]
    CodecInitialization { description: String },

    /// The sample format converter could not be initialized.
    #[error("Resampler initialization error: {description}")]
    ResamplerInitialization { description: String },
}

impl DecodeError {
    pub fn format_context(description: impl Into<String>) -> Self {
        Self::FormatContextInitialization {
            description: description.into(),
        }
    }

    pub fn codec(description: impl Into<String>) -> Self {
        Self::CodecInitialization {
            description: description.into(),
        }
    }

    pub fn resampler(description: impl Into<String>) -> Self {
        Self::ResamplerInitialization {
            description: description.into(),
        }
    }

    /// The backend code, for the coded kinds.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            DecodeError::Decoder(e) => Some(e.code()),
            DecodeError::PacketRead(e) => Some(e.code()),
            DecodeError::Seek(e) => Some(e.code()),
            DecodeError::DecoderInitialization(e) => Some(e.code()),
            DecodeError::FormatContextInitialization { .. }
            | DecodeError::CodecInitialization { .. }
            | DecodeError::ResamplerInitialization { .. } => None,
        }
    }

    /// Returns `true` for decoder or packet-read end of stream.
    pub fn is_eof(&self) -> bool {
        match self {
            DecodeError::Decoder(e) => e.is_eof(),
            DecodeError::PacketRead(e) => e.is_eof(),
            _ => false,
        }
    }

    /// Readable description without the kind prefix.
    pub fn description(&self) -> String {
        match self {
            DecodeError::Decoder(e) => e.description(),
            DecodeError::PacketRead(e) => e.description(),
            DecodeError::Seek(e) => e.description(),
            DecodeError::DecoderInitialization(e) => e.description(),
            DecodeError::FormatContextInitialization { description }
            | DecodeError::CodecInitialization { description }
            | DecodeError::ResamplerInitialization { description } => description.clone(),
        }
    }

    /// Returns `true` if this error was raised while opening the stream.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            DecodeError::DecoderInitialization(_)
                | DecodeError::FormatContextInitialization { .. }
                | DecodeError::CodecInitialization { .. }
                | DecodeError::ResamplerInitialization { .. }
        )
    }

    /// Returns `true` if the stream can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DecodeError::Seek(_))
    }

    /// Short name of the error kind, for logs and failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Decoder(_) => "decoder",
            DecodeError::PacketRead(_) => "packet_read",
            DecodeError::Seek(_) => "seek",
            DecodeError::DecoderInitialization(_) => "decoder_initialization",
            DecodeError::FormatContextInitialization { .. } => "format_context_initialization",
            DecodeError::CodecInitialization { .. } => "codec_initialization",
            DecodeError::ResamplerInitialization { .. } => "resampler_initialization",
        }
    }
}

/// Result type for decode operations.
pub type Result<T> = std::result::Result<T, DecodeError>;
