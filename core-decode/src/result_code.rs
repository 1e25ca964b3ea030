//! # Backend Result Codes
//!
//! Every call into the decode backend (demuxing, decoding, seeking) produces a
//! signed 32-bit result code. Zero means success, negative values are errors,
//! and some calls return a non-negative byte count on success, so callers check
//! the sign rather than comparing with zero.
//!
//! Codes follow the FFmpeg conventions: tagged errors are the negated
//! little-endian four-character tag (`-MKTAG('E','O','F',' ')` for end of
//! stream) and errno-style errors are the negated errno value.
//!
//! ```rust
//! use core_decode::ResultCode;
//!
//! let code = ResultCode::EOF;
//! assert!(code.is_eof());
//! assert!(code.is_negative());
//! assert_eq!(code.error_description(), "End of file");
//!
//! assert_eq!(ResultCode::SUCCESS.error_description(), "No error");
//! ```

use std::fmt;

/// Size of the buffer the backend writes error strings into, terminator included.
pub const ERROR_STRING_BUFFER_SIZE: usize = 100;

/// Returned by [`ResultCode::error_description`] for success.
pub const NO_ERROR_DESCRIPTION: &str = "No error";

/// Returned by [`ResultCode::error_description`] when the lookup itself fails.
pub const UNKNOWN_ERROR_DESCRIPTION: &str = "Unknown error";

/// Largest errno magnitude treated as an errno-style code.
const MAX_ERRNO: i32 = 4095;

/// Errno values that differ between Darwin and other Unix-likes.
mod errno {
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub const EAGAIN: i32 = 35;
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    pub const ENOSYS: i32 = 78;

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    pub const EAGAIN: i32 = 11;
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    pub const ENOSYS: i32 = 38;
}

const fn tag(a: u8, b: u8, c: u8, d: u8) -> i32 {
    -((a as i32) | ((b as i32) << 8) | ((c as i32) << 16) | ((d as i32) << 24))
}

/// A raw result code returned by the decode backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ResultCode(i32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);

    /// End of stream. The only code for which [`ResultCode::is_eof`] is true.
    pub const EOF: ResultCode = ResultCode(tag(b'E', b'O', b'F', b' '));
    pub const INVALID_DATA: ResultCode = ResultCode(tag(b'I', b'N', b'D', b'A'));
    pub const DECODER_NOT_FOUND: ResultCode = ResultCode(tag(0xF8, b'D', b'E', b'C'));
    pub const DEMUXER_NOT_FOUND: ResultCode = ResultCode(tag(0xF8, b'D', b'E', b'M'));
    pub const STREAM_NOT_FOUND: ResultCode = ResultCode(tag(0xF8, b'S', b'T', b'R'));
    pub const PATCH_WELCOME: ResultCode = ResultCode(tag(b'P', b'A', b'W', b'E'));
    pub const BUG: ResultCode = ResultCode(tag(b'B', b'U', b'G', b'!'));
    pub const EXIT: ResultCode = ResultCode(tag(b'E', b'X', b'I', b'T'));
    pub const EXTERNAL: ResultCode = ResultCode(tag(b'E', b'X', b'T', b' '));

    pub const EIO: ResultCode = ResultCode::from_errno(5);
    pub const ENOMEM: ResultCode = ResultCode::from_errno(12);
    pub const EINVAL: ResultCode = ResultCode::from_errno(22);
    pub const EAGAIN: ResultCode = ResultCode::from_errno(errno::EAGAIN);
    pub const ENOSYS: ResultCode = ResultCode::from_errno(errno::ENOSYS);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    /// Builds the errno-style code for a positive errno value.
    pub const fn from_errno(errno: i32) -> Self {
        Self(-errno)
    }

    /// The raw code.
    pub const fn code(self) -> i32 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_non_zero(self) -> bool {
        self.0 != 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_non_negative(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_non_positive(self) -> bool {
        self.0 <= 0
    }

    pub const fn is_eof(self) -> bool {
        self.0 == Self::EOF.0
    }

    /// Human-readable description of this code using the default backend lookup.
    pub fn error_description(self) -> String {
        self.error_description_with(&BackendErrorStrings)
    }

    /// Human-readable description of this code using `lookup`.
    ///
    /// Never fails: zero yields [`NO_ERROR_DESCRIPTION`], a failed lookup yields
    /// [`UNKNOWN_ERROR_DESCRIPTION`]. Text is limited to what fits in
    /// [`ERROR_STRING_BUFFER_SIZE`] bytes including the terminator.
    pub fn error_description_with(self, lookup: &dyn ErrorStringLookup) -> String {
        if self.is_zero() {
            return NO_ERROR_DESCRIPTION.to_string();
        }

        match lookup.error_string(self, ERROR_STRING_BUFFER_SIZE) {
            Some(text) if !text.is_empty() => {
                truncate_to_buffer(text, ERROR_STRING_BUFFER_SIZE)
            }
            _ => UNKNOWN_ERROR_DESCRIPTION.to_string(),
        }
    }
}

impl From<i32> for ResultCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        code.0
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error_description(), self.0)
    }
}

/// The backend's error-to-string facility.
pub trait ErrorStringLookup {
    /// Writes a description of `code` that fits in `buf_size` bytes, or `None`
    /// when the code is not known to the backend.
    fn error_string(&self, code: ResultCode, buf_size: usize) -> Option<String>;
}

/// Default lookup: the tagged backend errors, then errno-style codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendErrorStrings;

impl BackendErrorStrings {
    fn tagged(code: ResultCode) -> Option<&'static str> {
        let text = match code {
            ResultCode::EOF => "End of file",
            ResultCode::INVALID_DATA => "Invalid data found when processing input",
            ResultCode::DECODER_NOT_FOUND => "Decoder not found",
            ResultCode::DEMUXER_NOT_FOUND => "Demuxer not found",
            ResultCode::STREAM_NOT_FOUND => "Stream not found",
            ResultCode::PATCH_WELCOME => "Not yet implemented in FFmpeg, patches welcome",
            ResultCode::BUG => "Internal bug, should not have happened",
            ResultCode::EXIT => "Immediate exit requested",
            ResultCode::EXTERNAL => "Generic error in an external library",
            ResultCode::EIO => "Input/output error",
            ResultCode::ENOMEM => "Cannot allocate memory",
            ResultCode::EINVAL => "Invalid argument",
            ResultCode::EAGAIN => "Resource temporarily unavailable",
            ResultCode::ENOSYS => "Function not implemented",
            _ => return None,
        };
        Some(text)
    }

    fn errno(code: ResultCode) -> Option<String> {
        let errno = code.code().checked_neg()?;
        if !(1..=MAX_ERRNO).contains(&errno) {
            return None;
        }

        let text = std::io::Error::from_raw_os_error(errno).to_string();
        // std appends " (os error N)"; the backend reports the bare message.
        let text = match text.rsplit_once(" (os error ") {
            Some((message, _)) => message.to_string(),
            None => text,
        };
        Some(text)
    }
}

impl ErrorStringLookup for BackendErrorStrings {
    fn error_string(&self, code: ResultCode, buf_size: usize) -> Option<String> {
        if buf_size == 0 {
            return None;
        }

        Self::tagged(code)
            .map(str::to_string)
            .or_else(|| Self::errno(code))
    }
}

fn truncate_to_buffer(mut text: String, buf_size: usize) -> String {
    let max_len = buf_size.saturating_sub(1);
    if text.len() > max_len {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
