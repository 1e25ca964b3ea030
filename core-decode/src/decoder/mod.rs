//! # Symphonia Decoding
//!
//! [`SymphoniaBackend`] is the production [`DecodeBackend`](crate::DecodeBackend):
//! it probes the container, picks the first decodable audio track and turns
//! each packet into a planar [`Frame`](crate::Frame).
//!
//! ```rust,no_run
//! use core_decode::{DecodeBackend, DecodeConfig, SymphoniaBackend};
//!
//! # fn example() -> core_decode::Result<()> {
//! let mut backend = SymphoniaBackend::open("/path/to/song.flac", &DecodeConfig::default())?;
//! println!("{:?}", backend.audio_format());
//!
//! loop {
//!     match backend.decode_next() {
//!         Ok(frames) => println!("decoded {} frames", frames.len()),
//!         Err(e) if e.is_eof() => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! backend.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Sample formats
//!
//! Frames keep the codec's own sample type whenever a planar tag exists for
//! it (u8, i16, i32, f32, f64). Other integer widths are widened to 32-bit
//! signed planes.

mod format_detector;
mod symphonia;

pub use self::symphonia::{result_code, SymphoniaBackend};
pub use format_detector::FormatDetector;
