//! # Format Detection
//!
//! Builds probe hints for Symphonia and names codecs for logging.

use std::path::Path;
use symphonia::core::codecs::{CodecRegistry, CodecType};
use symphonia::core::probe::Hint;
use tracing::debug;

/// Probe hint helpers.
///
/// Hints only speed up probing; the container is always identified from its
/// content, so a wrong or missing extension still opens.
pub struct FormatDetector;

impl FormatDetector {
    /// Create a probe hint from a file path's extension.
    ///
    /// ```rust
    /// use core_decode::FormatDetector;
    /// use std::path::Path;
    ///
    /// let _hint = FormatDetector::hint_from_path(Path::new("/music/song.flac"));
    /// ```
    pub fn hint_from_path(path: &Path) -> Hint {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(extension) => Self::hint_from_extension(extension),
            None => {
                debug!("No file extension found, probe will auto-detect");
                Hint::new()
            }
        }
    }

    pub fn hint_from_extension(extension: &str) -> Hint {
        let mut hint = Hint::new();
        let extension = extension.trim_start_matches('.');
        if !extension.is_empty() {
            debug!("Setting probe hint extension: {}", extension);
            hint.with_extension(extension);
        }
        hint
    }

    /// Short name `codecs` registers for `codec_type`, e.g. `"flac"`.
    pub fn codec_name(codecs: &CodecRegistry, codec_type: CodecType) -> &'static str {
        codecs
            .get_codec(codec_type)
            .map(|descriptor| descriptor.short_name)
            .unwrap_or("unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::{CODEC_TYPE_FLAC, CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16LE};

    #[test]
    fn test_hints_do_not_panic() {
        let _ = FormatDetector::hint_from_path(Path::new("/music/song.mp3"));
        let _ = FormatDetector::hint_from_path(Path::new("/music/no_extension"));
        let _ = FormatDetector::hint_from_extension(".wav");
        let _ = FormatDetector::hint_from_extension("");
    }

    #[test]
    fn test_codec_name() {
        let codecs = symphonia::default::get_codecs();
        assert_eq!(FormatDetector::codec_name(codecs, CODEC_TYPE_FLAC), "flac");
        assert_eq!(FormatDetector::codec_name(codecs, CODEC_TYPE_PCM_S16LE), "pcm_s16le");
        assert_eq!(FormatDetector::codec_name(codecs, CODEC_TYPE_NULL), "unknown");
        assert_eq!(
            FormatDetector::codec_name(&CodecRegistry::new(), CODEC_TYPE_FLAC),
            "unknown"
        );
    }
}
