//! # Symphonia Backend
//!
//! [`DecodeBackend`] implementation on top of Symphonia's probe, format
//! readers and codecs.
//!
//! The PCM format of a stream is taken from the first decoded packet rather
//! than from the container headers, since some codecs only report their
//! channel count once decoding starts. That first packet is decoded while
//! opening and its frame is returned by the first `decode_next` call.

use crate::audio_format::{AudioFormat, SampleFormat};
use crate::backend::DecodeBackend;
use crate::config::DecodeConfig;
use crate::decoder::format_detector::FormatDetector;
use crate::error::{
    DecodeError, DecoderError, DecoderInitializationError, PacketReadError, Result, SeekError,
};
use crate::frame::{Frame, FrameData};
use crate::result_code::ResultCode;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CodecRegistry, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::{FromSample, IntoSample};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::{i24, u24, Sample, SampleFormat as SymphoniaSampleFormat};
use symphonia::core::units::Time;
use tracing::{debug, error, info, instrument, trace, warn};

/// Result code equivalent of a Symphonia error.
pub fn result_code(err: &SymphoniaError) -> ResultCode {
    match err {
        SymphoniaError::IoError(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            ResultCode::EOF
        }
        SymphoniaError::IoError(_) => ResultCode::EIO,
        SymphoniaError::DecodeError(_) => ResultCode::INVALID_DATA,
        SymphoniaError::SeekError(_) => ResultCode::EINVAL,
        SymphoniaError::Unsupported(_) => ResultCode::PATCH_WELCOME,
        SymphoniaError::LimitError(_) => ResultCode::ENOMEM,
        SymphoniaError::ResetRequired => ResultCode::EXTERNAL,
    }
}

/// Decodes one audio track of a container with Symphonia.
///
/// Owned by the decode producer thread. Dropping the backend releases the
/// reader and codec as well, `close` only does it earlier.
pub struct SymphoniaBackend {
    /// Demuxer; `None` once closed.
    reader: Option<Box<dyn FormatReader>>,

    /// Codec; `None` once closed.
    decoder: Option<Box<dyn Decoder>>,

    track_id: u32,

    format: Arc<AudioFormat>,

    /// Track duration, if the container reports it.
    duration: Option<Duration>,

    /// Frames decoded while opening, not yet returned.
    pending: Option<Vec<Frame>>,

    /// Corrupt packets tolerated in a row.
    max_consecutive_errors: usize,

    /// Samples per channel returned so far.
    position_samples: u64,

    source_name: String,
}

impl SymphoniaBackend {
    /// Open a local file.
    ///
    /// # Errors
    ///
    /// - `FormatContextInitialization` if the file cannot be read or probed, or
    ///   has no decodable audio track
    /// - `DecoderInitialization` if the track parameters are unusable
    /// - `CodecInitialization` if no codec is available for the track
    #[instrument(skip(path, config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &DecodeConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            error!("Failed to open file {:?}: {}", path, e);
            DecodeError::format_context(format!("Failed to open {}: {}", path.display(), e))
        })?;

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self::from_source(
            Box::new(file),
            FormatDetector::hint_from_path(path),
            name,
            config,
        )
    }

    /// Open an in-memory stream. `extension` is an optional probe hint such as `"wav"`.
    pub fn from_bytes(data: Bytes, extension: Option<&str>, config: &DecodeConfig) -> Result<Self> {
        let hint = extension
            .map(FormatDetector::hint_from_extension)
            .unwrap_or_else(Hint::new);
        let name = format!("memory buffer ({} bytes)", data.len());

        Self::from_source(Box::new(Cursor::new(data)), hint, name, config)
    }

    fn from_source(
        source: Box<dyn MediaSource>,
        hint: Hint,
        source_name: String,
        config: &DecodeConfig,
    ) -> Result<Self> {
        let stream = MediaSourceStream::new(source, Default::default());

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                error!("Format probe failed for {}: {}", source_name, e);
                DecodeError::format_context(format!("Failed to probe format: {}", e))
            })?;

        Self::from_reader(
            probed.format,
            symphonia::default::get_codecs(),
            source_name,
            config,
        )
    }

    /// Decode the first audio track of an opened format reader, with a codec
    /// from `codecs`.
    ///
    /// # Errors
    ///
    /// - `FormatContextInitialization` if the reader has no audio track
    /// - `DecoderInitialization(INVALID_DATA)` if the track has no sample rate,
    ///   or declares no channels and has no packet to learn them from
    /// - `CodecInitialization` if `codecs` has no decoder for the track
    pub fn from_reader(
        reader: Box<dyn FormatReader>,
        codecs: &CodecRegistry,
        source_name: impl Into<String>,
        config: &DecodeConfig,
    ) -> Result<Self> {
        let source_name = source_name.into();

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                error!("No audio track found in {}", source_name);
                DecodeError::format_context("No supported audio tracks")
            })?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let codec_name = FormatDetector::codec_name(codecs, params.codec);

        let sample_rate = params.sample_rate.filter(|&rate| rate > 0).ok_or_else(|| {
            error!("Track {} has no sample rate", track_id);
            DecoderInitializationError::new(ResultCode::INVALID_DATA)
        })?;

        let decoder = codecs
            .make(&params, &DecoderOptions::default())
            .map_err(|e| {
                error!("Failed to create codec: {}", e);
                DecodeError::codec(format!("No decoder for {}: {}", codec_name, e))
            })?;

        let duration = params
            .n_frames
            .map(|frames| Duration::from_secs_f64(frames as f64 / sample_rate as f64));

        // Containers may leave the channel count to the codec; the first
        // decoded packet settles it.
        let declared_channels = params
            .channels
            .map(|c| c.count() as u16)
            .filter(|&count| count > 0);
        let declared_format = AudioFormat::new(
            sample_rate,
            declared_channels.unwrap_or(0),
            params
                .sample_format
                .map(planar_format)
                .unwrap_or(SampleFormat::NATIVE),
        );

        let mut backend = Self {
            reader: Some(reader),
            decoder: Some(decoder),
            track_id,
            format: Arc::new(declared_format),
            duration,
            pending: None,
            max_consecutive_errors: config.max_consecutive_errors.max(1),
            position_samples: 0,
            source_name,
        };

        let primed = backend.decode_packet(|decoded| {
            let spec = decoded.spec();
            let sample_format = native_format(decoded);
            let format = AudioFormat::new(spec.rate, spec.channels.count() as u16, sample_format);
            Ok((format, render_frame(decoded, sample_format)?))
        });

        match primed {
            Ok((format, frame)) => {
                backend.format = Arc::new(format);
                backend.pending = Some(vec![frame]);
            }
            Err(e) if e.is_eof() => {
                if declared_channels.is_none() {
                    error!("Track {} has no channels and no packets", track_id);
                    return Err(DecoderInitializationError::new(ResultCode::INVALID_DATA).into());
                }
                warn!("{} contains no audio packets", backend.source_name);
                backend.pending = Some(Vec::new());
            }
            Err(e) => {
                let code = e.code().unwrap_or(ResultCode::INVALID_DATA);
                return Err(DecoderInitializationError::new(code).into());
            }
        }

        info!(
            source = %backend.source_name,
            codec = codec_name,
            sample_rate = backend.format.sample_rate(),
            channels = backend.format.channel_count(),
            sample_format = ?backend.format.sample_format(),
            "Opened audio stream"
        );

        Ok(backend)
    }

    /// Track duration, if known.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Position of the next returned frame.
    pub fn position(&self) -> Duration {
        let rate = self.format.sample_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.position_samples as f64 / rate as f64)
    }

    /// Read packets until one of our track decodes, then hand the decoded
    /// buffer to `render`.
    ///
    /// Corrupt packets are skipped up to `max_consecutive_errors` in a row.
    fn decode_packet<R>(
        &mut self,
        render: impl FnOnce(&AudioBufferRef<'_>) -> Result<R>,
    ) -> Result<R> {
        let (Some(reader), Some(decoder)) = (self.reader.as_mut(), self.decoder.as_mut()) else {
            return Err(PacketReadError::EOF.into());
        };

        let mut consecutive_errors = 0;

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    let code = result_code(&e);
                    if code.is_eof() {
                        debug!("Reached end of stream at {} samples", self.position_samples);
                    } else {
                        error!("Failed to read packet: {}", e);
                    }
                    return Err(PacketReadError::new(code).into());
                }
            };

            // Drop metadata revisions read along with the packet.
            while !reader.metadata().is_latest() {
                reader.metadata().pop();
            }

            if packet.track_id() != self.track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => return render(&decoded),
                Err(SymphoniaError::DecodeError(e)) => {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping packet with decode error (attempt {}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, e
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        error!("Too many consecutive decode errors, giving up");
                        return Err(DecoderError::new(ResultCode::INVALID_DATA).into());
                    }
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() != std::io::ErrorKind::UnexpectedEof =>
                {
                    consecutive_errors += 1;
                    warn!(
                        "Skipping corrupted packet (attempt {}/{}): {}",
                        consecutive_errors, self.max_consecutive_errors, e
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        error!("Too many consecutive I/O errors, giving up");
                        return Err(DecoderError::new(ResultCode::EIO).into());
                    }
                }
                Err(e) => {
                    error!("Fatal decode error: {}", e);
                    return Err(DecoderError::new(result_code(&e)).into());
                }
            }
        }
    }
}

impl DecodeBackend for SymphoniaBackend {
    fn audio_format(&self) -> Arc<AudioFormat> {
        self.format.clone()
    }

    fn decode_next(&mut self) -> Result<Vec<Frame>> {
        let frames = match self.pending.take() {
            Some(frames) => frames,
            None => {
                let sample_format = self.format.sample_format();
                vec![self.decode_packet(|decoded| render_frame(decoded, sample_format))?]
            }
        };

        for frame in &frames {
            self.position_samples += frame.sample_count().max(0) as u64;
        }
        trace!(frames = frames.len(), position = self.position_samples, "Decoded packet");
        Ok(frames)
    }

    fn drain(&mut self) -> Result<Vec<Frame>> {
        // Symphonia codecs emit everything per packet; finalizing only reports verification.
        if let Some(decoder) = self.decoder.as_mut() {
            let finalized = decoder.finalize();
            if finalized.verify_ok == Some(false) {
                warn!("{} failed decoder verification", self.source_name);
            }
        }
        Ok(Vec::new())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if let Some(duration) = self.duration {
            if position > duration {
                warn!("Seek to {:?} beyond duration {:?}", position, duration);
                return Err(SeekError::new(ResultCode::EINVAL).into());
            }
        }

        let (Some(reader), Some(decoder)) = (self.reader.as_mut(), self.decoder.as_mut()) else {
            return Err(SeekError::new(ResultCode::EINVAL).into());
        };

        let seeked = reader
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(position.as_secs_f64()),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| {
                error!("Seek failed: {}", e);
                SeekError::new(result_code(&e))
            })?;

        decoder.reset();
        self.pending = None;
        self.position_samples = seeked.actual_ts;

        debug!("Seek completed to {:?} (ts {})", position, seeked.actual_ts);
        Ok(())
    }

    fn close(&mut self) {
        let was_open = self.reader.is_some();
        self.reader = None;
        self.decoder = None;
        self.pending = None;
        if was_open {
            debug!("Closed {}", self.source_name);
        }
    }

    fn source_name(&self) -> &str {
        &self.source_name
    }
}

/// Planar format Symphonia's buffers are stored as.
///
/// Sample types without a matching tag are widened to 32-bit signed.
fn planar_format(format: SymphoniaSampleFormat) -> SampleFormat {
    match format {
        SymphoniaSampleFormat::U8 => SampleFormat::U8P,
        SymphoniaSampleFormat::S16 => SampleFormat::S16P,
        SymphoniaSampleFormat::S32 => SampleFormat::S32P,
        SymphoniaSampleFormat::F32 => SampleFormat::F32P,
        SymphoniaSampleFormat::F64 => SampleFormat::F64P,
        _ => SampleFormat::S32P,
    }
}

fn native_format(decoded: &AudioBufferRef<'_>) -> SampleFormat {
    match decoded {
        AudioBufferRef::U8(_) => SampleFormat::U8P,
        AudioBufferRef::S16(_) => SampleFormat::S16P,
        AudioBufferRef::S32(_) => SampleFormat::S32P,
        AudioBufferRef::F32(_) => SampleFormat::F32P,
        AudioBufferRef::F64(_) => SampleFormat::F64P,
        AudioBufferRef::U16(_)
        | AudioBufferRef::U24(_)
        | AudioBufferRef::U32(_)
        | AudioBufferRef::S8(_)
        | AudioBufferRef::S24(_) => SampleFormat::S32P,
    }
}

/// Copy a decoded buffer into an owned frame with one plane per channel.
fn render_frame(decoded: &AudioBufferRef<'_>, sample_format: SampleFormat) -> Result<Frame> {
    let sample_count = i32::try_from(decoded.frames())
        .map_err(|_| DecoderError::new(ResultCode::ENOMEM))?;

    let planes = match sample_format.to_planar() {
        SampleFormat::U8P => render_planes::<u8>(decoded, |plane, s| plane.put_u8(s)),
        SampleFormat::S16P => render_planes::<i16>(decoded, |plane, s| plane.put_i16_ne(s)),
        SampleFormat::S32P => render_planes::<i32>(decoded, |plane, s| plane.put_i32_ne(s)),
        SampleFormat::F32P => render_planes::<f32>(decoded, |plane, s| plane.put_f32_ne(s)),
        SampleFormat::F64P => render_planes::<f64>(decoded, |plane, s| plane.put_f64_ne(s)),
        other => {
            error!("Cannot render decoded samples as {:?}", other);
            return Err(DecoderError::new(ResultCode::PATCH_WELCOME).into());
        }
    };

    Ok(Frame::new(sample_count, FrameData::new(planes)))
}

fn render_planes<U>(decoded: &AudioBufferRef<'_>, put: fn(&mut BytesMut, U)) -> Vec<Bytes>
where
    U: Sample
        + FromSample<u8>
        + FromSample<u16>
        + FromSample<u24>
        + FromSample<u32>
        + FromSample<i8>
        + FromSample<i16>
        + FromSample<i24>
        + FromSample<i32>
        + FromSample<f32>
        + FromSample<f64>,
{
    match decoded {
        AudioBufferRef::U8(buf) => channel_planes(&**buf, put),
        AudioBufferRef::U16(buf) => channel_planes(&**buf, put),
        AudioBufferRef::U24(buf) => channel_planes(&**buf, put),
        AudioBufferRef::U32(buf) => channel_planes(&**buf, put),
        AudioBufferRef::S8(buf) => channel_planes(&**buf, put),
        AudioBufferRef::S16(buf) => channel_planes(&**buf, put),
        AudioBufferRef::S24(buf) => channel_planes(&**buf, put),
        AudioBufferRef::S32(buf) => channel_planes(&**buf, put),
        AudioBufferRef::F32(buf) => channel_planes(&**buf, put),
        AudioBufferRef::F64(buf) => channel_planes(&**buf, put),
    }
}

fn channel_planes<T, U>(buf: &AudioBuffer<T>, put: fn(&mut BytesMut, U)) -> Vec<Bytes>
where
    T: Sample + IntoSample<U>,
{
    (0..buf.spec().channels.count())
        .map(|channel| {
            let samples = buf.chan(channel);
            let mut plane = BytesMut::with_capacity(samples.len() * std::mem::size_of::<U>());
            for &sample in samples {
                put(&mut plane, sample.into_sample());
            }
            plane.freeze()
        })
        .collect()
}
