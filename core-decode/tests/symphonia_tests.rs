//! Symphonia backend tests on WAV streams generated in memory.

#![cfg(feature = "symphonia-backend")]

use bytes::Bytes;
use core_decode::{
    BufferConsumer, ConsumerOutcome, DecodeBackend, DecodeConfig, DecodeError, DecodeSession,
    DecodeState, DecoderError, DecoderInitializationError, PacketReadError, PlaybackScheduler,
    Result, ResultCode, SampleConverter, SampleFormat, ScheduledBuffer, SymphoniaBackend,
    TrackFailure,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::{
    AsAudioBufferRef, AudioBuffer, AudioBufferRef, Channels, Signal, SignalSpec,
};
use symphonia::core::codecs::{
    decl_codec_type, CodecDescriptor, CodecParameters, CodecRegistry, CodecType, Decoder,
    DecoderOptions, FinalizeResult,
};
use symphonia::core::errors::{
    decode_error, unsupported_error, Error as SymphoniaError, Result as SymphoniaResult,
    SeekErrorKind,
};
use symphonia::core::formats::{
    Cue, FormatOptions, FormatReader, Packet, SeekMode, SeekTo, SeekedTo, Track,
};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{Metadata, MetadataLog};
use tokio_util::sync::CancellationToken;

/// RIFF/WAVE container around interleaved little-endian samples.
fn wav(format_tag: u16, channels: u16, sample_rate: u32, bits: u16, data: &[u8]) -> Bytes {
    let block_align = channels * bits / 8;
    let byte_rate = sample_rate * block_align as u32;

    let mut out = Vec::with_capacity(44 + data.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&format_tag.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    Bytes::from(out)
}

/// Stereo 16-bit PCM; the right channel mirrors the left.
fn stereo_s16_wav(sample_rate: u32, frames: usize) -> Bytes {
    let mut data = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let left = ((i % 200) as i16 - 100) * 100;
        data.extend_from_slice(&left.to_le_bytes());
        data.extend_from_slice(&(-left).to_le_bytes());
    }
    wav(1, 2, sample_rate, 16, &data)
}

fn mono_f32_wav(sample_rate: u32, frames: usize) -> Bytes {
    let mut data = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let sample = (i % 100) as f32 / 100.0;
        data.extend_from_slice(&sample.to_le_bytes());
    }
    wav(3, 1, sample_rate, 32, &data)
}

fn decode_all(backend: &mut SymphoniaBackend) -> i64 {
    let mut samples = 0i64;
    loop {
        match backend.decode_next() {
            Ok(frames) => samples += frames.iter().map(|f| f.sample_count() as i64).sum::<i64>(),
            Err(e) if e.is_eof() => return samples,
            Err(e) => panic!("unexpected decode error: {e}"),
        }
    }
}

#[test]
fn test_s16_wav_decodes_to_planar_s16() {
    let mut backend =
        SymphoniaBackend::from_bytes(stereo_s16_wav(44100, 4410), Some("wav"), &DecodeConfig::default())
            .unwrap();

    let format = backend.audio_format();
    assert_eq!(format.sample_rate(), 44100);
    assert_eq!(format.channel_count(), 2);
    assert_eq!(format.sample_format(), SampleFormat::S16P);
    assert!(format.needs_format_conversion());
    assert_eq!(backend.duration(), Some(Duration::from_millis(100)));

    let first = backend.decode_next().unwrap();
    let frame = &first[0];
    assert_eq!(frame.planes().len(), 2);
    assert_eq!(frame.planes()[0].len(), frame.sample_count() as usize * 2);

    let rest = decode_all(&mut backend);
    assert_eq!(frame.sample_count() as i64 + rest, 4410);
}

#[test]
fn test_f32_wav_needs_no_conversion() {
    let mut backend =
        SymphoniaBackend::from_bytes(mono_f32_wav(48000, 960), None, &DecodeConfig::default())
            .unwrap();

    let format = backend.audio_format();
    assert_eq!(format.sample_format(), SampleFormat::F32P);
    assert!(!format.needs_format_conversion());
    assert_eq!(decode_all(&mut backend), 960);
}

#[test]
fn test_converted_samples_match_source() {
    let mut backend =
        SymphoniaBackend::from_bytes(stereo_s16_wav(8000, 400), Some("wav"), &DecodeConfig::default())
            .unwrap();
    let format = backend.audio_format();

    let mut buffer = core_decode::FrameBuffer::new(format.clone(), 10_000);
    while let Ok(frames) = backend.decode_next() {
        for frame in frames {
            buffer.append_frame(frame).unwrap();
        }
    }

    let pcm = SampleConverter::new(&format).unwrap().convert(&buffer).unwrap();
    assert_eq!(pcm.frames(), 400);
    assert_eq!(pcm.channels[0][0], -10_000.0 / 32_768.0);
    assert_eq!(pcm.channels[1][0], 10_000.0 / 32_768.0);
    assert_eq!(pcm.channels[0][100], 0.0);
    assert_eq!(SampleConverter::validate_samples(&pcm.channels[0]), 0);
}

#[test]
fn test_closed_backend_reports_eof() {
    let mut backend =
        SymphoniaBackend::from_bytes(stereo_s16_wav(44100, 1000), Some("wav"), &DecodeConfig::default())
            .unwrap();
    backend.close();
    backend.close();

    let err = backend.decode_next().unwrap_err();
    assert_eq!(err, DecodeError::PacketRead(PacketReadError::EOF));
}

#[test]
fn test_seek() {
    let mut backend =
        SymphoniaBackend::from_bytes(stereo_s16_wav(1000, 2000), Some("wav"), &DecodeConfig::default())
            .unwrap();
    decode_all(&mut backend);

    backend.seek(Duration::from_millis(500)).unwrap();
    let remaining = decode_all(&mut backend);
    assert!(remaining > 0 && remaining <= 1500, "remaining = {remaining}");

    let err = backend.seek(Duration::from_secs(60)).unwrap_err();
    assert!(err.is_recoverable());
    assert!(!err.is_eof());
}

#[test]
fn test_open_file_from_disk() {
    let path = std::env::temp_dir().join(format!("core-decode-{}.wav", std::process::id()));
    std::fs::write(&path, stereo_s16_wav(22050, 2205)).unwrap();

    let mut backend = SymphoniaBackend::open(&path, &DecodeConfig::default()).unwrap();
    assert!(backend.source_name().ends_with(".wav"));
    assert_eq!(decode_all(&mut backend), 2205);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_unrecognized_data_fails_setup() {
    let err = SymphoniaBackend::from_bytes(
        Bytes::from_static(b"definitely not audio data"),
        Some("wav"),
        &DecodeConfig::default(),
    )
    .err()
    .unwrap();
    assert!(err.is_setup_failure());
}

/// Scheduler recording what it receives.
#[derive(Clone, Default)]
struct RecordingScheduler {
    buffers: Arc<Mutex<Vec<ScheduledBuffer>>>,
    ended: Arc<Mutex<bool>>,
}

impl PlaybackScheduler for RecordingScheduler {
    fn schedule(&mut self, buffer: ScheduledBuffer) -> Result<()> {
        self.buffers.lock().push(buffer);
        Ok(())
    }

    fn end_of_stream(&mut self) {
        *self.ended.lock() = true;
    }

    fn track_failed(&mut self, failure: TrackFailure) {
        panic!("unexpected failure: {failure}");
    }
}

#[tokio::test]
async fn test_wav_plays_through_pipeline() {
    let config = DecodeConfig {
        buffer_duration: Duration::from_millis(500),
        initial_buffer_duration: Duration::from_millis(100),
        queue_capacity: 2,
        max_consecutive_errors: 3,
    };
    let backend =
        SymphoniaBackend::from_bytes(stereo_s16_wav(44100, 88200), Some("wav"), &config).unwrap();
    let (mut session, receiver) = DecodeSession::spawn(backend, config).unwrap();

    let scheduler = RecordingScheduler::default();
    let summary = BufferConsumer::new(receiver, scheduler.clone())
        .run(CancellationToken::new())
        .await;

    assert_eq!(summary.outcome, ConsumerOutcome::EndOfStream);
    assert_eq!(summary.samples_scheduled, 88200);
    assert!(*scheduler.ended.lock());

    let buffers = scheduler.buffers.lock();
    assert!(!buffers.is_empty());
    for (i, buffer) in buffers.iter().enumerate() {
        assert_eq!(buffer.sequence, i as u64);
        assert_eq!(buffer.pcm.channel_count(), 2);
    }

    assert_eq!(session.join(), DecodeState::Completed);
}

// ============================================================================
// Scripted container and codec
// ============================================================================

const SCRIPTED_CODEC: CodecType = decl_codec_type(b"scrpt");

/// First byte of a packet the scripted codec refuses to decode.
const CORRUPT: u8 = 0xFF;

/// Format reader serving a single track from in-memory packets.
struct ScriptedReader {
    tracks: Vec<Track>,
    packets: VecDeque<Packet>,
    metadata: MetadataLog,
}

impl ScriptedReader {
    fn boxed(params: CodecParameters, packets: &[&[u8]]) -> Box<dyn FormatReader> {
        let packets = packets
            .iter()
            .enumerate()
            .map(|(i, data)| Packet::new_from_slice(0, i as u64, data.len() as u64, data))
            .collect();
        Box::new(Self {
            tracks: vec![Track::new(0, params)],
            packets,
            metadata: MetadataLog::default(),
        })
    }
}

impl FormatReader for ScriptedReader {
    fn try_new(_source: MediaSourceStream, _options: &FormatOptions) -> SymphoniaResult<Self> {
        unsupported_error("scripted reader is built in memory")
    }

    fn cues(&self) -> &[Cue] {
        &[]
    }

    fn metadata(&mut self) -> Metadata<'_> {
        self.metadata.metadata()
    }

    fn seek(&mut self, _mode: SeekMode, _to: SeekTo) -> SymphoniaResult<SeekedTo> {
        Err(SymphoniaError::SeekError(SeekErrorKind::Unseekable))
    }

    fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn next_packet(&mut self) -> SymphoniaResult<Packet> {
        self.packets
            .pop_front()
            .ok_or_else(|| SymphoniaError::IoError(std::io::ErrorKind::UnexpectedEof.into()))
    }

    fn into_inner(self: Box<Self>) -> MediaSourceStream {
        MediaSourceStream::new(
            Box::new(std::io::Cursor::new(Vec::<u8>::new())),
            Default::default(),
        )
    }
}

/// Mono f32 codec: one sample per packet byte, packets starting with
/// [`CORRUPT`] fail to decode.
struct ScriptedDecoder {
    params: CodecParameters,
    buf: AudioBuffer<f32>,
}

impl Decoder for ScriptedDecoder {
    fn try_new(params: &CodecParameters, _options: &DecoderOptions) -> SymphoniaResult<Self> {
        let spec = SignalSpec::new(params.sample_rate.unwrap_or(1000), Channels::FRONT_LEFT);
        Ok(Self {
            params: params.clone(),
            buf: AudioBuffer::new(1024, spec),
        })
    }

    fn supported_codecs() -> &'static [CodecDescriptor] {
        &[symphonia::core::support_codec!(
            SCRIPTED_CODEC,
            "scripted",
            "Scripted test codec"
        )]
    }

    fn reset(&mut self) {
        self.buf.clear();
    }

    fn codec_params(&self) -> &CodecParameters {
        &self.params
    }

    fn decode(&mut self, packet: &Packet) -> SymphoniaResult<AudioBufferRef<'_>> {
        let data = packet.buf();
        if data.first() == Some(&CORRUPT) {
            return decode_error("scripted: corrupt packet");
        }

        self.buf.clear();
        self.buf.render_reserved(Some(data.len()));
        for (out, &byte) in self.buf.chan_mut(0).iter_mut().zip(data) {
            *out = byte as f32 / 255.0;
        }
        Ok(self.buf.as_audio_buffer_ref())
    }

    fn finalize(&mut self) -> FinalizeResult {
        FinalizeResult::default()
    }

    fn last_decoded(&self) -> AudioBufferRef<'_> {
        self.buf.as_audio_buffer_ref()
    }
}

fn scripted_codecs() -> CodecRegistry {
    let mut codecs = CodecRegistry::new();
    codecs.register_all::<ScriptedDecoder>();
    codecs
}

/// Track parameters with a sample rate and a declared mono layout.
fn scripted_params() -> CodecParameters {
    let mut params = CodecParameters::new();
    params
        .for_codec(SCRIPTED_CODEC)
        .with_sample_rate(1000)
        .with_channels(Channels::FRONT_LEFT);
    params
}

fn tolerant(max_consecutive_errors: usize) -> DecodeConfig {
    DecodeConfig {
        max_consecutive_errors,
        ..DecodeConfig::default()
    }
}

#[test]
fn test_corrupt_packets_are_skipped() {
    let reader = ScriptedReader::boxed(
        scripted_params(),
        &[&[10, 20], &[CORRUPT, 1], &[CORRUPT], &[30, 40, 50]],
    );
    let mut backend =
        SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(3))
            .unwrap();

    let format = backend.audio_format();
    assert_eq!(format.sample_rate(), 1000);
    assert_eq!(format.channel_count(), 1);
    assert_eq!(format.sample_format(), SampleFormat::F32P);

    assert_eq!(decode_all(&mut backend), 5);
}

#[test]
fn test_too_many_corrupt_packets_fail_decoding() {
    let reader = ScriptedReader::boxed(
        scripted_params(),
        &[&[10, 20], &[CORRUPT], &[CORRUPT], &[CORRUPT], &[30]],
    );
    let mut backend =
        SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(3))
            .unwrap();

    assert_eq!(backend.decode_next().unwrap()[0].sample_count(), 2);

    let err = backend.decode_next().unwrap_err();
    assert_eq!(
        err,
        DecodeError::Decoder(DecoderError::new(ResultCode::INVALID_DATA))
    );
    assert!(!err.is_eof());
    assert!(!err.is_setup_failure());
}

#[test]
fn test_corrupt_stream_start_fails_setup() {
    let reader = ScriptedReader::boxed(scripted_params(), &[&[CORRUPT], &[CORRUPT], &[1]]);
    let err = SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(2))
        .err()
        .unwrap();

    assert_eq!(
        err,
        DecodeError::DecoderInitialization(DecoderInitializationError::new(
            ResultCode::INVALID_DATA
        ))
    );
}

#[test]
fn test_missing_sample_rate_fails_decoder_setup() {
    let mut params = CodecParameters::new();
    params
        .for_codec(SCRIPTED_CODEC)
        .with_channels(Channels::FRONT_LEFT);
    let reader = ScriptedReader::boxed(params, &[&[1, 2, 3]]);

    let err = SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(3))
        .err()
        .unwrap();

    assert!(err.is_setup_failure());
    assert_eq!(
        err,
        DecodeError::DecoderInitialization(DecoderInitializationError::new(
            ResultCode::INVALID_DATA
        ))
    );
}

#[test]
fn test_channels_learned_from_first_packet() {
    let mut params = CodecParameters::new();
    params.for_codec(SCRIPTED_CODEC).with_sample_rate(8000);
    let reader = ScriptedReader::boxed(params, &[&[1, 2, 3]]);

    let backend =
        SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(3))
            .unwrap();
    assert_eq!(backend.audio_format().channel_count(), 1);
    assert_eq!(backend.audio_format().sample_rate(), 8000);
}

#[test]
fn test_missing_channels_without_packets_fails_decoder_setup() {
    let mut params = CodecParameters::new();
    params.for_codec(SCRIPTED_CODEC).with_sample_rate(8000);
    let reader = ScriptedReader::boxed(params, &[]);

    let err = SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(3))
        .err()
        .unwrap();
    assert_eq!(err.code(), Some(ResultCode::INVALID_DATA));
    assert!(matches!(err, DecodeError::DecoderInitialization(_)));
}

#[test]
fn test_declared_track_without_packets_opens_empty() {
    let reader = ScriptedReader::boxed(scripted_params(), &[]);
    let mut backend =
        SymphoniaBackend::from_reader(reader, &scripted_codecs(), "scripted", &tolerant(3))
            .unwrap();

    assert_eq!(backend.audio_format().channel_count(), 1);
    assert!(backend.decode_next().unwrap().is_empty());
    assert!(backend.decode_next().unwrap_err().is_eof());
}

#[test]
fn test_unregistered_codec_fails_codec_setup() {
    let reader = ScriptedReader::boxed(scripted_params(), &[&[1]]);
    let err = SymphoniaBackend::from_reader(reader, &CodecRegistry::new(), "scripted", &tolerant(3))
        .err()
        .unwrap();
    assert!(matches!(err, DecodeError::CodecInitialization { .. }));
}
