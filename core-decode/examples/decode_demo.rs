//! # Decode Pipeline Example
//!
//! Decodes an audio file on the producer thread and prints every buffer the
//! consumer schedules.
//!
//! Run with:
//! ```bash
//! cargo run --example decode_demo -p core-decode -- /path/to/song.flac
//!
//! # JSON logs
//! cargo run --example decode_demo -p core-decode -- /path/to/song.flac json
//! ```

use core_decode::{
    BufferConsumer, DecodeBackend, DecodeConfig, DecodeSession, PlaybackScheduler, Result,
    ScheduledBuffer, SymphoniaBackend, TrackFailure,
};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LogLevel, LoggingConfig};
use std::env;
use tracing::{error, info};

/// Prints what would be queued on the audio engine.
struct PrintingScheduler;

impl PlaybackScheduler for PrintingScheduler {
    fn schedule(&mut self, buffer: ScheduledBuffer) -> Result<()> {
        let peak = buffer
            .pcm
            .channels
            .iter()
            .flatten()
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        println!(
            "buffer #{:<3} {:>7} samples  {:>6.2}s  peak {:.3}{}",
            buffer.sequence,
            buffer.sample_count,
            buffer.pcm.duration().as_secs_f64(),
            peak,
            if buffer.terminal { "  (terminal)" } else { "" }
        );
        Ok(())
    }

    fn end_of_stream(&mut self) {
        println!("end of stream");
    }

    fn track_failed(&mut self, failure: TrackFailure) {
        println!("{failure}");
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: decode_demo <audio file> [pretty|json|compact]");
        std::process::exit(2);
    };

    let format = match args.get(2).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    if let Err(e) = init_logging(
        LoggingConfig::default()
            .with_format(format)
            .with_level(LogLevel::Debug),
    ) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config = DecodeConfig::default();
    let backend = match SymphoniaBackend::open(path, &config) {
        Ok(backend) => backend,
        Err(e) => {
            error!(file = strip_path(path), "Cannot open: {}", e);
            std::process::exit(1);
        }
    };
    info!(file = strip_path(path), format = ?backend.audio_format(), "Opened");

    let (mut session, receiver) = match DecodeSession::spawn(backend, config) {
        Ok(session) => session,
        Err(e) => {
            error!("Cannot start decoding: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = session.cancellation_token();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let summary = BufferConsumer::new(receiver, PrintingScheduler)
        .run(cancel)
        .await;
    let state = tokio::task::spawn_blocking(move || session.join())
        .await
        .ok();

    info!(?summary, ?state, "Done");
}
