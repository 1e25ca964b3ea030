//! # Core Runtime Module
//!
//! Provides the runtime infrastructure shared by the audio core crates:
//! - Logging and tracing infrastructure
//! - Host log forwarding through [`logging::LoggerSink`]
//!
//! ## Overview
//!
//! The decode core only emits `tracing` events. This crate owns the subscriber
//! setup so the host application decides once, at startup, how those events are
//! formatted, filtered and mirrored into the platform logger.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
