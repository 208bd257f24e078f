//! `rtclog`: decoding and analysis of WebRTC event logs.
//!
//! The crate turns event-log records into typed telemetry:
//!
//! - **Column codecs**: [`BitCursor`], varints, delta-encoded numeric series and
//!   length-prefixed blob series, as used by batched log records.
//! - **RTCP**: a compound-packet walk with filter dispatch, plus typed decoders
//!   for sender/receiver reports, PLI, REMB and transport-wide congestion control
//!   feedback. [`RttEstimator`] pairs sender reports with report blocks.
//! - **RTP**: fixed header parsing and one-byte header extension walking.
//! - **Capture**: [`PcapWriter`] wraps logged packets in synthetic
//!   Ethernet/IPv4/UDP framing so they can be inspected with packet analysers.
//! - **Analysis**: [`TelemetryAnalyzer`] consumes [`TelemetryEvent`]s and
//!   produces a serialisable [`TelemetryReport`] alongside the capture file.
//!
//! ## Quick Start
//!
//! ```rust
//! use rtclog::{AnalyzerConfig, LogRecord, TelemetryAnalyzer};
//!
//! fn main() -> Result<(), rtclog::RtcLogError> {
//!     let line = r#"{"format":"legacy","record":{"timestamp_us":1000,"event":{"type":"alr_state","in_alr":true}}}"#;
//!     let mut analyzer = TelemetryAnalyzer::new(AnalyzerConfig::default());
//!     for event in LogRecord::from_json_line(line)?.expand()? {
//!         analyzer.process(&event);
//!     }
//!     let (report, capture) = analyzer.finish();
//!     assert_eq!(report.alr_states.len(), 1);
//!     assert_eq!(capture.len(), 24);
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod bitstream;
pub mod config;
pub mod constants;
pub mod encodings;
pub mod error;
pub mod event_log;
pub mod pcap;
pub mod rtcp;
pub mod rtp;
pub mod rtt;
pub mod types;

pub use analyzer::{TelemetryAnalyzer, TelemetryReport};
pub use bitstream::{BitCursor, BitWriter};
pub use config::{AnalyzerConfig, start_time_from_file_name};
pub use error::{DecodeError, Field, ParseContext, RtcLogError};
pub use event_log::{EventKind, LogRecord, TelemetryEvent};
pub use pcap::{CaptureEndpoints, PcapWriter};
pub use rtt::RttEstimator;
pub use types::{Direction, RtpTimestamp, SequenceNumber, Ssrc};
