//! Analyzer configuration.

use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BITRATE_WINDOW_MS, DEFAULT_RTT_HISTORY_PER_SSRC};
use crate::pcap::CaptureEndpoints;

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Wall-clock time of the first logged event, microseconds since the Unix epoch.
    /// Zero keeps timestamps relative to the start of the log.
    pub absolute_start_time_us: i64,
    /// Minimum span over which a per-SSRC bitrate sample is averaged.
    pub bitrate_window_ms: i64,
    /// Sender reports remembered per SSRC for RTT matching.
    pub rtt_history_per_ssrc: usize,
    /// Addresses used for the synthetic capture framing.
    pub endpoints: CaptureEndpoints,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            absolute_start_time_us: 0,
            bitrate_window_ms: DEFAULT_BITRATE_WINDOW_MS,
            rtt_history_per_ssrc: DEFAULT_RTT_HISTORY_PER_SSRC,
            endpoints: CaptureEndpoints::default(),
        }
    }
}

/// `<prefix>_YYYYMMDD_HHMM_<seconds>_<suffix>.log`; the greedy prefix makes the
/// last stamp in the name win.
static FILE_NAME_STAMP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^.*_([0-9]{4})([0-9]{2})([0-9]{2})_([0-9]{2})([0-9]{2})_([0-9]+)_.*\.log$").ok()
});

/// Derives the capture start time from a WebRTC-internals log file name.
///
/// Recognises `<prefix>_YYYYMMDD_HHMM_<seconds>_<suffix>.log`, interpreted as
/// UTC, and returns microseconds since the Unix epoch. When several stamps
/// appear, the last one wins.
pub fn start_time_from_file_name(file_name: &str) -> Option<i64> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let captures = FILE_NAME_STAMP.as_ref()?.captures(name)?;
    let field = |index: usize| captures.get(index).map(|m| m.as_str());

    let year = field(1)?.parse().ok()?;
    let month = field(2)?.parse().ok()?;
    let day = field(3)?.parse().ok()?;
    let hour = field(4)?.parse().ok()?;
    let minute = field(5)?.parse().ok()?;
    let seconds: i64 = field(6)?.parse().ok()?;

    let start = NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, 0)?
        .checked_add_signed(Duration::try_seconds(seconds)?)?;
    Some(start.and_utc().timestamp_micros())
}
