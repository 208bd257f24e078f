//! Round-trip time derivation from sender reports and the report blocks echoing them.
//!
//! Every outgoing SR is remembered per SSRC together with the local time it was
//! sent. When a report block about that SSRC comes back, its LSR field names the
//! SR by the middle 32 bits of its NTP timestamp and its DLSR field says how long
//! the remote side held it:
//!
//! ```text
//! rtt = receive_time - sr_send_time - dlsr
//! ```

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::rtcp::ReportBlock;
use crate::types::Ssrc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SentSenderReport {
    ntp_middle_32: u32,
    local_time_us: i64,
}

/// Matches report blocks against previously seen sender reports.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    history_per_ssrc: usize,
    sender_reports: HashMap<Ssrc, VecDeque<SentSenderReport>>,
}

impl RttEstimator {
    /// Creates an estimator remembering up to `history_per_ssrc` SRs per source.
    pub fn new(history_per_ssrc: usize) -> Self {
        Self {
            history_per_ssrc: history_per_ssrc.max(1),
            sender_reports: HashMap::new(),
        }
    }

    /// Records an SR sent by `ssrc` with `ntp_timestamp` at `local_time_us`.
    pub fn on_sender_report(&mut self, ssrc: Ssrc, ntp_timestamp: u64, local_time_us: i64) {
        let history = self.sender_reports.entry(ssrc).or_default();
        if history.len() == self.history_per_ssrc {
            history.pop_front();
        }
        history.push_back(SentSenderReport {
            ntp_middle_32: (ntp_timestamp >> 16) as u32,
            local_time_us,
        });
    }

    /// Computes the RTT in microseconds for a block received at `receive_time_us`.
    ///
    /// Returns `None` when the block has no DLSR or echoes an SR that was never
    /// recorded (e.g. a retransmission SSRC that does not send SRs).
    pub fn on_report_block(&self, block: &ReportBlock, receive_time_us: i64) -> Option<i64> {
        if block.delay_since_last_sr == 0 {
            return None;
        }
        let Some(sent) = self
            .sender_reports
            .get(&block.ssrc)
            .and_then(|history| history.iter().rev().find(|sr| sr.ntp_middle_32 == block.last_sr))
        else {
            debug!(
                ssrc = %block.ssrc,
                last_sr = block.last_sr,
                "No sender report matches report block"
            );
            return None;
        };
        Some(receive_time_us - sent.local_time_us - block.delay_since_last_sr_us())
    }

    /// Number of SSRCs with at least one remembered SR.
    pub fn tracked_ssrcs(&self) -> usize {
        self.sender_reports.len()
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_RTT_HISTORY_PER_SSRC)
    }
}
