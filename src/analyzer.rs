//! Record dispatch loop.
//!
//! [`TelemetryAnalyzer`] consumes expanded [`TelemetryEvent`]s in log order,
//! mirrors every RTP/RTCP packet into the capture file and collects the series
//! that make up a [`TelemetryReport`]:
//!
//! - per-SSRC payload bitrate
//! - PLI, REMB and transport-wide feedback per direction
//! - report-block loss and RTT per reported SSRC
//! - estimator updates, probes and ALR state

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::AnalyzerConfig;
use crate::constants::{
    RTCP_FMT_ALFB, RTCP_FMT_PLI, RTCP_FMT_TRANSPORT_CC, RTCP_PT_PSFB, RTCP_PT_RR, RTCP_PT_RTPFB,
    RTCP_PT_SR, RTP_FIXED_HEADER_LENGTH_BYTES,
};
use crate::error::DecodeError;
use crate::event_log::{DetectorState, EventKind, ProbeOutcome, TelemetryEvent};
use crate::pcap::PcapWriter;
use crate::rtcp::{
    PictureLossIndication, ReceiverReport, Remb, ReportBlock, RtcpFilter, SenderReport,
    TransportFeedback, for_each_packet,
};
use crate::rtp::{ExtensionFilter, for_each_extension};
use crate::rtt::RttEstimator;
use crate::types::{Direction, Ssrc};

/// A `(time, value)` sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time_ms: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitrateSeries {
    pub direction: Direction,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PliPoint {
    pub time_ms: f64,
    pub direction: Direction,
    pub sender_ssrc: Ssrc,
    pub media_ssrc: Ssrc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RembPoint {
    pub time_ms: f64,
    pub direction: Direction,
    pub sender_ssrc: Ssrc,
    pub bitrate_bps: u64,
    pub ssrcs: Vec<Ssrc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossPoint {
    pub time_ms: f64,
    pub direction: Direction,
    /// Percentage, rounded down.
    pub fraction_lost: u8,
    pub cumulative_lost: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportFeedbackSummary {
    pub time_ms: f64,
    pub direction: Direction,
    pub media_ssrc: Ssrc,
    pub base_sequence_number: u16,
    pub packet_status_count: u16,
    pub received: usize,
    pub feedback_packet_index: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossBasedPoint {
    pub time_ms: f64,
    pub bitrate_bps: u32,
    pub fraction_loss: u8,
    pub total_packets: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayBasedPoint {
    pub time_ms: f64,
    pub bitrate_bps: u32,
    pub detector_state: DetectorState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeClusterPoint {
    pub time_ms: f64,
    pub id: u32,
    pub bitrate_bps: u32,
    pub min_packets: u32,
    pub min_bytes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResultPoint {
    pub time_ms: f64,
    pub id: u32,
    pub result: ProbeOutcome,
    pub bitrate_bps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlrPoint {
    pub time_ms: f64,
    pub in_alr: bool,
}

/// Event and failure counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub events: u64,
    pub rtp_packets: u64,
    pub rtcp_packets: u64,
    /// Compound RTCP buffers whose walk stopped at a malformed packet.
    pub rtcp_walk_failures: u64,
    /// RTCP packets a typed decoder rejected.
    pub rtcp_decode_failures: u64,
    pub rtp_extension_failures: u64,
    pub capture_records: usize,
}

/// Everything collected over one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryReport {
    pub summary: Summary,
    pub bitrate: BTreeMap<Ssrc, BitrateSeries>,
    pub picture_loss_indications: Vec<PliPoint>,
    pub remb: Vec<RembPoint>,
    pub report_block_loss: BTreeMap<Ssrc, Vec<LossPoint>>,
    /// Round-trip time in milliseconds per remote-reported SSRC.
    pub rtt: BTreeMap<Ssrc, Vec<SeriesPoint>>,
    pub transport_feedback: Vec<TransportFeedbackSummary>,
    /// Occurrences of each one-byte header extension id.
    pub header_extensions: BTreeMap<Direction, BTreeMap<u8, u64>>,
    pub loss_based_updates: Vec<LossBasedPoint>,
    pub delay_based_updates: Vec<DelayBasedPoint>,
    pub probe_clusters: Vec<ProbeClusterPoint>,
    pub probe_results: Vec<ProbeResultPoint>,
    pub alr_states: Vec<AlrPoint>,
}

#[derive(Debug, Clone, Copy)]
struct ByteCounter {
    bytes: u64,
    window_start_ms: f64,
}

/// Event timestamp expressed on the report and capture time axes.
#[derive(Debug, Clone, Copy)]
struct EventTime {
    /// Log-clock microseconds, used for RTT arithmetic.
    log_us: i64,
    relative_ms: f64,
    absolute_ms: f64,
    capture_us: u64,
}

/// Consumes events and builds the report and the capture file.
#[derive(Debug)]
pub struct TelemetryAnalyzer {
    config: AnalyzerConfig,
    pcap: PcapWriter,
    rtt: RttEstimator,
    first_timestamp_us: Option<i64>,
    byte_counters: HashMap<Ssrc, ByteCounter>,
    report: TelemetryReport,
}

impl TelemetryAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            pcap: PcapWriter::with_endpoints(config.endpoints),
            rtt: RttEstimator::new(config.rtt_history_per_ssrc),
            config,
            first_timestamp_us: None,
            byte_counters: HashMap::new(),
            report: TelemetryReport::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Report collected so far.
    pub fn report(&self) -> &TelemetryReport {
        &self.report
    }

    fn event_time(&mut self, timestamp_us: i64) -> EventTime {
        let first = *self.first_timestamp_us.get_or_insert(timestamp_us);
        let elapsed_us = timestamp_us.saturating_sub(first);
        let relative_ms = elapsed_us as f64 / 1000.0;
        let start_us = self.config.absolute_start_time_us;
        EventTime {
            log_us: timestamp_us,
            relative_ms,
            absolute_ms: start_us as f64 / 1000.0 + relative_ms,
            capture_us: start_us.saturating_add(elapsed_us).max(0) as u64,
        }
    }

    /// Processes one event.
    pub fn process(&mut self, event: &TelemetryEvent) {
        let time = self.event_time(event.timestamp_us);
        self.report.summary.events += 1;

        match &event.kind {
            EventKind::RtpPacket {
                direction,
                header,
                header_length,
                packet_length,
            } => self.process_rtp(time, *direction, header, *header_length, *packet_length),
            EventKind::RtcpPacket { direction, data } => self.process_rtcp(time, *direction, data),
            EventKind::LossBasedBweUpdate {
                bitrate_bps,
                fraction_loss,
                total_packets,
            } => self.report.loss_based_updates.push(LossBasedPoint {
                time_ms: time.absolute_ms,
                bitrate_bps: *bitrate_bps,
                fraction_loss: *fraction_loss,
                total_packets: *total_packets,
            }),
            EventKind::DelayBasedBweUpdate {
                bitrate_bps,
                detector_state,
            } => self.report.delay_based_updates.push(DelayBasedPoint {
                time_ms: time.absolute_ms,
                bitrate_bps: *bitrate_bps,
                detector_state: *detector_state,
            }),
            EventKind::ProbeCluster {
                id,
                bitrate_bps,
                min_packets,
                min_bytes,
            } => self.report.probe_clusters.push(ProbeClusterPoint {
                time_ms: time.absolute_ms,
                id: *id,
                bitrate_bps: *bitrate_bps,
                min_packets: *min_packets,
                min_bytes: *min_bytes,
            }),
            EventKind::ProbeResult {
                id,
                result,
                bitrate_bps,
            } => self.report.probe_results.push(ProbeResultPoint {
                time_ms: time.absolute_ms,
                id: *id,
                result: *result,
                bitrate_bps: *bitrate_bps,
            }),
            EventKind::AlrState { in_alr } => self.report.alr_states.push(AlrPoint {
                time_ms: time.absolute_ms,
                in_alr: *in_alr,
            }),
            EventKind::AudioPlayout { .. } => {}
        }
    }

    /// Processes events in order.
    pub fn process_all<'e>(&mut self, events: impl IntoIterator<Item = &'e TelemetryEvent>) {
        for event in events {
            self.process(event);
        }
    }

    fn process_rtp(
        &mut self,
        time: EventTime,
        direction: Direction,
        header: &[u8],
        header_length: usize,
        packet_length: usize,
    ) {
        self.report.summary.rtp_packets += 1;
        self.pcap.write(header, direction, packet_length, time.capture_us);

        if header.len() < RTP_FIXED_HEADER_LENGTH_BYTES {
            debug!(length = header.len(), "RTP header too short for SSRC");
            return;
        }
        let ssrc = Ssrc::new(u32::from_be_bytes([header[8], header[9], header[10], header[11]]));

        let counter = self.byte_counters.entry(ssrc).or_insert_with(|| {
            self.report.bitrate.insert(
                ssrc,
                BitrateSeries {
                    direction,
                    points: vec![SeriesPoint {
                        time_ms: time.absolute_ms,
                        value: 0.0,
                    }],
                },
            );
            ByteCounter {
                bytes: 0,
                window_start_ms: time.relative_ms,
            }
        });
        counter.bytes += packet_length.saturating_sub(header_length) as u64;
        let elapsed_ms = time.relative_ms - counter.window_start_ms;
        if elapsed_ms > self.config.bitrate_window_ms as f64 {
            if let Some(series) = self.report.bitrate.get_mut(&ssrc) {
                series.points.push(SeriesPoint {
                    time_ms: time.absolute_ms,
                    value: 8000.0 * counter.bytes as f64 / elapsed_ms,
                });
            }
            *counter = ByteCounter {
                bytes: 0,
                window_start_ms: time.relative_ms,
            };
        }

        if header[0] & 0x10 != 0 {
            let counts = self.report.header_extensions.entry(direction).or_default();
            let mut filters = [ExtensionFilter::any(|id, _| {
                *counts.entry(id).or_default() += 1;
            })];
            if let Err(err) = for_each_extension(header, &mut filters) {
                debug!(%ssrc, error = %err, "Header extension walk failed");
                self.report.summary.rtp_extension_failures += 1;
            }
        }
    }

    fn process_rtcp(&mut self, time: EventTime, direction: Direction, data: &[u8]) {
        self.report.summary.rtcp_packets += 1;
        self.pcap.write(data, direction, data.len(), time.capture_us);

        let mut plis = Vec::new();
        let mut rembs = Vec::new();
        let mut sender_reports = Vec::new();
        let mut receiver_reports = Vec::new();
        let mut feedback = Vec::new();
        let walk = {
            let mut filters = [
                RtcpFilter::new(|_, packet| plis.push(PictureLossIndication::parse(packet)))
                    .payload_type(RTCP_PT_PSFB)
                    .feedback_message_type(RTCP_FMT_PLI),
                RtcpFilter::new(|_, packet| rembs.push(Remb::parse(packet)))
                    .payload_type(RTCP_PT_PSFB)
                    .feedback_message_type(RTCP_FMT_ALFB),
                RtcpFilter::new(|_, packet| sender_reports.push(SenderReport::parse(packet)))
                    .payload_type(RTCP_PT_SR),
                RtcpFilter::new(|_, packet| receiver_reports.push(ReceiverReport::parse(packet)))
                    .payload_type(RTCP_PT_RR),
                RtcpFilter::new(|_, packet| feedback.push(TransportFeedback::parse(packet)))
                    .payload_type(RTCP_PT_RTPFB)
                    .feedback_message_type(RTCP_FMT_TRANSPORT_CC),
            ];
            for_each_packet(data, &mut filters)
        };
        if let Err(err) = walk {
            debug!(%direction, error = %err, "RTCP compound walk stopped early");
            self.report.summary.rtcp_walk_failures += 1;
        }

        for pli in self.accept_all(plis) {
            self.report.picture_loss_indications.push(PliPoint {
                time_ms: time.absolute_ms,
                direction,
                sender_ssrc: pli.sender_ssrc,
                media_ssrc: pli.media_ssrc,
            });
        }

        for remb in self.accept_all(rembs).into_iter().flatten() {
            self.report.remb.push(RembPoint {
                time_ms: time.absolute_ms,
                direction,
                sender_ssrc: remb.sender_ssrc,
                bitrate_bps: remb.bitrate_bps,
                ssrcs: remb.ssrcs,
            });
        }

        for sr in self.accept_all(sender_reports) {
            if direction == Direction::Outbound {
                self.rtt.on_sender_report(sr.ssrc, sr.sender_info.ntp_timestamp, time.log_us);
            }
            self.process_report_blocks(time, direction, &sr.report_blocks);
        }

        for rr in self.accept_all(receiver_reports) {
            self.process_report_blocks(time, direction, &rr.report_blocks);
        }

        for fb in self.accept_all(feedback) {
            self.report.transport_feedback.push(TransportFeedbackSummary {
                time_ms: time.absolute_ms,
                direction,
                media_ssrc: fb.media_ssrc,
                base_sequence_number: fb.base_sequence_number.value(),
                packet_status_count: fb.packet_status_count,
                received: fb.received_count(),
                feedback_packet_index: fb.feedback_packet_index,
            });
        }
    }

    /// Keeps successful typed decodes, counting and logging failures.
    fn accept_all<T>(&mut self, results: Vec<Result<T, DecodeError>>) -> Vec<T> {
        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(error = %err, "Discarding malformed RTCP packet");
                    self.report.summary.rtcp_decode_failures += 1;
                    None
                }
            })
            .collect()
    }

    fn process_report_blocks(
        &mut self,
        time: EventTime,
        direction: Direction,
        blocks: &[ReportBlock],
    ) {
        for block in blocks {
            self.report
                .report_block_loss
                .entry(block.ssrc)
                .or_default()
                .push(LossPoint {
                    time_ms: time.absolute_ms,
                    direction,
                    fraction_lost: block.fraction_lost,
                    cumulative_lost: block.cumulative_lost,
                });

            if direction == Direction::Inbound {
                if let Some(rtt_us) = self.rtt.on_report_block(block, time.log_us) {
                    self.report.rtt.entry(block.ssrc).or_default().push(SeriesPoint {
                        time_ms: time.absolute_ms,
                        value: rtt_us as f64 / 1000.0,
                    });
                }
            }
        }
    }

    /// Finishes the run, returning the report and the capture file.
    pub fn finish(mut self) -> (TelemetryReport, Bytes) {
        self.report.summary.capture_records = self.pcap.record_count();
        (self.report, self.pcap.save())
    }
}
