//! Event-log record model.
//!
//! The log container decoder hands over one JSON object per line. Two record
//! families exist:
//!
//! - **legacy**: one event per record, microsecond timestamps, raw packet bytes
//! - **batched**: a first event stored in plain fields plus `number_of_deltas`
//!   further events stored as delta columns (`<field>_deltas`, base64) or, for
//!   raw RTCP, as a blob column; millisecond timestamps
//!
//! Both expand to the same [`TelemetryEvent`] stream consumed by the analyzer.

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;

use crate::constants::{MAX_UNENCODED_BATCH_DELTAS, RTP_FIXED_HEADER_LENGTH_BYTES, RTP_VERSION};
use crate::encodings::{decode_blobs, decode_deltas};
use crate::error::{DecodeError, RtcLogError};
use crate::types::{Direction, SequenceNumber, Ssrc};

/// State reported by the delay-based estimator's overuse detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    Unknown,
    Normal,
    Underusing,
    Overusing,
}

impl DetectorState {
    /// Maps the numeric code used in batched columns.
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Normal,
            2 => Self::Underusing,
            3 => Self::Overusing,
            _ => Self::Unknown,
        }
    }
}

/// Outcome of a bandwidth probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Success,
    InvalidSendReceiveInterval,
    InvalidSendReceiveRatio,
    Timeout,
}

/// A reconstructed event with an absolute log timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryEvent {
    pub timestamp_us: i64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    RtpPacket {
        direction: Direction,
        /// Logged header bytes; the payload itself is never logged.
        header: Vec<u8>,
        header_length: usize,
        packet_length: usize,
    },
    RtcpPacket {
        direction: Direction,
        data: Vec<u8>,
    },
    LossBasedBweUpdate {
        bitrate_bps: u32,
        fraction_loss: u8,
        total_packets: u32,
    },
    DelayBasedBweUpdate {
        bitrate_bps: u32,
        detector_state: DetectorState,
    },
    ProbeCluster {
        id: u32,
        bitrate_bps: u32,
        min_packets: u32,
        min_bytes: u32,
    },
    ProbeResult {
        id: u32,
        result: ProbeOutcome,
        bitrate_bps: Option<u32>,
    },
    AlrState {
        in_alr: bool,
    },
    AudioPlayout {
        local_ssrc: Ssrc,
    },
}

/// One line of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "record", rename_all = "snake_case")]
pub enum LogRecord {
    Legacy(LegacyEvent),
    Batched(BatchedRecord),
}

impl LogRecord {
    /// Parses one JSON line.
    pub fn from_json_line(line: &str) -> Result<Self, RtcLogError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Expands the record into events in log order.
    pub fn expand(&self) -> Result<Vec<TelemetryEvent>, RtcLogError> {
        match self {
            Self::Legacy(event) => Ok(event.expand()),
            Self::Batched(batch) => batch.expand(),
        }
    }
}

/// A legacy single-event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyEvent {
    pub timestamp_us: i64,
    pub event: LegacyEventKind,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LegacyEventKind {
    RtpPacket {
        incoming: bool,
        #[serde_as(as = "Base64")]
        header: Vec<u8>,
        packet_length: u32,
    },
    RtcpPacket {
        incoming: bool,
        #[serde_as(as = "Base64")]
        packet_data: Vec<u8>,
    },
    LossBasedBweUpdate {
        bitrate_bps: u32,
        fraction_loss: u8,
        total_packets: u32,
    },
    DelayBasedBweUpdate {
        bitrate_bps: u32,
        detector_state: DetectorState,
    },
    ProbeCluster {
        id: u32,
        bitrate_bps: u32,
        min_packets: u32,
        min_bytes: u32,
    },
    ProbeResult {
        id: u32,
        result: ProbeOutcome,
        #[serde(default)]
        bitrate_bps: Option<u32>,
    },
    AlrState {
        in_alr: bool,
    },
    AudioPlayout {
        local_ssrc: u32,
    },
    #[serde(other)]
    Unknown,
}

impl LegacyEvent {
    fn expand(&self) -> Vec<TelemetryEvent> {
        let kind = match &self.event {
            LegacyEventKind::RtpPacket {
                incoming,
                header,
                packet_length,
            } => EventKind::RtpPacket {
                direction: Direction::from_incoming(*incoming),
                header: header.clone(),
                header_length: header.len(),
                packet_length: *packet_length as usize,
            },
            LegacyEventKind::RtcpPacket {
                incoming,
                packet_data,
            } => EventKind::RtcpPacket {
                direction: Direction::from_incoming(*incoming),
                data: packet_data.clone(),
            },
            LegacyEventKind::LossBasedBweUpdate {
                bitrate_bps,
                fraction_loss,
                total_packets,
            } => EventKind::LossBasedBweUpdate {
                bitrate_bps: *bitrate_bps,
                fraction_loss: *fraction_loss,
                total_packets: *total_packets,
            },
            LegacyEventKind::DelayBasedBweUpdate {
                bitrate_bps,
                detector_state,
            } => EventKind::DelayBasedBweUpdate {
                bitrate_bps: *bitrate_bps,
                detector_state: *detector_state,
            },
            LegacyEventKind::ProbeCluster {
                id,
                bitrate_bps,
                min_packets,
                min_bytes,
            } => EventKind::ProbeCluster {
                id: *id,
                bitrate_bps: *bitrate_bps,
                min_packets: *min_packets,
                min_bytes: *min_bytes,
            },
            LegacyEventKind::ProbeResult {
                id,
                result,
                bitrate_bps,
            } => EventKind::ProbeResult {
                id: *id,
                result: *result,
                bitrate_bps: *bitrate_bps,
            },
            LegacyEventKind::AlrState { in_alr } => EventKind::AlrState { in_alr: *in_alr },
            LegacyEventKind::AudioPlayout { local_ssrc } => EventKind::AudioPlayout {
                local_ssrc: Ssrc::new(*local_ssrc),
            },
            LegacyEventKind::Unknown => return Vec::new(),
        };
        vec![TelemetryEvent {
            timestamp_us: self.timestamp_us,
            kind,
        }]
    }
}

/// A batched (delta-encoded) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchedRecord {
    RtpPackets(RtpPacketBatch),
    RtcpPackets(RtcpPacketBatch),
    LossBasedBweUpdates(LossBasedBweBatch),
    DelayBasedBweUpdates(DelayBasedBweBatch),
    ProbeCluster(ProbeClusterRecord),
    ProbeResult(ProbeResultRecord),
    AlrState(AlrStateRecord),
    #[serde(other)]
    Unknown,
}

impl BatchedRecord {
    fn expand(&self) -> Result<Vec<TelemetryEvent>, RtcLogError> {
        match self {
            Self::RtpPackets(batch) => batch.expand(),
            Self::RtcpPackets(batch) => batch.expand(),
            Self::LossBasedBweUpdates(batch) => batch.expand(),
            Self::DelayBasedBweUpdates(batch) => batch.expand(),
            Self::ProbeCluster(record) => Ok(vec![TelemetryEvent {
                timestamp_us: ms_to_us(record.timestamp_ms),
                kind: EventKind::ProbeCluster {
                    id: record.id,
                    bitrate_bps: record.bitrate_bps,
                    min_packets: record.min_packets,
                    min_bytes: record.min_bytes,
                },
            }]),
            Self::ProbeResult(record) => Ok(vec![TelemetryEvent {
                timestamp_us: ms_to_us(record.timestamp_ms),
                kind: EventKind::ProbeResult {
                    id: record.id,
                    result: record.result,
                    bitrate_bps: record.bitrate_bps,
                },
            }]),
            Self::AlrState(record) => Ok(vec![TelemetryEvent {
                timestamp_us: ms_to_us(record.timestamp_ms),
                kind: EventKind::AlrState {
                    in_alr: record.in_alr,
                },
            }]),
            Self::Unknown => Ok(Vec::new()),
        }
    }
}

#[inline]
fn ms_to_us(timestamp_ms: i64) -> i64 {
    timestamp_ms.saturating_mul(1000)
}

/// Rejects a `number_of_deltas` that none of the batch's columns could encode.
///
/// A column holds at least one bit per entry, so the longest column bounds the
/// count. Without any column the count is capped at
/// [`MAX_UNENCODED_BATCH_DELTAS`].
fn check_batch_size(number_of_deltas: usize, columns: &[Option<&[u8]>]) -> Result<(), RtcLogError> {
    let limit = columns
        .iter()
        .flatten()
        .map(|column| column.len().saturating_mul(8))
        .max()
        .filter(|&bits| bits > 0)
        .unwrap_or(MAX_UNENCODED_BATCH_DELTAS);
    if number_of_deltas > limit {
        return Err(RtcLogError::InvalidRecord {
            reason: format!(
                "batch declares {number_of_deltas} deltas, columns hold at most {limit}"
            ),
        });
    }
    Ok(())
}

/// Reconstructs a column of `number_of_deltas + 1` values.
///
/// Holes repeat the last present value.
fn expand_column(
    first: u64,
    deltas: Option<&[u8]>,
    number_of_deltas: usize,
) -> Result<Vec<u64>, DecodeError> {
    let decoded = decode_deltas(deltas, Some(first), number_of_deltas)?;
    let mut values = Vec::with_capacity(number_of_deltas + 1);
    values.push(first);
    let mut last = first;
    for value in decoded {
        if let Some(value) = value {
            last = value;
        }
        values.push(last);
    }
    Ok(values)
}

/// Timestamp column in microseconds. Timestamps are stored as two's complement.
fn timestamp_column(
    first_ms: i64,
    deltas: Option<&[u8]>,
    number_of_deltas: usize,
) -> Result<Vec<i64>, DecodeError> {
    Ok(expand_column(first_ms as u64, deltas, number_of_deltas)?
        .into_iter()
        .map(|ms| ms_to_us(ms as i64))
        .collect())
}

/// Batch of RTP packet headers.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpPacketBatch {
    pub incoming: bool,
    pub number_of_deltas: u32,
    pub timestamp_ms: i64,
    #[serde_as(as = "Option<Base64>")]
    pub timestamp_ms_deltas: Option<Vec<u8>>,
    pub marker: bool,
    #[serde_as(as = "Option<Base64>")]
    pub marker_deltas: Option<Vec<u8>>,
    pub payload_type: u32,
    #[serde_as(as = "Option<Base64>")]
    pub payload_type_deltas: Option<Vec<u8>>,
    pub sequence_number: u32,
    #[serde_as(as = "Option<Base64>")]
    pub sequence_number_deltas: Option<Vec<u8>>,
    pub rtp_timestamp: u32,
    #[serde_as(as = "Option<Base64>")]
    pub rtp_timestamp_deltas: Option<Vec<u8>>,
    pub ssrc: u32,
    #[serde_as(as = "Option<Base64>")]
    pub ssrc_deltas: Option<Vec<u8>>,
    pub payload_size: u32,
    #[serde_as(as = "Option<Base64>")]
    pub payload_size_deltas: Option<Vec<u8>>,
    pub header_size: u32,
    #[serde_as(as = "Option<Base64>")]
    pub header_size_deltas: Option<Vec<u8>>,
    #[serde(default)]
    pub padding_size: u32,
    #[serde_as(as = "Option<Base64>")]
    pub padding_size_deltas: Option<Vec<u8>>,
}

/// Builds the 12-byte fixed header of a reconstructed packet.
fn synthesize_rtp_header(
    marker: bool,
    payload_type: u8,
    sequence_number: SequenceNumber,
    rtp_timestamp: u32,
    ssrc: Ssrc,
) -> Vec<u8> {
    let mut header = Vec::with_capacity(RTP_FIXED_HEADER_LENGTH_BYTES);
    header.push(RTP_VERSION << 6);
    header.push((u8::from(marker) << 7) | (payload_type & 0x7F));
    header.extend_from_slice(&sequence_number.to_be_bytes());
    header.extend_from_slice(&rtp_timestamp.to_be_bytes());
    header.extend_from_slice(&ssrc.to_be_bytes());
    header
}

impl RtpPacketBatch {
    fn expand(&self) -> Result<Vec<TelemetryEvent>, RtcLogError> {
        let n = self.number_of_deltas as usize;
        check_batch_size(
            n,
            &[
                self.timestamp_ms_deltas.as_deref(),
                self.marker_deltas.as_deref(),
                self.payload_type_deltas.as_deref(),
                self.sequence_number_deltas.as_deref(),
                self.rtp_timestamp_deltas.as_deref(),
                self.ssrc_deltas.as_deref(),
                self.payload_size_deltas.as_deref(),
                self.header_size_deltas.as_deref(),
                self.padding_size_deltas.as_deref(),
            ],
        )?;
        let column = |first: u32, deltas: &Option<Vec<u8>>| {
            expand_column(u64::from(first), deltas.as_deref(), n)
        };

        let timestamps =
            timestamp_column(self.timestamp_ms, self.timestamp_ms_deltas.as_deref(), n)?;
        let markers = expand_column(u64::from(self.marker), self.marker_deltas.as_deref(), n)?;
        let payload_types = column(self.payload_type, &self.payload_type_deltas)?;
        let sequence_numbers = column(self.sequence_number, &self.sequence_number_deltas)?;
        let rtp_timestamps = column(self.rtp_timestamp, &self.rtp_timestamp_deltas)?;
        let ssrcs = column(self.ssrc, &self.ssrc_deltas)?;
        let payload_sizes = column(self.payload_size, &self.payload_size_deltas)?;
        let header_sizes = column(self.header_size, &self.header_size_deltas)?;
        let padding_sizes = column(self.padding_size, &self.padding_size_deltas)?;

        let direction = Direction::from_incoming(self.incoming);
        let events = (0..=n)
            .map(|i| {
                let header = synthesize_rtp_header(
                    markers[i] != 0,
                    payload_types[i] as u8,
                    SequenceNumber::new(sequence_numbers[i] as u16),
                    rtp_timestamps[i] as u32,
                    Ssrc::new(ssrcs[i] as u32),
                );
                let header_length = header_sizes[i] as usize;
                TelemetryEvent {
                    timestamp_us: timestamps[i],
                    kind: EventKind::RtpPacket {
                        direction,
                        header,
                        header_length,
                        packet_length: header_length
                            + payload_sizes[i] as usize
                            + padding_sizes[i] as usize,
                    },
                }
            })
            .collect();
        Ok(events)
    }
}

/// Batch of raw RTCP packets: the first in `raw_packet`, the rest in a blob column.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcpPacketBatch {
    pub incoming: bool,
    pub number_of_deltas: u32,
    pub timestamp_ms: i64,
    #[serde_as(as = "Option<Base64>")]
    pub timestamp_ms_deltas: Option<Vec<u8>>,
    #[serde_as(as = "Base64")]
    pub raw_packet: Vec<u8>,
    #[serde_as(as = "Option<Base64>")]
    pub raw_packet_blobs: Option<Vec<u8>>,
}

impl RtcpPacketBatch {
    fn expand(&self) -> Result<Vec<TelemetryEvent>, RtcLogError> {
        let n = self.number_of_deltas as usize;
        check_batch_size(
            n,
            &[self.timestamp_ms_deltas.as_deref(), self.raw_packet_blobs.as_deref()],
        )?;
        let timestamps =
            timestamp_column(self.timestamp_ms, self.timestamp_ms_deltas.as_deref(), n)?;

        let mut packets: Vec<&[u8]> = Vec::with_capacity(n + 1);
        packets.push(&self.raw_packet);
        if n > 0 {
            let blobs = self
                .raw_packet_blobs
                .as_deref()
                .ok_or_else(|| RtcLogError::InvalidRecord {
                    reason: format!("rtcp_packets batch with {n} deltas has no raw_packet_blobs"),
                })?;
            packets.extend(decode_blobs(blobs, n)?);
        }

        let direction = Direction::from_incoming(self.incoming);
        Ok(timestamps
            .into_iter()
            .zip(packets)
            .map(|(timestamp_us, data)| TelemetryEvent {
                timestamp_us,
                kind: EventKind::RtcpPacket {
                    direction,
                    data: data.to_vec(),
                },
            })
            .collect())
    }
}

/// Batch of loss-based estimator updates.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossBasedBweBatch {
    pub number_of_deltas: u32,
    pub timestamp_ms: i64,
    #[serde_as(as = "Option<Base64>")]
    pub timestamp_ms_deltas: Option<Vec<u8>>,
    pub bitrate_bps: u32,
    #[serde_as(as = "Option<Base64>")]
    pub bitrate_bps_deltas: Option<Vec<u8>>,
    pub fraction_loss: u8,
    #[serde_as(as = "Option<Base64>")]
    pub fraction_loss_deltas: Option<Vec<u8>>,
    pub total_packets: u32,
    #[serde_as(as = "Option<Base64>")]
    pub total_packets_deltas: Option<Vec<u8>>,
}

impl LossBasedBweBatch {
    fn expand(&self) -> Result<Vec<TelemetryEvent>, RtcLogError> {
        let n = self.number_of_deltas as usize;
        check_batch_size(
            n,
            &[
                self.timestamp_ms_deltas.as_deref(),
                self.bitrate_bps_deltas.as_deref(),
                self.fraction_loss_deltas.as_deref(),
                self.total_packets_deltas.as_deref(),
            ],
        )?;
        let timestamps =
            timestamp_column(self.timestamp_ms, self.timestamp_ms_deltas.as_deref(), n)?;
        let bitrates = expand_column(
            u64::from(self.bitrate_bps),
            self.bitrate_bps_deltas.as_deref(),
            n,
        )?;
        let losses = expand_column(
            u64::from(self.fraction_loss),
            self.fraction_loss_deltas.as_deref(),
            n,
        )?;
        let totals = expand_column(
            u64::from(self.total_packets),
            self.total_packets_deltas.as_deref(),
            n,
        )?;

        Ok((0..=n)
            .map(|i| TelemetryEvent {
                timestamp_us: timestamps[i],
                kind: EventKind::LossBasedBweUpdate {
                    bitrate_bps: bitrates[i] as u32,
                    fraction_loss: losses[i] as u8,
                    total_packets: totals[i] as u32,
                },
            })
            .collect())
    }
}

/// Batch of delay-based estimator updates.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayBasedBweBatch {
    pub number_of_deltas: u32,
    pub timestamp_ms: i64,
    #[serde_as(as = "Option<Base64>")]
    pub timestamp_ms_deltas: Option<Vec<u8>>,
    pub bitrate_bps: u32,
    #[serde_as(as = "Option<Base64>")]
    pub bitrate_bps_deltas: Option<Vec<u8>>,
    /// Numeric detector state, see [`DetectorState::from_code`].
    pub detector_state: u32,
    #[serde_as(as = "Option<Base64>")]
    pub detector_state_deltas: Option<Vec<u8>>,
}

impl DelayBasedBweBatch {
    fn expand(&self) -> Result<Vec<TelemetryEvent>, RtcLogError> {
        let n = self.number_of_deltas as usize;
        check_batch_size(
            n,
            &[
                self.timestamp_ms_deltas.as_deref(),
                self.bitrate_bps_deltas.as_deref(),
                self.detector_state_deltas.as_deref(),
            ],
        )?;
        let timestamps =
            timestamp_column(self.timestamp_ms, self.timestamp_ms_deltas.as_deref(), n)?;
        let bitrates = expand_column(
            u64::from(self.bitrate_bps),
            self.bitrate_bps_deltas.as_deref(),
            n,
        )?;
        let states = expand_column(
            u64::from(self.detector_state),
            self.detector_state_deltas.as_deref(),
            n,
        )?;

        Ok((0..=n)
            .map(|i| TelemetryEvent {
                timestamp_us: timestamps[i],
                kind: EventKind::DelayBasedBweUpdate {
                    bitrate_bps: bitrates[i] as u32,
                    detector_state: DetectorState::from_code(states[i]),
                },
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeClusterRecord {
    pub timestamp_ms: i64,
    pub id: u32,
    pub bitrate_bps: u32,
    pub min_packets: u32,
    pub min_bytes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResultRecord {
    pub timestamp_ms: i64,
    pub id: u32,
    pub result: ProbeOutcome,
    #[serde(default)]
    pub bitrate_bps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlrStateRecord {
    pub timestamp_ms: i64,
    pub in_alr: bool,
}
