//! Transport-wide congestion control feedback (RTPFB, FMT 15).
//!
//! Layout after the common header and media SSRC:
//!
//! ```text
//! | base seq (16) | status count (16) | reference time (24, signed) | fb index (8) |
//! | packet status chunks (16 each) ...                                           |
//! | receive deltas (8 or 16 each) ...                                            |
//! ```
//!
//! Chunks are consumed until `status count` symbols are known; a chunk at the
//! tail may contribute fewer symbols than it could hold.

use serde::Serialize;

use crate::constants::{TWCC_DELTA_TICK_US, TWCC_HEADER_LENGTH_BYTES, TWCC_REFERENCE_TIME_TICK_MS};
use crate::error::{DecodeError, Field, ParseContext};
use crate::rtcp::read_u32;
use crate::types::{SequenceNumber, Ssrc};

const VECTOR_CHUNK_BIT: u16 = 0x8000;
const TWO_BIT_SYMBOLS_BIT: u16 = 0x4000;
const RUN_LENGTH_MASK: u16 = 0x1FFF;
const ONE_BIT_SYMBOLS_PER_CHUNK: usize = 14;
const TWO_BIT_SYMBOLS_PER_CHUNK: usize = 7;

/// Reception status of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketStatus {
    NotReceived,
    ReceivedSmallDelta,
    ReceivedLargeDelta,
}

impl PacketStatus {
    /// Maps a 2-bit status symbol. `0b11` is reserved.
    pub fn from_symbol(symbol: u16) -> Result<Self, DecodeError> {
        match symbol {
            0 => Ok(Self::NotReceived),
            1 => Ok(Self::ReceivedSmallDelta),
            2 => Ok(Self::ReceivedLargeDelta),
            other => Err(DecodeError::InvalidFieldValue {
                field: Field::TwccStatusSymbol,
                value: u64::from(other),
            }),
        }
    }

    /// Bytes of receive delta this status consumes.
    #[inline]
    pub fn delta_size_bytes(self) -> usize {
        match self {
            Self::NotReceived => 0,
            Self::ReceivedSmallDelta => 1,
            Self::ReceivedLargeDelta => 2,
        }
    }

    #[inline]
    pub fn is_received(self) -> bool {
        !matches!(self, Self::NotReceived)
    }
}

/// One 16-bit packet status chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChunk {
    /// `0 | symbol (2) | run length (13)`
    RunLength { symbol: u16, run_length: u16 },
    /// `1 | 0 | 14 one-bit symbols`
    OneBitVector { symbols: u16 },
    /// `1 | 1 | 7 two-bit symbols`
    TwoBitVector { symbols: u16 },
}

impl StatusChunk {
    pub fn from_word(word: u16) -> Self {
        if word & VECTOR_CHUNK_BIT == 0 {
            Self::RunLength {
                symbol: (word >> 13) & 0x03,
                run_length: word & RUN_LENGTH_MASK,
            }
        } else if word & TWO_BIT_SYMBOLS_BIT == 0 {
            Self::OneBitVector {
                symbols: word & 0x3FFF,
            }
        } else {
            Self::TwoBitVector {
                symbols: word & 0x3FFF,
            }
        }
    }

    /// Number of symbols the chunk describes when not capped.
    pub fn capacity(&self) -> usize {
        match self {
            Self::RunLength { run_length, .. } => usize::from(*run_length),
            Self::OneBitVector { .. } => ONE_BIT_SYMBOLS_PER_CHUNK,
            Self::TwoBitVector { .. } => TWO_BIT_SYMBOLS_PER_CHUNK,
        }
    }

    /// Appends at most `limit` statuses, first symbol first.
    fn expand_into(
        &self,
        limit: usize,
        statuses: &mut Vec<PacketStatus>,
    ) -> Result<(), DecodeError> {
        let count = self.capacity().min(limit);
        match *self {
            Self::RunLength { symbol, .. } => {
                if count > 0 {
                    let status = PacketStatus::from_symbol(symbol)?;
                    statuses.extend(std::iter::repeat_n(status, count));
                }
            }
            Self::OneBitVector { symbols } => {
                for i in 0..count {
                    let bit = (symbols >> (ONE_BIT_SYMBOLS_PER_CHUNK - 1 - i)) & 0x01;
                    statuses.push(PacketStatus::from_symbol(bit)?);
                }
            }
            Self::TwoBitVector { symbols } => {
                for i in 0..count {
                    let symbol = (symbols >> (2 * (TWO_BIT_SYMBOLS_PER_CHUNK - 1 - i))) & 0x03;
                    statuses.push(PacketStatus::from_symbol(symbol)?);
                }
            }
        }
        Ok(())
    }
}

/// Per-packet result of a feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketReport {
    pub sequence_number: SequenceNumber,
    pub status: PacketStatus,
    /// Receive delta relative to the previous received packet, `None` if not received.
    pub delta_us: Option<i64>,
}

/// A decoded transport-wide feedback message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportFeedback {
    pub sender_ssrc: Ssrc,
    pub media_ssrc: Ssrc,
    pub base_sequence_number: SequenceNumber,
    pub packet_status_count: u16,
    pub reference_time_ms: i64,
    pub feedback_packet_index: u8,
    pub packets: Vec<PacketReport>,
}

impl TransportFeedback {
    /// Parses the packet view of one RTPFB/15 message.
    ///
    /// # Errors
    /// - [`DecodeError::Truncated`] - header, chunks or deltas run past the packet
    /// - [`DecodeError::InvalidFieldValue`] - a reserved status symbol is used
    pub fn parse(packet: &[u8]) -> Result<Self, DecodeError> {
        if packet.len() < TWCC_HEADER_LENGTH_BYTES {
            return Err(DecodeError::Truncated {
                needed: TWCC_HEADER_LENGTH_BYTES,
                got: packet.len(),
                context: ParseContext::TransportFeedbackHeader,
            });
        }

        let sender_ssrc = Ssrc::new(read_u32(packet, 4));
        let media_ssrc = Ssrc::new(read_u32(packet, 8));
        let base_sequence_number =
            SequenceNumber::new(u16::from_be_bytes([packet[12], packet[13]]));
        let packet_status_count = u16::from_be_bytes([packet[14], packet[15]]);
        // Signed 24-bit value in bytes 16..19.
        let reference_ticks = i32::from_be_bytes([packet[16], packet[17], packet[18], 0]) >> 8;
        let feedback_packet_index = packet[19];

        let total = usize::from(packet_status_count);
        let mut statuses = Vec::with_capacity(total);
        let mut offset = TWCC_HEADER_LENGTH_BYTES;
        while statuses.len() < total {
            if offset + 2 > packet.len() {
                return Err(DecodeError::Truncated {
                    needed: offset + 2,
                    got: packet.len(),
                    context: ParseContext::TransportFeedbackChunks,
                });
            }
            let word = u16::from_be_bytes([packet[offset], packet[offset + 1]]);
            let chunk = StatusChunk::from_word(word);
            chunk.expand_into(total - statuses.len(), &mut statuses)?;
            offset += 2;
        }

        let delta_bytes: usize = statuses.iter().map(|s| s.delta_size_bytes()).sum();
        if offset + delta_bytes > packet.len() {
            return Err(DecodeError::Truncated {
                needed: offset + delta_bytes,
                got: packet.len(),
                context: ParseContext::TransportFeedbackDeltas,
            });
        }

        let mut packets = Vec::with_capacity(total);
        for (i, status) in statuses.into_iter().enumerate() {
            let delta_ticks = match status {
                PacketStatus::NotReceived => None,
                PacketStatus::ReceivedSmallDelta => Some(i64::from(packet[offset])),
                PacketStatus::ReceivedLargeDelta => Some(i64::from(i16::from_be_bytes([
                    packet[offset],
                    packet[offset + 1],
                ]))),
            };
            offset += status.delta_size_bytes();
            packets.push(PacketReport {
                // Status count is a u16, so the index fits.
                sequence_number: base_sequence_number.wrapping_add(i as u16),
                status,
                delta_us: delta_ticks.map(|ticks| ticks * TWCC_DELTA_TICK_US),
            });
        }

        Ok(Self {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time_ms: i64::from(reference_ticks) * TWCC_REFERENCE_TIME_TICK_MS,
            feedback_packet_index,
            packets,
        })
    }

    /// Number of packets reported as received.
    pub fn received_count(&self) -> usize {
        self.packets.iter().filter(|p| p.status.is_received()).count()
    }

    /// Receive time of every received packet, in microseconds on the remote clock.
    pub fn receive_times_us(&self) -> Vec<(SequenceNumber, i64)> {
        let mut time_us = self.reference_time_ms * 1000;
        self.packets
            .iter()
            .filter_map(|packet| {
                let delta = packet.delta_us?;
                time_us += delta;
                Some((packet.sequence_number, time_us))
            })
            .collect()
    }
}
