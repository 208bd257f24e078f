//! Sender and receiver reports.

use serde::Serialize;

use crate::constants::{
    RTCP_COMMON_HEADER_LENGTH_BYTES, RTCP_REPORT_BLOCK_LENGTH_BYTES, RTCP_SENDER_INFO_LENGTH_BYTES,
};
use crate::error::{DecodeError, ParseContext};
use crate::rtcp::{RtcpHeader, read_u32};
use crate::types::{RtpTimestamp, Ssrc};

/// Sender information section of an SR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SenderInfo {
    /// 64-bit NTP timestamp (32.32 fixed point).
    pub ntp_timestamp: u64,
    pub rtp_timestamp: RtpTimestamp,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderInfo {
    /// Parses the sender info that follows the common header of an SR.
    pub fn parse(packet: &[u8]) -> Result<Self, DecodeError> {
        let end = RTCP_COMMON_HEADER_LENGTH_BYTES + RTCP_SENDER_INFO_LENGTH_BYTES;
        if packet.len() < end {
            return Err(DecodeError::Truncated {
                needed: end,
                got: packet.len(),
                context: ParseContext::RtcpSenderInfo,
            });
        }
        let base = RTCP_COMMON_HEADER_LENGTH_BYTES;
        let ntp_high = u64::from(read_u32(packet, base));
        let ntp_low = u64::from(read_u32(packet, base + 4));
        Ok(Self {
            ntp_timestamp: (ntp_high << 32) | ntp_low,
            rtp_timestamp: RtpTimestamp::new(read_u32(packet, base + 8)),
            packet_count: read_u32(packet, base + 12),
            octet_count: read_u32(packet, base + 16),
        })
    }

    /// Middle 32 bits of the NTP timestamp, as echoed in report blocks' LSR field.
    #[inline]
    pub fn ntp_middle_32(&self) -> u32 {
        (self.ntp_timestamp >> 16) as u32
    }
}

/// One 24-byte reception report block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportBlock {
    /// Source the block reports on.
    pub ssrc: Ssrc,
    /// Fraction lost as a percentage, rounded down.
    pub fraction_lost: u8,
    /// Fraction lost as sent on the wire (Q8).
    pub fraction_lost_raw: u8,
    pub cumulative_lost: i32,
    pub extended_highest_sequence: u32,
    pub jitter: u32,
    /// Middle 32 bits of the NTP timestamp of the last SR received from `ssrc`.
    pub last_sr: u32,
    /// Delay since that SR in units of 1/65536 s.
    pub delay_since_last_sr: u32,
}

impl ReportBlock {
    fn parse(block: &[u8]) -> Self {
        let fraction_lost_raw = block[4];
        // 24-bit two's complement
        let cumulative_lost = (i32::from_be_bytes([block[5], block[6], block[7], 0])) >> 8;
        Self {
            ssrc: Ssrc::new(read_u32(block, 0)),
            fraction_lost: (u32::from(fraction_lost_raw) * 100 / 256) as u8,
            fraction_lost_raw,
            cumulative_lost,
            extended_highest_sequence: read_u32(block, 8),
            jitter: read_u32(block, 12),
            last_sr: read_u32(block, 16),
            delay_since_last_sr: read_u32(block, 20),
        }
    }

    /// DLSR converted to microseconds.
    #[inline]
    pub fn delay_since_last_sr_us(&self) -> i64 {
        i64::from(self.delay_since_last_sr) * 1_000_000 / 65_536
    }
}

/// Decodes the report blocks of one SR (`is_sender_report`) or RR packet.
///
/// `packet` is the packet view handed out by the compound walk, so blocks never
/// extend into the next packet.
///
/// # Errors
/// - [`DecodeError::Truncated`] - the packet is shorter than its fixed part
/// - [`DecodeError::BlockCountMismatch`] - fewer blocks fit than the header declares
pub fn decode_report_blocks(
    packet: &[u8],
    is_sender_report: bool,
) -> Result<Vec<ReportBlock>, DecodeError> {
    let blocks_start = if is_sender_report {
        RTCP_COMMON_HEADER_LENGTH_BYTES + RTCP_SENDER_INFO_LENGTH_BYTES
    } else {
        RTCP_COMMON_HEADER_LENGTH_BYTES
    };
    if packet.len() < blocks_start {
        return Err(DecodeError::Truncated {
            needed: blocks_start,
            got: packet.len(),
            context: if is_sender_report {
                ParseContext::RtcpSenderInfo
            } else {
                ParseContext::RtcpReportBlocks
            },
        });
    }
    let header = RtcpHeader::parse(packet)?;
    let declared = header.report_count();

    let blocks: Vec<ReportBlock> = packet[blocks_start..]
        .chunks_exact(RTCP_REPORT_BLOCK_LENGTH_BYTES)
        .take(usize::from(declared))
        .map(ReportBlock::parse)
        .collect();

    if blocks.len() != usize::from(declared) {
        return Err(DecodeError::BlockCountMismatch {
            declared,
            found: blocks.len(),
        });
    }
    Ok(blocks)
}

/// A decoded sender report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SenderReport {
    pub ssrc: Ssrc,
    pub sender_info: SenderInfo,
    pub report_blocks: Vec<ReportBlock>,
}

impl SenderReport {
    pub fn parse(packet: &[u8]) -> Result<Self, DecodeError> {
        let header = RtcpHeader::parse(packet)?;
        let sender_info = SenderInfo::parse(packet)?;
        let report_blocks = decode_report_blocks(packet, true)?;
        Ok(Self {
            ssrc: header.ssrc,
            sender_info,
            report_blocks,
        })
    }
}

/// A decoded receiver report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiverReport {
    pub ssrc: Ssrc,
    pub report_blocks: Vec<ReportBlock>,
}

impl ReceiverReport {
    pub fn parse(packet: &[u8]) -> Result<Self, DecodeError> {
        let header = RtcpHeader::parse(packet)?;
        let report_blocks = decode_report_blocks(packet, false)?;
        Ok(Self {
            ssrc: header.ssrc,
            report_blocks,
        })
    }
}
