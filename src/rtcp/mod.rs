//! RTCP compound packet walking and filter dispatch.
//!
//! A compound buffer is a sequence of RTCP packets, each starting with the
//! 8-byte common header. [`RtcpPacketIter`] yields every packet in buffer order
//! as a header plus a read-only view of the packet's bytes (header included).
//! [`for_each_packet`] offers each packet to a list of [`RtcpFilter`]s, which
//! then hand the view to one of the typed sub-decoders:
//!
//! - [`report`]: sender and receiver reports
//! - [`feedback`]: PLI and REMB
//! - [`twcc`]: transport-wide congestion control feedback

pub mod feedback;
pub mod report;
pub mod twcc;

use serde::Serialize;

use crate::constants::RTCP_COMMON_HEADER_LENGTH_BYTES;
use crate::error::{DecodeError, Field, ParseContext};
use crate::types::Ssrc;

pub use feedback::{PictureLossIndication, Remb};
pub use report::{ReceiverReport, ReportBlock, SenderInfo, SenderReport, decode_report_blocks};
pub use twcc::{PacketReport, PacketStatus, StatusChunk, TransportFeedback};

/// Big-endian `u32` at `offset`. Callers check the length first.
#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// RTCP version carried in the top two bits of every packet.
pub const RTCP_VERSION: u8 = 2;

/// Common header shared by all RTCP packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RtcpHeader {
    pub version: u8,
    pub padding: bool,
    /// Report count for SR/RR, feedback message type for RTPFB/PSFB.
    pub count: u8,
    pub payload_type: u8,
    /// Packet length in 32-bit words minus one.
    pub length_words: u16,
    /// First SSRC of the packet (the sender).
    pub ssrc: Ssrc,
}

impl RtcpHeader {
    /// Parses the common header at the start of `data`.
    ///
    /// # Errors
    /// - [`DecodeError::Truncated`] - fewer than 8 bytes
    /// - [`DecodeError::InvalidHeader`] - version is not 2
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < RTCP_COMMON_HEADER_LENGTH_BYTES {
            return Err(DecodeError::Truncated {
                needed: RTCP_COMMON_HEADER_LENGTH_BYTES,
                got: data.len(),
                context: ParseContext::RtcpCommonHeader,
            });
        }

        let version = data[0] >> 6;
        if version != RTCP_VERSION {
            return Err(DecodeError::InvalidHeader {
                field: Field::RtcpVersion,
                expected: u64::from(RTCP_VERSION),
                got: u64::from(version),
            });
        }

        Ok(Self {
            version,
            padding: (data[0] >> 5) & 0x01 == 1,
            count: data[0] & 0x1F,
            payload_type: data[1],
            length_words: u16::from_be_bytes([data[2], data[3]]),
            ssrc: Ssrc::new(read_u32(data, 4)),
        })
    }

    /// Total packet length in bytes, header included.
    #[inline]
    pub fn packet_length_bytes(&self) -> usize {
        4 * (usize::from(self.length_words) + 1)
    }

    /// Declared number of report blocks (SR/RR).
    #[inline]
    pub fn report_count(&self) -> u8 {
        self.count
    }

    /// Feedback message type (RTPFB/PSFB).
    #[inline]
    pub fn feedback_message_type(&self) -> u8 {
        self.count
    }
}

/// One packet of a compound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpPacket<'a> {
    pub header: RtcpHeader,
    /// The packet's bytes, common header included.
    pub data: &'a [u8],
}

/// Iterator over the packets of a compound buffer.
///
/// Yields at most one error; iteration ends after it.
#[derive(Debug, Clone)]
pub struct RtcpPacketIter<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RtcpPacketIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset of the next packet.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn next_packet(&mut self) -> Result<RtcpPacket<'a>, DecodeError> {
        let rest = &self.data[self.offset..];
        let header = RtcpHeader::parse(rest)?;
        let length = header.packet_length_bytes();
        if length > rest.len() {
            return Err(DecodeError::Truncated {
                needed: length,
                got: rest.len(),
                context: ParseContext::RtcpPacket,
            });
        }
        self.offset += length;
        Ok(RtcpPacket {
            header,
            data: &rest[..length],
        })
    }
}

impl<'a> Iterator for RtcpPacketIter<'a> {
    type Item = Result<RtcpPacket<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let item = self.next_packet();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}

impl std::iter::FusedIterator for RtcpPacketIter<'_> {}

/// Handler invoked for every matching packet with the header and the packet bytes.
pub type RtcpHandler<'f> = Box<dyn FnMut(&RtcpHeader, &[u8]) + 'f>;

/// A (payload type, feedback message type) predicate paired with a handler.
///
/// Unset criteria match every packet.
pub struct RtcpFilter<'f> {
    payload_type: Option<u8>,
    feedback_message_type: Option<u8>,
    handler: RtcpHandler<'f>,
}

impl<'f> RtcpFilter<'f> {
    /// Creates a filter matching every packet.
    pub fn new(handler: impl FnMut(&RtcpHeader, &[u8]) + 'f) -> Self {
        Self {
            payload_type: None,
            feedback_message_type: None,
            handler: Box::new(handler),
        }
    }

    /// Restricts the filter to one payload type.
    pub fn payload_type(mut self, payload_type: u8) -> Self {
        self.payload_type = Some(payload_type);
        self
    }

    /// Restricts the filter to one feedback message type.
    pub fn feedback_message_type(mut self, feedback_message_type: u8) -> Self {
        self.feedback_message_type = Some(feedback_message_type);
        self
    }

    /// Whether `header` satisfies every set criterion.
    pub fn matches(&self, header: &RtcpHeader) -> bool {
        self.payload_type.is_none_or(|pt| pt == header.payload_type)
            && self
                .feedback_message_type
                .is_none_or(|fmt| fmt == header.feedback_message_type())
    }
}

impl std::fmt::Debug for RtcpFilter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcpFilter")
            .field("payload_type", &self.payload_type)
            .field("feedback_message_type", &self.feedback_message_type)
            .finish_non_exhaustive()
    }
}

/// Walks a compound buffer and offers every packet to each matching filter.
///
/// Filters run in registration order for each packet, packets in buffer order.
/// Returns the number of packets walked. On a malformed packet the walk stops
/// and the error is returned; handlers already invoked for earlier packets are
/// not undone.
pub fn for_each_packet(data: &[u8], filters: &mut [RtcpFilter<'_>]) -> Result<usize, DecodeError> {
    let mut packets = 0;
    for packet in RtcpPacketIter::new(data) {
        let packet = packet?;
        for filter in filters.iter_mut() {
            if filter.matches(&packet.header) {
                (filter.handler)(&packet.header, packet.data);
            }
        }
        packets += 1;
    }
    Ok(packets)
}
