//! Synthetic packet capture writer.
//!
//! Every logged RTP/RTCP packet is wrapped in a fabricated Ethernet/IPv4/UDP
//! header and appended to a classic libpcap file (big-endian, microsecond
//! timestamps, Ethernet link type). Payload bytes are copied verbatim.
//!
//! ```text
//! global header (24) | record header (16) | eth (14) | ipv4 (20) | udp (8) | payload | ...
//! ```

use std::io::Write;
use std::net::Ipv4Addr;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::constants::{
    ETHERTYPE_IPV4, IP_PROTOCOL_UDP, IPV4_HEADER_LENGTH_BYTES, PCAP_GLOBAL_HEADER_LENGTH_BYTES,
    PCAP_LINKTYPE_ETHERNET, PCAP_MAGIC, PCAP_RECORD_HEADER_LENGTH_BYTES, PCAP_SNAPLEN,
    PCAP_VERSION_MAJOR, PCAP_VERSION_MINOR, SYNTHETIC_HEADER_LENGTH_BYTES,
    SYNTHETIC_IPV4_IDENTIFICATION, SYNTHETIC_IPV4_TTL, UDP_HEADER_LENGTH_BYTES,
};
use crate::error::RtcLogError;
use crate::types::Direction;

/// Addresses used for the synthetic framing.
///
/// Inbound packets travel remote to local, outbound packets local to remote.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureEndpoints {
    #[serde_as(as = "DisplayFromStr")]
    pub local_ip: Ipv4Addr,
    #[serde_as(as = "DisplayFromStr")]
    pub remote_ip: Ipv4Addr,
    pub local_port: u16,
    pub remote_port: u16,
    pub local_mac: [u8; 6],
    pub remote_mac: [u8; 6],
}

impl Default for CaptureEndpoints {
    fn default() -> Self {
        Self {
            local_ip: Ipv4Addr::new(10, 1, 1, 1),
            remote_ip: Ipv4Addr::new(10, 2, 2, 2),
            local_port: 2000,
            remote_port: 1000,
            local_mac: [0x0A, 0x02, 0x02, 0x02, 0x02, 0x01],
            remote_mac: [0x0A, 0x02, 0x02, 0x02, 0x02, 0x02],
        }
    }
}

/// RFC 1071 ones' complement checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match *pair {
            [hi, lo] => u32::from(u16::from_be_bytes([hi, lo])),
            [hi] => u32::from(hi) << 8,
            _ => 0,
        })
        .sum();
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Append-only pcap file builder.
#[derive(Debug, Clone)]
pub struct PcapWriter {
    buffer: BytesMut,
    endpoints: CaptureEndpoints,
    record_count: usize,
}

impl PcapWriter {
    pub fn new() -> Self {
        Self::with_endpoints(CaptureEndpoints::default())
    }

    /// Creates a writer and emits the global header.
    pub fn with_endpoints(endpoints: CaptureEndpoints) -> Self {
        let mut buffer = BytesMut::with_capacity(PCAP_GLOBAL_HEADER_LENGTH_BYTES);
        buffer.put_u32(PCAP_MAGIC);
        buffer.put_u16(PCAP_VERSION_MAJOR);
        buffer.put_u16(PCAP_VERSION_MINOR);
        buffer.put_i32(0); // GMT
        buffer.put_u32(0); // sigfigs
        buffer.put_u32(PCAP_SNAPLEN);
        buffer.put_u32(PCAP_LINKTYPE_ETHERNET);
        Self {
            buffer,
            endpoints,
            record_count: 0,
        }
    }

    /// Appends one record.
    ///
    /// `payload` is the captured part of the packet, `original_length` the length
    /// of the packet on the wire (RTP packets are logged header-only).
    pub fn write(
        &mut self,
        payload: &[u8],
        direction: Direction,
        original_length: usize,
        timestamp_us: u64,
    ) {
        let captured = payload.len() + SYNTHETIC_HEADER_LENGTH_BYTES;
        let original = original_length + SYNTHETIC_HEADER_LENGTH_BYTES;
        self.buffer.reserve(PCAP_RECORD_HEADER_LENGTH_BYTES + captured);

        self.buffer.put_u32((timestamp_us / 1_000_000) as u32);
        self.buffer.put_u32((timestamp_us % 1_000_000) as u32);
        self.buffer.put_u32(saturating_u32(captured));
        self.buffer.put_u32(saturating_u32(original));

        self.put_synthetic_header(direction, original_length);
        self.buffer.put_slice(payload);
        self.record_count += 1;
    }

    fn put_synthetic_header(&mut self, direction: Direction, original_length: usize) {
        let ep = &self.endpoints;
        let (src_mac, dst_mac, src_ip, dst_ip, src_port, dst_port) = match direction {
            Direction::Inbound => (
                ep.remote_mac,
                ep.local_mac,
                ep.remote_ip,
                ep.local_ip,
                ep.remote_port,
                ep.local_port,
            ),
            Direction::Outbound => (
                ep.local_mac,
                ep.remote_mac,
                ep.local_ip,
                ep.remote_ip,
                ep.local_port,
                ep.remote_port,
            ),
        };

        // Ethernet II
        self.buffer.put_slice(&dst_mac);
        self.buffer.put_slice(&src_mac);
        self.buffer.put_u16(ETHERTYPE_IPV4);

        // IPv4, no options
        let total_length =
            saturating_u16(original_length + IPV4_HEADER_LENGTH_BYTES + UDP_HEADER_LENGTH_BYTES);
        let mut ip = [0u8; IPV4_HEADER_LENGTH_BYTES];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&total_length.to_be_bytes());
        ip[4..6].copy_from_slice(&SYNTHETIC_IPV4_IDENTIFICATION.to_be_bytes());
        ip[8] = SYNTHETIC_IPV4_TTL;
        ip[9] = IP_PROTOCOL_UDP;
        ip[12..16].copy_from_slice(&src_ip.octets());
        ip[16..20].copy_from_slice(&dst_ip.octets());
        let checksum = internet_checksum(&ip);
        ip[10..12].copy_from_slice(&checksum.to_be_bytes());
        self.buffer.put_slice(&ip);

        // UDP, checksum unset
        self.buffer.put_u16(src_port);
        self.buffer.put_u16(dst_port);
        self.buffer.put_u16(saturating_u16(original_length + UDP_HEADER_LENGTH_BYTES));
        self.buffer.put_u16(0);
    }

    /// Number of records written.
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Current file size in bytes, global header included.
    pub fn size_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the complete capture file.
    pub fn save(self) -> Bytes {
        self.buffer.freeze()
    }

    /// Writes the capture file built so far to `writer`.
    pub fn write_to(&self, mut writer: impl Write) -> Result<(), RtcLogError> {
        writer.write_all(&self.buffer)?;
        writer.flush()?;
        Ok(())
    }
}

impl Default for PcapWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn saturating_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

#[inline]
fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
