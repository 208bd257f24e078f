//! Protocol constants, wire sizes and default settings.
//!
//! Groups the RTCP/RTP identifiers used by the parsers, the fixed layout of the
//! synthetic capture framing, and the defaults used by the analyzer configuration.

// --- Encoded event-log columns ---

/// Maximum number of 7-bit groups in a varint (covers 70 bits).
pub const VARINT_MAX_BYTES: usize = 10;
/// Width of the encoding-type tag at the start of a delta column.
pub const DELTA_ENCODING_TYPE_BITS: u8 = 2;
/// Width of the `width - 1` fields in a delta encoding header.
pub const DELTA_WIDTH_FIELD_BITS: u8 = 6;
/// Delta encoding tag: unsigned deltas, no holes, 64-bit values.
pub const DELTA_ENCODING_LEGACY: u64 = 0;
/// Delta encoding tag: explicit signedness, optional values and value width.
pub const DELTA_ENCODING_GENERAL: u64 = 1;
/// Largest `number_of_deltas` accepted for a batch that carries no delta columns.
pub const MAX_UNENCODED_BATCH_DELTAS: usize = 1 << 16;

// --- RTP ---

/// RTP/RTCP protocol version.
pub const RTP_VERSION: u8 = 2;
/// Length of the fixed RTP header without CSRCs.
pub const RTP_FIXED_HEADER_LENGTH_BYTES: usize = 12;
/// Length of the RTP header extension preamble (profile + length).
pub const RTP_EXTENSION_PREAMBLE_LENGTH_BYTES: usize = 4;
/// "Defined by profile" value announcing one-byte header extensions (RFC 8285).
pub const RTP_ONE_BYTE_EXTENSION_PROFILE: u16 = 0xBEDE;

// --- RTCP ---

/// Length of the RTCP common header including the sender SSRC.
pub const RTCP_COMMON_HEADER_LENGTH_BYTES: usize = 8;
/// Length of one SR/RR report block.
pub const RTCP_REPORT_BLOCK_LENGTH_BYTES: usize = 24;
/// Length of the SR sender info section.
pub const RTCP_SENDER_INFO_LENGTH_BYTES: usize = 20;

/// Sender report.
pub const RTCP_PT_SR: u8 = 200;
/// Receiver report.
pub const RTCP_PT_RR: u8 = 201;
/// Source description.
pub const RTCP_PT_SDES: u8 = 202;
/// Transport-layer feedback.
pub const RTCP_PT_RTPFB: u8 = 205;
/// Payload-specific feedback.
pub const RTCP_PT_PSFB: u8 = 206;

/// RTPFB: transport-wide congestion control feedback.
pub const RTCP_FMT_TRANSPORT_CC: u8 = 15;
/// PSFB: picture loss indication.
pub const RTCP_FMT_PLI: u8 = 1;
/// PSFB: application-layer feedback (REMB).
pub const RTCP_FMT_ALFB: u8 = 15;

/// "REMB" literal at byte 12 of an application-layer feedback packet.
pub const REMB_IDENTIFIER: u32 = 0x5245_4D42;
/// Minimum REMB packet length (header, media SSRC, tag, bitrate word).
pub const REMB_MIN_LENGTH_BYTES: usize = 20;
/// Minimum PLI packet length (header and media SSRC).
pub const PLI_LENGTH_BYTES: usize = 12;
/// Fixed part of a transport-cc feedback packet.
pub const TWCC_HEADER_LENGTH_BYTES: usize = 20;
/// Receive delta resolution in microseconds.
pub const TWCC_DELTA_TICK_US: i64 = 250;
/// Reference time resolution in milliseconds.
pub const TWCC_REFERENCE_TIME_TICK_MS: i64 = 64;

// --- Capture file ---

/// Classic pcap magic number (microsecond timestamps).
pub const PCAP_MAGIC: u32 = 0xA1B2_C3D4;
/// Pcap major version.
pub const PCAP_VERSION_MAJOR: u16 = 2;
/// Pcap minor version.
pub const PCAP_VERSION_MINOR: u16 = 4;
/// Snapshot length announced in the global header.
pub const PCAP_SNAPLEN: u32 = 256 * 1024;
/// Link-layer type: Ethernet.
pub const PCAP_LINKTYPE_ETHERNET: u32 = 1;
/// Size of the pcap global header.
pub const PCAP_GLOBAL_HEADER_LENGTH_BYTES: usize = 24;
/// Size of a pcap record header.
pub const PCAP_RECORD_HEADER_LENGTH_BYTES: usize = 16;

/// Ethernet II header length.
pub const ETHERNET_HEADER_LENGTH_BYTES: usize = 14;
/// IPv4 header length without options.
pub const IPV4_HEADER_LENGTH_BYTES: usize = 20;
/// UDP header length.
pub const UDP_HEADER_LENGTH_BYTES: usize = 8;
/// Total synthetic framing prepended to every captured packet.
pub const SYNTHETIC_HEADER_LENGTH_BYTES: usize =
    ETHERNET_HEADER_LENGTH_BYTES + IPV4_HEADER_LENGTH_BYTES + UDP_HEADER_LENGTH_BYTES;
/// EtherType for IPv4.
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// IP protocol number for UDP.
pub const IP_PROTOCOL_UDP: u8 = 17;
/// Identification field used for every synthetic IPv4 header.
pub const SYNTHETIC_IPV4_IDENTIFICATION: u16 = 0x1234;
/// TTL used for every synthetic IPv4 header.
pub const SYNTHETIC_IPV4_TTL: u8 = 0xFF;

// --- Analyzer defaults ---

/// Window after which a bitrate sample is emitted for an SSRC.
pub const DEFAULT_BITRATE_WINDOW_MS: i64 = 1000;
/// Number of sent sender reports remembered per SSRC for RTT matching.
pub const DEFAULT_RTT_HISTORY_PER_SSRC: usize = 32;
