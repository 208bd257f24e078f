//! Common test utilities for rtclog integration tests.
//!
//! Builders for RTCP packets, RTP headers and JSON-lines records, so tests can
//! describe traffic in terms of fields rather than raw bytes.
#![allow(dead_code)]

use rtclog::constants::{
    RTCP_FMT_ALFB, RTCP_FMT_PLI, RTCP_FMT_TRANSPORT_CC, RTCP_PT_PSFB, RTCP_PT_RR, RTCP_PT_RTPFB,
    RTCP_PT_SR,
};
use rtclog::event_log::{LegacyEvent, LegacyEventKind};
use rtclog::LogRecord;

/// Prepends an RTCP common header to `body` (everything after the sender SSRC).
///
/// `body` must be a multiple of four bytes.
pub fn rtcp_packet(count: u8, payload_type: u8, ssrc: u32, body: &[u8]) -> Vec<u8> {
    assert_eq!(body.len() % 4, 0, "RTCP body must be word aligned");
    let length_words = (1 + body.len() / 4) as u16;
    let mut packet = vec![0x80 | (count & 0x1F), payload_type];
    packet.extend_from_slice(&length_words.to_be_bytes());
    packet.extend_from_slice(&ssrc.to_be_bytes());
    packet.extend_from_slice(body);
    packet
}

/// One 24-byte report block.
pub fn report_block(
    ssrc: u32,
    fraction_lost: u8,
    cumulative_lost: i32,
    lsr: u32,
    dlsr: u32,
) -> Vec<u8> {
    let mut block = Vec::with_capacity(24);
    block.extend_from_slice(&ssrc.to_be_bytes());
    block.push(fraction_lost);
    block.extend_from_slice(&cumulative_lost.to_be_bytes()[1..]);
    block.extend_from_slice(&1000u32.to_be_bytes()); // extended highest sequence
    block.extend_from_slice(&5u32.to_be_bytes()); // jitter
    block.extend_from_slice(&lsr.to_be_bytes());
    block.extend_from_slice(&dlsr.to_be_bytes());
    block
}

pub fn sender_report(ssrc: u32, ntp_timestamp: u64, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&ntp_timestamp.to_be_bytes());
    body.extend_from_slice(&90_000u32.to_be_bytes()); // RTP timestamp
    body.extend_from_slice(&10u32.to_be_bytes()); // packet count
    body.extend_from_slice(&1200u32.to_be_bytes()); // octet count
    for block in blocks {
        body.extend_from_slice(block);
    }
    rtcp_packet(blocks.len() as u8, RTCP_PT_SR, ssrc, &body)
}

pub fn receiver_report(ssrc: u32, blocks: &[Vec<u8>]) -> Vec<u8> {
    rtcp_packet(blocks.len() as u8, RTCP_PT_RR, ssrc, &blocks.concat())
}

pub fn pli(sender_ssrc: u32, media_ssrc: u32) -> Vec<u8> {
    rtcp_packet(RTCP_FMT_PLI, RTCP_PT_PSFB, sender_ssrc, &media_ssrc.to_be_bytes())
}

/// REMB carrying `mantissa << exponent` bps for `ssrcs`.
pub fn remb(sender_ssrc: u32, exponent: u8, mantissa: u32, ssrcs: &[u32]) -> Vec<u8> {
    let mut body = vec![0, 0, 0, 0]; // media SSRC, unused
    body.extend_from_slice(b"REMB");
    body.push(ssrcs.len() as u8);
    body.push((exponent << 2) | ((mantissa >> 16) & 0x03) as u8);
    body.extend_from_slice(&((mantissa & 0xFFFF) as u16).to_be_bytes());
    for ssrc in ssrcs {
        body.extend_from_slice(&ssrc.to_be_bytes());
    }
    rtcp_packet(RTCP_FMT_ALFB, RTCP_PT_PSFB, sender_ssrc, &body)
}

/// Transport-wide feedback with raw status chunks and delta bytes, zero padded.
pub fn transport_feedback(
    sender_ssrc: u32,
    media_ssrc: u32,
    base_sequence_number: u16,
    packet_status_count: u16,
    reference_ticks: i32,
    chunks: &[u16],
    deltas: &[u8],
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&media_ssrc.to_be_bytes());
    body.extend_from_slice(&base_sequence_number.to_be_bytes());
    body.extend_from_slice(&packet_status_count.to_be_bytes());
    body.extend_from_slice(&reference_ticks.to_be_bytes()[1..]);
    body.push(0); // feedback packet index
    for chunk in chunks {
        body.extend_from_slice(&chunk.to_be_bytes());
    }
    body.extend_from_slice(deltas);
    body.resize(body.len().div_ceil(4) * 4, 0);
    rtcp_packet(RTCP_FMT_TRANSPORT_CC, RTCP_PT_RTPFB, sender_ssrc, &body)
}

/// RTP header with a one-byte extension block holding `(id, data)` elements.
pub fn rtp_header_with_extensions(
    ssrc: u32,
    sequence_number: u16,
    elements: &[(u8, &[u8])],
) -> Vec<u8> {
    let mut block = Vec::new();
    for (id, data) in elements {
        block.push((id << 4) | (data.len() as u8 - 1));
        block.extend_from_slice(data);
    }
    block.resize(block.len().div_ceil(4) * 4, 0);

    let mut header = vec![0x90, 111];
    header.extend_from_slice(&sequence_number.to_be_bytes());
    header.extend_from_slice(&48_000u32.to_be_bytes());
    header.extend_from_slice(&ssrc.to_be_bytes());
    header.extend_from_slice(&0xBEDEu16.to_be_bytes());
    header.extend_from_slice(&((block.len() / 4) as u16).to_be_bytes());
    header.extend_from_slice(&block);
    header
}

/// Serialises a legacy event as one JSON line.
pub fn legacy_line(timestamp_us: i64, event: LegacyEventKind) -> String {
    serde_json::to_string(&LogRecord::Legacy(LegacyEvent { timestamp_us, event }))
        .expect("legacy event serialises")
}

pub fn legacy_rtcp_line(timestamp_us: i64, incoming: bool, packet_data: Vec<u8>) -> String {
    legacy_line(
        timestamp_us,
        LegacyEventKind::RtcpPacket {
            incoming,
            packet_data,
        },
    )
}
