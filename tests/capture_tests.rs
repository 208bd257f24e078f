//! Integration tests for the synthetic packet capture.

mod common;

use std::net::Ipv4Addr;

use common::{pli, rtp_header_with_extensions};
use rtclog::event_log::{EventKind, TelemetryEvent};
use rtclog::pcap::internet_checksum;
use rtclog::{AnalyzerConfig, CaptureEndpoints, Direction, PcapWriter, TelemetryAnalyzer};

fn u32_at(file: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([file[offset], file[offset + 1], file[offset + 2], file[offset + 3]])
}

#[test]
fn inbound_rtcp_record_layout() {
    let payload = [0x5Au8; 28];
    let mut writer = PcapWriter::new();
    writer.write(&payload, Direction::Inbound, payload.len(), 1_000_000);
    let file = writer.save();

    assert_eq!(file.len(), 24 + 16 + 70);
    assert_eq!(u32_at(&file, 0), 0xA1B2_C3D4);
    assert_eq!(u32_at(&file, 16), 256 * 1024);
    assert_eq!(u32_at(&file, 20), 1);

    // Record header.
    assert_eq!(u32_at(&file, 24), 1);
    assert_eq!(u32_at(&file, 28), 0);
    assert_eq!(u32_at(&file, 32), 70);
    assert_eq!(u32_at(&file, 36), 70);

    let ip = &file[40 + 14..40 + 34];
    assert_eq!(u16::from_be_bytes([ip[2], ip[3]]), 56);
    assert_eq!(internet_checksum(ip), 0);
    assert_eq!(&file[40 + 42..], &payload[..]);
}

#[test]
fn custom_endpoints_are_used() {
    let endpoints = CaptureEndpoints {
        local_ip: Ipv4Addr::new(192, 168, 1, 10),
        remote_ip: Ipv4Addr::new(203, 0, 113, 7),
        local_port: 50_000,
        remote_port: 3478,
        ..CaptureEndpoints::default()
    };
    let mut writer = PcapWriter::with_endpoints(endpoints);
    writer.write(&[0; 4], Direction::Outbound, 4, 0);
    let file = writer.save();
    let frame = &file[40..];
    assert_eq!(&frame[26..30], &[192, 168, 1, 10]);
    assert_eq!(&frame[30..34], &[203, 0, 113, 7]);
    assert_eq!(u16::from_be_bytes([frame[34], frame[35]]), 50_000);
    assert_eq!(u16::from_be_bytes([frame[36], frame[37]]), 3478);
}

#[test]
fn analyzer_captures_header_only_rtp_with_wire_length() {
    let header = rtp_header_with_extensions(0xABCD, 7, &[(1, &[0x10][..]), (3, &[1, 2, 3][..])]);
    let header_length = header.len();
    let config = AnalyzerConfig {
        absolute_start_time_us: 1_600_000_000_000_000,
        ..AnalyzerConfig::default()
    };
    let mut analyzer = TelemetryAnalyzer::new(config);
    analyzer.process_all(&[
        TelemetryEvent {
            timestamp_us: 50_000,
            kind: EventKind::RtpPacket {
                direction: Direction::Outbound,
                header: header.clone(),
                header_length,
                packet_length: 1200,
            },
        },
        TelemetryEvent {
            timestamp_us: 2_550_000,
            kind: EventKind::RtcpPacket {
                direction: Direction::Inbound,
                data: pli(1, 0xABCD),
            },
        },
    ]);
    let (report, file) = analyzer.finish();
    assert_eq!(report.summary.capture_records, 2);

    let first = 24;
    assert_eq!(u32_at(&file, first), 1_600_000_000);
    assert_eq!(u32_at(&file, first + 4), 0);
    assert_eq!(u32_at(&file, first + 8) as usize, header_length + 42);
    assert_eq!(u32_at(&file, first + 12), 1242);

    let second = first + 16 + 42 + header_length;
    assert_eq!(u32_at(&file, second), 1_600_000_002);
    assert_eq!(u32_at(&file, second + 4), 500_000);
    assert_eq!(u32_at(&file, second + 8), 12 + 42);
    assert_eq!(file.len(), second + 16 + 42 + 12);

    let extensions = &report.header_extensions[&Direction::Outbound];
    assert_eq!(extensions.get(&1), Some(&1));
    assert_eq!(extensions.get(&3), Some(&1));
}
