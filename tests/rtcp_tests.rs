//! Integration tests for compound RTCP walking, typed decoders and RTT derivation.

mod common;

use common::{
    pli, receiver_report, remb, report_block, rtcp_packet, sender_report, transport_feedback,
};
use rtclog::constants::{RTCP_PT_PSFB, RTCP_PT_RR, RTCP_PT_SDES, RTCP_PT_SR};
use rtclog::event_log::{EventKind, TelemetryEvent};
use rtclog::rtcp::{
    PacketStatus, ReceiverReport, Remb, RtcpFilter, RtcpPacketIter, SenderReport,
    TransportFeedback, for_each_packet,
};
use rtclog::{AnalyzerConfig, DecodeError, Direction, ParseContext, Ssrc, TelemetryAnalyzer};

fn compound(packets: &[Vec<u8>]) -> Vec<u8> {
    packets.concat()
}

#[test]
fn compound_walk_yields_packets_in_order() {
    let sr = sender_report(
        0x1111,
        0x0102_0304_0506_0708,
        &[report_block(0xA, 25, 3, 0, 0), report_block(0xB, 0, 0, 0, 0)],
    );
    let rr = receiver_report(0x2222, &[report_block(0xC, 128, -1, 0, 0)]);
    let data = compound(&[sr.clone(), rr.clone()]);

    let packets: Vec<_> = RtcpPacketIter::new(&data)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].header.payload_type, RTCP_PT_SR);
    assert_eq!(packets[0].data, &sr[..]);
    assert_eq!(packets[1].header.payload_type, RTCP_PT_RR);
    assert_eq!(packets[1].data, &rr[..]);
    assert_eq!(
        packets.iter().map(|p| p.data.len()).sum::<usize>(),
        data.len()
    );

    let sr = SenderReport::parse(packets[0].data).unwrap();
    assert_eq!(sr.ssrc, Ssrc::new(0x1111));
    assert_eq!(sr.sender_info.ntp_timestamp, 0x0102_0304_0506_0708);
    assert_eq!(sr.report_blocks.len(), 2);
    assert_eq!(sr.report_blocks[0].fraction_lost, 9); // 25 * 100 / 256
    assert_eq!(sr.report_blocks[0].cumulative_lost, 3);

    let rr = ReceiverReport::parse(packets[1].data).unwrap();
    assert_eq!(rr.report_blocks[0].fraction_lost, 50);
    assert_eq!(rr.report_blocks[0].cumulative_lost, -1);
}

#[test]
fn filters_dispatch_by_type_and_format() {
    let sdes = rtcp_packet(1, RTCP_PT_SDES, 0x3333, &[0, 0, 0, 0]);
    let data = compound(&[
        receiver_report(0x2222, &[]),
        sdes,
        pli(0x2222, 0x4444),
        remb(0x2222, 2, 1000, &[0x4444]),
    ]);

    let mut psfb_packets = 0;
    let mut rembs = Vec::new();
    let mut all = 0;
    let count = {
        let mut filters = [
            RtcpFilter::new(|_, _| psfb_packets += 1).payload_type(RTCP_PT_PSFB),
            RtcpFilter::new(|_, packet| rembs.push(Remb::parse(packet)))
                .payload_type(RTCP_PT_PSFB)
                .feedback_message_type(15),
            RtcpFilter::new(|_, _| all += 1),
        ];
        for_each_packet(&data, &mut filters).unwrap()
    };

    assert_eq!(count, 4);
    assert_eq!(all, 4);
    assert_eq!(psfb_packets, 2);
    assert_eq!(rembs.len(), 1);
    let remb = rembs.remove(0).unwrap().unwrap();
    assert_eq!(remb.bitrate_bps, 4000);
    assert_eq!(remb.ssrcs, vec![Ssrc::new(0x4444)]);
}

#[test]
fn corrupted_length_stops_walk() {
    let mut data = compound(&[pli(1, 2), pli(3, 4), pli(5, 6)]);
    // Second packet claims 16 words.
    data[12 + 3] = 16;

    let mut seen = Vec::new();
    let result = {
        let mut filters = [RtcpFilter::new(|header, _| seen.push(header.ssrc))];
        for_each_packet(&data, &mut filters)
    };
    assert_eq!(seen, vec![Ssrc::new(1)]);
    assert!(matches!(
        result,
        Err(DecodeError::Truncated {
            context: ParseContext::RtcpPacket,
            ..
        })
    ));
}

#[test]
fn short_report_count_is_block_count_mismatch() {
    let mut rr = receiver_report(0x2222, &[report_block(0xC, 0, 0, 0, 0)]);
    rr[0] = 0x80 | 2;
    assert_eq!(
        ReceiverReport::parse(&rr),
        Err(DecodeError::BlockCountMismatch {
            declared: 2,
            found: 1
        })
    );
}

#[test]
fn transport_feedback_vector_then_run() {
    // 14 received (one-bit vector), then a run of 6 small deltas.
    let deltas = [4u8; 20];
    let packet = transport_feedback(0x5555, 0x6666, 100, 20, 10, &[0xBFFF, 0x2006], &deltas);

    let feedback = TransportFeedback::parse(&packet).unwrap();
    assert_eq!(feedback.packets.len(), 20);
    assert_eq!(feedback.received_count(), 20);
    assert!(feedback
        .packets
        .iter()
        .all(|p| p.status == PacketStatus::ReceivedSmallDelta && p.delta_us == Some(1000)));
    assert_eq!(feedback.packets[19].sequence_number.value(), 119);
    assert_eq!(feedback.reference_time_ms, 640);

    let times = feedback.receive_times_us();
    assert_eq!(times.first().map(|t| t.1), Some(641_000));
    assert_eq!(times.last().map(|t| t.1), Some(660_000));
}

#[test]
fn transport_feedback_missing_deltas_is_truncated() {
    let packet = transport_feedback(0x5555, 0x6666, 0, 20, 0, &[0xBFFF, 0x2006], &[4u8; 4]);
    assert!(matches!(
        TransportFeedback::parse(&packet),
        Err(DecodeError::Truncated {
            context: ParseContext::TransportFeedbackDeltas,
            ..
        })
    ));
}

fn rtcp_event(timestamp_us: i64, direction: Direction, data: Vec<u8>) -> TelemetryEvent {
    TelemetryEvent {
        timestamp_us,
        kind: EventKind::RtcpPacket { direction, data },
    }
}

#[test]
fn rtt_from_outbound_sr_and_inbound_rr() {
    let ntp = 0x0001_0002_0003_0000u64;
    let lsr = (ntp >> 16) as u32;
    // DLSR of half a second.
    let dlsr = 32_768;

    let mut analyzer = TelemetryAnalyzer::new(AnalyzerConfig::default());
    analyzer.process_all(&[
        rtcp_event(1_000_000, Direction::Outbound, sender_report(0x1111, ntp, &[])),
        rtcp_event(
            1_600_000,
            Direction::Inbound,
            receiver_report(0x2222, &[report_block(0x1111, 0, 0, lsr, dlsr)]),
        ),
        // Echo of an SR that was never sent.
        rtcp_event(
            1_700_000,
            Direction::Inbound,
            receiver_report(0x2222, &[report_block(0x1111, 0, 0, lsr + 1, dlsr)]),
        ),
    ]);

    let report = analyzer.report();
    let rtt = &report.rtt[&Ssrc::new(0x1111)];
    assert_eq!(rtt.len(), 1);
    assert_eq!(rtt[0].time_ms, 600.0);
    assert_eq!(rtt[0].value, 100.0);
    assert_eq!(report.report_block_loss[&Ssrc::new(0x1111)].len(), 2);
}

#[test]
fn malformed_packets_are_counted_not_fatal() {
    let mut truncated_rr = receiver_report(0x2222, &[report_block(0xC, 0, 0, 0, 0)]);
    truncated_rr[0] = 0x80 | 2;
    let data = compound(&[truncated_rr, pli(1, 2)]);

    let mut analyzer = TelemetryAnalyzer::new(AnalyzerConfig::default());
    analyzer.process(&rtcp_event(0, Direction::Inbound, data));
    let (report, _) = analyzer.finish();
    assert_eq!(report.summary.rtcp_decode_failures, 1);
    assert_eq!(report.summary.rtcp_walk_failures, 0);
    assert_eq!(report.picture_loss_indications.len(), 1);
    assert_eq!(report.picture_loss_indications[0].direction, Direction::Inbound);
}
