//! Payload-specific feedback: picture loss indication and REMB.

use serde::Serialize;

use crate::constants::{PLI_LENGTH_BYTES, REMB_IDENTIFIER, REMB_MIN_LENGTH_BYTES};
use crate::error::{DecodeError, Field, ParseContext};
use crate::rtcp::read_u32;
use crate::types::Ssrc;

/// Picture loss indication (PSFB, FMT 1). Carries no FCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PictureLossIndication {
    pub sender_ssrc: Ssrc,
    pub media_ssrc: Ssrc,
}

impl PictureLossIndication {
    pub fn parse(packet: &[u8]) -> Result<Self, DecodeError> {
        if packet.len() < PLI_LENGTH_BYTES {
            return Err(DecodeError::Truncated {
                needed: PLI_LENGTH_BYTES,
                got: packet.len(),
                context: ParseContext::PictureLossIndication,
            });
        }
        Ok(Self {
            sender_ssrc: Ssrc::new(read_u32(packet, 4)),
            media_ssrc: Ssrc::new(read_u32(packet, 8)),
        })
    }
}

/// Receiver estimated maximum bitrate (PSFB, FMT 15, "REMB" tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Remb {
    pub sender_ssrc: Ssrc,
    pub bitrate_bps: u64,
    /// Media sources the estimate applies to.
    pub ssrcs: Vec<Ssrc>,
}

impl Remb {
    /// Parses an application-layer feedback packet as REMB.
    ///
    /// Returns `Ok(None)` when the packet carries a different application-layer
    /// message (no "REMB" tag at byte 12).
    ///
    /// # Errors
    /// - [`DecodeError::Truncated`] - tagged packet too short for the bitrate or SSRC list
    /// - [`DecodeError::InvalidFieldValue`] - mantissa and exponent overflow 64 bits
    pub fn parse(packet: &[u8]) -> Result<Option<Self>, DecodeError> {
        if packet.len() < 16 || read_u32(packet, 12) != REMB_IDENTIFIER {
            return Ok(None);
        }
        if packet.len() < REMB_MIN_LENGTH_BYTES {
            return Err(DecodeError::Truncated {
                needed: REMB_MIN_LENGTH_BYTES,
                got: packet.len(),
                context: ParseContext::Remb,
            });
        }

        let num_ssrcs = usize::from(packet[16]);
        let exponent = u32::from(packet[17] >> 2);
        let mantissa = u64::from(read_u32(packet, 16) & 0x0003_FFFF);
        if mantissa != 0 && mantissa.leading_zeros() < exponent {
            return Err(DecodeError::InvalidFieldValue {
                field: Field::RembBitrate,
                value: u64::from(exponent),
            });
        }
        let bitrate_bps = if mantissa == 0 { 0 } else { mantissa << exponent };

        let needed = REMB_MIN_LENGTH_BYTES + 4 * num_ssrcs;
        if packet.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                got: packet.len(),
                context: ParseContext::RembSsrcList,
            });
        }
        let ssrcs = (0..num_ssrcs)
            .map(|i| Ssrc::new(read_u32(packet, REMB_MIN_LENGTH_BYTES + 4 * i)))
            .collect();

        Ok(Some(Self {
            sender_ssrc: Ssrc::new(read_u32(packet, 4)),
            bitrate_bps,
            ssrcs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{RTCP_FMT_ALFB, RTCP_PT_PSFB};

    fn remb(exponent: u8, mantissa: u32, ssrcs: &[u32]) -> Vec<u8> {
        let words = (4 + ssrcs.len()) as u16;
        let mut packet = vec![0x80 | RTCP_FMT_ALFB, RTCP_PT_PSFB];
        packet.extend_from_slice(&words.to_be_bytes());
        packet.extend_from_slice(&0x0102_0304u32.to_be_bytes());
        packet.extend_from_slice(&0u32.to_be_bytes());
        packet.extend_from_slice(b"REMB");
        let field = (u32::from(ssrcs.len() as u8) << 24)
            | (u32::from(exponent) << 18)
            | (mantissa & 0x3_FFFF);
        packet.extend_from_slice(&field.to_be_bytes());
        for ssrc in ssrcs {
            packet.extend_from_slice(&ssrc.to_be_bytes());
        }
        packet
    }

    #[test]
    fn parses_pli() {
        let packet = [0x81, 206, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2];
        let pli = PictureLossIndication::parse(&packet).unwrap();
        assert_eq!(pli.sender_ssrc, 1);
        assert_eq!(pli.media_ssrc, 2);
    }

    #[test]
    fn short_pli_is_truncated() {
        assert!(matches!(
            PictureLossIndication::parse(&[0x81, 206, 0, 1, 0, 0, 0, 1]),
            Err(DecodeError::Truncated { needed: 12, got: 8, .. })
        ));
    }

    #[test]
    fn parses_remb_bitrate_and_ssrcs() {
        let packet = remb(3, 150_000, &[0xAABB_CCDD, 7]);
        let remb = Remb::parse(&packet).unwrap().unwrap();
        assert_eq!(remb.sender_ssrc, 0x0102_0304);
        assert_eq!(remb.bitrate_bps, 1_200_000);
        assert_eq!(remb.ssrcs, vec![Ssrc::new(0xAABB_CCDD), Ssrc::new(7)]);
    }

    #[test]
    fn max_mantissa_and_exponent_without_overflow() {
        let packet = remb(46, 0x3_FFFF, &[]);
        let remb = Remb::parse(&packet).unwrap().unwrap();
        assert_eq!(remb.bitrate_bps, 0x3_FFFFu64 << 46);
    }

    #[test]
    fn overflowing_bitrate_is_rejected() {
        let packet = remb(47, 0x3_FFFF, &[]);
        assert_eq!(
            Remb::parse(&packet),
            Err(DecodeError::InvalidFieldValue {
                field: Field::RembBitrate,
                value: 47,
            })
        );
    }

    #[test]
    fn other_application_feedback_is_not_remb() {
        let mut packet = remb(0, 1, &[]);
        packet[12..16].copy_from_slice(b"GOOG");
        assert_eq!(Remb::parse(&packet), Ok(None));
    }

    #[test]
    fn missing_ssrc_list_is_truncated() {
        let mut packet = remb(0, 1, &[1]);
        packet.truncate(20);
        assert!(matches!(
            Remb::parse(&packet),
            Err(DecodeError::Truncated {
                context: ParseContext::RembSsrcList,
                ..
            })
        ));
    }
}
