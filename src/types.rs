//! Core type definitions shared by the parsers and the analyzer.
//!
//! Zero-cost newtypes keep SSRCs, sequence numbers and RTP timestamps from being
//! mixed up. All newtypes use `#[repr(transparent)]` and serialize as their inner value.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Generates a transparent newtype with conversions, display prefix and wrapping math.
macro_rules! rtc_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty) => $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Creates a new instance
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Raw value
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }

            /// Wrapping addition
            #[inline]
            pub const fn wrapping_add(self, rhs: $inner) -> Self {
                Self(self.0.wrapping_add(rhs))
            }

            /// Big-endian wire representation
            #[inline]
            pub const fn to_be_bytes(self) -> [u8; std::mem::size_of::<$inner>()] {
                self.0.to_be_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for $inner {
            #[inline]
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }
    };
}

rtc_newtype!(
    /// RTP/RTCP synchronization source identifier.
    Ssrc(u32) => "ssrc="
);

rtc_newtype!(
    /// 16-bit RTP or transport-wide sequence number.
    SequenceNumber(u16) => "seq="
);

rtc_newtype!(
    /// RTP media timestamp.
    RtpTimestamp(u32) => "ts="
);

/// Direction of a logged packet relative to the local endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from the remote peer.
    Inbound,
    /// Sent to the remote peer.
    Outbound,
}

impl Direction {
    /// Maps the log's `incoming` flag to a direction.
    #[inline]
    pub const fn from_incoming(incoming: bool) -> Self {
        if incoming { Self::Inbound } else { Self::Outbound }
    }

    /// Whether packets in this direction were received locally.
    #[inline]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::Inbound)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssrc_usage() {
        let ssrc = Ssrc::new(0x12345678);
        assert_eq!(ssrc, 0x12345678);
        assert_eq!(format!("{}", ssrc), "ssrc=305419896");
        assert_eq!(ssrc.to_be_bytes(), [0x12, 0x34, 0x56, 0x78]);

        let ssrc2: Ssrc = 0x12345679u32.into();
        assert!(ssrc2 > ssrc);
    }

    #[test]
    fn sequence_number_wrapping() {
        let sn = SequenceNumber::new(65534);
        assert_eq!(sn.wrapping_add(3), 1);
        assert_eq!(sn.to_be_bytes(), [0xFF, 0xFE]);
    }

    #[test]
    fn newtypes_serialize_transparently() {
        let json = serde_json::to_string(&Ssrc::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: RtpTimestamp = serde_json::from_str("90000").unwrap();
        assert_eq!(back, 90000);
    }

    #[test]
    fn direction_from_incoming_flag() {
        assert_eq!(Direction::from_incoming(true), Direction::Inbound);
        assert_eq!(Direction::from_incoming(false), Direction::Outbound);
        assert!(Direction::Inbound.is_inbound());
        assert_eq!(Direction::Outbound.to_string(), "outbound");
    }

    #[test]
    fn zero_cost_verification() {
        assert_eq!(std::mem::size_of::<Ssrc>(), std::mem::size_of::<u32>());
        assert_eq!(
            std::mem::size_of::<SequenceNumber>(),
            std::mem::size_of::<u16>()
        );
        assert_eq!(
            std::mem::size_of::<RtpTimestamp>(),
            std::mem::size_of::<u32>()
        );
    }
}
