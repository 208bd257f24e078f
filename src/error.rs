//! Error types for event-log decoding and telemetry reconstruction.
//!
//! Core decoders (bit cursor, varint, delta and blob series, RTCP, RTP) all fail
//! with [`DecodeError`]. Higher layers that deal with whole log records wrap it in
//! [`RtcLogError`]. The `thiserror` crate is used for the error definitions.

use std::fmt;

use thiserror::Error;

/// Identifies the structure being read when a length check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseContext {
    BlobLengths,
    BlobPayload,
    RtcpCommonHeader,
    RtcpPacket,
    RtcpReportBlocks,
    RtcpSenderInfo,
    PictureLossIndication,
    Remb,
    RembSsrcList,
    TransportFeedbackHeader,
    TransportFeedbackChunks,
    TransportFeedbackDeltas,
    RtpFixedHeader,
    RtpCsrcList,
    RtpExtensionHeader,
    RtpExtensionElement,
}

impl fmt::Display for ParseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BlobLengths => "blob length table",
            Self::BlobPayload => "blob payload",
            Self::RtcpCommonHeader => "RTCP common header",
            Self::RtcpPacket => "RTCP packet",
            Self::RtcpReportBlocks => "RTCP report blocks",
            Self::RtcpSenderInfo => "RTCP sender info",
            Self::PictureLossIndication => "RTCP PLI",
            Self::Remb => "RTCP REMB",
            Self::RembSsrcList => "RTCP REMB SSRC list",
            Self::TransportFeedbackHeader => "transport-cc header",
            Self::TransportFeedbackChunks => "transport-cc status chunks",
            Self::TransportFeedbackDeltas => "transport-cc receive deltas",
            Self::RtpFixedHeader => "RTP fixed header",
            Self::RtpCsrcList => "RTP CSRC list",
            Self::RtpExtensionHeader => "RTP extension header",
            Self::RtpExtensionElement => "RTP extension element",
        };
        f.write_str(name)
    }
}

/// Header or payload field named in validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    DeltaWidthBits,
    ValuesOptional,
    RtcpVersion,
    RtpVersion,
    RtpExtensionBit,
    RembBitrate,
    TwccStatusSymbol,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeltaWidthBits => "delta width",
            Self::ValuesOptional => "optional-values flag",
            Self::RtcpVersion => "RTCP version",
            Self::RtpVersion => "RTP version",
            Self::RtpExtensionBit => "RTP extension bit",
            Self::RembBitrate => "REMB bitrate",
            Self::TwccStatusSymbol => "transport-cc status symbol",
        };
        f.write_str(name)
    }
}

/// Errors raised by the binary decoders.
///
/// Every decoder fails fast: a structurally malformed buffer is reported to the
/// immediate caller and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bit cursor does not hold enough unread bits.
    #[error("Bit cursor exhausted: requested {requested_bits} bits, {remaining_bits} remaining")]
    OutOfBounds {
        requested_bits: usize,
        remaining_bits: usize,
    },

    /// A read was requested with a width outside `1..=64`.
    #[error("Invalid bit width {bits}: must be between 1 and 64")]
    InvalidBitWidth { bits: u8 },

    /// Unknown delta-encoding type tag.
    #[error("Unsupported delta encoding type: {encoding_type}")]
    UnsupportedEncoding { encoding_type: u64 },

    /// A varint kept its continuation bit set for the maximum number of groups.
    #[error(
        "Varint did not terminate within {max_bytes} bytes",
        max_bytes = crate::constants::VARINT_MAX_BYTES
    )]
    VarintTooLong,

    /// A declared length or count exceeds the available bytes.
    #[error("Truncated data: needed {needed} bytes, got {got} for {context}")]
    Truncated {
        needed: usize,
        got: usize,
        context: ParseContext,
    },

    /// The number of report blocks present differs from the declared count.
    #[error("Report block count mismatch: declared {declared}, found {found}")]
    BlockCountMismatch { declared: u8, found: usize },

    /// A header field holds a value the decoder cannot accept.
    #[error("Invalid header: {field} expected {expected}, got {got}")]
    InvalidHeader { field: Field, expected: u64, got: u64 },

    /// A payload field holds a reserved or unrepresentable value.
    #[error("Invalid value {value} for {field}")]
    InvalidFieldValue { field: Field, value: u64 },
}

/// Crate-level error for record handling and I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RtcLogError {
    /// A core decoder rejected one of the record's buffers.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A record was structurally inconsistent (e.g. missing a required column).
    #[error("Invalid log record: {reason}")]
    InvalidRecord { reason: String },

    /// Reading input or writing an artifact failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A record line could not be parsed.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<std::io::Error> for RtcLogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RtcLogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
