//! RTP fixed header parsing and one-byte header extension walking.

use serde::Serialize;
use tracing::debug;

use crate::constants::{
    RTP_EXTENSION_PREAMBLE_LENGTH_BYTES, RTP_FIXED_HEADER_LENGTH_BYTES,
    RTP_ONE_BYTE_EXTENSION_PROFILE, RTP_VERSION,
};
use crate::error::{DecodeError, Field, ParseContext};
use crate::types::{RtpTimestamp, SequenceNumber, Ssrc};

/// Parsed RTP fixed header plus the location of the extension block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: SequenceNumber,
    pub timestamp: RtpTimestamp,
    pub ssrc: Ssrc,
    pub csrcs: Vec<Ssrc>,
    /// Extension profile (`0xBEDE` for one-byte extensions), if present.
    pub extension_profile: Option<u16>,
    /// Header length including CSRCs and the extension block.
    pub header_length_bytes: usize,
}

impl RtpHeader {
    /// Parses the header at the start of `data`.
    ///
    /// # Errors
    /// - [`DecodeError::Truncated`] - fixed header, CSRC list or extension block too short
    /// - [`DecodeError::InvalidHeader`] - version is not 2
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < RTP_FIXED_HEADER_LENGTH_BYTES {
            return Err(DecodeError::Truncated {
                needed: RTP_FIXED_HEADER_LENGTH_BYTES,
                got: data.len(),
                context: ParseContext::RtpFixedHeader,
            });
        }
        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(DecodeError::InvalidHeader {
                field: Field::RtpVersion,
                expected: u64::from(RTP_VERSION),
                got: u64::from(version),
            });
        }
        let padding = (data[0] >> 5) & 0x01 == 1;
        let extension = (data[0] >> 4) & 0x01 == 1;
        let csrc_count = data[0] & 0x0F;
        let marker = (data[1] >> 7) & 0x01 == 1;
        let payload_type = data[1] & 0x7F;
        let sequence_number = SequenceNumber::new(u16::from_be_bytes([data[2], data[3]]));
        let timestamp = RtpTimestamp::new(u32::from_be_bytes([data[4], data[5], data[6], data[7]]));
        let ssrc = Ssrc::new(u32::from_be_bytes([data[8], data[9], data[10], data[11]]));

        let base_length = csrc_header_length(csrc_count);
        if data.len() < base_length {
            return Err(DecodeError::Truncated {
                needed: base_length,
                got: data.len(),
                context: ParseContext::RtpCsrcList,
            });
        }
        let csrcs = data[RTP_FIXED_HEADER_LENGTH_BYTES..base_length]
            .chunks_exact(4)
            .map(|c| Ssrc::new(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect();

        let (extension_profile, header_length_bytes) = if extension {
            let (profile, end) = extension_region(data, base_length)?;
            (Some(profile), end)
        } else {
            (None, base_length)
        };

        Ok(Self {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
            extension_profile,
            header_length_bytes,
        })
    }
}

#[inline]
fn csrc_header_length(csrc_count: u8) -> usize {
    RTP_FIXED_HEADER_LENGTH_BYTES + 4 * usize::from(csrc_count)
}

/// Returns the extension profile and the end offset of the extension block.
fn extension_region(data: &[u8], base_length: usize) -> Result<(u16, usize), DecodeError> {
    let preamble_end = base_length + RTP_EXTENSION_PREAMBLE_LENGTH_BYTES;
    if data.len() < preamble_end {
        return Err(DecodeError::Truncated {
            needed: preamble_end,
            got: data.len(),
            context: ParseContext::RtpExtensionHeader,
        });
    }
    let profile = u16::from_be_bytes([data[base_length], data[base_length + 1]]);
    let length_words = u16::from_be_bytes([data[base_length + 2], data[base_length + 3]]);
    let end = preamble_end + 4 * usize::from(length_words);
    if data.len() < end {
        return Err(DecodeError::Truncated {
            needed: end,
            got: data.len(),
            context: ParseContext::RtpExtensionHeader,
        });
    }
    Ok((profile, end))
}

/// Handler receiving an extension id and its payload bytes.
pub type ExtensionHandler<'f> = Box<dyn FnMut(u8, &[u8]) + 'f>;

/// An extension-id predicate paired with a handler. No id matches every extension.
pub struct ExtensionFilter<'f> {
    id: Option<u8>,
    handler: ExtensionHandler<'f>,
}

impl<'f> ExtensionFilter<'f> {
    /// Creates a filter matching every extension.
    pub fn any(handler: impl FnMut(u8, &[u8]) + 'f) -> Self {
        Self {
            id: None,
            handler: Box::new(handler),
        }
    }

    /// Creates a filter for a single extension id.
    pub fn with_id(id: u8, handler: impl FnMut(u8, &[u8]) + 'f) -> Self {
        Self {
            id: Some(id),
            handler: Box::new(handler),
        }
    }

    #[inline]
    pub fn matches(&self, id: u8) -> bool {
        self.id.is_none_or(|wanted| wanted == id)
    }
}

impl std::fmt::Debug for ExtensionFilter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionFilter")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Walks the one-byte header extensions of `packet`, offering each to the matching filters.
///
/// Each element is `id (4) | length - 1 (4)` followed by `length` bytes. An id of
/// 0 ends the walk. Returns the number of extensions visited.
///
/// Only the one-byte profile (`0xBEDE`) is walked. Any other profile, including
/// two-byte elements (`0x100x`), returns `Ok(0)` rather than being misread as
/// one-byte elements, so extension ids are never counted from foreign layouts.
///
/// # Errors
/// - [`DecodeError::InvalidHeader`] - version is not 2 or the extension bit is clear
/// - [`DecodeError::Truncated`] - the extension block or an element overruns the packet
pub fn for_each_extension(
    packet: &[u8],
    filters: &mut [ExtensionFilter<'_>],
) -> Result<usize, DecodeError> {
    if packet.len() < RTP_FIXED_HEADER_LENGTH_BYTES {
        return Err(DecodeError::Truncated {
            needed: RTP_FIXED_HEADER_LENGTH_BYTES,
            got: packet.len(),
            context: ParseContext::RtpFixedHeader,
        });
    }
    let version = packet[0] >> 6;
    if version != RTP_VERSION {
        return Err(DecodeError::InvalidHeader {
            field: Field::RtpVersion,
            expected: u64::from(RTP_VERSION),
            got: u64::from(version),
        });
    }
    if (packet[0] >> 4) & 0x01 == 0 {
        return Err(DecodeError::InvalidHeader {
            field: Field::RtpExtensionBit,
            expected: 1,
            got: 0,
        });
    }

    let base_length = csrc_header_length(packet[0] & 0x0F);
    let (profile, end) = extension_region(packet, base_length)?;
    if profile != RTP_ONE_BYTE_EXTENSION_PROFILE {
        debug!(profile, "Skipping header extensions with unsupported profile");
        return Ok(0);
    }

    let mut offset = base_length + RTP_EXTENSION_PREAMBLE_LENGTH_BYTES;
    let mut visited = 0;
    while offset < end {
        let element = packet[offset];
        let id = element >> 4;
        if id == 0 {
            break;
        }
        let length = usize::from(element & 0x0F) + 1;
        let data_end = offset + 1 + length;
        if data_end > end {
            return Err(DecodeError::Truncated {
                needed: data_end,
                got: end,
                context: ParseContext::RtpExtensionElement,
            });
        }
        let data = &packet[offset + 1..data_end];
        for filter in filters.iter_mut() {
            if filter.matches(id) {
                (filter.handler)(id, data);
            }
        }
        visited += 1;
        offset = data_end;
    }
    Ok(visited)
}
