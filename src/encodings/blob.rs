//! Variable-length blob columns.
//!
//! Layout: `N` varint lengths, followed by the `N` blobs back to back with no
//! padding between them. Decoding borrows the blobs from the input buffer.

use crate::bitstream::{BitCursor, BitWriter};
use crate::encodings::varint::{decode_varint, write_varint};
use crate::error::{DecodeError, ParseContext};

/// Splits `input` into `num_blobs` consecutive byte ranges.
///
/// Bytes after the last blob are ignored.
///
/// # Errors
/// - [`DecodeError::Truncated`] - the length table or the blobs run past the buffer
/// - [`DecodeError::VarintTooLong`] - a length never terminates
pub fn decode_blobs(input: &[u8], num_blobs: usize) -> Result<Vec<&[u8]>, DecodeError> {
    if num_blobs == 0 {
        return Ok(Vec::new());
    }

    // Every length takes at least one byte.
    if num_blobs > input.len() {
        return Err(DecodeError::Truncated {
            needed: num_blobs,
            got: input.len(),
            context: ParseContext::BlobLengths,
        });
    }

    let mut cursor = BitCursor::new(input);
    let mut lengths = Vec::with_capacity(num_blobs);
    for _ in 0..num_blobs {
        let length = decode_varint(&mut cursor).map_err(|err| match err {
            DecodeError::OutOfBounds { .. } => DecodeError::Truncated {
                needed: input.len() + 1,
                got: input.len(),
                context: ParseContext::BlobLengths,
            },
            other => other,
        })?;
        lengths.push(length);
    }

    // Varint groups are whole bytes, so the cursor is byte aligned here.
    let payload = cursor.remaining_bytes();
    let total = lengths
        .iter()
        .try_fold(0u64, |sum, &length| sum.checked_add(length))
        .and_then(|total| usize::try_from(total).ok())
        .unwrap_or(usize::MAX);
    if total > payload.len() {
        return Err(DecodeError::Truncated {
            needed: total,
            got: payload.len(),
            context: ParseContext::BlobPayload,
        });
    }

    let mut blobs = Vec::with_capacity(num_blobs);
    let mut offset = 0usize;
    for length in lengths {
        // Bounded by `total`, which fits in usize.
        let length = length as usize;
        blobs.push(&payload[offset..offset + length]);
        offset += length;
    }
    Ok(blobs)
}

/// Encodes `blobs` as a length table followed by the concatenated payloads.
pub fn encode_blobs<B: AsRef<[u8]>>(blobs: &[B]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for blob in blobs {
        write_varint(&mut writer, blob.as_ref().len() as u64);
    }
    let mut encoded = writer.finish();
    for blob in blobs {
        encoded.extend_from_slice(blob.as_ref());
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_consecutive_blobs() {
        let input = [0x02, 0x00, 0x03, 0xAA, 0xBB, 0x01, 0x02, 0x03];
        let blobs = decode_blobs(&input, 3).unwrap();
        assert_eq!(blobs, vec![&[0xAA, 0xBB][..], &[][..], &[0x01, 0x02, 0x03][..]]);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let input = [0x01, 0x7F, 0xEE];
        assert_eq!(decode_blobs(&input, 1).unwrap(), vec![&[0x7F][..]]);
    }

    #[test]
    fn zero_blobs_is_empty() {
        assert!(decode_blobs(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn lengths_exceeding_buffer_are_truncated() {
        let input = [0x02, 0x02, 0xAA, 0xBB, 0xCC];
        assert_eq!(
            decode_blobs(&input, 2),
            Err(DecodeError::Truncated {
                needed: 4,
                got: 3,
                context: ParseContext::BlobPayload,
            })
        );
    }

    #[test]
    fn missing_length_table_is_truncated() {
        let input = [0x01];
        assert!(matches!(
            decode_blobs(&input, 2),
            Err(DecodeError::Truncated {
                context: ParseContext::BlobLengths,
                ..
            })
        ));
    }

    #[test]
    fn blob_count_beyond_buffer_is_truncated() {
        assert_eq!(
            decode_blobs(&[0x01, 0xAA], u32::MAX as usize),
            Err(DecodeError::Truncated {
                needed: u32::MAX as usize,
                got: 2,
                context: ParseContext::BlobLengths,
            })
        );
    }

    #[test]
    fn huge_declared_length_is_truncated() {
        let mut input = crate::encodings::varint::encode_varint(u64::MAX);
        input.push(0x00);
        assert!(matches!(
            decode_blobs(&input, 1),
            Err(DecodeError::Truncated {
                context: ParseContext::BlobPayload,
                ..
            })
        ));
    }

    #[test]
    fn encode_matches_decoder_layout() {
        let blobs: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![], vec![0xFF; 200]];
        let encoded = encode_blobs(&blobs);
        assert_eq!(&encoded[..4], &[0x03, 0x00, 0xC8, 0x01]);
        let decoded = decode_blobs(&encoded, 3).unwrap();
        assert_eq!(decoded[2].len(), 200);
        assert!(decoded[1].is_empty());
    }
}
