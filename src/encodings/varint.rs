//! Base-128 little-group varints.
//!
//! Each group carries 7 value bits, least significant group first; the high bit
//! of a group says whether another group follows. Groups are read through a
//! [`BitCursor`] eight bits at a time, so a varint does not need to start on a
//! byte boundary.

use crate::bitstream::{BitCursor, BitWriter};
use crate::constants::VARINT_MAX_BYTES;
use crate::error::DecodeError;

const CONTINUATION_BIT: u64 = 0x80;
const GROUP_MASK: u64 = 0x7F;

/// Decodes one varint from `cursor`.
///
/// # Errors
/// - [`DecodeError::OutOfBounds`] - the buffer ends inside the varint
/// - [`DecodeError::VarintTooLong`] - ten groups were read without a terminator
pub fn decode_varint(cursor: &mut BitCursor<'_>) -> Result<u64, DecodeError> {
    let mut decoded = 0u64;
    for group_index in 0..VARINT_MAX_BYTES {
        let group = cursor.read_bits(8)?;
        // The tenth group only contributes its lowest bit to a u64.
        decoded |= (group & GROUP_MASK) << (7 * group_index);
        if group & CONTINUATION_BIT == 0 {
            return Ok(decoded);
        }
    }
    Err(DecodeError::VarintTooLong)
}

/// Appends `value` as a minimal-length varint.
pub fn write_varint(writer: &mut BitWriter, mut value: u64) {
    loop {
        let group = value & GROUP_MASK;
        value >>= 7;
        if value == 0 {
            // Eight bits is always a valid width.
            let _ = writer.write_bits(group, 8);
            return;
        }
        let _ = writer.write_bits(group | CONTINUATION_BIT, 8);
    }
}

/// Encodes `value` as a standalone minimal-length varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut writer = BitWriter::new();
    write_varint(&mut writer, value);
    writer.finish()
}
