//! Fixed-width delta columns.
//!
//! A column reconstructs `N` integers from an externally supplied base value and
//! a compact bitstream. The stream opens with a [`DeltaEncodingHeader`]:
//!
//! ```text
//! type=0 (legacy):  [2: type][6: delta_width - 1]
//! type=1 (general): [2: type][6: delta_width - 1][1: signed][1: optional][6: value_width - 1]
//! ```
//!
//! When values are optional, `N` presence bits follow. Then, for every present
//! slot in order, either a self-contained varint (no predecessor known yet) or a
//! `delta_width`-bit delta applied to the last present value. Holes consume no
//! bits and leave the predecessor untouched.

use crate::bitstream::{BitCursor, BitWriter, low_bits_mask};
use crate::constants::{
    DELTA_ENCODING_GENERAL, DELTA_ENCODING_LEGACY, DELTA_ENCODING_TYPE_BITS,
    DELTA_WIDTH_FIELD_BITS,
};
use crate::encodings::varint::{decode_varint, write_varint};
use crate::error::{DecodeError, Field};

/// Parameters of one delta column. Immutable for the duration of a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaEncodingHeader {
    delta_width_bits: u8,
    signed_deltas: bool,
    values_optional: bool,
    value_width_bits: u8,
}

impl DeltaEncodingHeader {
    /// Creates a validated header.
    ///
    /// # Errors
    /// - [`DecodeError::InvalidBitWidth`] - a width is outside `1..=64`
    /// - [`DecodeError::InvalidHeader`] - the delta is wider than the values
    pub fn new(
        delta_width_bits: u8,
        signed_deltas: bool,
        values_optional: bool,
        value_width_bits: u8,
    ) -> Result<Self, DecodeError> {
        for bits in [delta_width_bits, value_width_bits] {
            if bits == 0 || bits > 64 {
                return Err(DecodeError::InvalidBitWidth { bits });
            }
        }
        if delta_width_bits > value_width_bits {
            return Err(DecodeError::InvalidHeader {
                field: Field::DeltaWidthBits,
                expected: u64::from(value_width_bits),
                got: u64::from(delta_width_bits),
            });
        }
        Ok(Self {
            delta_width_bits,
            signed_deltas,
            values_optional,
            value_width_bits,
        })
    }

    /// Header of the legacy format: unsigned deltas over 64-bit values, no holes.
    pub fn legacy(delta_width_bits: u8) -> Result<Self, DecodeError> {
        Self::new(delta_width_bits, false, false, 64)
    }

    /// Parses the header from the start of a column.
    ///
    /// # Errors
    /// - [`DecodeError::UnsupportedEncoding`] - unknown type tag
    /// - [`DecodeError::OutOfBounds`] - the buffer ends inside the header
    /// - [`DecodeError::InvalidHeader`] - the delta is wider than the values
    pub fn parse(cursor: &mut BitCursor<'_>) -> Result<Self, DecodeError> {
        let encoding_type = cursor.read_bits(DELTA_ENCODING_TYPE_BITS)?;
        match encoding_type {
            DELTA_ENCODING_LEGACY => {
                let delta_width_bits = read_width(cursor)?;
                Self::legacy(delta_width_bits)
            }
            DELTA_ENCODING_GENERAL => {
                let delta_width_bits = read_width(cursor)?;
                let signed_deltas = cursor.read_bit()?;
                let values_optional = cursor.read_bit()?;
                let value_width_bits = read_width(cursor)?;
                Self::new(
                    delta_width_bits,
                    signed_deltas,
                    values_optional,
                    value_width_bits,
                )
            }
            other => Err(DecodeError::UnsupportedEncoding {
                encoding_type: other,
            }),
        }
    }

    /// Writes the header, choosing the legacy tag whenever it can express the parameters.
    pub fn write(&self, writer: &mut BitWriter) {
        if self.is_legacy_compatible() {
            let _ = writer.write_bits(DELTA_ENCODING_LEGACY, DELTA_ENCODING_TYPE_BITS);
            write_width(writer, self.delta_width_bits);
        } else {
            let _ = writer.write_bits(DELTA_ENCODING_GENERAL, DELTA_ENCODING_TYPE_BITS);
            write_width(writer, self.delta_width_bits);
            writer.write_bit(self.signed_deltas);
            writer.write_bit(self.values_optional);
            write_width(writer, self.value_width_bits);
        }
    }

    /// Whether the legacy two-field header can describe this column.
    pub fn is_legacy_compatible(&self) -> bool {
        !self.signed_deltas && !self.values_optional && self.value_width_bits == 64
    }

    /// Width of each encoded delta.
    #[inline]
    pub fn delta_width_bits(&self) -> u8 {
        self.delta_width_bits
    }

    /// Whether deltas are two's-complement within `delta_width_bits`.
    #[inline]
    pub fn signed_deltas(&self) -> bool {
        self.signed_deltas
    }

    /// Whether a presence bitmap precedes the deltas.
    #[inline]
    pub fn values_optional(&self) -> bool {
        self.values_optional
    }

    /// Width of the reconstructed values; arithmetic wraps modulo `2^value_width_bits`.
    #[inline]
    pub fn value_width_bits(&self) -> u8 {
        self.value_width_bits
    }

    #[inline]
    fn value_mask(&self) -> u64 {
        low_bits_mask(self.value_width_bits)
    }

    #[inline]
    fn delta_mask(&self) -> u64 {
        low_bits_mask(self.delta_width_bits)
    }

    /// Applies a raw `delta_width_bits` delta to `base`, wrapping modulo the value width.
    ///
    /// For signed columns a set top bit marks a negative delta whose magnitude is the
    /// two's complement within `delta_width_bits`.
    pub fn apply_delta(&self, base: u64, delta: u64) -> u64 {
        let delta = delta & self.delta_mask();
        if self.signed_deltas {
            let top_bit = 1u64 << (self.delta_width_bits - 1);
            if delta & top_bit != 0 {
                let delta_abs = ((!delta) & self.delta_mask()).wrapping_add(1);
                return base.wrapping_sub(delta_abs) & self.value_mask();
            }
        }
        base.wrapping_add(delta) & self.value_mask()
    }

    /// Computes the raw delta that moves `previous` to `current`.
    ///
    /// Inverse of [`apply_delta`](Self::apply_delta) whenever the step is representable
    /// in `delta_width_bits`. Signed columns take the shorter direction.
    pub fn compute_delta(&self, previous: u64, current: u64) -> u64 {
        let forward = current.wrapping_sub(previous) & self.value_mask();
        if !self.signed_deltas {
            return forward & self.delta_mask();
        }
        let backward = previous.wrapping_sub(current) & self.value_mask();
        if forward <= backward {
            forward & self.delta_mask()
        } else {
            backward.wrapping_neg() & self.delta_mask()
        }
    }
}

fn write_width(writer: &mut BitWriter, bits: u8) {
    // Widths are validated on construction, so `bits - 1` fits six bits.
    let _ = writer.write_bits(u64::from(bits - 1), DELTA_WIDTH_FIELD_BITS);
}

fn read_width(cursor: &mut BitCursor<'_>) -> Result<u8, DecodeError> {
    // A six-bit field plus one is always within 1..=64.
    Ok(cursor.read_bits(DELTA_WIDTH_FIELD_BITS)? as u8 + 1)
}

/// Fewest bits a column of `num_values` present values can occupy after its header.
fn minimum_column_bits(
    header: &DeltaEncodingHeader,
    base: Option<u64>,
    num_values: usize,
) -> usize {
    let delta_bits = usize::from(header.delta_width_bits());
    match base {
        Some(_) => num_values.saturating_mul(delta_bits),
        // The first value is a varint of at least one byte.
        None if num_values > 0 => (num_values - 1).saturating_mul(delta_bits).saturating_add(8),
        None => 0,
    }
}

/// Decodes `num_values` values from a delta column.
///
/// `base` is the last known value preceding the column, if any. An absent or empty
/// `input` means the column did not change: every slot equals `base` (or is a hole
/// when there is no base).
///
/// # Errors
/// - [`DecodeError::UnsupportedEncoding`] - unknown header type tag
/// - [`DecodeError::OutOfBounds`] - the stream ends before all present values are read,
///   or is too short for `num_values` entries at all
/// - [`DecodeError::VarintTooLong`] - a self-contained value never terminates
pub fn decode_deltas(
    input: Option<&[u8]>,
    base: Option<u64>,
    num_values: usize,
) -> Result<Vec<Option<u64>>, DecodeError> {
    let input = match input {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return Ok(vec![base; num_values]),
    };

    let mut cursor = BitCursor::new(input);
    let header = DeltaEncodingHeader::parse(&mut cursor)?;

    // Reject counts the stream cannot hold before sizing any buffer by them.
    let requested_bits = if header.values_optional() {
        num_values
    } else {
        minimum_column_bits(&header, base, num_values)
    };
    if requested_bits > cursor.remaining_bits() {
        return Err(DecodeError::OutOfBounds {
            requested_bits,
            remaining_bits: cursor.remaining_bits(),
        });
    }

    let present = if header.values_optional() {
        (0..num_values)
            .map(|_| cursor.read_bit())
            .collect::<Result<Vec<_>, _>>()?
    } else {
        vec![true; num_values]
    };

    let mut previous = base;
    let mut values = Vec::with_capacity(num_values);
    for is_present in present {
        if !is_present {
            values.push(None);
            continue;
        }
        let value = match previous {
            None => decode_varint(&mut cursor)?,
            Some(prev) => {
                let delta = cursor.read_bits(header.delta_width_bits())?;
                header.apply_delta(prev, delta)
            }
        };
        previous = Some(value);
        values.push(Some(value));
    }
    Ok(values)
}

/// Encodes `values` as a delta column relative to `base`.
///
/// Callers pick widths large enough for every step; a step that does not fit
/// `delta_width_bits` is truncated to its low bits.
///
/// # Errors
/// - [`DecodeError::InvalidHeader`] - `values` has holes but the header does not
///   allow optional values
pub fn encode_deltas(
    header: &DeltaEncodingHeader,
    base: Option<u64>,
    values: &[Option<u64>],
) -> Result<Vec<u8>, DecodeError> {
    if !header.values_optional() && values.iter().any(Option::is_none) {
        return Err(DecodeError::InvalidHeader {
            field: Field::ValuesOptional,
            expected: 1,
            got: 0,
        });
    }

    let mut writer = BitWriter::new();
    header.write(&mut writer);
    if header.values_optional() {
        for value in values {
            writer.write_bit(value.is_some());
        }
    }

    let mut previous = base;
    for value in values.iter().flatten() {
        match previous {
            None => write_varint(&mut writer, *value),
            Some(prev) => {
                let delta = header.compute_delta(prev, *value);
                writer.write_bits(delta, header.delta_width_bits())?;
            }
        }
        previous = Some(*value);
    }
    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_legacy_header() {
        // type=00, delta_width-1=000111 -> 8-bit deltas.
        let data = [0b0000_0111];
        let header = DeltaEncodingHeader::parse(&mut BitCursor::new(&data)).unwrap();
        assert_eq!(header.delta_width_bits(), 8);
        assert!(!header.signed_deltas());
        assert!(!header.values_optional());
        assert_eq!(header.value_width_bits(), 64);
    }

    #[test]
    fn parse_general_header() {
        // type=01, delta-1=000011, signed=1, optional=0, value-1=001111
        let mut writer = BitWriter::new();
        writer.write_bits(1, 2).unwrap();
        writer.write_bits(3, 6).unwrap();
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bits(15, 6).unwrap();
        let data = writer.finish();

        let header = DeltaEncodingHeader::parse(&mut BitCursor::new(&data)).unwrap();
        assert_eq!(header, DeltaEncodingHeader::new(4, true, false, 16).unwrap());
    }

    #[test]
    fn unknown_encoding_type_is_rejected() {
        let data = [0b1000_0000, 0x00];
        assert_eq!(
            decode_deltas(Some(&data), Some(0), 1),
            Err(DecodeError::UnsupportedEncoding { encoding_type: 2 })
        );
        let data = [0b1100_0000, 0x00];
        assert_eq!(
            decode_deltas(Some(&data), Some(0), 1),
            Err(DecodeError::UnsupportedEncoding { encoding_type: 3 })
        );
    }

    #[test]
    fn delta_wider_than_value_is_rejected() {
        assert!(matches!(
            DeltaEncodingHeader::new(9, false, false, 8),
            Err(DecodeError::InvalidHeader {
                field: Field::DeltaWidthBits,
                ..
            })
        ));
    }

    #[test]
    fn absent_input_repeats_base() {
        assert_eq!(
            decode_deltas(None, Some(7), 3).unwrap(),
            vec![Some(7), Some(7), Some(7)]
        );
        assert_eq!(decode_deltas(Some(&[]), None, 2).unwrap(), vec![None, None]);
    }

    #[test]
    fn legacy_unsigned_deltas() {
        // header 00 000011 (4-bit deltas), deltas 1, 2, 15
        let mut writer = BitWriter::new();
        writer.write_bits(0, 2).unwrap();
        writer.write_bits(3, 6).unwrap();
        for delta in [1, 2, 15] {
            writer.write_bits(delta, 4).unwrap();
        }
        let data = writer.finish();
        assert_eq!(
            decode_deltas(Some(&data), Some(100), 3).unwrap(),
            vec![Some(101), Some(103), Some(118)]
        );
    }

    #[test]
    fn unsigned_deltas_wrap_at_value_width() {
        let header = DeltaEncodingHeader::new(4, false, false, 8).unwrap();
        assert_eq!(header.apply_delta(250, 10), 4);
        assert_eq!(header.apply_delta(255, 1), 0);
    }

    #[test]
    fn signed_negative_delta() {
        let header = DeltaEncodingHeader::new(4, true, false, 16).unwrap();
        // 0b1111 is -1, 0b1000 is -8, 0b0111 is +7.
        assert_eq!(header.apply_delta(100, 0b1111), 99);
        assert_eq!(header.apply_delta(100, 0b1000), 92);
        assert_eq!(header.apply_delta(100, 0b0111), 107);
        assert_eq!(header.apply_delta(3, 0b1100), 0xFFFF);
    }

    #[test]
    fn signed_full_width_deltas_do_not_overflow() {
        let header = DeltaEncodingHeader::new(64, true, false, 64).unwrap();
        assert_eq!(header.apply_delta(0, u64::MAX), u64::MAX);
        assert_eq!(header.apply_delta(5, 1u64 << 63), 5u64.wrapping_sub(1u64 << 63));
        assert_eq!(header.compute_delta(10, 4), 6u64.wrapping_neg());
    }

    #[test]
    fn missing_base_uses_varint_for_first_value() {
        let header = DeltaEncodingHeader::new(8, false, false, 32).unwrap();
        let values = [Some(1000), Some(1010), Some(1020)];
        let encoded = encode_deltas(&header, None, &values).unwrap();
        assert_eq!(decode_deltas(Some(&encoded), None, 3).unwrap(), values);
    }

    #[test]
    fn holes_consume_no_bits() {
        let header = DeltaEncodingHeader::new(8, false, true, 16).unwrap();
        let values = [Some(10), None, Some(12), None, Some(20)];
        let encoded = encode_deltas(&header, Some(5), &values).unwrap();

        // 16 header bits + 5 presence bits + 3 deltas of 8 bits.
        assert_eq!(encoded.len(), (16 + 5 + 3 * 8usize).div_ceil(8));
        assert_eq!(decode_deltas(Some(&encoded), Some(5), 5).unwrap(), values);
    }

    #[test]
    fn holes_do_not_move_predecessor() {
        let header = DeltaEncodingHeader::new(4, false, true, 8).unwrap();
        let mut writer = BitWriter::new();
        header.write(&mut writer);
        for present in [true, false, true] {
            writer.write_bit(present);
        }
        writer.write_bits(2, 4).unwrap();
        writer.write_bits(3, 4).unwrap();
        let data = writer.finish();

        assert_eq!(
            decode_deltas(Some(&data), Some(10), 3).unwrap(),
            vec![Some(12), None, Some(15)]
        );
    }

    #[test]
    fn truncated_stream_is_out_of_bounds() {
        let data = [0b0000_0111, 0x01];
        assert!(matches!(
            decode_deltas(Some(&data), Some(0), 2),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn count_beyond_stream_fails_before_decoding() {
        let data = [0b0000_0111];
        assert_eq!(
            decode_deltas(Some(&data), Some(0), u32::MAX as usize),
            Err(DecodeError::OutOfBounds {
                requested_bits: u32::MAX as usize * 8,
                remaining_bits: 0,
            })
        );
        // Without a base the first value still needs a whole varint byte.
        let data = [0b0000_0000];
        assert!(matches!(
            decode_deltas(Some(&data), None, 1),
            Err(DecodeError::OutOfBounds {
                requested_bits: 8,
                ..
            })
        ));
    }

    #[test]
    fn presence_bitmap_longer_than_stream_is_rejected() {
        let header = DeltaEncodingHeader::new(8, false, true, 16).unwrap();
        let encoded = encode_deltas(&header, Some(0), &[Some(1), None]).unwrap();
        assert!(matches!(
            decode_deltas(Some(&encoded), Some(0), usize::MAX),
            Err(DecodeError::OutOfBounds {
                requested_bits: usize::MAX,
                ..
            })
        ));
    }

    #[test]
    fn encode_rejects_holes_without_optional_flag() {
        let header = DeltaEncodingHeader::legacy(8).unwrap();
        assert!(matches!(
            encode_deltas(&header, Some(0), &[Some(1), None]),
            Err(DecodeError::InvalidHeader {
                field: Field::ValuesOptional,
                ..
            })
        ));
    }

    #[test]
    fn legacy_compatible_header_uses_legacy_tag() {
        let header = DeltaEncodingHeader::legacy(8).unwrap();
        let encoded = encode_deltas(&header, Some(0), &[Some(1)]).unwrap();
        assert_eq!(encoded, vec![0b0000_0111, 0x01]);
    }
}
