//! MSB-first bit-level reading and writing.
//!
//! [`BitCursor`] is the reader every column decoder is built on: it hands out
//! unsigned integers of 1 to 64 bits, taking the most significant unread bit of
//! the current byte first and crossing byte boundaries as needed. A cursor is
//! created per decode call, borrowed exclusively by the decoder, and dropped
//! afterwards. It never rewinds.
//!
//! [`BitWriter`] is the inverse packer, used by the column encoders.

use crate::error::DecodeError;

/// Returns a mask covering the low `bits` bits. `bits` must be in `1..=64`.
#[inline]
pub(crate) const fn low_bits_mask(bits: u8) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Read cursor over an immutable byte buffer with bit granularity.
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    bit_offset: usize,
}

impl<'a> BitCursor<'a> {
    /// Creates a cursor positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_offset: 0,
        }
    }

    /// Number of bits consumed so far.
    #[inline]
    pub fn bit_offset(&self) -> usize {
        self.bit_offset
    }

    /// Number of unread bits.
    #[inline]
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_offset
    }

    /// Whether the next read starts on a byte boundary.
    #[inline]
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset % 8 == 0
    }

    /// Bytes from the first fully unread byte to the end of the buffer.
    ///
    /// A partially consumed byte is skipped.
    pub fn remaining_bytes(&self) -> &'a [u8] {
        let start = self.bit_offset.div_ceil(8);
        &self.data[start.min(self.data.len())..]
    }

    /// Reads `num_bits` bits MSB-first and advances the cursor by exactly that amount.
    ///
    /// # Errors
    /// - [`DecodeError::InvalidBitWidth`] - `num_bits` is 0 or larger than 64
    /// - [`DecodeError::OutOfBounds`] - fewer than `num_bits` bits remain; the cursor
    ///   is left unchanged
    pub fn read_bits(&mut self, num_bits: u8) -> Result<u64, DecodeError> {
        if num_bits == 0 || num_bits > 64 {
            return Err(DecodeError::InvalidBitWidth { bits: num_bits });
        }
        let requested = usize::from(num_bits);
        let remaining = self.remaining_bits();
        if requested > remaining {
            return Err(DecodeError::OutOfBounds {
                requested_bits: requested,
                remaining_bits: remaining,
            });
        }

        let mut result = 0u64;
        let mut bits_left = requested;
        while bits_left > 0 {
            let byte = self.data[self.bit_offset / 8];
            let unread_in_byte = 8 - self.bit_offset % 8;
            let take = unread_in_byte.min(bits_left);
            let shift = unread_in_byte - take;
            let chunk = (u64::from(byte) >> shift) & low_bits_mask(take as u8);
            // `take` is at most 8 and the accumulated width never exceeds 64.
            result = (result << take) | chunk;
            self.bit_offset += take;
            bits_left -= take;
        }
        Ok(result)
    }

    /// Reads a single bit as a flag.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Reads eight bits.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        // Eight bits always fit.
        Ok(self.read_bits(8)? as u8)
    }
}

/// Append-only MSB-first bit packer.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Appends the low `num_bits` bits of `value`, most significant first.
    ///
    /// Bits of `value` above `num_bits` are ignored.
    ///
    /// # Errors
    /// - [`DecodeError::InvalidBitWidth`] - `num_bits` is 0 or larger than 64
    pub fn write_bits(&mut self, value: u64, num_bits: u8) -> Result<(), DecodeError> {
        if num_bits == 0 || num_bits > 64 {
            return Err(DecodeError::InvalidBitWidth { bits: num_bits });
        }
        let value = value & low_bits_mask(num_bits);
        for i in (0..num_bits).rev() {
            let bit = (value >> i) & 1;
            if self.bit_len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.bit_len % 8);
            }
            self.bit_len += 1;
        }
        Ok(())
    }

    /// Appends a single flag bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        // A width of one is always valid.
        let _ = self.write_bits(u64::from(bit), 1);
    }

    /// Returns the packed bytes; the final partial byte is zero-padded.
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}
