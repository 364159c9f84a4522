//! Bit cursor over a byte buffer.
//!
//! UPER packs fields back to back with no alignment, most significant bit first, so both
//! sides track a position in bits rather than bytes:
//!
//! - [`BitWriter`] owns a growing buffer; the last octet is zero-padded.
//! - [`BitReader`] borrows a slice and a bit position; reading past the end is a
//!   `MalformedStream` error, never a panic.

use crate::codec::{bits_to_bytes, CodecError};

/// Append-only bit writer.
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    buf: Vec<u8>,
    bit_len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        BitWriter {
            buf: Vec::with_capacity(bytes),
            bit_len: 0,
        }
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn byte_len(&self) -> usize {
        bits_to_bytes(self.bit_len)
    }

    pub fn write_bit(&mut self, bit: bool) {
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.buf.push(0);
        }
        if bit {
            if let Some(last) = self.buf.last_mut() {
                *last |= 0x80 >> offset;
            }
        }
        self.bit_len += 1;
    }

    /// Write the low `n` bits of `value`, MSB first. `n` is at most 64.
    pub fn write_bits(&mut self, value: u64, n: u32) {
        debug_assert!(n <= 64, "write_bits: {} bits", n);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 != 0);
        }
    }

    /// Write whole octets at the current (possibly unaligned) position.
    pub fn write_octets(&mut self, bytes: &[u8]) {
        if self.bit_len % 8 == 0 {
            self.buf.extend_from_slice(bytes);
            self.bit_len += bytes.len() * 8;
            return;
        }
        for &b in bytes {
            self.write_bits(u64::from(b), 8);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Bit reader over a borrowed slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    /// Current position in bits.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bits left before the end of the slice.
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    fn ensure(&self, n: usize) -> Result<(), CodecError> {
        if self.remaining() < n {
            return Err(CodecError::malformed(format!(
                "need {} bits at bit {}, only {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        self.ensure(1)?;
        let byte = self.data[self.pos / 8];
        let bit = (byte >> (7 - self.pos % 8)) & 1 != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Read `n` bits (at most 64) as an unsigned MSB-first integer.
    pub fn read_bits(&mut self, n: u32) -> Result<u64, CodecError> {
        if n > 64 {
            return Err(CodecError::malformed(format!("read_bits({}): max 64", n)));
        }
        self.ensure(n as usize)?;
        let mut out = 0u64;
        for _ in 0..n {
            out = (out << 1) | u64::from(self.read_bit()?);
        }
        Ok(out)
    }

    pub fn read_octets(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        self.ensure(n * 8)?;
        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            self.pos += n * 8;
            return Ok(self.data[start..start + n].to_vec());
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Advance without looking at the bits.
    pub fn skip_bits(&mut self, n: usize) -> Result<(), CodecError> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_bits_msb_first_and_pads_last_octet() {
        let mut w = BitWriter::new();
        w.write_bit(true);
        w.write_bits(0b011, 3);
        assert_eq!(w.bit_len(), 4);
        assert_eq!(w.as_bytes(), &[0b1011_0000]);
        w.write_bits(0x1ff, 9);
        assert_eq!(w.byte_len(), 2);
        assert_eq!(w.as_bytes(), &[0b1011_1111, 0b1111_1000]);
    }

    #[test]
    fn unaligned_octets_round_trip() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_octets(&[0xde, 0xad]);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 3);
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(3).expect("bits"), 0b101);
        assert_eq!(r.read_octets(2).expect("octets"), vec![0xde, 0xad]);
        assert_eq!(r.remaining(), 5);
    }

    #[test]
    fn reading_past_end_is_malformed() {
        let data = [0xffu8];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(6).expect("six bits"), 0x3f);
        let err = r.read_bits(3).expect_err("only two bits left");
        assert_eq!(err.kind(), crate::codec::ErrorKind::MalformedStream);
        assert_eq!(r.position(), 6);
    }

    #[test]
    fn sixty_four_bit_values() {
        let mut w = BitWriter::new();
        w.write_bits(u64::MAX - 1, 64);
        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(64).expect("64 bits"), u64::MAX - 1);
        assert!(r.read_bits(65).is_err());
    }
}
