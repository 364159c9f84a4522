//! Fixed-size BIT STRINGs with named bits.
//!
//! Applications hold these as plain integers where named bit `i` is `1 << i`. On the wire
//! named bit 0 is the first bit transmitted, so packing reverses the low `width` bits and
//! writes the result MSB first. Widths used by the messages in this crate: 2 (lane
//! direction), 5 (wheel brakes), 8 (vehicle lane attributes), 10 (lane sharing), 12
//! (allowed maneuvers) and 16 (intersection status, crosswalk attributes).

use crate::bits::{BitReader, BitWriter};
use crate::codec::CodecError;

/// Reverse the low `width` bits of `value`. Bits above `width` are dropped.
pub fn pack(value: u64, width: u32) -> u64 {
    let mut out = 0u64;
    for i in 0..width {
        if (value >> i) & 1 != 0 {
            out |= 1 << (width - 1 - i);
        }
    }
    out
}

/// Inverse of [`pack`]; the transform is its own inverse on `width` bits.
pub fn unpack(raw: u64, width: u32) -> u64 {
    pack(raw, width)
}

fn max_value(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl BitWriter {
    pub fn write_bit_field(&mut self, field: &str, value: u64, width: u32) -> Result<(), CodecError> {
        if value > max_value(width) {
            return Err(CodecError::out_of_range(
                field,
                value as i64,
                0,
                max_value(width) as i64,
            ));
        }
        self.write_bits(pack(value, width), width);
        Ok(())
    }

    /// BIT STRING (SIZE(width, ...)): root size only.
    pub fn write_extensible_bit_field(
        &mut self,
        field: &str,
        value: u64,
        width: u32,
    ) -> Result<(), CodecError> {
        self.write_bit(false);
        self.write_bit_field(field, value, width)
    }
}

impl<'a> BitReader<'a> {
    pub fn read_bit_field(&mut self, field: &str, width: u32) -> Result<u64, CodecError> {
        let raw = self.read_bits(width).map_err(|e| e.within(field))?;
        Ok(unpack(raw, width))
    }

    pub fn read_extensible_bit_field(&mut self, field: &str, width: u32) -> Result<u64, CodecError> {
        if self.read_bool(field)? {
            return Err(CodecError::mismatch(field, "bit string size extension"));
        }
        self.read_bit_field(field, width)
    }
}
