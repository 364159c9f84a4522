//! ITU-T X.691 unaligned PER primitives on top of [`BitWriter`]/[`BitReader`].
//!
//! Every primitive takes the name of the field it encodes so a failure comes back with a
//! path. Callers nest paths with [`CodecError::within`].
//!
//! Covered here (X.691 clause in parentheses):
//!
//! | Primitive | Wire form |
//! |-----------|-----------|
//! | constrained whole number (10.5) | `value - lb` in `ceil(log2(range))` bits, zero bits when range is 1 |
//! | semi-constrained / unconstrained (10.7, 10.8) | length determinant + minimal octets |
//! | length determinant (10.9) | 8 bits below 128, `10` + 14 bits below 16384; fragments rejected |
//! | normally small (10.6) | `0` + 6 bits below 64, otherwise `1` + semi-constrained |
//! | sequence preamble (19) | extension bit when extensible, one presence bit per OPTIONAL |
//! | enumerated / choice index (14, 23) | extension bit when extensible, then root index |
//! | open type (10.2) | length determinant + octets; an empty encoding is one zero octet |

use crate::bits::{BitReader, BitWriter};
use crate::codec::{bits_to_bytes, CodecError};
use log::trace;

/// Bits needed for a constrained whole number with `range` distinct values.
pub fn range_bits(range: u64) -> u32 {
    if range <= 1 {
        0
    } else {
        64 - (range - 1).leading_zeros()
    }
}

fn unsigned_octets(value: u64) -> usize {
    let significant = 64 - value.leading_zeros() as usize;
    bits_to_bytes(significant).max(1)
}

fn signed_octets(value: i64) -> usize {
    (1..8).find(|&n| {
        let bits = n as u32 * 8;
        let lo = -(1i64 << (bits - 1));
        let hi = (1i64 << (bits - 1)) - 1;
        value >= lo && value <= hi
    })
    .unwrap_or(8)
}

/// Presence bits of a SEQUENCE, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    extended: bool,
    bits: u64,
    count: usize,
}

impl Preamble {
    /// Whether the extension bit was set.
    pub fn extended(&self) -> bool {
        self.extended
    }

    /// Whether OPTIONAL component `index` (zero-based, declaration order) is present.
    pub fn is_present(&self, index: usize) -> bool {
        index < self.count && (self.bits >> (self.count - 1 - index)) & 1 != 0
    }
}

impl BitWriter {
    pub fn write_bool(&mut self, value: bool) {
        self.write_bit(value);
    }

    pub fn write_constrained(
        &mut self,
        field: &str,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), CodecError> {
        if value < min || value > max {
            return Err(CodecError::out_of_range(field, value, min, max));
        }
        let range = (max - min) as u64 + 1;
        self.write_bits((value - min) as u64, range_bits(range));
        Ok(())
    }

    /// Unconstrained length determinant.
    pub fn write_length(&mut self, field: &str, len: usize) -> Result<(), CodecError> {
        if len < 128 {
            self.write_bits(len as u64, 8);
        } else if len < 16384 {
            self.write_bits(0b10, 2);
            self.write_bits(len as u64, 14);
        } else {
            return Err(CodecError::out_of_range(field, len as i64, 0, 16383));
        }
        Ok(())
    }

    pub fn write_semi_constrained(
        &mut self,
        field: &str,
        value: i64,
        min: i64,
    ) -> Result<(), CodecError> {
        if value < min {
            return Err(CodecError::out_of_range(field, value, min, i64::MAX));
        }
        let offset = (value as i128 - min as i128) as u64;
        let n = unsigned_octets(offset);
        self.write_length(field, n)?;
        self.write_bits(offset, n as u32 * 8);
        Ok(())
    }

    pub fn write_unconstrained(&mut self, field: &str, value: i64) -> Result<(), CodecError> {
        let n = signed_octets(value);
        self.write_length(field, n)?;
        self.write_bits(value as u64, n as u32 * 8);
        Ok(())
    }

    pub fn write_normally_small(&mut self, field: &str, value: u64) -> Result<(), CodecError> {
        if value < 64 {
            self.write_bit(false);
            self.write_bits(value, 6);
            Ok(())
        } else {
            self.write_bit(true);
            self.write_semi_constrained(field, value as i64, 0)
        }
    }

    /// ENUMERATED or CHOICE root index.
    pub fn write_index(
        &mut self,
        field: &str,
        index: u64,
        root_count: u64,
        extensible: bool,
    ) -> Result<(), CodecError> {
        if extensible {
            self.write_bit(false);
        }
        self.write_constrained(field, index as i64, 0, root_count as i64 - 1)
    }

    /// Extension bit (if any) followed by one presence bit per OPTIONAL.
    pub fn write_preamble(&mut self, extensible: bool, presence: &[bool]) {
        if extensible {
            self.write_bit(false);
        }
        for &p in presence {
            self.write_bit(p);
        }
    }

    /// SEQUENCE OF / SIZE-constrained count.
    pub fn write_count(
        &mut self,
        field: &str,
        count: usize,
        min: usize,
        max: usize,
    ) -> Result<(), CodecError> {
        self.write_constrained(field, count as i64, min as i64, max as i64)
    }

    /// OCTET STRING with a SIZE(lb..ub) constraint; fixed size when `lb == ub`.
    pub fn write_octet_string(
        &mut self,
        field: &str,
        bytes: &[u8],
        min: usize,
        max: usize,
    ) -> Result<(), CodecError> {
        self.write_count(field, bytes.len(), min, max)?;
        self.write_octets(bytes);
        Ok(())
    }

    /// Wrap an already encoded value as an open type.
    pub fn write_open_type(&mut self, field: &str, inner: BitWriter) -> Result<(), CodecError> {
        let mut bytes = inner.into_bytes();
        if bytes.is_empty() {
            bytes.push(0);
        }
        self.write_length(field, bytes.len())?;
        self.write_octets(&bytes);
        Ok(())
    }
}

impl<'a> BitReader<'a> {
    pub fn read_bool(&mut self, field: &str) -> Result<bool, CodecError> {
        self.read_bit().map_err(|e| e.within(field))
    }

    pub fn read_constrained(&mut self, field: &str, min: i64, max: i64) -> Result<i64, CodecError> {
        let range = (max - min) as u64 + 1;
        let raw = self
            .read_bits(range_bits(range))
            .map_err(|e| e.within(field))?;
        let value = min + raw as i64;
        if value > max {
            return Err(CodecError::out_of_range(field, value, min, max));
        }
        Ok(value)
    }

    pub fn read_length(&mut self, field: &str) -> Result<usize, CodecError> {
        let read = |r: &mut Self| -> Result<usize, CodecError> {
            if !r.read_bit()? {
                return Ok(r.read_bits(7)? as usize);
            }
            if !r.read_bit()? {
                return Ok(r.read_bits(14)? as usize);
            }
            Err(CodecError::malformed("fragmented length determinant"))
        };
        read(self).map_err(|e| e.within(field))
    }

    pub fn read_semi_constrained(&mut self, field: &str, min: i64) -> Result<i64, CodecError> {
        let n = self.read_length(field)?;
        if n == 0 || n > 8 {
            return Err(CodecError::out_of_range(&format!("{}.length", field), n as i64, 1, 8));
        }
        let offset = self.read_bits(n as u32 * 8).map_err(|e| e.within(field))?;
        let value = min as i128 + offset as i128;
        i64::try_from(value).map_err(|_| CodecError::out_of_range(field, i64::MAX, min, i64::MAX))
    }

    pub fn read_unconstrained(&mut self, field: &str) -> Result<i64, CodecError> {
        let n = self.read_length(field)?;
        if n == 0 || n > 8 {
            return Err(CodecError::out_of_range(&format!("{}.length", field), n as i64, 1, 8));
        }
        let bits = n as u32 * 8;
        let raw = self.read_bits(bits).map_err(|e| e.within(field))?;
        let shift = 64 - bits;
        Ok(((raw << shift) as i64) >> shift)
    }

    pub fn read_normally_small(&mut self, field: &str) -> Result<u64, CodecError> {
        if !self.read_bool(field)? {
            return self.read_bits(6).map_err(|e| e.within(field));
        }
        Ok(self.read_semi_constrained(field, 0)? as u64)
    }

    /// ENUMERATED root index. An extension value is reported as `root_count + n`.
    pub fn read_enumerated(
        &mut self,
        field: &str,
        root_count: u64,
        extensible: bool,
    ) -> Result<u64, CodecError> {
        if extensible && self.read_bool(field)? {
            let n = self.read_normally_small(field)?;
            return Err(CodecError::invalid_bits(field, root_count + n));
        }
        Ok(self.read_constrained(field, 0, root_count as i64 - 1)? as u64)
    }

    /// CHOICE root index. Extension alternatives are not modelled by any message here.
    pub fn read_choice_index(
        &mut self,
        field: &str,
        root_count: u64,
        extensible: bool,
    ) -> Result<u64, CodecError> {
        if extensible && self.read_bool(field)? {
            let n = self.read_normally_small(field)?;
            return Err(CodecError::mismatch(
                field,
                format!("extension alternative {} not supported", n),
            ));
        }
        Ok(self.read_constrained(field, 0, root_count as i64 - 1)? as u64)
    }

    pub fn read_preamble(
        &mut self,
        field: &str,
        extensible: bool,
        optional_count: usize,
    ) -> Result<Preamble, CodecError> {
        let extended = extensible && self.read_bool(field)?;
        let bits = self
            .read_bits(optional_count as u32)
            .map_err(|e| e.within(field))?;
        Ok(Preamble {
            extended,
            bits,
            count: optional_count,
        })
    }

    /// Step over the extension additions of a SEQUENCE whose root has been read.
    pub fn skip_extensions(&mut self, field: &str, preamble: &Preamble) -> Result<(), CodecError> {
        if !preamble.extended() {
            return Ok(());
        }
        let count = if !self.read_bool(field)? {
            self.read_bits(6).map_err(|e| e.within(field))? as usize + 1
        } else {
            self.read_length(field)?
        };
        let mut present = Vec::with_capacity(count);
        for _ in 0..count {
            present.push(self.read_bool(field)?);
        }
        let skipped = present.iter().filter(|&&p| p).count();
        for p in present {
            if p {
                self.skip_open_type(field)?;
            }
        }
        trace!("{}: skipped {} extension addition(s)", field, skipped);
        Ok(())
    }

    pub fn read_count(&mut self, field: &str, min: usize, max: usize) -> Result<usize, CodecError> {
        Ok(self.read_constrained(field, min as i64, max as i64)? as usize)
    }

    pub fn read_octet_string(
        &mut self,
        field: &str,
        min: usize,
        max: usize,
    ) -> Result<Vec<u8>, CodecError> {
        let n = self.read_count(field, min, max)?;
        self.read_octets(n).map_err(|e| e.within(field))
    }

    pub fn read_open_type(&mut self, field: &str) -> Result<Vec<u8>, CodecError> {
        let n = self.read_length(field)?;
        self.read_octets(n).map_err(|e| e.within(field))
    }

    pub fn skip_open_type(&mut self, field: &str) -> Result<(), CodecError> {
        let n = self.read_length(field)?;
        self.skip_bits(n * 8).map_err(|e| e.within(field))
    }
}
