//! Tooling for packing typed values into cells
//!
//! Bits are written most significant first, integers big-endian, the way
//! the TVM reads them back.

use crate::address::Address;
use crate::cell::{Cell, MAX_DATA_BITS, MAX_REFS};
use crate::deser::{Serialize, WriteError};

#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Cell>,
}

impl CellBuilder {
    pub fn new() -> Self {
        CellBuilder {
            data: Vec::with_capacity(128),
            bit_len: 0,
            refs: Vec::with_capacity(MAX_REFS),
        }
    }

    pub fn bits_used(&self) -> usize {
        self.bit_len
    }

    pub fn bits_left(&self) -> usize {
        MAX_DATA_BITS - self.bit_len
    }

    pub fn refs_left(&self) -> usize {
        MAX_REFS - self.refs.len()
    }

    fn assure_bits(&self, requested: usize) -> Result<(), WriteError> {
        if requested <= self.bits_left() {
            Ok(())
        } else {
            Err(WriteError::CellOverflow {
                used: self.bit_len,
                requested,
            })
        }
    }

    fn push_bit(&mut self, bit: bool) {
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    #[inline]
    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, WriteError> {
        self.assure_bits(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Store the `bits` lowest bits of an unsigned value (at most 128).
    pub fn store_uint(&mut self, value: u128, bits: usize) -> Result<&mut Self, WriteError> {
        if bits > 128 {
            return Err(WriteError::UnsupportedWidth(bits));
        }
        if bits < 128 && value >> bits != 0 {
            return Err(WriteError::ValueOutOfRange {
                value: value.to_string(),
                bits,
            });
        }
        self.assure_bits(bits)?;
        for i in (0..bits).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
        Ok(self)
    }

    /// Store a two's complement signed value on `bits` bits (at most 257).
    ///
    /// Widths above 128 bits are sign extended.
    pub fn store_int(&mut self, value: i128, bits: usize) -> Result<&mut Self, WriteError> {
        if bits > 257 {
            return Err(WriteError::UnsupportedWidth(bits));
        }
        if bits < 128 {
            let fits = if bits == 0 {
                value == 0
            } else {
                let bound = 1i128 << (bits - 1);
                value >= -bound && value < bound
            };
            if !fits {
                return Err(WriteError::ValueOutOfRange {
                    value: value.to_string(),
                    bits,
                });
            }
        }
        self.assure_bits(bits)?;
        let negative = value < 0;
        for _ in 128..bits {
            self.push_bit(negative);
        }
        let raw = value as u128;
        for i in (0..bits.min(128)).rev() {
            self.push_bit((raw >> i) & 1 == 1);
        }
        Ok(self)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, WriteError> {
        self.assure_bits(bytes.len() * 8)?;
        if self.bit_len % 8 == 0 {
            self.data.extend_from_slice(bytes);
            self.bit_len += bytes.len() * 8;
        } else {
            for b in bytes {
                for i in (0..8).rev() {
                    self.push_bit((b >> i) & 1 == 1);
                }
            }
        }
        Ok(self)
    }

    /// Store an amount as `VarUInteger 16`: a 4-bit byte length then the value.
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self, WriteError> {
        let len = (128 - amount.leading_zeros() as usize + 7) / 8;
        if len > 15 {
            return Err(WriteError::ValueOutOfRange {
                value: amount.to_string(),
                bits: 120,
            });
        }
        self.assure_bits(4 + len * 8)?;
        self.store_uint(len as u128, 4)?;
        self.store_uint(amount, len * 8)
    }

    pub fn store_ref(&mut self, cell: Cell) -> Result<&mut Self, WriteError> {
        if self.refs.len() >= MAX_REFS {
            return Err(WriteError::TooManyRefs(self.refs.len()));
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// `Maybe ^Cell`: a presence bit, then the reference when present.
    pub fn store_maybe_ref(&mut self, cell: Option<Cell>) -> Result<&mut Self, WriteError> {
        match cell {
            None => self.store_bit(false),
            Some(cell) => {
                if self.refs.len() >= MAX_REFS {
                    return Err(WriteError::TooManyRefs(self.refs.len()));
                }
                self.store_bit(true)?.store_ref(cell)
            }
        }
    }

    /// Store a string as a snake: as many bytes as fit here, the rest
    /// chained in the first reference of a continuation cell.
    pub fn store_string_tail(&mut self, s: &str) -> Result<&mut Self, WriteError> {
        self.store_snake_bytes(s.as_bytes())
    }

    fn store_snake_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, WriteError> {
        let here = (self.bits_left() / 8).min(bytes.len());
        let (head, rest) = bytes.split_at(here);
        if !rest.is_empty() && self.refs_left() == 0 {
            return Err(WriteError::TooManyRefs(self.refs.len()));
        }
        self.store_bytes(head)?;
        if !rest.is_empty() {
            let mut tail = CellBuilder::new();
            tail.store_snake_bytes(rest)?;
            self.store_ref(tail.build()?)?;
        }
        Ok(self)
    }

    /// Store a string as a reference to its own snake cell.
    pub fn store_string_ref_tail(&mut self, s: &str) -> Result<&mut Self, WriteError> {
        let mut inner = CellBuilder::new();
        inner.store_string_tail(s)?;
        self.store_ref(inner.build()?)
    }

    /// `MsgAddress`: `addr_none` when absent, `addr_std` otherwise.
    pub fn store_address(&mut self, address: Option<&Address>) -> Result<&mut Self, WriteError> {
        match address {
            None => self.store_uint(0, 2),
            Some(address) => {
                address.serialize(self)?;
                Ok(self)
            }
        }
    }

    /// `HashmapE`: the dictionary root is an optional reference.
    pub fn store_dict(&mut self, root: Option<Cell>) -> Result<&mut Self, WriteError> {
        self.store_maybe_ref(root)
    }

    /// Append the bits and references of an existing cell.
    pub fn append_cell(&mut self, cell: &Cell) -> Result<&mut Self, WriteError> {
        self.assure_bits(cell.bit_len())?;
        if cell.refs().len() > self.refs_left() {
            return Err(WriteError::TooManyRefs(self.refs.len()));
        }
        for i in 0..cell.bit_len() {
            self.push_bit(cell.bit(i));
        }
        self.refs.extend(cell.refs().iter().cloned());
        Ok(self)
    }

    pub fn build(self) -> Result<Cell, WriteError> {
        Cell::new(&self.data, self.bit_len, self.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_is_big_endian_msb_first() {
        let mut b = CellBuilder::new();
        b.store_uint(0x5, 3).unwrap().store_uint(0xab, 8).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 11);
        assert_eq!(cell.data(), &[0b1011_0101, 0b0110_0000]);
    }

    #[test]
    fn uint_out_of_range() {
        let mut b = CellBuilder::new();
        assert!(matches!(
            b.store_uint(8, 3),
            Err(WriteError::ValueOutOfRange { bits: 3, .. })
        ));
    }

    #[test]
    fn negative_int_is_sign_extended() {
        let mut b = CellBuilder::new();
        b.store_int(-1, 257).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 257);
        assert!((0..257).all(|i| cell.bit(i)));
    }

    #[test]
    fn small_int_range_is_checked() {
        let mut b = CellBuilder::new();
        assert!(b.store_int(-8, 4).is_ok());
        assert!(b.store_int(8, 4).is_err());
        assert!(b.store_int(1, 0).is_err());
    }

    #[test]
    fn overflow_is_reported() {
        let mut b = CellBuilder::new();
        b.store_bytes(&[0u8; 127]).unwrap();
        assert_eq!(b.bits_left(), 7);
        assert!(matches!(
            b.store_uint(0, 8),
            Err(WriteError::CellOverflow { used: 1016, requested: 8 })
        ));
    }

    #[test]
    fn long_string_spills_into_refs() {
        let s = "x".repeat(300);
        let mut b = CellBuilder::new();
        b.store_string_tail(&s).unwrap();
        let cell = b.build().unwrap();
        assert_eq!(cell.bit_len(), 127 * 8);
        assert_eq!(cell.refs().len(), 1);
        assert_eq!(cell.refs()[0].refs().len(), 1);
    }

    #[test]
    fn coins_encoding() {
        let mut b = CellBuilder::new();
        b.store_coins(0).unwrap();
        assert_eq!(b.bits_used(), 4);
        b.store_coins(1_000_000_000).unwrap();
        assert_eq!(b.bits_used(), 4 + 4 + 32);
    }
}
