use crate::address::Address;
use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::deser::{Deserialize, ReadError};

/// A read cursor over the bits and references of a cell
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_offset: usize,
    ref_offset: usize,
}

impl<'a> CellSlice<'a> {
    /// Create a slice positioned at the beginning of the cell
    pub fn new(cell: &'a Cell) -> Self {
        CellSlice {
            cell,
            bit_offset: 0,
            ref_offset: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.bit_offset
    }

    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len() - self.bit_offset
    }

    pub fn remaining_refs(&self) -> usize {
        self.cell.refs().len() - self.ref_offset
    }

    fn assure_bits(&self, expected: usize) -> Result<(), ReadError> {
        let left = self.remaining_bits();
        if left >= expected {
            Ok(())
        } else {
            Err(ReadError::NotEnoughBits(left, expected))
        }
    }

    fn assure_refs(&self, expected: usize) -> Result<(), ReadError> {
        let left = self.remaining_refs();
        if left >= expected {
            Ok(())
        } else {
            Err(ReadError::NotEnoughRefs(left, expected))
        }
    }

    /// Check if everything has been properly consumed
    pub fn expect_end(&self) -> Result<(), ReadError> {
        let bits = self.remaining_bits();
        let refs = self.remaining_refs();
        if bits == 0 && refs == 0 {
            Ok(())
        } else {
            Err(ReadError::UnconsumedData(bits, refs))
        }
    }

    /// Check if we reach the end of the data bits
    pub fn is_end(&self) -> bool {
        self.remaining_bits() == 0
    }

    pub fn skip_bits(&mut self, sz: usize) -> Result<(), ReadError> {
        self.assure_bits(sz)?;
        self.bit_offset += sz;
        Ok(())
    }

    /// Peek at the next bit. The cursor is **not** advanced.
    pub fn peek_bit(&self) -> Result<bool, ReadError> {
        self.assure_bits(1)?;
        Ok(self.cell.bit(self.bit_offset))
    }

    pub fn load_bit(&mut self) -> Result<bool, ReadError> {
        let v = self.peek_bit()?;
        self.bit_offset += 1;
        Ok(v)
    }

    /// Return the next `bits` bits as an unsigned value (at most 128)
    pub fn load_uint(&mut self, bits: usize) -> Result<u128, ReadError> {
        if bits > 128 {
            return Err(ReadError::IntegerOverflow(128));
        }
        self.assure_bits(bits)?;
        let mut v = 0u128;
        for _ in 0..bits {
            v = (v << 1) | self.cell.bit(self.bit_offset) as u128;
            self.bit_offset += 1;
        }
        Ok(v)
    }

    pub fn load_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.load_uint(8)? as u8)
    }

    pub fn load_u32(&mut self) -> Result<u32, ReadError> {
        Ok(self.load_uint(32)? as u32)
    }

    pub fn load_u64(&mut self) -> Result<u64, ReadError> {
        Ok(self.load_uint(64)? as u64)
    }

    /// Return the next `bits` bits as a two's complement value (at most 257).
    ///
    /// Values wider than 128 bits must be sign extended, otherwise
    /// `IntegerOverflow` is returned.
    pub fn load_int(&mut self, bits: usize) -> Result<i128, ReadError> {
        if bits > 257 {
            return Err(ReadError::IntegerOverflow(257));
        }
        if bits == 0 {
            return Ok(0);
        }
        self.assure_bits(bits)?;
        let start = self.bit_offset;
        let negative = self.cell.bit(start);
        if bits > 128 {
            for i in 0..=(bits - 128) {
                if self.cell.bit(start + i) != negative {
                    return Err(ReadError::IntegerOverflow(128));
                }
            }
            self.bit_offset += bits - 128;
            return Ok(self.load_uint(128)? as i128);
        }
        let raw = self.load_uint(bits)?;
        if bits == 128 || !negative {
            Ok(raw as i128)
        } else {
            Ok((raw | (u128::MAX << bits)) as i128)
        }
    }

    pub fn load_bytes(&mut self, sz: usize) -> Result<Vec<u8>, ReadError> {
        self.assure_bits(sz * 8)?;
        let mut out = Vec::with_capacity(sz);
        for _ in 0..sz {
            out.push(self.load_uint(8)? as u8);
        }
        Ok(out)
    }

    pub fn load_coins(&mut self) -> Result<u128, ReadError> {
        let len = self.load_uint(4)? as usize;
        self.load_uint(len * 8)
    }

    pub fn load_ref(&mut self) -> Result<&'a Cell, ReadError> {
        self.assure_refs(1)?;
        let cell: &'a Cell = self.cell;
        let r = &cell.refs()[self.ref_offset];
        self.ref_offset += 1;
        Ok(r)
    }

    pub fn load_maybe_ref(&mut self) -> Result<Option<&'a Cell>, ReadError> {
        if self.load_bit()? {
            self.load_ref().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Read a snake string: the remaining bytes of this slice followed by
    /// the chain of first references.
    pub fn load_string_tail(&mut self) -> Result<String, ReadError> {
        let mut bytes = Vec::new();
        let rest = self.remaining_bits();
        if rest % 8 != 0 {
            return Err(ReadError::StructureInvalid(format!(
                "string tail is not byte aligned ({} bits)",
                rest
            )));
        }
        bytes.extend(self.load_bytes(rest / 8)?);
        let mut next = if self.remaining_refs() > 0 {
            Some(self.load_ref()?)
        } else {
            None
        };
        while let Some(cell) = next {
            let mut s = CellSlice::new(cell);
            let rest = s.remaining_bits();
            if rest % 8 != 0 {
                return Err(ReadError::StructureInvalid(format!(
                    "string continuation is not byte aligned ({} bits)",
                    rest
                )));
            }
            bytes.extend(s.load_bytes(rest / 8)?);
            next = if s.remaining_refs() > 0 {
                Some(s.load_ref()?)
            } else {
                None
            };
        }
        String::from_utf8(bytes).map_err(|_| ReadError::InvalidUtf8)
    }

    /// Read a string stored as a reference to its own snake cell.
    pub fn load_string_ref_tail(&mut self) -> Result<String, ReadError> {
        let cell = self.load_ref()?;
        CellSlice::new(cell).load_string_tail()
    }

    /// `MsgAddress`: `None` for `addr_none`.
    pub fn load_address(&mut self) -> Result<Option<Address>, ReadError> {
        let start = self.bit_offset;
        if self.remaining_bits() >= 2 && !self.cell.bit(start) && !self.cell.bit(start + 1) {
            self.bit_offset += 2;
            return Ok(None);
        }
        Address::deserialize(self).map(Some)
    }

    /// `HashmapE` root reference.
    pub fn load_dict(&mut self) -> Result<Option<&'a Cell>, ReadError> {
        self.load_maybe_ref()
    }

    /// Consume the remaining bits and references into a new cell.
    pub fn load_remainder(&mut self) -> Result<Cell, ReadError> {
        let mut builder = CellBuilder::new();
        while !self.is_end() {
            let bit = self.load_bit()?;
            builder
                .store_bit(bit)
                .map_err(|e| ReadError::StructureInvalid(e.to_string()))?;
        }
        while self.remaining_refs() > 0 {
            let r = self.load_ref()?;
            builder
                .store_ref(r.clone())
                .map_err(|e| ReadError::StructureInvalid(e.to_string()))?;
        }
        builder
            .build()
            .map_err(|e| ReadError::StructureInvalid(e.to_string()))
    }

    pub fn debug(&self) -> String {
        let mut s = String::new();
        for i in 0..self.cell.bit_len() {
            if i == self.bit_offset {
                s.push_str(".. ");
            }
            s.push(if self.cell.bit(i) { '1' } else { '0' });
        }
        s
    }
}
