//! Immutable cells
//!
//! A cell holds up to 1023 bits of data and up to 4 references to other
//! cells. Its identity is the representation hash, computed once when the
//! cell is created: the two descriptor bytes, the data padded with the
//! completion tag, the depth of every child and the hash of every child,
//! all fed to SHA-256.
//!
//! Only ordinary (level 0) cells are supported.

use crate::deser::WriteError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

pub const MAX_DATA_BITS: usize = 1023;
pub const MAX_REFS: usize = 4;

pub type CellHash = [u8; 32];

#[derive(Clone)]
pub struct Cell(Arc<CellInner>);

struct CellInner {
    data: Box<[u8]>,
    bit_len: usize,
    refs: Vec<Cell>,
    hash: CellHash,
    depth: u16,
}

impl Cell {
    /// Create a cell from raw data bits and references.
    ///
    /// `data` must hold at least `bit_len` bits; anything after `bit_len`
    /// is cleared.
    pub fn new(data: &[u8], bit_len: usize, refs: Vec<Cell>) -> Result<Self, WriteError> {
        if bit_len > MAX_DATA_BITS {
            return Err(WriteError::CellOverflow {
                used: 0,
                requested: bit_len,
            });
        }
        if refs.len() > MAX_REFS {
            return Err(WriteError::TooManyRefs(refs.len()));
        }
        let byte_len = (bit_len + 7) / 8;
        if data.len() < byte_len {
            return Err(WriteError::CellOverflow {
                used: data.len() * 8,
                requested: bit_len,
            });
        }
        let mut data = data[..byte_len].to_vec();
        if bit_len % 8 != 0 {
            let keep = 0xffu8 << (8 - bit_len % 8);
            data[byte_len - 1] &= keep;
        }

        let depth = refs
            .iter()
            .map(|r| r.depth().saturating_add(1))
            .max()
            .unwrap_or(0);
        let hash = representation_hash(&data, bit_len, &refs);

        Ok(Cell(Arc::new(CellInner {
            data: data.into_boxed_slice(),
            bit_len,
            refs,
            hash,
            depth,
        })))
    }

    pub fn empty() -> Self {
        Cell(Arc::new(CellInner {
            data: Box::new([]),
            bit_len: 0,
            refs: Vec::new(),
            hash: representation_hash(&[], 0, &[]),
            depth: 0,
        }))
    }

    pub fn bit_len(&self) -> usize {
        self.0.bit_len
    }

    /// Data bytes; the last byte is zero-filled after `bit_len`.
    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    pub fn refs(&self) -> &[Cell] {
        &self.0.refs
    }

    pub fn reference(&self, index: usize) -> Option<&Cell> {
        self.0.refs.get(index)
    }

    pub fn hash(&self) -> &CellHash {
        &self.0.hash
    }

    pub fn depth(&self) -> u16 {
        self.0.depth
    }

    pub fn bit(&self, index: usize) -> bool {
        debug_assert!(index < self.bit_len());
        (self.0.data[index / 8] >> (7 - index % 8)) & 1 == 1
    }

    /// The two descriptor bytes `d1` and `d2`.
    pub fn descriptors(&self) -> [u8; 2] {
        descriptors(self.0.bit_len, self.0.refs.len())
    }

    /// Data with the completion tag appended when the length is not byte aligned.
    pub fn padded_data(&self) -> Vec<u8> {
        padded(&self.0.data, self.0.bit_len)
    }
}

fn descriptors(bit_len: usize, refs: usize) -> [u8; 2] {
    let d1 = refs as u8;
    let d2 = (bit_len / 8 + (bit_len + 7) / 8) as u8;
    [d1, d2]
}

fn padded(data: &[u8], bit_len: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    if bit_len % 8 != 0 {
        let last = out.len() - 1;
        out[last] |= 0x80 >> (bit_len % 8);
    }
    out
}

fn representation_hash(data: &[u8], bit_len: usize, refs: &[Cell]) -> CellHash {
    let mut hasher = Sha256::new();
    hasher.update(descriptors(bit_len, refs.len()));
    hasher.update(padded(data, bit_len));
    for r in refs {
        hasher.update(r.depth().to_be_bytes());
    }
    for r in refs {
        hasher.update(r.hash());
    }
    hasher.finalize().into()
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write(self.hash())
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cell {{ bits: {}, data: {}, refs: {:?} }}",
            self.bit_len(),
            hex::encode(self.data()),
            self.refs()
        )
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_hash() {
        // well-known hash of the empty ordinary cell
        assert_eq!(
            hex::encode(Cell::empty().hash()),
            "96a296d224f285c67bee93c30f8a309157f0daa35dc5b87e410b78630a09cfc7"
        );
    }

    #[test]
    fn trailing_bits_are_cleared() {
        let a = Cell::new(&[0b1011_1111], 3, vec![]).unwrap();
        let b = Cell::new(&[0b1010_0000], 3, vec![]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.data(), &[0b1010_0000]);
        assert_eq!(a.padded_data(), vec![0b1011_0000]);
    }

    #[test]
    fn depth_follows_children() {
        let leaf = Cell::empty();
        let mid = Cell::new(&[], 0, vec![leaf.clone()]).unwrap();
        let top = Cell::new(&[], 0, vec![leaf, mid]).unwrap();
        assert_eq!(top.depth(), 2);
        assert_eq!(top.descriptors(), [2, 0]);
    }

    #[test]
    fn too_many_refs() {
        let refs = vec![Cell::empty(); 5];
        assert_eq!(Cell::new(&[], 0, refs), Err(WriteError::TooManyRefs(5)));
    }
}
