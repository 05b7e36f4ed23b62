//! Dictionaries (`HashmapE n X`)
//!
//! A dictionary is a binary Patricia tree over fixed-width keys. Every edge
//! carries a label (the bits shared by all keys below it) written with the
//! shortest of the three label encodings; forks hold their two subtrees as
//! references and leaves hold the value inline.
//!
//! ```text
//! hm_edge#_ label:(HmLabel ~l n) node:(HashmapNode m X) = Hashmap n X;
//! hml_short$0 len:(Unary ~n) s:(n * Bit)
//! hml_long$10 n:(#<= m) s:(n * Bit)
//! hml_same$11 v:Bit n:(#<= m)
//! ```

use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::deser::{ReadError, WriteError};
use crate::slice::CellSlice;
use std::collections::BTreeMap;

/// Key bits, most significant first.
pub type BitKey = Vec<bool>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    key_bits: usize,
    entries: BTreeMap<BitKey, Cell>,
}

/// Number of bits needed to write any value in `0..=m`.
fn len_bits(m: usize) -> usize {
    (usize::BITS - m.leading_zeros()) as usize
}

/// Two's complement bits of `value` on `bits` bits, sign extended above 128.
pub fn int_key(value: i128, bits: usize) -> Result<BitKey, WriteError> {
    if bits == 0 || bits > 257 {
        return Err(WriteError::UnsupportedWidth(bits));
    }
    if bits < 128 {
        let bound = 1i128 << (bits - 1);
        if value < -bound || value >= bound {
            return Err(WriteError::ValueOutOfRange {
                value: value.to_string(),
                bits,
            });
        }
    }
    let raw = value as u128;
    Ok((0..bits)
        .rev()
        .map(|i| if i >= 128 { value < 0 } else { (raw >> i) & 1 == 1 })
        .collect())
}

/// Inverse of `int_key`. Returns `None` when the value does not fit in an `i128`.
pub fn key_to_int(key: &[bool]) -> Option<i128> {
    let bits = key.len();
    if bits == 0 {
        return Some(0);
    }
    let negative = key[0];
    if bits > 128 && key[..=(bits - 128)].iter().any(|b| *b != negative) {
        return None;
    }
    let low = &key[bits.saturating_sub(128)..];
    let mut raw = 0u128;
    for b in low {
        raw = (raw << 1) | *b as u128;
    }
    if negative && low.len() < 128 {
        raw |= u128::MAX << low.len();
    }
    Some(raw as i128)
}

impl Dictionary {
    pub fn new(key_bits: usize) -> Self {
        Dictionary {
            key_bits,
            entries: BTreeMap::new(),
        }
    }

    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: BitKey, value: Cell) -> Result<Option<Cell>, WriteError> {
        if key.len() != self.key_bits {
            return Err(WriteError::UnsupportedWidth(key.len()));
        }
        Ok(self.entries.insert(key, value))
    }

    pub fn insert_int(&mut self, key: i128, value: Cell) -> Result<Option<Cell>, WriteError> {
        let key = int_key(key, self.key_bits)?;
        self.insert(key, value)
    }

    pub fn get(&self, key: &[bool]) -> Option<&Cell> {
        self.entries.get(key)
    }

    pub fn get_int(&self, key: i128) -> Option<&Cell> {
        int_key(key, self.key_bits)
            .ok()
            .and_then(|k| self.entries.get(&k))
    }

    /// Entries in key bit order (unsigned order of the raw keys).
    pub fn iter(&self) -> impl Iterator<Item = (&BitKey, &Cell)> {
        self.entries.iter()
    }

    /// Entries with integer keys, in numeric order.
    pub fn iter_int(&self) -> Vec<(i128, &Cell)> {
        let mut out: Vec<(i128, &Cell)> = self
            .entries
            .iter()
            .filter_map(|(k, v)| key_to_int(k).map(|k| (k, v)))
            .collect();
        out.sort_by_key(|(k, _)| *k);
        out
    }

    /// Build the root cell of the tree, `None` for an empty dictionary.
    pub fn build(&self) -> Result<Option<Cell>, WriteError> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let entries: Vec<(&BitKey, &Cell)> = self.entries.iter().collect();
        write_edge(&entries, 0, self.key_bits).map(Some)
    }

    /// Parse a tree from its (optional) root cell.
    pub fn parse(key_bits: usize, root: Option<&Cell>) -> Result<Self, ReadError> {
        let mut dict = Dictionary::new(key_bits);
        if let Some(root) = root {
            let mut prefix = Vec::with_capacity(key_bits);
            read_edge(root, &mut prefix, key_bits, &mut dict.entries)?;
        }
        Ok(dict)
    }
}

fn write_edge(entries: &[(&BitKey, &Cell)], pos: usize, m: usize) -> Result<Cell, WriteError> {
    let first = entries[0].0;
    let label_len = if entries.len() == 1 {
        m
    } else {
        let last = entries[entries.len() - 1].0;
        // entries are sorted, so the common prefix of all keys is the
        // common prefix of the first and the last one
        (0..m)
            .take_while(|i| first[pos + i] == last[pos + i])
            .count()
    };

    let mut builder = CellBuilder::new();
    write_label(&mut builder, &first[pos..pos + label_len], m)?;

    if label_len == m {
        builder.append_cell(entries[0].1)?;
    } else {
        let split = pos + label_len;
        let right_start = entries
            .iter()
            .position(|(k, _)| k[split])
            .unwrap_or(entries.len());
        let (left, right) = entries.split_at(right_start);
        let rest = m - label_len - 1;
        builder.store_ref(write_edge(left, split + 1, rest)?)?;
        builder.store_ref(write_edge(right, split + 1, rest)?)?;
    }
    builder.build()
}

fn write_label(builder: &mut CellBuilder, label: &[bool], m: usize) -> Result<(), WriteError> {
    let n = label.len();
    let k = len_bits(m);
    let short = 2 * n + 2;
    let long = 2 + k + n;
    let same = if n > 0 && label.iter().all(|b| *b == label[0]) {
        Some(3 + k)
    } else {
        None
    };

    match same {
        Some(same) if same < short && same < long => {
            builder.store_uint(0b11, 2)?;
            builder.store_bit(label[0])?;
            builder.store_uint(n as u128, k)?;
        }
        _ if short <= long => {
            builder.store_bit(false)?;
            for _ in 0..n {
                builder.store_bit(true)?;
            }
            builder.store_bit(false)?;
            for b in label {
                builder.store_bit(*b)?;
            }
        }
        _ => {
            builder.store_uint(0b10, 2)?;
            builder.store_uint(n as u128, k)?;
            for b in label {
                builder.store_bit(*b)?;
            }
        }
    }
    Ok(())
}

fn read_label(slice: &mut CellSlice, m: usize) -> Result<BitKey, ReadError> {
    let k = len_bits(m);
    let label = if !slice.load_bit()? {
        let mut n = 0;
        while slice.load_bit()? {
            n += 1;
        }
        check_label_len(n, m)?;
        (0..n).map(|_| slice.load_bit()).collect::<Result<_, _>>()?
    } else if !slice.load_bit()? {
        let n = slice.load_uint(k)? as usize;
        check_label_len(n, m)?;
        (0..n).map(|_| slice.load_bit()).collect::<Result<_, _>>()?
    } else {
        let v = slice.load_bit()?;
        let n = slice.load_uint(k)? as usize;
        check_label_len(n, m)?;
        vec![v; n]
    };
    Ok(label)
}

fn check_label_len(n: usize, m: usize) -> Result<(), ReadError> {
    if n > m {
        Err(ReadError::StructureInvalid(format!(
            "label of {} bits exceeds the {} key bits left",
            n, m
        )))
    } else {
        Ok(())
    }
}

fn read_edge(
    cell: &Cell,
    prefix: &mut BitKey,
    m: usize,
    out: &mut BTreeMap<BitKey, Cell>,
) -> Result<(), ReadError> {
    let mut slice = CellSlice::new(cell);
    let label = read_label(&mut slice, m)?;
    let depth = prefix.len();
    prefix.extend_from_slice(&label);
    let rest = m - label.len();

    if rest == 0 {
        out.insert(prefix.clone(), slice.load_remainder()?);
    } else {
        let left = slice.load_ref()?;
        let right = slice.load_ref()?;
        for (bit, child) in [(false, left), (true, right)] {
            prefix.push(bit);
            read_edge(child, prefix, rest - 1, out)?;
            prefix.pop();
        }
    }
    prefix.truncate(depth);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn value(v: u32) -> Cell {
        let mut b = CellBuilder::new();
        b.store_uint(v as u128, 32).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn empty_dictionary_has_no_root() {
        assert_eq!(Dictionary::new(32).build().unwrap(), None);
        assert!(Dictionary::parse(32, None).unwrap().is_empty());
    }

    #[test]
    fn single_entry_uses_one_cell() {
        let mut d = Dictionary::new(257);
        d.insert_int(0, value(7)).unwrap();
        let root = d.build().unwrap().unwrap();
        assert!(root.refs().is_empty());
        let parsed = Dictionary::parse(257, Some(&root)).unwrap();
        assert_eq!(parsed.get_int(0), Some(&value(7)));
    }

    #[test]
    fn negative_keys_are_ordered_numerically() {
        let mut d = Dictionary::new(16);
        for k in [-3i128, 5, 0, -1] {
            d.insert_int(k, value(k as u32)).unwrap();
        }
        let root = d.build().unwrap().unwrap();
        let parsed = Dictionary::parse(16, Some(&root)).unwrap();
        let keys: Vec<i128> = parsed.iter_int().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![-3, -1, 0, 5]);
    }

    #[test]
    fn oversized_label_is_rejected() {
        // hml_long with n = 5 on a 4-bit key
        let mut b = CellBuilder::new();
        b.store_uint(0b10, 2).unwrap().store_uint(5, 3).unwrap();
        b.store_uint(0, 5).unwrap();
        let root = b.build().unwrap();
        assert!(matches!(
            Dictionary::parse(4, Some(&root)),
            Err(ReadError::StructureInvalid(_))
        ));
    }

    #[test]
    fn key_conversion() {
        assert_eq!(key_to_int(&int_key(-2, 257).unwrap()), Some(-2));
        assert_eq!(key_to_int(&int_key(i128::MAX, 200).unwrap()), Some(i128::MAX));
        assert!(int_key(8, 4).is_err());
    }

    #[quickcheck]
    fn dictionary_bijection(entries: Vec<(u16, u32)>) -> bool {
        let mut d = Dictionary::new(257);
        for (k, v) in &entries {
            d.insert_int(*k as i128, value(*v)).unwrap();
        }
        let root = d.build().unwrap();
        let parsed = Dictionary::parse(257, root.as_ref()).unwrap();
        parsed == d
    }
}
