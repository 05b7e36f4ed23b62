//! Bag of cells
//!
//! Serialization writes the generic `serialized_boc` layout with a single
//! root, no index and no checksum. Deserialization also accepts the index
//! and the trailing CRC32C, which is verified.

use crate::cell::Cell;
use crate::deser::ReadError;
use std::collections::{HashMap, HashSet};

const BOC_MAGIC: [u8; 4] = [0xb5, 0xee, 0x9c, 0x72];

const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;
const FLAG_HAS_CACHE_BITS: u8 = 0x20;

/// A local memory slice to read the header and cell table from
struct ReadBuf<'a> {
    offset: usize,
    data: &'a [u8],
}

impl<'a> ReadBuf<'a> {
    fn from(data: &'a [u8]) -> Self {
        ReadBuf { offset: 0, data }
    }

    fn left(&self) -> usize {
        self.data.len() - self.offset
    }

    fn get_slice(&mut self, sz: usize) -> Result<&'a [u8], ReadError> {
        if self.left() < sz {
            return Err(ReadError::InvalidBoc(format!(
                "truncated: {} bytes left, {} needed",
                self.left(),
                sz
            )));
        }
        let s = &self.data[self.offset..self.offset + sz];
        self.offset += sz;
        Ok(s)
    }

    fn get_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.get_slice(1)?[0])
    }

    /// Big-endian unsigned integer of `sz` bytes
    fn get_uint(&mut self, sz: usize) -> Result<usize, ReadError> {
        Ok(self
            .get_slice(sz)?
            .iter()
            .fold(0usize, |acc, b| (acc << 8) | *b as usize))
    }
}

fn bytes_needed(value: usize) -> usize {
    let bits = (usize::BITS - value.leading_zeros()) as usize;
    ((bits + 7) / 8).max(1)
}

fn put_uint(out: &mut Vec<u8>, value: usize, sz: usize) {
    for i in (0..sz).rev() {
        out.push((value >> (8 * i)) as u8);
    }
}

/// Cells in reverse post-order: every parent comes before its children and
/// shared subtrees are written once.
fn topological_order(root: &Cell) -> Vec<Cell> {
    fn visit(cell: &Cell, seen: &mut HashSet<[u8; 32]>, post: &mut Vec<Cell>) {
        if !seen.insert(*cell.hash()) {
            return;
        }
        for r in cell.refs() {
            visit(r, seen, post);
        }
        post.push(cell.clone());
    }

    let mut seen = HashSet::new();
    let mut post = Vec::new();
    visit(root, &mut seen, &mut post);
    post.reverse();
    post
}

pub fn serialize_boc(root: &Cell) -> Vec<u8> {
    let cells = topological_order(root);
    let index: HashMap<[u8; 32], usize> = cells
        .iter()
        .enumerate()
        .map(|(i, c)| (*c.hash(), i))
        .collect();
    let size_bytes = bytes_needed(cells.len());

    let mut body = Vec::new();
    for cell in &cells {
        body.extend_from_slice(&cell.descriptors());
        body.extend_from_slice(&cell.padded_data());
        for r in cell.refs() {
            put_uint(&mut body, index[r.hash()], size_bytes);
        }
    }
    let off_bytes = bytes_needed(body.len());

    let mut out = Vec::with_capacity(body.len() + 16);
    out.extend_from_slice(&BOC_MAGIC);
    out.push(size_bytes as u8);
    out.push(off_bytes as u8);
    put_uint(&mut out, cells.len(), size_bytes);
    put_uint(&mut out, 1, size_bytes);
    put_uint(&mut out, 0, size_bytes);
    put_uint(&mut out, body.len(), off_bytes);
    put_uint(&mut out, 0, size_bytes);
    out.extend_from_slice(&body);
    out
}

pub fn serialize_boc_base64(root: &Cell) -> String {
    base64::encode(serialize_boc(root))
}

struct RawCell<'a> {
    data: &'a [u8],
    bit_len: usize,
    refs: Vec<usize>,
}

pub fn deserialize_boc(bytes: &[u8]) -> Result<Cell, ReadError> {
    let mut buf = ReadBuf::from(bytes);
    if buf.get_slice(4)? != BOC_MAGIC {
        return Err(ReadError::InvalidBoc("unknown magic".to_string()));
    }
    let flags = buf.get_u8()?;
    let size_bytes = (flags & 0x07) as usize;
    if size_bytes == 0 || size_bytes > 4 {
        return Err(ReadError::InvalidBoc(format!(
            "invalid reference size {}",
            size_bytes
        )));
    }
    if flags & FLAG_HAS_CACHE_BITS != 0 && flags & FLAG_HAS_IDX == 0 {
        return Err(ReadError::InvalidBoc(
            "cache bits without an index".to_string(),
        ));
    }
    let off_bytes = buf.get_u8()? as usize;
    if off_bytes == 0 || off_bytes > 8 {
        return Err(ReadError::InvalidBoc(format!(
            "invalid offset size {}",
            off_bytes
        )));
    }
    let cell_count = buf.get_uint(size_bytes)?;
    let roots = buf.get_uint(size_bytes)?;
    let absent = buf.get_uint(size_bytes)?;
    let total_size = buf.get_uint(off_bytes)?;
    if roots != 1 {
        return Err(ReadError::InvalidBoc(format!(
            "expected exactly one root, got {}",
            roots
        )));
    }
    if absent != 0 {
        return Err(ReadError::InvalidBoc("absent cells are not supported".to_string()));
    }
    // every cell takes at least its two descriptor bytes
    if cell_count == 0 || cell_count > total_size / 2 {
        return Err(ReadError::InvalidBoc(format!(
            "{} cells cannot fit in {} bytes",
            cell_count, total_size
        )));
    }
    let root_index = buf.get_uint(size_bytes)?;
    if root_index >= cell_count {
        return Err(ReadError::InvalidBoc(format!(
            "root index {} out of range",
            root_index
        )));
    }
    if flags & FLAG_HAS_IDX != 0 {
        let index_len = cell_count
            .checked_mul(off_bytes)
            .ok_or_else(|| ReadError::InvalidBoc("index size overflows".to_string()))?;
        buf.get_slice(index_len)?;
    }
    let mut cells_buf = ReadBuf::from(buf.get_slice(total_size)?);

    if flags & FLAG_HAS_CRC32C != 0 {
        let checked = buf.offset;
        let stored = buf.get_slice(4)?;
        let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
        if crc32c(&bytes[..checked]) != stored {
            return Err(ReadError::InvalidBoc("crc32c mismatch".to_string()));
        }
    }

    let mut raw = Vec::with_capacity(cell_count);
    for i in 0..cell_count {
        let d1 = cells_buf.get_u8()?;
        let d2 = cells_buf.get_u8()? as usize;
        if d1 & 0x08 != 0 || d1 >> 5 != 0 {
            return Err(ReadError::InvalidBoc(format!(
                "cell {} is exotic or has a non-zero level",
                i
            )));
        }
        if d1 & 0x10 != 0 {
            // stored hashes and depths of a level 0 cell
            cells_buf.get_slice(32 + 2)?;
        }
        let ref_count = (d1 & 0x07) as usize;
        let data = cells_buf.get_slice((d2 + 1) / 2)?;
        let bit_len = if d2 % 2 == 0 {
            data.len() * 8
        } else {
            let last = *data.last().ok_or_else(|| {
                ReadError::InvalidBoc(format!("cell {} has an empty padded data", i))
            })?;
            if last == 0 {
                return Err(ReadError::InvalidBoc(format!(
                    "cell {} misses its completion tag",
                    i
                )));
            }
            data.len() * 8 - last.trailing_zeros() as usize - 1
        };
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let r = cells_buf.get_uint(size_bytes)?;
            if r <= i || r >= cell_count {
                return Err(ReadError::InvalidBoc(format!(
                    "cell {} references out of order cell {}",
                    i, r
                )));
            }
            refs.push(r);
        }
        raw.push(RawCell { data, bit_len, refs });
    }

    let mut built: Vec<Option<Cell>> = vec![None; cell_count];
    for i in (0..cell_count).rev() {
        let refs = raw[i]
            .refs
            .iter()
            .map(|r| built[*r].clone())
            .collect::<Option<Vec<Cell>>>()
            .ok_or_else(|| ReadError::InvalidBoc(format!("cell {} has a dangling reference", i)))?;
        let cell = Cell::new(raw[i].data, raw[i].bit_len, refs)
            .map_err(|e| ReadError::InvalidBoc(e.to_string()))?;
        built[i] = Some(cell);
    }

    built
        .get(root_index)
        .cloned()
        .flatten()
        .ok_or_else(|| ReadError::InvalidBoc(format!("root index {} out of range", root_index)))
}

pub fn deserialize_boc_base64(s: &str) -> Result<Cell, ReadError> {
    let bytes = base64::decode(s.trim())
        .map_err(|e| ReadError::InvalidBoc(format!("invalid base64: {}", e)))?;
    deserialize_boc(&bytes)
}

/// CRC-32C (Castagnoli), as appended to checksummed bags of cells
fn crc32c(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &b in data {
        crc ^= b as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x82f6_3b78
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CellBuilder;
    use quickcheck_macros::quickcheck;

    #[test]
    fn empty_cell_layout() {
        let boc = serialize_boc(&Cell::empty());
        assert_eq!(hex::encode(&boc), "b5ee9c72010101010002000000");
    }

    #[test]
    fn checksummed_boc_is_accepted() {
        let cell = deserialize_boc_base64("te6cckEBAQEAAgAAAEysuc0=").unwrap();
        assert_eq!(cell, Cell::empty());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut bytes = base64::decode("te6cckEBAQEAAgAAAEysuc0=").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            deserialize_boc(&bytes),
            Err(ReadError::InvalidBoc(_))
        ));
    }

    #[test]
    fn shared_cells_are_written_once() {
        let mut leaf = CellBuilder::new();
        leaf.store_uint(0xdead, 16).unwrap();
        let leaf = leaf.build().unwrap();
        let mut root = CellBuilder::new();
        root.store_ref(leaf.clone()).unwrap();
        root.store_ref(leaf).unwrap();
        let root = root.build().unwrap();

        let boc = serialize_boc(&root);
        // header: cells count is the 7th byte
        assert_eq!(boc[6], 2);
        assert_eq!(deserialize_boc(&boc).unwrap(), root);
    }

    #[test]
    fn oversized_cell_count_is_rejected() {
        let bytes = hex::decode("b5ee9c720401ffffffff00000001000000000000000000").unwrap();
        assert!(matches!(
            deserialize_boc(&bytes),
            Err(ReadError::InvalidBoc(_))
        ));
    }

    #[test]
    fn root_index_must_name_a_cell() {
        // one empty cell, root index 1
        let bytes = hex::decode("b5ee9c72010101010002010000").unwrap();
        assert!(matches!(
            deserialize_boc(&bytes),
            Err(ReadError::InvalidBoc(_))
        ));
    }

    #[test]
    fn truncated_boc() {
        let boc = serialize_boc(&Cell::empty());
        assert!(deserialize_boc(&boc[..boc.len() - 1]).is_err());
    }

    #[quickcheck]
    fn boc_bijection(chunks: Vec<(u8, String)>) -> bool {
        let mut root = CellBuilder::new();
        for (bits, s) in chunks.iter().take(4) {
            let mut child = CellBuilder::new();
            let width = (*bits % 9) as usize;
            child
                .store_uint(*bits as u128 & ((1u128 << width) - 1), width)
                .unwrap();
            child.store_string_ref_tail(s).unwrap();
            root.store_ref(child.build().unwrap()).unwrap();
        }
        let root = root.build().unwrap();
        deserialize_boc_base64(&serialize_boc_base64(&root)).unwrap() == root
    }
}
