use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::slice::CellSlice;
use thiserror::Error;

/// Error raised when reading typed values out of a cell slice or a bag of cells.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Return the number of bits left and the number of bits demanded
    #[error("not enough bits: {0} available, {1} requested")]
    NotEnoughBits(usize, usize),
    /// Return the number of references left and the number demanded
    #[error("not enough references: {0} available, {1} requested")]
    NotEnoughRefs(usize, usize),
    /// Data is left in the slice (bits, references)
    #[error("unconsumed data: {0} bits and {1} references left")]
    UnconsumedData(usize, usize),
    /// A value was read but does not fit the requested integer type
    #[error("value does not fit in {0} bits")]
    IntegerOverflow(usize),
    /// String bytes are not valid UTF-8
    #[error("string tail is not valid UTF-8")]
    InvalidUtf8,
    /// Unknown constructor tag
    #[error("unknown tag {0:#x}")]
    UnknownTag(u32),
    /// Data is malformed in a way only the reader understands
    #[error("invalid structure: {0}")]
    StructureInvalid(String),
    /// Bag of cells is malformed
    #[error("invalid bag of cells: {0}")]
    InvalidBoc(String),
}

/// Error raised while building a cell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("cell overflow: {used} bits used, {requested} more requested")]
    CellOverflow { used: usize, requested: usize },
    #[error("cell already holds {0} references")]
    TooManyRefs(usize),
    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange { value: String, bits: usize },
    #[error("unsupported integer width {0}")]
    UnsupportedWidth(usize),
}

/// Define that an object can be written into a cell builder.
pub trait Serialize {
    fn serialize(&self, builder: &mut CellBuilder) -> Result<(), WriteError>;

    /// Convenience method to serialize into a fresh cell.
    fn to_cell(&self) -> Result<Cell, WriteError> {
        let mut builder = CellBuilder::new();
        self.serialize(&mut builder)?;
        builder.build()
    }
}

impl<T: Serialize> Serialize for &T {
    fn serialize(&self, builder: &mut CellBuilder) -> Result<(), WriteError> {
        (**self).serialize(builder)
    }
}

/// Define that an object can be read back from a cell slice.
pub trait Deserialize: Sized {
    fn deserialize(slice: &mut CellSlice) -> Result<Self, ReadError>;

    /// Read the object from the whole cell, failing if anything is left over.
    fn from_cell(cell: &Cell) -> Result<Self, ReadError> {
        let mut slice = CellSlice::new(cell);
        let value = Self::deserialize(&mut slice)?;
        slice.expect_end()?;
        Ok(value)
    }
}

impl Deserialize for () {
    fn deserialize(_: &mut CellSlice) -> Result<(), ReadError> {
        Ok(())
    }
}

impl Serialize for String {
    fn serialize(&self, builder: &mut CellBuilder) -> Result<(), WriteError> {
        builder.store_string_tail(self)?;
        Ok(())
    }
}

impl Deserialize for String {
    fn deserialize(slice: &mut CellSlice) -> Result<Self, ReadError> {
        slice.load_string_tail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_round_trip_through_cells() {
        for text in ["", "Best color?", &"lunch ".repeat(40)] {
            let cell = text.to_string().to_cell().unwrap();
            assert_eq!(String::from_cell(&cell).unwrap(), text);
        }
    }
}
