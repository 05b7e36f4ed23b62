//! Cell serialization for the TON virtual machine
//!
//! Typed builders and readers over cells, fixed-width key dictionaries,
//! bag-of-cells encoding and standard internal addresses.

pub mod address;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod deser;
pub mod dict;
pub mod slice;

pub use crate::{
    address::{Address, AddressError, FriendlyFlags},
    boc::{deserialize_boc, deserialize_boc_base64, serialize_boc, serialize_boc_base64},
    builder::CellBuilder,
    cell::{Cell, CellHash},
    deser::{Deserialize, ReadError, Serialize, WriteError},
    dict::Dictionary,
    slice::CellSlice,
};
