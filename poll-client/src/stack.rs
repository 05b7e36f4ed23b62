//! Classification of get-method stack items.
//!
//! The same logical value reaches us in different JSON shapes depending on
//! the node client and method:
//!
//! * toncenter v2 top-level items: `["num", "0x1f"]`, `["cell", {"bytes": ..}]`,
//!   `["tuple", {"elements": [..]}]`
//! * tonlib entries nested inside tuples:
//!   `{"@type": "tvm.stackEntryNumber", "number": {"number": "31"}}`
//! * toncenter v3 / indexer items: `{"type": "num", "value": "0x1f"}`
//!
//! Every item is classified once into a `StackEntry`; extraction then works
//! on the typed value. Shapes we do not know become `Unrecognized` and the
//! decoders replace them with placeholders.

use serde_json::Value;
use ton_ser::{deserialize_boc_base64, Address, Cell, CellSlice, ReadError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEntry {
    Int(i128),
    Cell(Cell),
    Slice(Cell),
    Tuple(Vec<StackEntry>),
    Null,
    Unrecognized(String),
}

/// Parse `"0x1f"`, `"-0x1f"` or `"31"`.
pub fn parse_int(s: &str) -> Option<i128> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn int_from(value: &Value) -> Option<i128> {
    match value {
        Value::String(s) => parse_int(s),
        Value::Number(n) => n.as_i64().map(|v| v as i128),
        _ => None,
    }
}

fn boc_from(value: &Value) -> Result<Cell, String> {
    let bytes = match value {
        Value::String(s) => s.as_str(),
        Value::Object(o) => o
            .get("bytes")
            .and_then(Value::as_str)
            .ok_or_else(|| "cell object without bytes".to_string())?,
        other => return Err(format!("unexpected cell payload {}", other)),
    };
    deserialize_boc_base64(bytes).map_err(|e| e.to_string())
}

fn unrecognized(value: &Value) -> StackEntry {
    StackEntry::Unrecognized(value.to_string())
}

impl StackEntry {
    pub fn classify(value: &Value) -> StackEntry {
        match value {
            Value::Array(items) if items.len() == 2 => match items[0].as_str() {
                Some(tag) => Self::classify_tagged(tag, &items[1]),
                None => unrecognized(value),
            },
            Value::Object(o) if o.contains_key("@type") => Self::classify_tonlib(value),
            Value::Object(o) if o.contains_key("type") => {
                match o.get("type").and_then(Value::as_str) {
                    Some(tag) => Self::classify_tagged(tag, o.get("value").unwrap_or(&Value::Null)),
                    None => unrecognized(value),
                }
            }
            Value::Null => StackEntry::Null,
            _ => unrecognized(value),
        }
    }

    /// toncenter v2 top-level and v3 items share their tag names.
    fn classify_tagged(tag: &str, payload: &Value) -> StackEntry {
        match tag {
            "num" | "int" => int_from(payload)
                .map(StackEntry::Int)
                .unwrap_or_else(|| unrecognized(payload)),
            "cell" => boc_from(payload)
                .map(StackEntry::Cell)
                .unwrap_or(StackEntry::Unrecognized(tag.to_string())),
            "slice" => boc_from(payload)
                .map(StackEntry::Slice)
                .unwrap_or(StackEntry::Unrecognized(tag.to_string())),
            "null" => StackEntry::Null,
            "tuple" | "list" => {
                let elements = match payload {
                    Value::Array(items) => items,
                    Value::Object(o) => match o.get("elements").and_then(Value::as_array) {
                        Some(items) => items,
                        None => return unrecognized(payload),
                    },
                    _ => return unrecognized(payload),
                };
                StackEntry::Tuple(elements.iter().map(StackEntry::classify).collect())
            }
            other => StackEntry::Unrecognized(other.to_string()),
        }
    }

    fn classify_tonlib(value: &Value) -> StackEntry {
        let kind = value.get("@type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "tvm.stackEntryNumber" => value
                .get("number")
                .and_then(|n| n.get("number"))
                .and_then(int_from)
                .map(StackEntry::Int)
                .unwrap_or_else(|| unrecognized(value)),
            "tvm.stackEntryCell" => value
                .get("cell")
                .and_then(|c| boc_from(c).ok())
                .map(StackEntry::Cell)
                .unwrap_or_else(|| unrecognized(value)),
            "tvm.stackEntrySlice" => value
                .get("slice")
                .and_then(|c| boc_from(c).ok())
                .map(StackEntry::Slice)
                .unwrap_or_else(|| unrecognized(value)),
            "tvm.stackEntryTuple" | "tvm.stackEntryList" => {
                let inner = value.get("tuple").or_else(|| value.get("list"));
                match inner
                    .and_then(|t| t.get("elements"))
                    .and_then(Value::as_array)
                {
                    Some(items) => StackEntry::Tuple(items.iter().map(StackEntry::classify).collect()),
                    None => unrecognized(value),
                }
            }
            "tvm.stackEntryNull" => StackEntry::Null,
            _ => unrecognized(value),
        }
    }

    pub fn classify_all(values: &[Value]) -> Vec<StackEntry> {
        values.iter().map(StackEntry::classify).collect()
    }

    /// Integer value. A cell holding only the number is accepted too: 257,
    /// 64 or 32 bits are read as signed Tact integers, other widths up to
    /// 128 bits as unsigned.
    pub fn to_int(&self) -> Result<i128, ReadError> {
        match self {
            StackEntry::Int(v) => Ok(*v),
            StackEntry::Cell(cell) | StackEntry::Slice(cell) => {
                let mut slice = CellSlice::new(cell);
                let bits = slice.remaining_bits();
                let v = match bits {
                    257 | 64 | 32 => slice.load_int(bits)?,
                    0 => return Err(ReadError::NotEnoughBits(0, 1)),
                    _ => slice.load_uint(bits)? as i128,
                };
                Ok(v)
            }
            other => Err(ReadError::StructureInvalid(format!(
                "expected a number, got {}",
                other.kind()
            ))),
        }
    }

    pub fn to_cell(&self) -> Result<&Cell, ReadError> {
        match self {
            StackEntry::Cell(cell) | StackEntry::Slice(cell) => Ok(cell),
            other => Err(ReadError::StructureInvalid(format!(
                "expected a cell, got {}",
                other.kind()
            ))),
        }
    }

    /// Cell value, `None` for a null entry (an empty dictionary or `Maybe`).
    pub fn to_maybe_cell(&self) -> Result<Option<&Cell>, ReadError> {
        match self {
            StackEntry::Null => Ok(None),
            StackEntry::Int(0) => Ok(None),
            other => other.to_cell().map(Some),
        }
    }

    /// Address stored in a slice (or a cell) as `MsgAddress`.
    pub fn to_address(&self) -> Result<Option<Address>, ReadError> {
        match self {
            StackEntry::Null => Ok(None),
            other => CellSlice::new(other.to_cell()?).load_address(),
        }
    }

    /// String stored as a snake in a cell or slice.
    pub fn to_string_tail(&self) -> Result<String, ReadError> {
        CellSlice::new(self.to_cell()?).load_string_tail()
    }

    /// TVM boolean: `-1` is true, `0` is false; any non-zero value counts as true.
    pub fn to_bool(&self) -> Result<bool, ReadError> {
        self.to_int().map(|v| v != 0)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StackEntry::Int(_) => "int",
            StackEntry::Cell(_) => "cell",
            StackEntry::Slice(_) => "slice",
            StackEntry::Tuple(_) => "tuple",
            StackEntry::Null => "null",
            StackEntry::Unrecognized(_) => "unrecognized",
        }
    }
}

/// A struct returned by a Tact getter arrives either as one tuple entry or
/// flattened on the stack.
pub fn struct_fields(stack: Vec<StackEntry>) -> Vec<StackEntry> {
    match stack.as_slice() {
        [StackEntry::Tuple(_)] => match stack.into_iter().next() {
            Some(StackEntry::Tuple(fields)) => fields,
            _ => Vec::new(),
        },
        _ => stack,
    }
}
