use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported column types
///
/// Every type has a fixed serialized width; strings carry their declared
/// maximum length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    String(usize),
}

impl DataType {
    /// Bytes occupied by a value of this type in a stored record
    pub fn width(&self) -> usize {
        match self {
            DataType::Integer | DataType::Float => 4,
            DataType::String(len) => *len,
        }
    }

    /// True when both types are the same variant, ignoring string widths
    pub fn same_variant(&self, other: &DataType) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::String(len) => write!(f, "STRING({})", len),
        }
    }
}

/// A typed column value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i32),
    Float(f32),
    /// Text and its declared maximum length in bytes
    String(String, usize),
}

impl Value {
    /// Creates a fixed-length string value, truncating `text` at a character
    /// boundary if it is longer than `len` bytes.
    pub fn string(text: impl Into<String>, len: usize) -> Self {
        let mut text = text.into();
        if text.len() > len {
            let mut end = len;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        Value::String(text, len)
    }

    pub fn datatype(&self) -> DataType {
        match self {
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::String(_, len) => DataType::String(*len),
        }
    }

    /// Compares two values of the same variant.
    ///
    /// Floats use IEEE-754 total ordering; strings compare by content only.
    /// Values of different variants yield `Error::TypeMismatch`.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(a.total_cmp(b)),
            (Value::String(a, _), Value::String(b, _)) => Ok(a.cmp(b)),
            (a, b) => Err(Error::TypeMismatch {
                left: a.datatype(),
                right: b.datatype(),
            }),
        }
    }

    /// Equality as used by join predicates
    pub fn matches(&self, other: &Value) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    /// Appends the fixed-width encoding of the value
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
            Value::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            Value::String(v, len) => {
                out.extend_from_slice(v.as_bytes());
                out.resize(out.len() + len.saturating_sub(v.len()), 0);
            }
        }
    }

    /// Decodes a value from exactly `datatype.width()` bytes
    pub fn decode(datatype: &DataType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != datatype.width() {
            return Err(Error::Internal(format!(
                "expected {} bytes for {}, got {}",
                datatype.width(),
                datatype,
                bytes.len()
            )));
        }
        Ok(match datatype {
            DataType::Integer => Value::Integer(i32::from_be_bytes(bytes.try_into()?)),
            DataType::Float => Value::Float(f32::from_bits(u32::from_be_bytes(bytes.try_into()?))),
            DataType::String(len) => {
                let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                Value::String(String::from_utf8(bytes[..end].to_vec())?, *len)
            }
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v, _) => write!(f, "{}", v),
        }
    }
}

/// A record is an ordered sequence of values, one per schema column
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Left values followed by right values
    pub fn concat(&self, right: &Record) -> Record {
        let mut values = Vec::with_capacity(self.len() + right.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&right.values);
        Record { values }
    }

    /// Picks the values at `positions`, in that order
    pub fn project(&self, positions: &[usize]) -> Record {
        Record {
            values: positions.iter().map(|&i| self.values[i].clone()).collect(),
        }
    }

    /// Fixed-width byte form: each value's encoding, back to back
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for value in &self.values {
            value.encode(&mut out);
        }
        out
    }

    pub fn decode(types: &[DataType], bytes: &[u8]) -> Result<Self> {
        let width: usize = types.iter().map(DataType::width).sum();
        if bytes.len() != width {
            return Err(Error::Internal(format!(
                "record is {} bytes, schema expects {}",
                bytes.len(),
                width
            )));
        }
        let mut values = Vec::with_capacity(types.len());
        let mut offset = 0;
        for datatype in types {
            let end = offset + datatype.width();
            values.push(Value::decode(datatype, &bytes[offset..end])?);
            offset = end;
        }
        Ok(Record { values })
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>();
        write!(f, "({})", values.join(", "))
    }
}

/// Lazy stream of records produced by a scan or an operator tree
pub type Rows<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;
