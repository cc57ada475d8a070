//! Typed column values.

use bytes::Bytes;
use tessera_common::{Result, TesseraError};

/// Column type tags. The tag is the first byte of every encoded value,
/// so tag values are part of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// Raw byte string.
    Bytes = 1,
    /// 64-bit signed integer.
    Int64 = 2,
}

impl ValueType {
    /// Human-readable name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Bytes => "bytes",
            ValueType::Int64 => "int64",
        }
    }
}

impl TryFrom<u8> for ValueType {
    type Error = TesseraError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ValueType::Bytes),
            2 => Ok(ValueType::Int64),
            other => Err(TesseraError::corrupt(format!(
                "unknown value type tag: {}",
                other
            ))),
        }
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Raw byte string.
    Bytes(Bytes),
    /// 64-bit signed integer.
    Int64(i64),
}

impl Value {
    /// Builds a bytes value.
    pub fn bytes(b: impl Into<Bytes>) -> Self {
        Value::Bytes(b.into())
    }

    /// Builds an int64 value.
    pub fn int64(v: i64) -> Self {
        Value::Int64(v)
    }

    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bytes(_) => ValueType::Bytes,
            Value::Int64(_) => ValueType::Int64,
        }
    }

    /// The bytes payload, or a type error.
    pub fn as_bytes(&self) -> Result<&Bytes> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(TesseraError::TypeMismatch {
                expected: ValueType::Bytes.name().to_string(),
                actual: other.value_type().name().to_string(),
            }),
        }
    }

    /// The integer payload, or a type error.
    pub fn as_int64(&self) -> Result<i64> {
        match self {
            Value::Int64(v) => Ok(*v),
            other => Err(TesseraError::TypeMismatch {
                expected: ValueType::Int64.name().to_string(),
                actual: other.value_type().name().to_string(),
            }),
        }
    }
}
