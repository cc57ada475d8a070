//! WAL log record format.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tessera_common::{Result, TesseraError};

/// Operations recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    /// Key set to a value.
    Set = 0,
    /// Key deleted (no value payload).
    Del = 1,
}

impl TryFrom<u8> for WalOp {
    type Error = TesseraError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WalOp::Set),
            1 => Ok(WalOp::Del),
            other => Err(TesseraError::corrupt(format!(
                "invalid WAL op: {}",
                other
            ))),
        }
    }
}

/// A single log record.
///
/// Record format on disk (big-endian):
/// - op: 1 byte (0 = set, 1 = del)
/// - key_len: 4 bytes
/// - val_len: 4 bytes (0 for del)
/// - key: key_len bytes
/// - val: val_len bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    /// The logged operation.
    pub op: WalOp,
    /// Key bytes.
    pub key: Bytes,
    /// Value bytes (empty for del).
    pub val: Bytes,
}

impl WalRecord {
    /// Size of the fixed record header in bytes.
    pub const HEADER_SIZE: usize = 9;

    /// Creates a set record.
    pub fn set(key: impl Into<Bytes>, val: impl Into<Bytes>) -> Self {
        Self {
            op: WalOp::Set,
            key: key.into(),
            val: val.into(),
        }
    }

    /// Creates a del record.
    pub fn del(key: impl Into<Bytes>) -> Self {
        Self {
            op: WalOp::Del,
            key: key.into(),
            val: Bytes::new(),
        }
    }

    /// Returns the total size of this record on disk.
    pub fn size_on_disk(&self) -> usize {
        Self::HEADER_SIZE + self.key.len() + self.val.len()
    }

    /// Serializes this record to bytes.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size_on_disk());
        buf.put_u8(self.op as u8);
        buf.put_u32(self.key.len() as u32);
        buf.put_u32(self.val.len() as u32);
        buf.put_slice(&self.key);
        buf.put_slice(&self.val);
        buf.freeze()
    }

    /// Deserializes one record from the front of `data`.
    ///
    /// Returns `Ok(Some((record, consumed)))` for a complete record,
    /// `Ok(None)` for a torn trailing record (short header or short
    /// payload), and `Err` only for data that can never have been a valid
    /// record (unknown op tag).
    pub fn deserialize(mut data: &[u8]) -> Result<Option<(Self, usize)>> {
        if data.len() < Self::HEADER_SIZE {
            return Ok(None);
        }

        let op = WalOp::try_from(data.get_u8())?;
        let key_len = data.get_u32() as usize;
        let val_len = data.get_u32() as usize;

        if data.len() < key_len + val_len {
            return Ok(None);
        }

        let key = Bytes::copy_from_slice(&data[..key_len]);
        data.advance(key_len);
        let val = Bytes::copy_from_slice(&data[..val_len]);

        let consumed = Self::HEADER_SIZE + key_len + val_len;
        Ok(Some((Self { op, key, val }, consumed)))
    }
}
