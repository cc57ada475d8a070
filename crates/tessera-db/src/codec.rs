//! Tuple codec: typed values onto the byte-ordered key space.
//!
//! Encoded value layout: `(u8 type_tag | u32 length | payload)*`.
//! Encoded key layout: `u8 prefix | (u8 type_tag | u32 length | payload)*`.
//!
//! Int64 payloads are 8 bytes big-endian, so non-negative integers sort
//! bytewise in numeric order. Negative key values do NOT sort below
//! non-negative ones (the sign bit puts them above); this is a documented
//! limitation of the key encoding.

use crate::record::Record;
use crate::table::{IndexDef, TableDef, MAX_BYTES_PK_LEN};
use crate::value::{Value, ValueType};
use bytes::{Buf, BufMut, Bytes};
use tessera_common::{Result, TesseraError};

fn put_value(buf: &mut Vec<u8>, val: &Value) {
    buf.put_u8(val.value_type() as u8);
    match val {
        Value::Bytes(b) => {
            buf.put_u32(b.len() as u32);
            buf.put_slice(b);
        }
        Value::Int64(v) => {
            buf.put_u32(8);
            buf.put_i64(*v);
        }
    }
}

/// Encodes a namespaced key from the given values.
pub fn encode_key(prefix: u8, vals: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + vals.len() * 16);
    buf.put_u8(prefix);
    for val in vals {
        put_value(&mut buf, val);
    }
    buf
}

/// Encodes a value tuple (no namespace prefix).
pub fn encode_value(vals: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vals.len() * 16);
    for val in vals {
        put_value(&mut buf, val);
    }
    buf
}

/// Decodes a value tuple.
pub fn decode_value(data: &[u8]) -> Result<Vec<Value>> {
    let mut buf = data;
    let mut vals = Vec::new();

    while buf.has_remaining() {
        if buf.remaining() < 5 {
            return Err(TesseraError::corrupt("truncated value header"));
        }
        let tag = ValueType::try_from(buf.get_u8())?;
        let len = buf.get_u32() as usize;
        if buf.remaining() < len {
            return Err(TesseraError::corrupt("truncated value payload"));
        }

        match tag {
            ValueType::Bytes => {
                vals.push(Value::Bytes(Bytes::copy_from_slice(&buf[..len])));
                buf.advance(len);
            }
            ValueType::Int64 => {
                if len != 8 {
                    return Err(TesseraError::corrupt(format!(
                        "int64 length {} (expected 8)",
                        len
                    )));
                }
                vals.push(Value::Int64(buf.get_i64()));
            }
        }
    }

    Ok(vals)
}

/// Pulls the values of the indexed columns out of a record.
pub fn extract_index_values(idx: &IndexDef, rec: &Record) -> Result<Vec<Value>> {
    idx.cols
        .iter()
        .map(|col| {
            rec.get(col)
                .cloned()
                .ok_or_else(|| TesseraError::ColumnNotFound(col.clone()))
        })
        .collect()
}

/// Builds a secondary index key: `idx.prefix | indexed cols | primary key`.
///
/// Appending the primary-key values keeps index keys unique even when the
/// indexed columns are not, and makes the primary key recoverable from
/// the index key alone.
pub fn encode_index_key(idx: &IndexDef, rec: &Record, pk_vals: &[Value]) -> Result<Vec<u8>> {
    let mut vals = extract_index_values(idx, rec)?;
    vals.extend_from_slice(pk_vals);
    Ok(encode_key(idx.prefix, &vals))
}

/// Decodes a full record from a primary key and its stored value.
pub fn decode_record(tdef: &TableDef, key: &[u8], val: &[u8]) -> Result<Record> {
    if key.is_empty() || key[0] != tdef.prefix {
        return Err(TesseraError::corrupt("record key outside table namespace"));
    }

    let key_vals = decode_value(&key[1..])?;
    let val_vals = decode_value(val)?;
    if key_vals.len() != tdef.pkey_n || key_vals.len() + val_vals.len() != tdef.cols.len() {
        return Err(TesseraError::corrupt(format!(
            "record for table {} has {} key and {} value columns",
            tdef.name,
            key_vals.len(),
            val_vals.len()
        )));
    }

    Ok(Record {
        cols: tdef.cols.clone(),
        vals: key_vals.into_iter().chain(val_vals).collect(),
    })
}

/// Recovers the primary key bytes from a secondary index key.
///
/// The index key is `prefix | indexed cols | primary key`; the trailing
/// `pkey_n` values are re-encoded under the table's own prefix.
pub fn extract_primary_key(idx_key: &[u8], tdef: &TableDef) -> Result<Vec<u8>> {
    if idx_key.is_empty() {
        return Err(TesseraError::corrupt("empty index key"));
    }
    let vals = decode_value(&idx_key[1..])?;
    if vals.len() < tdef.pkey_n {
        return Err(TesseraError::corrupt(format!(
            "index key holds {} values, table {} needs {} for its primary key",
            vals.len(),
            tdef.name,
            tdef.pkey_n
        )));
    }
    Ok(encode_key(tdef.prefix, &vals[vals.len() - tdef.pkey_n..]))
}

/// Lowest-possible primary-key values for the table in encoded byte
/// order, used to open a secondary scan bracket.
///
/// Int64 encodes as plain big-endian, so the byte-order extremes are the
/// all-zero payload (value 0) and the all-0xFF payload (value -1); every
/// encoding, negative or not, falls between them.
pub fn min_pk_values(tdef: &TableDef) -> Vec<Value> {
    tdef.types[..tdef.pkey_n]
        .iter()
        .map(|t| match t {
            ValueType::Bytes => Value::Bytes(Bytes::new()),
            ValueType::Int64 => Value::Int64(0),
        })
        .collect()
}

/// Highest-possible primary-key values for the table in encoded byte
/// order, used to close a secondary scan bracket.
///
/// The bytes sentinel is only an upper bound because stored bytes-typed
/// primary keys are capped at `MAX_BYTES_PK_LEN` (the length field of
/// the wire format compares before the payload).
pub fn max_pk_values(tdef: &TableDef) -> Vec<Value> {
    tdef.types[..tdef.pkey_n]
        .iter()
        .map(|t| match t {
            ValueType::Bytes => Value::Bytes(Bytes::from(vec![0xFF; MAX_BYTES_PK_LEN])),
            ValueType::Int64 => Value::Int64(i64::from_be_bytes([0xFF; 8])),
        })
        .collect()
}

/// Checks the primary-key values of a reordered record against the
/// sentinel bound. A bytes value longer than `MAX_BYTES_PK_LEN` would
/// sort above the closing sentinel and silently fall out of every
/// secondary scan, so it is rejected before it can be stored.
pub fn check_pk_bounds(tdef: &TableDef, rec: &Record) -> Result<()> {
    for val in &rec.vals[..tdef.pkey_n] {
        if let Value::Bytes(b) = val {
            if b.len() > MAX_BYTES_PK_LEN {
                return Err(TesseraError::KeyTooLarge {
                    size: b.len(),
                    max: MAX_BYTES_PK_LEN,
                });
            }
        }
    }
    Ok(())
}
