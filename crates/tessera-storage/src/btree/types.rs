//! Key and key/value primitives shared by all B+tree pages.

use super::constants::{MAX_KEY_SIZE, MAX_VAL_SIZE};
use bytes::{Buf, BufMut};
use tessera_common::{PageId, Result, TesseraError};
use std::cmp::Ordering;

/// A right-aligned, fixed-width key buffer.
///
/// The significant bytes occupy the tail of the buffer; `key_len` records
/// how many. Ordering is lexicographic over the significant suffix, with
/// shorter keys comparing less on common-prefix ties.
///
/// For example, the 3-byte key `[1, 7, 255]` with `MAX_KEY_SIZE = 8` is
/// stored as `[0 0 0 0 0 1 7 255]` with `key_len = 3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// Actual length of the key.
    pub key_len: u16,
    /// Right-aligned key bytes.
    pub key: [u8; MAX_KEY_SIZE],
}

/// Copies `src` to the end of `dst`.
pub(crate) fn right_align_copy(dst: &mut [u8], src: &[u8]) {
    let start = dst.len() - src.len();
    dst[start..].copy_from_slice(src);
}

impl KeyEntry {
    /// Builds a key entry from raw bytes. `input` must not exceed
    /// `MAX_KEY_SIZE`; callers validate at the API boundary.
    pub fn from_slice(input: &[u8]) -> Self {
        debug_assert!(input.len() <= MAX_KEY_SIZE);
        let mut key = [0u8; MAX_KEY_SIZE];
        right_align_copy(&mut key, input);
        Self {
            key_len: input.len() as u16,
            key,
        }
    }

    /// Builds a key entry from an integer, big-endian so byte order
    /// matches numeric order for non-negative values.
    pub fn from_int(v: i64) -> Self {
        Self::from_slice(&v.to_be_bytes())
    }

    /// Builds a key entry from the key half of a key/value pair.
    pub fn from_key_val(kv: &KeyVal) -> Self {
        Self {
            key_len: kv.key_len,
            key: kv.key,
        }
    }

    /// Returns the significant suffix.
    pub fn as_slice(&self) -> &[u8] {
        &self.key[MAX_KEY_SIZE - self.key_len as usize..]
    }

    /// On-wire size: `u16 key_len` plus the significant bytes.
    pub fn wire_size(&self) -> usize {
        2 + self.key_len as usize
    }

    /// Appends the wire form to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.key_len);
        buf.put_slice(self.as_slice());
    }

    /// Reads one key entry from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(TesseraError::corrupt("key entry truncated"));
        }
        let key_len = buf.get_u16();
        if key_len as usize > MAX_KEY_SIZE {
            return Err(TesseraError::corrupt(format!(
                "key length {} exceeds maximum {}",
                key_len, MAX_KEY_SIZE
            )));
        }
        if buf.remaining() < key_len as usize {
            return Err(TesseraError::corrupt("key entry truncated"));
        }
        let mut key = [0u8; MAX_KEY_SIZE];
        buf.copy_to_slice(&mut key[MAX_KEY_SIZE - key_len as usize..]);
        Ok(Self { key_len, key })
    }
}

impl Ord for KeyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_slice().cmp(other.as_slice())
    }
}

impl PartialOrd for KeyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A key/value pair stored in a leaf page.
///
/// Both halves are right-aligned fixed-width buffers with explicit
/// lengths. Wire form: `u16 key_len | u16 val_len | key | val`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    /// Actual length of the key.
    pub key_len: u16,
    /// Actual length of the value.
    pub val_len: u16,
    /// Right-aligned key bytes.
    pub key: [u8; MAX_KEY_SIZE],
    /// Right-aligned value bytes.
    pub val: [u8; MAX_VAL_SIZE],
}

impl KeyVal {
    /// Builds a pair from raw key and value bytes. Lengths must not exceed
    /// the fixed buffer sizes; callers validate at the API boundary.
    pub fn from_slices(key: &[u8], val: &[u8]) -> Self {
        debug_assert!(key.len() <= MAX_KEY_SIZE);
        debug_assert!(val.len() <= MAX_VAL_SIZE);
        let mut k = [0u8; MAX_KEY_SIZE];
        let mut v = [0u8; MAX_VAL_SIZE];
        right_align_copy(&mut k, key);
        right_align_copy(&mut v, val);
        Self {
            key_len: key.len() as u16,
            val_len: val.len() as u16,
            key: k,
            val: v,
        }
    }

    /// Builds a pair from big-endian integer key and value.
    pub fn from_ints(key: i64, val: i64) -> Self {
        Self::from_slices(&key.to_be_bytes(), &val.to_be_bytes())
    }

    /// Returns the significant key suffix.
    pub fn key_slice(&self) -> &[u8] {
        &self.key[MAX_KEY_SIZE - self.key_len as usize..]
    }

    /// Returns the significant value suffix.
    pub fn val_slice(&self) -> &[u8] {
        &self.val[MAX_VAL_SIZE - self.val_len as usize..]
    }

    /// On-wire size of this pair.
    pub fn wire_size(&self) -> usize {
        4 + self.key_len as usize + self.val_len as usize
    }

    /// Appends the wire form to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u16(self.key_len);
        buf.put_u16(self.val_len);
        buf.put_slice(self.key_slice());
        buf.put_slice(self.val_slice());
    }

    /// Reads one pair from the front of `buf`.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(TesseraError::corrupt("key/value pair truncated"));
        }
        let key_len = buf.get_u16();
        let val_len = buf.get_u16();
        if key_len as usize > MAX_KEY_SIZE || val_len as usize > MAX_VAL_SIZE {
            return Err(TesseraError::corrupt(format!(
                "key/value lengths {}/{} exceed maxima",
                key_len, val_len
            )));
        }
        if buf.remaining() < key_len as usize + val_len as usize {
            return Err(TesseraError::corrupt("key/value pair truncated"));
        }
        let mut key = [0u8; MAX_KEY_SIZE];
        let mut val = [0u8; MAX_VAL_SIZE];
        buf.copy_to_slice(&mut key[MAX_KEY_SIZE - key_len as usize..]);
        buf.copy_to_slice(&mut val[MAX_VAL_SIZE - val_len as usize..]);
        Ok(Self {
            key_len,
            val_len,
            key,
            val,
        })
    }

    /// Compares keys only (values do not participate in ordering).
    pub fn cmp_key(&self, other: &Self) -> Ordering {
        self.key_slice().cmp(other.key_slice())
    }
}

/// Outcome of a recursive put.
#[derive(Debug)]
pub(crate) enum PutOutcome {
    /// Insert or overwrite completed within the subtree.
    Done,
    /// The child split; the parent must absorb the promoted key.
    Split {
        promote_key: KeyEntry,
        new_right_pid: PageId,
    },
}

/// Outcome of a recursive delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteOutcome {
    /// Key removed, node still at or above minimum occupancy.
    Done,
    /// Key removed but the node is deficient; the parent must repair.
    Underflow,
}
