//! B+tree sizing constants, derived so every page fits one block.

use tessera_common::{page::PageHeader, BLOCK_SIZE};

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: usize = 128;

/// Maximum value size in bytes.
pub const MAX_VAL_SIZE: usize = 256;

/// Worst-case wire size of one key entry (len prefix + key).
pub(crate) const KEY_ENTRY_MAX_WIRE: usize = 2 + MAX_KEY_SIZE;

/// Worst-case wire size of one key/value pair.
pub(crate) const KEY_VAL_MAX_WIRE: usize = 4 + MAX_KEY_SIZE + MAX_VAL_SIZE;

/// Maximum key/value pairs per leaf, rounded down to even so a split of
/// an overflowing leaf leaves both halves at minimum occupancy:
/// (4096 - 9 - 2) / 388 = 10.
pub const LEAF_MAX_KV: usize = ((BLOCK_SIZE - PageHeader::SIZE - 2) / KEY_VAL_MAX_WIRE) / 2 * 2;

/// Maximum separator keys per internal page. Each key costs its wire size
/// plus one child pointer, with one extra child for the leftmost subtree:
/// (4096 - 9 - 2 - 8) / (130 + 8) = 29, rounded down to 28 so a split of
/// an overflowing page (with its middle key promoted) leaves both halves
/// at minimum occupancy.
pub const MAX_KEYS: usize =
    ((BLOCK_SIZE - PageHeader::SIZE - 2 - 8) / (KEY_ENTRY_MAX_WIRE + 8)) / 2 * 2;

/// Minimum occupancy for non-root leaves.
pub const LEAF_MIN_KV: usize = LEAF_MAX_KV.div_ceil(2);

/// Minimum occupancy for non-root internal pages.
pub const MIN_KEYS: usize = MAX_KEYS.div_ceil(2);
