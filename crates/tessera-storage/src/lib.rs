//! Storage engine for TesseraDB.
//!
//! This crate provides:
//! - Block allocator handing out fixed-size block ids
//! - Pager for block-level file I/O with a page cache
//! - On-disk page codecs (meta, internal, leaf)
//! - Disk-resident B+tree index with ordered iteration

mod alloc;
mod btree;
mod pager;

pub use alloc::BlockAllocator;
pub use btree::{
    BPlusTree, BTreeIter, InternalPage, KeyEntry, KeyVal, LeafPage, MetaPage, LEAF_MAX_KV,
    LEAF_MIN_KV, MAX_KEYS, MAX_KEY_SIZE, MAX_VAL_SIZE, MIN_KEYS,
};
pub use pager::Pager;
