//! Disk B+tree: descent, insert/upsert with splits, delete with
//! borrow/merge repair, and seek.

use super::constants::{MAX_KEY_SIZE, MAX_VAL_SIZE};
use super::iter::BTreeIter;
use super::page::{InternalPage, LeafPage, MetaPage};
use super::types::{DeleteOutcome, KeyEntry, KeyVal, PutOutcome};
use crate::pager::Pager;
use bytes::Bytes;
use std::path::Path;
use tessera_common::{PageHeader, PageId, PageType, Result, TesseraError};
use tracing::{debug, info};

/// Block id of the meta page.
const META_PID: PageId = 0;

/// A tree node loaded from disk, dispatched on the page type tag.
pub(crate) enum Node {
    Internal(InternalPage),
    Leaf(LeafPage),
}

/// Disk-resident B+tree over a [`Pager`].
///
/// Nodes reference each other by block id only. A single writer mutates
/// the tree at a time; readers do not coordinate with writers.
pub struct BPlusTree {
    pager: Pager,
}

impl BPlusTree {
    /// Opens the tree backed by the data file at `path`, initializing a
    /// fresh empty-leaf root when the meta page's magic does not match.
    pub fn open(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let pager = Pager::open(path, fsync_enabled)?;
        let tree = Self { pager };
        tree.init_if_fresh()?;
        Ok(tree)
    }

    fn init_if_fresh(&self) -> Result<()> {
        let block = self.pager.fetch(META_PID)?;
        if let Ok(meta) = MetaPage::decode(&block[..]) {
            if meta.is_valid() {
                return Ok(());
            }
        }

        let root_pid = self.pager.new_page();
        self.pager.write(root_pid, &LeafPage::new().encode());
        self.pager.flush(root_pid)?;

        self.pager.write(META_PID, &MetaPage::new(root_pid).encode());
        self.pager.flush(META_PID)?;
        self.pager.sync()?;

        info!(root_pid, "initialized fresh tree");
        Ok(())
    }

    /// Returns the current root block id.
    pub fn root_pid(&self) -> Result<PageId> {
        let block = self.pager.fetch(META_PID)?;
        let meta = MetaPage::decode(&block[..])?;
        if !meta.is_valid() {
            return Err(TesseraError::corrupt("meta page magic mismatch"));
        }
        Ok(meta.root_pid)
    }

    /// Points the meta page at a new root and flushes it. Every page the
    /// new root references must already be flushed.
    fn set_root_pid(&self, pid: PageId) -> Result<()> {
        self.pager.write(META_PID, &MetaPage::new(pid).encode());
        self.pager.flush(META_PID)
    }

    pub(crate) fn load_node(&self, pid: PageId) -> Result<Node> {
        let block = self.pager.fetch(pid)?;
        let header = PageHeader::from_bytes(&block[..])?;
        match header.page_type {
            PageType::Leaf => Ok(Node::Leaf(LeafPage::decode(&block[..])?)),
            PageType::Internal => Ok(Node::Internal(InternalPage::decode(&block[..])?)),
            PageType::Meta => Err(TesseraError::corrupt(format!(
                "tree descent reached meta page at block {}",
                pid
            ))),
        }
    }

    pub(crate) fn load_leaf(&self, pid: PageId) -> Result<LeafPage> {
        let block = self.pager.fetch(pid)?;
        LeafPage::decode(&block[..])
    }

    fn load_internal(&self, pid: PageId) -> Result<InternalPage> {
        let block = self.pager.fetch(pid)?;
        InternalPage::decode(&block[..])
    }

    fn write_leaf(&self, pid: PageId, leaf: &LeafPage) -> Result<()> {
        self.pager.write(pid, &leaf.encode());
        self.pager.flush(pid)
    }

    fn write_internal(&self, pid: PageId, page: &InternalPage) -> Result<()> {
        self.pager.write(pid, &page.encode());
        self.pager.flush(pid)
    }

    fn validate_key(&self, key: &[u8]) -> Result<KeyEntry> {
        if key.len() > MAX_KEY_SIZE {
            return Err(TesseraError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        Ok(KeyEntry::from_slice(key))
    }

    fn validate_kv(&self, key: &[u8], val: &[u8]) -> Result<KeyVal> {
        if key.len() > MAX_KEY_SIZE {
            return Err(TesseraError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        if val.len() > MAX_VAL_SIZE {
            return Err(TesseraError::ValueTooLarge {
                size: val.len(),
                max: MAX_VAL_SIZE,
            });
        }
        Ok(KeyVal::from_slices(key, val))
    }

    /// Point lookup. Returns `None` when the key is absent.
    pub fn find(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let entry = self.validate_key(key)?;
        let mut pid = self.root_pid()?;

        loop {
            match self.load_node(pid)? {
                Node::Internal(node) => {
                    pid = node.children[node.child_index(&entry)];
                }
                Node::Leaf(leaf) => {
                    return Ok(leaf
                        .lookup(&entry)
                        .map(|idx| Bytes::copy_from_slice(leaf.kvs[idx].val_slice())));
                }
            }
        }
    }

    /// Duplicate-rejecting insert.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        self.put(key, val, false)
    }

    /// Upsert: overwrites an existing key in place.
    pub fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        self.put(key, val, true)
    }

    fn put(&mut self, key: &[u8], val: &[u8], overwrite: bool) -> Result<()> {
        let kv = self.validate_kv(key, val)?;
        let root = self.root_pid()?;

        match self.put_recursive(root, kv, overwrite)? {
            PutOutcome::Done => {}
            PutOutcome::Split {
                promote_key,
                new_right_pid,
            } => {
                // Root split: grow the tree by one level. The new root's
                // children are already flushed.
                let new_root_pid = self.pager.new_page();
                let new_root = InternalPage::new_root(promote_key, root, new_right_pid);
                self.write_internal(new_root_pid, &new_root)?;
                self.set_root_pid(new_root_pid)?;
                debug!(old_root = root, new_root = new_root_pid, "root split");
            }
        }

        self.pager.sync()
    }

    fn put_recursive(&self, pid: PageId, kv: KeyVal, overwrite: bool) -> Result<PutOutcome> {
        match self.load_node(pid)? {
            Node::Leaf(mut leaf) => {
                let entry = KeyEntry::from_key_val(&kv);

                if let Some(idx) = leaf.lookup(&entry) {
                    if !overwrite {
                        return Err(TesseraError::DuplicateKey);
                    }
                    leaf.kvs[idx] = kv;
                    self.write_leaf(pid, &leaf)?;
                    return Ok(PutOutcome::Done);
                }

                leaf.insert_kv(kv);
                if !leaf.is_overflow() {
                    self.write_leaf(pid, &leaf)?;
                    return Ok(PutOutcome::Done);
                }

                // split() hands the old chain pointer to the right half;
                // the left half then points at the new page.
                let (promote_key, right) = leaf.split();
                let right_pid = self.pager.new_page();
                leaf.next_leaf = right_pid;

                self.write_leaf(pid, &leaf)?;
                self.write_leaf(right_pid, &right)?;

                Ok(PutOutcome::Split {
                    promote_key,
                    new_right_pid: right_pid,
                })
            }
            Node::Internal(mut node) => {
                let entry = KeyEntry::from_key_val(&kv);
                let child_pid = node.children[node.child_index(&entry)];

                match self.put_recursive(child_pid, kv, overwrite)? {
                    PutOutcome::Done => Ok(PutOutcome::Done),
                    PutOutcome::Split {
                        promote_key,
                        new_right_pid,
                    } => {
                        node.insert_child(promote_key, new_right_pid);
                        if !node.is_overflow() {
                            self.write_internal(pid, &node)?;
                            return Ok(PutOutcome::Done);
                        }

                        let (promote_key, right) = node.split();
                        let right_pid = self.pager.new_page();
                        self.write_internal(pid, &node)?;
                        self.write_internal(right_pid, &right)?;

                        Ok(PutOutcome::Split {
                            promote_key,
                            new_right_pid: right_pid,
                        })
                    }
                }
            }
        }
    }

    /// Deletes a key. Returns whether it existed.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let entry = self.validate_key(key)?;
        let root = self.root_pid()?;

        match self.delete_recursive(root, &entry) {
            Err(TesseraError::NotFound) => return Ok(false),
            Err(e) => return Err(e),
            Ok(_) => {}
        }

        // Root shrink: an internal root left with zero separators hands
        // the tree to its sole remaining child. Children are flushed by
        // the recursion, so the order here is free old root, then meta.
        if let Node::Internal(node) = self.load_node(root)? {
            if node.n_keys() == 0 {
                let new_root = node.children[0];
                self.pager.free(root);
                self.set_root_pid(new_root)?;
                debug!(old_root = root, new_root, "root shrink");
            }
        }

        self.pager.sync()?;
        Ok(true)
    }

    fn delete_recursive(&self, pid: PageId, key: &KeyEntry) -> Result<DeleteOutcome> {
        match self.load_node(pid)? {
            Node::Leaf(mut leaf) => {
                let idx = leaf.lookup(key).ok_or(TesseraError::NotFound)?;
                leaf.kvs.remove(idx);
                self.write_leaf(pid, &leaf)?;

                if leaf.is_underfull() {
                    Ok(DeleteOutcome::Underflow)
                } else {
                    Ok(DeleteOutcome::Done)
                }
            }
            Node::Internal(mut node) => {
                let child_idx = node.child_index(key);
                let child_pid = node.children[child_idx];

                match self.delete_recursive(child_pid, key)? {
                    DeleteOutcome::Done => Ok(DeleteOutcome::Done),
                    DeleteOutcome::Underflow => {
                        self.repair_underflow(&mut node, child_idx)?;
                        self.write_internal(pid, &node)?;

                        if node.is_underfull() {
                            Ok(DeleteOutcome::Underflow)
                        } else {
                            Ok(DeleteOutcome::Done)
                        }
                    }
                }
            }
        }
    }

    /// Restores minimum occupancy of `parent.children[child_idx]` by
    /// borrowing from a sibling (preferring left) or merging. The caller
    /// writes the parent afterwards.
    fn repair_underflow(&self, parent: &mut InternalPage, child_idx: usize) -> Result<()> {
        // An interrupted root shrink can leave a single-child internal
        // page on disk; with no sibling there is nothing to repair here,
        // and the shrink completes at the top of the delete.
        if parent.children.len() < 2 {
            return Ok(());
        }

        let child_pid = parent.children[child_idx];

        match self.load_node(child_pid)? {
            Node::Leaf(mut child) => {
                if child_idx > 0 {
                    let left_pid = parent.children[child_idx - 1];
                    let mut left = self.load_leaf(left_pid)?;
                    if let Some(separator) = child.borrow_from_left(&mut left) {
                        parent.keys[child_idx - 1] = separator;
                        self.write_leaf(left_pid, &left)?;
                        self.write_leaf(child_pid, &child)?;
                        return Ok(());
                    }
                }

                if child_idx + 1 < parent.children.len() {
                    let right_pid = parent.children[child_idx + 1];
                    let mut right = self.load_leaf(right_pid)?;
                    if let Some(separator) = child.borrow_from_right(&mut right) {
                        parent.keys[child_idx] = separator;
                        self.write_leaf(right_pid, &right)?;
                        self.write_leaf(child_pid, &child)?;
                        return Ok(());
                    }
                }

                if child_idx > 0 {
                    let left_pid = parent.children[child_idx - 1];
                    let mut left = self.load_leaf(left_pid)?;
                    left.merge_from_right(child);
                    self.write_leaf(left_pid, &left)?;
                    parent.keys.remove(child_idx - 1);
                    parent.children.remove(child_idx);
                    self.pager.free(child_pid);
                } else {
                    let right_pid = parent.children[child_idx + 1];
                    let right = self.load_leaf(right_pid)?;
                    child.merge_from_right(right);
                    self.write_leaf(child_pid, &child)?;
                    parent.keys.remove(child_idx);
                    parent.children.remove(child_idx + 1);
                    self.pager.free(right_pid);
                }
                Ok(())
            }
            Node::Internal(mut child) => {
                if child_idx > 0 {
                    let left_pid = parent.children[child_idx - 1];
                    let mut left = self.load_internal(left_pid)?;
                    let separator = parent.keys[child_idx - 1].clone();
                    if let Some(new_separator) = child.borrow_from_left(&mut left, separator) {
                        parent.keys[child_idx - 1] = new_separator;
                        self.write_internal(left_pid, &left)?;
                        self.write_internal(child_pid, &child)?;
                        return Ok(());
                    }
                }

                if child_idx + 1 < parent.children.len() {
                    let right_pid = parent.children[child_idx + 1];
                    let mut right = self.load_internal(right_pid)?;
                    let separator = parent.keys[child_idx].clone();
                    if let Some(new_separator) = child.borrow_from_right(&mut right, separator) {
                        parent.keys[child_idx] = new_separator;
                        self.write_internal(right_pid, &right)?;
                        self.write_internal(child_pid, &child)?;
                        return Ok(());
                    }
                }

                if child_idx > 0 {
                    let left_pid = parent.children[child_idx - 1];
                    let mut left = self.load_internal(left_pid)?;
                    let separator = parent.keys.remove(child_idx - 1);
                    left.merge_from_right(separator, child);
                    self.write_internal(left_pid, &left)?;
                    parent.children.remove(child_idx);
                    self.pager.free(child_pid);
                } else {
                    let right_pid = parent.children[child_idx + 1];
                    let right = self.load_internal(right_pid)?;
                    let separator = parent.keys.remove(child_idx);
                    child.merge_from_right(separator, right);
                    self.write_internal(child_pid, &child)?;
                    parent.children.remove(child_idx + 1);
                    self.pager.free(right_pid);
                }
                Ok(())
            }
        }
    }

    /// Positions an iterator at the first key `>=` the target, skipping
    /// empty leaves through the chain.
    pub fn seek_ge(&self, key: &[u8]) -> Result<BTreeIter<'_>> {
        let entry = self.validate_key(key)?;
        let mut pid = self.root_pid()?;

        loop {
            match self.load_node(pid)? {
                Node::Internal(node) => {
                    pid = node.children[node.child_index(&entry)];
                }
                Node::Leaf(leaf) => {
                    let idx = leaf.find_first_ge(&entry);
                    if idx < leaf.n_kv() {
                        return Ok(BTreeIter::new(self, leaf, idx));
                    }

                    let mut next = leaf.next_leaf;
                    while next != 0 {
                        let leaf = self.load_leaf(next)?;
                        if leaf.n_kv() > 0 {
                            return Ok(BTreeIter::new(self, leaf, 0));
                        }
                        next = leaf.next_leaf;
                    }
                    return Ok(BTreeIter::invalid(self));
                }
            }
        }
    }

    /// Range scan over `[start, end]` (both inclusive; `None` end means
    /// unbounded). The visitor returns `false` to stop early.
    pub fn scan<F>(&self, start: &[u8], end: Option<&[u8]>, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let mut iter = self.seek_ge(start)?;
        while iter.valid() {
            let stop = match iter.entry() {
                Some((key, val)) => {
                    if let Some(end) = end {
                        if key > end {
                            break;
                        }
                    }
                    !visit(key, val)
                }
                None => break,
            };
            if stop {
                break;
            }
            iter.next()?;
        }
        Ok(())
    }

    /// Returns the tree height (1 = the root is a leaf).
    pub fn height(&self) -> Result<u32> {
        let mut pid = self.root_pid()?;
        let mut height = 1;
        loop {
            match self.load_node(pid)? {
                Node::Internal(node) => {
                    pid = node.children[0];
                    height += 1;
                }
                Node::Leaf(_) => return Ok(height),
            }
        }
    }

    /// Writes every dirty page to disk.
    pub fn flush(&self) -> Result<()> {
        self.pager.flush_all()
    }

    /// Fsyncs the data file.
    pub fn sync(&self) -> Result<()> {
        self.pager.sync()
    }

    /// Flushes everything and fsyncs.
    pub fn close(&self) -> Result<()> {
        self.pager.close()
    }
}
