//! Leaf-chain iterator over the B+tree.

use super::index::BPlusTree;
use super::page::LeafPage;
use tessera_common::Result;

/// Iterator positioned inside a leaf, producing keys in strict ascending
/// order by following the leaf chain.
///
/// Iteration is not guaranteed to be consistent with concurrent writes;
/// callers needing a stable view must serialize externally.
pub struct BTreeIter<'a> {
    tree: &'a BPlusTree,
    leaf: LeafPage,
    idx: usize,
    valid: bool,
}

impl<'a> BTreeIter<'a> {
    pub(crate) fn new(tree: &'a BPlusTree, leaf: LeafPage, idx: usize) -> Self {
        Self {
            tree,
            leaf,
            idx,
            valid: true,
        }
    }

    pub(crate) fn invalid(tree: &'a BPlusTree) -> Self {
        Self {
            tree,
            leaf: LeafPage::new(),
            idx: 0,
            valid: false,
        }
    }

    /// Returns whether the iterator points at a key/value pair.
    pub fn valid(&self) -> bool {
        self.valid && self.idx < self.leaf.n_kv()
    }

    /// The current key's significant bytes.
    pub fn key(&self) -> Option<&[u8]> {
        self.valid()
            .then(|| self.leaf.kvs[self.idx].key_slice())
    }

    /// The current value's significant bytes.
    pub fn value(&self) -> Option<&[u8]> {
        self.valid()
            .then(|| self.leaf.kvs[self.idx].val_slice())
    }

    /// The current key/value pair.
    pub fn entry(&self) -> Option<(&[u8], &[u8])> {
        self.valid().then(|| {
            let kv = &self.leaf.kvs[self.idx];
            (kv.key_slice(), kv.val_slice())
        })
    }

    /// Advances one slot, following the leaf chain past the end of the
    /// current leaf and skipping empty leaves.
    pub fn next(&mut self) -> Result<()> {
        if !self.valid() {
            return Ok(());
        }

        self.idx += 1;
        if self.idx < self.leaf.n_kv() {
            return Ok(());
        }

        let mut next = self.leaf.next_leaf;
        while next != 0 {
            let leaf = self.tree.load_leaf(next)?;
            if leaf.n_kv() > 0 {
                self.leaf = leaf;
                self.idx = 0;
                return Ok(());
            }
            next = leaf.next_leaf;
        }

        self.valid = false;
        Ok(())
    }
}
