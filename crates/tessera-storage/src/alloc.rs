//! Block allocation for the data file.

use tessera_common::{PageId, BLOCK_SIZE};

/// Hands out and recycles fixed-size block ids.
///
/// Block 0 is reserved for the meta page, so `next_id` starts at 1. Freed
/// ids go onto a LIFO free list and are reused before the file grows.
/// Allocator state is not persisted: on open, the file length is the
/// authoritative high-water mark and the free list starts empty, so space
/// freed in a previous session is not reclaimed.
#[derive(Debug)]
pub struct BlockAllocator {
    /// Next never-used block id.
    next_id: PageId,
    /// Reusable block ids (LIFO).
    free_list: Vec<PageId>,
}

impl BlockAllocator {
    /// Creates a fresh allocator for an empty file.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            free_list: Vec::new(),
        }
    }

    /// Creates an allocator for an existing file of the given length.
    pub fn from_file_len(len: u64) -> Self {
        let blocks = len.div_ceil(BLOCK_SIZE as u64);
        Self {
            next_id: blocks.max(1),
            free_list: Vec::new(),
        }
    }

    /// Returns a block id that can be written to.
    pub fn allocate(&mut self) -> PageId {
        if let Some(id) = self.free_list.pop() {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Releases a block id for reuse.
    pub fn free(&mut self, id: PageId) {
        self.free_list.push(id);
    }

    /// Number of ids currently on the free list.
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }
}

impl Default for BlockAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_allocator_skips_meta_block() {
        let mut alloc = BlockAllocator::new();
        assert_eq!(alloc.allocate(), 1);
        assert_eq!(alloc.allocate(), 2);
        assert_eq!(alloc.allocate(), 3);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut alloc = BlockAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.free(a);
        alloc.free(b);

        assert_eq!(alloc.allocate(), b);
        assert_eq!(alloc.allocate(), a);
        assert_eq!(alloc.allocate(), 3);
    }

    #[test]
    fn test_from_file_len() {
        let alloc = BlockAllocator::from_file_len(0);
        assert_eq!(alloc.next_id, 1);

        let alloc = BlockAllocator::from_file_len(BLOCK_SIZE as u64);
        assert_eq!(alloc.next_id, 1);

        let alloc = BlockAllocator::from_file_len(3 * BLOCK_SIZE as u64);
        assert_eq!(alloc.next_id, 3);

        // A partial trailing block counts as occupied.
        let alloc = BlockAllocator::from_file_len(BLOCK_SIZE as u64 + 1);
        assert_eq!(alloc.next_id, 2);
    }

    #[test]
    fn test_free_count() {
        let mut alloc = BlockAllocator::new();
        assert_eq!(alloc.free_count(), 0);
        let id = alloc.allocate();
        alloc.free(id);
        assert_eq!(alloc.free_count(), 1);
    }
}
