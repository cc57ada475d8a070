//! Pager for block-level file I/O.

use crate::alloc::BlockAllocator;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tessera_common::{page::block_offset, PageId, Result, TesseraError, BLOCK_SIZE};

/// A cached block buffer.
type Block = Box<[u8; BLOCK_SIZE]>;

fn zeroed_block() -> Block {
    Box::new([0u8; BLOCK_SIZE])
}

struct PagerInner {
    file: File,
    allocator: BlockAllocator,
    /// Page cache keyed by block id. Unbounded: the engine targets
    /// embedded datasets that fit in memory alongside the file.
    cache: HashMap<PageId, Block>,
    /// Blocks modified since their last flush.
    dirty: HashSet<PageId>,
}

/// Reads and writes fixed-size blocks, caching them in memory.
///
/// Writers mutate a copy of the cached buffer via [`Pager::write`] and then
/// [`Pager::flush`]; callers are responsible for flush order. Reading past
/// the end of the file yields a zeroed block, which all page codecs treat
/// as never written.
pub struct Pager {
    inner: Mutex<PagerInner>,
    fsync_enabled: bool,
}

impl Pager {
    /// Opens (or creates) the data file at `path`.
    pub fn open(path: &Path, fsync_enabled: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let allocator = BlockAllocator::from_file_len(file.metadata()?.len());

        Ok(Self {
            inner: Mutex::new(PagerInner {
                file,
                allocator,
                cache: HashMap::new(),
                dirty: HashSet::new(),
            }),
            fsync_enabled,
        })
    }

    /// Allocates a new block and installs a zeroed buffer for it.
    pub fn new_page(&self) -> PageId {
        let mut inner = self.inner.lock();
        let id = inner.allocator.allocate();
        inner.cache.insert(id, zeroed_block());
        inner.dirty.insert(id);
        id
    }

    /// Returns a copy of the block with the given id.
    ///
    /// Cache misses read from disk; a read past EOF leaves the remainder
    /// of the buffer zeroed.
    pub fn fetch(&self, id: PageId) -> Result<Block> {
        let mut inner = self.inner.lock();
        if let Some(block) = inner.cache.get(&id) {
            return Ok(block.clone());
        }

        let mut block = zeroed_block();
        inner.file.seek(SeekFrom::Start(block_offset(id)))?;
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            let n = inner.file.read(&mut block[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        inner.cache.insert(id, block.clone());
        Ok(block)
    }

    /// Replaces the cached contents of a block and marks it dirty.
    pub fn write(&self, id: PageId, data: &[u8; BLOCK_SIZE]) {
        let mut inner = self.inner.lock();
        match inner.cache.get_mut(&id) {
            Some(block) => block.copy_from_slice(data),
            None => {
                inner.cache.insert(id, Box::new(*data));
            }
        }
        inner.dirty.insert(id);
    }

    /// Writes the cached buffer for `id` to disk.
    pub fn flush(&self, id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::flush_locked(&mut inner, id)
    }

    fn flush_locked(inner: &mut PagerInner, id: PageId) -> Result<()> {
        let block = inner
            .cache
            .get(&id)
            .ok_or_else(|| TesseraError::Internal(format!("flush of uncached block {}", id)))?
            .clone();
        inner.file.seek(SeekFrom::Start(block_offset(id)))?;
        inner.file.write_all(&block[..])?;
        inner.dirty.remove(&id);
        Ok(())
    }

    /// Writes every dirty block to disk.
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let dirty: Vec<PageId> = inner.dirty.iter().copied().collect();
        for id in dirty {
            Self::flush_locked(&mut inner, id)?;
        }
        Ok(())
    }

    /// Fsyncs the data file.
    pub fn sync(&self) -> Result<()> {
        if self.fsync_enabled {
            self.inner.lock().file.sync_all()?;
        }
        Ok(())
    }

    /// Evicts a block from the cache and returns its id to the allocator.
    pub fn free(&self, id: PageId) {
        let mut inner = self.inner.lock();
        inner.cache.remove(&id);
        inner.dirty.remove(&id);
        inner.allocator.free(id);
    }

    /// Flushes everything and fsyncs.
    pub fn close(&self) -> Result<()> {
        self.flush_all()?;
        self.sync()
    }
}
