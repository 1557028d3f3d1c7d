//! Dynamically sized buffers carved from a fixed set of memory blocks.
//!
//! The transmission engine stores data that the application handed over but the peer has not
//! yet acknowledged. The amount varies per connection and over time, so each connection holds a
//! [`Handle`] into a shared [`MemoryPool`] that can grow at the back and shrink at the front.
//!
//! The pool never returns raw pointers. Access goes through slices that borrow the pool and that
//! are bounded to one contiguous region, see [`MemoryPool::linear`].
//!
//! [`Handle`]: struct.Handle.html
//! [`MemoryPool`]: trait.MemoryPool.html
//! [`MemoryPool::linear`]: trait.MemoryPool.html#tymethod.linear
use alloc::vec::Vec;

use super::{IndexList, Link};

/// Identifies one buffer within a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) u16);

/// A pool of growable buffers.
///
/// A buffer is a byte sequence addressed by offsets relative to its first live byte. Growing
/// appends capacity at the back, shrinking releases bytes at the front, which shifts all offsets.
pub trait MemoryPool {
    /// Create a new buffer with room for `size` bytes.
    ///
    /// The pool may grant less than requested. Returns `None` if not a single byte could be
    /// reserved, otherwise the handle and the granted capacity.
    fn allocate(&mut self, size: usize) -> Option<(Handle, usize)>;

    /// Try to grow a buffer by `extra` bytes.
    ///
    /// Returns the total capacity afterwards which may be less than requested.
    fn increase(&mut self, handle: Handle, extra: usize) -> usize;

    /// Release `amount` bytes at the front of a buffer.
    ///
    /// Returns the remaining capacity. Releasing all capacity releases the handle itself, it must
    /// not be used afterwards.
    fn decrease(&mut self, handle: Handle, amount: usize) -> usize;

    /// The longest contiguous region starting at `offset`.
    ///
    /// Returns an empty slice when `offset` is at or beyond the capacity of the buffer.
    fn linear(&self, handle: Handle, offset: usize) -> &[u8];

    /// The longest contiguous mutable region starting at `offset`.
    fn linear_mut(&mut self, handle: Handle, offset: usize) -> &mut [u8];

    /// Copy bytes starting at `offset` into `dest`.
    ///
    /// Returns the number of bytes copied, less than `dest.len()` only if the buffer ended.
    fn get(&self, handle: Handle, dest: &mut [u8], offset: usize) -> usize {
        let mut copied = 0;
        while copied < dest.len() {
            let chunk = self.linear(handle, offset + copied);
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len().min(dest.len() - copied);
            dest[copied..copied + len].copy_from_slice(&chunk[..len]);
            copied += len;
        }
        copied
    }
}

/// A pool of equally sized blocks.
///
/// Buffers are chains of blocks. A chain grows by appending free blocks to its tail and releases
/// blocks at its head once all their bytes were released.
#[derive(Debug)]
pub struct BlockPool {
    storage: Vec<u8>,
    block_size: usize,
    chain_next: Vec<Option<usize>>,
    block_links: Vec<Link>,
    free_blocks: IndexList,
    chains: Vec<Chain>,
    chain_links: Vec<Link>,
    free_chains: IndexList,
}

#[derive(Clone, Copy, Debug, Default)]
struct Chain {
    live: bool,
    head: Option<usize>,
    tail: Option<usize>,
    blocks: usize,
    /// Offset of the first live byte within the head block.
    start: usize,
}

impl BlockPool {
    /// Create a pool of `blocks` blocks of `block_size` bytes each, shared by at most `handles`
    /// buffers.
    ///
    /// # Panics
    /// This function panics if `block_size` is zero or if `handles` exceeds `u16::MAX`.
    pub fn new(block_size: usize, blocks: usize, handles: usize) -> Self {
        assert!(block_size > 0, "blocks must not be empty");
        assert!(handles <= usize::from(u16::MAX), "too many handles");

        let mut block_links = alloc::vec![Link::default(); blocks];
        let mut free_blocks = IndexList::new();
        for idx in (0..blocks).rev() {
            free_blocks.push(&mut block_links, idx);
        }

        let mut chain_links = alloc::vec![Link::default(); handles];
        let mut free_chains = IndexList::new();
        for idx in (0..handles).rev() {
            free_chains.push(&mut chain_links, idx);
        }

        BlockPool {
            storage: alloc::vec![0; block_size * blocks],
            block_size,
            chain_next: alloc::vec![None; blocks],
            block_links,
            free_blocks,
            chains: alloc::vec![Chain::default(); handles],
            chain_links,
            free_chains,
        }
    }

    /// The number of blocks not owned by any buffer.
    pub fn free_blocks(&self) -> usize {
        self.free_blocks.len()
    }

    /// The number of buffers currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.chains.len() - self.free_chains.len()
    }

    fn chain(&self, handle: Handle) -> Option<&Chain> {
        self.chains.get(usize::from(handle.0)).filter(|chain| chain.live)
    }

    fn capacity(chain: &Chain, block_size: usize) -> usize {
        chain.blocks * block_size - chain.start
    }

    fn grow(&mut self, idx: usize, extra: usize) {
        let wanted = (extra + self.block_size - 1) / self.block_size;
        for _ in 0..wanted {
            let block = match self.free_blocks.pop(&mut self.block_links) {
                Some(block) => block,
                None => break,
            };
            self.chain_next[block] = None;
            let chain = &mut self.chains[idx];
            match chain.tail {
                Some(tail) => self.chain_next[tail] = Some(block),
                None => chain.head = Some(block),
            }
            chain.tail = Some(block);
            chain.blocks += 1;
        }
    }

    fn release(&mut self, idx: usize) {
        let mut cursor = self.chains[idx].head;
        while let Some(block) = cursor {
            cursor = self.chain_next[block].take();
            self.free_blocks.push(&mut self.block_links, block);
        }
        self.chains[idx] = Chain::default();
        self.free_chains.push(&mut self.chain_links, idx);
    }

    /// Find the block and the offset within it.
    fn locate(&self, handle: Handle, offset: usize) -> Option<(usize, usize)> {
        let chain = self.chain(handle)?;
        let absolute = chain.start + offset;
        let mut skip = absolute / self.block_size;
        let mut cursor = chain.head;
        while skip > 0 {
            cursor = self.chain_next[cursor?];
            skip -= 1;
        }
        Some((cursor?, absolute % self.block_size))
    }
}

impl MemoryPool for BlockPool {
    fn allocate(&mut self, size: usize) -> Option<(Handle, usize)> {
        if size == 0 || self.free_blocks.is_empty() {
            return None;
        }
        let idx = self.free_chains.pop(&mut self.chain_links)?;
        self.chains[idx] = Chain { live: true, ..Chain::default() };
        self.grow(idx, size);
        let granted = Self::capacity(&self.chains[idx], self.block_size);
        Some((Handle(idx as u16), granted))
    }

    fn increase(&mut self, handle: Handle, extra: usize) -> usize {
        let idx = usize::from(handle.0);
        if self.chain(handle).is_none() {
            return 0;
        }
        // Capacity always extends to the end of the tail block.
        self.grow(idx, extra);
        Self::capacity(&self.chains[idx], self.block_size)
    }

    fn decrease(&mut self, handle: Handle, amount: usize) -> usize {
        let idx = usize::from(handle.0);
        let capacity = match self.chain(handle) {
            Some(chain) => Self::capacity(chain, self.block_size),
            None => return 0,
        };

        if amount >= capacity {
            self.release(idx);
            return 0;
        }

        let block_size = self.block_size;
        let chain = &mut self.chains[idx];
        chain.start += amount;
        while chain.start >= block_size {
            let head = match chain.head {
                Some(head) => head,
                None => break,
            };
            chain.head = self.chain_next[head].take();
            chain.blocks -= 1;
            chain.start -= block_size;
            self.free_blocks.push(&mut self.block_links, head);
        }

        capacity - amount
    }

    fn linear(&self, handle: Handle, offset: usize) -> &[u8] {
        match self.locate(handle, offset) {
            Some((block, within)) => {
                let base = block * self.block_size;
                &self.storage[base + within..base + self.block_size]
            },
            None => &[],
        }
    }

    fn linear_mut(&mut self, handle: Handle, offset: usize) -> &mut [u8] {
        match self.locate(handle, offset) {
            Some((block, within)) => {
                let base = block * self.block_size;
                &mut self.storage[base + within..base + self.block_size]
            },
            None => &mut [],
        }
    }
}
