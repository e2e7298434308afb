//! Immutable byte chunks and the rewindable chain that holds them.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable view over a shared byte region.
///
/// Slicing never copies: the new chunk references the same allocation with
/// narrower bounds.
#[derive(Clone)]
pub struct Chunk {
    data: Arc<[u8]>,
    start: usize,
    len: usize,
}

impl Chunk {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        let len = data.len();
        Self {
            data,
            start: 0,
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    /// Returns `length` bytes starting at `position`, clamped to this chunk.
    ///
    /// A request covering the full extent hands back the same view.
    pub fn slice(&self, position: usize, length: usize) -> Chunk {
        if position == 0 && length >= self.len {
            return self.clone();
        }

        let start = position.min(self.len);
        let len = length.min(self.len - start);
        Self {
            data: Arc::clone(&self.data),
            start: self.start + start,
            len,
        }
    }

    /// True when both chunks view the same allocation.
    pub fn shares_region(&self, other: &Chunk) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Deref for Chunk {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Chunk {}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk").field("len", &self.len).finish()
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for Chunk {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<Arc<[u8]>> for Chunk {
    fn from(value: Arc<[u8]>) -> Self {
        Self::new(value)
    }
}

/// Ordered history of every chunk delivered to one consumer.
///
/// `head` indexes the chunk currently being read; `head == chunks.len()`
/// means every delivered byte has been passed over. Chunks behind `head`
/// stay in the chain so readers can rewind across them until
/// [`ChunkChain::release_consumed`] drops them.
#[derive(Debug, Clone, Default)]
pub struct ChunkChain {
    chunks: VecDeque<Chunk>,
    head: usize,
    available_bytes: u64,
    available_buffers: usize,
    released_bytes: u64,
}

impl ChunkChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chunk at the tail. Empty chunks carry no bytes and are dropped.
    pub fn append(&mut self, chunk: Chunk) {
        if chunk.is_empty() {
            return;
        }

        self.available_bytes += chunk.len() as u64;
        self.available_buffers += 1;
        self.chunks.push_back(chunk);
    }

    /// Moves the head past the current chunk. Returns whether a next chunk exists.
    pub fn advance(&mut self) -> bool {
        let Some(chunk) = self.chunks.get(self.head) else {
            return false;
        };

        self.available_bytes -= chunk.len() as u64;
        self.available_buffers -= 1;
        self.head += 1;
        self.head < self.chunks.len()
    }

    /// Moves the head back one chunk. Returns false at the first retained chunk.
    pub fn rewind(&mut self) -> bool {
        if self.head == 0 {
            return false;
        }

        self.head -= 1;
        self.available_bytes += self.chunks[self.head].len() as u64;
        self.available_buffers += 1;
        true
    }

    #[inline]
    pub fn head(&self) -> Option<&Chunk> {
        self.chunks.get(self.head)
    }

    /// The chunk `n` positions after the head.
    #[inline]
    pub fn ahead(&self, n: usize) -> Option<&Chunk> {
        self.chunks.get(self.head + n)
    }

    /// Bytes from the start of the head chunk to the tail.
    #[inline]
    pub fn available_bytes(&self) -> u64 {
        self.available_bytes
    }

    /// Chunks from the head to the tail, inclusive.
    #[inline]
    pub fn available_buffers(&self) -> usize {
        self.available_buffers
    }

    /// Chunks still held, including those behind the head.
    pub fn retained_buffers(&self) -> usize {
        self.chunks.len()
    }

    /// Total bytes ever appended, including released chunks.
    pub fn total_bytes(&self) -> u64 {
        self.released_bytes + self.chunks.iter().map(|c| c.len() as u64).sum::<u64>()
    }

    /// Bytes dropped by [`ChunkChain::release_consumed`].
    pub fn released_bytes(&self) -> u64 {
        self.released_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drops every chunk behind the head. Readers can no longer rewind
    /// before the start of the current head chunk afterwards.
    pub fn release_consumed(&mut self) -> usize {
        self.release_before(u64::MAX)
    }

    /// Drops chunks behind the head that end at or before the absolute
    /// stream offset `floor`.
    pub fn release_before(&mut self, floor: u64) -> usize {
        let mut released = 0;
        while self.head > 0 {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let end = self.released_bytes + front.len() as u64;
            if end > floor {
                break;
            }
            self.released_bytes = end;
            self.chunks.pop_front();
            self.head -= 1;
            released += 1;
        }
        released
    }
}
