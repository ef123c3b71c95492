//! Size-bucketed free list of retired chunks.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{Chunk, ChunkId, ChunkState, PoolError};

/// What happened to a chunk handed to [`ChunkPool::release`].
#[derive(Debug)]
pub enum ReleaseOutcome {
    /// Stored for reuse.
    Pooled,
    /// The bucket is at capacity; the caller should dispose the chunk.
    Full(Chunk),
}

/// Retired chunks keyed by quadtree depth, which determines edge size.
///
/// Only the coordinator mutates the pool. A chunk is either active or in
/// exactly one bucket.
#[derive(Debug, Default)]
pub struct ChunkPool {
    buckets: FxHashMap<u8, Vec<Chunk>>,
    pooled: FxHashSet<ChunkId>,
    vertex_count: usize,
    capacity_per_size: usize,
}

impl ChunkPool {
    /// A pool for chunks of `vertex_count` vertices. A `capacity_per_size`
    /// of 0 leaves buckets unbounded.
    pub fn new(vertex_count: usize, capacity_per_size: usize) -> Self {
        Self {
            buckets: FxHashMap::default(),
            pooled: FxHashSet::default(),
            vertex_count,
            capacity_per_size,
        }
    }

    /// Take a retired chunk of the size belonging to `depth`, if any.
    pub fn acquire(&mut self, depth: u8) -> Option<Chunk> {
        let chunk = self.buckets.get_mut(&depth)?.pop()?;
        self.pooled.remove(&chunk.id());
        Some(chunk)
    }

    /// Return a retired chunk to its size bucket.
    ///
    /// On error the chunk is dropped; the pool is left untouched.
    pub fn release(&mut self, mut chunk: Chunk) -> Result<ReleaseOutcome, PoolError> {
        let id = chunk.id();
        if self.pooled.contains(&id) {
            return Err(PoolError::DoubleRelease { chunk: id });
        }
        if chunk.state() != ChunkState::Retired {
            return Err(PoolError::NotRetired {
                chunk: id,
                state: chunk.state(),
            });
        }
        if chunk.vertex_count() != self.vertex_count {
            return Err(PoolError::BufferSizeMismatch {
                chunk: id,
                expected: self.vertex_count,
                actual: chunk.vertex_count(),
            });
        }

        let bucket = self.buckets.entry(chunk.params().depth()).or_default();
        if self.capacity_per_size > 0 && bucket.len() >= self.capacity_per_size {
            return Ok(ReleaseOutcome::Full(chunk));
        }
        chunk.mark_pooled();
        self.pooled.insert(id);
        bucket.push(chunk);
        Ok(ReleaseOutcome::Pooled)
    }

    /// Total pooled chunks.
    pub fn len(&self) -> usize {
        self.pooled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pooled.is_empty()
    }

    /// Pooled chunks of the size belonging to `depth`.
    pub fn bucket_len(&self, depth: u8) -> usize {
        self.buckets.get(&depth).map_or(0, Vec::len)
    }

    /// Dispose every pooled chunk, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.pooled.len();
        for chunk in self.buckets.drain().flat_map(|(_, bucket)| bucket) {
            chunk.dispose();
        }
        self.pooled.clear();
        count
    }
}
