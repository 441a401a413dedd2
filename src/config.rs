//! Construction-time settings for the heap and the file cache.

/// Default arena size: 8 MiB.
pub const DEFAULT_ARENA_SIZE: usize = 8 << 20;

/// Default cache block size: 4 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Configuration for [`Heap`](crate::Heap) creation.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
  /// Arena size in bytes. Rounded up to the heap granule; fixed for the
  /// life of the heap.
  pub capacity: usize,
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self {
      capacity: DEFAULT_ARENA_SIZE,
    }
  }
}

impl ArenaConfig {
  pub fn with_capacity(
    mut self,
    capacity: usize,
  ) -> Self {
    self.capacity = capacity;
    self
  }
}

/// Configuration for [`File`](crate::File) caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// Bytes buffered per window.
  pub block_size: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      block_size: DEFAULT_BLOCK_SIZE,
    }
  }
}

impl CacheConfig {
  pub fn with_block_size(
    mut self,
    block_size: usize,
  ) -> Self {
    self.block_size = block_size;
    self
  }
}
