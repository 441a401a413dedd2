//! Error types for the heap and the file cache.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::file::Mode;

/// Errors returned by [`Heap`](crate::Heap) operations.
///
/// `OutOfSpace` and `Overflow` are ordinary failures and are counted in
/// [`Statistics`](crate::Statistics). `NotInArena`, `NotAllocated` and
/// `DoubleRelease` are caller contract violations; the heap is left
/// unchanged when one is reported.
#[derive(Debug, Error)]
pub enum AllocError {
  /// No free extent is large enough for the request.
  #[error("out of space: no free extent fits {requested} bytes")]
  OutOfSpace { requested: usize },

  /// `count * size` does not fit in a `usize`.
  #[error("size overflow: {count} * {size} does not fit in usize")]
  Overflow { count: usize, size: usize },

  /// The pointer is outside the arena.
  #[error("invalid release of {ptr:#x}: not in heap")]
  NotInArena { ptr: usize },

  /// The pointer is inside the arena but is not the start of a live
  /// allocation.
  #[error("invalid release of {ptr:#x}: not allocated")]
  NotAllocated { ptr: usize },

  /// The pointer lies in free space: already released or never returned.
  #[error("invalid release of {ptr:#x}: double free")]
  DoubleRelease { ptr: usize },

  /// The requested arena capacity is zero or too large to round up.
  #[error("invalid arena capacity {capacity}")]
  InvalidCapacity { capacity: usize },

  /// The operating system refused to map the arena.
  #[error("mmap of {capacity} bytes failed: {source}")]
  Map {
    capacity: usize,
    #[source]
    source: io::Error,
  },
}

impl AllocError {
  /// Whether this error reports a misuse of the heap rather than exhaustion.
  pub fn is_contract_violation(&self) -> bool {
    matches!(
      self,
      AllocError::NotInArena { .. } | AllocError::NotAllocated { .. } | AllocError::DoubleRelease { .. }
    )
  }
}

/// Errors returned by [`File`](crate::File) operations.
#[derive(Debug, Error)]
pub enum IoError {
  /// A system call on the descriptor failed.
  #[error("{op} failed: {source}")]
  Os {
    op: &'static str,
    #[source]
    source: io::Error,
  },

  /// The named file could not be opened.
  #[error("{}: {source}", .path.display())]
  Open {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The operation does not match the direction the file was opened for.
  #[error("cannot {op} a {mode} file")]
  WrongMode { mode: Mode, op: &'static str },

  /// Cache blocks must hold at least one byte.
  #[error("invalid cache block size {block_size}")]
  InvalidBlockSize { block_size: usize },
}

impl IoError {
  pub(crate) fn os(
    op: &'static str,
    source: io::Error,
  ) -> Self {
    IoError::Os { op, source }
  }
}

/// Result type for file operations.
pub type Result<T> = std::result::Result<T, IoError>;

/// A broken structural invariant of the heap or of a cache window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
  #[error("free extent at {offset} has zero length")]
  EmptyExtent { offset: usize },

  #[error("free extents at {left} and {right} are adjacent but not merged")]
  UnmergedExtents { left: usize, right: usize },

  #[error("range at {offset} overlaps the range before it (which ends at {prev_end})")]
  Overlap { offset: usize, prev_end: usize },

  #[error("bytes {from}..{to} are neither free nor allocated")]
  Gap { from: usize, to: usize },

  #[error("range ending at {end} runs past the arena capacity {capacity}")]
  PastCapacity { end: usize, capacity: usize },

  #[error("counter {counter} is {actual}, live records say {expected}")]
  Counter {
    counter: &'static str,
    expected: u64,
    actual: u64,
  },

  #[error("cache window out of order: tag {tag}, pos_tag {pos_tag}, end_tag {end_tag} (capacity {capacity})")]
  Window {
    tag: u64,
    pos_tag: u64,
    end_tag: u64,
    capacity: usize,
  },
}
