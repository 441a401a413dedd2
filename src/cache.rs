//! Single-block file cache.
//!
//! A window describes which slice of the file its buffer holds, using three
//! file offsets:
//!
//! ```text
//!   read window                         write window
//!
//!   tag     pos_tag      end_tag        tag        pos_tag          end_tag
//!    │         │            │            │            │                │
//!    ▼         ▼            ▼            ▼            ▼                ▼
//!    ┌─────────┬────────────┬──── ─ ─    ┌────────────┬────────────────┐
//!    │ consumed│   unread   │            │  pending   │     room       │
//!    └─────────┴────────────┴──── ─ ─    └────────────┴────────────────┘
//!                           ▲                                          ▲
//!                  descriptor position                  tag + capacity
//! ```
//!
//! For reads the descriptor sits at `end_tag`; for writes it sits at `tag`.
//! In both directions `tag <= pos_tag <= end_tag <= tag + capacity`.

use std::{io, os::fd::RawFd};

use tracing::trace;

use crate::{error::InvariantViolation, sys};

/// The cache of one [`File`](crate::File). Read-only outside the crate;
/// see [`File::window`](crate::File::window).
pub struct CacheWindow {
  buf: Box<[u8]>,
  /// File offset of the first cached byte.
  tag: u64,
  /// Read: one past the last valid byte. Write: one past the last slot.
  end_tag: u64,
  /// File offset of the next byte to read or write.
  pos_tag: u64,
}

impl CacheWindow {
  /// An empty window at file offset zero. `capacity` must be non-zero.
  pub(crate) fn new(capacity: usize) -> Self {
    debug_assert!(capacity > 0);

    Self {
      buf: vec![0; capacity].into_boxed_slice(),
      tag: 0,
      end_tag: 0,
      pos_tag: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.buf.len()
  }

  pub fn tag(&self) -> u64 {
    self.tag
  }

  pub fn end_tag(&self) -> u64 {
    self.end_tag
  }

  pub fn pos_tag(&self) -> u64 {
    self.pos_tag
  }

  /// No unread bytes (read) or no room (write) left.
  pub fn is_exhausted(&self) -> bool {
    self.pos_tag == self.end_tag
  }

  /// Bytes written into the window but not yet flushed.
  pub fn pending(&self) -> usize {
    (self.pos_tag - self.tag) as usize
  }

  /// Checks the ordering of the three offsets and that the window fits in
  /// the buffer.
  pub fn check(&self) -> Result<(), InvariantViolation> {
    let ordered = self.tag <= self.pos_tag && self.pos_tag <= self.end_tag;

    if !ordered || self.end_tag - self.tag > self.capacity() as u64 {
      return Err(InvariantViolation::Window {
        tag: self.tag,
        pos_tag: self.pos_tag,
        end_tag: self.end_tag,
        capacity: self.capacity(),
      });
    }

    Ok(())
  }

  fn debug_check(&self) {
    if cfg!(debug_assertions) {
      if let Err(violation) = self.check() {
        panic!("{violation}");
      }
    }
  }

  /// Replaces the window with the next block read from `fd`, starting at
  /// `end_tag`. Returns the number of bytes read; zero at end of file
  /// leaves the window empty. Any unread bytes are dropped, so callers
  /// refill only once the window is exhausted.
  ///
  /// On error the offsets are left as they were.
  pub(crate) fn fill(
    &mut self,
    fd: RawFd,
  ) -> io::Result<usize> {
    self.debug_check();

    let n = sys::read(fd, &mut self.buf)?;

    self.tag = self.end_tag;
    self.pos_tag = self.end_tag;
    self.end_tag += n as u64;

    trace!(fd, tag = self.tag, n, "fill");

    self.debug_check();

    Ok(n)
  }

  /// Next byte of a read window, refilling from `fd` when exhausted.
  /// `Ok(None)` at end of file.
  pub(crate) fn read_byte(
    &mut self,
    fd: RawFd,
  ) -> io::Result<Option<u8>> {
    if self.is_exhausted() {
      self.fill(fd)?;

      if self.is_exhausted() {
        return Ok(None);
      }
    }

    let byte = self.buf[(self.pos_tag - self.tag) as usize];
    self.pos_tag += 1;

    Ok(Some(byte))
  }

  /// Copies unread bytes of a read window into `out` and consumes them.
  pub(crate) fn drain(
    &mut self,
    out: &mut [u8],
  ) -> usize {
    let start = (self.pos_tag - self.tag) as usize;
    let n = out.len().min((self.end_tag - self.pos_tag) as usize);

    out[..n].copy_from_slice(&self.buf[start..start + n]);
    self.pos_tag += n as u64;

    n
  }

  /// Stores a byte in a write window, flushing to `fd` first when full.
  pub(crate) fn write_byte(
    &mut self,
    fd: RawFd,
    byte: u8,
  ) -> io::Result<()> {
    if self.is_exhausted() {
      self.flush(fd)?;
    }

    self.buf[(self.pos_tag - self.tag) as usize] = byte;
    self.pos_tag += 1;

    Ok(())
  }

  /// Writes the pending bytes of a write window to `fd`, then reopens the
  /// window at `pos_tag` with room for a full block.
  ///
  /// On error the unwritten bytes stay pending: `tag` moves past whatever
  /// was written, so a retry writes exactly the rest.
  pub(crate) fn flush(
    &mut self,
    fd: RawFd,
  ) -> io::Result<()> {
    self.debug_check();

    let pending = self.pending();
    if pending > 0 {
      let (written, error) = sys::write_full(fd, &self.buf[..pending]);

      if let Some(error) = error {
        if written > 0 {
          self.buf.copy_within(written..pending, 0);
          self.tag += written as u64;
        }
        self.debug_check();
        return Err(error);
      }
    }

    self.tag = self.pos_tag;
    self.end_tag = self.tag + self.capacity() as u64;

    trace!(fd, tag = self.tag, pending, "flush");

    self.debug_check();

    Ok(())
  }

  /// Moves an empty window (read: exhausted, write: nothing pending) past
  /// `n` bytes transferred directly on the descriptor.
  pub(crate) fn advance_past(
    &mut self,
    n: u64,
  ) {
    debug_assert!(self.is_exhausted() || self.pending() == 0);

    self.reset_at(self.pos_tag + n);
  }

  /// Drops all cached state and places an empty window at `offset`.
  pub(crate) fn reset_at(
    &mut self,
    offset: u64,
  ) {
    self.tag = offset;
    self.pos_tag = offset;
    self.end_tag = offset;
  }
}
