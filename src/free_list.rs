//! Ordered list of free arena extents.
//!
//! ```text
//!   offset:   0        64       96            192          256
//!             ├────────┼────────┼─────────────┼────────────┤
//!   arena:    │  used  │  FREE  │    used     │    FREE    │
//!             └────────┴────────┴─────────────┴────────────┘
//!   list:              (64,32)                (192,64)
//! ```
//!
//! Extents are keyed by offset. No two extents touch: [`FreeList::insert`]
//! merges a released extent with both neighbours before storing it.

use std::collections::BTreeMap;

use crate::{error::InvariantViolation, extent::Extent};

#[derive(Debug, Default)]
pub(crate) struct FreeList {
  /// offset -> length
  extents: BTreeMap<usize, usize>,
}

impl FreeList {
  /// A list with one extent spanning `capacity` bytes.
  pub fn new(capacity: usize) -> Self {
    let mut extents = BTreeMap::new();
    if capacity > 0 {
      extents.insert(0, capacity);
    }

    Self { extents }
  }

  pub fn len(&self) -> usize {
    self.extents.len()
  }

  /// Extents in offset order.
  pub fn iter(&self) -> impl Iterator<Item = Extent> + '_ {
    self.extents.iter().map(|(&offset, &len)| Extent::new(offset, len))
  }

  pub fn free_bytes(&self) -> usize {
    self.extents.values().sum()
  }

  pub fn largest(&self) -> usize {
    self.extents.values().copied().max().unwrap_or(0)
  }

  /// First-fit: carves `len` bytes off the low end of the lowest extent
  /// that holds at least `len` bytes and returns their offset.
  pub fn take_first_fit(
    &mut self,
    len: usize,
  ) -> Option<usize> {
    let (offset, extent_len) = self
      .extents
      .iter()
      .map(|(&offset, &extent_len)| (offset, extent_len))
      .find(|&(_, extent_len)| extent_len >= len)?;

    self.carve(offset, extent_len, len);

    Some(offset)
  }

  /// Carves `len` bytes from a free extent that starts exactly at `offset`.
  /// Returns `false`, leaving the list untouched, if there is no such
  /// extent or it is too short.
  pub fn take_at(
    &mut self,
    offset: usize,
    len: usize,
  ) -> bool {
    match self.extents.get(&offset) {
      Some(&extent_len) if extent_len >= len => {
        self.carve(offset, extent_len, len);
        true
      }
      _ => false,
    }
  }

  fn carve(
    &mut self,
    offset: usize,
    extent_len: usize,
    len: usize,
  ) {
    self.extents.remove(&offset);
    if extent_len > len {
      self.extents.insert(offset + len, extent_len - len);
    }
  }

  /// Returns `extent` to the list, merging it with a predecessor that ends
  /// at its start and with a successor that starts at its end. Returns the
  /// extent as stored.
  ///
  /// `extent` must not overlap anything already in the list.
  pub fn insert(
    &mut self,
    extent: Extent,
  ) -> Extent {
    debug_assert!(extent.len > 0);
    debug_assert!(self.containing(extent.offset).is_none());

    let mut merged = extent;

    if let Some((&prev_offset, &prev_len)) = self.extents.range(..merged.offset).next_back() {
      if Extent::new(prev_offset, prev_len).touches(&merged) {
        self.extents.remove(&prev_offset);
        merged = Extent::new(prev_offset, prev_len + merged.len);
      }
    }

    if let Some(next_len) = self.extents.remove(&merged.end()) {
      merged.len += next_len;
    }

    self.extents.insert(merged.offset, merged.len);

    merged
  }

  /// The free extent containing byte `offset`, if any.
  pub fn containing(
    &self,
    offset: usize,
  ) -> Option<Extent> {
    self
      .extents
      .range(..=offset)
      .next_back()
      .map(|(&start, &len)| Extent::new(start, len))
      .filter(|extent| extent.contains(offset))
  }

  /// Every extent is non-empty, and consecutive extents neither overlap
  /// nor touch.
  pub fn check(&self) -> Result<(), InvariantViolation> {
    let mut prev: Option<Extent> = None;

    for extent in self.iter() {
      if extent.len == 0 {
        return Err(InvariantViolation::EmptyExtent { offset: extent.offset });
      }

      if let Some(prev) = prev {
        if prev.touches(&extent) {
          return Err(InvariantViolation::UnmergedExtents {
            left: prev.offset,
            right: extent.offset,
          });
        }
        if prev.end() > extent.offset {
          return Err(InvariantViolation::Overlap {
            offset: extent.offset,
            prev_end: prev.end(),
          });
        }
      }

      prev = Some(extent);
    }

    Ok(())
  }
}
