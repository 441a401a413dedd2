use std::{
  collections::BTreeMap,
  io,
  panic::Location,
  ptr::{self, NonNull},
};

use tracing::{debug, error, trace};

use crate::{
  align,
  config::ArenaConfig,
  error::{AllocError, InvariantViolation},
  extent::Extent,
  free_list::FreeList,
  region::Region,
  stats::Statistics,
};

/// A live allocation, keyed by its arena offset.
#[derive(Debug, Clone, Copy)]
struct Allocation {
  /// Bytes reserved, a whole number of granules.
  len: usize,
  /// Bytes the caller asked for.
  requested: usize,
  site: &'static Location<'static>,
}

/// An allocation that is still live, as reported by [`Heap::leaks`].
#[derive(Debug, Clone, Copy)]
pub struct Leak {
  pub ptr: NonNull<u8>,
  pub size: usize,
  /// Where the allocation was requested.
  pub site: &'static Location<'static>,
}

/// First-fit allocator over one fixed-size arena.
///
/// Every byte of the arena is either in a live allocation or in a free
/// extent. Allocation carves from the low end of the first free extent that
/// fits; release merges the freed range with both neighbours.
pub struct Heap {
  region: Region,
  free: FreeList,
  live: BTreeMap<usize, Allocation>,
  stats: Statistics,
}

impl Heap {
  pub fn new(config: ArenaConfig) -> Result<Self, AllocError> {
    let capacity = match align::checked_align(config.capacity) {
      Some(capacity) if capacity > 0 => capacity,
      _ => {
        return Err(AllocError::InvalidCapacity {
          capacity: config.capacity,
        });
      }
    };

    let region = Region::map(capacity)?;

    Ok(Self {
      region,
      free: FreeList::new(capacity),
      live: BTreeMap::new(),
      stats: Statistics::default(),
    })
  }

  pub fn capacity(&self) -> usize {
    self.region.capacity()
  }

  /// Whether `ptr` points into the arena.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    self.region.offset_of(ptr).is_some()
  }

  pub fn statistics(&self) -> Statistics {
    self.stats
  }

  /// Free extents in address order.
  pub fn free_extents(&self) -> impl Iterator<Item = Extent> + '_ {
    self.free.iter()
  }

  /// Requested size of the live allocation starting at `ptr`.
  pub fn allocation_size(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let offset = self.region.offset_of(ptr)?;

    self.live.get(&offset).map(|record| record.requested)
  }

  /// Returns a pointer to `size` uninitialized bytes, aligned to
  /// [`MIN_ALIGNMENT`](crate::align::MIN_ALIGNMENT).
  ///
  /// A zero-size request reserves one granule and returns a unique pointer.
  /// Fails with [`AllocError::OutOfSpace`] when no free extent fits; the
  /// failure is counted in [`Statistics::nfail`] and
  /// [`Statistics::fail_size`].
  #[track_caller]
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.allocate_at(size, Location::caller())
  }

  /// Returns a pointer to `count * size` zeroed bytes.
  ///
  /// Fails with [`AllocError::Overflow`] if the product overflows; the
  /// failure is counted with the saturated product as its size.
  #[track_caller]
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let Some(total) = count.checked_mul(size) else {
      self.stats.record_failure(count.saturating_mul(size));
      debug!(count, size, "allocation size overflows");
      return Err(AllocError::Overflow { count, size });
    };

    let ptr = self.allocate_at(total, Location::caller())?;

    unsafe { ptr::write_bytes(ptr.as_ptr(), 0, total) };

    Ok(ptr)
  }

  /// Releases the allocation starting at `ptr`. A null `ptr` is ignored.
  ///
  /// Releasing a pointer that is not the start of a live allocation is a
  /// contract violation: it is logged, reported as an error, and leaves the
  /// heap unchanged.
  #[track_caller]
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    if ptr.is_null() {
      return Ok(());
    }

    self.debug_check();

    let (offset, record) = self.lookup(ptr)?;
    self.free_record(offset, record);

    trace!(offset, len = record.len, "release");

    self.debug_check();

    Ok(())
  }

  /// Resizes the allocation starting at `ptr`, keeping its first
  /// `min(old, size)` bytes. A null `ptr` behaves like [`Heap::allocate`].
  ///
  /// Shrinks in place, grows in place when the bytes right after the
  /// allocation are free, and otherwise moves. On failure the original
  /// allocation is untouched.
  #[track_caller]
  pub fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let site = Location::caller();

    if ptr.is_null() {
      return self.allocate_at(size, site);
    }

    self.debug_check();

    let (offset, record) = self.lookup(ptr)?;

    let Some(len) = align::checked_align(size.max(1)) else {
      return Err(self.fail(size));
    };

    if len < record.len {
      self.free.insert(Extent::new(offset + len, record.len - len));
    } else if len > record.len && !self.free.take_at(offset + record.len, len - record.len) {
      let moved = self.allocate_at(size, site)?;

      unsafe { ptr::copy_nonoverlapping(ptr, moved.as_ptr(), record.requested.min(size)) };

      self.free_record(offset, record);
      self.debug_check();

      return Ok(moved);
    }

    self.live.insert(offset, Allocation { len, requested: size, site });
    self.stats.record_release(record.requested);
    self.stats.record_allocation(ptr as usize, size);

    trace!(offset, from = record.len, to = len, "resize in place");

    self.debug_check();

    Ok(self.region.ptr_at(offset))
  }

  /// Live allocations in address order.
  pub fn leaks(&self) -> impl Iterator<Item = Leak> + '_ {
    self.live.iter().map(|(&offset, record)| Leak {
      ptr: self.region.ptr_at(offset),
      size: record.requested,
      site: record.site,
    })
  }

  /// Writes one line per live allocation.
  pub fn write_leak_report<W: io::Write>(
    &self,
    mut out: W,
  ) -> io::Result<()> {
    for leak in self.leaks() {
      writeln!(
        out,
        "LEAK CHECK: {}:{}: allocated object {:p} with size {}",
        leak.site.file(),
        leak.site.line(),
        leak.ptr,
        leak.size
      )?;
    }

    Ok(())
  }

  /// Checks that the free list is coalesced, that free extents and live
  /// allocations exactly cover the arena, and that the live counters agree
  /// with the allocation table.
  pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
    self.free.check()?;
    self.check_partition()?;
    self.check_counters()
  }

  fn check_partition(&self) -> Result<(), InvariantViolation> {
    let mut ranges: Vec<Extent> = self
      .live
      .iter()
      .map(|(&offset, record)| Extent::new(offset, record.len))
      .chain(self.free.iter())
      .collect();
    ranges.sort_unstable_by_key(|range| range.offset);

    let capacity = self.capacity();
    let mut cursor = 0;

    for range in ranges {
      if range.offset < cursor {
        return Err(InvariantViolation::Overlap {
          offset: range.offset,
          prev_end: cursor,
        });
      }
      if range.offset > cursor {
        return Err(InvariantViolation::Gap {
          from: cursor,
          to: range.offset,
        });
      }
      cursor = range.end();
    }

    if cursor > capacity {
      return Err(InvariantViolation::PastCapacity { end: cursor, capacity });
    }
    if cursor < capacity {
      return Err(InvariantViolation::Gap {
        from: cursor,
        to: capacity,
      });
    }

    Ok(())
  }

  fn check_counters(&self) -> Result<(), InvariantViolation> {
    let nactive = self.live.len() as u64;
    if self.stats.nactive != nactive {
      return Err(InvariantViolation::Counter {
        counter: "nactive",
        expected: nactive,
        actual: self.stats.nactive,
      });
    }

    let active_size: u64 = self.live.values().map(|record| record.requested as u64).sum();
    if self.stats.active_size != active_size {
      return Err(InvariantViolation::Counter {
        counter: "active_size",
        expected: active_size,
        actual: self.stats.active_size,
      });
    }

    Ok(())
  }

  fn debug_check(&self) {
    if cfg!(debug_assertions) {
      if let Err(violation) = self.check_invariants() {
        panic!("heap invariant violated: {violation}");
      }
    }
  }

  fn allocate_at(
    &mut self,
    size: usize,
    site: &'static Location<'static>,
  ) -> Result<NonNull<u8>, AllocError> {
    self.debug_check();

    let Some(len) = align::checked_align(size.max(1)) else {
      return Err(self.fail(size));
    };
    let Some(offset) = self.free.take_first_fit(len) else {
      return Err(self.fail(size));
    };

    self.live.insert(offset, Allocation { len, requested: size, site });

    let ptr = self.region.ptr_at(offset);
    self.stats.record_allocation(ptr.as_ptr() as usize, size);

    trace!(offset, len, requested = size, %site, "allocate");

    self.debug_check();

    Ok(ptr)
  }

  fn fail(
    &mut self,
    size: usize,
  ) -> AllocError {
    self.stats.record_failure(size);

    debug!(
      requested = size,
      free = self.free.free_bytes(),
      largest = self.free.largest(),
      extents = self.free.len(),
      "allocation failed"
    );

    AllocError::OutOfSpace { requested: size }
  }

  fn free_record(
    &mut self,
    offset: usize,
    record: Allocation,
  ) {
    self.live.remove(&offset);
    self.free.insert(Extent::new(offset, record.len));
    self.stats.record_release(record.requested);
  }

  /// Finds the live allocation starting at `ptr`, or classifies and logs
  /// why there is none.
  #[track_caller]
  fn lookup(
    &self,
    ptr: *mut u8,
  ) -> Result<(usize, Allocation), AllocError> {
    let addr = ptr as usize;

    let violation = match self.region.offset_of(ptr) {
      None => AllocError::NotInArena { ptr: addr },
      Some(offset) => {
        if let Some(record) = self.live.get(&offset) {
          return Ok((offset, *record));
        }

        if self.free.containing(offset).is_some() {
          AllocError::DoubleRelease { ptr: addr }
        } else {
          if let Some((&start, record)) = self.live.range(..offset).next_back() {
            error!(
              inside = offset - start,
              region_size = record.requested,
              allocated_at = %record.site,
              "pointer is inside a live allocation"
            );
          }
          AllocError::NotAllocated { ptr: addr }
        }
      }
    };

    error!(site = %Location::caller(), error = %violation, "MEMORY BUG");

    Err(violation)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::MIN_ALIGNMENT;

  const G: usize = MIN_ALIGNMENT;

  fn heap(capacity: usize) -> Heap {
    Heap::new(ArenaConfig::default().with_capacity(capacity)).unwrap()
  }

  fn extents(heap: &Heap) -> Vec<(usize, usize)> {
    heap.free_extents().map(|extent| (extent.offset, extent.len)).collect()
  }

  #[test]
  fn test_alloc() {
    let mut heap = heap(4096);

    unsafe {
      let first_addr = heap.allocate(8).unwrap().as_ptr() as *mut u64;

      *first_addr = 3u64;

      assert_eq!(*first_addr, 3);

      let size: usize = 6;

      let second_addr = heap.allocate(size * 2).unwrap().as_ptr() as *mut u16;

      for i in 0..size {
        *(second_addr.add(i)) = (i + 1) as u16;
      }

      assert_eq!(*first_addr, 3);

      for i in 0..size {
        assert_eq!((i + 1) as u16, *(second_addr.add(i)))
      }

      heap.release(first_addr as *mut u8).unwrap();

      let third_addr = heap.allocate(4).unwrap().as_ptr() as *mut u32;

      assert_eq!(first_addr as *mut u32, third_addr);

      heap.release(third_addr as *mut u8).unwrap();

      let fourth_addr = heap.allocate(16).unwrap().as_ptr() as *mut u128;

      *fourth_addr = 25;

      assert_eq!(fourth_addr as *mut u8, first_addr as *mut u8);
      assert_eq!(*fourth_addr, 25);
    }
  }

  #[test]
  fn test_alignment() {
    let mut heap = heap(4096);

    for size in [1, 3, 7, 8, 13, 16, 17, 31, 100] {
      let ptr = heap.allocate(size).unwrap();

      assert_eq!(ptr.as_ptr() as usize % MIN_ALIGNMENT, 0);
    }
  }

  #[test]
  fn test_zero_size_allocations_are_unique() {
    let mut heap = heap(4096);

    let a = heap.allocate(0).unwrap();
    let b = heap.allocate(0).unwrap();

    assert_ne!(a, b);
    assert_eq!(heap.allocation_size(a.as_ptr()), Some(0));
    assert_eq!(heap.statistics().nactive, 2);
    assert_eq!(heap.statistics().active_size, 0);

    heap.release(a.as_ptr()).unwrap();
    heap.release(b.as_ptr()).unwrap();
    assert_eq!(extents(&heap), vec![(0, 4096)]);
  }

  #[test]
  fn test_capacity_is_rounded_up() {
    let heap = heap(G + 1);

    assert_eq!(heap.capacity(), 2 * G);
  }

  #[test]
  fn test_invalid_capacity() {
    assert!(matches!(
      Heap::new(ArenaConfig::default().with_capacity(0)),
      Err(AllocError::InvalidCapacity { capacity: 0 })
    ));
    assert!(matches!(
      Heap::new(ArenaConfig::default().with_capacity(usize::MAX)),
      Err(AllocError::InvalidCapacity { .. })
    ));
  }

  #[test]
  fn test_first_fit_carves_low_end() {
    let mut heap = heap(16 * G);

    let a = heap.allocate(4 * G).unwrap();
    let _b = heap.allocate(G).unwrap();
    let c = heap.allocate(2 * G).unwrap();
    let _d = heap.allocate(G).unwrap();

    heap.release(a.as_ptr()).unwrap();
    heap.release(c.as_ptr()).unwrap();
    assert_eq!(extents(&heap), vec![(0, 4 * G), (5 * G, 2 * G), (8 * G, 8 * G)]);

    // The 2G hole is the best fit, but the 4G hole comes first.
    let e = heap.allocate(2 * G).unwrap();

    assert_eq!(e, a);
    assert_eq!(extents(&heap), vec![(2 * G, 2 * G), (5 * G, 2 * G), (8 * G, 8 * G)]);
  }

  #[test]
  fn test_release_coalesces_both_sides() {
    let mut heap = heap(8 * G);

    let a = heap.allocate(G).unwrap();
    let b = heap.allocate(G).unwrap();
    let c = heap.allocate(G).unwrap();
    let _d = heap.allocate(G).unwrap();

    heap.release(a.as_ptr()).unwrap();
    heap.release(c.as_ptr()).unwrap();
    assert_eq!(extents(&heap), vec![(0, G), (2 * G, G), (4 * G, 4 * G)]);

    heap.release(b.as_ptr()).unwrap();
    assert_eq!(extents(&heap), vec![(0, 3 * G), (4 * G, 4 * G)]);
    assert!(heap.check_invariants().is_ok());
  }

  #[test]
  fn test_release_everything_restores_one_extent() {
    let mut heap = heap(64 * G);

    let ptrs: Vec<_> = (1..=8).map(|i| heap.allocate(i * 5).unwrap()).collect();

    for ptr in ptrs.iter().step_by(2).chain(ptrs.iter().skip(1).step_by(2)) {
      heap.release(ptr.as_ptr()).unwrap();
    }

    assert_eq!(extents(&heap), vec![(0, 64 * G)]);
    assert_eq!(heap.statistics().nactive, 0);
    assert_eq!(heap.statistics().active_size, 0);
  }

  #[test]
  fn test_release_null_is_noop() {
    let mut heap = heap(4096);

    heap.release(ptr::null_mut()).unwrap();

    assert_eq!(heap.statistics(), Statistics::default());
  }

  #[test]
  fn test_statistics() {
    let mut heap = heap(4096);

    let a = heap.allocate(10).unwrap();
    let b = heap.allocate(20).unwrap();
    heap.release(a.as_ptr()).unwrap();

    let stats = heap.statistics();
    assert_eq!(stats.nactive, 1);
    assert_eq!(stats.active_size, 20);
    assert_eq!(stats.ntotal, 2);
    assert_eq!(stats.total_size, 30);
    assert_eq!(stats.nfail, 0);
    assert_eq!(stats.heap_min, a.as_ptr() as usize);
    assert_eq!(stats.heap_max, b.as_ptr() as usize + 20);
  }

  #[test]
  fn test_failed_allocation_is_counted() {
    let mut heap = heap(1024);

    let _all = heap.allocate(1024).unwrap();
    let before = heap.statistics();

    assert!(matches!(
      heap.allocate(100),
      Err(AllocError::OutOfSpace { requested: 100 })
    ));

    let after = heap.statistics();
    assert_eq!(after.nfail, before.nfail + 1);
    assert_eq!(after.fail_size, before.fail_size + 100);
    assert_eq!(after.nactive, before.nactive);
    assert_eq!(after.active_size, before.active_size);
  }

  #[test]
  fn test_fragmented_arena_fails_large_request() {
    let mut heap = heap(4 * G);

    let a = heap.allocate(G).unwrap();
    let _b = heap.allocate(G).unwrap();
    let c = heap.allocate(G).unwrap();
    let _d = heap.allocate(G).unwrap();
    heap.release(a.as_ptr()).unwrap();
    heap.release(c.as_ptr()).unwrap();

    // 2G bytes are free, but not contiguously.
    assert!(heap.allocate(2 * G).is_err());
    assert_eq!(heap.statistics().nfail, 1);
  }

  #[test]
  fn test_allocate_zeroed() {
    let mut heap = heap(4096);

    let dirty = heap.allocate(64).unwrap();
    unsafe { ptr::write_bytes(dirty.as_ptr(), 0xFF, 64) };
    heap.release(dirty.as_ptr()).unwrap();

    let zeroed = heap.allocate_zeroed(16, 4).unwrap();

    assert_eq!(zeroed, dirty);
    let bytes = unsafe { std::slice::from_raw_parts(zeroed.as_ptr(), 64) };
    assert!(bytes.iter().all(|&byte| byte == 0));
  }

  #[test]
  fn test_allocate_zeroed_overflow() {
    let mut heap = heap(4096);

    let result = heap.allocate_zeroed(usize::MAX / 2 + 1, 4);

    assert!(matches!(result, Err(AllocError::Overflow { .. })));
    let stats = heap.statistics();
    assert_eq!(stats.nfail, 1);
    assert_eq!(stats.fail_size, usize::MAX as u64);
    assert_eq!(stats.ntotal, 0);
  }

  #[test]
  fn test_huge_request_fails_without_overflow() {
    let mut heap = heap(4096);

    assert!(matches!(
      heap.allocate(usize::MAX),
      Err(AllocError::OutOfSpace { requested: usize::MAX })
    ));
    assert_eq!(heap.statistics().fail_size, usize::MAX as u64);
  }

  #[test]
  fn test_double_release() {
    let mut heap = heap(4096);

    let a = heap.allocate(32).unwrap();
    let _b = heap.allocate(32).unwrap();
    heap.release(a.as_ptr()).unwrap();
    let before = heap.statistics();

    let err = heap.release(a.as_ptr()).unwrap_err();

    assert!(matches!(err, AllocError::DoubleRelease { .. }));
    assert!(err.is_contract_violation());
    assert_eq!(heap.statistics(), before);
  }

  #[test]
  fn test_release_interior_pointer() {
    let mut heap = heap(4096);

    let a = heap.allocate(64).unwrap();
    let interior = unsafe { a.as_ptr().add(16) };

    assert!(matches!(
      heap.release(interior),
      Err(AllocError::NotAllocated { .. })
    ));
    assert_eq!(heap.statistics().nactive, 1);
  }

  #[test]
  fn test_release_foreign_pointer() {
    let mut heap = heap(4096);
    let mut local = 0u8;

    assert!(matches!(
      heap.release(&mut local),
      Err(AllocError::NotInArena { .. })
    ));
  }

  #[test]
  fn test_reallocate_null_allocates() {
    let mut heap = heap(4096);

    let ptr = heap.reallocate(ptr::null_mut(), 24).unwrap();

    assert_eq!(heap.allocation_size(ptr.as_ptr()), Some(24));
  }

  #[test]
  fn test_reallocate_shrinks_in_place() {
    let mut heap = heap(8 * G);

    let a = heap.allocate(4 * G).unwrap();
    let _b = heap.allocate(G).unwrap();

    let shrunk = heap.reallocate(a.as_ptr(), G).unwrap();

    assert_eq!(shrunk, a);
    assert_eq!(extents(&heap), vec![(G, 3 * G), (5 * G, 3 * G)]);
    assert_eq!(heap.statistics().active_size, 2 * G as u64);
  }

  #[test]
  fn test_reallocate_grows_in_place() {
    let mut heap = heap(8 * G);

    let a = heap.allocate(G).unwrap();
    let b = heap.allocate(G).unwrap();
    let _c = heap.allocate(G).unwrap();
    heap.release(b.as_ptr()).unwrap();

    let grown = heap.reallocate(a.as_ptr(), 2 * G).unwrap();

    assert_eq!(grown, a);
    assert_eq!(extents(&heap), vec![(3 * G, 5 * G)]);
    assert_eq!(heap.allocation_size(a.as_ptr()), Some(2 * G));
  }

  #[test]
  fn test_reallocate_moves_and_copies() {
    let mut heap = heap(8 * G);

    let a = heap.allocate(G).unwrap();
    let _b = heap.allocate(G).unwrap();
    unsafe {
      for i in 0..G {
        *a.as_ptr().add(i) = i as u8;
      }
    }

    let moved = heap.reallocate(a.as_ptr(), 3 * G).unwrap();

    assert_eq!(moved.as_ptr(), unsafe { a.as_ptr().add(2 * G) });
    let bytes = unsafe { std::slice::from_raw_parts(moved.as_ptr(), G) };
    assert!(bytes.iter().enumerate().all(|(i, &byte)| byte == i as u8));
    assert_eq!(extents(&heap), vec![(0, G), (5 * G, 3 * G)]);

    let stats = heap.statistics();
    assert_eq!(stats.nactive, 2);
    assert_eq!(stats.active_size, 4 * G as u64);
  }

  #[test]
  fn test_reallocate_failure_keeps_original() {
    let mut heap = heap(4 * G);

    let a = heap.allocate(G).unwrap();
    let _b = heap.allocate(G).unwrap();

    assert!(heap.reallocate(a.as_ptr(), 4 * G).is_err());
    assert_eq!(heap.allocation_size(a.as_ptr()), Some(G));
    assert_eq!(heap.statistics().nfail, 1);
  }

  #[test]
  fn test_reallocate_invalid_pointer() {
    let mut heap = heap(4096);

    let a = heap.allocate(32).unwrap();
    heap.release(a.as_ptr()).unwrap();

    assert!(matches!(
      heap.reallocate(a.as_ptr(), 64),
      Err(AllocError::DoubleRelease { .. })
    ));
  }

  #[test]
  fn test_leak_report() {
    let mut heap = heap(4096);

    let a = heap.allocate(7).unwrap();
    let b = heap.allocate(9).unwrap();
    heap.release(a.as_ptr()).unwrap();

    let leaks: Vec<_> = heap.leaks().collect();
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].ptr, b);
    assert_eq!(leaks[0].size, 9);
    assert!(leaks[0].site.file().ends_with("heap.rs"));

    let mut report = Vec::new();
    heap.write_leak_report(&mut report).unwrap();
    let report = String::from_utf8(report).unwrap();

    assert!(report.starts_with("LEAK CHECK: "));
    assert!(report.contains("heap.rs:"));
    assert!(report.trim_end().ends_with(&format!("allocated object {:p} with size 9", b)));
    assert_eq!(report.lines().count(), 1);
  }

  #[test]
  fn test_contains() {
    let mut heap = heap(4096);
    let a = heap.allocate(8).unwrap();

    assert!(heap.contains(a.as_ptr()));
    assert!(!heap.contains(a.as_ptr().wrapping_add(4096)));
  }
}
