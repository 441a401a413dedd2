use std::fmt;

/// Snapshot of heap counters.
///
/// Sizes are the sizes callers asked for, before rounding. `ntotal`,
/// `total_size`, `nfail` and `fail_size` only ever grow. `heap_min` and
/// `heap_max` bound every address handed out so far and are both zero until
/// the first successful allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
  /// Live allocations.
  pub nactive: u64,
  /// Bytes in live allocations.
  pub active_size: u64,
  /// Successful allocations, ever.
  pub ntotal: u64,
  /// Bytes in successful allocations, ever.
  pub total_size: u64,
  /// Failed allocation requests.
  pub nfail: u64,
  /// Bytes in failed allocation requests.
  pub fail_size: u64,
  /// Lowest address ever returned.
  pub heap_min: usize,
  /// One past the highest byte ever returned.
  pub heap_max: usize,
}

impl Statistics {
  pub(crate) fn record_allocation(
    &mut self,
    addr: usize,
    size: usize,
  ) {
    self.nactive += 1;
    self.active_size = self.active_size.saturating_add(size as u64);
    self.ntotal += 1;
    self.total_size = self.total_size.saturating_add(size as u64);

    if self.heap_min == 0 || addr < self.heap_min {
      self.heap_min = addr;
    }
    let end = addr.saturating_add(size);
    if end > self.heap_max {
      self.heap_max = end;
    }
  }

  pub(crate) fn record_release(
    &mut self,
    size: usize,
  ) {
    self.nactive -= 1;
    self.active_size -= size as u64;
  }

  pub(crate) fn record_failure(
    &mut self,
    size: usize,
  ) {
    self.nfail += 1;
    self.fail_size = self.fail_size.saturating_add(size as u64);
  }
}

impl fmt::Display for Statistics {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(
      f,
      "alloc count: active {:>10}   total {:>10}   fail {:>10}",
      self.nactive, self.ntotal, self.nfail
    )?;
    write!(
      f,
      "alloc size:  active {:>10}   total {:>10}   fail {:>10}",
      self.active_size, self.total_size, self.fail_size
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_allocation_and_release() {
    let mut stats = Statistics::default();

    stats.record_allocation(0x1000, 10);
    stats.record_allocation(0x2000, 20);
    stats.record_release(10);

    assert_eq!(stats.nactive, 1);
    assert_eq!(stats.active_size, 20);
    assert_eq!(stats.ntotal, 2);
    assert_eq!(stats.total_size, 30);
    assert_eq!(stats.heap_min, 0x1000);
    assert_eq!(stats.heap_max, 0x2000 + 20);
  }

  #[test]
  fn test_failure_saturates() {
    let mut stats = Statistics::default();

    stats.record_failure(usize::MAX);
    stats.record_failure(usize::MAX);

    assert_eq!(stats.nfail, 2);
    assert_eq!(stats.fail_size, u64::MAX);
  }

  #[test]
  fn test_display() {
    let stats = Statistics {
      nactive: 1,
      active_size: 2,
      ntotal: 3,
      total_size: 4,
      nfail: 5,
      fail_size: 6,
      heap_min: 0,
      heap_max: 0,
    };

    assert_eq!(
      stats.to_string(),
      "alloc count: active          1   total          3   fail          5\n\
       alloc size:  active          2   total          4   fail          6"
    );
  }
}
