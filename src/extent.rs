/// A contiguous run of arena bytes, `offset..offset + len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
  pub offset: usize,
  pub len: usize,
}

impl Extent {
  pub fn new(
    offset: usize,
    len: usize,
  ) -> Self {
    Self { offset, len }
  }

  /// One past the last byte.
  pub fn end(&self) -> usize {
    self.offset + self.len
  }

  /// Whether `self` ends exactly where `next` starts.
  pub fn touches(
    &self,
    next: &Extent,
  ) -> bool {
    self.end() == next.offset
  }

  pub fn contains(
    &self,
    offset: usize,
  ) -> bool {
    self.offset <= offset && offset < self.end()
  }
}
