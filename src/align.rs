use std::mem;

/// Alignment of every pointer handed out by [`Heap`](crate::Heap): the
/// platform's `max_align_t`, so any type can live at a returned address.
pub const MIN_ALIGNMENT: usize = mem::align_of::<libc::max_align_t>();

/// Rounds `value` up to the next multiple of `align`, which must be a power
/// of two. Overflows if `value` is within `align` of `usize::MAX`.
///
/// # Examples
///
/// ```rust
/// use arenaio::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(16, 8), 16);
/// assert_eq!(align_to!(1, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Rounds `value` up to the heap granule, [`MIN_ALIGNMENT`].
///
/// # Examples
///
/// ```rust
/// use arenaio::{align, align::MIN_ALIGNMENT};
///
/// assert_eq!(align!(1), MIN_ALIGNMENT);
/// assert_eq!(align!(MIN_ALIGNMENT + 1), 2 * MIN_ALIGNMENT);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::align::MIN_ALIGNMENT)
  };
}

/// Like [`align!`], but returns `None` instead of overflowing.
pub fn checked_align(value: usize) -> Option<usize> {
  if value > usize::MAX - (MIN_ALIGNMENT - 1) {
    return None;
  }

  Some(align!(value))
}
