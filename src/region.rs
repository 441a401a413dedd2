use std::{io, ptr::{self, NonNull}};

use libc::{MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE, c_void, mmap, munmap};
use tracing::{debug, warn};

use crate::error::AllocError;

/// A fixed-size anonymous mapping, unmapped when dropped.
pub struct Region {
  base: NonNull<u8>,
  capacity: usize,
}

impl Region {
  /// Maps `capacity` fresh, zeroed bytes from the operating system.
  pub fn map(capacity: usize) -> Result<Self, AllocError> {
    if capacity == 0 {
      return Err(AllocError::InvalidCapacity { capacity });
    }

    let address = unsafe {
      mmap(
        ptr::null_mut(),
        capacity,
        PROT_READ | PROT_WRITE,
        MAP_ANON | MAP_PRIVATE,
        -1,
        0,
      )
    };

    if address == MAP_FAILED {
      return Err(AllocError::Map {
        capacity,
        source: io::Error::last_os_error(),
      });
    }

    let base = NonNull::new(address as *mut u8).ok_or_else(|| AllocError::Map {
      capacity,
      source: io::Error::other("mmap returned null"),
    })?;

    debug!(base = ?base, capacity, "mapped arena");

    Ok(Self { base, capacity })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Address of byte `offset`; `offset` must be below the capacity.
  pub fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset < self.capacity);

    unsafe { self.base.add(offset) }
  }

  /// Offset of `ptr` from the base, or `None` if it points outside.
  pub fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Option<usize> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;

    (offset < self.capacity).then_some(offset)
  }
}

impl Drop for Region {
  fn drop(&mut self) {
    let result = unsafe { munmap(self.base.as_ptr() as *mut c_void, self.capacity) };

    if result != 0 {
      warn!(base = ?self.base, error = %io::Error::last_os_error(), "munmap failed");
    } else {
      debug!(base = ?self.base, capacity = self.capacity, "unmapped arena");
    }
  }
}
