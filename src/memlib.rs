//! Arena growth sources.
//!
//! The allocator never asks the OS for memory directly. It only knows how to
//! ask an [`Sbrk`] implementation for more bytes at the end of the arena, the
//! same way a C allocator moves the program break:
//!
//! ```text
//!   heap_lo                              brk                    heap_lo + max
//!      |                                  |                           |
//!      v                                  v                           v
//!      +----------------------------------+---------------------------+
//!      |  memory handed out by sbrk()     |  reserved, not yet handed |
//!      +----------------------------------+---------------------------+
//!                                         |--- sbrk(n) ---->|
//!                                         returns old brk
//! ```
//!
//! [`MemLib`] reserves the whole range once so previously returned memory is
//! never relocated.

use std::ptr::NonNull;

use crate::Error;

/// A monotonic source of arena bytes.
///
/// Implementations must return contiguous regions: the region returned by a
/// call starts exactly where the previous one ended, and no region is ever
/// moved or reclaimed while the source is alive.
pub trait Sbrk {
  /// Extends the arena by `incr` bytes and returns the start of the new
  /// region. On failure nothing is handed out.
  fn sbrk(
    &mut self,
    incr: usize,
  ) -> Result<NonNull<u8>, Error>;
}

/// Simulated heap backed by a single up-front reservation.
pub struct MemLib {
  start: NonNull<u8>,
  brk: usize,
  max: usize,
}

impl MemLib {
  /// Reserves `max_heap` bytes of address space.
  pub fn new(max_heap: usize) -> Result<Self, Error> {
    if max_heap == 0 {
      return Err(Error::InvalidConfig("max_heap must be non-zero".into()));
    }

    let start = unsafe { platform::reserve(max_heap)? };

    tracing::debug!(max_heap, start = ?start, "reserved simulated heap");

    Ok(Self {
      start,
      brk: 0,
      max: max_heap,
    })
  }

  /// First byte of the heap.
  pub fn heap_lo(&self) -> *const u8 {
    self.start.as_ptr()
  }

  /// Last byte of the heap. Equal to `heap_lo() - 1` while the heap is empty.
  pub fn heap_hi(&self) -> *const u8 {
    self.start.as_ptr().wrapping_add(self.brk).wrapping_sub(1)
  }

  /// Bytes handed out so far.
  pub fn heap_size(&self) -> usize {
    self.brk
  }

  /// Size of the reservation.
  pub fn capacity(&self) -> usize {
    self.max
  }
}

impl Sbrk for MemLib {
  fn sbrk(
    &mut self,
    incr: usize,
  ) -> Result<NonNull<u8>, Error> {
    let Some(new_brk) = self.brk.checked_add(incr).filter(|brk| *brk <= self.max) else {
      return Err(Error::OutOfMemory {
        requested: incr,
        heap_size: self.brk,
        limit: self.max,
      });
    };

    // In bounds of the reservation, checked above.
    let old_brk = unsafe { self.start.add(self.brk) };
    self.brk = new_brk;

    Ok(old_brk)
  }
}

impl Drop for MemLib {
  fn drop(&mut self) {
    unsafe { platform::release(self.start, self.max) }
  }
}

#[cfg(all(unix, not(miri)))]
mod platform {
  use std::{io, ptr::NonNull};

  use crate::Error;

  pub(super) unsafe fn reserve(length: usize) -> Result<NonNull<u8>, Error> {
    // Private anonymous read-write mapping. Pages are only backed once the
    // allocator touches them.
    let protection = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    match unsafe { libc::mmap(std::ptr::null_mut(), length, protection, flags, -1, 0) } {
      libc::MAP_FAILED => Err(Error::Reserve(io::Error::last_os_error())),
      address => NonNull::new(address.cast())
        .ok_or_else(|| Error::Reserve(io::Error::other("mmap returned null"))),
    }
  }

  pub(super) unsafe fn release(
    address: NonNull<u8>,
    length: usize,
  ) {
    if unsafe { libc::munmap(address.as_ptr().cast(), length) } != 0 {
      tracing::warn!(
        error = %io::Error::last_os_error(),
        "failed to unmap simulated heap"
      );
    }
  }
}

/// Miri has no FFI and other platforms have no `mmap`, so the reservation
/// comes from the global allocator instead.
#[cfg(not(all(unix, not(miri))))]
mod platform {
  use std::{alloc, io, ptr::NonNull};

  use crate::Error;

  const RESERVATION_ALIGN: usize = 4096;

  fn to_layout(length: usize) -> Result<alloc::Layout, Error> {
    alloc::Layout::from_size_align(length, RESERVATION_ALIGN)
      .map_err(|err| Error::Reserve(io::Error::other(err)))
  }

  pub(super) unsafe fn reserve(length: usize) -> Result<NonNull<u8>, Error> {
    let layout = to_layout(length)?;

    NonNull::new(unsafe { alloc::alloc(layout) })
      .ok_or_else(|| Error::Reserve(io::Error::from(io::ErrorKind::OutOfMemory)))
  }

  pub(super) unsafe fn release(
    address: NonNull<u8>,
    length: usize,
  ) {
    if let Ok(layout) = to_layout(length) {
      unsafe { alloc::dealloc(address.as_ptr(), layout) }
    }
  }
}
