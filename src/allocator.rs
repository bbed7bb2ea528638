use crate::{
  Error, Pointer,
  block::{ALIGNMENT, MIN_BLOCK_SIZE, OVERHEAD, Offset, Tag, adjusted_size},
  check::{self, Violation},
  config::Config,
  heap::Heap,
  index::{FreeIndex, Segregated},
  memlib::{MemLib, Sbrk},
  stats::HeapStats,
};

/// Boundary-tag allocator over a single growable arena.
///
/// `I` decides how free blocks are found (see [`crate::index`]) and `S`
/// supplies arena bytes. The defaults are segregated free lists over a
/// [`MemLib`] reservation.
///
/// ```text
///   allocate(n)
///     |
///     +-- find_fit(adjusted n) --hit--> place: split or take whole block
///     |
///     +--miss--> sbrk(max(adjusted n, chunk)) -> coalesce with a free
///                predecessor -> place
///
///   deallocate(p)
///     |
///     +-- clear allocated bit -> coalesce with free neighbours -> insert
/// ```
///
/// The allocator is single threaded: every mutating operation takes
/// `&mut self`.
pub struct Allocator<I = Segregated, S = MemLib> {
  heap: Heap<S>,
  index: I,
  config: Config,
}

impl<I: FreeIndex> Allocator<I, MemLib> {
  /// Reserves `config.max_heap` bytes through [`MemLib`] and initialises the
  /// arena.
  ///
  /// # Examples
  ///
  /// ```rust
  /// use tagalloc::{Allocator, Config, Explicit};
  ///
  /// let mut allocator: Allocator = Allocator::new(Config::default()).unwrap();
  /// let address = allocator.allocate(24).unwrap().unwrap();
  /// assert_eq!(address.as_ptr() as usize % 16, 0);
  /// unsafe { allocator.deallocate(address.as_ptr()) };
  ///
  /// let explicit: Allocator<Explicit> = Allocator::new(Config::default()).unwrap();
  /// assert!(explicit.check().is_ok());
  /// ```
  pub fn new(config: Config) -> Result<Self, Error> {
    config.validate()?;
    let source = MemLib::new(config.max_heap)?;

    Self::with_source(source, config)
  }
}

impl<I: FreeIndex, S: Sbrk> Allocator<I, S> {
  /// Initialises an arena on top of `source`: padding word, prologue and
  /// epilogue, followed by one free block of `config.initial_chunk` bytes.
  pub fn with_source(
    source: S,
    config: Config,
  ) -> Result<Self, Error> {
    config.validate()?;

    let mut allocator = Self {
      heap: Heap::new(source)?,
      index: I::default(),
      config,
    };
    allocator.extend_heap(allocator.config.initial_chunk)?;

    tracing::debug!(
      policy = I::NAME,
      initial_chunk = allocator.config.initial_chunk,
      chunk_size = allocator.config.chunk_size,
      heap_size = allocator.heap.len(),
      "allocator initialised"
    );

    Ok(allocator)
  }

  /// Returns at least `size` usable bytes aligned to
  /// [`ALIGNMENT`](crate::block::ALIGNMENT). A zero sized request returns
  /// `Ok(None)` without touching the arena.
  ///
  /// The content of the returned memory is unspecified.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Pointer<u8>, Error> {
    self.check_if_enabled();

    if size == 0 {
      return Ok(None);
    }

    let bp = self.allocate_block(size)?;

    Ok(Some(self.heap.ptr_of(bp)))
  }

  /// Releases the block at `address`. Null is a no-op.
  ///
  /// # Safety
  ///
  /// `address` must have been returned by [`Self::allocate`] or
  /// [`Self::reallocate`] on this allocator and not released since. The
  /// caller must not use it afterwards.
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    self.check_if_enabled();

    if address.is_null() {
      return;
    }

    let Some(bp) = self.heap.offset_of(address) else {
      tracing::error!(address = ?address, "ignoring a pointer that is not part of the arena");
      return;
    };

    debug_assert!(self.heap.is_allocated(bp), "double free of {bp}");

    self.release(bp);
  }

  /// Resizes the block at `address` to hold at least `size` bytes.
  ///
  /// - `size == 0` releases `address` and returns `Ok(None)`.
  /// - A null `address` behaves like [`Self::allocate`].
  /// - If the current block is already large enough it is returned as is.
  /// - If the next block is free and both together are large enough, the
  ///   next block is absorbed without copying and any surplus is split off
  ///   again as a free block.
  /// - Otherwise a new block is allocated, `min(old payload, size)` bytes are
  ///   copied and the old block is released. If that allocation fails the old
  ///   block is left untouched and the error is returned.
  ///
  /// # Safety
  ///
  /// Same contract as [`Self::deallocate`] for a non-null `address`. On
  /// success the old pointer must not be used unless it was returned again.
  pub unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> Result<Pointer<u8>, Error> {
    if size == 0 {
      unsafe { self.deallocate(address) };
      return Ok(None);
    }

    if address.is_null() {
      return self.allocate(size);
    }

    self.check_if_enabled();

    let Some(bp) = self.heap.offset_of(address) else {
      return Err(Error::InvalidPointer {
        address: address as usize,
      });
    };

    let asize = self.adjusted(size)?;
    let current = self.heap.size(bp);

    if asize <= current {
      tracing::trace!(bp = %bp, size, current, "reallocated in place");
      return Ok(Some(self.heap.ptr_of(bp)));
    }

    let next = self.heap.next(bp);
    if !self.heap.is_allocated(next) {
      let merged = current + self.heap.size(next);

      if merged >= asize {
        self.index.remove(&mut self.heap, next);
        self.split(bp, merged, asize);
        tracing::trace!(bp = %bp, size, merged, "reallocated by absorbing next block");
        return Ok(Some(self.heap.ptr_of(bp)));
      }
    }

    let new_bp = self.allocate_block(size)?;
    let count = (current - OVERHEAD).min(size);
    self.heap.copy_payload(bp, new_bp, count);
    self.release(bp);

    tracing::trace!(from = %bp, to = %new_bp, size, "reallocated by moving");

    Ok(Some(self.heap.ptr_of(new_bp)))
  }

  /// Usable bytes of the allocated block at `address`, `None` if `address`
  /// is not an allocated block of this arena.
  pub fn usable_size(
    &self,
    address: *const u8,
  ) -> Option<usize> {
    let bp = self.heap.offset_of(address)?;
    let tag = self.heap.header(bp);

    tag.allocated.then(|| tag.size - OVERHEAD)
  }

  /// Runs the consistency checker over the arena and the index.
  pub fn check(&self) -> Result<(), Violation> {
    check::check(&self.heap, &self.index)
  }

  /// Runs [`Self::check`] and aborts the process on the first violation.
  pub fn check_or_abort(&self) {
    if let Err(violation) = self.check() {
      tracing::error!(%violation, policy = I::NAME, "heap consistency check failed");
      eprintln!("tagalloc: heap consistency check failed: {violation}");
      std::process::abort();
    }
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats::collect(&self.heap)
  }

  pub fn heap(&self) -> &Heap<S> {
    &self.heap
  }

  pub fn index(&self) -> &I {
    &self.index
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Name of the free-space index policy.
  pub fn policy(&self) -> &'static str {
    I::NAME
  }

  #[inline]
  fn check_if_enabled(&self) {
    if self.config.check_heap {
      self.check_or_abort();
    }
  }

  fn adjusted(
    &self,
    size: usize,
  ) -> Result<usize, Error> {
    adjusted_size(size).ok_or(Error::OutOfMemory {
      requested: size,
      heap_size: self.heap.len(),
      limit: u32::MAX as usize,
    })
  }

  /// Finds or makes room for `size` bytes and marks it allocated. On error
  /// the arena is unchanged.
  fn allocate_block(
    &mut self,
    size: usize,
  ) -> Result<Offset, Error> {
    let asize = self.adjusted(size)?;

    let bp = match self.index.find_fit(&self.heap, asize) {
      Some(bp) => bp,
      None => self.extend_heap(asize.max(self.config.chunk_size))?,
    };

    self.place(bp, asize);

    Ok(bp)
  }

  /// Grows the arena by at least `size` bytes and returns the resulting free
  /// block, already coalesced with a free predecessor and indexed.
  fn extend_heap(
    &mut self,
    size: usize,
  ) -> Result<Offset, Error> {
    let Some(size) = size.checked_next_multiple_of(ALIGNMENT) else {
      return Err(Error::OutOfMemory {
        requested: size,
        heap_size: self.heap.len(),
        limit: u32::MAX as usize,
      });
    };

    let bp = self.heap.extend(size).inspect_err(|err| {
      tracing::warn!(%err, size, "arena growth failed");
    })?;

    Ok(self.coalesce(bp))
  }

  /// Allocates `asize` bytes at the front of the free block `bp`, splitting
  /// off the rest when it can stand as a block of its own.
  fn place(
    &mut self,
    bp: Offset,
    asize: usize,
  ) {
    let size = self.heap.size(bp);
    self.index.remove(&mut self.heap, bp);
    self.split(bp, size, asize);
  }

  /// Tags the unindexed `size` byte block at `bp` as allocated, giving back
  /// everything past `asize` as a new free block when it is large enough.
  /// The block after those `size` bytes must be allocated.
  fn split(
    &mut self,
    bp: Offset,
    size: usize,
    asize: usize,
  ) {
    if size - asize >= MIN_BLOCK_SIZE {
      self.heap.set_tags(bp, Tag::allocated(asize));

      let rest = self.heap.next(bp);
      self.heap.set_tags(rest, Tag::free(size - asize));
      self.index.insert(&mut self.heap, rest);

      tracing::trace!(bp = %bp, asize, remainder = size - asize, "split block");
    } else {
      self.heap.set_tags(bp, Tag::allocated(size));
    }
  }

  /// Marks `bp` free and merges it into its neighbours.
  fn release(
    &mut self,
    bp: Offset,
  ) {
    let size = self.heap.size(bp);
    self.heap.set_tags(bp, Tag::free(size));
    self.coalesce(bp);
  }

  /// Merges the free, unindexed block `bp` with whichever neighbours are
  /// free and indexes the result. Neighbours leave the index before any tag
  /// is rewritten.
  fn coalesce(
    &mut self,
    bp: Offset,
  ) -> Offset {
    let prev_allocated = self.heap.prev_allocated(bp);
    let next_allocated = self.heap.next_allocated(bp);

    let mut start = bp;
    let mut size = self.heap.size(bp);

    if !next_allocated {
      let next = self.heap.next(bp);
      self.index.remove(&mut self.heap, next);
      size += self.heap.size(next);
    }

    if !prev_allocated {
      let prev = self.heap.prev(bp);
      self.index.remove(&mut self.heap, prev);
      size += self.heap.size(prev);
      start = prev;
    }

    if start != bp || size != self.heap.size(bp) {
      tracing::trace!(bp = %start, size, "coalesced");
    }

    self.heap.set_tags(start, Tag::free(size));
    self.index.insert(&mut self.heap, start);

    start
  }
}
