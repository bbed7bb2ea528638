//! The arena as seen by the allocator: a flat run of bytes obtained from an
//! [`Sbrk`] source, read and written one tag or link word at a time.
//!
//! ```text
//!   offset 0    4        8        12       16
//!   +--------+--------+--------+--------+--------+- - - - - -+--------+
//!   |  pad   | 8 | 1  | 8 | 1  | hdr    |  first block ...   | 0 | 1  |
//!   +--------+--------+--------+--------+--------+- - - - - -+--------+
//!            |<--- prologue -->|        ^ bp of the first     epilogue
//!                                         real block          header
//! ```
//!
//! The prologue and epilogue are permanently allocated, so walking backwards
//! from the first block or forwards from the last one always stops at an
//! allocated sentinel.

use std::ptr::{self, NonNull};

use crate::{
  Error,
  block::{ALIGNMENT, DOUBLE_WORD_SIZE, Offset, Tag, WORD_SIZE},
  memlib::Sbrk,
};

/// Bytes requested from the source before the first free chunk: one padding
/// word, the prologue header and footer, and the epilogue header.
const PREAMBLE_SIZE: usize = 4 * WORD_SIZE;

/// Payload offset of the prologue.
pub const PROLOGUE: Offset = Offset::new(DOUBLE_WORD_SIZE);

/// Payload offset of the first real block.
pub const FIRST_BLOCK: Offset = Offset::new(2 * DOUBLE_WORD_SIZE);

pub struct Heap<S> {
  source: S,
  base: NonNull<u8>,
  len: usize,
}

impl<S: Sbrk> Heap<S> {
  /// Lays out the padding word and both sentinels. The arena holds no real
  /// block yet; the caller is expected to [`extend`](Self::extend) it.
  pub fn new(mut source: S) -> Result<Self, Error> {
    let base = source.sbrk(PREAMBLE_SIZE)?;

    if base.as_ptr() as usize % ALIGNMENT != 0 {
      return Err(Error::InvalidConfig(format!(
        "arena base {base:?} is not aligned to {ALIGNMENT} bytes"
      )));
    }

    let mut heap = Self {
      source,
      base,
      len: PREAMBLE_SIZE,
    };

    heap.put(0, 0);
    heap.set_tags(PROLOGUE, Tag::allocated(DOUBLE_WORD_SIZE));
    heap.put(PREAMBLE_SIZE - WORD_SIZE, Tag::allocated(0).pack());

    Ok(heap)
  }

  /// Grows the arena by `size` bytes, which must be a multiple of
  /// [`ALIGNMENT`]. The old epilogue header becomes the header of a new free
  /// block spanning the whole region and a fresh epilogue is written after
  /// it. The new block is neither coalesced nor indexed.
  pub fn extend(
    &mut self,
    size: usize,
  ) -> Result<Offset, Error> {
    debug_assert_eq!(size % ALIGNMENT, 0);

    let limit = u32::MAX as usize & !(ALIGNMENT - 1);
    match self.len.checked_add(size) {
      Some(new_len) if new_len <= limit => {}
      _ => {
        return Err(Error::OutOfMemory {
          requested: size,
          heap_size: self.len,
          limit,
        });
      }
    }

    let region = self.source.sbrk(size)?;
    let expected = self.base.as_ptr() as usize + self.len;
    if region.as_ptr() as usize != expected {
      tracing::warn!(expected, found = ?region, size, "growth source is not contiguous");
      return Err(Error::Discontiguous {
        expected,
        found: region.as_ptr() as usize,
      });
    }

    let bp = Offset::new(self.len);
    self.len += size;

    self.set_tags(bp, Tag::free(size));
    self.put(self.len - WORD_SIZE, Tag::allocated(0).pack());

    tracing::trace!(bp = %bp, size, heap_size = self.len, "extended arena");

    Ok(bp)
  }
}

impl<S> Heap<S> {
  /// Reads the word at byte offset `offset`.
  ///
  /// # Panics
  ///
  /// If the word is misaligned or not entirely inside the arena.
  #[inline]
  fn get(
    &self,
    offset: usize,
  ) -> u32 {
    self.assert_word(offset);
    unsafe { self.base.as_ptr().add(offset).cast::<u32>().read() }
  }

  /// Writes the word at byte offset `offset`. Same panics as [`Self::get`].
  #[inline]
  fn put(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    self.assert_word(offset);
    unsafe { self.base.as_ptr().add(offset).cast::<u32>().write(value) }
  }

  #[inline]
  fn assert_word(
    &self,
    offset: usize,
  ) {
    assert!(
      offset % WORD_SIZE == 0 && offset + WORD_SIZE <= self.len,
      "word at offset {offset} is outside the {} byte arena",
      self.len
    );
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  /// Bytes currently owned by the arena, sentinels included.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Header tag of the block at `bp`.
  #[inline]
  pub fn header(
    &self,
    bp: Offset,
  ) -> Tag {
    Tag::unpack(self.get(bp.get() - WORD_SIZE))
  }

  /// Footer tag of the block at `bp`, located through the header size.
  #[inline]
  pub fn footer(
    &self,
    bp: Offset,
  ) -> Tag {
    Tag::unpack(self.get(Self::footer_offset(bp, self.size(bp))))
  }

  #[inline]
  fn footer_offset(
    bp: Offset,
    size: usize,
  ) -> usize {
    bp.get() + size - DOUBLE_WORD_SIZE
  }

  #[inline]
  pub fn size(
    &self,
    bp: Offset,
  ) -> usize {
    self.header(bp).size
  }

  #[inline]
  pub fn is_allocated(
    &self,
    bp: Offset,
  ) -> bool {
    self.header(bp).allocated
  }

  /// Writes `tag` to both the header and the footer of the block at `bp`.
  /// The footer position follows from `tag.size`, not from the old header.
  #[inline]
  pub fn set_tags(
    &mut self,
    bp: Offset,
    tag: Tag,
  ) {
    let word = tag.pack();
    self.put(bp.get() - WORD_SIZE, word);
    self.put(Self::footer_offset(bp, tag.size), word);
  }

  /// Block physically after `bp`.
  #[inline]
  pub fn next(
    &self,
    bp: Offset,
  ) -> Offset {
    bp.add(self.size(bp))
  }

  /// Block physically before `bp`, found through its footer.
  #[inline]
  pub fn prev(
    &self,
    bp: Offset,
  ) -> Offset {
    bp.sub(self.prev_footer(bp).size)
  }

  #[inline]
  fn prev_footer(
    &self,
    bp: Offset,
  ) -> Tag {
    Tag::unpack(self.get(bp.get() - DOUBLE_WORD_SIZE))
  }

  /// Allocation state of the block before `bp`. The prologue answers `true`.
  #[inline]
  pub fn prev_allocated(
    &self,
    bp: Offset,
  ) -> bool {
    self.prev_footer(bp).allocated
  }

  /// Allocation state of the block after `bp`. The epilogue answers `true`.
  #[inline]
  pub fn next_allocated(
    &self,
    bp: Offset,
  ) -> bool {
    self.is_allocated(self.next(bp))
  }

  /// Predecessor link of a free block.
  #[inline]
  pub fn pred(
    &self,
    bp: Offset,
  ) -> Option<Offset> {
    Offset::from_link(self.get(bp.get()))
  }

  /// Successor link of a free block.
  #[inline]
  pub fn succ(
    &self,
    bp: Offset,
  ) -> Option<Offset> {
    Offset::from_link(self.get(bp.get() + WORD_SIZE))
  }

  #[inline]
  pub fn set_pred(
    &mut self,
    bp: Offset,
    pred: Option<Offset>,
  ) {
    self.put(bp.get(), Offset::to_link(pred));
  }

  #[inline]
  pub fn set_succ(
    &mut self,
    bp: Offset,
    succ: Option<Offset>,
  ) {
    self.put(bp.get() + WORD_SIZE, Offset::to_link(succ));
  }

  /// Payload offset of the epilogue, one past the last real block.
  pub fn epilogue(&self) -> Offset {
    Offset::new(self.len)
  }

  /// Iterates over every real block in address order, sentinels excluded.
  pub fn blocks(&self) -> Blocks<'_, S> {
    Blocks {
      heap: self,
      bp: FIRST_BLOCK,
    }
  }

  /// Address of the payload at `bp`.
  pub fn ptr_of(
    &self,
    bp: Offset,
  ) -> NonNull<u8> {
    debug_assert!(bp.get() < self.len);
    unsafe { self.base.add(bp.get()) }
  }

  /// Offset of a payload address handed out by this arena, `None` if the
  /// address lies outside of it.
  pub fn offset_of(
    &self,
    ptr: *const u8,
  ) -> Option<Offset> {
    let offset = (ptr as usize).checked_sub(self.base.as_ptr() as usize)?;

    (offset >= FIRST_BLOCK.get() && offset < self.len).then_some(Offset::new(offset))
  }

  /// Copies `count` payload bytes from the block at `src` to the block at
  /// `dst`. The two ranges must not overlap.
  pub fn copy_payload(
    &mut self,
    src: Offset,
    dst: Offset,
    count: usize,
  ) {
    assert!(src.get() + count <= self.len && dst.get() + count <= self.len);
    unsafe {
      ptr::copy_nonoverlapping(
        self.base.as_ptr().add(src.get()),
        self.base.as_ptr().add(dst.get()),
        count,
      );
    }
  }

  /// Raw tag word of an arbitrary offset, for the checker.
  pub(crate) fn word(
    &self,
    offset: usize,
  ) -> u32 {
    self.get(offset)
  }

  #[cfg(test)]
  pub(crate) fn poke(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    self.put(offset, value)
  }
}

/// Address-order block walk. See [`Heap::blocks`].
pub struct Blocks<'a, S> {
  heap: &'a Heap<S>,
  bp: Offset,
}

impl<S> Iterator for Blocks<'_, S> {
  type Item = (Offset, Tag);

  fn next(&mut self) -> Option<Self::Item> {
    if self.bp.get() > self.heap.len {
      return None;
    }

    let tag = self.heap.header(self.bp);
    if tag.size == 0 {
      return None;
    }

    let bp = self.bp;
    self.bp = bp.add(tag.size);

    Some((bp, tag))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::MIN_BLOCK_SIZE, memlib::MemLib};

  fn heap() -> Heap<MemLib> {
    Heap::new(MemLib::new(1 << 16).unwrap()).unwrap()
  }

  #[test]
  fn preamble_layout() {
    let heap = heap();

    assert_eq!(heap.len(), PREAMBLE_SIZE);
    assert_eq!(heap.header(PROLOGUE), Tag::allocated(DOUBLE_WORD_SIZE));
    assert_eq!(heap.footer(PROLOGUE), Tag::allocated(DOUBLE_WORD_SIZE));
    assert_eq!(heap.next(PROLOGUE), FIRST_BLOCK);
    assert_eq!(heap.header(heap.epilogue()), Tag::allocated(0));
    assert_eq!(heap.blocks().count(), 0);
  }

  #[test]
  fn extend_replaces_epilogue() {
    let mut heap = heap();

    let bp = heap.extend(256).unwrap();
    assert_eq!(bp, FIRST_BLOCK);
    assert_eq!(heap.header(bp), Tag::free(256));
    assert_eq!(heap.footer(bp), Tag::free(256));
    assert_eq!(heap.next(bp), heap.epilogue());
    assert!(heap.next_allocated(bp));
    assert!(heap.prev_allocated(bp));
    assert_eq!(heap.prev(bp), PROLOGUE);

    let second = heap.extend(64).unwrap();
    assert_eq!(second, bp.add(256));
    assert_eq!(heap.prev(second), bp);
    assert!(!heap.prev_allocated(second));

    let blocks: Vec<_> = heap.blocks().collect();
    assert_eq!(blocks, vec![(bp, Tag::free(256)), (second, Tag::free(64))]);
  }

  #[test]
  fn extend_fails_cleanly() {
    let mut heap = Heap::new(MemLib::new(64).unwrap()).unwrap();

    assert!(matches!(heap.extend(128), Err(Error::OutOfMemory { .. })));
    assert_eq!(heap.len(), PREAMBLE_SIZE);
    assert_eq!(heap.header(heap.epilogue()), Tag::allocated(0));
  }

  /// Skips one alignment unit before every region after the first.
  struct Gapped {
    inner: MemLib,
    calls: usize,
  }

  impl Sbrk for Gapped {
    fn sbrk(
      &mut self,
      incr: usize,
    ) -> Result<NonNull<u8>, Error> {
      if self.calls > 0 {
        self.inner.sbrk(ALIGNMENT)?;
      }
      self.calls += 1;
      self.inner.sbrk(incr)
    }
  }

  #[test]
  fn extend_rejects_discontiguous_regions() {
    let mut heap = Heap::new(Gapped {
      inner: MemLib::new(1 << 16).unwrap(),
      calls: 0,
    })
    .unwrap();

    assert!(matches!(heap.extend(64), Err(Error::Discontiguous { .. })));
    assert_eq!(heap.len(), PREAMBLE_SIZE);
    assert_eq!(heap.header(heap.epilogue()), Tag::allocated(0));
    assert_eq!(heap.blocks().count(), 0);
  }

  #[test]
  fn links_and_tags() {
    let mut heap = heap();
    let bp = heap.extend(128).unwrap();

    heap.set_tags(bp, Tag::allocated(MIN_BLOCK_SIZE));
    heap.set_tags(bp.add(MIN_BLOCK_SIZE), Tag::free(128 - MIN_BLOCK_SIZE));

    let rest = heap.next(bp);
    heap.set_pred(rest, None);
    heap.set_succ(rest, Some(bp));

    assert_eq!(heap.pred(rest), None);
    assert_eq!(heap.succ(rest), Some(bp));
    assert_eq!(heap.prev(rest), bp);
    assert!(heap.prev_allocated(rest));
    assert_eq!(heap.footer(rest), Tag::free(112));
  }

  #[test]
  fn pointer_offsets() {
    let mut heap = heap();
    let bp = heap.extend(64).unwrap();

    let ptr = heap.ptr_of(bp);
    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(heap.offset_of(ptr.as_ptr()), Some(bp));
    assert_eq!(heap.offset_of(std::ptr::null()), None);
    assert_eq!(heap.offset_of(heap.ptr_of(PROLOGUE).as_ptr()), None);
  }

  #[test]
  #[should_panic]
  fn out_of_bounds_word_panics() {
    let heap = heap();
    heap.word(PREAMBLE_SIZE);
  }
}
