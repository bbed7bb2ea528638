//! Heap consistency checker.
//!
//! Walks the arena block by block and then every free list, verifying:
//!
//! - the prologue and epilogue sentinels are intact;
//! - every block is aligned, at least [`MIN_BLOCK_SIZE`] bytes, inside the
//!   arena and has matching header and footer tags;
//! - no two free blocks are adjacent;
//! - every free block is reachable from the index exactly once, and nothing
//!   else is.
//!
//! The walk never trusts a size or link before bounds checking it, so a
//! corrupted heap produces a [`Violation`] instead of a panic.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
  block::{ALIGNMENT, DOUBLE_WORD_SIZE, MIN_BLOCK_SIZE, Offset, Tag, WORD_SIZE},
  heap::{FIRST_BLOCK, Heap, PROLOGUE},
  index::FreeIndex,
};

/// A broken heap invariant. Every variant names the offending block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("prologue is damaged: header {header:?}, footer {footer:?}")]
  BadPrologue { header: Tag, footer: Tag },

  #[error("epilogue at {bp} is damaged: {found:?}")]
  BadEpilogue { bp: Offset, found: Tag },

  #[error("block {bp} of size {size} is not aligned to the allocation unit")]
  Misaligned { bp: Offset, size: usize },

  #[error("block {bp} of size {size} runs past the end of the arena")]
  OutOfBounds { bp: Offset, size: usize },

  #[error("block {bp} of size {size} is smaller than the minimum block")]
  Undersized { bp: Offset, size: usize },

  #[error("block {bp} has header {header:?} but footer {footer:?}")]
  TagMismatch { bp: Offset, header: Tag, footer: Tag },

  #[error("free blocks {bp} and {next} are adjacent")]
  Uncoalesced { bp: Offset, next: Offset },

  #[error("free block {bp} is not reachable from the {policy} index")]
  NotIndexed { bp: Offset, policy: &'static str },

  #[error("allocated block {bp} is reachable from the {policy} index")]
  AllocatedIndexed { bp: Offset, policy: &'static str },

  #[error("block {bp} is reachable from the index more than once")]
  IndexedTwice { bp: Offset },

  #[error("index refers to {bp}, which is not a block of the arena")]
  StrayLink { bp: Offset },

  #[error("one-way link into {bp}: expected predecessor {expected:?}, found {found:?}")]
  BrokenLink {
    bp: Offset,
    expected: Option<Offset>,
    found: Option<Offset>,
  },

  #[error("free list claims {expected} members but {found} are reachable")]
  LengthMismatch { expected: usize, found: usize },

  #[error("block {bp} of size {size} is filed in size class {found} instead of {expected}")]
  WrongClass {
    bp: Offset,
    size: usize,
    found: usize,
    expected: usize,
  },

  #[error("explicit free list is out of address order at {bp}")]
  Unordered { bp: Offset },
}

/// Checks `heap` and `index` against each other. Returns the first violation
/// found.
pub fn check<I: FreeIndex, S>(
  heap: &Heap<S>,
  index: &I,
) -> Result<(), Violation> {
  let header = Tag::unpack(heap.word(PROLOGUE.get() - WORD_SIZE));
  let footer = Tag::unpack(heap.word(PROLOGUE.get()));
  if header != Tag::allocated(DOUBLE_WORD_SIZE) || footer != header {
    return Err(Violation::BadPrologue { header, footer });
  }

  let blocks = walk(heap)?;

  index.check(heap)?;

  let mut indexed = HashSet::new();
  for bp in index.free_blocks(heap) {
    match blocks.get(&bp) {
      None => return Err(Violation::StrayLink { bp }),
      Some(true) => return Err(Violation::AllocatedIndexed { bp, policy: I::NAME }),
      Some(false) => {}
    }

    if !indexed.insert(bp) {
      return Err(Violation::IndexedTwice { bp });
    }
  }

  let mut free = blocks
    .iter()
    .filter(|(_, allocated)| !**allocated)
    .map(|(bp, _)| *bp)
    .collect::<Vec<_>>();
  free.sort();

  match free.into_iter().find(|bp| !indexed.contains(bp)) {
    Some(bp) => Err(Violation::NotIndexed { bp, policy: I::NAME }),
    None => Ok(()),
  }
}

/// Address-order walk validating every block. Returns each block's
/// allocation state.
fn walk<S>(heap: &Heap<S>) -> Result<HashMap<Offset, bool>, Violation> {
  let mut blocks = HashMap::new();
  let mut prev_free = None;
  let mut bp = FIRST_BLOCK;

  loop {
    if bp.get() > heap.len() {
      return Err(Violation::OutOfBounds { bp, size: 0 });
    }

    let header = Tag::unpack(heap.word(bp.get() - WORD_SIZE));

    if header.size == 0 {
      if bp != heap.epilogue() || !header.allocated {
        return Err(Violation::BadEpilogue { bp, found: header });
      }

      return Ok(blocks);
    }

    let size = header.size;
    if bp.get() % ALIGNMENT != 0 || size % ALIGNMENT != 0 {
      return Err(Violation::Misaligned { bp, size });
    }

    if bp.get() + size > heap.len() {
      return Err(Violation::OutOfBounds { bp, size });
    }

    if size < MIN_BLOCK_SIZE {
      return Err(Violation::Undersized { bp, size });
    }

    let footer = Tag::unpack(heap.word(bp.get() + size - DOUBLE_WORD_SIZE));
    if footer != header {
      return Err(Violation::TagMismatch { bp, header, footer });
    }

    if !header.allocated {
      if let Some(prev) = prev_free {
        return Err(Violation::Uncoalesced { bp: prev, next: bp });
      }
      prev_free = Some(bp);
    } else {
      prev_free = None;
    }

    blocks.insert(bp, header.allocated);
    bp = bp.add(size);
  }
}
