//! Boundary-tag block encoding.
//!
//! Every block in the arena is framed by two identical tag words, a header
//! right before the payload and a footer at the end of the block. A tag packs
//! the total block size together with the allocated bit:
//!
//! ```text
//!          Allocated block                       Free block
//!
//!   +-------------------------+          +-------------------------+
//!   | header: size | 1        |          | header: size | 0        |
//!   +-------------------------+ <- bp    +-------------------------+ <- bp
//!   |                         |          | predecessor link        |
//!   |        payload          |          +-------------------------+
//!   |                         |          | successor link          |
//!   |                         |          +-------------------------+
//!   |                         |          |   (stale payload bytes) |
//!   +-------------------------+          +-------------------------+
//!   | footer: size | 1        |          | footer: size | 0        |
//!   +-------------------------+          +-------------------------+
//! ```
//!
//! Blocks are addressed by the [`Offset`] of their payload (`bp`) relative to
//! the start of the arena. The links of a free block are offsets as well, so
//! nothing inside the arena ever holds a native pointer.

use std::fmt;

/// Width in bytes of a tag or link word.
pub const WORD_SIZE: usize = 4;

/// Two words: the space taken by a header/footer pair.
pub const DOUBLE_WORD_SIZE: usize = 2 * WORD_SIZE;

/// Every payload address and every block size is a multiple of this.
pub const ALIGNMENT: usize = 16;

/// Bytes an allocated block spends on its tags.
pub const OVERHEAD: usize = DOUBLE_WORD_SIZE;

/// Smallest block able to hold a header, two links and a footer once freed.
pub const MIN_BLOCK_SIZE: usize = 2 * DOUBLE_WORD_SIZE;

/// Low bit of a tag word.
const ALLOCATED_BIT: u32 = 0x1;

/// Low bits of a tag word that never belong to the size.
const FLAG_MASK: u32 = 0x7;

/// Byte offset into the arena.
///
/// Offset `0` is the alignment padding word at the very start of the arena,
/// which is never the payload of a block, so it doubles as the null link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(usize);

impl Offset {
  /// The null link.
  pub const NULL: Self = Self(0);

  pub const fn new(offset: usize) -> Self {
    Self(offset)
  }

  pub const fn get(self) -> usize {
    self.0
  }

  pub const fn is_null(self) -> bool {
    self.0 == 0
  }

  pub const fn add(
    self,
    bytes: usize,
  ) -> Self {
    Self(self.0 + bytes)
  }

  pub const fn sub(
    self,
    bytes: usize,
  ) -> Self {
    Self(self.0 - bytes)
  }

  /// Decodes a link word, mapping the null link to `None`.
  pub const fn from_link(word: u32) -> Option<Self> {
    if word == 0 {
      None
    } else {
      Some(Self(word as usize))
    }
  }

  /// Encodes an optional offset as a link word.
  pub const fn to_link(offset: Option<Self>) -> u32 {
    match offset {
      Some(offset) => offset.0 as u32,
      None => 0,
    }
  }
}

impl fmt::Display for Offset {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "0x{:08x}", self.0)
  }
}

/// Decoded header or footer word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
  pub size: usize,
  pub allocated: bool,
}

impl Tag {
  pub const fn new(
    size: usize,
    allocated: bool,
  ) -> Self {
    Self { size, allocated }
  }

  pub const fn free(size: usize) -> Self {
    Self::new(size, false)
  }

  pub const fn allocated(size: usize) -> Self {
    Self::new(size, true)
  }

  /// Packs size and allocated bit into one word. The size must fit in a
  /// `u32`, which the heap guarantees by refusing to grow past `u32::MAX`.
  pub const fn pack(self) -> u32 {
    debug_assert!(self.size & FLAG_MASK as usize == 0);
    self.size as u32 | if self.allocated { ALLOCATED_BIT } else { 0 }
  }

  pub const fn unpack(word: u32) -> Self {
    Self {
      size: (word & !FLAG_MASK) as usize,
      allocated: word & ALLOCATED_BIT != 0,
    }
  }
}

/// Block size needed to serve a request of `size` payload bytes: room for
/// the tags, rounded up to the alignment unit, never below
/// [`MIN_BLOCK_SIZE`].
pub fn adjusted_size(size: usize) -> Option<usize> {
  let with_overhead = size.checked_add(OVERHEAD + ALIGNMENT - 1)?;

  Some((with_overhead & !(ALIGNMENT - 1)).max(MIN_BLOCK_SIZE))
}
