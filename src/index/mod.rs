//! Free-space indexes: how the allocator finds a free block of at least a
//! given size.
//!
//! | Policy | Links | Insert | Search |
//! |---|---|---|---|
//! | [`Segregated`] | one list per size class | O(1), LIFO | from the request's class upward |
//! | [`Explicit`] | one list, address ordered | O(free blocks) | first fit from the lowest address |
//! | [`Implicit`] | none | no-op | walk of every block |

mod explicit;
mod implicit;
mod list;
mod segregated;

pub use explicit::Explicit;
pub use implicit::Implicit;
pub use list::FreeList;
pub use segregated::{CLASS_COUNT, Segregated, class_of};

use crate::{block::Offset, check::Violation, heap::Heap};

/// Bookkeeping for the free blocks of an arena.
///
/// The allocator owns all tag writes. An index only touches the link words
/// of the blocks it holds, and relies on the block size staying the same
/// between [`insert`](Self::insert) and [`remove`](Self::remove): callers
/// remove a block before retagging it.
pub trait FreeIndex: Default {
  /// Policy name used in logs and diagnostics.
  const NAME: &'static str;

  /// Starts tracking the free block at `bp`.
  fn insert<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  );

  /// Stops tracking the free block at `bp`.
  fn remove<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  );

  /// A free block of at least `asize` bytes, if any.
  fn find_fit<S>(
    &self,
    heap: &Heap<S>,
    asize: usize,
  ) -> Option<Offset>;

  /// Every block reachable from the index, in index order.
  fn free_blocks<S>(
    &self,
    heap: &Heap<S>,
  ) -> Vec<Offset>;

  /// Structural checks specific to the policy. Cross checks against the
  /// arena itself live in [`crate::check`].
  fn check<S>(
    &self,
    heap: &Heap<S>,
  ) -> Result<(), Violation>;
}
