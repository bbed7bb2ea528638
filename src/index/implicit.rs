use super::FreeIndex;
use crate::{block::Offset, check::Violation, heap::Heap};

/// Implicit fit: no index at all. Free blocks are found by walking every
/// block of the arena through the boundary tags, so each search is linear in
/// the total number of blocks, allocated ones included.
#[derive(Debug, Clone, Copy, Default)]
pub struct Implicit;

impl FreeIndex for Implicit {
  const NAME: &'static str = "implicit";

  fn insert<S>(
    &mut self,
    _heap: &mut Heap<S>,
    _bp: Offset,
  ) {
  }

  fn remove<S>(
    &mut self,
    _heap: &mut Heap<S>,
    _bp: Offset,
  ) {
  }

  fn find_fit<S>(
    &self,
    heap: &Heap<S>,
    asize: usize,
  ) -> Option<Offset> {
    heap
      .blocks()
      .find(|(_, tag)| !tag.allocated && tag.size >= asize)
      .map(|(bp, _)| bp)
  }

  fn free_blocks<S>(
    &self,
    heap: &Heap<S>,
  ) -> Vec<Offset> {
    heap
      .blocks()
      .filter(|(_, tag)| !tag.allocated)
      .map(|(bp, _)| bp)
      .collect()
  }

  fn check<S>(
    &self,
    _heap: &Heap<S>,
  ) -> Result<(), Violation> {
    Ok(())
  }
}
