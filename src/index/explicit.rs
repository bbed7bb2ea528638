use super::{FreeIndex, FreeList};
use crate::{block::Offset, check::Violation, heap::Heap};

/// Explicit fit: a single free list sorted by address.
///
/// Insertion walks the list to keep it sorted, which makes freeing O(n) in
/// the number of free blocks, while allocation returns the lowest addressed
/// block that fits.
#[derive(Debug, Clone, Default)]
pub struct Explicit {
  list: FreeList,
}

impl Explicit {
  pub fn list(&self) -> &FreeList {
    &self.list
  }
}

impl FreeIndex for Explicit {
  const NAME: &'static str = "explicit";

  fn insert<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  ) {
    let pred = self.list.iter(heap).take_while(|node| *node < bp).last();
    self.list.insert_after(heap, pred, bp);
  }

  fn remove<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  ) {
    self.list.remove(heap, bp);
  }

  fn find_fit<S>(
    &self,
    heap: &Heap<S>,
    asize: usize,
  ) -> Option<Offset> {
    self.list.iter(heap).find(|bp| heap.size(*bp) >= asize)
  }

  fn free_blocks<S>(
    &self,
    heap: &Heap<S>,
  ) -> Vec<Offset> {
    self.list.iter(heap).collect()
  }

  fn check<S>(
    &self,
    heap: &Heap<S>,
  ) -> Result<(), Violation> {
    let members = self.list.validate(heap)?;

    match members.windows(2).find(|pair| pair[0] >= pair[1]) {
      Some(pair) => Err(Violation::Unordered { bp: pair[1] }),
      None => Ok(()),
    }
  }
}
