use super::{FreeIndex, FreeList};
use crate::{block::Offset, check::Violation, heap::Heap};

/// Number of size classes. Class `i` holds blocks whose size has `i` as the
/// position of its highest set bit; everything from `2^(CLASS_COUNT - 1)`
/// bytes up shares the last class.
pub const CLASS_COUNT: usize = 30;

/// Size class of a block of `size` bytes, `floor(log2(size))` clamped to the
/// last class.
pub fn class_of(size: usize) -> usize {
  let mut size = size;
  let mut class = 0;

  while class < CLASS_COUNT - 1 && size > 1 {
    size >>= 1;
    class += 1;
  }

  class
}

/// Segregated fit: one free list per power-of-two size class.
///
/// ```text
///   lists[4]  (16..32)    -> [16] -> [16]
///   lists[5]  (32..64)    -> [48] -> [32] -> [32]
///   lists[6]  (64..128)   -> None
///   ...
///   lists[29] (2^29..)    -> [huge]
/// ```
///
/// Freed blocks are pushed at the head of their class (LIFO), so nothing is
/// sorted inside a class. A search starts at the class of the request and
/// moves up, returning the first block that is large enough. Only the
/// starting class can contain blocks too small for the request.
#[derive(Debug, Clone, Default)]
pub struct Segregated {
  lists: [FreeList; CLASS_COUNT],
}

impl Segregated {
  /// Free list of size class `class`, `None` past the last class.
  pub fn class(
    &self,
    class: usize,
  ) -> Option<&FreeList> {
    self.lists.get(class)
  }
}

impl FreeIndex for Segregated {
  const NAME: &'static str = "segregated";

  fn insert<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  ) {
    let class = class_of(heap.size(bp));
    self.lists[class].push_front(heap, bp);
  }

  fn remove<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  ) {
    let class = class_of(heap.size(bp));
    self.lists[class].remove(heap, bp);
  }

  fn find_fit<S>(
    &self,
    heap: &Heap<S>,
    asize: usize,
  ) -> Option<Offset> {
    self.lists[class_of(asize)..]
      .iter()
      .flat_map(|list| list.iter(heap))
      .find(|bp| heap.size(*bp) >= asize)
  }

  fn free_blocks<S>(
    &self,
    heap: &Heap<S>,
  ) -> Vec<Offset> {
    self.lists.iter().flat_map(|list| list.iter(heap)).collect()
  }

  fn check<S>(
    &self,
    heap: &Heap<S>,
  ) -> Result<(), Violation> {
    for (class, list) in self.lists.iter().enumerate() {
      for bp in list.validate(heap)? {
        let size = heap.size(bp);
        let expected = class_of(size);

        if expected != class {
          return Err(Violation::WrongClass {
            bp,
            size,
            found: class,
            expected,
          });
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::Tag, memlib::MemLib};

  #[test]
  fn class_boundaries() {
    assert_eq!(class_of(0), 0);
    assert_eq!(class_of(1), 0);
    assert_eq!(class_of(16), 4);
    assert_eq!(class_of(31), 4);
    assert_eq!(class_of(32), 5);
    assert_eq!(class_of(4096), 12);
    assert_eq!(class_of(4112), 12);
    assert_eq!(class_of(1 << 29), CLASS_COUNT - 1);
    assert_eq!(class_of(usize::MAX), CLASS_COUNT - 1);
  }

  /// Carves `sizes` out of one fresh extension, tagging every block free.
  fn carve(sizes: &[usize]) -> (Heap<MemLib>, Vec<Offset>) {
    let mut heap = Heap::new(MemLib::new(1 << 16).unwrap()).unwrap();
    let mut bp = heap.extend(sizes.iter().sum()).unwrap();

    let mut blocks = Vec::new();
    for size in sizes {
      heap.set_tags(bp, Tag::free(*size));
      blocks.push(bp);
      bp = bp.add(*size);
    }

    (heap, blocks)
  }

  #[test]
  fn insert_uses_size_class_and_lifo() {
    let (mut heap, b) = carve(&[32, 48, 128, 32]);
    let mut index = Segregated::default();

    for bp in &b {
      index.insert(&mut heap, *bp);
    }

    let class5 = index.lists[5].iter(&heap).collect::<Vec<_>>();
    assert_eq!(class5, vec![b[3], b[1], b[0]]);
    assert_eq!(index.class(7).and_then(FreeList::head), Some(b[2]));
    assert!(index.check(&heap).is_ok());

    index.remove(&mut heap, b[1]);
    let class5 = index.lists[5].iter(&heap).collect::<Vec<_>>();
    assert_eq!(class5, vec![b[3], b[0]]);
  }

  #[test]
  fn class_lookup_is_bounded() {
    let index = Segregated::default();

    assert!(index.class(0).is_some());
    assert!(index.class(CLASS_COUNT - 1).is_some());
    assert!(index.class(CLASS_COUNT).is_none());
  }

  #[test]
  fn find_fit_scans_upward() {
    let (mut heap, b) = carve(&[32, 48, 128]);
    let mut index = Segregated::default();

    for bp in &b {
      index.insert(&mut heap, *bp);
    }

    // LIFO put the 48 byte block ahead of the 32 byte one in class 5.
    assert_eq!(index.find_fit(&heap, 48), Some(b[1]));
    assert_eq!(index.find_fit(&heap, 64), Some(b[2]));
    assert_eq!(index.find_fit(&heap, 16), Some(b[1]));
    assert_eq!(index.find_fit(&heap, 256), None);
  }

  #[test]
  fn check_catches_misfiled_block() {
    let (mut heap, b) = carve(&[32, 128]);
    let mut index = Segregated::default();

    index.insert(&mut heap, b[0]);
    index.insert(&mut heap, b[1]);

    // Grow the block behind the index's back.
    heap.set_tags(b[0], Tag::free(160));

    assert_eq!(
      index.check(&heap),
      Err(Violation::WrongClass {
        bp: b[0],
        size: 160,
        found: 5,
        expected: 7,
      })
    );
  }
}
