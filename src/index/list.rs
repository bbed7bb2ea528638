use crate::{
  block::{ALIGNMENT, MIN_BLOCK_SIZE, Offset},
  check::Violation,
  heap::{FIRST_BLOCK, Heap},
};

/// Doubly linked list threaded through the payloads of free blocks. The list
/// itself only stores the head; predecessor and successor links live in the
/// first two payload words of every member (see [`crate::block`]).
///
/// ```text
///   head
///    |
///    v
///  +------+  succ   +------+  succ   +------+
///  | free | ------> | free | ------> | free | ---> None
///  |      | <------ |      | <------ |      |
///  +------+  pred   +------+  pred   +------+
///    ^
///    +--- pred is None
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeList {
  head: Option<Offset>,
  len: usize,
}

impl FreeList {
  pub const fn new() -> Self {
    Self { head: None, len: 0 }
  }

  pub fn head(&self) -> Option<Offset> {
    self.head
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Makes `bp` the new head.
  pub fn push_front<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  ) {
    heap.set_pred(bp, None);
    heap.set_succ(bp, self.head);

    if let Some(head) = self.head {
      heap.set_pred(head, Some(bp));
    }

    self.head = Some(bp);
    self.len += 1;
  }

  /// Links `bp` right after `node`, or at the head when `node` is `None`.
  pub fn insert_after<S>(
    &mut self,
    heap: &mut Heap<S>,
    node: Option<Offset>,
    bp: Offset,
  ) {
    let Some(node) = node else {
      return self.push_front(heap, bp);
    };

    let succ = heap.succ(node);

    heap.set_pred(bp, Some(node));
    heap.set_succ(bp, succ);
    heap.set_succ(node, Some(bp));

    if let Some(succ) = succ {
      heap.set_pred(succ, Some(bp));
    }

    self.len += 1;
  }

  /// Unlinks `bp`, which must be a member of this list.
  pub fn remove<S>(
    &mut self,
    heap: &mut Heap<S>,
    bp: Offset,
  ) {
    match (heap.pred(bp), heap.succ(bp)) {
      // Interior.
      (Some(pred), Some(succ)) => {
        heap.set_succ(pred, Some(succ));
        heap.set_pred(succ, Some(pred));
      }
      // Tail.
      (Some(pred), None) => heap.set_succ(pred, None),
      // Head.
      (None, Some(succ)) => {
        heap.set_pred(succ, None);
        self.head = Some(succ);
      }
      // Only member.
      (None, None) => self.head = None,
    }

    self.len -= 1;
  }

  /// Members in list order.
  pub fn iter<'a, S>(
    &self,
    heap: &'a Heap<S>,
  ) -> Iter<'a, S> {
    Iter {
      heap,
      next: self.head,
      remaining: self.len,
    }
  }

  /// Walks the list without trusting it: every link must point inside the
  /// arena at an aligned offset, every successor must point back at its
  /// predecessor, and the walk must end after `len` members.
  pub fn validate<S>(
    &self,
    heap: &Heap<S>,
  ) -> Result<Vec<Offset>, Violation> {
    let mut members = Vec::with_capacity(self.len);
    let mut expected_pred = None;
    let mut cursor = self.head;

    while let Some(bp) = cursor {
      let in_arena = bp.get() % ALIGNMENT == 0
        && bp >= FIRST_BLOCK
        && bp.get() + MIN_BLOCK_SIZE <= heap.len();

      if !in_arena {
        return Err(Violation::StrayLink { bp });
      }

      let pred = heap.pred(bp);
      if pred != expected_pred {
        return Err(Violation::BrokenLink {
          bp,
          expected: expected_pred,
          found: pred,
        });
      }

      if members.len() == self.len {
        return Err(Violation::LengthMismatch {
          expected: self.len,
          found: members.len() + 1,
        });
      }

      members.push(bp);
      expected_pred = Some(bp);
      cursor = heap.succ(bp);
    }

    if members.len() != self.len {
      return Err(Violation::LengthMismatch {
        expected: self.len,
        found: members.len(),
      });
    }

    Ok(members)
  }
}

/// See [`FreeList::iter`].
pub struct Iter<'a, S> {
  heap: &'a Heap<S>,
  next: Option<Offset>,
  remaining: usize,
}

impl<S> Iterator for Iter<'_, S> {
  type Item = Offset;

  fn next(&mut self) -> Option<Offset> {
    // The length bound keeps a corrupted list from looping forever.
    if self.remaining == 0 {
      return None;
    }

    let bp = self.next?;
    self.next = self.heap.succ(bp);
    self.remaining -= 1;

    Some(bp)
  }
}
