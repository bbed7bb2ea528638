use crate::heap::Heap;

/// Snapshot of the arena, computed by walking every block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the growth source, sentinels included.
  pub heap_size: usize,
  pub allocated_blocks: usize,
  /// Sum of the sizes of allocated blocks, tags included.
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  /// Sum of the sizes of free blocks, tags included.
  pub free_bytes: usize,
  /// Size of the largest free block, 0 when there is none.
  pub largest_free: usize,
}

impl HeapStats {
  pub fn collect<S>(heap: &Heap<S>) -> Self {
    heap.blocks().fold(
      Self {
        heap_size: heap.len(),
        ..Self::default()
      },
      |mut stats, (_, tag)| {
        if tag.allocated {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += tag.size;
        } else {
          stats.free_blocks += 1;
          stats.free_bytes += tag.size;
          stats.largest_free = stats.largest_free.max(tag.size);
        }
        stats
      },
    )
  }

  /// Share of the arena spent on free blocks, between 0 and 1.
  pub fn free_ratio(&self) -> f64 {
    if self.heap_size == 0 {
      0.0
    } else {
      self.free_bytes as f64 / self.heap_size as f64
    }
  }
}
