use std::io;

use thiserror::Error;

use crate::check::Violation;

/// Errors reported by the allocator and by arena growth sources.
#[derive(Debug, Error)]
pub enum Error {
  /// The growth source cannot extend the arena by `requested` bytes. The
  /// arena is left exactly as it was before the failing call.
  #[error("out of memory: cannot grow {heap_size} bytes by {requested} (limit {limit})")]
  OutOfMemory {
    requested: usize,
    heap_size: usize,
    limit: usize,
  },

  /// Reserving the address range backing the arena failed.
  #[error("failed to reserve arena memory: {0}")]
  Reserve(#[source] io::Error),

  /// A pointer passed to `reallocate` does not belong to the arena.
  #[error("pointer {address:#x} was not allocated from this arena")]
  InvalidPointer { address: usize },

  /// The growth source handed out a region that does not start where the
  /// arena ends. Nothing of that region is used.
  #[error("growth source returned a region at {found:#x} instead of {expected:#x}")]
  Discontiguous { expected: usize, found: usize },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// The heap failed its consistency check.
  #[error("heap consistency violation: {0}")]
  Inconsistent(#[from] Violation),
}
