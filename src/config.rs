use crate::{Error, block::ALIGNMENT};

/// Default growth increment, also used for the free chunk created at startup.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Default reservation for [`MemLib`](crate::MemLib).
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// Allocator tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
  /// Bytes of free space created when the allocator is initialised.
  /// Default: [`CHUNK_SIZE`].
  pub initial_chunk: usize,

  /// Minimum number of bytes requested from the growth source when no free
  /// block fits. Larger requests grow the arena by exactly what they need.
  /// Default: [`CHUNK_SIZE`].
  pub chunk_size: usize,

  /// Size of the address range reserved up front by
  /// [`MemLib`](crate::MemLib). The arena can never grow past it.
  /// Default: [`MAX_HEAP`] (20 MiB).
  pub max_heap: usize,

  /// Run the consistency checker at the top of every mutating operation and
  /// abort on the first violation. Slow, meant for debugging.
  /// Default: false.
  pub check_heap: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      initial_chunk: CHUNK_SIZE,
      chunk_size: CHUNK_SIZE,
      max_heap: MAX_HEAP,
      check_heap: false,
    }
  }
}

impl Config {
  /// Rejects settings the arena encoding cannot honour.
  pub fn validate(&self) -> Result<(), Error> {
    if self.initial_chunk == 0 || self.chunk_size == 0 {
      return Err(Error::InvalidConfig("chunk sizes must be non-zero".into()));
    }

    if self.max_heap > u32::MAX as usize {
      return Err(Error::InvalidConfig(format!(
        "max_heap {} exceeds the {} bytes a size word can describe",
        self.max_heap,
        u32::MAX
      )));
    }

    if self.initial_chunk > self.max_heap
      || crate::align!(self.initial_chunk) + ALIGNMENT > self.max_heap
    {
      return Err(Error::InvalidConfig(format!(
        "initial_chunk {} does not fit in max_heap {}",
        self.initial_chunk, self.max_heap
      )));
    }

    Ok(())
  }
}
