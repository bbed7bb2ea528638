//! # tagalloc - A Boundary-Tag Memory Allocator
//!
//! This crate implements a general purpose `malloc`/`free`/`realloc` style
//! allocator over a single contiguous arena that only grows, in the manner of
//! `sbrk(2)`. Every block carries its size and allocation state twice, in a
//! header before the payload and a footer after it, so both neighbours of a
//! block can be found in constant time and free neighbours merged as soon as
//! a block is released.
//!
//! ## Overview
//!
//! ```text
//!   Arena layout (offsets relative to the arena start):
//!
//!   0     4          8          12         16
//!   ┌─────┬──────────┬──────────┬──────────┬────────────────────┬─────┬──────────┐
//!   │ pad │ prologue │ prologue │  header  │      payload       │ ftr │ epilogue │
//!   │  0  │   8|1    │   8|1    │  size|a  │                    │     │   0|1    │
//!   └─────┴──────────┴──────────┴──────────┴────────────────────┴─────┴──────────┘
//!                                          ▲                                ▲
//!                                          │                                │
//!                                 first block payload          moves on every growth
//! ```
//!
//! Free blocks reuse the first two payload words as free-list links, stored
//! as 32-bit offsets from the arena start:
//!
//! ```text
//!   Free block:
//!   ┌──────────┬──────────┬──────────┬───────────────────┬──────────┐
//!   │  header  │   pred   │   succ   │      unused       │  footer  │
//!   │  size|0  │  offset  │  offset  │                   │  size|0  │
//!   └──────────┴──────────┴──────────┴───────────────────┴──────────┘
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Layout constants, offsets and tag encoding
//!   ├── memlib     - Sbrk growth trait and the MemLib arena reservation
//!   ├── heap       - Tag and link access over the arena
//!   ├── index      - Free-space indexes: segregated, explicit, implicit
//!   ├── allocator  - allocate / deallocate / reallocate
//!   ├── check      - Heap consistency checker
//!   ├── config     - Allocator settings
//!   ├── stats      - Heap statistics
//!   └── error      - Error type
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, Config};
//!
//! let mut allocator: Allocator = Allocator::new(Config::default()).unwrap();
//!
//! unsafe {
//!   let address = allocator.allocate(8).unwrap().unwrap().as_ptr() as *mut u64;
//!   address.write(42);
//!   assert_eq!(address.read(), 42);
//!
//!   let grown = allocator.reallocate(address as *mut u8, 64).unwrap().unwrap();
//!   assert_eq!((grown.as_ptr() as *mut u64).read(), 42);
//!
//!   allocator.deallocate(grown.as_ptr());
//! }
//!
//! assert!(allocator.check().is_ok());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives.
//! - **Never shrinks**: memory goes back to the system only when the
//!   [`MemLib`] is dropped.
//! - **32-bit tags**: the arena is capped at `u32::MAX` bytes.
//!
//! ## Safety
//!
//! Releasing or resizing memory is `unsafe`: the allocator trusts that every
//! pointer it is handed came from the same instance and is still live.

pub mod align;
pub mod allocator;
pub mod block;
pub mod check;
pub mod config;
pub mod error;
pub mod heap;
pub mod index;
pub mod memlib;
pub mod stats;

use std::ptr::NonNull;

pub use allocator::Allocator;
pub use block::{Offset, Tag};
pub use check::Violation;
pub use config::Config;
pub use error::Error;
pub use heap::Heap;
pub use index::{Explicit, FreeIndex, Implicit, Segregated};
pub use memlib::{MemLib, Sbrk};
pub use stats::HeapStats;

/// Nullable non-null pointer. `None` stands for the null result of a zero
/// sized allocation or a reallocation to zero.
pub type Pointer<T> = Option<NonNull<T>>;
