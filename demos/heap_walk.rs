use std::ptr::{self, NonNull};

use tagalloc::{Allocator, Config, Error, Explicit, FreeIndex, Heap, MemLib};

/// Prints one line per block of the arena, in address order.
fn print_heap<S>(heap: &Heap<S>) {
  println!("    {:>10}  {:>8}  state", "offset", "size");
  for (bp, tag) in heap.blocks() {
    let state = if tag.allocated { "allocated" } else { "free" };
    println!("    {:>10}  {:>8}  {state}", bp.to_string(), tag.size);
  }
  let epilogue = heap.epilogue().to_string();
  println!("    {epilogue:>10}  {:>8}  epilogue", 0);
}

fn print_alloc<I: FreeIndex>(
  allocator: &Allocator<I>,
  size: usize,
  address: NonNull<u8>,
) {
  println!(
    "    requested {size} bytes -> {address:?} (offset {}, usable {})",
    allocator
      .heap()
      .offset_of(address.as_ptr())
      .map(|bp| bp.to_string())
      .unwrap_or_default(),
    allocator.usable_size(address.as_ptr()).unwrap_or_default(),
  );
}

fn print_stats<I: FreeIndex>(allocator: &Allocator<I>) {
  let stats = allocator.stats();
  println!(
    "    {} policy: {} byte arena, {} allocated ({} bytes), {} free ({} bytes, largest {})",
    allocator.policy(),
    stats.heap_size,
    stats.allocated_blocks,
    stats.allocated_bytes,
    stats.free_blocks,
    stats.free_bytes,
    stats.largest_free,
  );
}

fn walk<I: FreeIndex>(allocator: Allocator<I, MemLib>) -> Result<(), Error> {
  let mut allocator = allocator;

  println!("\n== {} ==", allocator.policy());
  println!("\n[0] Fresh arena");
  print_heap(allocator.heap());

  // --------------------------------------------------------------------
  // 1) A handful of small blocks carved from the initial chunk.
  // --------------------------------------------------------------------
  println!("\n[1] Allocate 8, 24 and 100 bytes");
  let mut blocks = Vec::new();
  for size in [8, 24, 100] {
    let Some(address) = allocator.allocate(size)? else {
      continue;
    };
    unsafe { ptr::write_bytes(address.as_ptr(), 0xAB, size) };
    print_alloc(&allocator, size, address);
    blocks.push(address);
  }
  print_heap(allocator.heap());

  // --------------------------------------------------------------------
  // 2) Free the middle block, then ask for something that fits into it.
  // --------------------------------------------------------------------
  println!("\n[2] Free the 24 byte block and allocate 16 bytes");
  unsafe { allocator.deallocate(blocks[1].as_ptr()) };
  if let Some(address) = allocator.allocate(16)? {
    print_alloc(&allocator, 16, address);
    println!("    reused freed block: {}", address == blocks[1]);
    blocks[1] = address;
  }
  print_heap(allocator.heap());

  // --------------------------------------------------------------------
  // 3) Grow the last block in place, absorbing the free tail.
  // --------------------------------------------------------------------
  println!("\n[3] Reallocate the 100 byte block to 1000 bytes");
  if let Some(address) = unsafe { allocator.reallocate(blocks[2].as_ptr(), 1000)? } {
    print_alloc(&allocator, 1000, address);
    println!("    moved: {}", address != blocks[2]);
    blocks[2] = address;
  }
  print_heap(allocator.heap());

  // --------------------------------------------------------------------
  // 4) A request larger than the chunk forces the arena to grow.
  // --------------------------------------------------------------------
  println!("\n[4] Allocate 10000 bytes");
  if let Some(address) = allocator.allocate(10_000)? {
    print_alloc(&allocator, 10_000, address);
    blocks.push(address);
  }
  print_heap(allocator.heap());

  // --------------------------------------------------------------------
  // 5) Release everything; neighbours merge back into one free block.
  // --------------------------------------------------------------------
  println!("\n[5] Free everything");
  for address in blocks {
    unsafe { allocator.deallocate(address.as_ptr()) };
  }
  print_heap(allocator.heap());
  print_stats(&allocator);

  allocator.check()?;
  println!("    heap is consistent");

  Ok(())
}

fn main() -> Result<(), Error> {
  let config = Config {
    check_heap: true,
    ..Config::default()
  };

  let segregated: Allocator = Allocator::new(config.clone())?;
  walk(segregated)?;

  let explicit: Allocator<Explicit> = Allocator::new(config)?;
  walk(explicit)
}
