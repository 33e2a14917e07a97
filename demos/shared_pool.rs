use std::ptr::NonNull;
use std::sync::Mutex;
use std::thread;

use fragalloc::{Arena, ArenaConfig, MappedRegion};
use tracing_subscriber::EnvFilter;

const POOL_SIZE: usize = 256 * 1024;
const WORKERS: usize = 4;

/// Prints where `ptr` landed relative to the start of the arena.
fn print_alloc(
  label: &str,
  arena: &Arena<'_>,
  ptr: NonNull<u8>,
) {
  println!(
    "[{label}] ptr = {ptr:?}, offset = {:#x}, usable = {} bytes",
    ptr.as_ptr() as usize - arena.base().as_ptr() as usize,
    arena.usable_size(ptr).unwrap_or(0)
  );
}

/// Raw pointers handed between threads; the arena lock guards the memory.
#[derive(Clone, Copy)]
struct Block(NonNull<u8>);

unsafe impl Send for Block {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  // A MAP_SHARED mapping survives fork(), so the same pool could serve
  // child processes. Here the workers are threads sharing it through a lock.
  let mut region = MappedRegion::shared(POOL_SIZE)?;
  let config = ArenaConfig::from_toml(
    r#"
      optimize_factor = 11
      track_usage = true
    "#,
  )?;
  let mut arena = region.arena(config)?;
  println!("[start] {arena:?}");

  // --------------------------------------------------------------------
  // 1) Small allocations come from the exact-size buckets.
  // --------------------------------------------------------------------
  let small = arena.alloc(24).ok_or("pool exhausted")?;
  print_alloc("1", &arena, small);
  unsafe { small.as_ptr().write_bytes(0xAB, 24) };

  // --------------------------------------------------------------------
  // 2) Release it and ask again: the same fragment comes back.
  // --------------------------------------------------------------------
  arena.release(Some(small));
  let again = arena.alloc(20).ok_or("pool exhausted")?;
  print_alloc("2", &arena, again);
  println!("[2] reused the freed fragment? {}", again == small);

  // --------------------------------------------------------------------
  // 3) Growing may swallow the free neighbour; shrinking keeps the pointer.
  // --------------------------------------------------------------------
  let grown = arena.resize(Some(again), 4000).ok_or("pool exhausted")?;
  print_alloc("3", &arena, grown);
  println!("[3] grew in place? {}", grown == again);

  let shrunk = arena.resize(Some(grown), 64).ok_or("pool exhausted")?;
  print_alloc("3", &arena, shrunk);
  println!("[3] shrank in place? {}", shrunk == grown);
  arena.release(Some(shrunk));

  // --------------------------------------------------------------------
  // 4) Several workers churn through the pool at once.
  // --------------------------------------------------------------------
  let pool = Mutex::new(arena);
  thread::scope(|scope| {
    for worker in 0..WORKERS {
      let pool = &pool;
      scope.spawn(move || {
        let mut held = Vec::new();
        for round in 0..64 {
          let size = 16 + (worker * 97 + round * 31) % 3000;
          let mut arena = pool.lock().unwrap_or_else(|e| e.into_inner());

          if let Some(ptr) = arena.alloc(size) {
            unsafe { ptr.as_ptr().write_bytes(worker as u8, size) };
            held.push(Block(ptr));
          }
          if round % 3 == 0 && !held.is_empty() {
            let Block(ptr) = held.swap_remove(round % held.len());
            arena.release(Some(ptr));
          }
          if round % 5 == 0 {
            if let Some(Block(ptr)) = held.pop() {
              match arena.resize(Some(ptr), size * 2) {
                Some(moved) => held.push(Block(moved)),
                None => held.push(Block(ptr)),
              }
            }
          }
        }

        let mut arena = pool.lock().unwrap_or_else(|e| e.into_inner());
        for Block(ptr) in held {
          arena.release(Some(ptr));
        }
      });
    }
  });

  // --------------------------------------------------------------------
  // 5) Everything is back in the free lists, though not merged.
  // --------------------------------------------------------------------
  let arena = pool.into_inner().unwrap_or_else(|e| e.into_inner());
  arena.check_integrity()?;
  arena.log_status();
  println!("\n{}", arena.report());

  Ok(())
}
