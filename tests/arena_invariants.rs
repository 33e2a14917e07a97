use std::ptr::NonNull;

use fragalloc::{Arena, ArenaConfig, FRAG_OVERHEAD, ROUND_TO};
use proptest::prelude::*;

fn init_tracing() {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_test_writer()
    .try_init();
}

/// A buffer with room for an arena of exactly `capacity` bytes.
fn buffer(
  capacity: usize,
  config: &ArenaConfig,
) -> (Vec<u8>, usize) {
  let len = Arena::required_len(capacity, config).unwrap();
  (vec![0u8; len + ROUND_TO], len)
}

fn aligned(
  buf: &mut [u8],
  len: usize,
) -> &mut [u8] {
  let padding = buf.as_ptr().align_offset(ROUND_TO);
  &mut buf[padding..padding + len]
}

fn offset(
  arena: &Arena<'_>,
  ptr: NonNull<u8>,
) -> usize {
  ptr.as_ptr() as usize - arena.base().as_ptr() as usize
}

fn largest_free(arena: &Arena<'_>) -> usize {
  arena
    .fragments()
    .filter(|f| f.free)
    .map(|f| f.size)
    .max()
    .unwrap_or(0)
}

fn assert_conserved(arena: &Arena<'_>) {
  let total: usize = arena.fragments().map(|f| f.size + FRAG_OVERHEAD).sum();
  assert_eq!(total, arena.capacity() + FRAG_OVERHEAD);
}

#[test]
fn test_scenario_4096() {
  init_tracing();
  let config = ArenaConfig::default();
  let (mut buf, len) = buffer(4096, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  let a = arena.alloc(100);
  let b = arena.alloc(3000);
  assert!(a.is_some());
  assert!(b.is_some());

  assert_eq!(arena.alloc(3000), None);

  arena.release(a);
  arena.release(b);

  assert_eq!(arena.alloc(3000), b);
  assert_conserved(&arena);
  arena.check_integrity().unwrap();
}

#[test]
fn test_release_then_alloc_reuses_address() {
  let config = ArenaConfig::default();
  let (mut buf, len) = buffer(1 << 16, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  for n in [1, 8, 100, 2047, 2048, 5000] {
    let p = arena.alloc(n).unwrap();
    arena.release(Some(p));

    assert_eq!(arena.alloc(n), Some(p), "size {n}");
    arena.release(Some(p));
  }
}

#[test]
fn test_shrink_never_moves() {
  let config = ArenaConfig::default();
  let (mut buf, len) = buffer(4096, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  let p = arena.alloc(100).unwrap();

  assert_eq!(arena.resize(Some(p), 40), Some(p));
  assert_eq!(arena.resize(Some(p), 8), Some(p));
  assert_conserved(&arena);
}

#[test]
fn test_grow_merges_free_neighbour() {
  let config = ArenaConfig::default();
  let (mut buf, len) = buffer(4096, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  let a = arena.alloc(32).unwrap();
  let b = arena.alloc(64).unwrap();
  let _c = arena.alloc(16).unwrap();
  assert_eq!(offset(&arena, b), offset(&arena, a) + 32 + FRAG_OVERHEAD);
  arena.release(Some(b));

  let free_before = arena.report().free_fragments;
  assert_eq!(arena.resize(Some(a), 90), Some(a));

  assert_eq!(arena.report().free_fragments, free_before - 1);
  assert!(arena.usable_size(a).unwrap() >= 90);
  arena.check_integrity().unwrap();
}

#[test]
fn test_no_eager_coalescing() {
  let config = ArenaConfig::default();
  let (mut buf, len) = buffer(4096, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  let a = arena.alloc(64).unwrap();
  let b = arena.alloc(64).unwrap();
  let _c = arena.alloc(64).unwrap();
  arena.release(Some(a));
  arena.release(Some(b));

  let free: Vec<_> = arena.fragments().filter(|f| f.free).map(|f| f.size).collect();
  assert_eq!(&free[..2], &[64, 64]);
  assert_conserved(&arena);
}

#[test]
fn test_exhaustion_is_deterministic() {
  let config = ArenaConfig::default();
  let (mut buf, len) = buffer(8192, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  let mut held = Vec::new();
  for n in [700, 1500, 300, 2200] {
    held.push(arena.alloc(n).unwrap());
  }
  arena.release(Some(held[1]));

  let m = largest_free(&arena);
  assert_eq!(arena.alloc(m + 1), None);
  assert_eq!(arena.alloc(m + 1), None);

  let p = arena.alloc(m).unwrap();
  assert_eq!(arena.usable_size(p).unwrap(), m);
}

#[test]
fn test_report_matches_walk() {
  let config = ArenaConfig::default().with_optimize_factor(8);
  let (mut buf, len) = buffer(1 << 14, &config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  let blocks: Vec<_> = (1..30).map(|i| arena.alloc(i * 24).unwrap()).collect();
  for block in blocks.iter().step_by(3) {
    arena.release(Some(*block));
  }

  let stats = arena.report();
  let walked: Vec<_> = arena.fragments().filter(|f| f.free).collect();
  assert_eq!(stats.free_fragments, walked.len() as u64);
  assert_eq!(
    stats.total_free,
    walked.iter().map(|f| f.size as u64).sum::<u64>()
  );

  let allocated: usize = arena.fragments().filter(|f| !f.free).map(|f| f.size).sum();
  assert_eq!(stats.total_used, allocated as u64);
  arena.log_status();
}

#[test]
fn test_config_from_toml_drives_buckets() {
  let config = ArenaConfig::from_toml("optimize_factor = 7").unwrap();
  let (mut buf, len) = buffer(1024, &config);
  let arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  // 16 exact classes below 128, then 128, 256, 512, 1024
  assert_eq!(arena.bucket_count(), 16 + 4);
  assert_eq!(arena.report().bucket_counts(), vec![(19, 1)]);
}

#[derive(Debug, Clone)]
enum Op {
  Alloc(usize),
  Release(usize),
  Resize(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    3 => (0usize..600).prop_map(Op::Alloc),
    2 => any::<usize>().prop_map(Op::Release),
    2 => (any::<usize>(), 0usize..900).prop_map(|(i, n)| Op::Resize(i, n)),
  ]
}

struct Live {
  ptr: NonNull<u8>,
  len: usize,
  tag: u8,
}

fn fill(live: &Live) {
  unsafe { live.ptr.as_ptr().write_bytes(live.tag, live.len) };
}

fn intact(
  ptr: NonNull<u8>,
  len: usize,
  tag: u8,
) -> bool {
  (0..len).all(|i| unsafe { *ptr.as_ptr().add(i) } == tag)
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn prop_invariants_hold(ops in prop::collection::vec(op(), 1..200), factor in 4u32..12) {
    let config = ArenaConfig::default().with_optimize_factor(factor);
    let (mut buf, len) = buffer(16 * 1024, &config);
    let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();
    let mut live: Vec<Live> = Vec::new();
    let mut next_tag = 0u8;

    for op in ops {
      match op {
        Op::Alloc(n) => {
          if let Some(ptr) = arena.alloc(n) {
            prop_assert_eq!(offset(&arena, ptr) % ROUND_TO, 0);
            prop_assert!(arena.usable_size(ptr).unwrap() >= n);
            next_tag = next_tag.wrapping_add(1);
            let entry = Live { ptr, len: n, tag: next_tag };
            fill(&entry);
            live.push(entry);
          } else {
            prop_assert!(largest_free(&arena) < n.max(1));
          }
        }
        Op::Release(i) if !live.is_empty() => {
          let entry = live.swap_remove(i % live.len());
          prop_assert!(intact(entry.ptr, entry.len, entry.tag));
          arena.release(Some(entry.ptr));
        }
        Op::Resize(i, n) if !live.is_empty() => {
          let index = i % live.len();
          let (old, old_len, tag) = (live[index].ptr, live[index].len, live[index].tag);
          match arena.resize(Some(old), n) {
            Some(ptr) => {
              prop_assert!(intact(ptr, old_len.min(n), tag));
              prop_assert!(arena.usable_size(ptr).unwrap() >= n);
              live[index] = Live { ptr, len: n, tag };
              fill(&live[index]);
            }
            None if n == 0 => {
              live.swap_remove(index);
            }
            None => {
              prop_assert!(arena.contains(old));
              prop_assert!(intact(old, old_len, tag));
            }
          }
        }
        _ => {}
      }

      prop_assert!(arena.check_integrity().is_ok());
      let total: usize = arena.fragments().map(|f| f.size + FRAG_OVERHEAD).sum();
      prop_assert_eq!(total, arena.capacity() + FRAG_OVERHEAD);
    }

    for entry in &live {
      prop_assert!(intact(entry.ptr, entry.len, entry.tag));
    }
  }

  #[test]
  fn prop_round_trip_reuses_fragment(n in 1usize..8000) {
    let config = ArenaConfig::default();
    let (mut buf, len) = buffer(8192, &config);
    let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

    let p = arena.alloc(n).unwrap();
    arena.release(Some(p));
    prop_assert_eq!(arena.alloc(n), Some(p));
  }

  #[test]
  fn prop_shrink_keeps_pointer(n in 1usize..4000, shrink in 1usize..4000) {
    prop_assume!(shrink < n);
    let config = ArenaConfig::default();
    let (mut buf, len) = buffer(4096, &config);
    let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

    let p = arena.alloc(n).unwrap();
    prop_assert_eq!(arena.resize(Some(p), shrink), Some(p));
    prop_assert!(arena.check_integrity().is_ok());
  }
}
