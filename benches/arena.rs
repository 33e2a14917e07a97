use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fragalloc::{Arena, ArenaConfig, ROUND_TO};

const CAPACITY: usize = 1 << 20;

fn region(config: &ArenaConfig) -> (Vec<u8>, usize) {
  let len = Arena::required_len(CAPACITY, config).unwrap();
  (vec![0u8; len + ROUND_TO], len)
}

fn aligned(
  buf: &mut [u8],
  len: usize,
) -> &mut [u8] {
  let padding = buf.as_ptr().align_offset(ROUND_TO);
  &mut buf[padding..padding + len]
}

fn bench_alloc_release(c: &mut Criterion) {
  let mut group = c.benchmark_group("alloc_release");
  let config = ArenaConfig::default();
  let (mut buf, len) = region(&config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  for size in [16, 256, 2048, 16 * 1024] {
    group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
      b.iter(|| {
        let p = arena.alloc(black_box(size));
        arena.release(p);
      });
    });
  }
  group.finish();
}

fn bench_fragmented(c: &mut Criterion) {
  let config = ArenaConfig::default();
  let (mut buf, len) = region(&config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  // leave every other block free so the lists hold many small fragments
  let blocks: Vec<_> = (0..2000).map_while(|i| arena.alloc(8 + (i % 64) * 8)).collect();
  for block in blocks.iter().step_by(2) {
    arena.release(Some(*block));
  }

  c.bench_function("fragmented_alloc_4k", |b| {
    b.iter(|| {
      let p = arena.alloc(black_box(4096));
      arena.release(p);
    });
  });
}

fn bench_resize(c: &mut Criterion) {
  let config = ArenaConfig::default().with_usage_tracking(false);
  let (mut buf, len) = region(&config);
  let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

  c.bench_function("resize_grow_shrink", |b| {
    b.iter(|| {
      let p = arena.alloc(64);
      let p = arena.resize(p, black_box(1024));
      let p = arena.resize(p, black_box(32));
      arena.release(p);
    });
  });
}

criterion_group!(benches, bench_alloc_release, bench_fragmented, bench_resize);
criterion_main!(benches);
