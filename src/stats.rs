//! Read-only diagnostics: free-list occupancy, a physical fragment walk and
//! a consistency check. Nothing here runs on the allocation path.

use std::fmt;

use tracing::info;

use crate::arena::Arena;
use crate::error::{ArenaError, Result};
use crate::fragment::{Frag, FragState};
use crate::header::{Header, MAGIC};
use crate::raw::Region;
use crate::{FRAG_OVERHEAD, align};

/// Occupancy of one free-list bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
  pub index: usize,
  /// Smallest size the bucket holds.
  pub min_size: usize,
  /// Exclusive upper bound of the sizes the bucket holds.
  pub max_size: usize,
  pub fragments: u64,
  pub bytes: u64,
  /// Size of the fragment at the head of the list.
  pub first_size: usize,
}

/// Snapshot produced by [`Arena::report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaStats {
  pub capacity: usize,
  /// Non-empty buckets only, in index order.
  pub buckets: Vec<BucketStats>,
  pub free_fragments: u64,
  pub total_free: u64,
  /// Payload bytes handed out. Zero unless usage is tracked.
  pub total_used: u64,
  /// `total_used` plus per-fragment overhead.
  pub real_used: u64,
  /// Highest `real_used` seen since init.
  pub peak_used: u64,
  pub usage_tracked: bool,
}

impl ArenaStats {
  /// `(bucket index, fragment count)` for every non-empty bucket.
  pub fn bucket_counts(&self) -> Vec<(usize, u64)> {
    self
      .buckets
      .iter()
      .map(|bucket| (bucket.index, bucket.fragments))
      .collect()
  }
}

impl fmt::Display for ArenaStats {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "heap size = {}", self.capacity)?;
    if self.usage_tracked {
      writeln!(
        f,
        "used = {}, used+overhead = {}, free = {}",
        self.total_used,
        self.real_used,
        self.capacity as u64 - self.real_used.min(self.capacity as u64)
      )?;
      writeln!(f, "max used (+overhead) = {}", self.peak_used)?;
    }
    writeln!(f, "free list:")?;
    for bucket in &self.buckets {
      writeln!(
        f,
        "  bucket {:>3}: {:>5} fragments, {:>9} bytes, sizes {:>9} - {:>9} (first {})",
        bucket.index,
        bucket.fragments,
        bucket.bytes,
        bucket.min_size,
        bucket.max_size,
        bucket.first_size
      )?;
    }
    write!(
      f,
      "total: {} free fragments = {} free bytes",
      self.free_fragments, self.total_free
    )
  }
}

/// One fragment seen by a physical walk of the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
  /// Offset of the fragment header from [`Arena::base`].
  pub offset: usize,
  pub size: usize,
  pub free: bool,
}

/// Iterator over all fragments in address order, up to the sentinel.
pub struct Fragments<'r> {
  region: &'r Region,
  cursor: Frag,
  end: Frag,
}

impl Iterator for Fragments<'_> {
  type Item = FragmentInfo;

  fn next(&mut self) -> Option<FragmentInfo> {
    if self.cursor >= self.end {
      return None;
    }

    let frag = self.cursor;
    let info = FragmentInfo {
      offset: frag.offset(),
      size: frag.size(self.region),
      free: frag.state(self.region).is_free(),
    };
    self.cursor = frag.next_physical(self.region);
    Some(info)
  }
}

impl<I> Arena<'_, I> {
  /// Summarizes the free lists and usage counters.
  pub fn report(&self) -> ArenaStats {
    let classes = self.classes();
    let mut buckets = Vec::new();

    for index in 0..self.bucket_count() {
      let mut list = self.free_list(index).peekable();
      let Some(head) = list.peek().copied() else {
        continue;
      };

      let (min_size, max_size) = classes.bucket_span(index);
      let mut stats = BucketStats {
        index,
        min_size,
        max_size,
        fragments: 0,
        bytes: 0,
        first_size: head.size(self.region()),
      };
      for frag in list {
        stats.fragments += 1;
        stats.bytes += frag.size(self.region()) as u64;
      }
      buckets.push(stats);
    }

    let usage = self.usage().unwrap_or_default();
    ArenaStats {
      capacity: self.capacity(),
      free_fragments: buckets.iter().map(|b| b.fragments).sum(),
      total_free: buckets.iter().map(|b| b.bytes).sum(),
      buckets,
      total_used: usage.used as u64,
      real_used: usage.real_used as u64,
      peak_used: usage.peak as u64,
      usage_tracked: self.config().track_usage,
    }
  }

  /// Emits [`report`](Self::report) as `tracing` events.
  pub fn log_status(&self) {
    let stats = self.report();

    info!(base = ?self.base(), capacity = stats.capacity, "arena status");
    if stats.usage_tracked {
      info!(
        used = stats.total_used,
        real_used = stats.real_used,
        peak = stats.peak_used,
        "usage"
      );
    }
    for bucket in &stats.buckets {
      info!(
        bucket = bucket.index,
        fragments = bucket.fragments,
        bytes = bucket.bytes,
        min_size = bucket.min_size,
        max_size = bucket.max_size,
        first = bucket.first_size,
        "free bucket"
      );
    }
    info!(
      fragments = stats.free_fragments,
      bytes = stats.total_free,
      "total free"
    );
  }

  /// Walks every fragment by physical adjacency.
  pub fn fragments(&self) -> Fragments<'_> {
    Fragments {
      region: self.region(),
      cursor: self.first(),
      end: self.sentinel(),
    }
  }

  /// Verifies the physical layout, the free lists and the usage counters.
  pub fn check_integrity(&self) -> Result<()> {
    let region = self.region();
    let corrupted = |msg: String| Err(ArenaError::Corrupted(msg));

    if Header::magic(region) != MAGIC {
      return corrupted(format!("bad magic {:#x}", Header::magic(region)));
    }
    if Header::bucket_count(region) != self.bucket_count() {
      return corrupted("bucket count changed".into());
    }

    let sentinel = self.sentinel();
    let mut cursor = self.first();
    let mut free = 0u64;
    let mut allocated = 0usize;
    let mut allocated_bytes = 0usize;

    while cursor < sentinel {
      let size = cursor.size(region);
      if !align::is_aligned(size) {
        return corrupted(format!("fragment {:#x} has unaligned size {size}", cursor.offset()));
      }
      let end = cursor.payload().checked_add(size);
      if !end.is_some_and(|end| end <= sentinel.offset()) {
        return corrupted(format!("fragment {:#x} overruns the sentinel", cursor.offset()));
      }

      match cursor.state(region) {
        FragState::Free { next } => {
          if next.is_some_and(|next| !self.is_fragment_offset(next.offset())) {
            return corrupted(format!("fragment {:#x} links outside the heap", cursor.offset()));
          }
          free += 1;
        }
        FragState::Allocated => {
          allocated += 1;
          allocated_bytes += size;
        }
      }

      cursor = cursor.next_physical(region);
    }

    if cursor != sentinel {
      return corrupted(format!("walk ended at {:#x}, not at the sentinel", cursor.offset()));
    }
    if sentinel.size(region) != 0 || sentinel.state(region) != FragState::Allocated {
      return corrupted("sentinel overwritten".into());
    }

    let mut listed = 0u64;
    for bucket in 0..self.bucket_count() {
      let mut previous = 0;
      let mut cursor = Header::head(region, bucket);

      while let Some(frag) = cursor {
        listed += 1;
        if listed > free {
          return corrupted(format!("bucket {bucket} holds more fragments than are free"));
        }
        if !self.is_fragment_offset(frag.offset()) {
          return corrupted(format!("bucket {bucket} links to {:#x}", frag.offset()));
        }

        let size = frag.size(region);
        if self.classes().bucket_of(size) != bucket {
          return corrupted(format!("fragment of {size} bytes filed in bucket {bucket}"));
        }
        if !self.classes().is_exact(bucket) && size < previous {
          return corrupted(format!("bucket {bucket} out of order at {:#x}", frag.offset()));
        }
        previous = size;

        cursor = match frag.state(region) {
          FragState::Free { next } => next,
          FragState::Allocated => {
            return corrupted(format!("allocated fragment {:#x} in bucket {bucket}", frag.offset()));
          }
        };
      }
    }

    if listed != free {
      return corrupted(format!("{free} free fragments but {listed} listed"));
    }

    if let Some(usage) = self.usage() {
      let real_used = allocated_bytes + allocated * FRAG_OVERHEAD;
      if usage.used != allocated_bytes || usage.real_used != real_used {
        return corrupted(format!(
          "usage counters say {}/{}, heap holds {allocated_bytes}/{real_used}",
          usage.used, usage.real_used
        ));
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ArenaConfig;
  use crate::{ROUND_TO, aligned};

  #[test]
  fn test_report_fresh_arena() {
    let config = ArenaConfig::default();
    let len = Arena::required_len(4096, &config).unwrap();
    let mut buf = vec![0u8; len + ROUND_TO];
    let arena = Arena::new(aligned(&mut buf, len), config).unwrap();

    let stats = arena.report();

    assert_eq!(stats.capacity, 4096);
    assert_eq!(stats.free_fragments, 1);
    assert_eq!(stats.total_free, 4096);
    assert_eq!(stats.bucket_counts(), vec![(257, 1)]);
    assert_eq!(stats.buckets[0].min_size, 4096);
    assert_eq!(stats.buckets[0].max_size, 8192);
    assert_eq!(stats.total_used, 0);
  }

  #[test]
  fn test_report_and_walk_after_churn() {
    let config = ArenaConfig::default();
    let len = Arena::required_len(4096, &config).unwrap();
    let mut buf = vec![0u8; len + ROUND_TO];
    let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();

    let a = arena.alloc(100).unwrap();
    let _b = arena.alloc(200).unwrap();
    arena.release(Some(a));

    let stats = arena.report();
    assert_eq!(stats.free_fragments, 2);
    assert_eq!(stats.total_used, 200);
    assert_eq!(stats.real_used, (200 + FRAG_OVERHEAD) as u64);
    assert_eq!(stats.peak_used, (104 + 200 + 2 * FRAG_OVERHEAD) as u64);

    let frags: Vec<_> = arena.fragments().collect();
    assert_eq!(frags.len(), 3);
    assert_eq!((frags[0].size, frags[0].free), (104, true));
    assert_eq!((frags[1].size, frags[1].free), (200, false));
    assert!(frags[2].free);

    let text = stats.to_string();
    assert!(text.starts_with("heap size = 4096"));
    assert!(text.ends_with("total: 2 free fragments = 3864 free bytes"));
  }

  #[test]
  fn test_check_integrity_detects_corruption() {
    let config = ArenaConfig::default();
    let len = Arena::required_len(1024, &config).unwrap();
    let mut buf = vec![0u8; len + ROUND_TO];
    let mut arena = Arena::new(aligned(&mut buf, len), config).unwrap();
    let p = arena.alloc(64).unwrap();
    assert!(arena.check_integrity().is_ok());

    // scribble over the size word of the fragment behind `p`
    unsafe { p.as_ptr().sub(FRAG_OVERHEAD).cast::<usize>().write(12) };

    assert!(matches!(
      arena.check_integrity(),
      Err(ArenaError::Corrupted(_))
    ));
  }
}
