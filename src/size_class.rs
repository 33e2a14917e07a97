//! Size classification for the free-list table.
//!
//! Sizes below the optimize threshold get one bucket per `ROUND_TO` step, so
//! every fragment in such a bucket is an exact fit. From the threshold up,
//! there is one bucket per power of two:
//!
//! ```text
//!   index:   0    1    2   ...  255  │  256          257          258 ...
//!   sizes:   0    8    16  ...  2040 │  2048..4096   4096..8192   8192..16384
//!            └──── exact classes ────┘  └────────── big classes ──────────
//! ```
//!
//! (shown for the default optimize factor of 11)

use crate::ROUND_TO;
use crate::error::{ArenaError, Result};

/// Maps fragment sizes to bucket indices and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClasses {
  factor: u32,
}

impl SizeClasses {
  /// Smallest optimize factor: the threshold must exceed `ROUND_TO`.
  pub const MIN_FACTOR: u32 = ROUND_TO.trailing_zeros() + 1;
  /// Largest optimize factor; keeps the exact-class table at 128Ki entries.
  pub const MAX_FACTOR: u32 = 20;

  pub fn new(factor: u32) -> Result<Self> {
    if !(Self::MIN_FACTOR..=Self::MAX_FACTOR).contains(&factor) {
      return Err(ArenaError::InvalidOptimizeFactor {
        factor,
        min: Self::MIN_FACTOR,
        max: Self::MAX_FACTOR,
      });
    }

    Ok(Self { factor })
  }

  pub fn optimize_factor(&self) -> u32 {
    self.factor
  }

  /// First size served by the power-of-two buckets.
  pub fn threshold(&self) -> usize {
    1 << self.factor
  }

  /// Number of exact-fit buckets.
  pub fn exact_classes(&self) -> usize {
    self.threshold() / ROUND_TO
  }

  pub fn is_exact(
    &self,
    index: usize,
  ) -> bool {
    index < self.exact_classes()
  }

  /// Bucket holding fragments of `size` bytes (`size` already rounded).
  pub fn bucket_of(
    &self,
    size: usize,
  ) -> usize {
    if size < self.threshold() {
      size / ROUND_TO
    } else {
      self.exact_classes() + log2(size) - self.factor as usize
    }
  }

  /// Smallest size that maps to bucket `index`.
  pub fn min_size_of(
    &self,
    index: usize,
  ) -> usize {
    if self.is_exact(index) {
      index * ROUND_TO
    } else {
      1 << (index - self.exact_classes() + self.factor as usize)
    }
  }

  /// Half-open size range `[min, max)` of bucket `index`.
  pub fn bucket_span(
    &self,
    index: usize,
  ) -> (usize, usize) {
    let min = self.min_size_of(index);
    if self.is_exact(index) {
      (min, min + ROUND_TO)
    } else {
      (min, min.saturating_mul(2))
    }
  }

  /// Table size needed so that a fragment of `capacity` bytes lands in the
  /// last bucket.
  pub fn bucket_count_for(
    &self,
    capacity: usize,
  ) -> usize {
    self.bucket_of(capacity) + 1
  }
}

/// Position of the highest set bit. `size` is never zero here.
fn log2(size: usize) -> usize {
  (usize::BITS - 1 - size.leading_zeros()) as usize
}
