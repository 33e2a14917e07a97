//! Per-bucket singly linked lists of free fragments.
//!
//! The links live in the free fragments themselves; bucket heads live in the
//! arena header.

use super::Arena;
use crate::fragment::{Frag, FragState};
use crate::header::Header;
use crate::raw::Region;

impl<I> Arena<'_, I> {
  /// Links `frag` into the bucket of its current size and tags it free.
  ///
  /// Exact buckets push at the head; big buckets stay sorted by size so the
  /// first fit found there is also the smallest.
  pub(crate) fn insert_free(
    &mut self,
    frag: Frag,
  ) {
    let size = frag.size(&self.region);
    let bucket = self.classes.bucket_of(size);

    let mut prev = None;
    let mut cursor = Header::head(&self.region, bucket);
    if !self.classes.is_exact(bucket) {
      while let Some(current) = cursor {
        if size <= current.size(&self.region) {
          break;
        }
        prev = cursor;
        cursor = self.next_free(current);
      }
    }

    frag.set_state(&mut self.region, FragState::Free { next: cursor });
    self.link(bucket, prev, Some(frag));
  }

  /// Unlinks `frag` from `bucket`. Returns `false` if it was not there.
  pub(crate) fn remove_free(
    &mut self,
    bucket: usize,
    frag: Frag,
  ) -> bool {
    let mut prev = None;
    let mut cursor = Header::head(&self.region, bucket);

    while let Some(current) = cursor {
      let next = self.next_free(current);
      if current == frag {
        self.link(bucket, prev, next);
        return true;
      }
      prev = cursor;
      cursor = next;
    }

    false
  }

  /// Detaches the first fragment of at least `size` bytes, searching from
  /// the bucket of `size` upwards.
  pub(crate) fn take_fit(
    &mut self,
    size: usize,
  ) -> Option<Frag> {
    for bucket in self.classes.bucket_of(size)..self.bucket_count {
      let mut prev = None;
      let mut cursor = Header::head(&self.region, bucket);

      while let Some(current) = cursor {
        let next = self.next_free(current);
        if current.size(&self.region) >= size {
          self.link(bucket, prev, next);
          return Some(current);
        }
        prev = cursor;
        cursor = next;
      }
    }

    None
  }

  pub(crate) fn free_list(
    &self,
    bucket: usize,
  ) -> FreeList<'_> {
    FreeList {
      region: &self.region,
      cursor: Header::head(&self.region, bucket),
    }
  }

  fn next_free(
    &self,
    frag: Frag,
  ) -> Option<Frag> {
    match frag.state(&self.region) {
      FragState::Free { next } => next,
      FragState::Allocated => panic!(
        "allocated fragment {:#x} linked into a free list",
        frag.offset()
      ),
    }
  }

  /// Points `prev` (or the bucket head) at `to`.
  fn link(
    &mut self,
    bucket: usize,
    prev: Option<Frag>,
    to: Option<Frag>,
  ) {
    match prev {
      None => Header::set_head(&mut self.region, bucket, to),
      Some(prev) => prev.set_state(&mut self.region, FragState::Free { next: to }),
    }
  }
}

/// Walks one bucket. Stops early at a fragment that is not tagged free.
pub(crate) struct FreeList<'r> {
  region: &'r Region,
  cursor: Option<Frag>,
}

impl Iterator for FreeList<'_> {
  type Item = Frag;

  fn next(&mut self) -> Option<Frag> {
    let current = self.cursor?;
    self.cursor = match current.state(self.region) {
      FragState::Free { next } => next,
      FragState::Allocated => None,
    };
    Some(current)
  }
}
