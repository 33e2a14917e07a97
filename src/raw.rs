//! Bounds-checked access to the arena's bytes.
//!
//! Every read or write of region memory goes through [`Region`]; it is the
//! only place in the crate that dereferences raw pointers.

use std::ptr::{self, NonNull};

use crate::WORD;

/// The aligned byte range an arena lives in, addressed by offset.
#[derive(Debug)]
pub(crate) struct Region {
  base: NonNull<u8>,
  len: usize,
}

impl Region {
  /// # Safety
  ///
  /// `base` must be aligned to `ROUND_TO` and valid for reads and writes of
  /// `len` bytes for as long as the region is used.
  pub(crate) unsafe fn new(
    base: NonNull<u8>,
    len: usize,
  ) -> Self {
    debug_assert!(crate::align::is_aligned(base.as_ptr() as usize));
    Self { base, len }
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  pub(crate) fn base(&self) -> NonNull<u8> {
    self.base
  }

  #[inline]
  fn check(
    &self,
    offset: usize,
    width: usize,
  ) {
    let in_bounds = offset
      .checked_add(width)
      .is_some_and(|end| end <= self.len);
    assert!(
      in_bounds,
      "offset {offset:#x} (+{width}) outside arena of {:#x} bytes",
      self.len
    );
  }

  #[inline]
  pub(crate) fn word(
    &self,
    offset: usize,
  ) -> usize {
    self.check(offset, WORD);
    debug_assert_eq!(offset % WORD, 0);
    unsafe { self.base.as_ptr().add(offset).cast::<usize>().read() }
  }

  #[inline]
  pub(crate) fn set_word(
    &mut self,
    offset: usize,
    value: usize,
  ) {
    self.check(offset, WORD);
    debug_assert_eq!(offset % WORD, 0);
    unsafe { self.base.as_ptr().add(offset).cast::<usize>().write(value) }
  }

  /// Pointer to the byte at `offset`. `offset == len` is allowed.
  pub(crate) fn ptr_at(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    self.check(offset, 0);
    unsafe { self.base.add(offset) }
  }

  /// Offset of `ptr` if it points inside the region.
  pub(crate) fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<usize> {
    let offset = (ptr.as_ptr() as usize).checked_sub(self.base.as_ptr() as usize)?;
    (offset < self.len).then_some(offset)
  }

  pub(crate) fn copy(
    &mut self,
    src: usize,
    dst: usize,
    count: usize,
  ) {
    self.check(src, count);
    self.check(dst, count);
    unsafe {
      let base = self.base.as_ptr();
      ptr::copy(base.add(src), base.add(dst), count);
    }
  }

  pub(crate) fn zero(
    &mut self,
    offset: usize,
    count: usize,
  ) {
    self.check(offset, count);
    unsafe { ptr::write_bytes(self.base.as_ptr().add(offset), 0, count) }
  }
}
