//! Anonymous memory mappings to host an arena.
//!
//! ```text
//!   parent                          child (after fork)
//!   ┌──────────────────┐            ┌──────────────────┐
//!   │ MappedRegion ────┼────┐  ┌────┼──── MappedRegion │
//!   └──────────────────┘    │  │    └──────────────────┘
//!                           ▼  ▼
//!                 ┌──────────────────────┐
//!                 │ header │ fragments … │   MAP_SHARED pages
//!                 └──────────────────────┘
//! ```
//!
//! A shared mapping keeps the same address in forked children, so an arena
//! built in it can serve every process, provided they serialize access.

use std::{io, ptr, slice};
use std::ptr::NonNull;

use libc::{MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, MAP_SHARED, PROT_READ, PROT_WRITE, c_int};

use crate::arena::Arena;
use crate::config::ArenaConfig;
use crate::error::Result;

/// Pages obtained with `mmap(2)`, unmapped on drop.
#[derive(Debug)]
pub struct MappedRegion {
  ptr: NonNull<u8>,
  len: usize,
}

// The mapping is plain memory owned by this value.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
  /// Maps `len` bytes private to this process.
  pub fn anonymous(len: usize) -> io::Result<Self> {
    Self::map(len, MAP_PRIVATE)
  }

  /// Maps `len` bytes that stay shared with children forked afterwards.
  pub fn shared(len: usize) -> io::Result<Self> {
    Self::map(len, MAP_SHARED)
  }

  fn map(
    len: usize,
    visibility: c_int,
  ) -> io::Result<Self> {
    if len == 0 {
      return Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "cannot map an empty region",
      ));
    }

    let addr = unsafe {
      libc::mmap(
        ptr::null_mut(),
        len,
        PROT_READ | PROT_WRITE,
        visibility | MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if addr == MAP_FAILED {
      return Err(io::Error::last_os_error());
    }

    let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;
    Ok(Self { ptr, len })
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
  }

  /// Builds an arena over the whole mapping.
  pub fn arena(
    &mut self,
    config: ArenaConfig,
  ) -> Result<Arena<'_>> {
    Arena::new(self.as_mut_slice(), config)
  }
}

impl Drop for MappedRegion {
  fn drop(&mut self) {
    unsafe {
      libc::munmap(self.ptr.as_ptr().cast(), self.len);
    }
  }
}
