//! Optional hooks observing every allocation, release and resize.
//!
//! Each arena operation is `#[track_caller]`, so hooks receive the source
//! location of the call that reached the arena.

use std::collections::HashMap;
use std::panic::Location;
use std::ptr::NonNull;

use tracing::{debug, trace};

/// Call site that issued an arena operation.
pub type Origin = &'static Location<'static>;

/// Receives arena events. All methods default to doing nothing.
pub trait Instrument {
  fn on_alloc(
    &mut self,
    _ptr: NonNull<u8>,
    _size: usize,
    _origin: Origin,
  ) {
  }

  fn on_release(
    &mut self,
    _ptr: NonNull<u8>,
    _size: usize,
    _origin: Origin,
  ) {
  }

  /// Reported for resizes that kept their fragment. A resize that moves the
  /// data shows up as `on_alloc` for the new block and `on_release` for the
  /// old one instead.
  fn on_resize(
    &mut self,
    _old: NonNull<u8>,
    _new: NonNull<u8>,
    _size: usize,
    _origin: Origin,
  ) {
  }
}

/// Instrument of an arena nobody is watching.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInstrument;

impl Instrument for NoInstrument {}

/// Remembers where every live allocation was made.
#[derive(Debug, Default)]
pub struct Provenance {
  live: HashMap<usize, Origin>,
}

impl Provenance {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn origin_of(
    &self,
    ptr: NonNull<u8>,
  ) -> Option<Origin> {
    self.live.get(&(ptr.as_ptr() as usize)).copied()
  }

  /// Number of allocations not yet released.
  pub fn live(&self) -> usize {
    self.live.len()
  }

  /// Live allocations as `(address, origin)`, in no particular order.
  pub fn iter(&self) -> impl Iterator<Item = (usize, Origin)> + '_ {
    self.live.iter().map(|(&addr, &origin)| (addr, origin))
  }
}

impl Instrument for Provenance {
  fn on_alloc(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
    origin: Origin,
  ) {
    trace!(?ptr, size, %origin, "allocated");
    self.live.insert(ptr.as_ptr() as usize, origin);
  }

  fn on_release(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
    origin: Origin,
  ) {
    match self.live.remove(&(ptr.as_ptr() as usize)) {
      Some(allocated_at) => debug!(?ptr, size, %allocated_at, released_at = %origin, "freeing block"),
      None => debug!(?ptr, size, released_at = %origin, "freeing block of unknown origin"),
    }
  }

  fn on_resize(
    &mut self,
    old: NonNull<u8>,
    new: NonNull<u8>,
    size: usize,
    origin: Origin,
  ) {
    self.live.remove(&(old.as_ptr() as usize));
    self.live.insert(new.as_ptr() as usize, origin);
    trace!(?old, ?new, size, %origin, "resized");
  }
}
