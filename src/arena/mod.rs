use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::panic::Location;
use std::ptr::NonNull;

use tracing::{debug, trace, warn};

use crate::align::{checked_round_up, is_aligned};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, Result};
use crate::fragment::{Frag, FragState};
use crate::header::{Header, Usage, header_len};
use crate::instrument::{Instrument, NoInstrument, Origin};
use crate::raw::Region;
use crate::size_class::SizeClasses;
use crate::{FRAG_OVERHEAD, MIN_FRAG_SIZE};

mod free_list;
mod split;

/// A fragment allocator managing one contiguous memory region.
///
/// The arena never asks the OS for memory: it carves the region it was
/// given into a header, fragments and an end sentinel, and keeps all of its
/// state inside that region.
///
/// It is not synchronized. Every mutating call takes `&mut self`; callers
/// sharing an arena across threads put it behind a lock.
pub struct Arena<'a, I = NoInstrument> {
  region: Region,
  classes: SizeClasses,
  config: ArenaConfig,
  first: Frag,
  sentinel: Frag,
  bucket_count: usize,
  instrument: I,
  _region: PhantomData<&'a mut [u8]>,
}

// The arena exclusively owns its region for 'a.
unsafe impl<I: Send> Send for Arena<'_, I> {}

impl<'a> Arena<'a> {
  /// Builds an arena inside `buf`.
  pub fn new(
    buf: &'a mut [u8],
    config: ArenaConfig,
  ) -> Result<Self> {
    Self::with_instrument(buf, config, NoInstrument)
  }

  /// Region length an arena needs to offer `capacity` bytes in its initial
  /// fragment, when the region starts on a `ROUND_TO` boundary.
  pub fn required_len(
    capacity: usize,
    config: &ArenaConfig,
  ) -> Result<usize> {
    let classes = config.size_classes()?;
    let overflow = move || ArenaError::CapacityOverflow { capacity };
    let capacity = checked_round_up(capacity.max(MIN_FRAG_SIZE)).ok_or_else(overflow)?;
    let fixed = capacity.checked_add(2 * FRAG_OVERHEAD).ok_or_else(overflow)?;

    let mut len = fixed
      .checked_add(header_len(classes.bucket_count_for(capacity)))
      .ok_or_else(overflow)?;
    loop {
      let next = fixed
        .checked_add(header_len(classes.bucket_count_for(len)))
        .ok_or_else(overflow)?;
      if next == len {
        return Ok(len);
      }
      len = next;
    }
  }
}

impl<'a, I: Instrument> Arena<'a, I> {
  /// Builds an arena inside `buf`, reporting every operation to `instrument`.
  pub fn with_instrument(
    buf: &'a mut [u8],
    config: ArenaConfig,
    instrument: I,
  ) -> Result<Self> {
    let len = buf.len();
    let base = NonNull::from(buf).cast::<u8>();
    unsafe { Self::init(base, len, config, instrument) }
  }

  /// Builds an arena over `len` bytes starting at `base`.
  ///
  /// The usable start is `base` rounded up to [`ROUND_TO`](crate::ROUND_TO);
  /// fails if the region cannot hold the header, one fragment and the
  /// sentinel.
  ///
  /// # Safety
  ///
  /// `base` must be valid for reads and writes of `len` bytes for `'a`, and
  /// nothing but the arena and the holders of pointers it hands out may
  /// access those bytes during `'a`.
  pub unsafe fn init(
    base: NonNull<u8>,
    len: usize,
    config: ArenaConfig,
    instrument: I,
  ) -> Result<Self> {
    let classes = config.size_classes()?;

    let addr = base.as_ptr() as usize;
    let padding = checked_round_up(addr).map_or(usize::MAX, |start| start - addr);
    if padding > len {
      return Err(ArenaError::Misaligned {
        base: addr,
        padding,
        len,
      });
    }
    let len = round_down!(len - padding);

    let table = classes.bucket_count_for(len);
    let fixed = header_len(table) + 2 * FRAG_OVERHEAD;
    let required = fixed + MIN_FRAG_SIZE;
    if len < required {
      return Err(ArenaError::TooSmall { len, required });
    }

    let capacity = len - fixed;
    let bucket_count = classes.bucket_count_for(capacity);
    let mut region = unsafe { Region::new(base.add(padding), len) };

    Header::format(&mut region, capacity, bucket_count);

    let first = Frag::at(header_len(table));
    first.set_size(&mut region, capacity);

    let sentinel = Frag::at(len - FRAG_OVERHEAD);
    sentinel.set_size(&mut region, 0);
    sentinel.set_state(&mut region, FragState::Allocated);

    let mut arena = Self {
      region,
      classes,
      config,
      first,
      sentinel,
      bucket_count,
      instrument,
      _region: PhantomData,
    };
    arena.insert_free(first);

    debug!(
      base = ?arena.region.base(),
      len,
      capacity,
      bucket_count,
      "arena initialized"
    );

    Ok(arena)
  }

  /// Allocates at least `size` bytes.
  ///
  /// The returned pointer is aligned to [`ROUND_TO`](crate::ROUND_TO).
  /// Returns `None` when no free fragment is large enough.
  #[track_caller]
  pub fn alloc(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let frag = self.alloc_frag(size, Location::caller())?;
    Some(self.region.ptr_at(frag.payload()))
  }

  /// Returns an allocation to the arena. `None` is ignored.
  ///
  /// Adjacent free fragments are not merged here; merging happens lazily
  /// when an allocation grows in place.
  ///
  /// # Panics
  ///
  /// Panics if `ptr` was not handed out by this arena or is already free.
  #[track_caller]
  pub fn release(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) {
    let origin = Location::caller();
    let Some(ptr) = ptr else {
      warn!(%origin, "release called with a null pointer");
      return;
    };

    if let Err(err) = self.try_release_from(ptr, origin) {
      panic!("release at {origin}: {err}");
    }
  }

  /// Like [`release`](Self::release), reporting bad pointers instead of
  /// panicking.
  ///
  /// Validation is best effort. Pointers outside the heap, misaligned ones
  /// and double frees are caught, but a pointer into the middle of a live
  /// payload passes if the bytes in front of it happen to look like an
  /// allocated fragment header.
  #[track_caller]
  pub fn try_release(
    &mut self,
    ptr: NonNull<u8>,
  ) -> Result<()> {
    self.try_release_from(ptr, Location::caller())
  }

  /// Changes the size of an allocation, keeping its contents.
  ///
  /// Shrinking and growing into a free physical neighbour keep the pointer;
  /// otherwise the data moves to a new allocation. `size == 0` releases
  /// `ptr`, if any, and always returns `None`; otherwise a `None` pointer
  /// allocates.
  ///
  /// On failure `None` is returned and `ptr` stays valid.
  ///
  /// # Panics
  ///
  /// Panics if `ptr` was not handed out by this arena or is already free.
  #[track_caller]
  pub fn resize(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let origin = Location::caller();
    if size == 0 {
      if let Some(Err(err)) = ptr.map(|ptr| self.try_release_from(ptr, origin)) {
        panic!("resize at {origin}: {err}");
      }
      return None;
    }

    let Some(ptr) = ptr else {
      let frag = self.alloc_frag(size, origin)?;
      return Some(self.region.ptr_at(frag.payload()));
    };

    let frag = match self.allocated(ptr) {
      Ok(frag) => frag,
      Err(err) => panic!("resize at {origin}: {err}"),
    };
    let size = self.request_size(size)?;
    let old = frag.size(&self.region);

    match old.cmp(&size) {
      Ordering::Greater => {
        self.split(frag, size);
        let new = frag.size(&self.region);
        self.track(|usage| {
          usage.used -= old - new;
          usage.real_used -= old - new;
        });
        trace!(offset = frag.offset(), old, new, "shrunk in place");
        self.instrument.on_resize(ptr, ptr, new, origin);
        Some(ptr)
      }
      Ordering::Equal => Some(ptr),
      Ordering::Less => self.grow(frag, size, origin),
    }
  }

  fn grow(
    &mut self,
    frag: Frag,
    size: usize,
    origin: Origin,
  ) -> Option<NonNull<u8>> {
    let old = frag.size(&self.region);
    let ptr = self.region.ptr_at(frag.payload());
    let next = frag.next_physical(&self.region);

    if next < self.sentinel && next.state(&self.region).is_free() {
      let merged = old + FRAG_OVERHEAD + next.size(&self.region);
      if merged >= size {
        let bucket = self.classes.bucket_of(next.size(&self.region));
        assert!(
          self.remove_free(bucket, next),
          "free fragment {:#x} missing from bucket {bucket}",
          next.offset()
        );

        frag.set_size(&mut self.region, merged);
        self.split(frag, size);
        let new = frag.size(&self.region);
        self.track(|usage| {
          usage.used += new - old;
          usage.real_used += new - old;
        });

        debug!(offset = frag.offset(), old, new, "grew in place");
        self.instrument.on_resize(ptr, ptr, new, origin);
        return Some(ptr);
      }
    }

    let moved = self.alloc_frag(size, origin)?;
    self.region.copy(frag.payload(), moved.payload(), old);
    self.free_frag(frag, origin);

    trace!(from = frag.offset(), to = moved.offset(), old, size, "moved");
    Some(self.region.ptr_at(moved.payload()))
  }

  fn alloc_frag(
    &mut self,
    size: usize,
    origin: Origin,
  ) -> Option<Frag> {
    let size = self.request_size(size)?;
    let Some(frag) = self.take_fit(size) else {
      debug!(size, %origin, "out of memory");
      return None;
    };

    frag.set_state(&mut self.region, FragState::Allocated);
    self.split(frag, size);

    let granted = frag.size(&self.region);
    self.track(|usage| {
      usage.used += granted;
      usage.real_used += granted + FRAG_OVERHEAD;
    });

    trace!(offset = frag.offset(), size, granted, "allocated");
    let ptr = self.region.ptr_at(frag.payload());
    self.instrument.on_alloc(ptr, granted, origin);
    Some(frag)
  }

  fn try_release_from(
    &mut self,
    ptr: NonNull<u8>,
    origin: Origin,
  ) -> Result<()> {
    let frag = self.resolve(ptr)?;
    if frag.state(&self.region).is_free() {
      return Err(ArenaError::DoubleFree(ptr.as_ptr() as usize));
    }

    self.free_frag(frag, origin);
    Ok(())
  }

  fn free_frag(
    &mut self,
    frag: Frag,
    origin: Origin,
  ) {
    let size = frag.size(&self.region);
    self.track(|usage| {
      usage.used -= size;
      usage.real_used -= size + FRAG_OVERHEAD;
    });

    self.insert_free(frag);

    trace!(offset = frag.offset(), size, "released");
    let ptr = self.region.ptr_at(frag.payload());
    self.instrument.on_release(ptr, size, origin);
  }

  pub fn instrument(&self) -> &I {
    &self.instrument
  }

  pub fn instrument_mut(&mut self) -> &mut I {
    &mut self.instrument
  }
}

impl<I> Arena<'_, I> {
  /// Size of the initial fragment: the most a single allocation can get.
  pub fn capacity(&self) -> usize {
    Header::capacity(&self.region)
  }

  pub fn bucket_count(&self) -> usize {
    self.bucket_count
  }

  pub fn size_classes(&self) -> &SizeClasses {
    &self.classes
  }

  pub fn config(&self) -> &ArenaConfig {
    &self.config
  }

  /// Aligned start of the managed region.
  pub fn base(&self) -> NonNull<u8> {
    self.region.base()
  }

  /// Whether `ptr` addresses an allocation of this arena.
  pub fn contains(
    &self,
    ptr: NonNull<u8>,
  ) -> bool {
    self.allocated(ptr).is_ok()
  }

  /// Bytes actually reserved behind `ptr`, which may exceed the request.
  pub fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<usize> {
    Ok(self.allocated(ptr)?.size(&self.region))
  }

  pub(crate) fn region(&self) -> &Region {
    &self.region
  }

  pub(crate) fn first(&self) -> Frag {
    self.first
  }

  pub(crate) fn sentinel(&self) -> Frag {
    self.sentinel
  }

  pub(crate) fn classes(&self) -> &SizeClasses {
    &self.classes
  }

  pub(crate) fn usage(&self) -> Option<Usage> {
    self
      .config
      .track_usage
      .then(|| Header::usage(&self.region))
  }

  /// Rounded request size, or `None` if no fragment could ever hold it.
  fn request_size(
    &self,
    size: usize,
  ) -> Option<usize> {
    let size = checked_round_up(size.max(MIN_FRAG_SIZE))?;
    (size <= self.capacity()).then_some(size)
  }

  fn track(
    &mut self,
    update: impl FnOnce(&mut Usage),
  ) {
    if !self.config.track_usage {
      return;
    }

    let mut usage = Header::usage(&self.region);
    update(&mut usage);
    usage.peak = usage.peak.max(usage.real_used);
    Header::set_usage(&mut self.region, usage);
  }

  /// Whether `offset` can start a fragment header.
  pub(crate) fn is_fragment_offset(
    &self,
    offset: usize,
  ) -> bool {
    offset >= self.first.offset() && offset < self.sentinel.offset() && is_aligned(offset)
  }

  /// Fragment behind a payload pointer, checked against the arena bounds.
  fn resolve(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<Frag> {
    let invalid = || ArenaError::InvalidPointer(ptr.as_ptr() as usize);

    let payload = self.region.offset_of(ptr).ok_or_else(invalid)?;
    let frag = Frag::from_payload(payload).ok_or_else(invalid)?;
    if !self.is_fragment_offset(frag.offset()) {
      return Err(invalid());
    }

    let end = frag.payload().checked_add(frag.size(&self.region));
    if !end.is_some_and(|end| end <= self.sentinel.offset()) {
      return Err(invalid());
    }

    match frag.state(&self.region) {
      FragState::Free { next: Some(next) } if !self.is_fragment_offset(next.offset()) => {
        Err(invalid())
      }
      _ => Ok(frag),
    }
  }

  fn allocated(
    &self,
    ptr: NonNull<u8>,
  ) -> Result<Frag> {
    let frag = self.resolve(ptr)?;
    match frag.state(&self.region) {
      FragState::Allocated => Ok(frag),
      FragState::Free { .. } => Err(ArenaError::UseAfterFree(ptr.as_ptr() as usize)),
    }
  }
}

impl<I> fmt::Debug for Arena<'_, I> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Arena")
      .field("base", &self.region.base())
      .field("len", &self.region.len())
      .field("capacity", &self.capacity())
      .field("bucket_count", &self.bucket_count)
      .field("config", &self.config)
      .finish()
  }
}
