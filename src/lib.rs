//! # fragalloc - A Fragment Allocator for Pre-Acquired Memory
//!
//! This crate manages allocation and deallocation inside **one contiguous
//! memory region** handed to it by the caller: a shared-memory segment, a
//! large `mmap`'d block, or just a byte buffer. It never asks the OS or the
//! host allocator for memory on the allocation path.
//!
//! ## Overview
//!
//! ```text
//!   Arena Layout:
//!
//!   ┌────────────┬─────┬──────────┬─────┬─────────┬─────┬──────────────┬──────┐
//!   │   Header   │ hdr │ payload  │ hdr │ payload │ hdr │   payload    │ sent │
//!   │ counters + │  A  │ (in use) │  B  │ (free)  │  C  │   (free)     │ inel │
//!   │ free-list  │     │          │     │         │     │              │      │
//!   │   heads    │     │          │     │         │     │              │      │
//!   └────────────┴─────┴──────────┴─────┴─────────┴─────┴──────────────┴──────┘
//!                ▲                                                     ▲
//!                first fragment                           zero-size sentinel
//! ```
//!
//! Fragments are laid out back to back; the next fragment always starts
//! right after the current one's payload. Free fragments are additionally
//! chained into one of the **buckets** of a hashed free-list table:
//!
//! ```text
//!   Free-List Table:
//!
//!   exact classes (one size each, LIFO)      big classes (2^n..2^n+1, sorted)
//!   ┌─────┬─────┬─────┬─────┬─────┐          ┌────────────┬────────────┬──────┐
//!   │  8  │ 16  │ 24  │ ... │2040 │          │ 2048..4096 │ 4096..8192 │ ...  │
//!   └──┬──┴─────┴──┬──┴─────┴─────┘          └─────┬──────┴────────────┴──────┘
//!      ▼           ▼                               ▼
//!    [ 8 ]       [24]──▶[24]                    [2304]──▶[3000]──▶[4000]
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   fragalloc
//!   ├── align       - Rounding macros (round_up!, round_down!)
//!   ├── arena       - Arena: init, alloc, release, resize
//!   │   ├── free_list - Bucket insertion, removal and first-fit search
//!   │   └── split     - Remainder splitting
//!   ├── config      - ArenaConfig (serde / toml)
//!   ├── error       - ArenaError
//!   ├── instrument  - Instrument hooks, Provenance tracking
//!   ├── region      - MappedRegion (mmap-backed regions, unix)
//!   ├── size_class  - Size ↔ bucket mapping
//!   └── stats       - Status report, fragment walk, integrity check
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use fragalloc::{Arena, ArenaConfig};
//!
//! let mut buf = vec![0u8; 64 * 1024];
//! let mut arena = Arena::new(&mut buf, ArenaConfig::default()).unwrap();
//!
//! let p = arena.alloc(100).unwrap();
//! unsafe { p.as_ptr().write_bytes(0, 100) };
//!
//! // shrinking never moves the allocation
//! assert_eq!(arena.resize(Some(p), 40), Some(p));
//!
//! arena.release(Some(p));
//! println!("{}", arena.report());
//! ```
//!
//! ## How It Works
//!
//! - **alloc** rounds the request up to [`ROUND_TO`], scans the buckets
//!   from the request's own class upwards and takes the first fragment that
//!   fits. A remainder big enough to be useful is cut off and filed back.
//! - **release** files the fragment back into its bucket. Neighbours are
//!   *not* merged.
//! - **resize** shrinks in place, or grows in place by swallowing the next
//!   fragment when it is free and large enough. That is the only place
//!   fragments are merged. Otherwise the data moves.
//!
//! ## Limitations
//!
//! - **Single owner**: no internal locking; wrap the arena in a lock to share it
//! - **Lazy coalescing**: freed neighbours are only merged on grow
//! - **Fixed size**: an arena never grows past the region it was given
//!
//! ## Safety
//!
//! Pointers handed out by an arena are raw; reading and writing through
//! them is `unsafe`. The arena validates every pointer passed back to it and
//! panics on pointers it did not hand out and on double frees.

#[macro_use]
pub mod align;

mod arena;
mod config;
mod error;
mod fragment;
mod header;
mod instrument;
mod raw;
#[cfg(unix)]
mod region;
mod size_class;
mod stats;

pub use arena::Arena;
pub use config::ArenaConfig;
pub use error::{ArenaError, Result};
pub use instrument::{Instrument, NoInstrument, Origin, Provenance};
#[cfg(unix)]
pub use region::MappedRegion;
pub use size_class::SizeClasses;
pub use stats::{ArenaStats, BucketStats, FragmentInfo, Fragments};

/// Granularity of every fragment size and payload address.
pub const ROUND_TO: usize = 8;

pub(crate) const WORD: usize = std::mem::size_of::<usize>();

/// Bytes of header in front of every fragment's payload.
pub const FRAG_OVERHEAD: usize = round_up!(2 * WORD);

/// Smallest payload a fragment can have.
pub const MIN_FRAG_SIZE: usize = ROUND_TO;

/// `len` bytes of `buf` starting at its first `ROUND_TO` boundary.
#[cfg(test)]
pub(crate) fn aligned(
  buf: &mut [u8],
  len: usize,
) -> &mut [u8] {
  let padding = buf.as_ptr().align_offset(ROUND_TO);
  &mut buf[padding..padding + len]
}
