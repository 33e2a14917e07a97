//! Layout of the control block at the start of every arena.
//!
//! ```text
//!   word  0  magic
//!         1  capacity        size of the initial fragment
//!         2  bucket count
//!         3  used            payload bytes handed out
//!         4  real used       used + one FRAG_OVERHEAD per allocation
//!         5  peak            highest real used seen
//!         6… bucket heads    offset of the first free fragment, 0 if empty
//! ```

use crate::WORD;
use crate::fragment::Frag;
use crate::raw::Region;

pub(crate) const MAGIC: usize = 0x4652_4147;

const MAGIC_WORD: usize = 0;
const CAPACITY_WORD: usize = 1;
const BUCKETS_WORD: usize = 2;
const USED_WORD: usize = 3;
const REAL_USED_WORD: usize = 4;
const PEAK_WORD: usize = 5;
const FIXED_WORDS: usize = 6;

/// Bytes taken by a header with `bucket_count` list heads.
pub(crate) const fn header_len(bucket_count: usize) -> usize {
  round_up!((FIXED_WORDS + bucket_count) * WORD)
}

/// Typed view of the header words.
pub(crate) struct Header;

impl Header {
  pub(crate) fn format(
    region: &mut Region,
    capacity: usize,
    bucket_count: usize,
  ) {
    region.zero(0, header_len(bucket_count));
    region.set_word(MAGIC_WORD * WORD, MAGIC);
    region.set_word(CAPACITY_WORD * WORD, capacity);
    region.set_word(BUCKETS_WORD * WORD, bucket_count);
  }

  pub(crate) fn magic(region: &Region) -> usize {
    region.word(MAGIC_WORD * WORD)
  }

  pub(crate) fn capacity(region: &Region) -> usize {
    region.word(CAPACITY_WORD * WORD)
  }

  pub(crate) fn bucket_count(region: &Region) -> usize {
    region.word(BUCKETS_WORD * WORD)
  }

  pub(crate) fn head(
    region: &Region,
    bucket: usize,
  ) -> Option<Frag> {
    match region.word((FIXED_WORDS + bucket) * WORD) {
      0 => None,
      offset => Some(Frag::at(offset)),
    }
  }

  pub(crate) fn set_head(
    region: &mut Region,
    bucket: usize,
    head: Option<Frag>,
  ) {
    region.set_word((FIXED_WORDS + bucket) * WORD, head.map_or(0, Frag::offset));
  }

  pub(crate) fn usage(region: &Region) -> Usage {
    Usage {
      used: region.word(USED_WORD * WORD),
      real_used: region.word(REAL_USED_WORD * WORD),
      peak: region.word(PEAK_WORD * WORD),
    }
  }

  pub(crate) fn set_usage(
    region: &mut Region,
    usage: Usage,
  ) {
    region.set_word(USED_WORD * WORD, usage.used);
    region.set_word(REAL_USED_WORD * WORD, usage.real_used);
    region.set_word(PEAK_WORD * WORD, usage.peak);
  }
}

/// Usage counters kept in the header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Usage {
  pub(crate) used: usize,
  pub(crate) real_used: usize,
  pub(crate) peak: usize,
}
