use crate::raw::Region;
use crate::{FRAG_OVERHEAD, WORD};

/// Link word value of an allocated fragment.
const ALLOCATED: usize = usize::MAX;
/// Link word value of a free fragment at the end of its bucket.
const END_OF_LIST: usize = 0;

/// A fragment, named by the offset of its header inside the arena.
///
/// ```text
///   ┌──────────────┬──────────────┬─────────────────────────────┐
///   │  size        │  link        │  payload (size bytes)       │
///   └──────────────┴──────────────┴─────────────────────────────┘
///   ▲                             ▲
///   offset                        offset + FRAG_OVERHEAD
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Frag(usize);

/// What the link word of a fragment says about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FragState {
  Free { next: Option<Frag> },
  Allocated,
}

impl FragState {
  fn encode(self) -> usize {
    match self {
      FragState::Free { next: None } => END_OF_LIST,
      FragState::Free { next: Some(next) } => next.0,
      FragState::Allocated => ALLOCATED,
    }
  }

  fn decode(word: usize) -> Self {
    match word {
      ALLOCATED => FragState::Allocated,
      END_OF_LIST => FragState::Free { next: None },
      offset => FragState::Free {
        next: Some(Frag(offset)),
      },
    }
  }

  pub(crate) fn is_free(self) -> bool {
    matches!(self, FragState::Free { .. })
  }
}

impl Frag {
  pub(crate) fn at(offset: usize) -> Self {
    Self(offset)
  }

  pub(crate) fn from_payload(payload: usize) -> Option<Self> {
    payload.checked_sub(FRAG_OVERHEAD).map(Self)
  }

  pub(crate) fn offset(self) -> usize {
    self.0
  }

  pub(crate) fn payload(self) -> usize {
    self.0 + FRAG_OVERHEAD
  }

  pub(crate) fn size(
    self,
    region: &Region,
  ) -> usize {
    region.word(self.0)
  }

  pub(crate) fn set_size(
    self,
    region: &mut Region,
    size: usize,
  ) {
    region.set_word(self.0, size);
  }

  pub(crate) fn state(
    self,
    region: &Region,
  ) -> FragState {
    FragState::decode(region.word(self.0 + WORD))
  }

  pub(crate) fn set_state(
    self,
    region: &mut Region,
    state: FragState,
  ) {
    region.set_word(self.0 + WORD, state.encode());
  }

  /// The fragment physically following this one.
  pub(crate) fn next_physical(
    self,
    region: &Region,
  ) -> Frag {
    Frag(self.payload() + self.size(region))
  }
}
