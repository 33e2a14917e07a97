use super::Arena;
use crate::fragment::Frag;
use crate::{FRAG_OVERHEAD, MIN_FRAG_SIZE};

/// Whether `rest` spare bytes can stand on their own as a fragment.
pub(crate) const fn worth_splitting(rest: usize) -> bool {
  rest > FRAG_OVERHEAD + MIN_FRAG_SIZE
}

impl<I> Arena<'_, I> {
  /// Trims `frag` to `size` bytes and frees the rest as a new fragment.
  ///
  /// `size` must be rounded and no larger than the fragment. When the rest
  /// is too small to be useful the fragment is left whole.
  pub(crate) fn split(
    &mut self,
    frag: Frag,
    size: usize,
  ) -> Option<Frag> {
    let rest = frag.size(&self.region) - size;
    if !worth_splitting(rest) {
      return None;
    }

    frag.set_size(&mut self.region, size);
    let remainder = frag.next_physical(&self.region);
    remainder.set_size(&mut self.region, rest - FRAG_OVERHEAD);
    self.insert_free(remainder);

    Some(remainder)
  }
}
