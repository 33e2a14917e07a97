/// Rounds a size or address up to the next multiple of [`ROUND_TO`](crate::ROUND_TO).
///
/// # Examples
///
/// ```rust
/// use fragalloc::round_up;
///
/// assert_eq!(round_up!(13usize), 16);
/// assert_eq!(round_up!(16usize), 16);
/// assert_eq!(round_up!(0usize), 0);
/// ```
#[macro_export]
macro_rules! round_up {
  ($value:expr) => {
    ($value + $crate::ROUND_TO - 1) & !($crate::ROUND_TO - 1)
  };
}

/// Rounds a size or address down to a multiple of [`ROUND_TO`](crate::ROUND_TO).
///
/// ```rust
/// use fragalloc::round_down;
///
/// assert_eq!(round_down!(13usize), 8);
/// ```
#[macro_export]
macro_rules! round_down {
  ($value:expr) => {
    $value & !($crate::ROUND_TO - 1)
  };
}

/// Overflow-aware `round_up!`, for sizes that come straight from callers.
#[inline]
pub(crate) fn checked_round_up(value: usize) -> Option<usize> {
  value
    .checked_add(crate::ROUND_TO - 1)
    .map(|v| round_down!(v))
}

#[inline]
pub(crate) fn is_aligned(value: usize) -> bool {
  value & (crate::ROUND_TO - 1) == 0
}
