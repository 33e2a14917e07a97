use thiserror::Error;

/// Errors reported by arena construction and validation.
///
/// Running out of memory is not an error: `alloc` and `resize` signal it
/// by returning `None`.
#[derive(Error, Debug)]
pub enum ArenaError {
  #[error("region of {len} bytes is too small, at least {required} bytes are needed")]
  TooSmall { len: usize, required: usize },

  #[error("an arena offering {capacity} bytes would not fit in the address space")]
  CapacityOverflow { capacity: usize },

  #[error("aligning base {base:#x} needs {padding} bytes but the region only has {len}")]
  Misaligned {
    base: usize,
    padding: usize,
    len: usize,
  },

  #[error("optimize factor {factor} outside supported range {min}..={max}")]
  InvalidOptimizeFactor { factor: u32, min: u32, max: u32 },

  #[error("pointer {0:#x} does not address a fragment of this arena")]
  InvalidPointer(usize),

  #[error("fragment at {0:#x} is already free")]
  DoubleFree(usize),

  #[error("fragment at {0:#x} was already released")]
  UseAfterFree(usize),

  #[error("arena corrupted: {0}")]
  Corrupted(String),

  #[error("invalid arena configuration: {0}")]
  Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ArenaError>;
