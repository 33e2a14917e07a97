use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::size_class::SizeClasses;

/// Tuning knobs fixed when an arena is initialized.
///
/// Loadable from the host's configuration file:
///
/// ```toml
/// optimize_factor = 12
/// track_usage = false
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArenaConfig {
  /// Sizes below `1 << optimize_factor` get exact-fit buckets.
  pub optimize_factor: u32,

  /// Maintain used/peak counters in the arena header.
  pub track_usage: bool,
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self {
      optimize_factor: 11,
      track_usage: true,
    }
  }
}

impl ArenaConfig {
  pub fn from_toml(text: &str) -> Result<Self> {
    let config: ArenaConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn with_optimize_factor(
    mut self,
    factor: u32,
  ) -> Self {
    self.optimize_factor = factor;
    self
  }

  pub fn with_usage_tracking(
    mut self,
    enabled: bool,
  ) -> Self {
    self.track_usage = enabled;
    self
  }

  pub fn validate(&self) -> Result<()> {
    self.size_classes().map(|_| ())
  }

  pub fn size_classes(&self) -> Result<SizeClasses> {
    SizeClasses::new(self.optimize_factor)
  }
}
