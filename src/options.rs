//! Construction options for a timing wheel.

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_size() -> i64 {
    64
}

/// Tunables validated by [`TimingWheel::new`](crate::wheel::TimingWheel::new).
///
/// Derives serde so embedding applications can splice a `[wheel]` section
/// into their own configuration trees. Values are validated at construction,
/// not at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelOptions {
    /// Width of one bucket. Must be at least one millisecond; sub-millisecond
    /// precision is out of scope.
    #[serde(default = "default_tick")]
    pub tick: Duration,
    /// Buckets per wheel level. Must be positive.
    #[serde(default = "default_size")]
    pub size: i64,
}

impl Default for WheelOptions {
    fn default() -> Self {
        Self {
            tick: default_tick(),
            size: default_size(),
        }
    }
}

impl WheelOptions {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = WheelOptions::default();
        assert_eq!(options.tick, Duration::from_secs(1));
        assert_eq!(options.size, 64);
    }

    #[test]
    fn builder_overrides_fields() {
        let options = WheelOptions::default()
            .with_tick(Duration::from_millis(5))
            .with_size(20);
        assert_eq!(options.tick, Duration::from_millis(5));
        assert_eq!(options.size, 20);
    }
}
