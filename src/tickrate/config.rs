use serde::{Deserialize, Serialize};

/// Tunables for tick-rate drop detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TickRateConfig {
    /// Samples kept before the oldest is evicted
    pub history_capacity: usize,

    /// Window used for the running average stored on each sample
    pub default_window: usize,

    /// A drop fires when `avg(long_window) * drop_ratio > avg(short_window)`
    pub long_window: usize,
    pub short_window: usize,
    pub drop_ratio: f64,

    /// Quiet period after a drop during which no further drop is raised
    pub drop_cooldown_secs: u64,
}

impl Default for TickRateConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            default_window: 10,
            long_window: 20,
            short_window: 3,
            drop_ratio: 0.85,
            drop_cooldown_secs: 10,
        }
    }
}
