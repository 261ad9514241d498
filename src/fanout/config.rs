//! Fan-out tuning

use serde::{Deserialize, Serialize};

/// Fan-out configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Upper bound on concurrent partition calls (default: 4).
    /// Clamped to the number of partitions at run time.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-partition cap for unsorted cross-partition finds (default: 500)
    #[serde(default = "default_per_partition_sample")]
    pub per_partition_sample: usize,
}

fn default_max_workers() -> usize {
    4
}

fn default_per_partition_sample() -> usize {
    500
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            per_partition_sample: default_per_partition_sample(),
        }
    }
}

impl FanoutConfig {
    /// Effective worker count for `partitions` partitions
    pub fn workers_for(&self, partitions: usize) -> usize {
        self.max_workers.clamp(1, partitions.max(1))
    }
}
