use std::time::Duration;

/// Tunables of the collab system
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a description generation may take before it counts as failed
    pub generation_timeout: Duration,
    /// How long a cache invalidation may take before it is given up on
    pub invalidation_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            invalidation_timeout: Duration::from_secs(5),
        }
    }
}
