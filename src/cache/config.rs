//! Render cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_RENDER_TTL_SECS: u64 = 12 * 60 * 60;
const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a rendered document stays servable.
    pub render_ttl: Duration,
    /// Maximum number of topics kept before least-recently-used eviction.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            render_ttl: Duration::from_secs(DEFAULT_RENDER_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            render_ttl: settings.render_ttl,
            capacity: settings.capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.render_ttl, Duration::from_secs(43_200));
        assert_eq!(config.capacity, 1000);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
