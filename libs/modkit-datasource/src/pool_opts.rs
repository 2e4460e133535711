//! Pool sizing and lifetime knobs derived from a datasource configuration.

use std::time::Duration;

use crate::config::DatasourceConfig;

/// Pool knobs each driver's pool builder accepts.
///
/// `minPoolSize` is an idle cap in the configuration but sqlx only knows a
/// floor (`min_connections`). The floor is kept, and connections above it are
/// reaped after `idleTimeout`, which bounds idle connections the same way once
/// load drops.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    pub acquire_timeout: Duration,
    /// Idle connections above `min_conns` are closed after this long.
    pub idle_timeout: Option<Duration>,
    /// Connections are recycled after this long.
    pub max_lifetime: Option<Duration>,
}

impl PoolSettings {
    pub fn from_config(cfg: &DatasourceConfig) -> Self {
        Self {
            max_conns: (cfg.max_pool_size > 0).then_some(cfg.max_pool_size),
            min_conns: (cfg.min_pool_size > 0).then_some(cfg.min_pool_size),
            acquire_timeout: cfg.acquire_timeout(),
            idle_timeout: cfg.idle_timeout.filter(|d| !d.is_zero()),
            max_lifetime: cfg.idle_timeout.filter(|d| !d.is_zero()),
        }
    }
}

/// Trait for applying pool settings to pool builders.
pub trait ApplyPoolOpts {
    /// Apply pool settings to the pool builder.
    #[must_use]
    fn apply(self, opts: &PoolSettings) -> Self;
}

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
impl<DB: sea_orm::sqlx::Database> ApplyPoolOpts for sea_orm::sqlx::pool::PoolOptions<DB> {
    fn apply(mut self, opts: &PoolSettings) -> Self {
        if let Some(n) = opts.max_conns {
            self = self.max_connections(n);
        }
        if let Some(n) = opts.min_conns {
            self = self.min_connections(n);
        }
        if let Some(t) = opts.idle_timeout {
            self = self.idle_timeout(t);
        }
        if let Some(t) = opts.max_lifetime {
            self = self.max_lifetime(t);
        }
        self.acquire_timeout(opts.acquire_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sizes_keep_driver_defaults() {
        let s = PoolSettings::from_config(&DatasourceConfig::default());
        assert_eq!(s.max_conns, None);
        assert_eq!(s.min_conns, None);
        assert_eq!(s.max_lifetime, None);
        assert_eq!(s.idle_timeout, None);
        assert_eq!(s.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn idle_timeout_reaps_and_recycles() {
        let cfg = DatasourceConfig {
            min_pool_size: 2,
            max_pool_size: 10,
            idle_timeout: Some(Duration::from_secs(3600)),
            acquire_timeout: Some(Duration::from_secs(5)),
            ..DatasourceConfig::default()
        };
        let s = PoolSettings::from_config(&cfg);
        assert_eq!(s.max_conns, Some(10));
        assert_eq!(s.min_conns, Some(2));
        assert_eq!(s.max_lifetime, Some(Duration::from_secs(3600)));
        assert_eq!(s.idle_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(s.acquire_timeout, Duration::from_secs(5));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn settings_reach_the_pool_builder() {
        let cfg = DatasourceConfig {
            min_pool_size: 1,
            max_pool_size: 3,
            idle_timeout: Some(Duration::from_secs(60)),
            ..DatasourceConfig::default()
        };
        let opts = sea_orm::sqlx::sqlite::SqlitePoolOptions::new()
            .apply(&PoolSettings::from_config(&cfg));
        assert_eq!(opts.get_max_connections(), 3);
        assert_eq!(opts.get_min_connections(), 1);
        assert_eq!(opts.get_idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(opts.get_max_lifetime(), Some(Duration::from_secs(60)));
        assert_eq!(opts.get_acquire_timeout(), Duration::from_secs(30));
    }
}
