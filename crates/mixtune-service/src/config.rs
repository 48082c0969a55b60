//! MixTune service configuration

use anyhow::Result;
use mixtune_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// MixTune service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixtuneConfig {
    /// Service host
    pub host: String,
    /// Service port
    pub port: u16,
    /// Store configuration
    pub storage: StorageSettings,
    /// Proposal engine configuration
    pub engine: EngineConfig,
    /// Allowed `|sum(weights) - 1|` on submitted vectors
    pub weight_sum_tolerance: f64,
}

impl Default for MixtuneConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            storage: StorageSettings::default(),
            engine: EngineConfig::default(),
            weight_sum_tolerance: mixtune_common::DEFAULT_WEIGHT_SUM_TOLERANCE,
        }
    }
}

impl MixtuneConfig {
    /// Load configuration from environment and an optional `.env` file
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        // Platform PORT first, MIXTUNE_PORT overrides it
        override_parsed(&lookup, "PORT", &mut cfg.port)?;
        if let Some(host) = lookup("MIXTUNE_HOST") {
            cfg.host = host;
        }
        override_parsed(&lookup, "MIXTUNE_PORT", &mut cfg.port)?;

        // Storage settings
        if let Some(url) = lookup("MIXTUNE_REDIS_URL").filter(|u| !u.is_empty()) {
            cfg.storage.redis_url = Some(url);
        }
        override_parsed(&lookup, "MIXTUNE_STORE_TIMEOUT_MS", &mut cfg.storage.op_timeout_ms)?;
        if let Some(prefix) = lookup("MIXTUNE_KEY_PREFIX") {
            cfg.engine.key_prefix = prefix;
        }

        // Engine settings
        override_parsed(&lookup, "MIXTUNE_EXPLORE_THRESHOLD", &mut cfg.engine.explore_threshold)?;
        override_parsed(&lookup, "MIXTUNE_TOP_K", &mut cfg.engine.top_k)?;
        override_parsed(&lookup, "MIXTUNE_SAMPLE_BATCH", &mut cfg.engine.sample_batch)?;
        override_parsed(&lookup, "MIXTUNE_MAX_BATCHES", &mut cfg.engine.max_batches)?;
        override_parsed(&lookup, "MIXTUNE_FIT_TOLERANCE", &mut cfg.engine.fit_tolerance)?;
        override_parsed(&lookup, "MIXTUNE_FIT_MAX_ITERATIONS", &mut cfg.engine.fit_max_iterations)?;
        override_parsed(&lookup, "MIXTUNE_WEIGHT_SUM_TOLERANCE", &mut cfg.weight_sum_tolerance)?;

        if cfg.engine.top_k < 2 {
            anyhow::bail!("MIXTUNE_TOP_K must be at least 2, got {}", cfg.engine.top_k);
        }
        if cfg.weight_sum_tolerance < 0.0 {
            anyhow::bail!(
                "MIXTUNE_WEIGHT_SUM_TOLERANCE must be non-negative, got {}",
                cfg.weight_sum_tolerance
            );
        }

        Ok(cfg)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", raw, key, e))?;
    }
    Ok(())
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Redis URL; the in-memory store is used when absent
    pub redis_url: Option<String>,
    /// Per-operation store timeout in milliseconds
    pub op_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            op_timeout_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = MixtuneConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8001);
        assert!(cfg.storage.redis_url.is_none());
        assert_eq!(cfg.engine.explore_threshold, 50);
        assert_eq!(cfg.engine.top_k, 20);
        assert_eq!(cfg.engine.key_prefix, "session_");
    }

    #[test]
    fn test_env_overrides() {
        let cfg = MixtuneConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("MIXTUNE_PORT", "9100"),
            ("MIXTUNE_REDIS_URL", "redis://red:6379"),
            ("MIXTUNE_EXPLORE_THRESHOLD", "10"),
            ("MIXTUNE_WEIGHT_SUM_TOLERANCE", "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.storage.redis_url.as_deref(), Some("redis://red:6379"));
        assert_eq!(cfg.engine.explore_threshold, 10);
        assert_eq!(cfg.weight_sum_tolerance, 0.0);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(MixtuneConfig::from_lookup(lookup(&[("MIXTUNE_TOP_K", "many")])).is_err());
        assert!(MixtuneConfig::from_lookup(lookup(&[("MIXTUNE_TOP_K", "1")])).is_err());
    }
}
