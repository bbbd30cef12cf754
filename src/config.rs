//! Environment-sourced configuration.
//!
//! The original application scattered these knobs across module globals;
//! here they are read once at startup into an explicit [`MemoryConfig`] and
//! passed into each component constructor.

use std::time::Duration;

use crate::error::{MemoryError, Result};

/// Configuration for the memory subsystem, built once at process start.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Whether retrieval results are cached at all.
    pub cache_enabled: bool,
    /// Maximum number of live cache entries. Zero disables caching.
    pub cache_size: usize,
    /// How long a cached result list stays valid.
    pub cache_ttl: Duration,
    /// Default number of memories returned per retrieval.
    pub max_results: usize,
    /// Minimum relevance score a memory must reach to be returned (0.0 - 1.0).
    pub similarity_threshold: f32,
    /// Whether operation timing is recorded.
    pub performance_monitoring: bool,
    /// Durations strictly above this are logged as slow operations.
    pub slow_op_threshold: Duration,
    /// Vector store collection the assistant's memories live in.
    pub collection_name: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_size: 100,
            cache_ttl: Duration::from_secs(300),
            max_results: 5,
            similarity_threshold: 0.7,
            performance_monitoring: true,
            slow_op_threshold: Duration::from_millis(500),
            collection_name: "memgate_memories".to_string(),
        }
    }
}

impl MemoryConfig {
    /// Build the configuration from the process environment, loading a
    /// `.env` file first if one is present.
    ///
    /// Recognized variables: `CACHE_ENABLED`, `CACHE_SIZE`, `CACHE_TTL`
    /// (seconds), `MEM0_MAX_RESULTS`, `MEM0_SIMILARITY_THRESHOLD`,
    /// `PERFORMANCE_MONITORING`, `PERFORMANCE_SLOW_OPERATION_THRESHOLD`
    /// (milliseconds), `MEM0_COLLECTION_PREFIX`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(raw) = lookup("CACHE_ENABLED") {
            cfg.cache_enabled = parse_bool("CACHE_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("CACHE_SIZE") {
            cfg.cache_size = parse_int("CACHE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("CACHE_TTL") {
            cfg.cache_ttl = Duration::from_secs(parse_int("CACHE_TTL", &raw)? as u64);
        }
        if let Some(raw) = lookup("MEM0_MAX_RESULTS") {
            cfg.max_results = parse_int("MEM0_MAX_RESULTS", &raw)?;
        }
        if let Some(raw) = lookup("MEM0_SIMILARITY_THRESHOLD") {
            cfg.similarity_threshold = parse_float("MEM0_SIMILARITY_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("PERFORMANCE_MONITORING") {
            cfg.performance_monitoring = parse_bool("PERFORMANCE_MONITORING", &raw)?;
        }
        if let Some(raw) = lookup("PERFORMANCE_SLOW_OPERATION_THRESHOLD") {
            cfg.slow_op_threshold = Duration::from_millis(parse_int(
                "PERFORMANCE_SLOW_OPERATION_THRESHOLD",
                &raw,
            )? as u64);
        }
        if let Some(prefix) = lookup("MEM0_COLLECTION_PREFIX") {
            cfg.collection_name = format!("{}_memories", prefix.trim());
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check numeric bounds. Fatal at startup when violated.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(MemoryError::Configuration(
                "MEM0_MAX_RESULTS must be at least 1".into(),
            ));
        }
        if !self.similarity_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.similarity_threshold)
        {
            return Err(MemoryError::Configuration(format!(
                "MEM0_SIMILARITY_THRESHOLD must be within [0.0, 1.0], got {}",
                self.similarity_threshold
            )));
        }
        if self.collection_name.is_empty() {
            return Err(MemoryError::Configuration(
                "collection name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Cache capacity after accounting for the enable switch.
    pub fn effective_cache_size(&self) -> usize {
        if self.cache_enabled {
            self.cache_size
        } else {
            0
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MemoryError::Configuration(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_int(name: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| MemoryError::Configuration(format!("{name} must be an integer, got '{raw}'")))
}

fn parse_float(name: &str, raw: &str) -> Result<f32> {
    raw.trim()
        .parse::<f32>()
        .map_err(|_| MemoryError::Configuration(format!("{name} must be a number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = MemoryConfig::from_lookup(|_| None).unwrap();
        assert!(cfg.cache_enabled);
        assert_eq!(cfg.cache_size, 100);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.max_results, 5);
        assert_eq!(cfg.slow_op_threshold, Duration::from_millis(500));
    }

    #[test]
    fn reads_all_recognized_variables() {
        let cfg = MemoryConfig::from_lookup(lookup_from(&[
            ("CACHE_ENABLED", "false"),
            ("CACHE_SIZE", "50"),
            ("CACHE_TTL", "60"),
            ("MEM0_MAX_RESULTS", "8"),
            ("MEM0_SIMILARITY_THRESHOLD", "0.55"),
            ("PERFORMANCE_MONITORING", "no"),
            ("PERFORMANCE_SLOW_OPERATION_THRESHOLD", "250"),
            ("MEM0_COLLECTION_PREFIX", "assistant"),
        ]))
        .unwrap();

        assert!(!cfg.cache_enabled);
        assert_eq!(cfg.cache_size, 50);
        assert_eq!(cfg.cache_ttl, Duration::from_secs(60));
        assert_eq!(cfg.max_results, 8);
        assert!((cfg.similarity_threshold - 0.55).abs() < f32::EPSILON);
        assert!(!cfg.performance_monitoring);
        assert_eq!(cfg.slow_op_threshold, Duration::from_millis(250));
        assert_eq!(cfg.collection_name, "assistant_memories");
    }

    #[test]
    fn rejects_zero_max_results() {
        let err = MemoryConfig::from_lookup(lookup_from(&[("MEM0_MAX_RESULTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err =
            MemoryConfig::from_lookup(lookup_from(&[("MEM0_SIMILARITY_THRESHOLD", "1.5")]))
                .unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }

    #[test]
    fn rejects_unparsable_values() {
        let err = MemoryConfig::from_lookup(lookup_from(&[("CACHE_SIZE", "lots")])).unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
        let err =
            MemoryConfig::from_lookup(lookup_from(&[("CACHE_ENABLED", "maybe")])).unwrap_err();
        assert!(matches!(err, MemoryError::Configuration(_)));
    }

    #[test]
    fn disabled_cache_has_zero_effective_size() {
        let cfg = MemoryConfig {
            cache_enabled: false,
            cache_size: 100,
            ..MemoryConfig::default()
        };
        assert_eq!(cfg.effective_cache_size(), 0);
    }
}
