//! Process-wide defaults, loadable from a JSON config file.
//! `RunOptions` (per-run overrides) lives in `crate::vm`; this
//! module only holds the defaults a long-lived embedder installs once.

use serde::{Deserialize, Serialize};

use crate::context::{DEFAULT_FUEL, DEFAULT_MAX_AGENT_DEPTH, MAX_FETCH_DEPTH};
use crate::procedures::{DEFAULT_MAX_SIZE_BYTES, DEFAULT_TTL_MS};

/// Process-wide defaults for a `Vm`. Every field has a spec-mandated
/// default so an embedder only needs
/// to override what it cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub default_fuel: f64,
    pub default_procedure_ttl_ms: u64,
    pub default_procedure_max_size_bytes: usize,
    pub default_cache_ttl_ms: i64,
    pub max_fetch_depth: u32,
    pub max_agent_depth: u32,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            default_fuel: DEFAULT_FUEL,
            default_procedure_ttl_ms: DEFAULT_TTL_MS,
            default_procedure_max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            default_cache_ttl_ms: crate::atoms::memo::DEFAULT_CACHE_TTL_MS,
            max_fetch_depth: MAX_FETCH_DEPTH,
            max_agent_depth: DEFAULT_MAX_AGENT_DEPTH,
        }
    }
}

impl VmConfig {
    /// Loads a config from a JSON file, falling back to field-level
    /// defaults for anything the file omits (`#[serde(default)]` above).
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        serde_json::from_str(&text).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[source] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.default_fuel, 1000.0);
        assert_eq!(cfg.max_fetch_depth, 10);
    }

    #[test]
    fn partial_json_fills_in_remaining_defaults() {
        let cfg: VmConfig = serde_json::from_str(r#"{"default_fuel": 500}"#).unwrap();
        assert_eq!(cfg.default_fuel, 500.0);
        assert_eq!(cfg.max_agent_depth, DEFAULT_MAX_AGENT_DEPTH);
    }
}
