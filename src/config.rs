//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (EVOCHORA_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [environment]
//! shape = [120, 80]
//! toroidal = true
//!
//! [simulation]
//! error_penalty_cost = 5
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! EVOCHORA_ENVIRONMENT__TOROIDAL=false
//! EVOCHORA_SIMULATION__ERROR_PENALTY_COST=10
//! ```

use crate::runtime::environment::EnvironmentProperties;
use crate::runtime::organism::{ERROR_PENALTY_COST, MAX_ORGANISM_ENERGY};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// World shape and wrapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Cells per axis; the list length is the world's dimensionality
    #[serde(default = "default_shape")]
    pub shape: Vec<usize>,

    /// Wrap coordinates instead of bounding them
    #[serde(default = "default_true")]
    pub toroidal: bool,
}

/// Simulation tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Extra energy charged when an instruction fails
    #[serde(default = "default_error_penalty")]
    pub error_penalty_cost: i64,

    /// Hard ceiling on stored organism energy
    #[serde(default = "default_max_energy")]
    pub max_organism_energy: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_shape() -> Vec<usize> {
    vec![100, 100]
}
fn default_true() -> bool {
    true
}
fn default_error_penalty() -> i64 {
    ERROR_PENALTY_COST
}
fn default_max_energy() -> i64 {
    MAX_ORGANISM_ENERGY
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (EVOCHORA_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("EVOCHORA_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("EVOCHORA_").split("__"))
            .extract()
    }

    /// World properties derived from the environment section.
    pub fn environment_properties(&self) -> EnvironmentProperties {
        EnvironmentProperties::new(self.environment.shape.clone(), self.environment.toroidal)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            environment: EnvironmentConfig::default(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            shape: default_shape(),
            toroidal: true,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            error_penalty_cost: default_error_penalty(),
            max_organism_energy: default_max_energy(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.environment.shape, vec![100, 100]);
        assert!(config.environment.toroidal);
        assert_eq!(config.simulation.error_penalty_cost, ERROR_PENALTY_COST);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).expect("config serializes");
        assert!(toml_str.contains("[environment]"));
        assert!(toml_str.contains("[simulation]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_environment_properties_conversion() {
        let config = Config::default();
        let props = config.environment_properties();
        assert_eq!(props.shape, vec![100, 100]);
        assert!(props.toroidal);
    }
}
