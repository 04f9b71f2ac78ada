//! Configuration System
//!
//! Hierarchical configuration loading from:
//! - matview.toml (default configuration file)
//! - Environment variables (MATVIEW_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # matview.toml
//! [planner]
//! solver_timeout_ms = 30000
//!
//! [codegen]
//! structure_name = "Materialized"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! MATVIEW_PLANNER__SOLVER_TIMEOUT_MS=5000
//! ```
//!
//! Every field has a working default, so `Config::default()` is enough for
//! embedders that do not ship a config file.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub codegen: CodegenConfig,
}

/// Decomposition planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Wall-clock budget for one solver call, in milliseconds
    #[serde(default = "default_solver_timeout_ms")]
    pub solver_timeout_ms: u64,
}

fn default_solver_timeout_ms() -> u64 {
    30_000
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            solver_timeout_ms: default_solver_timeout_ms(),
        }
    }
}

impl PlannerConfig {
    pub fn solver_budget(&self) -> Duration {
        Duration::from_millis(self.solver_timeout_ms)
    }
}

/// Code generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodegenConfig {
    /// Name given to synthesized data structures when the caller does not
    /// pick one
    #[serde(default = "default_structure_name")]
    pub structure_name: String,
}

fn default_structure_name() -> String {
    "Materialized".to_string()
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            structure_name: default_structure_name(),
        }
    }
}

impl Config {
    /// Load from `matview.toml` in the working directory plus `MATVIEW_*`
    /// environment overrides.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("matview.toml")
    }

    /// Load from an explicit file path plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MATVIEW_").split("__"))
            .extract()
    }
}
