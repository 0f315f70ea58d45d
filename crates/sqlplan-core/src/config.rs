//! Optimizer configuration.
//!
//! Pure data with validation; where it is loaded from is the caller's
//! business.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which passes run. Each level includes the previous one, except that `O3`
/// swaps the conservative reducer of `O2` for the rewriting reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum SqlQueryOptimizationLevel {
    /// No optimization.
    O0,
    /// Column pruning.
    O1,
    /// Column pruning + conservative sub-query reduction.
    O2,
    /// Column pruning + rewriting sub-query reduction.
    O3,
    /// O3 + table-alias simplification.
    #[default]
    O4,
}

impl fmt::Display for SqlQueryOptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SqlQueryOptimizationLevel::O0 => "O0",
            SqlQueryOptimizationLevel::O1 => "O1",
            SqlQueryOptimizationLevel::O2 => "O2",
            SqlQueryOptimizationLevel::O3 => "O3",
            SqlQueryOptimizationLevel::O4 => "O4",
        };
        f.write_str(s)
    }
}

impl FromStr for SqlQueryOptimizationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "O0" | "0" => Ok(SqlQueryOptimizationLevel::O0),
            "O1" | "1" => Ok(SqlQueryOptimizationLevel::O1),
            "O2" | "2" => Ok(SqlQueryOptimizationLevel::O2),
            "O3" | "3" => Ok(SqlQueryOptimizationLevel::O3),
            "O4" | "4" => Ok(SqlQueryOptimizationLevel::O4),
            other => Err(Error::Config(format!("unknown optimization level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub level: SqlQueryOptimizationLevel,
    /// Upper bound on collapse rounds per statement while the reducer looks
    /// for a fixed point.
    pub max_reduction_rounds: usize,
    /// Run `SqlPlanNode::validate` on the input before any pass.
    pub validate_input: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            level: SqlQueryOptimizationLevel::default(),
            max_reduction_rounds: 64,
            validate_input: true,
        }
    }
}

impl OptimizerConfig {
    pub fn with_level(level: SqlQueryOptimizationLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_reduction_rounds == 0 {
            return Err(Error::Config("max_reduction_rounds must be greater than 0".into()));
        }
        Ok(())
    }

    /// Parse and validate a JSON config; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: OptimizerConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid optimizer config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
