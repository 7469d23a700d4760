// ==============================================================================
// Solver Configuration
// ==============================================================================
//
// Read from the `[solver]` table of a `flowsolve.toml`:
//
// ```toml
// [solver]
// max_depth = 200
// cancel_check_interval = 256
// union_prefilter = true
// ```
//
// Every key is optional. The expansion guard's 0/1/2 visit policy is fixed and
// deliberately not exposed here.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    /// Maximum nesting of dispatch calls along one trace.
    pub max_depth: u32,
    /// Decompositions between two polls of the cancellation flag.
    pub cancel_check_interval: u32,
    /// Skip union members whose outer constructor can never match before
    /// trying them speculatively.
    pub union_prefilter: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 200,
            cancel_check_interval: 256,
            union_prefilter: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid solver configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("`{field}` must be greater than zero")]
    Zero { field: &'static str },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    solver: SolverConfig,
}

impl SolverConfig {
    /// Parse the `[solver]` table of a configuration file. A file without the
    /// table yields the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(source)?;
        file.solver.validate()
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::Zero { field: "max_depth" });
        }
        if self.cancel_check_interval == 0 {
            return Err(ConfigError::Zero {
                field: "cancel_check_interval",
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(SolverConfig::from_toml_str("").unwrap(), SolverConfig::default());
    }

    #[test]
    fn partial_table_keeps_other_defaults() {
        let config = SolverConfig::from_toml_str(indoc! {"
            [solver]
            max_depth = 12
        "})
        .unwrap();
        assert_eq!(config.max_depth, 12);
        assert_eq!(config.cancel_check_interval, 256);
        assert!(config.union_prefilter);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SolverConfig::from_toml_str(indoc! {"
            [solver]
            max_dept = 12
        "})
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = SolverConfig::from_toml_str("[solver]\nmax_depth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Zero { field: "max_depth" }));
    }
}
