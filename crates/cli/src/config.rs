// ==============================================================================
// flowsolve.toml Configuration
// ==============================================================================
//
// Discovers and loads the solver configuration. Only the `[solver]` table is
// read:
//
// ```toml
// [solver]
// max_depth = 64
// union_prefilter = false
// ```

use std::path::{Path, PathBuf};

use lang_check::{ConfigError, SolverConfig};
use miette::Diagnostic;
use thiserror::Error;

pub const CONFIG_FILE: &str = "flowsolve.toml";

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigLoadError {
    #[error("could not read {}", path.display())]
    #[diagnostic(code(flowsolve::config::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {}", path.display())]
    #[diagnostic(code(flowsolve::config::invalid))]
    Invalid {
        path: PathBuf,
        #[source]
        source: ConfigError,
    },
}

/// Walk up from `start_dir` looking for `flowsolve.toml`. Returns the first
/// match.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut dir = start_dir;
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

/// Read and validate a configuration file.
pub fn load_config(path: &Path) -> Result<SolverConfig, ConfigLoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    SolverConfig::from_toml_str(&contents).map_err(|source| ConfigLoadError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

/// The configuration for a script: the explicit file if one was given,
/// otherwise the nearest `flowsolve.toml` above the script, otherwise the
/// defaults.
pub fn resolve_config(
    explicit: Option<&Path>,
    script: &Path,
) -> Result<SolverConfig, ConfigLoadError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let start = script.parent().unwrap_or(Path::new("."));
    match find_config(start) {
        Some(found) => {
            log::info!("using configuration {}", found.display());
            load_config(&found)
        }
        None => Ok(SolverConfig::default()),
    }
}
