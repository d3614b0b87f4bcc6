//! Configuration system for revrun.
//!
//! Two-layer configuration:
//! 1. File config (.revrun.yml or ~/.config/revrun/revrun.yml)
//! 2. Command-line overrides
//!
//! Merged into the [`RunSettings`] for one invocation.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{PROJECT_CONFIG, ReportConfig, RevrunConfig, RunConfig};
pub use self::overrides::{CliOverrides, RunSettings};

mod global;
mod overrides;

/// Load and validate configuration from the standard search paths.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<RevrunConfig> {
    let config = RevrunConfig::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revrun.yml");
        fs::write(&path, "run:\n  jobs: 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
