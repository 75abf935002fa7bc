//! Layered configuration: defaults, then an optional TOML file, then CLI flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// On-disk configuration, all fields optional so a partial file is valid.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub router_url: Option<String>,
    pub output: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
    pub cost_limit: Option<f64>,
    pub max_retries: Option<u32>,
}

impl FileConfig {
    /// Returns the default config when `path` doesn't exist — a missing
    /// `--config` flag is not an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}
