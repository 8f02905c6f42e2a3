//! Project root and the well-known files the pipeline reads and writes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// App config source
pub const APP_CONFIG_FILE: &str = "app.toml";
/// Pipeline config source
pub const PIPELINE_CONFIG_FILE: &str = "pipeline.toml";
/// Held for the duration of a run
pub const LOCK_FILE: &str = ".birdhouse.lock";

/// Generated: full client config
pub const CONFIG_JS: &str = "config.js";
/// Generated: stripped config for the service worker
pub const SW_CONFIG_JS: &str = "service-worker.config.js";
/// Generated: cache list for the service worker
pub const SW_FILES_JS: &str = "service-worker.files.js";

/// Canonical project root.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Open an existing project directory.
    pub fn open(dir: &Path) -> Result<Self> {
        let root = dunce::canonicalize(dir)
            .with_context(|| format!("Project directory not found: {}", dir.display()))?;
        if !root.is_dir() {
            bail!("Project path is not a directory: {}", root.display());
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn app_config_path(&self) -> PathBuf {
        self.root.join(APP_CONFIG_FILE)
    }

    pub fn pipeline_config_path(&self) -> PathBuf {
        self.root.join(PIPELINE_CONFIG_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Resolve a configured path: `~`/`$VAR` expanded, relative paths
    /// anchored at the project root.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let expanded = shellexpand::full(configured)
            .map(|c| c.into_owned())
            .unwrap_or_else(|_| configured.to_string());
        let p = PathBuf::from(expanded);
        if p.is_absolute() { p } else { self.root.join(p) }
    }

    /// Names of the generated artifacts, relative to the root.
    pub fn generated_files() -> [&'static str; 3] {
        [CONFIG_JS, SW_CONFIG_JS, SW_FILES_JS]
    }
}
