//! Domain error taxonomy.

use std::path::PathBuf;

/// Typed pipeline failures. Most call sites still return `anyhow::Result`
/// and attach these via `?`, so `downcast_ref` recovers the variant.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Config file absent from the project root
    #[error("configuration file not found: {} (run `birdhouse init` first)", .0.display())]
    MissingConfig(PathBuf),

    /// Config file present but lacking keys the pipeline needs
    #[error("{} is missing required keys: {}", file.display(), keys.join(", "))]
    MissingKeys { file: PathBuf, keys: Vec<String> },

    /// Version string failed the numeric-dot pattern
    #[error("invalid version '{0}': expected 1-4 dot-separated numbers such as 1.2.3.4")]
    InvalidVersion(String),

    /// File slated for upload disappeared before any network I/O
    #[error("file scheduled for upload does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    /// Another invocation holds the project lock
    #[error("another birdhouse run is active for this project (lock: {})", .0.display())]
    Locked(PathBuf),

    /// Minifier exited non-zero or could not be spawned
    #[error("minification failed for {path}: {reason}")]
    Minify { path: String, reason: String },

    /// Rollback requested without a snapshot on the remote
    #[error("no backup exists at {0}")]
    NoBackup(String),

    /// Remote operation finished with an error (already logged)
    #[error("remote {operation} failed: {reason}")]
    RemoteFailed { operation: String, reason: String },

    /// Release hook exited non-zero
    #[error("{hook} script {} exited with {status}", script.display())]
    Script { hook: &'static str, script: PathBuf, status: String },
}
