//! **birdhouse** - Release pipeline for Birdhouse progressive web apps
//!
//! Versions the app, rebuilds the service-worker cache manifest, minifies and
//! compresses assets, then deploys over SSH/SFTP (or to a local directory) with
//! backup and rollback. Uploads are strictly sequential and always finish with
//! the `config.*` and `service-worker.*` files.

/// Command-line interface with clap integration
pub mod cli;

/// Typed pipeline errors
pub mod error;
pub use error::PipelineError;

/// Core pipeline stages
pub mod core {
    /// Four-component app version with forced/silent markers
    pub mod version;
    pub use version::{Marker, Version};

    /// Sorted, de-duplicated file manifest with per-extension stats
    pub mod manifest;
    pub use manifest::{FileManifest, ManifestBuilder};

    /// Client-facing JS artifacts (config.js, service-worker config + cache list)
    pub mod artifacts;

    /// External JS/CSS minifier (fail-fast)
    pub mod minify;

    /// Image re-encoding (best-effort, parallel)
    pub mod images;

    /// Favicon/icon/app-icon generation
    pub mod icons;
    pub use icons::run as icons_run;

    /// Remote transports: SSH/SFTP and local directory
    pub mod remote;
    pub use remote::{LocalRemote, Remote, SshRemote};

    /// Release/backup/rollback/delete orchestration over a `Remote`
    pub mod deploy;
    pub use deploy::{DeployPlan, Operation, Outcome};

    /// Newest-first run log
    pub mod runlog;

    /// The `release` command: end-to-end pipeline
    pub mod pipeline;
    pub use pipeline::run as release_run;

    /// The `info` command
    pub mod info;
    pub use info::run as info_run;

    /// The `root-copy` command
    pub mod root_copy;
    pub use root_copy::run as root_copy_run;
}

/// Infrastructure - Configuration, project layout, walking, locking, logging
pub mod infra {
    /// Typed app/pipeline configuration with merge-and-persist
    pub mod config;
    pub use config::{AppConfig, PipelineConfig};

    /// Project root and well-known file locations
    pub mod project;
    pub use project::Project;

    /// Directory walker with hidden/extension/glob filters
    pub mod walk;
    pub use walk::FileWalker;

    /// Project lock file
    pub mod lock;

    /// tracing-subscriber setup
    pub mod logging;

    /// Small formatting and path helpers
    pub mod utils;
}

pub use cli::{AppContext, Cli, Commands};
pub use infra::{AppConfig, FileWalker, PipelineConfig, Project};
