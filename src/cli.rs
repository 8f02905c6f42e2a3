use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub project_dir: PathBuf,
}

#[derive(Parser, Debug)]
#[command(name = "birdhouse")]
#[command(
    about = "Release pipeline for Birdhouse PWAs: versioning, cache manifests, minification, image compression and deployment"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory holding app.toml and pipeline.toml
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging on stderr (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create app.toml and pipeline.toml with defaults
    Init(InitArgs),

    /// Merge existing config files over current defaults and rewrite them
    UpdateConfig,

    /// Copy framework root templates into the project root
    RootCopy(RootCopyArgs),

    /// Generate favicons, PWA icons and app icons from the source image
    Icons(IconsArgs),

    /// Show version, targets and manifest statistics
    Info,

    /// Version, cache, minify, compress and optionally deploy
    Release(ReleaseArgs),
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite existing config files
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct RootCopyArgs {
    /// Overwrite files that already exist in the project root
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct IconsArgs {
    /// Favicon PNGs plus a multi-resolution favicon.ico
    #[arg(long)]
    pub favicons: bool,

    /// Web manifest icons (icon-NxN.png)
    #[arg(long)]
    pub icons: bool,

    /// Home-screen app icons (apple-touch-icon-N.png)
    #[arg(long)]
    pub app_icons: bool,
}

impl IconsArgs {
    /// No selection means everything
    pub fn all_unselected(&self) -> bool {
        !(self.favicons || self.icons || self.app_icons)
    }
}

/// Deployment destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    /// SSH host, production path
    Production,
    /// SSH host, staging path
    Staging,
    /// Local directory (pipeline.toml `local.target_dir`)
    Local,
}

/// Build flags that make no sense for delete and rollback
const REMOTE_ONLY_CONFLICTS: [&str; 5] = ["set_version", "forced", "silent", "cache", "minify"];

#[derive(Parser, Debug, Default)]
#[command(group(ArgGroup::new("target").args(["production", "staging", "local"])))]
#[command(group(ArgGroup::new("operation").args(["delete", "backup", "rollback"])))]
#[command(group(ArgGroup::new("marker").args(["forced", "silent"])))]
pub struct ReleaseArgs {
    /// Deploy to the production path
    #[arg(short = 'p', long)]
    pub production: bool,

    /// Deploy to the staging path
    #[arg(short = 's', long)]
    pub staging: bool,

    /// Deploy into the local target directory
    #[arg(short = 'l', long)]
    pub local: bool,

    /// Set the version (x.x.x.x) or, without a value, bump the last component
    #[arg(short = 'v', long = "version", value_name = "X.X.X.X", num_args = 0..=1)]
    pub set_version: Option<Option<String>>,

    /// Regenerate the service-worker cache list and config artifacts
    #[arg(short = 'c', long)]
    pub cache: bool,

    /// Minify JS/CSS into the side directory and upload the minified copies
    #[arg(short = 'm', long)]
    pub minify: bool,

    /// Delete the remote application directory
    #[arg(
        short = 'd',
        long,
        requires = "target",
        conflicts_with_all = REMOTE_ONLY_CONFLICTS
    )]
    pub delete: bool,

    /// Snapshot the remote directory to <path>_BACKUP before releasing
    #[arg(short = 'b', long, requires = "target")]
    pub backup: bool,

    /// Restore the remote directory from its _BACKUP snapshot
    #[arg(long, requires = "target", conflicts_with_all = REMOTE_ONLY_CONFLICTS)]
    pub rollback: bool,

    /// Skip image compression
    #[arg(long, alias = "su")]
    pub skip_compress: bool,

    /// Do not append a run summary to the log file
    #[arg(long, alias = "nl")]
    pub no_log: bool,

    /// Mark the new version as forced (clients reload automatically)
    #[arg(long)]
    pub forced: bool,

    /// Mark the new version as silent (no update notification)
    #[arg(long)]
    pub silent: bool,
}

impl ReleaseArgs {
    /// Selected deployment target, if any
    pub fn target(&self) -> Option<Target> {
        if self.production {
            Some(Target::Production)
        } else if self.staging {
            Some(Target::Staging)
        } else if self.local {
            Some(Target::Local)
        } else {
            None
        }
    }

    /// Whether this run changes the version
    pub fn bumps_version(&self) -> bool {
        self.set_version.is_some() || self.forced || self.silent
    }
}
