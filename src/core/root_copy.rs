//! `root-copy`: seed the project root from the framework's `root/` templates.

use std::{fs, path::Path};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cli::{AppContext, RootCopyArgs};
use crate::infra::{
    config::PipelineConfig,
    project::Project,
    utils::{Paint, PathUtils},
    walk::FileWalker,
};

/// Template directory inside the framework checkout
pub const TEMPLATE_DIR: &str = "root";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CopyReport {
    pub copied: Vec<String>,
    /// Already present and kept
    pub skipped: Vec<String>,
}

/// Copy every file below `templates` into `dest`, keeping existing files
/// unless `force`. With `dry_run` nothing is written.
pub fn copy_templates(templates: &Path, dest: &Path, force: bool, dry_run: bool) -> Result<CopyReport> {
    if !templates.is_dir() {
        bail!("framework templates not found at {}", templates.display());
    }

    let walker = FileWalker::new(&[])?.with_include_hidden(true);
    let mut report = CopyReport::default();

    for rel in walker.walk_relative(templates) {
        let name = PathUtils::to_slash(&rel);
        let target = dest.join(&rel);
        if target.exists() && !force {
            debug!(file = %name, "exists, kept");
            report.skipped.push(name);
            continue;
        }
        if !dry_run {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create dir: {}", parent.display()))?;
            }
            fs::copy(templates.join(&rel), &target)
                .with_context(|| format!("copy template into {}", target.display()))?;
        }
        report.copied.push(name);
    }

    info!(copied = report.copied.len(), skipped = report.skipped.len(), "root templates");
    Ok(report)
}

/// `root-copy` command
pub fn run(args: RootCopyArgs, ctx: &AppContext) -> Result<()> {
    let project = Project::open(&ctx.project_dir)?;
    let cfg = PipelineConfig::load(&project.pipeline_config_path())?;
    let templates = project.resolve(&cfg.framework_dir).join(TEMPLATE_DIR);

    let report = copy_templates(&templates, project.root(), args.force, ctx.dry_run)?;

    if !ctx.quiet {
        let verb = if ctx.dry_run { "would copy" } else { "copied" };
        for f in &report.copied {
            println!("{} {f}", Paint::ok(ctx, verb));
        }
        for f in &report.skipped {
            println!("{} {f} (exists, use --force to overwrite)", Paint::dim(ctx, "kept"));
        }
    }
    Ok(())
}
