//! The `release` command, end to end.
//!
//! Order matters: the version is resolved and every local input validated
//! before anything is written, and nothing touches the network until the
//! whole upload batch exists on disk.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    process::Command,
    time::Instant,
};

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::cli::{AppContext, ReleaseArgs, Target};
use crate::core::{
    artifacts,
    deploy::{self, DeployPlan, Operation, Outcome, UploadItem},
    images::{self, CompressionReport},
    manifest::{FileManifest, ManifestBuilder},
    minify,
    remote::{LocalRemote, Remote, SshRemote},
    runlog::{self, RunLogEntry},
    version::{Marker, Version},
};
use crate::error::PipelineError;
use crate::infra::{
    config::{AppConfig, PipelineConfig},
    lock::with_project_lock,
    project::{CONFIG_JS, Project},
    utils::{Paint, Progress, SizeUtils},
};

/// `release` command
pub fn run(args: ReleaseArgs, ctx: &AppContext) -> Result<()> {
    let project = Project::open(&ctx.project_dir)?;
    if ctx.dry_run {
        return Release::prepare(&project, &args, ctx)?.print_plan();
    }
    with_project_lock(&project.lock_path(), || {
        Release::prepare(&project, &args, ctx)?.execute()
    })
}

/// Validated inputs of one run
struct Release<'a> {
    project: &'a Project,
    args: &'a ReleaseArgs,
    ctx: &'a AppContext,
    app: AppConfig,
    cfg: PipelineConfig,
    current: Version,
    next: Version,
    manifest: FileManifest,
}

impl<'a> Release<'a> {
    /// Load configs, resolve the version and build the manifest.
    /// Fails before any file is written.
    #[instrument(skip_all)]
    fn prepare(project: &'a Project, args: &'a ReleaseArgs, ctx: &'a AppContext) -> Result<Self> {
        let app = AppConfig::load(&project.app_config_path())?;
        let cfg = PipelineConfig::load(&project.pipeline_config_path())?;

        let current = Version::parse(&app.version)?;
        let next = if args.bumps_version() {
            let target = args.set_version.as_ref().and_then(|v| v.as_deref());
            Version::resolve(&current, target, Marker::from_flags(args.forced, args.silent))?
        } else {
            current
        };

        let manifest = build_manifest(project, &cfg, ctx)?;

        Ok(Self {
            project,
            args,
            ctx,
            app,
            cfg,
            current,
            next,
            manifest,
        })
    }

    fn operation(&self) -> Operation {
        Operation::from_args(self.args)
    }

    fn version_changed(&self) -> bool {
        self.next != self.current
    }

    /// Delete and rollback only touch the remote tree; no local stage runs.
    fn builds(&self) -> bool {
        self.operation().uploads_batch()
    }

    /// Artifacts are rewritten when asked, on a new version, or before any
    /// upload so the deployed worker always matches the deployed files.
    fn writes_artifacts(&self) -> bool {
        self.builds()
            && (self.args.cache || self.version_changed() || self.args.target().is_some())
    }

    fn cache_list(&self) -> Vec<String> {
        let mut list = self.manifest.cacheable(&self.cfg.no_cache_dirs);
        if !list.iter().any(|f| f == CONFIG_JS) {
            list.push(CONFIG_JS.to_string());
            list.sort();
        }
        list
    }

    fn print_plan(&self) -> Result<()> {
        let op = self.operation();
        println!("Dry run, nothing is written or uploaded");
        println!("  version:   {} -> {}", self.current, self.next);
        println!(
            "  manifest:  {} files, {}",
            self.manifest.len(),
            SizeUtils::human(self.manifest.total_bytes())
        );
        println!("  cache:     {} files", self.cache_list().len());
        if self.builds() && !self.args.skip_compress {
            println!("  images:    {} -> {}", self.cfg.images.source_dir, self.cfg.images.output_dir);
        }
        if self.builds() && self.args.minify {
            println!("  minify:    into {}", self.cfg.minified_dir);
        }
        if self.writes_artifacts() {
            println!("  artifacts: {}", Project::generated_files().join(", "));
        }
        match self.args.target() {
            Some(target) => {
                let (_, path) = self.destination(target)?;
                println!("  operation: {op} -> {target:?} {path}");
            }
            None => println!("  operation: build only"),
        }
        Ok(())
    }

    #[instrument(skip_all, fields(version = %self.next))]
    fn execute(mut self) -> Result<()> {
        let started = Instant::now();
        let op = self.operation();

        let report = self.compress_images()?;
        if report.processed > 0 {
            // Freshly compressed images belong to this run's batch and cache list
            self.manifest = build_manifest(self.project, &self.cfg, self.ctx)?;
        }
        let minified = self.minify()?;

        if self.version_changed() {
            self.app.version = self.next.to_string();
            self.app.save(&self.project.app_config_path())?;
            info!(from = %self.current, to = %self.next, "version updated");
        }

        if self.writes_artifacts() {
            artifacts::write_all(self.project.root(), &self.app, &self.next, &self.cache_list())?;
        }

        let Some(target) = self.args.target() else {
            let outcome = self.build_only_outcome(started);
            self.log(&outcome, &report)?;
            self.summarize(&outcome, &report);
            return Ok(());
        };

        let (mut remote, app_path) = self.destination(target)?;
        let (header, batch) = if op.uploads_batch() {
            self.upload_batch(&minified)?
        } else {
            (None, Vec::new())
        };
        let plan = DeployPlan::new(app_path, header, batch);

        self.hook("pre-release", self.cfg.pre_release_script.as_deref(), target)?;

        let progress = Progress::bytes(self.ctx, plan.total_bytes());
        let outcome = deploy::execute(remote.as_mut(), &plan, op, &progress);

        let post = if outcome.is_ok() {
            self.hook("post-release", self.cfg.post_release_script.as_deref(), target)
        } else {
            Ok(())
        };

        self.log(&outcome, &report)?;
        self.summarize(&outcome, &report);

        outcome.into_result()?;
        post
    }

    fn compress_images(&self) -> Result<CompressionReport> {
        if !self.builds() || self.args.skip_compress {
            return Ok(CompressionReport::default());
        }
        let source = self.project.resolve(&self.cfg.images.source_dir);
        let output = self.project.resolve(&self.cfg.images.output_dir);
        images::compress_dir(&source, &output, &self.cfg.images)
    }

    fn minify(&self) -> Result<BTreeMap<String, PathBuf>> {
        if !self.builds() || !self.args.minify {
            return Ok(BTreeMap::new());
        }
        let out_dir = self.project.resolve(&self.cfg.minified_dir);
        let progress = Progress::count(self.ctx, 0);
        minify::minify_manifest(
            self.project.root(),
            &self.manifest,
            &self.cfg.minify,
            &out_dir,
            &progress,
        )
    }

    /// Manifest entries (minified where available) plus generated artifacts.
    /// Every file must exist before the connection opens.
    fn upload_batch(
        &self,
        minified: &BTreeMap<String, PathBuf>,
    ) -> Result<(Option<UploadItem>, Vec<UploadItem>)> {
        let root = self.project.root();
        let mut batch = Vec::with_capacity(self.manifest.len() + 3);

        for entry in self.manifest.entries() {
            let local = minified
                .get(entry)
                .cloned()
                .unwrap_or_else(|| root.join(entry));
            if !local.is_file() {
                return Err(PipelineError::MissingFile(local).into());
            }
            batch.push(UploadItem::new(local, entry.as_str())?);
        }

        for name in Project::generated_files() {
            let local = root.join(name);
            if local.is_file() && !self.manifest.entries().iter().any(|e| e == name) {
                batch.push(UploadItem::new(local, name)?);
            }
        }

        let header = match self.cfg.header_file.as_deref() {
            Some(h) if !h.is_empty() => {
                let local = root.join(h);
                if local.is_file() {
                    Some(UploadItem::new(local, h.trim_start_matches('/'))?)
                } else {
                    warn!(header = h, "header file not found, skipped");
                    None
                }
            }
            _ => None,
        };

        Ok((header, batch))
    }

    /// Remote transport and application directory for a target
    fn destination(&self, target: Target) -> Result<(Box<dyn Remote>, Utf8PathBuf)> {
        let dir = |name: &str| name.trim_matches('/').to_string();
        match target {
            Target::Local => {
                let root = self.project.resolve(&self.cfg.local.target_dir);
                let path = Utf8PathBuf::from("/").join(dir(&self.cfg.application_path));
                Ok((Box::new(LocalRemote::new(root)), path))
            }
            Target::Production | Target::Staging => {
                let name = if target == Target::Production {
                    &self.cfg.application_path
                } else {
                    &self.cfg.staging_path
                };
                let path = Utf8PathBuf::from(self.cfg.remote.root.as_str()).join(dir(name));
                let identity = self
                    .cfg
                    .remote
                    .identity_file
                    .as_deref()
                    .map(|f| self.project.resolve(f));
                Ok((Box::new(SshRemote::new(&self.cfg.remote, identity)), path))
            }
        }
    }

    /// Run a release hook with `sh` in the project root
    fn hook(&self, hook: &'static str, script: Option<&str>, target: Target) -> Result<()> {
        let Some(script) = script.filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let path = self.project.resolve(script);
        info!(hook, script = %path.display(), "running hook");

        let status = Command::new("sh")
            .arg(&path)
            .current_dir(self.project.root())
            .env("BIRDHOUSE_VERSION", self.next.to_string())
            .env("BIRDHOUSE_TARGET", format!("{target:?}").to_lowercase())
            .status()
            .with_context(|| format!("Failed to run {hook} script {}", path.display()))?;

        if !status.success() {
            return Err(PipelineError::Script {
                hook,
                script: path,
                status: status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn build_only_outcome(&self, started: Instant) -> Outcome {
        Outcome {
            operation: Operation::Release,
            target: "-".to_string(),
            uploaded: 0,
            bytes: 0,
            elapsed: started.elapsed(),
            error: None,
        }
    }

    fn log(&self, outcome: &Outcome, report: &CompressionReport) -> Result<()> {
        if self.args.no_log {
            return Ok(());
        }
        let operation = if self.args.target().is_none() {
            "build".to_string()
        } else {
            outcome.operation.name().to_string()
        };
        let mut error = outcome.error.clone();
        if error.is_none() && !report.failed.is_empty() {
            error = Some(format!("{} image(s) failed to compress", report.failed.len()));
        }

        let entry = RunLogEntry {
            timestamp: Local::now(),
            operation,
            target: outcome.target.clone(),
            version: self.next.to_string(),
            duration: outcome.elapsed,
            uploaded: outcome.uploaded,
            bytes: outcome.bytes,
            stats: self.manifest.stats().clone(),
            error,
        };
        runlog::prepend(&self.project.resolve(&self.cfg.log_file), &entry)
    }

    fn summarize(&self, outcome: &Outcome, report: &CompressionReport) {
        if self.ctx.quiet {
            return;
        }
        let ctx = self.ctx;
        for (path, reason) in &report.failed {
            println!("{} {path}: {reason}", Paint::warn(ctx, "image skipped"));
        }
        if report.processed > 0 {
            println!("{} {} image(s) compressed", Paint::dim(ctx, "·"), report.processed);
        }

        match (&outcome.error, self.args.target()) {
            (Some(e), _) => {
                println!("{} {} on {}: {e}", Paint::fail(ctx, "failed"), outcome.operation, outcome.target);
            }
            (None, None) => {
                println!(
                    "{} {} ({} files, {})",
                    Paint::ok(ctx, "built"),
                    self.next,
                    self.manifest.len(),
                    SizeUtils::human(self.manifest.total_bytes())
                );
            }
            (None, Some(_)) => {
                println!(
                    "{} {} {} to {} ({} files, {}) in {:.1}s",
                    Paint::ok(ctx, "done"),
                    outcome.operation,
                    self.next,
                    outcome.target,
                    outcome.uploaded,
                    SizeUtils::human(outcome.bytes),
                    outcome.elapsed.as_secs_f64()
                );
            }
        }
    }
}

fn build_manifest(project: &Project, cfg: &PipelineConfig, ctx: &AppContext) -> Result<FileManifest> {
    ManifestBuilder::new(project.root(), cfg)
        .create_missing(!ctx.dry_run)
        .build()
}
