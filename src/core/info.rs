//! `info`: version, deployment targets and manifest statistics. Read-only.

use anyhow::Result;
use camino::Utf8PathBuf;
use tabled::{Table, Tabled};

use crate::cli::AppContext;
use crate::core::{manifest::ManifestBuilder, version::Version, FileManifest};
use crate::infra::{
    config::{AppConfig, PipelineConfig},
    project::Project,
    utils::{Paint, SizeUtils},
};

#[derive(Tabled)]
struct ExtRow {
    #[tabled(rename = "extension")]
    ext: String,
    files: usize,
    size: String,
}

fn stats_table(manifest: &FileManifest) -> String {
    let mut rows: Vec<ExtRow> = manifest
        .stats()
        .iter()
        .map(|(ext, s)| ExtRow {
            ext: if ext.is_empty() { "(none)".into() } else { ext.clone() },
            files: s.count,
            size: SizeUtils::human(s.bytes),
        })
        .collect();
    rows.push(ExtRow {
        ext: "total".into(),
        files: manifest.len(),
        size: SizeUtils::human(manifest.total_bytes()),
    });
    Table::new(rows).to_string()
}

fn remote_dir(cfg: &PipelineConfig, name: &str) -> String {
    let path = Utf8PathBuf::from(cfg.remote.root.as_str()).join(name.trim_matches('/'));
    let host = if cfg.remote.host.is_empty() { "<no host>" } else { cfg.remote.host.as_str() };
    match &cfg.remote.user {
        Some(u) => format!("{u}@{host}:{path}"),
        None => format!("{host}:{path}"),
    }
}

/// Plain-text report; colors only on the labels.
pub fn render(
    ctx: &AppContext,
    project: &Project,
    app: &AppConfig,
    cfg: &PipelineConfig,
    manifest: &FileManifest,
) -> Result<String> {
    let version = Version::parse(&app.version)?;
    let mode = match version.marker() {
        Some(m) => format!("{m:?}").to_lowercase(),
        None => "notify".to_string(),
    };
    let label = |s: &str| Paint::dim(ctx, s);

    let mut out = String::new();
    out.push_str(&format!("{} {}\n", label("app:       "), app.title));
    out.push_str(&format!("{} {} ({mode})\n", label("version:   "), version));
    out.push_str(&format!("{} {}\n", label("production:"), remote_dir(cfg, &cfg.application_path)));
    out.push_str(&format!("{} {}\n", label("staging:   "), remote_dir(cfg, &cfg.staging_path)));
    out.push_str(&format!(
        "{} {}\n",
        label("local:     "),
        project.resolve(&cfg.local.target_dir).join(cfg.application_path.trim_matches('/')).display()
    ));

    let missing: Vec<&str> = Project::generated_files()
        .into_iter()
        .filter(|f| !project.root().join(f).is_file())
        .collect();
    if !missing.is_empty() {
        out.push_str(&format!(
            "{} not generated yet: {} (run `birdhouse release --cache`)\n",
            Paint::warn(ctx, "artifacts: "),
            missing.join(", ")
        ));
    }

    out.push_str(&format!(
        "{} {} of {} files are cached by the service worker\n",
        label("cache:     "),
        manifest.cacheable(&cfg.no_cache_dirs).len(),
        manifest.len()
    ));
    out.push('\n');
    out.push_str(&stats_table(manifest));
    out.push('\n');
    Ok(out)
}

/// `info` command
pub fn run(ctx: &AppContext) -> Result<()> {
    let project = Project::open(&ctx.project_dir)?;
    let app = AppConfig::load(&project.app_config_path())?;
    let cfg = PipelineConfig::load(&project.pipeline_config_path())?;
    let manifest = ManifestBuilder::new(project.root(), &cfg)
        .create_missing(false)
        .build()?;

    print!("{}", render(ctx, &project, &app, &cfg, &manifest)?);
    Ok(())
}
