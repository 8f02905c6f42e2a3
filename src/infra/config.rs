use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cli::{AppContext, InitArgs};
use crate::error::PipelineError;
use crate::infra::project::Project;

/// Keys that must be present in `app.toml` before a pipeline run
pub const APP_REQUIRED_KEYS: &[&str] = &["version", "title"];

/// Keys that must be present in `pipeline.toml` before a pipeline run
pub const PIPELINE_REQUIRED_KEYS: &[&str] = &["application_path", "include_dirs", "remote"];

/// Client-visible application settings (`app.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig
{
    /// Current release, e.g. `1.2.3.4` or `1.2.3.5-f`
    pub version: String,

    /// Page title
    pub title: String,

    pub description: String,
    pub language: String,
    pub theme_color: String,
    pub background_color: String,

    /// Page shown when the router has no route
    pub start_page: String,

    /// Feature switches read by the browser runtime
    pub features: IndexMap<String, bool>,

    /// Free-form values handed to the client untouched
    pub settings: toml::Table,
}

/// Deployment settings (`pipeline.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig
{
    /// Remote directory for production releases
    pub application_path: String,

    /// Remote directory for staging releases
    pub staging_path: String,

    /// Directories walked (recursively) for the manifest
    pub include_dirs: Vec<String>,

    /// Single project-root files added to the manifest
    pub include_files: Vec<String>,

    /// Directories pruned from the walk
    pub exclude_dirs: Vec<String>,

    /// Uploaded, but kept out of the service-worker cache list
    pub no_cache_dirs: Vec<String>,

    /// Extensions (with leading dot) dropped from the manifest
    pub ignored_extensions: Vec<String>,

    /// Server header file uploaded on its own (e.g. `.htaccess`)
    pub header_file: Option<String>,

    /// Run log, relative to the project root
    pub log_file: String,

    /// Framework checkout holding `root/` templates
    pub framework_dir: String,

    /// Side directory receiving minified copies
    pub minified_dir: String,

    pub pre_release_script: Option<String>,
    pub post_release_script: Option<String>,

    pub remote: RemoteConfig,
    pub local: LocalConfig,
    pub minify: MinifyConfig,
    pub images: ImagesConfig,
    pub icons: IconsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig
{
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<String>,

    /// Remote directory the application paths live under
    pub root: String,

    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig
{
    /// Stand-in for the remote root when deploying with `--local`
    pub target_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinifyConfig
{
    /// argv with `{input}` and `{output}` placeholders
    pub js_command: Vec<String>,
    pub css_command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig
{
    pub source_dir: String,
    pub output_dir: String,
    pub max_width: u32,
    pub max_height: u32,

    /// JPEG quality, 1-100
    pub quality: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconsConfig
{
    pub source: String,
    pub output_dir: String,
    pub favicon_sizes: Vec<u32>,
    pub icon_sizes: Vec<u32>,
    pub app_icon_sizes: Vec<u32>,
}

fn strings(items: &[&str]) -> Vec<String>
{
    items
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AppConfig
{
    fn default() -> Self
    {
        let mut features = IndexMap::new();
        features.insert("offline".to_string(), true);
        features.insert("update_notification".to_string(), true);

        Self {
            version: "0.0.0.1".to_string(),
            title: "Birdhouse App".to_string(),
            description: String::new(),
            language: "en".to_string(),
            theme_color: "#ffffff".to_string(),
            background_color: "#ffffff".to_string(),
            start_page: "home".to_string(),
            features,
            settings: toml::Table::new(),
        }
    }
}

impl Default for PipelineConfig
{
    fn default() -> Self
    {
        Self {
            application_path: "app".to_string(),
            staging_path: "app_staging".to_string(),
            include_dirs: strings(&["birdhouse", "css", "js", "img", "pages"]),
            include_files: strings(&[
                "index.html",
                "manifest.json",
                "service-worker.js",
                "favicon.ico",
            ]),
            exclude_dirs: strings(&["node_modules"]),
            no_cache_dirs: strings(&["img/uncompressed"]),
            ignored_extensions: strings(&[".md", ".log", ".toml", ".lock", ".map"]),
            header_file: Some(".htaccess".to_string()),
            log_file: "birdhouse.log".to_string(),
            framework_dir: "birdhouse".to_string(),
            minified_dir: ".birdhouse/min".to_string(),
            pre_release_script: None,
            post_release_script: None,
            remote: RemoteConfig::default(),
            local: LocalConfig::default(),
            minify: MinifyConfig::default(),
            images: ImagesConfig::default(),
            icons: IconsConfig::default(),
        }
    }
}

impl Default for RemoteConfig
{
    fn default() -> Self
    {
        Self {
            host: String::new(),
            user: None,
            port: 22,
            identity_file: None,
            root: "/".to_string(),
            connect_timeout_secs: 30,
        }
    }
}

impl Default for LocalConfig
{
    fn default() -> Self
    {
        Self { target_dir: "../deploy".to_string() }
    }
}

impl Default for MinifyConfig
{
    fn default() -> Self
    {
        Self {
            js_command: strings(&["terser", "{input}", "--compress", "--mangle", "-o", "{output}"]),
            css_command: strings(&["cleancss", "-o", "{output}", "{input}"]),
        }
    }
}

impl Default for ImagesConfig
{
    fn default() -> Self
    {
        Self {
            source_dir: "img/uncompressed".to_string(),
            output_dir: "img/compressed".to_string(),
            max_width: 1920,
            max_height: 1080,
            quality: 80,
        }
    }
}

impl Default for IconsConfig
{
    fn default() -> Self
    {
        Self {
            source: "img/icon.png".to_string(),
            output_dir: "img/icons".to_string(),
            favicon_sizes: vec![16, 32, 48],
            icon_sizes: vec![72, 96, 128, 144, 152, 192, 384, 512],
            app_icon_sizes: vec![120, 152, 167, 180],
        }
    }
}

impl AppConfig
{
    /// Load `app.toml`, failing on a missing file or missing required keys.
    /// Absent optional keys take their defaults.
    pub fn load(path: &Path) -> Result<Self>
    {
        let table = read_required(path, APP_REQUIRED_KEYS)?;
        let merged = merge_over_defaults(table, &AppConfig::default())?;
        let cfg: AppConfig = toml::Value::Table(merged)
            .try_into()
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Serialize deterministically and write.
    pub fn save(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        write_toml(path, self)
    }
}

impl PipelineConfig
{
    /// Load `pipeline.toml` in layers: struct defaults, file, then
    /// `BIRDHOUSE_*` environment (e.g. `BIRDHOUSE_REMOTE__HOST`).
    pub fn load(path: &Path) -> Result<Self>
    {
        read_required(path, PIPELINE_REQUIRED_KEYS)?;

        let cfg = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("BIRDHOUSE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load pipeline configuration")?;
        let parsed: PipelineConfig = cfg
            .try_deserialize()
            .context("Failed to parse pipeline configuration")?;

        debug!(path = %path.display(), "pipeline config loaded");
        Ok(parsed)
    }

    pub fn save(
        &self,
        path: &Path,
    ) -> Result<()>
    {
        write_toml(path, self)
    }
}

/// Read a config file as a raw table and check required top-level keys.
fn read_required(
    path: &Path,
    required: &[&str],
) -> Result<toml::Table>
{
    if !path.exists()
    {
        return Err(PipelineError::MissingConfig(path.to_path_buf()).into());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;

    let missing: Vec<String> = required
        .iter()
        .filter(|k| !table.contains_key(**k))
        .map(|k| k.to_string())
        .collect();

    if !missing.is_empty()
    {
        return Err(PipelineError::MissingKeys {
            file: path.to_path_buf(),
            keys: missing,
        }
        .into());
    }

    Ok(table)
}

/// Shallow merge: every top-level key present in `existing` wins over the
/// default record; keys only in the defaults are filled in.
pub fn merge_over_defaults<T: Serialize>(
    existing: toml::Table,
    defaults: &T,
) -> Result<toml::Table>
{
    let mut merged = match toml::Value::try_from(defaults).context("Failed to serialize defaults")?
    {
        toml::Value::Table(table) => table,
        other => anyhow::bail!("defaults must serialize to a table, got {}", other.type_str()),
    };
    for (key, value) in existing
    {
        merged.insert(key, value);
    }
    Ok(merged)
}

fn write_toml<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<()>
{
    let text = toml::to_string_pretty(value).context("Failed to serialize config")?;

    // Write through a sibling temp file so readers never see half a config
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move config into place: {}", path.display()))?;
    Ok(())
}

/// Rewrite one config file as defaults merged under its current content.
/// Returns true when the file did not exist yet.
fn update_file<T>(path: &Path) -> Result<bool>
where
    T: Serialize + Default + serde::de::DeserializeOwned,
{
    let created = !path.exists();
    let existing = if created
    {
        toml::Table::new()
    }
    else
    {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?
    };

    let merged = merge_over_defaults(existing, &T::default())?;

    // Round-trip through the typed record so the output is canonical
    let typed: T = toml::Value::Table(merged)
        .try_into()
        .with_context(|| format!("Invalid values in {}", path.display()))?;
    write_toml(path, &typed)?;
    Ok(created)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let project = Project::open(&ctx.project_dir)?;
    let targets = [project.app_config_path(), project.pipeline_config_path()];

    if !args.force
        && let Some(existing) = targets
            .iter()
            .find(|p| p.exists())
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            existing.display()
        );
    }

    if ctx.dry_run
    {
        for path in &targets
        {
            println!("Would write {}", path.display());
        }
        return Ok(());
    }

    AppConfig::default().save(&targets[0])?;
    PipelineConfig::default().save(&targets[1])?;
    info!(project = %project.root().display(), "config files initialized");

    if !ctx.quiet
    {
        for path in &targets
        {
            println!("Created config file at {}", path.display());
        }
    }
    Ok(())
}

/// `update-config`: merge existing files over current defaults and persist.
pub fn update(ctx: &AppContext) -> Result<()>
{
    let project = Project::open(&ctx.project_dir)?;
    let app_path = project.app_config_path();
    let pipeline_path = project.pipeline_config_path();

    if ctx.dry_run
    {
        println!("Would update {} and {}", app_path.display(), pipeline_path.display());
        return Ok(());
    }

    let results: [(PathBuf, bool); 2] = [
        (app_path.clone(), update_file::<AppConfig>(&app_path)?),
        (pipeline_path.clone(), update_file::<PipelineConfig>(&pipeline_path)?),
    ];

    for (path, created) in &results
    {
        info!(path = %path.display(), created, "config updated");
        if !ctx.quiet
        {
            let verb = if *created { "Created" } else { "Updated" };
            println!("{verb} {}", path.display());
        }
    }
    Ok(())
}
