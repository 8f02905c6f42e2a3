//! JS files consumed by the browser runtime and the service worker.
//!
//! All three are rendered from typed values; nothing is patched in place.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::version::{Marker, Version};
use crate::infra::config::AppConfig;
use crate::infra::project::{CONFIG_JS, SW_CONFIG_JS, SW_FILES_JS};

const HEADER: &str = "// Generated by birdhouse. Do not edit; run `birdhouse release --cache`.\n";

/// `config.js`: the full app config as `const config = {...};`
pub fn render_config_js(app: &AppConfig) -> Result<String> {
    let body = serde_json::to_string_pretty(app).context("serialize app config")?;
    Ok(format!("{HEADER}const config = {body};\n"))
}

/// `service-worker.config.js`: only what the worker needs
pub fn render_sw_config_js(version: &Version) -> String {
    let mode = match version.marker() {
        Some(Marker::Forced) => "forced",
        Some(Marker::Silent) => "silent",
        None => "notify",
    };
    format!(
        "{HEADER}const APP_VERSION = {};\nconst APP_CACHE_NAME = {};\nconst APP_UPDATE_MODE = {};\n",
        js_string(&version.to_string()),
        js_string(&format!("birdhouse-{}", version.numeric())),
        js_string(mode),
    )
}

/// `service-worker.files.js`: the cache list
pub fn render_sw_files_js(files: &[String]) -> String {
    let mut out = String::from(HEADER);
    if files.is_empty() {
        out.push_str("const FILES_TO_CACHE = [];\n");
        return out;
    }
    out.push_str("const FILES_TO_CACHE = [\n");
    for f in files {
        out.push_str("  ");
        out.push_str(&js_string(f));
        out.push_str(",\n");
    }
    out.push_str("];\n");
    out
}

/// JSON string literals are valid JS string literals
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Write all three artifacts into `root`; returns their relative names.
pub fn write_all(
    root: &Path,
    app: &AppConfig,
    version: &Version,
    cache_list: &[String],
) -> Result<Vec<&'static str>> {
    let outputs = [
        (CONFIG_JS, render_config_js(app)?),
        (SW_CONFIG_JS, render_sw_config_js(version)),
        (SW_FILES_JS, render_sw_files_js(cache_list)),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (name, text) in outputs {
        let path = root.join(name);
        let tmp = root.join(format!("{name}.tmp"));
        fs::write(&tmp, text).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("move into place: {}", path.display()))?;
        debug!(artifact = name, "written");
        written.push(name);
    }
    Ok(written)
}
