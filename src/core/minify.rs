//! JS/CSS minification through external tools.
//!
//! Each `.js`/`.css` manifest entry is fed to the configured command and the
//! result lands under the minified side directory with the same relative
//! path. Originals are never touched. The first failure aborts the run.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{debug, info, instrument};

use crate::core::manifest::FileManifest;
use crate::error::PipelineError;
use crate::infra::{config::MinifyConfig, utils::PathUtils};

/// Which command handles an entry, if any
fn command_for<'c>(cfg: &'c MinifyConfig, entry: &str) -> Option<&'c [String]> {
    match PathUtils::extension(entry).as_str() {
        "js" => Some(&cfg.js_command),
        "css" => Some(&cfg.css_command),
        _ => None,
    }
}

/// Expand `{input}` / `{output}` placeholders in an argv template
fn expand_argv(template: &[String], input: &Path, output: &Path) -> Vec<String> {
    let input = input.to_string_lossy();
    let output = output.to_string_lossy();
    template
        .iter()
        .map(|a| a.replace("{input}", &input).replace("{output}", &output))
        .collect()
}

/// Minify every JS/CSS entry. Returns entry -> minified file.
#[instrument(skip_all, fields(out_dir = %out_dir.display()))]
pub fn minify_manifest(
    root: &Path,
    manifest: &FileManifest,
    cfg: &MinifyConfig,
    out_dir: &Path,
    progress: &ProgressBar,
) -> Result<BTreeMap<String, PathBuf>> {
    let jobs: Vec<(&String, &[String])> = manifest
        .entries()
        .iter()
        .filter_map(|e| command_for(cfg, e).map(|c| (e, c)))
        .collect();

    progress.set_length(jobs.len() as u64);
    progress.set_message("minifying");

    let mut out = BTreeMap::new();
    for (entry, template) in jobs {
        let input = root.join(entry);
        let output = out_dir.join(entry);
        run_one(entry, template, &input, &output)?;
        out.insert(entry.clone(), output);
        progress.inc(1);
    }

    progress.finish_and_clear();
    info!(files = out.len(), "minified");
    Ok(out)
}

fn run_one(entry: &str, template: &[String], input: &Path, output: &Path) -> Result<()> {
    let fail = |reason: String| PipelineError::Minify {
        path: entry.to_string(),
        reason,
    };

    let argv = expand_argv(template, input, output);
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| fail("no minifier command configured".into()))?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create minify dir: {}", parent.display()))?;
    }

    debug!(entry, program, "minify");
    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| fail(format!("could not run {program}: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(fail(format!("{program} exited with {}: {}", result.status, stderr.trim())).into());
    }
    if !output.is_file() {
        return Err(fail(format!("{program} produced no output at {}", output.display())).into());
    }
    Ok(())
}
