//! Shared fixtures for the integration tests.
//!
//! Builds a small Birdhouse project in a temp dir with a local deploy target
//! inside it, so a full release runs without any network.

#![allow(dead_code)]

use assert_cmd::Command;
use assert_fs::prelude::*;

pub const APP_TOML: &str = r#"version = "1.0.0.1"
title = "Fixture App"
start_page = "home"
"#;

pub const PIPELINE_TOML: &str = r#"application_path = "app"
staging_path = "app_staging"
include_dirs = ["css", "js", "pages"]
include_files = ["index.html", "service-worker.js"]
exclude_dirs = ["node_modules"]
no_cache_dirs = ["img/uncompressed"]
ignored_extensions = [".md"]
header_file = ".htaccess"
log_file = "birdhouse.log"

[remote]
host = ""

[local]
target_dir = "deploy"
"#;

/// Project with configs, a few assets and a header file
pub fn make_project() -> assert_fs::TempDir
{
    let tmp = assert_fs::TempDir::new().expect("tempdir");

    tmp.child("app.toml")
        .write_str(APP_TOML)
        .expect("write app.toml");
    tmp.child("pipeline.toml")
        .write_str(PIPELINE_TOML)
        .expect("write pipeline.toml");

    let files = [
        ("index.html", "<!doctype html><title>fixture</title>"),
        ("service-worker.js", "importScripts('service-worker.config.js');"),
        ("css/site.css", "body { margin: 0; }"),
        ("js/app.js", "let a = 1;"),
        ("js/README.md", "notes, never uploaded"),
        ("pages/home.html", "<h1>home</h1>"),
        (".htaccess", "Options -Indexes"),
    ];
    for (path, body) in files
    {
        tmp.child(path)
            .write_str(body)
            .expect("write fixture file");
    }

    tmp
}

/// Add raw TOML to the fixture's pipeline.toml. Tables go at the end,
/// top-level keys before the first table.
pub fn extend_pipeline(
    tmp: &assert_fs::TempDir,
    extra: &str,
)
{
    let path = tmp.path().join("pipeline.toml");
    let mut text = std::fs::read_to_string(&path).expect("read pipeline.toml");
    text = if extra
        .trim_start()
        .starts_with('[')
    {
        format!("{text}\n{extra}\n")
    }
    else
    {
        format!("{extra}\n{text}")
    };
    std::fs::write(&path, text).expect("write pipeline.toml");
}

/// `birdhouse -C <dir> --quiet ...`
pub fn birdhouse(dir: &std::path::Path) -> Command
{
    let mut cmd = Command::cargo_bin("birdhouse").expect("birdhouse binary");
    cmd.arg("-C")
        .arg(dir)
        .arg("--quiet")
        .env_remove("RUST_LOG");
    cmd
}

pub fn read(
    tmp: &assert_fs::TempDir,
    rel: &str,
) -> String
{
    std::fs::read_to_string(tmp.path().join(rel)).unwrap_or_else(|e| panic!("read {rel}: {e}"))
}
