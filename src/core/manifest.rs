//! File manifest: every project file slated for upload and caching.
//!
//! Entries are project-relative, `/`-separated, sorted and unique. Building
//! twice over an unchanged tree yields the same manifest.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::infra::{
    config::PipelineConfig,
    utils::PathUtils,
    walk::FileWalker,
};

/// Per-extension totals for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtStat {
    pub count: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileManifest {
    entries: Vec<String>,
    stats: IndexMap<String, ExtStat>,
    total_bytes: u64,
}

impl FileManifest {
    /// Build from arbitrary entries (sorted + de-duplicated), no stats.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = entries.into_iter().map(Into::into).collect();
        Self {
            entries: set.into_iter().collect(),
            stats: IndexMap::new(),
            total_bytes: 0,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Extension (lower-case, no dot; "" for none) to count/bytes, sorted by extension
    pub fn stats(&self) -> &IndexMap<String, ExtStat> {
        &self.stats
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Entries outside every no-cache directory: the service-worker cache list.
    pub fn cacheable(&self, no_cache_dirs: &[String]) -> Vec<String> {
        let prefixes: Vec<String> = no_cache_dirs
            .iter()
            .map(|d| d.trim_matches('/'))
            .filter(|d| !d.is_empty())
            .map(|d| format!("{d}/"))
            .collect();

        self.entries
            .iter()
            .filter(|e| !prefixes.iter().any(|p| e.starts_with(p.as_str())))
            .cloned()
            .collect()
    }
}

/// Walks the configured directories of one project.
pub struct ManifestBuilder<'a> {
    root: &'a Path,
    config: &'a PipelineConfig,
    create_missing: bool,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(root: &'a Path, config: &'a PipelineConfig) -> Self {
        Self {
            root,
            config,
            create_missing: true,
        }
    }

    /// Leave missing include directories alone (dry runs)
    pub fn create_missing(mut self, create: bool) -> Self {
        self.create_missing = create;
        self
    }

    /// Walk `include_dirs`, add `include_files`, filter, sort, count.
    /// Missing include directories are created empty.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn build(&self) -> Result<FileManifest> {
        let walker = FileWalker::new(&self.prune_patterns())?
            .with_ignored_extensions(&self.config.ignored_extensions);
        let excluded = self.exclude_set()?;

        let mut entries = BTreeSet::new();

        for dir in &self.config.include_dirs {
            let dir = dir.trim_matches('/');
            if dir.is_empty() {
                continue;
            }
            let abs = self.root.join(dir);
            if !abs.exists() {
                if self.create_missing {
                    fs::create_dir_all(&abs)
                        .with_context(|| format!("create include dir: {}", abs.display()))?;
                    info!(dir, "created missing include directory");
                }
                continue;
            }
            for rel in walker.walk_relative(&abs) {
                entries.insert(format!("{dir}/{}", PathUtils::to_slash(&rel)));
            }
        }

        for file in &self.config.include_files {
            let file = file.trim_matches('/');
            let abs = self.root.join(file);
            if !abs.is_file() {
                warn!(file, "include file missing, skipped");
                continue;
            }
            if walker.accepts_file(&abs) {
                entries.insert(file.to_string());
            }
        }

        entries.retain(|e| !excluded.is_match(e.as_str()));

        let (stats, total_bytes) = self.collect_stats(&entries)?;
        debug!(files = entries.len(), total_bytes, "manifest built");

        Ok(FileManifest {
            entries: entries.into_iter().collect(),
            stats,
            total_bytes,
        })
    }

    /// Bare directory names prune at any depth during the walk
    fn prune_patterns(&self) -> Vec<String> {
        self.config
            .exclude_dirs
            .iter()
            .map(|d| d.trim_matches('/'))
            .filter(|d| !d.is_empty() && !d.contains('/'))
            .map(|d| format!("**/{d}/**"))
            .collect()
    }

    /// Project-relative exclusions applied to finished entries
    fn exclude_set(&self) -> Result<GlobSet> {
        let mut b = GlobSetBuilder::new();
        for d in &self.config.exclude_dirs {
            let d = d.trim_matches('/');
            if d.is_empty() {
                continue;
            }
            b.add(Glob::new(&format!("{d}/**"))?);
        }
        Ok(b.build()?)
    }

    fn collect_stats(&self, entries: &BTreeSet<String>) -> Result<(IndexMap<String, ExtStat>, u64)> {
        let mut by_ext: BTreeMap<String, ExtStat> = BTreeMap::new();
        let mut total = 0u64;

        for e in entries {
            let abs = self.root.join(e);
            let size = fs::metadata(&abs)
                .with_context(|| format!("stat manifest entry: {}", abs.display()))?
                .len();
            let stat = by_ext.entry(PathUtils::extension(e)).or_default();
            stat.count += 1;
            stat.bytes += size;
            total += size;
        }

        Ok((by_ext.into_iter().collect(), total))
    }
}
