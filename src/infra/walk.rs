//! Filepath: src/infra/walk.rs
//! Deterministic file walker used for manifests and tree uploads.
//! - Skips dotfiles and dot-directories unless asked otherwise
//! - Extra ignore globs (early directory prune + late file filter)
//! - Case-insensitive extension blocklist (".md", ".map", ...)
//! - .gitignore and .ignore files are not consulted; symlinks are not followed
//! - Sorted output for stable manifests and tests
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};

/// Walker with extra ignore globs, an extension blocklist and a hidden
/// file policy. Extra globs are applied in two places:
///   1) Early: prune directories during traversal (filter_entry).
///   2) Late: filter out files that still slipped through.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Lower-cased extensions without the leading dot
    ignored_extensions: Vec<String>,

    /// Include hidden (dot) files; default false
    include_hidden: bool,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g. "node_modules/**").
    /// Patterns match on paths relative to the walk root.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            ignored_extensions: Vec::new(),
            include_hidden: false,
        })
    }

    /// Drop files whose extension is in `exts`. Accepts ".md" or "md",
    /// compared case-insensitively.
    pub fn with_ignored_extensions(
        mut self,
        exts: &[String],
    ) -> Self
    {
        self.ignored_extensions = exts
            .iter()
            .map(|e| {
                e.trim_start_matches('.')
                    .to_ascii_lowercase()
            })
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Include or exclude hidden files (dotfiles).
    pub fn with_include_hidden(
        mut self,
        include_hidden: bool,
    ) -> Self
    {
        self.include_hidden = include_hidden;
        self
    }

    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        //   WalkBuilder::hidden(true)  => *skip* dotfiles
        b.hidden(!self.include_hidden);

        // What ships is decided by pipeline.toml alone, never by VCS ignores
        b.ignore(false);
        b.git_ignore(false);
        b.git_global(false);
        b.git_exclude(false);
        b.parents(false);
        b.require_git(false);

        b.follow_links(false);

        // Early directory pruning using extra ignores, relative to root
        let extra = self
            .ignore_patterns
            .clone();
        let base = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            if !is_dir
            {
                return true;
            }
            let rel = ent
                .path()
                .strip_prefix(&base)
                .unwrap_or(ent.path());
            if rel
                .as_os_str()
                .is_empty()
            {
                return true;
            }
            // "dir/**" style globs also need the directory itself pruned
            !(extra.is_match(rel) || extra.is_match(rel.join("_")))
        });

        b
    }

    fn extension_ignored(
        &self,
        path: &Path,
    ) -> bool
    {
        if self
            .ignored_extensions
            .is_empty()
        {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.ignored_extensions
                    .iter()
                    .any(|ig| *ig == e)
            })
            .unwrap_or(false)
    }

    /// Traverse files under `root`. Returns a **sorted** list of absolute
    /// paths. A missing root yields an empty list.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        if !root_path.exists()
        {
            return Vec::new();
        }

        let mut out: Vec<PathBuf> = self
            .build_walk(root_path)
            .build()
            // Drop entries with IO errors
            .filter_map(|res| res.ok())
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            .map(|entry| entry.into_path())
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
                    && !self.extension_ignored(abs)
            })
            .collect();

        out.sort();
        out
    }

    /// Like `walk_files`, but paths are relative to `root`.
    pub fn walk_relative<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        self.walk_files(root_path)
            .into_iter()
            .filter_map(|abs| {
                abs.strip_prefix(root_path)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect()
    }

    /// Extension check exposed for single files outside a walk.
    pub fn accepts_file(
        &self,
        path: &Path,
    ) -> bool
    {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        (self.include_hidden || !hidden) && !self.extension_ignored(path)
    }
}
