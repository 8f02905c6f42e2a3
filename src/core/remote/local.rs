//! Local-directory remote: `--local` deployments and tests.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use tracing::debug;

use super::Remote;
use crate::infra::walk::FileWalker;

/// Treats `root` as the remote filesystem root. Remote paths are mapped
/// below it, leading `/` or not.
#[derive(Debug, Clone)]
pub struct LocalRemote {
    root: PathBuf,
    open: bool,
}

impl LocalRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn map(&self, path: &Utf8Path) -> Result<PathBuf> {
        if !self.open {
            bail!("local remote {} used before open", self.root.display());
        }
        let rel = path.as_str().trim_start_matches('/');
        if Utf8Path::new(rel)
            .components()
            .any(|c| matches!(c, camino::Utf8Component::ParentDir))
        {
            bail!("remote path escapes the target root: {path}");
        }
        Ok(self.root.join(rel))
    }
}

/// Copy every file below `from` into `to`, hidden files included.
pub fn copy_tree(from: &Path, to: &Path) -> Result<usize> {
    let walker = FileWalker::new(&[])?.with_include_hidden(true);
    let mut copied = 0;
    for rel in walker.walk_relative(from) {
        let dst = to.join(&rel);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        fs::copy(from.join(&rel), &dst)
            .with_context(|| format!("copy into {}", dst.display()))?;
        copied += 1;
    }
    fs::create_dir_all(to).with_context(|| format!("create dir: {}", to.display()))?;
    Ok(copied)
}

impl Remote for LocalRemote {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn open(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create local target: {}", self.root.display()))?;
        self.open = true;
        Ok(())
    }

    fn exists(&mut self, path: &Utf8Path) -> Result<bool> {
        Ok(self.map(path)?.exists())
    }

    fn create_dir_all(&mut self, path: &Utf8Path) -> Result<()> {
        let p = self.map(path)?;
        fs::create_dir_all(&p).with_context(|| format!("create dir: {}", p.display()))
    }

    fn upload_file(&mut self, local: &Path, remote: &Utf8Path) -> Result<()> {
        let dst = self.map(remote)?;
        fs::copy(local, &dst)
            .with_context(|| format!("copy {} -> {}", local.display(), dst.display()))?;
        Ok(())
    }

    fn download_tree(&mut self, remote: &Utf8Path, local: &Path) -> Result<()> {
        let src = self.map(remote)?;
        if !src.is_dir() {
            bail!("remote directory not found: {remote}");
        }
        let n = copy_tree(&src, local)?;
        debug!(%remote, files = n, "downloaded");
        Ok(())
    }

    fn remove_tree(&mut self, path: &Utf8Path) -> Result<()> {
        let p = self.map(path)?;
        if p.exists() {
            fs::remove_dir_all(&p).with_context(|| format!("remove {}", p.display()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn maps_absolute_remote_paths_below_root() {
        let tmp = TempDir::new().unwrap();
        let mut r = LocalRemote::new(tmp.path().join("target"));
        r.open().unwrap();

        r.create_dir_all(Utf8Path::new("/srv/app/js")).unwrap();
        assert!(tmp.path().join("target/srv/app/js").is_dir());
        assert!(r.exists(Utf8Path::new("srv/app")).unwrap());
    }

    #[test]
    fn rejects_use_before_open_and_parent_escapes() {
        let tmp = TempDir::new().unwrap();
        let mut r = LocalRemote::new(tmp.path());
        assert!(r.exists(Utf8Path::new("/x")).is_err());

        r.open().unwrap();
        assert!(r.exists(Utf8Path::new("/../etc")).is_err());
    }

    #[test]
    fn download_includes_hidden_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("remote");
        fs::create_dir_all(root.join("app/js")).unwrap();
        fs::write(root.join("app/.htaccess"), "Options -Indexes").unwrap();
        fs::write(root.join("app/js/a.js"), "a").unwrap();

        let mut r = LocalRemote::new(&root);
        r.open().unwrap();
        let dest = tmp.path().join("copy");
        r.download_tree(Utf8Path::new("/app"), &dest).unwrap();

        assert!(dest.join(".htaccess").is_file());
        assert!(dest.join("js/a.js").is_file());
    }

    #[test]
    fn remove_missing_tree_is_ok() {
        let tmp = TempDir::new().unwrap();
        let mut r = LocalRemote::new(tmp.path());
        r.open().unwrap();
        r.remove_tree(Utf8Path::new("/nothing/here")).unwrap();
    }
}
