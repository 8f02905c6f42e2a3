//! Release, backup, rollback and delete over a [`Remote`].
//!
//! One operation opens one connection and closes it on every path. Failures
//! come back inside the [`Outcome`] rather than as `Err`, so the caller can
//! still write the run log before exiting.

use std::{
    collections::BTreeSet,
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indicatif::ProgressBar;
use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, error, info, instrument, warn};

use crate::cli::ReleaseArgs;
use crate::core::remote::Remote;
use crate::error::PipelineError;
use crate::infra::{utils::PathUtils, walk::FileWalker};

/// Suffix of the snapshot directory next to the application directory
pub const BACKUP_SUFFIX: &str = "_BACKUP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Release,
    BackupThenRelease,
    Delete,
    Rollback,
}

impl Operation {
    pub fn from_args(args: &ReleaseArgs) -> Self {
        if args.delete {
            Operation::Delete
        } else if args.rollback {
            Operation::Rollback
        } else if args.backup {
            Operation::BackupThenRelease
        } else {
            Operation::Release
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Operation::Release => "release",
            Operation::BackupThenRelease => "backup+release",
            Operation::Delete => "delete",
            Operation::Rollback => "rollback",
        }
    }

    /// Whether the local upload batch is used
    pub fn uploads_batch(self) -> bool {
        matches!(self, Operation::Release | Operation::BackupThenRelease)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One local file and where it goes below the target directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local: PathBuf,
    /// `/`-separated, relative to the target directory
    pub remote_rel: String,
    pub size: u64,
}

impl UploadItem {
    pub fn new(local: PathBuf, remote_rel: impl Into<String>) -> Result<Self> {
        let size = fs::metadata(&local)
            .with_context(|| format!("stat upload file: {}", local.display()))?
            .len();
        Ok(Self {
            local,
            remote_rel: remote_rel.into(),
            size,
        })
    }
}

/// 0 = ordinary, 1 = `config.*`, 2 = `service-worker.*` (by file name)
fn upload_rank(remote_rel: &str) -> u8 {
    let name = remote_rel.rsplit('/').next().unwrap_or(remote_rel);
    if name.starts_with("service-worker.") {
        2
    } else if name.starts_with("config.") {
        1
    } else {
        0
    }
}

/// Stable reorder: ordinary files, then `config.*`, then `service-worker.*`.
/// Clients that see a new worker must find everything it references.
pub fn upload_order(items: &mut [UploadItem]) {
    items.sort_by_key(|i| upload_rank(&i.remote_rel));
}

/// Every file below `root` (hidden included) as ordered upload items
pub fn tree_items(root: &Path) -> Result<Vec<UploadItem>> {
    let walker = FileWalker::new(&[])?.with_include_hidden(true);
    let mut items = walker
        .walk_relative(root)
        .into_iter()
        .map(|rel| UploadItem::new(root.join(&rel), PathUtils::to_slash(&rel)))
        .collect::<Result<Vec<_>>>()?;
    upload_order(&mut items);
    Ok(items)
}

/// Everything one remote operation needs
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub app_path: Utf8PathBuf,
    pub backup_path: Utf8PathBuf,
    /// Server header file, uploaded on its own before the batch
    pub header: Option<UploadItem>,
    pub batch: Vec<UploadItem>,
}

impl DeployPlan {
    /// Orders the batch; the backup path is `<app_path>_BACKUP`.
    pub fn new(app_path: Utf8PathBuf, header: Option<UploadItem>, mut batch: Vec<UploadItem>) -> Self {
        upload_order(&mut batch);
        let trimmed = app_path.as_str().trim_end_matches('/');
        let backup_path = Utf8PathBuf::from(format!("{trimmed}{BACKUP_SUFFIX}"));
        Self {
            app_path,
            backup_path,
            header,
            batch,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.header.iter().chain(&self.batch).map(|i| i.size).sum()
    }
}

/// Result of one remote operation
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub operation: Operation,
    pub target: String,
    pub uploaded: usize,
    pub bytes: u64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// `Err(RemoteFailed)` for a failed outcome
    pub fn into_result(self) -> Result<Self, PipelineError> {
        match &self.error {
            None => Ok(self),
            Some(reason) => Err(PipelineError::RemoteFailed {
                operation: self.operation.name().to_string(),
                reason: reason.clone(),
            }),
        }
    }
}

#[derive(Default)]
struct Transfer {
    files: usize,
    bytes: u64,
}

/// Run `op` against `remote`. Never returns early without closing.
#[instrument(skip_all, fields(op = %op, target = %remote.describe()))]
pub fn execute<R: Remote + ?Sized>(
    remote: &mut R,
    plan: &DeployPlan,
    op: Operation,
    progress: &ProgressBar,
) -> Outcome {
    let started = Instant::now();
    let target = remote.describe();

    let result = remote.open().and_then(|()| run_operation(remote, plan, op, progress));
    if let Err(e) = remote.close() {
        warn!(error = %format!("{e:#}"), "closing the connection failed");
    }
    progress.finish_and_clear();

    let elapsed = started.elapsed();
    match result {
        Ok(t) => {
            info!(files = t.files, bytes = t.bytes, elapsed_ms = elapsed.as_millis() as u64, "done");
            Outcome {
                operation: op,
                target,
                uploaded: t.files,
                bytes: t.bytes,
                elapsed,
                error: None,
            }
        }
        Err(e) => {
            let reason = format!("{e:#}");
            error!(error = %reason, elapsed_ms = elapsed.as_millis() as u64, "remote operation failed");
            Outcome {
                operation: op,
                target,
                uploaded: 0,
                bytes: 0,
                elapsed,
                error: Some(reason),
            }
        }
    }
}

fn run_operation<R: Remote + ?Sized>(
    remote: &mut R,
    plan: &DeployPlan,
    op: Operation,
    progress: &ProgressBar,
) -> Result<Transfer> {
    match op {
        Operation::Release => release(remote, plan, progress),
        Operation::BackupThenRelease => {
            backup(remote, plan)?;
            release(remote, plan, progress)
        }
        Operation::Delete => {
            remote.remove_tree(&plan.app_path)?;
            info!(path = %plan.app_path, "remote directory deleted");
            Ok(Transfer::default())
        }
        Operation::Rollback => rollback(remote, plan, progress),
    }
}

fn release<R: Remote + ?Sized>(remote: &mut R, plan: &DeployPlan, progress: &ProgressBar) -> Result<Transfer> {
    progress.set_length(plan.total_bytes());
    progress.set_message("uploading");

    let mut t = Transfer::default();
    remote.create_dir_all(&plan.app_path)?;

    if let Some(header) = &plan.header {
        upload_items(remote, &plan.app_path, std::slice::from_ref(header), progress, &mut t)?;
    }
    upload_items(remote, &plan.app_path, &plan.batch, progress, &mut t)?;
    Ok(t)
}

fn upload_items<R: Remote + ?Sized>(
    remote: &mut R,
    base: &Utf8Path,
    items: &[UploadItem],
    progress: &ProgressBar,
    t: &mut Transfer,
) -> Result<()> {
    let mut made: BTreeSet<Utf8PathBuf> = BTreeSet::new();
    for item in items {
        let dest = base.join(&item.remote_rel);
        if let Some(parent) = dest.parent()
            && parent != base
            && made.insert(parent.to_path_buf())
        {
            remote.create_dir_all(parent)?;
        }
        remote.upload_file(&item.local, &dest)?;
        debug!(file = %item.remote_rel, bytes = item.size, "uploaded");
        t.files += 1;
        t.bytes += item.size;
        progress.inc(item.size);
    }
    Ok(())
}

/// Snapshot the application directory into the backup directory.
fn backup<R: Remote + ?Sized>(remote: &mut R, plan: &DeployPlan) -> Result<()> {
    if !remote.exists(&plan.app_path)? {
        info!(path = %plan.app_path, "nothing to back up yet");
        return Ok(());
    }
    remote.remove_tree(&plan.backup_path)?;

    let staging = TempDir::new().context("create backup staging dir")?;
    let local = staging.path().join("snapshot");
    remote.download_tree(&plan.app_path, &local)?;

    let items = tree_items(&local)?;
    remote.create_dir_all(&plan.backup_path)?;
    let mut t = Transfer::default();
    upload_items(remote, &plan.backup_path, &items, &ProgressBar::hidden(), &mut t)?;
    info!(path = %plan.backup_path, files = t.files, "backup written");
    Ok(())
}

/// Restore the application directory from the backup directory.
fn rollback<R: Remote + ?Sized>(remote: &mut R, plan: &DeployPlan, progress: &ProgressBar) -> Result<Transfer> {
    if !remote.exists(&plan.backup_path)? {
        return Err(PipelineError::NoBackup(plan.backup_path.to_string()).into());
    }

    let staging = TempDir::new().context("create rollback staging dir")?;
    let local = staging.path().join("restore");
    remote.download_tree(&plan.backup_path, &local)?;

    let items = tree_items(&local)?;
    progress.set_length(items.iter().map(|i| i.size).sum());
    progress.set_message("restoring");

    remote.create_dir_all(&plan.app_path)?;
    let mut t = Transfer::default();
    upload_items(remote, &plan.app_path, &items, progress, &mut t)?;
    info!(path = %plan.app_path, files = t.files, "rolled back");
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::remote::LocalRemote;
    use proptest::prelude::*;

    /// LocalRemote that records calls and can fail a chosen step
    struct Recording {
        inner: LocalRemote,
        calls: Vec<String>,
        fail_upload_of: Option<&'static str>,
    }

    impl Recording {
        fn new(root: &Path) -> Self {
            Self {
                inner: LocalRemote::new(root),
                calls: Vec::new(),
                fail_upload_of: None,
            }
        }

        fn uploads(&self) -> Vec<&str> {
            self.calls
                .iter()
                .filter_map(|c| c.strip_prefix("put "))
                .collect()
        }
    }

    impl Remote for Recording {
        fn describe(&self) -> String {
            self.inner.describe()
        }
        fn open(&mut self) -> Result<()> {
            self.calls.push("open".into());
            self.inner.open()
        }
        fn exists(&mut self, path: &Utf8Path) -> Result<bool> {
            self.inner.exists(path)
        }
        fn create_dir_all(&mut self, path: &Utf8Path) -> Result<()> {
            self.inner.create_dir_all(path)
        }
        fn upload_file(&mut self, local: &Path, remote: &Utf8Path) -> Result<()> {
            if let Some(bad) = self.fail_upload_of
                && remote.as_str().ends_with(bad)
            {
                anyhow::bail!("connection reset");
            }
            self.calls.push(format!("put {remote}"));
            self.inner.upload_file(local, remote)
        }
        fn download_tree(&mut self, remote: &Utf8Path, local: &Path) -> Result<()> {
            self.inner.download_tree(remote, local)
        }
        fn remove_tree(&mut self, path: &Utf8Path) -> Result<()> {
            self.calls.push(format!("rm {path}"));
            self.inner.remove_tree(path)
        }
        fn close(&mut self) -> Result<()> {
            self.calls.push("close".into());
            self.inner.close()
        }
    }

    fn item(local_root: &Path, rel: &str, body: &str) -> UploadItem {
        let p = local_root.join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, body).unwrap();
        UploadItem::new(p, rel).unwrap()
    }

    fn plan_for(local: &Path) -> DeployPlan {
        let batch = vec![
            item(local, "service-worker.js", "sw"),
            item(local, "config.js", "cfg"),
            item(local, "js/app.js", "app"),
            item(local, "service-worker.files.js", "files"),
            item(local, "index.html", "<html>"),
        ];
        let header = Some(item(local, ".htaccess", "Options -Indexes"));
        DeployPlan::new(Utf8PathBuf::from("/srv/app"), header, batch)
    }

    #[test]
    fn release_uploads_header_then_ordered_batch() {
        let local = tempfile::TempDir::new().unwrap();
        let remote_root = tempfile::TempDir::new().unwrap();
        let plan = plan_for(local.path());
        let mut remote = Recording::new(remote_root.path());

        let out = execute(&mut remote, &plan, Operation::Release, &ProgressBar::hidden());

        assert!(out.is_ok(), "{:?}", out.error);
        assert_eq!(out.uploaded, 6);
        assert_eq!(
            remote.uploads(),
            vec![
                "/srv/app/.htaccess",
                "/srv/app/js/app.js",
                "/srv/app/index.html",
                "/srv/app/config.js",
                "/srv/app/service-worker.js",
                "/srv/app/service-worker.files.js",
            ]
        );
        assert_eq!(remote.calls.first().map(String::as_str), Some("open"));
        assert_eq!(remote.calls.last().map(String::as_str), Some("close"));
        assert!(remote_root.path().join("srv/app/js/app.js").is_file());
    }

    #[test]
    fn failure_is_an_outcome_and_connection_is_closed() {
        let local = tempfile::TempDir::new().unwrap();
        let remote_root = tempfile::TempDir::new().unwrap();
        let plan = plan_for(local.path());
        let mut remote = Recording::new(remote_root.path());
        remote.fail_upload_of = Some("index.html");

        let out = execute(&mut remote, &plan, Operation::Release, &ProgressBar::hidden());

        assert_eq!(out.uploaded, 0);
        assert!(out.error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(remote.calls.last().map(String::as_str), Some("close"));
        assert!(matches!(
            out.into_result(),
            Err(PipelineError::RemoteFailed { .. })
        ));
    }

    #[test]
    fn backup_then_release_snapshots_previous_tree() {
        let local = tempfile::TempDir::new().unwrap();
        let remote_root = tempfile::TempDir::new().unwrap();
        let live = remote_root.path().join("srv/app");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("old.html"), "v1").unwrap();
        fs::write(live.join(".htaccess"), "old header").unwrap();
        // Stale backup gets replaced, not merged
        fs::create_dir_all(remote_root.path().join("srv/app_BACKUP")).unwrap();
        fs::write(remote_root.path().join("srv/app_BACKUP/stale.txt"), "x").unwrap();

        let plan = plan_for(local.path());
        let mut remote = Recording::new(remote_root.path());
        let out = execute(&mut remote, &plan, Operation::BackupThenRelease, &ProgressBar::hidden());

        assert!(out.is_ok(), "{:?}", out.error);
        let backup = remote_root.path().join("srv/app_BACKUP");
        assert_eq!(fs::read_to_string(backup.join("old.html")).unwrap(), "v1");
        assert!(backup.join(".htaccess").is_file());
        assert!(!backup.join("stale.txt").exists());
        assert!(live.join("index.html").is_file());
    }

    #[test]
    fn rollback_without_backup_leaves_primary_untouched() {
        let local = tempfile::TempDir::new().unwrap();
        let remote_root = tempfile::TempDir::new().unwrap();
        let live = remote_root.path().join("srv/app");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("index.html"), "live").unwrap();

        let plan = plan_for(local.path());
        let mut remote = Recording::new(remote_root.path());
        let out = execute(&mut remote, &plan, Operation::Rollback, &ProgressBar::hidden());

        let err = out.error.clone().unwrap();
        assert!(err.contains("no backup exists at /srv/app_BACKUP"), "{err}");
        assert!(remote.uploads().is_empty());
        assert_eq!(fs::read_to_string(live.join("index.html")).unwrap(), "live");
        assert_eq!(remote.calls.last().map(String::as_str), Some("close"));
    }

    #[test]
    fn rollback_restores_backup_over_primary() {
        let local = tempfile::TempDir::new().unwrap();
        let remote_root = tempfile::TempDir::new().unwrap();
        let backup = remote_root.path().join("srv/app_BACKUP");
        fs::create_dir_all(backup.join("js")).unwrap();
        fs::write(backup.join("index.html"), "v1").unwrap();
        fs::write(backup.join("js/app.js"), "a1").unwrap();
        fs::write(backup.join("service-worker.js"), "sw1").unwrap();
        let live = remote_root.path().join("srv/app");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("index.html"), "v2").unwrap();

        let plan = plan_for(local.path());
        let mut remote = Recording::new(remote_root.path());
        let out = execute(&mut remote, &plan, Operation::Rollback, &ProgressBar::hidden());

        assert!(out.is_ok(), "{:?}", out.error);
        assert_eq!(out.uploaded, 3);
        assert_eq!(fs::read_to_string(live.join("index.html")).unwrap(), "v1");
        assert_eq!(remote.uploads().last().copied(), Some("/srv/app/service-worker.js"));
    }

    #[test]
    fn delete_removes_target_only() {
        let local = tempfile::TempDir::new().unwrap();
        let remote_root = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(remote_root.path().join("srv/app")).unwrap();
        fs::create_dir_all(remote_root.path().join("srv/app_BACKUP")).unwrap();

        let plan = plan_for(local.path());
        let mut remote = Recording::new(remote_root.path());
        let out = execute(&mut remote, &plan, Operation::Delete, &ProgressBar::hidden());

        assert!(out.is_ok());
        assert!(!remote_root.path().join("srv/app").exists());
        assert!(remote_root.path().join("srv/app_BACKUP").exists());
    }

    #[test]
    fn operation_from_flags() {
        let args = ReleaseArgs {
            rollback: true,
            ..ReleaseArgs::default()
        };
        assert_eq!(Operation::from_args(&args), Operation::Rollback);
        assert_eq!(Operation::from_args(&ReleaseArgs::default()), Operation::Release);
        assert!(!Operation::Delete.uploads_batch());
    }

    fn arb_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z]{1,6}\\.js",
            "(js|css)/[a-z]{1,6}\\.css",
            "(js/)?config\\.[a-z]{1,4}",
            "(sub/)?service-worker\\.[a-z.]{1,8}",
        ]
    }

    proptest! {
        #[test]
        fn ordering_puts_config_then_service_worker_last(names in prop::collection::vec(arb_name(), 0..24)) {
            let mut items: Vec<UploadItem> = names
                .iter()
                .map(|n| UploadItem { local: PathBuf::from(n), remote_rel: n.clone(), size: 0 })
                .collect();
            let before: Vec<String> = items.iter().map(|i| i.remote_rel.clone()).collect();
            upload_order(&mut items);

            let ranks: Vec<u8> = items.iter().map(|i| upload_rank(&i.remote_rel)).collect();
            prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]));

            // Stable: relative order within a rank is preserved
            for rank in 0..=2u8 {
                let expected: Vec<&String> = before.iter().filter(|n| upload_rank(n) == rank).collect();
                let got: Vec<&String> = items.iter().map(|i| &i.remote_rel).filter(|n| upload_rank(n) == rank).collect();
                prop_assert_eq!(expected, got);
            }
        }
    }
}
