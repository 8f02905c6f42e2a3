//! Remote transports used by the deploy orchestrator.
//!
//! Remote paths are UTF-8 and `/`-separated on every platform, so they are
//! carried as [`camino::Utf8Path`]. Local paths stay [`std::path::Path`].

use std::path::Path;

use anyhow::Result;
use camino::Utf8Path;

pub mod local;
pub mod ssh;

pub use local::LocalRemote;
pub use ssh::SshRemote;

/// One deployment destination.
///
/// `open` is called once before any other method and `close` once after the
/// last, whether or not the operation in between failed.
pub trait Remote {
    /// Human-readable destination for logs and the run log
    fn describe(&self) -> String;

    fn open(&mut self) -> Result<()>;

    fn exists(&mut self, path: &Utf8Path) -> Result<bool>;

    fn create_dir_all(&mut self, path: &Utf8Path) -> Result<()>;

    /// Copy one local file to `remote`; the parent directory must exist.
    fn upload_file(&mut self, local: &Path, remote: &Utf8Path) -> Result<()>;

    /// Copy the remote directory `remote` into the (absent) local directory
    /// `local`, hidden files included.
    fn download_tree(&mut self, remote: &Utf8Path, local: &Path) -> Result<()>;

    /// Remove a directory tree; a missing tree is not an error.
    fn remove_tree(&mut self, path: &Utf8Path) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}
