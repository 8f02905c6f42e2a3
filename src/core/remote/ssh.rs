//! SSH/SFTP remote on top of the system OpenSSH client.
//!
//! `open` starts one master connection (`ssh -M`) on a private control
//! socket; every later shell command and `sftp` batch rides on it, so the
//! host is authenticated once per operation. `close` asks the master to exit.

use std::{
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Output, Stdio},
};

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::Remote;
use crate::infra::config::RemoteConfig;

/// Quote for a POSIX shell: `'it'\''s'`
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Quote for an sftp batch line
pub fn sftp_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', r"\\").replace('"', "\\\""))
}

pub struct SshRemote {
    host: String,
    user: Option<String>,
    port: u16,
    identity_file: Option<PathBuf>,
    connect_timeout_secs: u64,
    /// Holds the control socket while the master is up
    control_dir: Option<TempDir>,
}

impl SshRemote {
    pub fn new(cfg: &RemoteConfig, identity_file: Option<PathBuf>) -> Self {
        Self {
            host: cfg.host.clone(),
            user: cfg.user.clone(),
            port: cfg.port,
            identity_file,
            connect_timeout_secs: cfg.connect_timeout_secs,
            control_dir: None,
        }
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(u) => format!("{u}@{}", self.host),
            None => self.host.clone(),
        }
    }

    fn control_path(&self) -> Result<PathBuf> {
        match &self.control_dir {
            Some(d) => Ok(d.path().join("master")),
            None => bail!("ssh connection to {} is not open", self.describe()),
        }
    }

    /// Options shared by ssh and sftp
    fn common_options(&self, cmd: &mut Command, control: &Path) {
        cmd.arg("-o")
            .arg(format!("ControlPath={}", control.display()))
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        if let Some(id) = &self.identity_file {
            cmd.arg("-i").arg(id);
        }
    }

    /// Run a remote shell command over the master connection.
    fn shell(&self, command: &str) -> Result<Output> {
        let control = self.control_path()?;
        let mut cmd = Command::new("ssh");
        self.common_options(&mut cmd, &control);
        cmd.arg("-p")
            .arg(self.port.to_string())
            .arg(self.destination())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null());

        debug!(command, "ssh");
        let out = cmd.output().context("Failed to spawn ssh")?;
        // 255 is ssh's own failure, everything else comes from the command
        if out.status.code() == Some(255) {
            bail!(
                "ssh to {} failed: {}",
                self.describe(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(out)
    }

    fn shell_ok(&self, command: &str) -> Result<()> {
        let out = self.shell(command)?;
        if !out.status.success() {
            bail!(
                "remote command `{command}` failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(())
    }

    /// Feed a batch to `sftp -b -`; the batch aborts on its first failure.
    fn sftp_batch(&self, batch: &str) -> Result<()> {
        let control = self.control_path()?;
        let mut cmd = Command::new("sftp");
        self.common_options(&mut cmd, &control);
        cmd.arg("-P")
            .arg(self.port.to_string())
            .arg("-b")
            .arg("-")
            .arg(self.destination())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().context("Failed to spawn sftp")?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(batch.as_bytes())
                .context("Failed to write sftp batch")?;
        }
        let out = child
            .wait_with_output()
            .context("Failed to wait for sftp")?;
        if !out.status.success() {
            bail!("sftp failed: {}", String::from_utf8_lossy(&out.stderr).trim());
        }
        Ok(())
    }
}

impl Remote for SshRemote {
    fn describe(&self) -> String {
        format!("{}:{}", self.destination(), self.port)
    }

    fn open(&mut self) -> Result<()> {
        if self.host.is_empty() {
            bail!("remote.host is not configured in pipeline.toml");
        }
        let dir = tempfile::Builder::new()
            .prefix("bh-ssh")
            .tempdir()
            .context("Failed to create ssh control directory")?;
        let control = dir.path().join("master");

        let mut cmd = Command::new("ssh");
        self.common_options(&mut cmd, &control);
        cmd.arg("-M")
            .arg("-N")
            .arg("-f")
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-p")
            .arg(self.port.to_string())
            .arg(self.destination())
            .stdin(Stdio::null());

        let out = cmd.output().context("Failed to spawn ssh")?;
        if !out.status.success() {
            bail!(
                "could not connect to {}: {}",
                self.describe(),
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        self.control_dir = Some(dir);
        info!(remote = %self.describe(), "connected");
        Ok(())
    }

    fn exists(&mut self, path: &Utf8Path) -> Result<bool> {
        let out = self.shell(&format!("test -e {}", sh_quote(path.as_str())))?;
        Ok(out.status.success())
    }

    fn create_dir_all(&mut self, path: &Utf8Path) -> Result<()> {
        self.shell_ok(&format!("mkdir -p {}", sh_quote(path.as_str())))
    }

    fn upload_file(&mut self, local: &Path, remote: &Utf8Path) -> Result<()> {
        let batch = format!(
            "put {} {}\n",
            sftp_quote(&local.to_string_lossy()),
            sftp_quote(remote.as_str())
        );
        self.sftp_batch(&batch)
            .with_context(|| format!("upload {} -> {remote}", local.display()))
    }

    fn download_tree(&mut self, remote: &Utf8Path, local: &Path) -> Result<()> {
        let batch = format!(
            "get -r {} {}\n",
            sftp_quote(remote.as_str()),
            sftp_quote(&local.to_string_lossy())
        );
        self.sftp_batch(&batch)
            .with_context(|| format!("download {remote} -> {}", local.display()))
    }

    fn remove_tree(&mut self, path: &Utf8Path) -> Result<()> {
        if path.as_str().trim_matches('/').is_empty() {
            bail!("refusing to remove the remote root");
        }
        self.shell_ok(&format!("rm -rf {}", sh_quote(path.as_str())))
    }

    fn close(&mut self) -> Result<()> {
        let Some(dir) = self.control_dir.take() else {
            return Ok(());
        };
        let control = dir.path().join("master");
        let out = Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", control.display()))
            .arg("-O")
            .arg("exit")
            .arg(self.destination())
            .stdin(Stdio::null())
            .output()
            .context("Failed to spawn ssh")?;
        if !out.status.success() {
            warn!(
                remote = %self.describe(),
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "master connection did not exit cleanly"
            );
        }
        debug!(remote = %self.describe(), "disconnected");
        Ok(())
    }
}

impl Drop for SshRemote {
    fn drop(&mut self) {
        if self.control_dir.is_some() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quoting_survives_single_quotes() {
        assert_eq!(sh_quote("/srv/app"), "'/srv/app'");
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn sftp_quoting_escapes_quotes_and_backslashes() {
        assert_eq!(sftp_quote("a b/c.js"), "\"a b/c.js\"");
        assert_eq!(sftp_quote(r#"x"y\z"#), r#""x\"y\\z""#);
    }

    #[test]
    fn describe_and_unopened_use() {
        let cfg = RemoteConfig {
            host: "example.org".into(),
            user: Some("deploy".into()),
            port: 2222,
            ..RemoteConfig::default()
        };
        let mut r = SshRemote::new(&cfg, None);
        assert_eq!(r.describe(), "deploy@example.org:2222");
        assert!(r.exists(Utf8Path::new("/srv")).is_err());
        // Closing a never-opened connection is a no-op
        r.close().unwrap();
    }

    #[test]
    fn open_without_host_fails_fast() {
        let mut r = SshRemote::new(&RemoteConfig::default(), None);
        assert!(r.open().is_err());
    }
}
