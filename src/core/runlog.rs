//! Human-readable run log, newest entry first.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use indexmap::IndexMap;

use crate::core::manifest::ExtStat;
use crate::infra::utils::SizeUtils;

#[derive(Debug, Clone)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Local>,
    /// `build`, `release`, `backup+release`, `delete` or `rollback`
    pub operation: String,
    pub target: String,
    pub version: String,
    pub duration: Duration,
    pub uploaded: usize,
    pub bytes: u64,
    pub stats: IndexMap<String, ExtStat>,
    pub error: Option<String>,
}

impl RunLogEntry {
    pub fn render(&self) -> String {
        let mut out = format!(
            "== {} ==\noperation: {}\ntarget:    {}\nversion:   {}\nduration:  {:.2}s\nuploaded:  {} files ({})\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S %:z"),
            self.operation,
            self.target,
            self.version,
            self.duration.as_secs_f64(),
            self.uploaded,
            SizeUtils::human(self.bytes),
        );
        if !self.stats.is_empty() {
            out.push_str("files:\n");
            for (ext, s) in &self.stats {
                let ext = if ext.is_empty() { "(none)" } else { ext.as_str() };
                out.push_str(&format!("  {ext:<8} {:>5}  {}\n", s.count, SizeUtils::human(s.bytes)));
            }
        }
        match &self.error {
            Some(e) => out.push_str(&format!("error:     {e}\n")),
            None => out.push_str("status:    ok\n"),
        }
        out
    }
}

/// Prepend `entry` to the log at `path`, creating it if needed.
pub fn prepend(path: &Path, entry: &RunLogEntry) -> Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("read run log: {}", path.display())),
    };

    let mut text = entry.render();
    if !existing.is_empty() {
        text.push('\n');
        text.push_str(&existing);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp = path.with_extension("log.tmp");
    fs::write(&tmp, text).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("move run log into place: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(version: &str, error: Option<&str>) -> RunLogEntry {
        let mut stats = IndexMap::new();
        stats.insert("css".to_string(), ExtStat { count: 2, bytes: 2048 });
        stats.insert("js".to_string(), ExtStat { count: 1, bytes: 10 });
        RunLogEntry {
            timestamp: Local.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap(),
            operation: "release".into(),
            target: "local:/tmp/deploy".into(),
            version: version.into(),
            duration: Duration::from_millis(1500),
            uploaded: 3,
            bytes: 2058,
            stats,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn render_lists_stats_and_status() {
        let text = entry("1.0.0.1", None).render();
        assert!(text.starts_with("== 2026-03-01 12:30:00"));
        assert!(text.contains("version:   1.0.0.1\n"));
        assert!(text.contains("duration:  1.50s\n"));
        assert!(text.contains("uploaded:  3 files (2.0 KiB)\n"));
        assert!(text.contains("  css          2  2.0 KiB\n"));
        assert!(text.ends_with("status:    ok\n"));

        let failed = entry("1.0.0.1", Some("connection reset")).render();
        assert!(failed.ends_with("error:     connection reset\n"));
    }

    #[test]
    fn newest_entry_comes_first() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("logs/birdhouse.log");

        prepend(&path, &entry("1.0.0.1", None)).unwrap();
        prepend(&path, &entry("1.0.0.2", None)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let first = text.find("1.0.0.2").unwrap();
        let second = text.find("1.0.0.1").unwrap();
        assert!(first < second);
        assert_eq!(text.matches("== ").count(), 2);
    }
}
