//! Filepath: src/infra/utils.rs
//! Small helpers shared by the report views.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::{OwoColorize, Style};

use crate::cli::AppContext;

/// Byte-size formatting helpers
pub struct SizeUtils;

impl SizeUtils {
    /// Human-readable binary size: `512 B`, `1.5 KiB`, `3.2 MiB`
    pub fn human(bytes: u64) -> String {
        const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
        if bytes < 1024 {
            return format!("{bytes} B");
        }
        let mut value = bytes as f64 / 1024.0;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Path helpers for the `/`-separated form used in manifests and remotes
pub struct PathUtils;

impl PathUtils {
    /// Relative path with forward slashes regardless of platform
    pub fn to_slash(path: &Path) -> String {
        path.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Lower-cased extension without the dot, or "" for none
    pub fn extension(path: &str) -> String {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default()
    }
}

/// Terminal styling that honors `--no-color`
pub struct Paint;

impl Paint {
    fn apply(ctx: &AppContext, text: &str, style: Style) -> String {
        if ctx.no_color {
            text.to_string()
        } else {
            text.style(style).to_string()
        }
    }

    pub fn ok(ctx: &AppContext, text: &str) -> String {
        Self::apply(ctx, text, Style::new().green().bold())
    }

    pub fn warn(ctx: &AppContext, text: &str) -> String {
        Self::apply(ctx, text, Style::new().yellow())
    }

    pub fn fail(ctx: &AppContext, text: &str) -> String {
        Self::apply(ctx, text, Style::new().red().bold())
    }

    pub fn dim(ctx: &AppContext, text: &str) -> String {
        Self::apply(ctx, text, Style::new().dimmed())
    }
}

/// Progress bars that disappear under `--quiet`
pub struct Progress;

impl Progress {
    fn styled(len: u64, template: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }

    /// Item counter, e.g. minified files
    pub fn count(ctx: &AppContext, len: u64) -> ProgressBar {
        if ctx.quiet {
            return ProgressBar::hidden();
        }
        Self::styled(
            len,
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
    }

    /// Byte counter for uploads
    pub fn bytes(ctx: &AppContext, total: u64) -> ProgressBar {
        if ctx.quiet {
            return ProgressBar::hidden();
        }
        Self::styled(
            total,
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(SizeUtils::human(0), "0 B");
        assert_eq!(SizeUtils::human(1023), "1023 B");
        assert_eq!(SizeUtils::human(1536), "1.5 KiB");
        assert_eq!(SizeUtils::human(5 * 1024 * 1024), "5.0 MiB");
    }

    #[test]
    fn slash_paths_and_extensions() {
        let p = Path::new("img").join("icons").join("icon-192x192.PNG");
        assert_eq!(PathUtils::to_slash(&p), "img/icons/icon-192x192.PNG");
        assert_eq!(PathUtils::extension("img/icons/icon-192x192.PNG"), "png");
        assert_eq!(PathUtils::extension("LICENSE"), "");
    }

    #[test]
    fn no_color_leaves_text_plain() {
        let ctx = AppContext {
            quiet: false,
            no_color: true,
            dry_run: false,
            project_dir: ".".into(),
        };
        assert_eq!(Paint::ok(&ctx, "done"), "done");
    }
}
