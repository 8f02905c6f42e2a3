//! Favicon, web-manifest icon and home-screen icon generation from one
//! square-ish source image.

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{
    DynamicImage, ExtendedColorType, ImageFormat,
    codecs::ico::{IcoEncoder, IcoFrame},
    imageops::FilterType,
};
use tracing::{info, instrument};

use crate::cli::{AppContext, IconsArgs};
use crate::infra::{
    config::{IconsConfig, PipelineConfig},
    project::Project,
    utils::Paint,
};

/// ICO frames are limited to 256 px
const ICO_MAX: u32 = 256;

/// Which icon families to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconKinds {
    pub favicons: bool,
    pub icons: bool,
    pub app_icons: bool,
}

impl IconKinds {
    pub const ALL: IconKinds = IconKinds {
        favicons: true,
        icons: true,
        app_icons: true,
    };
}

impl From<&IconsArgs> for IconKinds {
    fn from(args: &IconsArgs) -> Self {
        if args.all_unselected() {
            return IconKinds::ALL;
        }
        IconKinds {
            favicons: args.favicons,
            icons: args.icons,
            app_icons: args.app_icons,
        }
    }
}

/// (file name relative to the icon directory, edge length) for a selection
pub fn plan(cfg: &IconsConfig, kinds: IconKinds) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    if kinds.favicons {
        out.extend(cfg.favicon_sizes.iter().map(|&n| (format!("favicon-{n}x{n}.png"), n)));
    }
    if kinds.icons {
        out.extend(cfg.icon_sizes.iter().map(|&n| (format!("icon-{n}x{n}.png"), n)));
    }
    if kinds.app_icons {
        out.extend(cfg.app_icon_sizes.iter().map(|&n| (format!("apple-touch-icon-{n}.png"), n)));
    }
    out
}

/// Render every selected icon. `favicon_ico` receives the multi-size ICO.
/// Returns the written paths in generation order.
#[instrument(skip(cfg), fields(source = %source.display()))]
pub fn generate(
    source: &Path,
    out_dir: &Path,
    favicon_ico: &Path,
    cfg: &IconsConfig,
    kinds: IconKinds,
) -> Result<Vec<PathBuf>> {
    if !source.is_file() {
        anyhow::bail!("icon source image not found: {}", source.display());
    }
    let img = image::open(source).with_context(|| format!("decode {}", source.display()))?;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("create icon dir: {}", out_dir.display()))?;

    let mut written = Vec::new();
    for (name, size) in plan(cfg, kinds) {
        let path = out_dir.join(name);
        square(&img, size)
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("write {}", path.display()))?;
        written.push(path);
    }

    if kinds.favicons {
        write_ico(&img, &cfg.favicon_sizes, favicon_ico)?;
        written.push(favicon_ico.to_path_buf());
    }

    info!(count = written.len(), "icons generated");
    Ok(written)
}

/// Center-cropped square at `size`
fn square(img: &DynamicImage, size: u32) -> DynamicImage {
    img.resize_to_fill(size, size, FilterType::Lanczos3)
}

fn write_ico(img: &DynamicImage, sizes: &[u32], dest: &Path) -> Result<()> {
    let mut frames = Vec::new();
    for &size in sizes.iter().filter(|s| **s > 0 && **s <= ICO_MAX) {
        let rgba = square(img, size).to_rgba8();
        let frame = IcoFrame::as_png(rgba.as_raw(), size, size, ExtendedColorType::Rgba8)
            .with_context(|| format!("encode {size}px favicon frame"))?;
        frames.push(frame);
    }
    if frames.is_empty() {
        anyhow::bail!("no favicon size fits an ICO frame (1-{ICO_MAX} px)");
    }

    let mut buf = Cursor::new(Vec::new());
    IcoEncoder::new(&mut buf)
        .encode_images(&frames)
        .context("encode favicon.ico")?;
    fs::write(dest, buf.into_inner()).with_context(|| format!("write {}", dest.display()))?;
    Ok(())
}

/// `icons` command
pub fn run(args: IconsArgs, ctx: &AppContext) -> Result<()> {
    let project = Project::open(&ctx.project_dir)?;
    let cfg = PipelineConfig::load(&project.pipeline_config_path())?;
    let kinds = IconKinds::from(&args);

    let source = project.resolve(&cfg.icons.source);
    let out_dir = project.resolve(&cfg.icons.output_dir);
    let favicon_ico = project.root().join("favicon.ico");

    if ctx.dry_run {
        for (name, _) in plan(&cfg.icons, kinds) {
            println!("Would write {}", out_dir.join(name).display());
        }
        if kinds.favicons {
            println!("Would write {}", favicon_ico.display());
        }
        return Ok(());
    }

    let written = generate(&source, &out_dir, &favicon_ico, &cfg.icons, kinds)?;
    if !ctx.quiet {
        for path in &written {
            let shown = path.strip_prefix(project.root()).unwrap_or(path);
            println!("{} {}", Paint::ok(ctx, "generated"), shown.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn small_cfg() -> IconsConfig {
        IconsConfig {
            favicon_sizes: vec![16, 32],
            icon_sizes: vec![72],
            app_icon_sizes: vec![120],
            ..IconsConfig::default()
        }
    }

    fn source(dir: &Path) -> PathBuf {
        let p = dir.join("icon.png");
        RgbaImage::from_pixel(300, 200, Rgba([0, 128, 255, 255])).save(&p).unwrap();
        p
    }

    #[test]
    fn no_selection_means_all() {
        let args = IconsArgs {
            favicons: false,
            icons: false,
            app_icons: false,
        };
        assert_eq!(IconKinds::from(&args), IconKinds::ALL);

        let args = IconsArgs {
            favicons: false,
            icons: true,
            app_icons: false,
        };
        let kinds = IconKinds::from(&args);
        assert!(kinds.icons && !kinds.favicons && !kinds.app_icons);
    }

    #[test]
    fn generates_square_pngs_and_ico() {
        let tmp = TempDir::new().unwrap();
        let src = source(tmp.path());
        let out = tmp.path().join("img/icons");
        let ico = tmp.path().join("favicon.ico");

        let written = generate(&src, &out, &ico, &small_cfg(), IconKinds::ALL).unwrap();

        assert_eq!(written.len(), 5);
        assert_eq!(image::image_dimensions(out.join("favicon-32x32.png")).unwrap(), (32, 32));
        assert_eq!(image::image_dimensions(out.join("icon-72x72.png")).unwrap(), (72, 72));
        assert!(out.join("apple-touch-icon-120.png").is_file());

        let bytes = fs::read(&ico).unwrap();
        // ICONDIR: reserved 0, type 1, two images
        assert_eq!(&bytes[..6], &[0, 0, 1, 0, 2, 0]);
    }

    #[test]
    fn only_selected_family_is_written() {
        let tmp = TempDir::new().unwrap();
        let src = source(tmp.path());
        let out = tmp.path().join("icons");
        let ico = tmp.path().join("favicon.ico");
        let kinds = IconKinds {
            favicons: false,
            icons: false,
            app_icons: true,
        };

        let written = generate(&src, &out, &ico, &small_cfg(), kinds).unwrap();

        assert_eq!(written, vec![out.join("apple-touch-icon-120.png")]);
        assert!(!ico.exists());
    }

    #[test]
    fn missing_source_is_reported() {
        let tmp = TempDir::new().unwrap();
        let err = generate(
            &tmp.path().join("nope.png"),
            tmp.path(),
            &tmp.path().join("favicon.ico"),
            &small_cfg(),
            IconKinds::ALL,
        )
        .unwrap_err();
        assert!(err.to_string().contains("icon source image not found"));
    }
}
