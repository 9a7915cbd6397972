//! The site pipeline: built-in tasks, the `build` and `default` stage
//! trees, and the watch rules used in development.

use crate::actions::{
    CompileSass, ConvertWebp, CopyFiles, MinifyHtml, MinifyJs, OptimizeImages, SvgSprite,
};
use crate::config::Config;
use crate::error::Result;
use crate::graph::{clean, parallel, serial, task, Stage};
use crate::registry::TaskRegistry;
use crate::task::Task;
use crate::watcher::{ReloadPolicy, WatchRule};

pub const HTML: &str = "html";
pub const STYLES: &str = "styles";
pub const SCRIPTS: &str = "scripts";
pub const OPTIMIZE_IMAGES: &str = "optimize-images";
pub const COPY_IMAGES: &str = "copy-images";
pub const CREATE_WEBP: &str = "create-webp";
pub const COPY: &str = "copy";
pub const SPRITE: &str = "sprite";

const IMAGES: &str = "img/**/*.{jpg,png,svg}";
const SPRITE_ICONS: &str = "img/icons/sprite/*.svg";

/// Register every built-in task. Globs are relative to the source directory,
/// output directories to the build directory.
pub fn register_defaults(registry: &mut TaskRegistry, config: &Config) -> Result<()> {
    registry.register(Task::new(HTML, MinifyHtml).inputs(["*.html"]))?;

    registry.register(
        Task::new(STYLES, CompileSass::new(config.tools.sass.clone()))
            .inputs(["sass/style.scss"])
            .out_dir("css"),
    )?;

    registry.register(Task::new(SCRIPTS, MinifyJs).inputs(["js/*.js"]).out_dir("js"))?;

    registry.register(
        Task::new(OPTIMIZE_IMAGES, OptimizeImages)
            .inputs([IMAGES])
            .excludes([SPRITE_ICONS])
            .out_dir("img"),
    )?;

    registry.register(
        Task::new(COPY_IMAGES, CopyFiles)
            .inputs([IMAGES])
            .excludes([SPRITE_ICONS])
            .out_dir("img"),
    )?;

    registry.register(
        Task::new(CREATE_WEBP, ConvertWebp)
            .inputs(["img/**/*.{jpg,png}"])
            .excludes(["img/background/*.{jpg,png}"])
            .out_dir("img"),
    )?;

    registry.register(
        Task::new(COPY, CopyFiles)
            .inputs(["fonts/*.{woff2,woff}", "*.ico", "*.webmanifest"])
            .excludes(["img/icons/*.svg"])
            .base(""),
    )?;

    registry.register(
        Task::new(SPRITE, SvgSprite::default())
            .inputs([SPRITE_ICONS])
            .out_dir("img"),
    )?;

    Ok(())
}

pub fn default_registry(config: &Config) -> Result<TaskRegistry> {
    let mut registry = TaskRegistry::new();
    register_defaults(&mut registry, config)?;
    Ok(registry)
}

fn assets() -> Stage {
    parallel([
        task(STYLES),
        task(HTML),
        task(SCRIPTS),
        task(CREATE_WEBP),
        task(SPRITE),
    ])
}

/// Production build: images are recompressed.
pub fn build() -> Stage {
    serial([clean(), task(COPY), task(OPTIMIZE_IMAGES), assets()])
}

/// Development build run before serving: images are copied as-is.
pub fn develop() -> Stage {
    serial([clean(), task(COPY), task(COPY_IMAGES), assets()])
}

/// HTML changes reload the page, stylesheet changes are injected, script
/// changes only rebuild.
pub fn watch_rules() -> Vec<WatchRule> {
    vec![
        WatchRule::new(["sass/**/*.scss"], [STYLES], ReloadPolicy::InjectCss),
        WatchRule::new(["js/*.js"], [SCRIPTS], ReloadPolicy::None),
        WatchRule::new(["*.html"], [HTML], ReloadPolicy::FullReload),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{BuildContext, Executor};
    use crate::sink::OutputSink;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn files_under(root: &Path) -> Vec<std::path::PathBuf> {
        let mut found = Vec::new();
        let Ok(entries) = fs::read_dir(root) else {
            return found;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                found.extend(files_under(&path));
            } else {
                found.push(path);
            }
        }
        found
    }

    #[test]
    fn test_every_stage_task_is_registered() {
        let registry = default_registry(&Config::default()).unwrap();
        for stage in [build(), develop()] {
            for name in stage.task_names() {
                assert!(registry.contains(name), "missing task {}", name);
            }
        }
        for rule in watch_rules() {
            for name in &rule.tasks {
                assert!(registry.contains(name), "missing task {}", name);
            }
        }
    }

    #[test]
    fn test_build_order() {
        assert_eq!(
            build().to_string(),
            "clean -> copy -> optimize-images -> {styles | html | scripts | create-webp | sprite}"
        );
        assert_eq!(develop().task_names()[1], COPY_IMAGES);
    }

    #[tokio::test]
    async fn test_build_on_empty_source_tree_succeeds() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("source")).unwrap();
        let registry = default_registry(&Config::default()).unwrap();
        let ctx = Arc::new(BuildContext::new(
            registry,
            dir.path().join("source"),
            OutputSink::new(dir.path().join("build")),
        ));

        let outputs = Executor::new(ctx).run(&build()).await.unwrap();

        assert!(outputs.is_empty());
        assert!(files_under(&dir.path().join("build")).is_empty());
    }

    #[tokio::test]
    async fn test_copy_preserves_paths_below_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        fs::create_dir_all(source.join("fonts")).unwrap();
        fs::create_dir_all(source.join("img/icons")).unwrap();
        fs::write(source.join("fonts/inter.woff2"), b"font").unwrap();
        fs::write(source.join("favicon.ico"), b"ico").unwrap();
        fs::write(source.join("site.webmanifest"), b"{}").unwrap();
        fs::write(source.join("img/icons/menu.svg"), b"<svg/>").unwrap();

        let registry = default_registry(&Config::default()).unwrap();
        let ctx = Arc::new(BuildContext::new(
            registry,
            source,
            OutputSink::new(dir.path().join("build")),
        ));

        Executor::new(ctx).run(&task(COPY)).await.unwrap();

        let build = dir.path().join("build");
        let mut copied = files_under(&build);
        copied.sort();
        assert_eq!(
            copied,
            vec![
                build.join("favicon.ico"),
                build.join("fonts/inter.woff2"),
                build.join("site.webmanifest"),
            ]
        );
    }

    #[tokio::test]
    async fn test_webp_skips_background_images() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        for rel in ["img/photos/hero.png", "img/background/sky.png"] {
            let path = source.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
                .save(&path)
                .unwrap();
        }

        let registry = default_registry(&Config::default()).unwrap();
        let ctx = Arc::new(BuildContext::new(
            registry,
            source,
            OutputSink::new(dir.path().join("build")),
        ));

        Executor::new(ctx).run(&task(CREATE_WEBP)).await.unwrap();

        let build = dir.path().join("build");
        assert_eq!(files_under(&build), vec![build.join("img/photos/hero.webp")]);
    }
}
