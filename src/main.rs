use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetflow::config::Config;
use assetflow::graph::{clean, task, Stage};
use assetflow::pipeline;
use assetflow::server::{self, LiveReload};
use assetflow::watcher::{ReloadPolicy, WatchController};
use assetflow::{BuildContext, Executor, OutputSink, RunOptions};

const CONFIG_FILE: &str = "assetflow.toml";

#[derive(Parser)]
#[command(name = "assetflow")]
#[command(about = "Static site asset pipeline with watch mode and live reload")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (default: assetflow.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete the build directory
    Clean,
    /// Minify HTML pages
    Html,
    /// Compile and compress stylesheets
    Styles,
    /// Minify scripts
    Scripts,
    /// Recompress images into the build directory
    OptimizeImages,
    /// Copy images as-is
    CopyImages,
    /// Create WebP versions of raster images
    CreateWebp,
    /// Copy fonts, favicon and manifest
    Copy,
    /// Assemble the SVG icon sprite
    Sprite,
    /// Production build
    Build,
    /// Development build, then serve and watch (the default)
    Default,
    /// List tasks and pipelines
    List,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let (config, base_dir) = load_config(cli.config)?;

    let stage = match cli.command.unwrap_or(Commands::Default) {
        Commands::List => return cmd_list(&config),
        Commands::Default => return cmd_default(&config, &base_dir),
        Commands::Clean => clean(),
        Commands::Html => task(pipeline::HTML),
        Commands::Styles => task(pipeline::STYLES),
        Commands::Scripts => task(pipeline::SCRIPTS),
        Commands::OptimizeImages => task(pipeline::OPTIMIZE_IMAGES),
        Commands::CopyImages => task(pipeline::COPY_IMAGES),
        Commands::CreateWebp => task(pipeline::CREATE_WEBP),
        Commands::Copy => task(pipeline::COPY),
        Commands::Sprite => task(pipeline::SPRITE),
        Commands::Build => pipeline::build(),
    };

    cmd_run(&config, &base_dir, stage)
}

/// An explicit `--config` must exist; the default file is optional.
fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let cwd = std::env::current_dir().context("Could not determine current directory")?;

    let (config_path, required) = match path {
        Some(path) => (path, true),
        None => (PathBuf::from(CONFIG_FILE), false),
    };

    if !required && !config_path.exists() {
        return Ok((Config::default(), cwd));
    }

    let config_path = std::fs::canonicalize(&config_path)
        .with_context(|| format!("Could not find config file: {}", config_path.display()))?;

    let base_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or(cwd);

    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;

    Ok((config, base_dir))
}

fn build_context(config: &Config, base_dir: &Path) -> Result<Arc<BuildContext>> {
    let registry = pipeline::default_registry(config)?;
    let sink = OutputSink::new(config.build_dir(base_dir)?);
    let options = RunOptions {
        workers: config.workers(),
        task_timeout: config.task_timeout(),
        verbose: true,
    };

    Ok(Arc::new(
        BuildContext::new(registry, config.source_dir(base_dir)?, sink).with_options(options),
    ))
}

#[tokio::main]
async fn cmd_run(config: &Config, base_dir: &Path, stage: Stage) -> Result<()> {
    let ctx = build_context(config, base_dir)?;
    let executor = Executor::new(ctx);

    executor.print_header(&stage);
    let outcome = executor.run(&stage).await;
    executor.print_summary(&outcome);

    if outcome.is_err() {
        std::process::exit(1);
    }

    Ok(())
}

#[tokio::main]
async fn cmd_default(config: &Config, base_dir: &Path) -> Result<()> {
    let ctx = build_context(config, base_dir)?;

    let stage = pipeline::develop();
    let executor = Executor::new(ctx.clone());
    executor.print_header(&stage);
    let outcome = executor.run(&stage).await;
    executor.print_summary(&outcome);
    if outcome.is_err() {
        std::process::exit(1);
    }

    let live_reload = LiveReload::new();
    let build_dir = ctx.sink.root().to_path_buf();
    let mut controller = WatchController::new(
        ctx,
        pipeline::watch_rules(),
        config.debounce(),
        live_reload.clone(),
    )?;
    // Dropping the watcher ends the event stream
    let (_watcher, events) = controller.start()?;

    tokio::select! {
        result = server::serve(&config.server, build_dir, live_reload) => {
            result?;
        }
        _ = controller.run(events) => {
            anyhow::bail!("File watcher stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n✓ Stopped via Ctrl+C");
        }
    }

    Ok(())
}

fn cmd_list(config: &Config) -> Result<()> {
    let registry = pipeline::default_registry(config)?;

    println!("\n{} {}\n", "📦".cyan(), "assetflow".bold());
    println!("{}", "Tasks:".bold());

    for task in registry.iter() {
        println!("  {} {}", "•".green(), task.name.cyan());
        println!("    {} {}", "action:".dimmed(), task.action.describe());
        println!("    {} {}", "inputs:".dimmed(), task.inputs.join(", "));

        if !task.excludes.is_empty() {
            println!("    {} {}", "excludes:".dimmed(), task.excludes.join(", "));
        }

        let out_dir = if task.out_dir.as_os_str().is_empty() {
            config.paths.build.clone()
        } else {
            format!("{}/{}", config.paths.build, task.out_dir.display())
        };
        println!("    {} {}", "output:".dimmed(), out_dir);

        println!();
    }

    println!("{}", "Pipelines:".bold());
    println!("  {} {}", "build:".cyan(), pipeline::build());
    println!("  {} {}", "default:".cyan(), pipeline::develop());

    println!("\n{}", "Watch:".bold());
    for rule in pipeline::watch_rules() {
        let reload = match rule.reload {
            ReloadPolicy::FullReload => "reload",
            ReloadPolicy::InjectCss => "inject css",
            ReloadPolicy::None => "none",
        };
        println!(
            "  {} {} {} {}",
            rule.globs.join(", "),
            "→".dimmed(),
            rule.tasks.join(", ").cyan(),
            format!("({})", reload).dimmed()
        );
    }

    Ok(())
}
