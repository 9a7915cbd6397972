use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::execution::default_workers;
use crate::globs::normalize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: Paths,
    pub run: Run,
    pub watch: Watch,
    pub server: Server,
    pub tools: Tools,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Directory holding the site sources
    pub source: String,
    /// Output directory, wiped by `clean`
    pub build: String,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            source: "source".to_string(),
            build: "build".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Run {
    /// Maximum number of transforms running at once
    pub workers: Option<usize>,
    /// Per-task timeout in seconds; tasks may run forever when unset
    pub task_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Watch {
    pub debounce_ms: u64,
}

impl Default for Watch {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Tools {
    /// Sass compiler executable
    pub sass: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            sass: "sass".to_string(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.run.workers == Some(0) {
            anyhow::bail!("run.workers must be at least 1");
        }
        if self.watch.debounce_ms == 0 {
            anyhow::bail!("watch.debounce_ms must be at least 1");
        }
        if self.paths.source.trim().is_empty() || self.paths.build.trim().is_empty() {
            anyhow::bail!("paths.source and paths.build must not be empty");
        }
        Ok(())
    }

    pub fn source_dir(&self, base_dir: &Path) -> Result<PathBuf> {
        resolve_path(base_dir, &self.paths.source)
    }

    pub fn build_dir(&self, base_dir: &Path) -> Result<PathBuf> {
        resolve_path(base_dir, &self.paths.build)
    }

    pub fn workers(&self) -> usize {
        self.run.workers.unwrap_or_else(default_workers)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.run.task_timeout_secs.map(Duration::from_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}

fn resolve_path(base_dir: &Path, raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path '{}'", raw))?;
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        Ok(normalize(&path))
    } else {
        Ok(normalize(&base_dir.join(path)))
    }
}
