//! File watcher for selective rebuilds
//!
//! Filesystem events are fed into a channel; the controller debounces them,
//! re-runs only the tasks whose rules matched and then notifies live-reload
//! clients according to each rule's policy.

use anyhow::{Context, Result};
use colored::Colorize;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::console::stamp;
use crate::execution::{BuildContext, Executor};
use crate::globs::{glob_base, PatternSet};
use crate::graph::{serial, task};
use crate::server::LiveReload;

/// What connected browsers are told after a rule's tasks ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPolicy {
    /// Reload the page, whether the tasks succeeded or not
    FullReload,
    /// Push the rebuilt stylesheets on success
    InjectCss,
    /// Rebuild only
    None,
}

#[derive(Debug, Clone)]
pub struct WatchRule {
    pub globs: Vec<String>,
    pub tasks: Vec<String>,
    pub reload: ReloadPolicy,
}

impl WatchRule {
    pub fn new<G, T>(globs: G, tasks: T, reload: ReloadPolicy) -> Self
    where
        G: IntoIterator,
        G::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            globs: globs.into_iter().map(Into::into).collect(),
            tasks: tasks.into_iter().map(Into::into).collect(),
            reload,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Triggered,
    Running,
    Stopped,
}

struct CompiledRule {
    rule: WatchRule,
    patterns: PatternSet,
}

pub struct WatchController {
    ctx: Arc<BuildContext>,
    rules: Vec<CompiledRule>,
    debounce: Duration,
    live_reload: LiveReload,
    state: WatchState,
}

impl WatchController {
    pub fn new(
        ctx: Arc<BuildContext>,
        rules: Vec<WatchRule>,
        debounce: Duration,
        live_reload: LiveReload,
    ) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let patterns = PatternSet::new(&ctx.source_dir, &rule.globs)?;
                Ok(CompiledRule { rule, patterns })
            })
            .collect::<crate::error::Result<Vec<_>>>()?;

        Ok(Self {
            ctx,
            rules,
            debounce,
            live_reload,
            state: WatchState::Idle,
        })
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Distinct literal roots of all watched globs
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let roots: BTreeSet<PathBuf> = self
            .rules
            .iter()
            .flat_map(|c| c.rule.globs.iter())
            .map(|g| self.ctx.source_dir.join(glob_base(g)))
            .collect();
        roots.into_iter().collect()
    }

    /// Register one recursive watch per glob root.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    pub fn start(&mut self) -> Result<(RecommendedWatcher, UnboundedReceiver<PathBuf>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            },
            notify::Config::default(),
        )?;

        for root in self.watch_roots() {
            if !root.exists() {
                println!(
                    "{} {} {}",
                    stamp(),
                    "Not watching missing directory".dimmed(),
                    root.display()
                );
                continue;
            }
            watcher
                .watch(&root, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", root.display()))?;
        }

        self.state = WatchState::Watching;
        println!(
            "\n{} {} {}\n",
            "👀".cyan(),
            "Watching for changes in".bold(),
            self.ctx.source_dir.display()
        );

        Ok((watcher, rx))
    }

    /// Indices of rules matching any of `paths`, in rule order.
    pub fn matching_rules(&self, paths: &[PathBuf]) -> Vec<usize> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, c)| paths.iter().any(|p| c.patterns.matches(p)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Consume change events until the channel closes.
    pub async fn run(&mut self, mut events: UnboundedReceiver<PathBuf>) {
        self.state = WatchState::Watching;

        while let Some(first) = events.recv().await {
            let mut changed = vec![first];
            let closed = self.collect_burst(&mut events, &mut changed).await;

            let matched = self.matching_rules(&changed);
            if !matched.is_empty() {
                self.state = WatchState::Triggered;
                self.print_changes(&changed);
                self.dispatch(&matched).await;
            }

            self.state = WatchState::Watching;
            if closed {
                break;
            }
        }

        self.state = WatchState::Stopped;
    }

    /// Gather events until the debounce window passes quietly.
    /// Returns true when the channel closed meanwhile.
    async fn collect_burst(
        &self,
        events: &mut UnboundedReceiver<PathBuf>,
        changed: &mut Vec<PathBuf>,
    ) -> bool {
        loop {
            match tokio::time::timeout(self.debounce, events.recv()).await {
                Ok(Some(path)) => {
                    if !changed.contains(&path) {
                        changed.push(path);
                    }
                }
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }

    async fn dispatch(&mut self, matched: &[usize]) {
        self.state = WatchState::Running;
        let mut ran: HashSet<String> = HashSet::new();

        for &index in matched {
            let rule = &self.rules[index].rule;
            let tasks: Vec<_> = rule
                .tasks
                .iter()
                .filter(|name| ran.insert((*name).clone()))
                .map(task)
                .collect();
            if tasks.is_empty() {
                continue;
            }

            let stage = serial(tasks);
            let executor = Executor::new(self.ctx.clone());
            let outcome = executor.run(&stage).await;

            if let Err(ref e) = outcome {
                eprintln!("{} {} {}", stamp(), "✗".red(), e);
            }

            match rule.reload {
                ReloadPolicy::FullReload => {
                    println!("{} {} browsers", stamp(), "Reloading".yellow());
                    self.live_reload.reload();
                }
                ReloadPolicy::InjectCss => {
                    if let Ok(outputs) = outcome {
                        let sheets = stylesheet_urls(self.ctx.sink.root(), &outputs);
                        if !sheets.is_empty() {
                            println!("{} {} {}", stamp(), "Injecting".yellow(), sheets.join(", "));
                            self.live_reload.inject_css(sheets);
                        }
                    }
                }
                ReloadPolicy::None => {}
            }
        }

        println!("\n{}", "Watching for changes...".dimmed());
    }

    fn print_changes(&self, changed: &[PathBuf]) {
        let names: Vec<String> = changed
            .iter()
            .map(|p| {
                p.strip_prefix(&self.ctx.source_dir)
                    .unwrap_or(p.as_path())
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        println!(
            "\n{} {} {} {}",
            stamp(),
            "↻".yellow(),
            "Files changed:".bold(),
            names.join(", ").dimmed()
        );
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        // Metadata-only changes would retrigger on every touch
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Server URLs of the `.css` files among `outputs`
fn stylesheet_urls(build_root: &Path, outputs: &BTreeSet<PathBuf>) -> Vec<String> {
    outputs
        .iter()
        .filter(|p| p.extension().map(|e| e == "css").unwrap_or(false))
        .filter_map(|p| p.strip_prefix(build_root).ok())
        .map(|rel| format!("/{}", rel.to_string_lossy().replace('\\', "/")))
        .collect()
}
