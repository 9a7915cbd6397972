//! Stage tree executor

use colored::Colorize;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::console::{plural, rule, stamp};
use crate::error::{PipelineError, Result};
use crate::execution::parallel::join_stages;
use crate::globs;
use crate::graph::Stage;
use crate::registry::TaskRegistry;
use crate::sink::OutputSink;
use crate::task::{Task, TaskResult};

/// Options for running tasks
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Number of transforms allowed to run at once
    pub workers: usize,
    /// Give up on a task after this long
    pub task_timeout: Option<Duration>,
    /// Print per-task start lines and skipped tasks
    pub verbose: bool,
}

/// Available parallelism, or 4 when it cannot be determined
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_timeout: None,
            verbose: true,
        }
    }
}

/// Everything a build run needs, shared by the executor and the watcher.
pub struct BuildContext {
    pub registry: TaskRegistry,
    pub source_dir: PathBuf,
    pub sink: OutputSink,
    pub options: RunOptions,
}

impl BuildContext {
    pub fn new(registry: TaskRegistry, source_dir: PathBuf, sink: OutputSink) -> Self {
        Self {
            registry,
            source_dir,
            sink,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }
}

/// A single build run over a stage tree.
///
/// Create one per invocation; results accumulate until it is dropped.
pub struct Executor {
    ctx: Arc<BuildContext>,
    run_id: String,
    started: Instant,
    semaphore: Arc<Semaphore>,
    results: Mutex<Vec<TaskResult>>,
}

impl Executor {
    pub fn new(ctx: Arc<BuildContext>) -> Self {
        let workers = ctx.options.workers.max(1);
        Self {
            ctx,
            run_id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            semaphore: Arc::new(Semaphore::new(workers)),
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run a stage, returning every path written by its tasks.
    pub fn run<'a>(&'a self, stage: &'a Stage) -> BoxFuture<'a, Result<BTreeSet<PathBuf>>> {
        async move {
            match stage {
                Stage::Task(name) => self.run_task(name).await,
                Stage::Clean => {
                    println!(
                        "{} {} {}",
                        stamp(),
                        "Cleaning".bold(),
                        self.ctx.sink.root().display()
                    );
                    self.ctx.sink.clean().await?;
                    Ok(BTreeSet::new())
                }
                Stage::Serial(children) => {
                    let mut outputs = BTreeSet::new();
                    for child in children {
                        outputs.extend(self.run(child).await?);
                    }
                    Ok(outputs)
                }
                Stage::Parallel(children) => {
                    join_stages(children.iter().map(|child| self.run(child))).await
                }
            }
        }
        .boxed()
    }

    async fn run_task(&self, name: &str) -> Result<BTreeSet<PathBuf>> {
        let task = self.ctx.registry.resolve(name)?;

        if self.ctx.options.verbose {
            println!("{} Starting '{}'...", stamp(), name.cyan());
        }

        let started = Instant::now();
        let outcome = self.execute(task).await;
        let duration_ms = started.elapsed().as_millis();

        let (success, outputs) = match &outcome {
            Ok(Some(paths)) => (true, paths.len()),
            Ok(None) => (true, 0),
            Err(_) => (false, 0),
        };

        match &outcome {
            Ok(Some(paths)) => println!(
                "{} {} '{}' after {}ms ({})",
                stamp(),
                "Finished".green(),
                name.cyan(),
                duration_ms,
                plural(paths.len(), "file").dimmed()
            ),
            Ok(None) => {
                if self.ctx.options.verbose {
                    println!(
                        "{} {} '{}' (no input files)",
                        stamp(),
                        "Skipped".dimmed(),
                        name.cyan()
                    );
                }
            }
            Err(e) => eprintln!(
                "{} {} '{}' after {}ms: {}",
                stamp(),
                "✗ Failed".red().bold(),
                name.cyan(),
                duration_ms,
                e
            ),
        }

        if let Ok(mut results) = self.results.lock() {
            results.push(TaskResult {
                name: name.to_string(),
                success,
                duration_ms,
                outputs,
            });
        }

        outcome.map(|paths| paths.map(|p| p.into_iter().collect()).unwrap_or_default())
    }

    /// Expand the task's inputs and run its action on a blocking worker.
    /// `None` means the input set was empty and the action was not invoked.
    async fn execute(&self, task: Arc<Task>) -> Result<Option<Vec<PathBuf>>> {
        let name = task.name.clone();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::task(&name, e.into()))?;

        let ctx = self.ctx.clone();
        let handle = tokio::task::spawn_blocking(move || -> Result<Option<Vec<PathBuf>>> {
            let files = globs::expand(
                &ctx.source_dir,
                &task.inputs,
                &task.excludes,
                task.base.as_deref(),
            )?;
            if files.is_empty() {
                return Ok(None);
            }

            let out = ctx.sink.scoped(&task.out_dir)?;
            task.action
                .run(&files, &out)
                .map(Some)
                .map_err(|e| PipelineError::task(&task.name, e))
        });

        // Dropped on return, timeout included; an abandoned transform then
        // runs outside the worker limit
        let _permit = permit;

        let joined = match self.ctx.options.task_timeout {
            Some(limit) => tokio::time::timeout(limit, handle)
                .await
                .map_err(|_| PipelineError::Timeout {
                    task: name.clone(),
                    after: limit,
                })?,
            None => handle.await,
        };

        joined.map_err(|e| PipelineError::Task {
            task: name,
            message: format!("worker panicked: {}", e),
        })?
    }

    pub fn results(&self) -> Vec<TaskResult> {
        self.results
            .lock()
            .map(|results| results.clone())
            .unwrap_or_default()
    }

    pub fn print_header(&self, stage: &Stage) {
        println!(
            "\n{} {} {}\n",
            "→".blue(),
            format!("Run {}:", &self.run_id[..8]).bold(),
            stage.to_string().dimmed()
        );
    }

    pub fn print_summary(&self, outcome: &Result<BTreeSet<PathBuf>>) {
        let results = self.results();
        let total_time = self.started.elapsed().as_millis();

        println!("{}", rule());

        match outcome {
            Ok(outputs) => println!(
                "{} {} completed, {} written ({}ms)",
                "✓".green().bold(),
                plural(results.len(), "task"),
                plural(outputs.len(), "file"),
                total_time
            ),
            Err(err) => {
                let failures = err.failures();
                println!(
                    "{} {} failed ({}ms)",
                    "✗".red().bold(),
                    plural(failures.len(), "task"),
                    total_time
                );
                println!("\n{}", "Failures:".red());
                for failure in failures {
                    println!("  {} {}", "•".red(), failure);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::globs::SourceFile;
    use crate::graph::{clean, parallel, serial, task};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Copies inputs into the sink with a new extension, recording the call.
    fn recording(name: &'static str, ext: &'static str, calls: Calls) -> Task {
        Task::new(name, move |files: &[SourceFile], out: &OutputSink| -> anyhow::Result<Vec<PathBuf>> {
            calls.lock().unwrap().push(name.to_string());
            let mut written = Vec::new();
            for file in files {
                let content = fs::read(&file.path)?;
                written.push(out.write(file.relative().with_extension(ext), content)?);
            }
            Ok(written)
        })
    }

    fn failing(name: &'static str, calls: Calls) -> Task {
        Task::new(name, move |_: &[SourceFile], _: &OutputSink| -> anyhow::Result<Vec<PathBuf>> {
            calls.lock().unwrap().push(name.to_string());
            anyhow::bail!("{} exploded", name)
        })
    }

    fn context(dir: &TempDir, tasks: Vec<Task>) -> Arc<BuildContext> {
        let mut registry = TaskRegistry::new();
        for t in tasks {
            registry.register(t).unwrap();
        }
        Arc::new(BuildContext::new(
            registry,
            dir.path().join("source"),
            OutputSink::new(dir.path().join("build")),
        ))
    }

    #[tokio::test]
    async fn test_serial_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/a.txt", "a");
        let calls: Calls = Arc::default();
        let ctx = context(
            &dir,
            vec![
                failing("a", calls.clone()).inputs(["*.txt"]),
                recording("b", "out", calls.clone()).inputs(["*.txt"]),
            ],
        );

        let executor = Executor::new(ctx);
        let err = executor.run(&serial([task("a"), task("b")])).await.unwrap_err();

        assert_eq!(err.task_name(), Some("a"));
        assert_eq!(*calls.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_parallel_failure_still_runs_sibling() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/page.html", "<p>hi</p>");
        let calls: Calls = Arc::default();
        let ctx = context(
            &dir,
            vec![
                failing("a", calls.clone()).inputs(["*.html"]),
                recording("b", "min.html", calls.clone()).inputs(["*.html"]),
            ],
        );

        let executor = Executor::new(ctx);
        let err = executor
            .run(&parallel([task("a"), task("b")]))
            .await
            .unwrap_err();

        assert_eq!(err.task_name(), Some("a"));
        let mut seen = calls.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
        assert!(dir.path().join("build/page.min.html").exists());

        let results = executor.results();
        assert_eq!(results.iter().filter(|r| r.success).count(), 1);
    }

    #[tokio::test]
    async fn test_empty_input_skips_action() {
        let dir = TempDir::new().unwrap();
        let calls: Calls = Arc::default();
        let ctx = context(&dir, vec![failing("scripts", calls.clone()).inputs(["js/*.js"])]);

        let outputs = Executor::new(ctx).run(&task("scripts")).await.unwrap();

        assert!(outputs.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parallel_styles_and_html_both_produce_outputs() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/sass/style.scss", "a { color: red }");
        touch(dir.path(), "source/index.html", "<html></html>");
        let calls: Calls = Arc::default();
        let ctx = context(
            &dir,
            vec![
                recording("styles", "css", calls.clone())
                    .inputs(["sass/*.scss"])
                    .out_dir("css"),
                recording("html", "html", calls.clone()).inputs(["*.html"]),
            ],
        );

        let outputs = Executor::new(ctx)
            .run(&parallel([task("styles"), task("html")]))
            .await
            .unwrap();

        let build = dir.path().join("build");
        assert!(outputs.contains(&build.join("css/style.css")));
        assert!(outputs.contains(&build.join("index.html")));
        assert_eq!(outputs.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_task_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, vec![]);
        let err = Executor::new(ctx).run(&task("sprite")).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTask(_)));
    }

    #[tokio::test]
    async fn test_clean_runs_before_later_stages() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "build/stale.css", "old");
        touch(dir.path(), "source/index.html", "<p></p>");
        let calls: Calls = Arc::default();
        let ctx = context(&dir, vec![recording("html", "html", calls).inputs(["*.html"])]);

        Executor::new(ctx)
            .run(&serial([clean(), task("html")]))
            .await
            .unwrap();

        assert!(!dir.path().join("build/stale.css").exists());
        assert!(dir.path().join("build/index.html").exists());
    }

    #[tokio::test]
    async fn test_task_timeout() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/slow.txt", "z");
        let slow = Task::new("slow", |_: &[SourceFile], _: &OutputSink| -> anyhow::Result<Vec<PathBuf>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        })
        .inputs(["*.txt"]);

        let mut registry = TaskRegistry::new();
        registry.register(slow).unwrap();
        let ctx = BuildContext::new(
            registry,
            dir.path().join("source"),
            OutputSink::new(dir.path().join("build")),
        )
        .with_options(RunOptions {
            task_timeout: Some(Duration::from_millis(20)),
            ..RunOptions::default()
        });

        let err = Executor::new(Arc::new(ctx)).run(&task("slow")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_timed_out_task_frees_its_worker() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/x.txt", "x");
        let calls: Calls = Arc::default();

        let hung = Task::new("hung", |_: &[SourceFile], _: &OutputSink| -> anyhow::Result<Vec<PathBuf>> {
            std::thread::sleep(Duration::from_millis(800));
            Ok(Vec::new())
        })
        .inputs(["*.txt"]);

        let mut registry = TaskRegistry::new();
        registry.register(hung).unwrap();
        registry
            .register(recording("quick", "out", calls.clone()).inputs(["*.txt"]))
            .unwrap();
        let ctx = BuildContext::new(
            registry,
            dir.path().join("source"),
            OutputSink::new(dir.path().join("build")),
        )
        .with_options(RunOptions {
            workers: 1,
            task_timeout: Some(Duration::from_millis(50)),
            ..RunOptions::default()
        });

        let started = Instant::now();
        let err = Executor::new(Arc::new(ctx))
            .run(&parallel([task("hung"), task("quick")]))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(matches!(err, PipelineError::Timeout { ref task, .. } if task == "hung"));
        assert_eq!(*calls.lock().unwrap(), vec!["quick"]);
        assert!(dir.path().join("build/x.out").exists());
    }

    #[test]
    fn test_default_workers_match_config() {
        assert_eq!(RunOptions::default().workers, crate::config::Config::default().workers());
    }

    #[tokio::test]
    async fn test_worker_limit_is_respected() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "source/x.txt", "x");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut registry = TaskRegistry::new();
        for name in ["a", "b", "c"] {
            let running = running.clone();
            let peak = peak.clone();
            let t = Task::new(name, move |_: &[SourceFile], _: &OutputSink| -> anyhow::Result<Vec<PathBuf>> {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            })
            .inputs(["*.txt"]);
            registry.register(t).unwrap();
        }
        let ctx = BuildContext::new(
            registry,
            dir.path().join("source"),
            OutputSink::new(dir.path().join("build")),
        )
        .with_options(RunOptions {
            workers: 1,
            ..RunOptions::default()
        });

        Executor::new(Arc::new(ctx))
            .run(&parallel([task("a"), task("b"), task("c")]))
            .await
            .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
