// task_runner.rs - Parallel execution of independent tool tasks
// Purpose: One isolated worker per task, per-task timeout with forced
//          cancellation, channel-based result aggregation

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::Config;
use crate::progress::ProgressTracker;
use crate::task::{Target, Task};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("interrupted by user")]
    Interrupted,
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

/// Owns the spawned workers; whatever is still running when this goes away
/// is aborted, which kills its tool process.
struct Workers(Vec<Worker>);

impl Drop for Workers {
    fn drop(&mut self) {
        for worker in &self.0 {
            worker.handle.abort();
        }
    }
}

pub struct TaskRunner {
    per_task_timeout: Duration,
    progress: ProgressTracker,
}

impl TaskRunner {
    pub fn new(per_task_timeout: Duration, progress: ProgressTracker) -> Self {
        Self {
            per_task_timeout,
            progress,
        }
    }

    /// Run every task concurrently and return the sorted, deduplicated union
    /// of their results. Ctrl-C aborts the wait.
    pub async fn run_parallel(
        &self,
        tasks: Vec<Arc<dyn Task>>,
        target: &Target,
        config: &Arc<Config>,
        description: &str,
    ) -> Result<Vec<String>, RunnerError> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                // No signal handler available: never interrupt
                std::future::pending::<()>().await;
            }
        };
        self.run_parallel_until(tasks, target, config, description, interrupt).await
    }

    /// Same as [`run_parallel`](Self::run_parallel), with an explicit
    /// shutdown signal.
    ///
    /// Workers are joined one after another in submission order, each with
    /// its own `per_task_timeout` window starting when its join starts. A
    /// worker still running at the end of its window is aborted and
    /// contributes nothing.
    pub async fn run_parallel_until<F>(
        &self,
        tasks: Vec<Arc<dyn Task>>,
        target: &Target,
        config: &Arc<Config>,
        description: &str,
        shutdown: F,
    ) -> Result<Vec<String>, RunnerError>
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<String>>();

        let mut workers = Workers(Vec::with_capacity(tasks.len()));
        for task in tasks {
            let tx = tx.clone();
            let target = target.clone();
            let config = Arc::clone(config);
            let progress = self.progress.clone();
            let name = task.name().to_string();

            let handle = tokio::spawn(async move {
                match task.run(&target, &config).await {
                    Ok(Some(lines)) if !lines.is_empty() => {
                        let _ = tx.send(lines);
                    }
                    Ok(_) => {}
                    Err(e) => progress.tool_failed(task.name(), &format!("{:#}", e)),
                }
            });
            workers.0.push(Worker { name, handle });
        }
        drop(tx);

        let spinner = spinner(description);
        tokio::pin!(shutdown);

        for worker in workers.0.iter_mut() {
            tokio::select! {
                joined = timeout(self.per_task_timeout, &mut worker.handle) => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        // Panics stay inside the worker
                        self.progress.tool_failed(&worker.name, &format!("worker crashed: {}", e));
                    }
                    Err(_) => {
                        self.progress.tool_timed_out(&worker.name, self.per_task_timeout.as_secs());
                        worker.handle.abort();
                        let _ = (&mut worker.handle).await;
                    }
                },
                _ = &mut shutdown => {
                    spinner.finish_and_clear();
                    eprintln!("{}", format!("User interrupted. Terminating {}...", worker.name).red().bold());
                    worker.handle.abort();
                    let _ = (&mut worker.handle).await;
                    return Err(RunnerError::Interrupted);
                }
            }
        }
        spinner.finish_and_clear();

        let mut unique = BTreeSet::new();
        while let Ok(lines) = rx.try_recv() {
            unique.extend(lines);
        }
        let results: Vec<String> = unique.into_iter().collect();

        println!(
            "{}",
            format!("[+] All parallel tasks completed. Found {} unique results.", results.len())
                .green()
                .bold()
        );

        Ok(results)
    }
}

fn spinner(description: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(description.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ToolSpec;
    use crate::task::ToolTask;
    use crate::tools::SearchPath;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Instant;

    struct FixedTask {
        name: &'static str,
        lines: Vec<&'static str>,
        delay: Duration,
    }

    #[async_trait]
    impl Task for FixedTask {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, _target: &Target, _config: &Config) -> Result<Option<Vec<String>>> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(self.lines.iter().map(|l| l.to_string()).collect()))
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        fn name(&self) -> &str {
            "failing"
        }

        async fn run(&self, _target: &Target, _config: &Config) -> Result<Option<Vec<String>>> {
            anyhow::bail!("tool blew up")
        }
    }

    struct PanickingTask;

    #[async_trait]
    impl Task for PanickingTask {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn run(&self, _target: &Target, _config: &Config) -> Result<Option<Vec<String>>> {
            panic!("unexpected tool state")
        }
    }

    fn fixed(name: &'static str, lines: Vec<&'static str>, delay_ms: u64) -> Arc<dyn Task> {
        Arc::new(FixedTask {
            name,
            lines,
            delay: Duration::from_millis(delay_ms),
        })
    }

    fn runner(timeout_ms: u64) -> TaskRunner {
        TaskRunner::new(
            Duration::from_millis(timeout_ms),
            ProgressTracker::console_only("example.com".into()),
        )
    }

    async fn run(runner: &TaskRunner, tasks: Vec<Arc<dyn Task>>) -> Vec<String> {
        runner
            .run_parallel_until(
                tasks,
                &Target::new("example.com"),
                &Arc::new(Config::default()),
                "testing",
                std::future::pending::<()>(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_union_is_sorted_and_deduplicated() {
        let tasks = vec![
            fixed("subfinder", vec!["b.example.com", "a.example.com"], 30),
            fixed("assetfinder", vec!["b.example.com"], 0),
            fixed("findomain", vec![], 10),
        ];
        let results = run(&runner(2_000), tasks).await;
        assert_eq!(results, vec!["a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn test_timed_out_worker_contributes_nothing() {
        let started = Instant::now();
        let tasks = vec![
            fixed("subfinder", vec!["a.example.com", "b.example.com"], 10),
            fixed("assetfinder", vec!["b.example.com"], 20),
            fixed("findomain", vec!["late.example.com"], 30_000),
        ];
        let results = run(&runner(500), tasks).await;

        assert_eq!(results, vec!["a.example.com", "b.example.com"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_join_windows_are_sequential() {
        // "two" outlives the timeout from spawn, but its window only opens
        // once "one" has been joined
        let tasks = vec![fixed("one", vec!["a"], 400), fixed("two", vec!["b"], 700)];
        let results = run(&runner(500), tasks).await;
        assert_eq!(results, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_affect_siblings() {
        let tasks: Vec<Arc<dyn Task>> = vec![
            Arc::new(FailingTask),
            Arc::new(PanickingTask),
            fixed("katana", vec!["https://example.com/a"], 0),
        ];
        let results = run(&runner(2_000), tasks).await;
        assert_eq!(results, vec!["https://example.com/a"]);
    }

    #[tokio::test]
    async fn test_no_tasks() {
        assert!(run(&runner(100), Vec::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_completion_order_does_not_matter() {
        let slow_first = vec![
            fixed("one", vec!["z", "m"], 80),
            fixed("two", vec!["a"], 0),
        ];
        let fast_first = vec![
            fixed("one", vec!["z", "m"], 0),
            fixed("two", vec!["a"], 80),
        ];
        assert_eq!(run(&runner(2_000), slow_first).await, run(&runner(2_000), fast_first).await);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_wait() {
        let started = Instant::now();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = stop_tx.send(());
        });

        let result = runner(30_000)
            .run_parallel_until(
                vec![fixed("slow", vec!["a"], 30_000), fixed("slower", vec!["b"], 30_000)],
                &Target::new("example.com"),
                &Arc::new(Config::default()),
                "testing",
                async {
                    let _ = stop_rx.await;
                },
            )
            .await;

        assert!(matches!(result, Err(RunnerError::Interrupted)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_tool_processes_are_killed_on_timeout() {
        let search_path = Arc::new(SearchPath::from_env(&[]));
        let progress = ProgressTracker::console_only("example.com".into());
        let hanging: Arc<dyn Task> = Arc::new(ToolTask::new(
            ToolSpec::new("hang", "sh -c 'exec sleep 30'"),
            Arc::clone(&search_path),
            progress.clone(),
        ));
        let quick: Arc<dyn Task> = Arc::new(ToolTask::new(
            ToolSpec::new("quick", "sh -c 'echo a.example.com'"),
            search_path,
            progress,
        ));

        let started = Instant::now();
        let results = run(&runner(400), vec![hanging, quick]).await;
        assert_eq!(results, vec!["a.example.com"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
