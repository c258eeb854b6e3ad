// THEORY:
// The parallel layer runs a batch of independent pairs on a fixed-size pool.
// It mirrors the classic dispatcher/worker layout: one dispatcher task owns
// the inbound queue and hands tasks to per-worker channels in strict
// round-robin order (task i goes to worker i % N, no stealing). Each worker
// drains its own channel sequentially, executing the synchronous pipeline on
// the blocking thread pool and answering on the task's oneshot channel.
//
// Key architectural principles:
// 1.  **Isolation**: a pair that fails or panics produces a `PairResult` and
//     nothing else. A panic surfaces as a `JoinError` from `spawn_blocking`
//     and is reported as a processing failure; the worker keeps going.
// 2.  **Ordered results**: replies are awaited with `join_all` in submission
//     order, so the report lists pairs in discovery order regardless of which
//     worker finished first.
// 3.  **Explicit configuration**: the pool only knows a `PairRunner`; the
//     orchestrator closes the pipeline kind and an `Arc<Config>` into it.

use crate::config::Config;
use crate::discovery::discover_pairs;
use crate::error::Result;
use crate::pipeline::{run_pair, PairResult, PairStatus, PairTask, PipelineKind};
use futures::future::join_all;
use log::{error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;

/// The per-pair work executed by every worker.
pub type PairRunner = Arc<dyn Fn(&PairTask) -> PairResult + Send + Sync + 'static>;

pub struct PairJob {
    pub task: PairTask,
    pub result_sender: oneshot::Sender<PairResult>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<PairJob>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns the dispatcher and `size` workers. Must be called inside a Tokio runtime.
    pub fn new(size: usize, runner: PairRunner) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<PairJob>();
        let mut workers = Vec::with_capacity(size);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| mpsc::unbounded_channel::<PairJob>()).unzip();

        // Spawn dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(job) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(job)) = worker_senders[worker_idx].send(job) {
                    let failed = failure(&job.task, "worker channel closed");
                    let _ = job.result_sender.send(failed);
                }
                worker_idx = (worker_idx + 1) % size;
            }
        });

        // Spawn workers
        for mut worker_receiver in worker_receivers {
            let worker_runner = Arc::clone(&runner);
            let worker = tokio::spawn(async move {
                while let Some(job) = worker_receiver.recv().await {
                    let result = Self::process_pair_worker(Arc::clone(&worker_runner), job.task).await;
                    let _ = job.result_sender.send(result);
                }
            });
            workers.push(worker);
        }

        Self { task_sender, workers, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    async fn process_pair_worker(runner: PairRunner, task: PairTask) -> PairResult {
        let fallback = task.clone();
        match tokio::task::spawn_blocking(move || runner(&task)).await {
            Ok(result) => result,
            Err(join_error) => failure(&fallback, &panic_message(join_error)),
        }
    }

    /// Queues `task` and returns the channel its result will arrive on.
    pub fn submit(&self, task: PairTask) -> oneshot::Receiver<PairResult> {
        let (result_sender, result_receiver) = oneshot::channel();
        if let Err(mpsc::error::SendError(job)) = self.task_sender.send(PairJob { task, result_sender }) {
            let failed = failure(&job.task, "worker pool is shut down");
            let _ = job.result_sender.send(failed);
        }
        result_receiver
    }

    /// Closes the queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

fn failure(task: &PairTask, message: &str) -> PairResult {
    PairResult::new(&task.base_name, PairStatus::ProcessingFailure, format!("Exception: {message}"))
}

fn panic_message(join_error: JoinError) -> String {
    if !join_error.is_panic() {
        return join_error.to_string();
    }
    let payload = join_error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

/// Per-pair results of one batch, in discovery order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: PipelineKind,
    pub results: Vec<PairResult>,
}

impl BatchReport {
    pub fn count(&self, status: PairStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Status lines of every pair that was not processed successfully.
    pub fn problems(&self) -> impl Iterator<Item = &PairResult> {
        self.results.iter().filter(|r| r.status != PairStatus::Ok)
    }

    /// Logs failures at error level, skips at warn level, then the totals.
    pub fn log_summary(&self) {
        info!("--- {} batch summary ---", self.kind);
        for result in self.problems() {
            match result.status {
                PairStatus::ProcessingFailure | PairStatus::ReadError => error!("{result}"),
                PairStatus::Skipped => warn!("{result}"),
                PairStatus::Ok => {}
            }
        }
        info!(
            "{} pairs: {} ok, {} skipped, {} read errors, {} failures",
            self.results.len(),
            self.count(PairStatus::Ok),
            self.count(PairStatus::Skipped),
            self.count(PairStatus::ReadError),
            self.count(PairStatus::ProcessingFailure),
        );
    }
}

/// Discovers the pairs of a directory and runs them on a worker pool.
pub struct BatchOrchestrator {
    kind: PipelineKind,
    config: Arc<Config>,
}

impl BatchOrchestrator {
    /// Fails with `InvalidConfig` before any worker is started.
    pub fn new(kind: PipelineKind, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { kind, config: Arc::new(config) })
    }

    fn runner(&self) -> PairRunner {
        let kind = self.kind;
        let config = Arc::clone(&self.config);
        Arc::new(move |task: &PairTask| run_pair(task, kind, &config))
    }

    /// Creates `output_dir`, discovers pairs in `input_dir` and processes them.
    pub async fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchReport> {
        std::fs::create_dir_all(output_dir)?;
        let tasks = discover_pairs(self.kind, input_dir, output_dir, &self.config.batch)?;
        info!(
            "Starting {} pipeline on {} pair(s) from {}",
            self.kind,
            tasks.len(),
            input_dir.display()
        );
        Ok(self.run_tasks(tasks, self.runner()).await)
    }

    /// Processes already-discovered tasks with `runner`.
    pub async fn run_tasks(&self, tasks: Vec<PairTask>, runner: PairRunner) -> BatchReport {
        let pool = WorkerPool::new(self.config.batch.worker_count(), runner);
        info!("Using {} worker(s)", pool.size());

        let total = tasks.len();
        let done = Arc::new(AtomicUsize::new(0));
        let pending: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let fallback = task.clone();
                let receiver = pool.submit(task);
                let done = Arc::clone(&done);
                async move {
                    let result = receiver
                        .await
                        .unwrap_or_else(|_| failure(&fallback, "worker dropped the result"));
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("[{finished}/{total}] {result}");
                    result
                }
            })
            .collect();

        let results = join_all(pending).await;
        pool.shutdown().await;
        BatchReport { kind: self.kind, results }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::utils::image_helper::save;
    use image::{Rgb, RgbImage};

    fn small_config(workers: usize) -> Config {
        let mut config = Config::default();
        config.batch.workers = Some(workers);
        config
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_with_one_missing_counterpart() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let frame = RgbImage::from_pixel(48, 40, Rgb([90, 90, 90]));
        for i in 1..=5 {
            save(&input.path().join(format!("pair{i}.jpg")), &frame).unwrap();
            if i != 3 {
                save(&input.path().join(format!("pair{i}~2.jpg")), &frame).unwrap();
            }
        }

        let orchestrator = BatchOrchestrator::new(PipelineKind::Change, small_config(3)).unwrap();
        let report = orchestrator.run(input.path(), output.path()).await.unwrap();

        assert_eq!(report.results.len(), 5);
        assert_eq!(report.count(PairStatus::Skipped), 1);
        assert_eq!(report.results[2].base_name, "pair3");
        assert_eq!(report.results[2].status, PairStatus::Skipped);
        assert_eq!(report.count(PairStatus::Ok) + report.count(PairStatus::ProcessingFailure), 4);
        assert!(output.path().join("pair1~3_Final.jpg").exists());
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = small_config(2);
        config.aligner.template_fraction = 1.5;
        let rejected = BatchOrchestrator::new(PipelineKind::Thermal, config);
        assert!(matches!(rejected, Err(crate::error::PipelineError::InvalidConfig(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_pair_does_not_affect_siblings() {
        let orchestrator = BatchOrchestrator::new(PipelineKind::Change, small_config(2)).unwrap();
        let tasks: Vec<PairTask> = ["a", "b", "c", "d"]
            .iter()
            .map(|base| PairTask {
                base_name: base.to_string(),
                primary: format!("{base}.jpg").into(),
                secondary: format!("{base}~2.jpg").into(),
                output_dir: ".".into(),
            })
            .collect();
        let runner: PairRunner = Arc::new(|task: &PairTask| {
            if task.base_name == "b" {
                panic!("synthetic failure");
            }
            PairResult::new(&task.base_name, PairStatus::Ok, "done")
        });

        let report = orchestrator.run_tasks(tasks, runner).await;
        let statuses: Vec<PairStatus> = report.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            [PairStatus::Ok, PairStatus::ProcessingFailure, PairStatus::Ok, PairStatus::Ok]
        );
        assert!(report.results[1].detail.contains("synthetic failure"));
    }

    #[tokio::test]
    async fn tasks_are_dealt_round_robin() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let runner: PairRunner = Arc::new(move |task: &PairTask| {
            let thread = std::thread::current().id();
            record.lock().unwrap().push((task.base_name.clone(), thread));
            PairResult::new(&task.base_name, PairStatus::Ok, "done")
        });
        let pool = WorkerPool::new(2, runner);
        let mut receivers = Vec::new();
        for i in 0..4 {
            receivers.push(pool.submit(PairTask {
                base_name: i.to_string(),
                primary: "p".into(),
                secondary: "s".into(),
                output_dir: ".".into(),
            }));
        }
        let results = join_all(receivers).await;
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(|r| r.status == PairStatus::Ok)));
        pool.shutdown().await;
        assert_eq!(seen.lock().unwrap().len(), 4);
    }
}
