//! Top-level coordination of a compression run.
//!
//! ```text
//! Idle -> Scanning -> Dispatching -> Running -> Aggregating -> Finalized
//!             |                        |
//!             |                        +-> Interrupted -> Aggregating
//!             +-> Finalized (nothing eligible)
//! ```
//!
//! Every path that reaches `Finalized` produces a `JobReport`, including
//! the interrupted one.

use crate::aggregator::{result_channel, JobStatus, ResultAggregator};
use crate::cancel::CancellationToken;
use crate::codec::ImageCodec;
use crate::error::JobError;
use crate::pool::WorkerPool;
use crate::queue::TaskQueue;
use crate::scanner::{DirectoryScanner, ScanResult};
use crate::settings::Settings;
use crate::task::{CompressionTask, OutputTarget, TaskContext, TaskResult};
use chrono::Local;
use indicatif::ProgressBar;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Scanning,
    Dispatching,
    Running,
    Interrupted,
    Aggregating,
    Finalized,
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub status: JobStatus,
    pub dirs: ScanResult,
    pub tasks: Vec<TaskResult>,
    pub workers: usize,
    pub transitions: Vec<JobState>,
}

impl JobReport {
    pub fn final_state(&self) -> JobState {
        self.transitions.last().copied().unwrap_or(JobState::Idle)
    }

    pub fn is_interrupted(&self) -> bool {
        self.status.forced_stop()
    }
}

pub struct JobController {
    settings: Arc<Settings>,
    codec: Arc<dyn ImageCodec>,
    cancel: CancellationToken,
    available_parallelism: usize,
    progress: ProgressBar,
    status: JobStatus,
    transitions: Vec<JobState>,
}

impl JobController {
    /// The run's start time is taken here.
    pub fn new(settings: Settings, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            settings: Arc::new(settings),
            codec,
            cancel: CancellationToken::new(),
            available_parallelism: num_cpus::get(),
            progress: ProgressBar::hidden(),
            status: JobStatus::started_now(),
            transitions: vec![JobState::Idle],
        }
    }

    /// Override the detected hardware concurrency.
    pub fn with_parallelism(mut self, available: usize) -> Self {
        self.available_parallelism = available.max(1);
        self
    }

    /// Bar ticked once per finished directory. Its length is set here.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Handle for interrupt handlers; cancelling it stops the run after the
    /// tasks in flight.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> JobState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(JobState::Idle)
    }

    pub fn run(mut self) -> Result<JobReport, JobError> {
        let exceptions = self.settings.exception_policy()?;

        self.transition(JobState::Scanning);
        let scan = DirectoryScanner::new(&exceptions).scan(&self.settings.source_paths);
        for excluded in &scan.excluded {
            info!(dir = %excluded.path.display(), reason = %excluded.reason, "Directory excluded");
        }
        info!(
            included = scan.included.len(),
            excluded = scan.excluded.len(),
            "Scan complete"
        );

        if let Err(e) = scan.ensure_eligible() {
            error!("Error scanning sources: {}", e);
            self.status.finish(self.cancel.is_cancelled(), Local::now());
            self.transition(JobState::Finalized);
            return Ok(self.into_report(scan, Vec::new(), 0));
        }

        let scratch = if self.settings.temp_mode {
            Some(ScratchDir::create(&self.settings.temp_dir)?)
        } else {
            None
        };
        let output = match &scratch {
            Some(scratch) => OutputTarget::Mirror(scratch.path().to_path_buf()),
            None => OutputTarget::InPlace,
        };

        self.transition(JobState::Dispatching);
        let ctx = TaskContext::new(
            Arc::clone(&self.codec),
            self.settings.compression_policy(),
            exceptions,
            output,
        );
        let pool = WorkerPool::sized_for(self.worker_limit(), scan.included.len());
        let queue: TaskQueue = scan.included.iter().map(CompressionTask::new).collect();
        let (sink, results) = result_channel();
        info!(workers = pool.size(), tasks = queue.len(), "Dispatching");

        self.transition(JobState::Running);
        self.progress.set_length(queue.len() as u64);
        let outcome = pool.start(&queue, &ctx, sink, &self.cancel, &self.progress);
        self.progress.finish_and_clear();

        let forced_stop = self.cancel.is_cancelled();
        if forced_stop {
            self.transition(JobState::Interrupted);
            info!(pending = queue.len(), "Process interrupted by the user.");
        }

        self.transition(JobState::Aggregating);
        let mut aggregator = ResultAggregator::new(self.status.clone());
        let received = aggregator.drain(&results);
        debug!(results = received, "Results aggregated");
        let (status, tasks) = aggregator.finish(forced_stop, Local::now());
        self.status = status;

        if let Some(scratch) = scratch {
            scratch.remove();
        }
        let summary = outcome?;

        self.transition(JobState::Finalized);
        Ok(self.into_report(scan, tasks, summary.workers_spawned))
    }

    fn transition(&mut self, next: JobState) {
        debug!(from = ?self.state(), to = ?next, "Job state");
        self.transitions.push(next);
    }

    fn worker_limit(&self) -> usize {
        match self.settings.max_workers {
            Some(cap) => self.available_parallelism.min(cap),
            None => self.available_parallelism,
        }
    }

    fn into_report(self, dirs: ScanResult, tasks: Vec<TaskResult>, workers: usize) -> JobReport {
        JobReport {
            status: self.status,
            dirs,
            tasks,
            workers,
            transitions: self.transitions,
        }
    }
}

/// Output root of one temp-mode run: a fresh directory inside the
/// configured temp dir. Only that directory is ever deleted, plus the temp
/// dir itself when this run created it and it is empty again.
struct ScratchDir {
    run_dir: TempDir,
    root: PathBuf,
    created_root: bool,
}

impl ScratchDir {
    fn create(root: &Path) -> io::Result<Self> {
        let created_root = !root.exists();
        fs::create_dir_all(root)?;
        let run_dir = tempfile::Builder::new().prefix("run-").tempdir_in(root)?;
        debug!(dir = %run_dir.path().display(), "Scratch directory created");
        Ok(Self {
            run_dir,
            root: root.to_path_buf(),
            created_root,
        })
    }

    fn path(&self) -> &Path {
        self.run_dir.path()
    }

    /// Called whatever happened to individual tasks.
    fn remove(self) {
        let run_dir = self.run_dir.path().to_path_buf();
        if let Err(e) = self.run_dir.close() {
            warn!(dir = %run_dir.display(), error = %e, "Couldn't remove temp directory");
        }
        if self.created_root {
            // Fails harmlessly if anything else was put there meanwhile
            if let Err(e) = fs::remove_dir(&self.root) {
                debug!(dir = %self.root.display(), error = %e, "Temp root left in place");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecOutcome, CompressionPolicy};

    struct FixedCodec;

    impl ImageCodec for FixedCodec {
        fn compress(
            &self,
            _source: &Path,
            _destination: &Path,
            _policy: &CompressionPolicy,
        ) -> crate::error::Result<CodecOutcome> {
            Ok(CodecOutcome {
                new_size: 4,
                skipped: false,
            })
        }
    }

    fn settings_for(paths: Vec<PathBuf>) -> Settings {
        let mut settings = Settings::new(paths);
        settings.temp_dir = std::env::temp_dir().join("dir-squeeze-job-tests");
        settings
    }

    #[test]
    fn test_new_controller_is_idle() {
        let controller = JobController::new(settings_for(vec![]), Arc::new(FixedCodec));
        assert_eq!(controller.state(), JobState::Idle);
        assert!(!controller.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_worker_limit_respects_cap() {
        let mut settings = settings_for(vec![PathBuf::from(".")]);
        settings.max_workers = Some(2);
        let controller = JobController::new(settings, Arc::new(FixedCodec)).with_parallelism(8);
        assert_eq!(controller.worker_limit(), 2);

        let controller = JobController::new(settings_for(vec![]), Arc::new(FixedCodec))
            .with_parallelism(0);
        assert_eq!(controller.worker_limit(), 1);
    }

    #[test]
    fn test_run_happy_path_transitions() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.jpg"), b"0123456789").unwrap();

        let report = JobController::new(
            settings_for(vec![temp_dir.path().to_path_buf()]),
            Arc::new(FixedCodec),
        )
        .run()
        .unwrap();

        assert_eq!(
            report.transitions,
            vec![
                JobState::Idle,
                JobState::Scanning,
                JobState::Dispatching,
                JobState::Running,
                JobState::Aggregating,
                JobState::Finalized,
            ]
        );
        assert_eq!(report.workers, 1);
        assert_eq!(report.status.totals().processed_files, 1);
        assert_eq!(report.status.totals().total_saved, 6);
        assert!(report.status.time_end().is_some());
        assert!(!report.is_interrupted());
    }

    #[test]
    fn test_run_nothing_eligible() {
        let report = JobController::new(
            settings_for(vec![PathBuf::from("/nonexistent/source")]),
            Arc::new(FixedCodec),
        )
        .run()
        .unwrap();

        assert_eq!(
            report.transitions,
            vec![JobState::Idle, JobState::Scanning, JobState::Finalized]
        );
        assert_eq!(report.workers, 0);
        assert!(report.dirs.included.is_empty());
        assert_eq!(report.status.totals().total_files, 0);
    }

    #[test]
    fn test_temp_mode_leaves_sources_and_cleans_up() {
        let source = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        fs::write(source.path().join("a.jpg"), b"0123456789").unwrap();
        let mut settings = settings_for(vec![source.path().to_path_buf()]);
        settings.temp_mode = true;
        settings.temp_dir = scratch.path().join("out");

        let report = JobController::new(settings, Arc::new(FixedCodec))
            .run()
            .unwrap();

        assert_eq!(report.status.totals().processed_files, 1);
        assert_eq!(
            fs::read(source.path().join("a.jpg")).unwrap(),
            b"0123456789"
        );
        assert!(!scratch.path().join("out").exists());
    }

    #[test]
    fn test_temp_dir_holding_the_sources_is_kept() {
        let home = TempDir::new().unwrap();
        let photos = home.path().join("photos");
        fs::create_dir(&photos).unwrap();
        fs::write(photos.join("a.jpg"), b"0123456789").unwrap();
        let mut settings = settings_for(vec![photos.clone()]);
        settings.temp_mode = true;
        settings.temp_dir = home.path().to_path_buf();

        let report = JobController::new(settings, Arc::new(FixedCodec))
            .run()
            .unwrap();

        assert_eq!(report.status.totals().processed_files, 1);
        assert_eq!(fs::read(photos.join("a.jpg")).unwrap(), b"0123456789");
        // Only the run's own scratch directory was removed
        let left: Vec<_> = fs::read_dir(home.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from("photos")]);
    }

    #[test]
    fn test_existing_temp_dir_content_survives() {
        let source = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        fs::write(source.path().join("a.jpg"), b"0123456789").unwrap();
        fs::write(scratch.path().join("keep.txt"), b"mine").unwrap();
        let mut settings = settings_for(vec![source.path().to_path_buf()]);
        settings.temp_mode = true;
        settings.temp_dir = scratch.path().to_path_buf();

        JobController::new(settings, Arc::new(FixedCodec))
            .run()
            .unwrap();

        assert_eq!(fs::read(scratch.path().join("keep.txt")).unwrap(), b"mine");
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unusable_temp_dir_fails_the_job() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.jpg"), b"0123456789").unwrap();
        let blocker = source.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let mut settings = settings_for(vec![source.path().to_path_buf()]);
        settings.temp_mode = true;
        settings.temp_dir = blocker.join("out");

        let result = JobController::new(settings, Arc::new(FixedCodec)).run();

        assert!(matches!(result, Err(JobError::Io(_))));
    }
}
