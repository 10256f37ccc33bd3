//! Fixed-size pool of workers draining the task queue.
//!
//! Each worker is one long-running job on a dedicated Rayon pool with exactly
//! as many threads as workers. Workers pull tasks until the queue is empty or
//! the run is cancelled, and report every finished task on the result channel.

use crate::aggregator::ResultSender;
use crate::cancel::CancellationToken;
use crate::constants::WORKER_THREAD_PREFIX;
use crate::error::JobError;
use crate::queue::TaskQueue;
use crate::task::{panic_message, TaskContext, TaskResult};
use indicatif::ProgressBar;
use rayon::ThreadPoolBuilder;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub workers_spawned: usize,
    pub tasks_run: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    size: usize,
}

impl WorkerPool {
    /// Never more workers than tasks, never more than the machine offers.
    pub fn sized_for(available_parallelism: usize, task_count: usize) -> Self {
        Self {
            size: available_parallelism.max(1).min(task_count),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run all workers to completion. Blocks until every worker has exited;
    /// `sink` is dropped on return so the receiving side sees the end.
    pub fn start(
        &self,
        queue: &TaskQueue,
        ctx: &TaskContext,
        sink: ResultSender,
        cancel: &CancellationToken,
        progress: &ProgressBar,
    ) -> Result<PoolSummary, JobError> {
        if self.size == 0 {
            return Ok(PoolSummary::default());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.size)
            .thread_name(|i| format!("{}-{}", WORKER_THREAD_PREFIX, i))
            .build()?;

        let tasks_run = AtomicUsize::new(0);
        pool.scope(|scope| {
            for id in 0..self.size {
                let sink = sink.clone();
                let tasks_run = &tasks_run;
                scope.spawn(move |_| {
                    let ran = worker_loop(id, queue, ctx, &sink, cancel, progress);
                    tasks_run.fetch_add(ran, Ordering::Relaxed);
                });
            }
        });
        drop(sink);

        Ok(PoolSummary {
            workers_spawned: self.size,
            tasks_run: tasks_run.into_inner(),
        })
    }
}

fn worker_loop(
    id: usize,
    queue: &TaskQueue,
    ctx: &TaskContext,
    sink: &ResultSender,
    cancel: &CancellationToken,
    progress: &ProgressBar,
) -> usize {
    debug!(worker = id, "Worker starting");
    let mut ran = 0;

    while !cancel.is_cancelled() {
        let Some(task) = queue.dequeue_or_empty() else {
            break;
        };

        // Codec panics are caught per file inside the task; this only sees
        // panics from the task's own bookkeeping
        let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(ctx))).unwrap_or_else(
            |payload| {
                TaskResult::failed(
                    task.target(),
                    format!("task panicked: {}", panic_message(payload.as_ref())),
                )
            },
        );

        info!(
            worker = id,
            dir = %result.target.display(),
            files = result.total_files,
            processed = result.processed_files,
            skipped = result.skipped_files,
            saved = result.saved_bytes,
            "Directory done"
        );
        progress.inc(1);
        ran += 1;

        if sink.send(result).is_err() {
            warn!(worker = id, "Result channel closed, stopping");
            break;
        }
    }

    if cancel.is_cancelled() {
        debug!(worker = id, tasks = ran, "Worker stopped on cancellation");
    } else {
        debug!(worker = id, tasks = ran, "Worker finished");
    }
    ran
}
