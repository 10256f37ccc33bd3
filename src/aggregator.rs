//! Folding task results into the job status.
//!
//! Workers never touch the counters; they send `TaskResult`s over the result
//! channel and the aggregator sums them. Summation is order-independent.

use crate::task::TaskResult;
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

pub type ResultSender = Sender<TaskResult>;
pub type ResultReceiver = Receiver<TaskResult>;

/// Multi-writer, single-reader channel carrying task results.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    unbounded()
}

/// Summed counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total_files: u64,
    pub processed_files: u64,
    pub skipped_files: u64,
    pub total_size: u64,
    pub total_saved: u64,
    pub failed_tasks: u64,
}

impl Totals {
    fn absorb(&mut self, result: &TaskResult) {
        self.total_files += result.total_files;
        self.processed_files += result.processed_files;
        self.skipped_files += result.skipped_files;
        self.total_size += result.total_size;
        self.total_saved += result.saved_bytes;
        if result.error.is_some() {
            self.failed_tasks += 1;
        }
    }

    pub fn compressed_size(&self) -> u64 {
        self.total_size.saturating_sub(self.total_saved)
    }
}

/// Process-wide status of one run.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    time_start: DateTime<Local>,
    time_end: Option<DateTime<Local>>,
    #[serde(flatten)]
    totals: Totals,
    forced_stop: bool,
}

impl JobStatus {
    pub fn started_at(time_start: DateTime<Local>) -> Self {
        Self {
            time_start,
            time_end: None,
            totals: Totals::default(),
            forced_stop: false,
        }
    }

    pub fn started_now() -> Self {
        Self::started_at(Local::now())
    }

    pub fn time_start(&self) -> DateTime<Local> {
        self.time_start
    }

    pub fn time_end(&self) -> Option<DateTime<Local>> {
        self.time_end
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn forced_stop(&self) -> bool {
        self.forced_stop
    }

    /// Wall time of the run, once finished.
    pub fn elapsed(&self) -> Option<Duration> {
        let end = self.time_end?;
        (end - self.time_start).to_std().ok()
    }

    /// Close the status without any results, e.g. when nothing was eligible.
    pub(crate) fn finish(&mut self, forced_stop: bool, time_end: DateTime<Local>) {
        self.forced_stop = forced_stop;
        self.time_end = Some(time_end);
    }
}

pub struct ResultAggregator {
    status: JobStatus,
    results: Vec<TaskResult>,
}

impl ResultAggregator {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: TaskResult) {
        if let Some(error) = &result.error {
            warn!(dir = %result.target.display(), error = %error, "Directory finished with errors");
        }
        self.status.totals.absorb(&result);
        self.results.push(result);
    }

    /// Pull results until every sender is gone. Returns how many arrived.
    pub fn drain(&mut self, sink: &ResultReceiver) -> usize {
        let mut received = 0;
        for result in sink.iter() {
            self.record(result);
            received += 1;
        }
        received
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn finish(
        mut self,
        forced_stop: bool,
        time_end: DateTime<Local>,
    ) -> (JobStatus, Vec<TaskResult>) {
        self.status.finish(forced_stop, time_end);
        (self.status, self.results)
    }
}
