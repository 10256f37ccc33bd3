//! One unit of work: every supported image directly inside one directory.

use crate::codec::{CompressionPolicy, ImageCodec};
use crate::error::CompressionError;
use crate::formats::is_image_file;
use crate::scanner::ExceptionPolicy;
use serde::Serialize;
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::debug;

/// Counters for one executed task. Sent once to the aggregator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskResult {
    pub target: PathBuf,
    pub total_files: u64,
    pub processed_files: u64,
    pub skipped_files: u64,
    pub total_size: u64,
    pub saved_bytes: u64,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl TaskResult {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// A task that could not run at all.
    pub fn failed(target: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(target)
        }
    }

    fn record_failure(&mut self, file: &Path, error: &CompressionError) {
        self.skipped_files += 1;
        let message = format!("{}: {}", file.display(), error);
        debug!(file = %file.display(), error = %error, "File failed");
        match &mut self.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&message);
            }
            None => self.error = Some(message),
        }
    }
}

/// Where compressed bytes end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Replace the source file
    InPlace,
    /// Mirror the absolute source path under a scratch root
    Mirror(PathBuf),
}

impl OutputTarget {
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        match self {
            OutputTarget::InPlace => source.to_path_buf(),
            OutputTarget::Mirror(root) => {
                let relative: PathBuf = source
                    .components()
                    .filter(|c| matches!(c, Component::Normal(_)))
                    .collect();
                root.join(relative)
            }
        }
    }
}

/// Read-only state shared by all workers for one run.
pub struct TaskContext {
    codec: Arc<dyn ImageCodec>,
    policy: CompressionPolicy,
    file_filter: ExceptionPolicy,
    output: OutputTarget,
    output_lock: Mutex<()>,
}

impl TaskContext {
    pub fn new(
        codec: Arc<dyn ImageCodec>,
        policy: CompressionPolicy,
        file_filter: ExceptionPolicy,
        output: OutputTarget,
    ) -> Self {
        Self {
            codec,
            policy,
            file_filter,
            output,
            output_lock: Mutex::new(()),
        }
    }

    /// Make sure the mirrored directory exists. Workers share the scratch
    /// root, so creation is serialized.
    fn prepare_output_dir(&self, dir: &Path) -> std::io::Result<()> {
        if let OutputTarget::Mirror(_) = self.output {
            let destination = self.output.destination_for(dir);
            let _guard = self
                .output_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            fs::create_dir_all(destination)?;
        }
        Ok(())
    }
}

/// A directory to compress. Owned by exactly one worker once dequeued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionTask {
    target: PathBuf,
}

impl CompressionTask {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Compress every candidate file. Per-file failures are recorded and
    /// counted as skipped; they never abort the task.
    pub fn run(&self, ctx: &TaskContext) -> TaskResult {
        let started = Instant::now();
        let mut result = TaskResult::new(&self.target);

        let files = match self.candidate_files(&ctx.file_filter) {
            Ok(files) => files,
            Err(e) => {
                result.error = Some(format!("{}: {}", self.target.display(), e));
                return result;
            }
        };

        if let Err(e) = ctx.prepare_output_dir(&self.target) {
            let destination = ctx.output.destination_for(&self.target);
            result.total_files = files.len() as u64;
            result.skipped_files = files.len() as u64;
            result.error = Some(format!(
                "{} ({})",
                CompressionError::DirectoryCreationFailed(destination),
                e
            ));
            return result;
        }

        for file in &files {
            result.total_files += 1;

            let original_size = match fs::metadata(file) {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    result.record_failure(file, &CompressionError::Io(e));
                    continue;
                }
            };
            result.total_size += original_size;

            let destination = ctx.output.destination_for(file);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                ctx.codec.compress(file, &destination, &ctx.policy)
            }))
            .unwrap_or_else(|payload| {
                Err(CompressionError::CodecPanicked(
                    panic_message(payload.as_ref()).to_string(),
                ))
            });
            match outcome {
                Ok(outcome) if !outcome.skipped => {
                    let saved = original_size.saturating_sub(outcome.new_size);
                    result.processed_files += 1;
                    result.saved_bytes += saved;
                    debug!(
                        file = %file.display(),
                        original_size,
                        new_size = outcome.new_size,
                        saved,
                        "File compressed"
                    );
                }
                Ok(_) => {
                    result.skipped_files += 1;
                    debug!(file = %file.display(), original_size, "File skipped");
                }
                Err(e) => result.record_failure(file, &e),
            }
        }

        result.elapsed_ms = started.elapsed().as_millis() as u64;
        result
    }

    fn candidate_files(&self, filter: &ExceptionPolicy) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.target)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if is_image_file(&path) && !filter.excludes_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
