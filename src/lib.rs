pub mod aggregator;
pub mod cancel;
pub mod cli;
pub mod codec;
pub mod constants;
pub mod error;
pub mod formats;
pub mod job;
pub mod logging;
pub mod pool;
pub mod queue;
pub mod report;
pub mod scanner;
pub mod settings;
pub mod task;

pub use aggregator::{JobStatus, ResultAggregator, Totals};
pub use cancel::CancellationToken;
pub use codec::{CodecOutcome, CompressionPolicy, ImageCodec, StandardCodec};
pub use error::{CompressionError, ConfigError, JobError, Result, ScanError};
pub use job::{JobController, JobReport, JobState};
pub use pool::WorkerPool;
pub use queue::TaskQueue;
pub use scanner::{DirectoryScanner, ExceptionPolicy, MatchMode, ScanResult};
pub use settings::{Settings, Verbosity};
pub use task::{CompressionTask, OutputTarget, TaskContext, TaskResult};
