use std::path::PathBuf;
use thiserror::Error;

/// Failures of the image codec on a single file.
///
/// These never leave a task: the task records them in its `TaskResult` and
/// moves on to the next file.
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("Codec panicked: {0}")]
    CodecPanicked(String),
}

/// Invalid run configuration. Aborts the run before anything is scanned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid verbosity level: {0}. Must be between 0 and 3")]
    InvalidVerbosity(u8),

    #[error("Invalid resize bound: {0}x{1}")]
    InvalidResizeBound(u32, u32),

    #[error("No source paths given")]
    NoSourcePaths,

    #[error("Invalid exception pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("directories can't be scanned or were excluded by exception list ({0} source path(s) given)")]
    NothingEligible(usize),
}

/// Errors that end a run early. Task and scan failures are absorbed into
/// counters and never show up here.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompressionError>;
