//! Run configuration.
//!
//! Settings are assembled from an optional JSON settings file and the command
//! line, validated once, and then handed to the job controller. From that
//! point on they are only ever read.

use crate::cli::Args;
use crate::codec::CompressionPolicy;
use crate::constants::{
    DEFAULT_LOG_FILE, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH, DEFAULT_QUALITY, MAX_QUALITY,
    MIN_QUALITY, SOFT_QUALITY_CAP, TEMP_DIR_NAME,
};
use crate::error::ConfigError;
use crate::scanner::{ExceptionPolicy, MatchMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// How much the run reports, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Everything goes to the log file only
    LogFile = 0,
    /// Directory-level events on stdout
    Directories = 1,
    /// File-level events on stdout
    Files = 2,
    /// Machine-readable JSON report
    Json = 3,
}

impl Verbosity {
    pub fn is_structured(self) -> bool {
        self == Verbosity::Json
    }

    /// Whether log events reach the terminal at all.
    pub fn logs_to_terminal(self) -> bool {
        self != Verbosity::LogFile
    }
}

impl TryFrom<u8> for Verbosity {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Verbosity::LogFile),
            1 => Ok(Verbosity::Directories),
            2 => Ok(Verbosity::Files),
            3 => Ok(Verbosity::Json),
            other => Err(ConfigError::InvalidVerbosity(other)),
        }
    }
}

/// Codec and filtering parameters, as stored in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionParams {
    pub quality: u8,
    pub soft_quality: u8,
    pub max_width: u32,
    pub max_height: u32,
    pub exceptions: Vec<String>,
    pub exception_match: MatchMode,
    pub exceptions_apply_to_files: bool,
}

impl Default for CompressionParams {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            soft_quality: SOFT_QUALITY_CAP,
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            exceptions: Vec::new(),
            exception_match: MatchMode::default(),
            exceptions_apply_to_files: false,
        }
    }
}

/// On-disk settings file. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub temp_dir: PathBuf,
    pub log_file: PathBuf,
    pub params: CompressionParams,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join(TEMP_DIR_NAME),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            params: CompressionParams::default(),
        }
    }
}

impl SettingsFile {
    /// Load a settings file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The frozen configuration of one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub source_paths: Vec<PathBuf>,
    pub verbosity: Verbosity,
    pub soft_mode: bool,
    pub temp_mode: bool,
    pub exceptions_enabled: bool,
    pub temp_dir: PathBuf,
    pub log_file: PathBuf,
    pub params: CompressionParams,
    /// Optional cap on the worker count, below hardware concurrency
    pub max_workers: Option<usize>,
}

impl Settings {
    /// Defaults for the given source paths.
    pub fn new(source_paths: Vec<PathBuf>) -> Self {
        Self::with_file(source_paths, SettingsFile::default())
    }

    pub fn with_file(source_paths: Vec<PathBuf>, file: SettingsFile) -> Self {
        Self {
            source_paths,
            verbosity: Verbosity::Directories,
            soft_mode: false,
            temp_mode: false,
            exceptions_enabled: true,
            temp_dir: file.temp_dir,
            log_file: file.log_file,
            params: file.params,
            max_workers: None,
        }
    }

    /// Merge the settings file named on the command line with the flags.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let file = SettingsFile::load(&args.config)?;
        let mut settings = Self::with_file(args.paths.clone(), file);

        settings.verbosity = Verbosity::try_from(args.verbosity)?;
        settings.soft_mode = args.soft;
        settings.temp_mode = args.temp;
        settings.exceptions_enabled = !args.no_exceptions;
        settings.max_workers = args.jobs;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_paths.is_empty() {
            return Err(ConfigError::NoSourcePaths);
        }

        for quality in [self.params.quality, self.params.soft_quality] {
            if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
                return Err(ConfigError::InvalidQuality(quality));
            }
        }

        if self.params.max_width == 0 || self.params.max_height == 0 {
            return Err(ConfigError::InvalidResizeBound(
                self.params.max_width,
                self.params.max_height,
            ));
        }

        self.exception_policy().map(|_| ())
    }

    /// The exception filter for this run; inert when exceptions are disabled.
    pub fn exception_policy(&self) -> Result<ExceptionPolicy, ConfigError> {
        if !self.exceptions_enabled {
            return Ok(ExceptionPolicy::disabled());
        }

        ExceptionPolicy::new(
            &self.params.exceptions,
            self.params.exception_match,
            self.params.exceptions_apply_to_files,
        )
    }

    /// Soft mode pins quality to the soft cap and never resizes.
    pub fn compression_policy(&self) -> CompressionPolicy {
        if self.soft_mode {
            CompressionPolicy {
                max_quality: self.params.soft_quality,
                allow_resize: false,
                max_width: self.params.max_width,
                max_height: self.params.max_height,
            }
        } else {
            CompressionPolicy {
                max_quality: self.params.quality,
                allow_resize: true,
                max_width: self.params.max_width,
                max_height: self.params.max_height,
            }
        }
    }
}
