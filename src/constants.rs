pub const DEFAULT_QUALITY: u8 = 60;
pub const SOFT_QUALITY_CAP: u8 = 80;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

pub const DEFAULT_MAX_WIDTH: u32 = 2560;
pub const DEFAULT_MAX_HEIGHT: u32 = 2560;

/// Files above this size are rejected before decoding.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const MAX_IMAGE_DIMENSION: u32 = 10_000;

pub const ZOPFLI_ITERATIONS: u8 = 15;
pub const LIBDEFLATER_HIGH_LEVEL: u8 = 12;
pub const LIBDEFLATER_LOW_LEVEL: u8 = 8;
pub const OXIPNG_PRESET: u8 = 4;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";
pub const DEFAULT_LOG_FILE: &str = "dir-squeeze.log";
pub const TEMP_DIR_NAME: &str = "dir-squeeze";

pub const WORKER_THREAD_PREFIX: &str = "squeeze-worker";
pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} dirs {msg}";

/// Exit status used when a second interrupt forces an immediate exit.
pub const FORCED_EXIT_CODE: i32 = 130;
