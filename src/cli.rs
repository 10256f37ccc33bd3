use crate::constants::DEFAULT_SETTINGS_FILE;
use clap::builder::TypedValueParser;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dir-squeeze",
    about = "Compress every image in one or more directory trees",
    long_about = "dir-squeeze walks the given directories and re-compresses the JPEG, PNG and WebP \
                  images it finds, one directory per task, on a pool of worker threads sized to \
                  the machine. Files are only replaced when the result is smaller.",
    version = "0.1.0",
    after_help = "EXAMPLES:\n  \
    dir-squeeze ./photos\n  \
    dir-squeeze -s -v 2 ./photos ./scans\n  \
    dir-squeeze -t -n /srv/uploads\n  \
    dir-squeeze -v 3 ./photos > report.json"
)]
pub struct Args {
    #[arg(
        required = true,
        num_args = 1..,
        help = "Directories to compress"
    )]
    pub paths: Vec<PathBuf>,

    #[arg(
        short = 'v',
        value_parser = clap::value_parser!(u8).range(0..=3),
        default_value_t = 1,
        help = "Verbosity level: 0=log file, 1=print dirs, 2=print files, 3=print json"
    )]
    pub verbosity: u8,

    #[arg(
        short = 's',
        long = "soft",
        help = "Soft compression: no resizing, quality capped at the soft limit",
        long_help = "Soft compression never resizes images and re-encodes lossy formats at the \
                     soft quality cap from the settings file (80 by default)."
    )]
    pub soft: bool,

    #[arg(
        short = 't',
        long = "temp",
        help = "Temp output: keep source images, write results to the temp directory",
        long_help = "Leave source images untouched and write compressed copies under the \
                     configured temp directory. The directory is scratch space and is removed \
                     when the run ends."
    )]
    pub temp: bool,

    #[arg(
        short = 'n',
        long = "no-exceptions",
        help = "No exceptions: process paths even if they are in the exception list"
    )]
    pub no_exceptions: bool,

    #[arg(
        short = 'c',
        long = "config",
        default_value = DEFAULT_SETTINGS_FILE,
        help = "Settings file (JSON)",
        long_help = "Settings file holding the temp directory, log file, quality, resize bounds \
                     and exception list. Built-in defaults are used when it does not exist."
    )]
    pub config: PathBuf,

    #[arg(
        short = 'j',
        long = "jobs",
        value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize),
        help = "Maximum number of worker threads (default: number of CPUs)"
    )]
    pub jobs: Option<usize>,
}
