//! Command-line parsing and the resolved runtime configuration.
//!
//! [`Cli`] is the raw `clap` surface.  [`Config::from_cli`] validates it and
//! produces the [`Config`] the rest of the program runs on.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::store::is_valid_source_name;

/// Netzcam scraper - save every new webcam snapshot exactly once
#[derive(Parser, Debug)]
#[command(name = "netzcam-scraper")]
#[command(about = "Poll netzcam webcams and save each newly published image", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Project name (the `<project>.netzcam.net` subdomain)
    #[arg(short, long)]
    pub project: String,

    /// Name of the camera(s) to poll
    #[arg(short, long, required = true, num_args = 1..)]
    pub name: Vec<String>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Create the output directory if it does not exist
    #[arg(short, long)]
    pub mkdir: bool,

    /// Interval between polls, in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = 10)]
    pub interval: u64,

    /// Log level: debug, info, warn or error
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout, in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub timeout: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid log level '{0}', expected one of: debug, info, warn, error")]
    LogLevel(String),
    #[error("interval must be a positive number of seconds")]
    Interval,
    #[error("timeout must be a positive number of seconds")]
    Timeout,
    #[error("project name must not be empty")]
    EmptyProject,
    #[error("camera names must not be empty")]
    EmptyName,
    #[error("camera name '{0}' must be a plain directory name")]
    InvalidName(String),
    #[error("output directory does not exist: {0}")]
    MissingOutputDir(String),
    #[error("output path is not a directory: {0}")]
    NotADirectory(String),
    #[error("failed to create output directory {0}: {1}")]
    CreateOutputDir(String, std::io::Error),
}

/// Severity threshold for emitted log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// `EnvFilter` directive applying this level to our own crate while
    /// keeping dependencies at warn or above.
    pub fn filter_directive(self) -> String {
        let ours = self.as_str();
        let deps = if self > LogLevel::Warn { ours } else { "warn" };
        format!("{deps},{}={ours}", env!("CARGO_CRATE_NAME"))
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::LogLevel(other.to_string())),
        }
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project: String,
    /// Distinct camera names, in the order first given.
    pub names: Vec<String>,
    /// Names given more than once and dropped from `names`.
    pub duplicate_names: Vec<String>,
    pub output_dir: PathBuf,
    pub create_output_dir: bool,
    pub interval: Duration,
    pub timeout: Duration,
    pub log_level: LogLevel,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let log_level = cli.log_level.parse()?;

        if cli.interval == 0 {
            return Err(ConfigError::Interval);
        }
        if cli.timeout == 0 {
            return Err(ConfigError::Timeout);
        }
        if cli.project.is_empty() {
            return Err(ConfigError::EmptyProject);
        }

        let mut names: Vec<String> = Vec::with_capacity(cli.name.len());
        let mut duplicate_names = Vec::new();
        for name in cli.name {
            if name.is_empty() {
                return Err(ConfigError::EmptyName);
            }
            // Each name becomes a directory directly under the output root.
            if !is_valid_source_name(&name) {
                return Err(ConfigError::InvalidName(name));
            }
            // A camera listed twice would otherwise race itself for one state slot.
            if names.contains(&name) {
                if !duplicate_names.contains(&name) {
                    duplicate_names.push(name);
                }
            } else {
                names.push(name);
            }
        }

        Ok(Self {
            project: cli.project,
            names,
            duplicate_names,
            output_dir: cli.output_dir,
            create_output_dir: cli.mkdir,
            interval: Duration::from_secs(cli.interval),
            timeout: Duration::from_secs(cli.timeout),
            log_level,
        })
    }

    /// Make sure the output root exists, creating it when allowed.
    pub fn prepare_output_dir(&self) -> Result<(), ConfigError> {
        ensure_dir(&self.output_dir, self.create_output_dir)
    }
}

fn ensure_dir(path: &Path, create: bool) -> Result<(), ConfigError> {
    if path.is_dir() {
        return Ok(());
    }
    if path.exists() {
        return Err(ConfigError::NotADirectory(path.display().to_string()));
    }
    if !create {
        return Err(ConfigError::MissingOutputDir(path.display().to_string()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| ConfigError::CreateOutputDir(path.display().to_string(), e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
