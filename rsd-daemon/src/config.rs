//! Configuration system for the `ReadySetDone` daemon.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/readysetdone/config.toml`)
//! 4. Compiled defaults
//!
//! The config file is shared with the `rsd` client: `[rsd]` holds settings
//! both sides read, `[daemon]` and `[cli]` hold per-binary settings. String
//! values may reference environment variables as `$VAR` or `${VAR}`.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::de::DeserializeOwned;

/// Address both binaries use when nothing else is configured.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7717";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// The listen address is not on the loopback interface.
    #[error("listen address {0} is not a loopback address")]
    NotLoopback(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure as seen by the daemon.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DaemonConfigFile {
    rsd: SharedFileConfig,
    daemon: DaemonFileConfig,
}

/// `[rsd]` section, read by both binaries.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SharedFileConfig {
    /// Log level filter.
    pub log_level: Option<String>,
    /// Log file path; logging goes to stderr when unset.
    pub log_file: Option<PathBuf>,
    /// Daemon WebSocket address.
    pub listen_addr: Option<String>,
}

/// `[daemon]` section of the config file.
///
/// The client reads the store paths from here for its local backend.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct DaemonFileConfig {
    /// Path of the task document.
    pub task_store_path: Option<PathBuf>,
    /// Directory holding description files.
    pub description_store_path: Option<PathBuf>,
    /// Seconds to wait for a clean shutdown.
    pub shutdown_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// When to emit ANSI color.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorWhen {
    /// Color when stdout is a terminal that is not `dumb`.
    #[default]
    Auto,
    /// Never color.
    Never,
    /// Always color.
    Always,
}

impl ColorWhen {
    /// Resolves the setting against the current terminal.
    #[must_use]
    pub fn enabled(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                let term = std::env::var("TERM").unwrap_or_default();
                std::io::stdout().is_terminal() && !term.is_empty() && term != "dumb"
            }
        }
    }
}

/// CLI arguments for the daemon.
#[derive(clap::Parser, Debug, Default)]
#[command(name = "rsdd", version, about = "ReadySetDone task daemon")]
pub struct DaemonCliArgs {
    /// Path to config file (default: `~/.config/readysetdone/config.toml`).
    #[arg(short, long, env = "RSD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Loopback address to listen on.
    #[arg(long, env = "RSD_LISTEN_ADDR")]
    pub listen: Option<String>,

    /// Path of the task document.
    #[arg(long, env = "RSD_TASK_STORE")]
    pub task_store: Option<PathBuf>,

    /// Directory holding description files.
    #[arg(long, env = "RSD_DESCRIPTION_STORE")]
    pub description_store: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "RSD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "RSD_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Control color output.
    #[arg(long, value_enum, default_value_t = ColorWhen::Auto)]
    pub color: ColorWhen,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Address the WebSocket server binds to.
    pub listen_addr: String,
    /// Path of the task document.
    pub task_store_path: PathBuf,
    /// Directory holding `<id>.md` description files.
    pub description_store_path: PathBuf,
    /// How long shutdown waits for the server task.
    pub shutdown_timeout: Duration,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
    /// Whether log output uses ANSI color.
    pub color: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let data = data_home();
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            task_store_path: data.join("tasks.json"),
            description_store_path: data.join("descriptions"),
            shutdown_timeout: Duration::from_secs(5),
            log_level: "info".to_string(),
            log_file: None,
            color: false,
        }
    }
}

impl DaemonConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the listen address is not loopback.
    pub fn load(cli: &DaemonCliArgs) -> Result<Self, ConfigError> {
        let file: DaemonConfigFile = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        ensure_loopback(&config.listen_addr)?;
        Ok(config)
    }

    /// Resolve a `DaemonConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. `--verbose` forces `debug`.
    fn resolve(cli: &DaemonCliArgs, file: &DaemonConfigFile) -> Self {
        let defaults = Self::default();
        let log_level = if cli.verbose {
            "debug".to_string()
        } else {
            cli.log_level
                .clone()
                .or_else(|| file.rsd.log_level.clone())
                .unwrap_or(defaults.log_level)
        };

        Self {
            listen_addr: cli
                .listen
                .clone()
                .or_else(|| file.rsd.listen_addr.clone())
                .unwrap_or(defaults.listen_addr),
            task_store_path: cli
                .task_store
                .clone()
                .or_else(|| file.daemon.task_store_path.clone())
                .unwrap_or(defaults.task_store_path),
            description_store_path: cli
                .description_store
                .clone()
                .or_else(|| file.daemon.description_store_path.clone())
                .unwrap_or(defaults.description_store_path),
            shutdown_timeout: file
                .daemon
                .shutdown_timeout_secs
                .map_or(defaults.shutdown_timeout, Duration::from_secs),
            log_level,
            log_file: cli.log_file.clone().or_else(|| file.rsd.log_file.clone()),
            color: cli.color.enabled(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// `<data_dir>/readysetdone`, falling back to the working directory.
#[must_use]
pub fn data_home() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("readysetdone")
}

/// `<config_dir>/readysetdone/config.toml`, if a config dir exists.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("readysetdone").join("config.toml"))
}

/// Rejects listen addresses outside the loopback interface.
///
/// Host names other than `localhost` are rejected as well.
///
/// # Errors
///
/// Returns `ConfigError::NotLoopback` for any non-loopback address.
pub fn ensure_loopback(addr: &str) -> Result<(), ConfigError> {
    let loopback = match addr.parse::<std::net::SocketAddr>() {
        Ok(sock) => sock.ip().is_loopback(),
        Err(_) => addr.rsplit_once(':').is_some_and(|(host, _)| host == "localhost"),
    };
    if loopback {
        Ok(())
    } else {
        Err(ConfigError::NotLoopback(addr.to_string()))
    }
}

/// Load, expand, and deserialize a TOML config file.
///
/// With an explicit path a missing file is an error; otherwise the default
/// path is tried and a missing file yields `T::default()`.
///
/// # Errors
///
/// Returns [`ConfigError`] on read or parse failure.
pub fn load_config_file<T>(explicit_path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return parse_config(&contents);
    } else {
        let Some(path) = default_config_path() else {
            return Ok(T::default());
        };
        path
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_config(&contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

/// Parse TOML text, expanding environment references in every string value.
///
/// # Errors
///
/// Returns `ConfigError::ParseToml` on malformed TOML or mismatched types.
pub fn parse_config<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let mut value: toml::Value = toml::from_str(contents)?;
    expand_value(&mut value, &|name| std::env::var(name).ok());
    Ok(T::deserialize(value)?)
}

fn expand_value(value: &mut toml::Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        toml::Value::String(s) => *s = expand_env_with(s, lookup),
        toml::Value::Array(items) => items.iter_mut().for_each(|v| expand_value(v, lookup)),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_value(v, lookup)),
        _ => {}
    }
}

#[allow(clippy::expect_used)]
static ENV_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("env reference pattern is valid")
});

/// Expand `$VAR` and `${VAR}` using `lookup`. Unknown variables are left as written.
pub fn expand_env_with(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    ENV_REF
        .replace_all(text, |caps: &Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            lookup(name).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
