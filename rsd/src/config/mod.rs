//! Configuration system for the `rsd` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/readysetdone/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error. The file is the one the
//! daemon reads; the client uses `[rsd]`, `[cli]`, and the store paths
//! from `[daemon]` when running with the local backend.

use std::path::PathBuf;
use std::time::Duration;

use rsd_daemon::config::{
    DEFAULT_LISTEN_ADDR, DaemonConfig, DaemonFileConfig, SharedFileConfig, ensure_loopback,
    load_config_file,
};

use crate::commands::Command;

pub use rsd_daemon::config::{ColorWhen, ConfigError};

/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed for each RPC reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure as seen by the client.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientConfigFile {
    rsd: SharedFileConfig,
    daemon: DaemonFileConfig,
    cli: CliFileConfig,
}

/// `[cli]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CliFileConfig {
    show_timestamps: Option<bool>,
    connect_timeout_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
    backend: Option<BackendKind>,
}

/// Where task operations are carried out.
#[derive(clap::ValueEnum, serde::Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Through a running `rsdd`.
    #[default]
    Daemon,
    /// Directly on the task files.
    Local,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the client.
#[derive(clap::Parser, Debug, Default)]
#[command(name = "rsd", version, about = "ReadySetDone task tracker")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/readysetdone/config.toml`).
    #[arg(short, long, env = "RSD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address of the daemon.
    #[arg(long, env = "RSD_LISTEN_ADDR")]
    pub daemon: Option<String>,

    /// Talk to the daemon or edit the task files directly.
    #[arg(long, value_enum, env = "RSD_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Control color output.
    #[arg(long, value_enum, default_value_t = ColorWhen::Auto)]
    pub color: ColorWhen,

    /// Show each task's creation time.
    #[arg(short, long)]
    pub metadata: bool,

    /// Command to run (default: list).
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Daemon WebSocket address.
    pub daemon_addr: String,
    /// Selected backend.
    pub backend: BackendKind,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Per-call reply timeout.
    pub call_timeout: Duration,
    /// Render the created column.
    pub metadata: bool,
    /// Task document used by the local backend.
    pub task_store_path: PathBuf,
    /// Description directory used by the local backend.
    pub description_store_path: PathBuf,
    /// Log level filter string.
    pub log_level: String,
    /// Whether output uses ANSI styling.
    pub color: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let daemon = DaemonConfig::default();
        Self {
            daemon_addr: DEFAULT_LISTEN_ADDR.to_string(),
            backend: BackendKind::Daemon,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            metadata: false,
            task_store_path: daemon.task_store_path,
            description_store_path: daemon.description_store_path,
            log_level: "warn".to_string(),
            color: false,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the daemon address is not loopback.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file: ClientConfigFile = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        ensure_loopback(&config.daemon_addr)?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. The client logs at `warn` unless
    /// `--verbose` asks for `debug`. The created column needs both
    /// `--metadata` and `show_timestamps`.
    fn resolve(cli: &CliArgs, file: &ClientConfigFile) -> Self {
        let defaults = Self::default();
        let show_timestamps = file.cli.show_timestamps.unwrap_or(true);

        Self {
            daemon_addr: cli
                .daemon
                .clone()
                .or_else(|| file.rsd.listen_addr.clone())
                .unwrap_or(defaults.daemon_addr),
            backend: cli.backend.or(file.cli.backend).unwrap_or(defaults.backend),
            connect_timeout: file
                .cli
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            call_timeout: file
                .cli
                .call_timeout_secs
                .map_or(defaults.call_timeout, Duration::from_secs),
            metadata: cli.metadata && show_timestamps,
            task_store_path: file
                .daemon
                .task_store_path
                .clone()
                .unwrap_or(defaults.task_store_path),
            description_store_path: file
                .daemon
                .description_store_path
                .clone()
                .unwrap_or(defaults.description_store_path),
            log_level: if cli.verbose {
                "debug".to_string()
            } else {
                defaults.log_level
            },
            color: cli.color.enabled(),
        }
    }
}
