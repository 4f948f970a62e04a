//! Client error type.

use rsd_daemon::config::ConfigError;
use rsd_daemon::service::ServiceError;

use crate::connection::ConnectionError;

/// Errors surfaced to the `rsd` binary.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Talking to the daemon failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The local backend failed.
    #[error(transparent)]
    Local(#[from] ServiceError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing to the terminal failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
