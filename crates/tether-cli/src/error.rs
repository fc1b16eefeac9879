use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tether_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync did not complete; see the log output above")]
    SyncFailed,
    #[error(
        "Sync is not configured. Run `tether config init --api-base-url <URL> --tenant-id <ID>`, or set TETHER_API_BASE_URL and TETHER_TENANT_ID."
    )]
    SyncNotConfigured,
}
