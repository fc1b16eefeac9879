//! Engine-wide sync state reported to hosts.

use std::fmt;

/// Coarse sync state of an engine instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has completed yet.
    #[default]
    Idle,
    /// Host reported the device as offline.
    Offline,
    Syncing,
    Synced,
    /// Last cycle aborted with a transport or storage error.
    Error,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}
