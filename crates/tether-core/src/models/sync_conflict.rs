//! Sync conflict model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::EntityKey;
use crate::error::{Error, Result};

/// How a conflict between a local write and a remote change is settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    ServerWins,
    ClientWins,
    /// Deferred to the caller
    #[default]
    Manual,
}

impl ResolutionStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerWins => "server_wins",
            Self::ClientWins => "client_wins",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub const fn is_automatic(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "server_wins" | "server" => Ok(Self::ServerWins),
            "client_wins" | "client" => Ok(Self::ClientWins),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution strategy '{other}'"
            ))),
        }
    }
}

/// A local pending write and a remote change that target the same entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub conflict_id: String,
    pub entity_table: String,
    pub entity_id: String,
    #[serde(default)]
    pub local_value: serde_json::Value,
    #[serde(default)]
    pub remote_value: serde_json::Value,
    pub resolution_strategy: ResolutionStrategy,
}

impl SyncConflict {
    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(&self.entity_table, &self.entity_id)
    }

    /// Value submitted when the conflict is settled with `strategy`
    /// and the caller supplied nothing explicit.
    #[must_use]
    pub fn default_resolution_value(&self, strategy: ResolutionStrategy) -> Option<serde_json::Value> {
        let value = match strategy {
            ResolutionStrategy::ClientWins => &self.local_value,
            ResolutionStrategy::ServerWins => &self.remote_value,
            ResolutionStrategy::Manual => return None,
        };
        (!value.is_null()).then(|| value.clone())
    }
}

/// A conflict as recorded in the local store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredConflict {
    #[serde(flatten)]
    pub conflict: SyncConflict,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
    /// Resolution timestamp (Unix ms), `None` while open
    pub resolved_at: Option<i64>,
    /// Strategy that was actually applied
    pub resolved_with: Option<ResolutionStrategy>,
}

impl StoredConflict {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}
