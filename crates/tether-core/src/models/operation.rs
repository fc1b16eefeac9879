//! Queued local operation model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A unique identifier for a queued operation, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of mutation carried by an operation or a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "insert" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!(
                "unknown operation type '{other}'"
            ))),
        }
    }
}

/// Local lifecycle of a queued operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting to be uploaded
    #[default]
    Pending,
    /// Acknowledged by the server
    Processed,
    /// Rejected by the server; retried after backoff
    Failed,
    /// Gave up after too many failed attempts
    Dead,
}

impl OperationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }

    /// Whether the operation still has to reach the server
    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl FromStr for OperationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            other => Err(Error::Database(format!(
                "unknown operation status '{other}'"
            ))),
        }
    }
}

/// `(table, id)` pair identifying a synced entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub table: String,
    pub id: String,
}

impl EntityKey {
    pub fn new(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.id)
    }
}

/// A mutation submitted by the application, before it is queued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub operation_type: OperationType,
    pub entity_table: String,
    pub entity_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl NewOperation {
    pub fn new(
        operation_type: OperationType,
        entity_table: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            operation_type,
            entity_table: entity_table.into(),
            entity_id: entity_id.into(),
            payload,
        }
    }

    pub fn create(
        entity_table: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(OperationType::Create, entity_table, entity_id, payload)
    }

    pub fn update(
        entity_table: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::new(OperationType::Update, entity_table, entity_id, payload)
    }

    pub fn delete(entity_table: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            OperationType::Delete,
            entity_table,
            entity_id,
            serde_json::Value::Null,
        )
    }

    /// Reject malformed table names, empty ids, and writes without a payload.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.entity_table)?;
        if self.entity_id.trim().is_empty() {
            return Err(Error::InvalidInput("entity id must not be empty".into()));
        }
        if self.operation_type != OperationType::Delete && self.payload.is_null() {
            return Err(Error::InvalidInput(format!(
                "{} on {}/{} requires a payload",
                self.operation_type, self.entity_table, self.entity_id
            )));
        }
        Ok(())
    }
}

/// A pending local mutation not yet acknowledged by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OperationId,
    pub operation_type: OperationType,
    pub entity_table: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub device_id: String,
    pub tenant_id: String,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    /// Earliest send time (Unix ms)
    pub scheduled_at: i64,
    #[serde(skip)]
    pub status: OperationStatus,
    #[serde(skip)]
    pub attempts: u32,
    #[serde(skip)]
    pub last_error: Option<String>,
}

impl QueuedOperation {
    /// Stamp a new operation for the given device and tenant
    #[must_use]
    pub fn from_new(
        op: NewOperation,
        device_id: impl Into<String>,
        tenant_id: impl Into<String>,
        now_ms: i64,
        delay_ms: i64,
    ) -> Self {
        Self {
            id: OperationId::new(),
            operation_type: op.operation_type,
            entity_table: op.entity_table,
            entity_id: op.entity_id,
            payload: op.payload,
            device_id: device_id.into(),
            tenant_id: tenant_id.into(),
            created_at: now_ms,
            scheduled_at: now_ms.saturating_add(delay_ms.max(0)),
            status: OperationStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    #[must_use]
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(&self.entity_table, &self.entity_id)
    }

    #[must_use]
    pub fn is_eligible_at(&self, now_ms: i64) -> bool {
        self.scheduled_at <= now_ms
    }
}

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("Invalid regex"))
}

/// Validate a synced table name (`snake_case`, at most 63 chars)
pub fn validate_table_name(table: &str) -> Result<()> {
    if table_name_pattern().is_match(table) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid table name '{table}': expected lowercase snake_case"
        )))
    }
}
