use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{backfill, Document, FieldPath, Patch};
use crate::errors::ModelError;

/// A chat participant's profile and economy state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub coins: i64,
    pub exp: i64,
    pub level: i64,
    /// Epoch milliseconds.
    pub last_active: i64,
    pub command_count: i64,
    pub message_count: i64,
    /// `YYYY-MM-DD` of the last claimed daily reward.
    pub last_daily_reward: Option<String>,
    /// Epoch milliseconds.
    pub join_date: i64,
    /// Fields written by older deployments or other tools.
    #[serde(flatten)]
    pub extra: Document,
}

impl UserRecord {
    /// Default shape for a participant seen for the first time.
    pub fn with_defaults(id: &str, name: Option<&str>, now_ms: i64) -> Self {
        Self {
            id: id.to_string(),
            name: name.unwrap_or_default().to_string(),
            coins: 0,
            exp: 0,
            level: 1,
            last_active: now_ms,
            command_count: 0,
            message_count: 0,
            last_daily_reward: None,
            join_date: now_ms,
            extra: Document::new(),
        }
    }

    pub fn to_document(&self) -> Document {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Document::new(),
        }
    }

    /// Decode a stored document, backfilling missing or malformed fields from `defaults`.
    pub fn from_document(stored: &Document, defaults: &Document) -> Result<Self, ModelError> {
        let filled = backfill(defaults, stored);
        if !filled.repaired.is_empty() {
            tracing::warn!(
                id = ?stored.get("id"),
                fields = ?filled.repaired,
                "user record had malformed fields; reset to defaults"
            );
        }
        serde_json::from_value(Value::Object(filled.doc)).map_err(|e| ModelError::Validation(e.to_string()))
    }
}

/// Default user document, as stored on first access.
pub fn defaults(id: &str, name: Option<&str>) -> Document {
    UserRecord::with_defaults(id, name, Utc::now().timestamp_millis()).to_document()
}

/// Partial update of a user. Every `Some` field replaces the stored value.
///
/// Values are final: pass the new balance, not the amount to add. Use
/// [`UserCounter`] with the store's increment operation for atomic counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coins: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<i64>,
    /// `Some(None)` clears the date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_daily_reward: Option<Option<String>>,
}

impl UserUpdate {
    pub fn coins(mut self, v: i64) -> Self {
        self.coins = Some(v);
        self
    }

    pub fn exp(mut self, v: i64) -> Self {
        self.exp = Some(v);
        self
    }

    pub fn level(mut self, v: i64) -> Self {
        self.level = Some(v);
        self
    }

    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = Some(v.into());
        self
    }

    pub fn last_daily_reward(mut self, v: Option<String>) -> Self {
        self.last_daily_reward = Some(v);
        self
    }
}

impl From<UserUpdate> for Patch {
    fn from(update: UserUpdate) -> Self {
        match serde_json::to_value(update) {
            Ok(Value::Object(fields)) => Patch::from_fields(fields),
            _ => Patch::new(),
        }
    }
}

/// Numeric user fields that support atomic increments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserCounter {
    Coins,
    Exp,
    CommandCount,
    MessageCount,
}

impl UserCounter {
    pub fn field(&self) -> &'static str {
        match self {
            UserCounter::Coins => "coins",
            UserCounter::Exp => "exp",
            UserCounter::CommandCount => "commandCount",
            UserCounter::MessageCount => "messageCount",
        }
    }

    pub fn path(&self) -> FieldPath {
        FieldPath::top(self.field())
    }
}
