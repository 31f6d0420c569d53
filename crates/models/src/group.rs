use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::counts::MessageCounts;
use crate::document::{backfill, Document, FieldPath, Patch};
use crate::errors::ModelError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    pub prefix: String,
    pub welcome_disabled: bool,
    /// Custom welcome text; `None` means the bot's built-in greeting.
    pub welcome_message: Option<String>,
    pub goodbye_disabled: bool,
    pub admin_only: bool,
    #[serde(flatten)]
    pub extra: Document,
}

impl GroupSettings {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            welcome_disabled: false,
            welcome_message: None,
            goodbye_disabled: false,
            admin_only: false,
            extra: Document::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default = "default_role")]
    pub role: String,
}

impl Member {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: default_role() }
    }
}

fn default_role() -> String {
    "member".into()
}

/// Per-group configuration and activity counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: String,
    pub settings: GroupSettings,
    pub command_count: i64,
    #[serde(deserialize_with = "lenient_members")]
    pub members: Vec<Member>,
    pub message_counts: MessageCounts,
    #[serde(flatten)]
    pub extra: Document,
}

impl GroupRecord {
    pub fn with_defaults(id: &str, prefix: &str) -> Self {
        Self {
            id: id.to_string(),
            settings: GroupSettings::with_prefix(prefix),
            command_count: 0,
            members: Vec::new(),
            message_counts: MessageCounts::new(),
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
        let filled = match legacy_counts(stored) {
            Some(counts) => {
                let mut stored = stored.clone();
                stored.insert("messageCounts".into(), counts_value(&counts));
                backfill(defaults, &stored)
            }
            None => backfill(defaults, stored),
        };
        if !filled.repaired.is_empty() {
            tracing::warn!(
                id = ?stored.get("id"),
                fields = ?filled.repaired,
                "group record had malformed fields; reset to defaults"
            );
        }
        serde_json::from_value(Value::Object(filled.doc)).map_err(|e| ModelError::Validation(e.to_string()))
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }
}

/// `messageCounts` decoded from the entry-list encoding, if the stored
/// document uses it. `None` for the object encoding or when absent.
pub fn legacy_counts(stored: &Document) -> Option<MessageCounts> {
    match stored.get("messageCounts") {
        Some(v @ Value::Array(_)) => serde_json::from_value(v.clone()).ok(),
        _ => None,
    }
}

pub fn counts_value(counts: &MessageCounts) -> Value {
    serde_json::to_value(counts).unwrap_or_else(|_| Value::Object(Document::new()))
}

/// Default group document; `prefix` is the bot-wide command prefix.
pub fn defaults(id: &str, prefix: &str) -> Document {
    GroupRecord::with_defaults(id, prefix).to_document()
}

// Entries that are not `{id, role?}` objects are dropped instead of failing the record.
fn lenient_members<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Member>, D::Error> {
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect())
}

/// Partial update of `settings`. Each field is written by dotted path so
/// sibling settings stay as stored.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goodbye_disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_only: Option<bool>,
}

/// Partial update of a group. Every `Some` field replaces the stored value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupUpdate {
    pub settings: SettingsUpdate,
    pub command_count: Option<i64>,
    pub members: Option<Vec<Member>>,
    pub message_counts: Option<MessageCounts>,
}

impl GroupUpdate {
    pub fn prefix(mut self, v: impl Into<String>) -> Self {
        self.settings.prefix = Some(v.into());
        self
    }

    pub fn welcome_disabled(mut self, v: bool) -> Self {
        self.settings.welcome_disabled = Some(v);
        self
    }

    pub fn welcome_message(mut self, v: Option<String>) -> Self {
        self.settings.welcome_message = Some(v);
        self
    }

    pub fn goodbye_disabled(mut self, v: bool) -> Self {
        self.settings.goodbye_disabled = Some(v);
        self
    }

    pub fn admin_only(mut self, v: bool) -> Self {
        self.settings.admin_only = Some(v);
        self
    }

    pub fn members(mut self, v: Vec<Member>) -> Self {
        self.members = Some(v);
        self
    }
}

impl From<GroupUpdate> for Patch {
    fn from(update: GroupUpdate) -> Self {
        let mut patch = Patch::new();
        if let Ok(Value::Object(settings)) = serde_json::to_value(&update.settings) {
            for (key, value) in settings {
                patch = patch.set(FieldPath::nested("settings", &key), value);
            }
        }
        if let Some(n) = update.command_count {
            patch = patch.set(FieldPath::top("commandCount"), n);
        }
        if let Some(members) = update.members {
            patch = patch.set(FieldPath::top("members"), serde_json::to_value(members).unwrap_or(Value::Array(Vec::new())));
        }
        if let Some(counts) = update.message_counts {
            patch = patch.set(FieldPath::top("messageCounts"), counts_value(&counts));
        }
        patch
    }
}

/// Path of one member's entry in `messageCounts`.
pub fn message_count_path(member: &str) -> Result<FieldPath, ModelError> {
    FieldPath::new(["messageCounts", member])
}
