//! Backend-agnostic record store used by the bot's commands.

use std::sync::Arc;

use models::group::{self, counts_value, legacy_counts};
use models::user;
use models::{Collection, Document, FieldPath, GroupRecord, Patch, UserCounter, UserRecord};
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::StoreError;
use crate::query::{Filter, ListQuery};
use crate::storage::{BackendMode, DocumentBackend};

/// Typed user and group operations over whichever backend was selected at startup.
///
/// Identifiers are stored exactly as given; use [`models::normalize_id`]
/// beforehand when the caller has a raw participant id.
pub struct Store {
    backend: Arc<dyn DocumentBackend>,
    default_prefix: String,
}

impl Store {
    pub fn new(backend: Arc<dyn DocumentBackend>, default_prefix: impl Into<String>) -> Self {
        Self { backend, default_prefix: default_prefix.into() }
    }

    /// Active backend. For diagnostics only.
    pub fn mode(&self) -> BackendMode {
        self.backend.mode()
    }

    pub fn default_prefix(&self) -> &str {
        &self.default_prefix
    }

    pub(crate) fn backend(&self) -> &dyn DocumentBackend {
        self.backend.as_ref()
    }

    /// Existing user, or a new one with default fields. A differing non-empty
    /// `name_hint` replaces the stored name.
    pub async fn get_user(&self, id: &str, name_hint: Option<&str>) -> Result<UserRecord, StoreError> {
        check_id("user", id)?;
        let defaults = user::defaults(id, name_hint);
        let doc = self
            .backend
            .get_or_create(Collection::Users, id, &defaults)
            .await
            .inspect_err(|e| error!(collection = "users", id, error = %e, "get_user failed"))?;
        let record = UserRecord::from_document(&doc, &defaults)?;

        match name_hint.filter(|n| !n.is_empty() && *n != record.name) {
            Some(name) => {
                debug!(id, name, "refreshing user name");
                self.update_user(id, Patch::new().set(FieldPath::parse("name")?, name)).await
            }
            None => Ok(record),
        }
    }

    /// Replace the given fields and return the updated user. Creates the user
    /// with defaults first if needed.
    pub async fn update_user(&self, id: &str, update: impl Into<Patch>) -> Result<UserRecord, StoreError> {
        check_id("user", id)?;
        let defaults = user::defaults(id, None);
        let doc = self
            .backend
            .merge_update(Collection::Users, id, &defaults, &update.into())
            .await
            .inspect_err(|e| error!(collection = "users", id, error = %e, "update_user failed"))?;
        Ok(UserRecord::from_document(&doc, &defaults)?)
    }

    /// Atomically add `delta` to one of the user's counters.
    pub async fn increment_user(&self, id: &str, counter: UserCounter, delta: i64) -> Result<UserRecord, StoreError> {
        self.update_user(id, Patch::new().inc(counter.path(), delta)).await
    }

    /// Existing group, or a new one with default settings. An empty stored
    /// prefix is replaced by the default prefix and a list-encoded
    /// `messageCounts` is rewritten as an object; both fixes are persisted.
    pub async fn get_group(&self, id: &str) -> Result<GroupRecord, StoreError> {
        check_id("group", id)?;
        let defaults = group::defaults(id, &self.default_prefix);
        let doc = self
            .backend
            .get_or_create(Collection::Groups, id, &defaults)
            .await
            .inspect_err(|e| error!(collection = "groups", id, error = %e, "get_group failed"))?;

        let repair = group_repairs(&doc, &self.default_prefix)?;
        if repair.is_empty() {
            return Ok(GroupRecord::from_document(&doc, &defaults)?);
        }
        debug!(id, ops = repair.ops().len(), "repairing stored group");
        self.update_group(id, repair).await
    }

    /// Replace the given fields and return the updated group. Settings are
    /// written field by field so untouched settings keep their stored values.
    pub async fn update_group(&self, id: &str, update: impl Into<Patch>) -> Result<GroupRecord, StoreError> {
        check_id("group", id)?;
        let defaults = group::defaults(id, &self.default_prefix);
        let doc = self
            .backend
            .merge_update(Collection::Groups, id, &defaults, &update.into())
            .await
            .inspect_err(|e| error!(collection = "groups", id, error = %e, "update_group failed"))?;
        Ok(GroupRecord::from_document(&doc, &defaults)?)
    }

    /// Users matching `filter`, sorted by `sort` (`-field` or `field` highest
    /// first, `+field` lowest first), at most `limit` of them (0 for all).
    pub async fn list_users(&self, sort: &str, limit: usize, filter: Filter) -> Result<Vec<UserRecord>, StoreError> {
        let query = ListQuery::parse(sort, limit, filter)?;
        let docs = self
            .backend
            .list(Collection::Users, &query, &listing_defaults(user::defaults("", None)))
            .await
            .inspect_err(|e| error!(collection = "users", sort, error = %e, "list_users failed"))?;
        docs.iter()
            .map(|doc| UserRecord::from_document(doc, &user::defaults(doc_id(doc), None)).map_err(StoreError::from))
            .collect()
    }

    /// Group counterpart of [`Store::list_users`].
    pub async fn list_groups(&self, sort: &str, limit: usize, filter: Filter) -> Result<Vec<GroupRecord>, StoreError> {
        let query = ListQuery::parse(sort, limit, filter)?;
        let docs = self
            .backend
            .list(Collection::Groups, &query, &listing_defaults(group::defaults("", &self.default_prefix)))
            .await
            .inspect_err(|e| error!(collection = "groups", sort, error = %e, "list_groups failed"))?;
        docs.iter()
            .map(|doc| GroupRecord::from_document(doc, &group::defaults(doc_id(doc), &self.default_prefix)).map_err(StoreError::from))
            .collect()
    }
}

pub(crate) fn check_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::empty_id(kind));
    }
    Ok(())
}

fn doc_id(doc: &Document) -> &str {
    doc.get("id").and_then(Value::as_str).unwrap_or_default()
}

// Identity is never defaulted when filtering.
fn listing_defaults(mut defaults: Document) -> Document {
    defaults.remove("id");
    defaults
}

/// Fixes persisted on read: empty prefix and entry-list message counts.
fn group_repairs(doc: &Document, default_prefix: &str) -> Result<Patch, StoreError> {
    let mut patch = Patch::new();
    let prefix = doc.get("settings").and_then(|s| s.get("prefix"));
    if !matches!(prefix, Some(Value::String(p)) if !p.is_empty()) {
        patch = patch.set(FieldPath::parse("settings.prefix")?, default_prefix);
    }
    if let Some(counts) = legacy_counts(doc) {
        patch = patch.set(FieldPath::parse("messageCounts")?, counts_value(&counts));
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(matches!(check_id("user", ""), Err(StoreError::Validation(_))));
        assert!(matches!(check_id("group", "  "), Err(StoreError::Validation(_))));
        assert!(check_id("user", "1@x").is_ok());
    }

    #[test]
    fn repairs_only_what_is_broken() {
        let healthy = doc(json!({"settings": {"prefix": "#"}, "messageCounts": {"a": 1}}));
        assert!(group_repairs(&healthy, "!").unwrap().is_empty());

        let broken = doc(json!({"settings": {"prefix": ""}, "messageCounts": [{"id": "a", "count": 2}]}));
        let patch = group_repairs(&broken, "!").unwrap();
        assert_eq!(
            patch.to_json(),
            json!([
                {"path": ["settings", "prefix"], "set": "!"},
                {"path": ["messageCounts"], "set": {"a": 2}}
            ])
        );
    }

    #[test]
    fn listing_defaults_drop_identity() {
        let d = listing_defaults(user::defaults("x", None));
        assert!(!d.contains_key("id"));
        assert_eq!(d["level"], json!(1));
    }
}
