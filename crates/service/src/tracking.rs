//! Activity counters bumped by the bot on every command and message.
//!
//! Each call issues one patch per record with `inc` operations, so counts are
//! never lost to concurrent read-modify-write sequences.

use chrono::Utc;
use models::group::message_count_path;
use models::user;
use models::{Collection, FieldPath, GroupRecord, Patch, UserCounter, UserRecord};

use crate::errors::StoreError;
use crate::store::{check_id, Store};

impl Store {
    /// Record that `user_id` ran a command, optionally inside `group_id`.
    pub async fn track_command(
        &self,
        user_id: &str,
        name_hint: Option<&str>,
        group_id: Option<&str>,
    ) -> Result<UserRecord, StoreError> {
        let patch = activity_patch(UserCounter::CommandCount, name_hint)?;
        let user = self.patch_user(user_id, name_hint, patch).await?;

        if let Some(group_id) = group_id {
            self.update_group(group_id, Patch::new().inc(FieldPath::parse("commandCount")?, 1)).await?;
        }
        Ok(user)
    }

    /// Record a chat message from `user_id` in `group_id`: bumps the user's
    /// total and the member's entry in the group's `messageCounts`.
    pub async fn track_message(
        &self,
        group_id: &str,
        user_id: &str,
        name_hint: Option<&str>,
    ) -> Result<(UserRecord, GroupRecord), StoreError> {
        check_id("group", group_id)?;
        check_id("user", user_id)?;

        let patch = activity_patch(UserCounter::MessageCount, name_hint)?;
        let user = self.patch_user(user_id, name_hint, patch).await?;

        // Normalises a list-encoded messageCounts before incrementing into it.
        self.get_group(group_id).await?;
        let group = self
            .update_group(group_id, Patch::new().inc(message_count_path(user_id)?, 1))
            .await?;
        Ok((user, group))
    }

    async fn patch_user(&self, id: &str, name_hint: Option<&str>, patch: Patch) -> Result<UserRecord, StoreError> {
        check_id("user", id)?;
        let defaults = user::defaults(id, name_hint);
        let doc = self.backend().merge_update(Collection::Users, id, &defaults, &patch).await?;
        Ok(UserRecord::from_document(&doc, &defaults)?)
    }
}

fn activity_patch(counter: UserCounter, name_hint: Option<&str>) -> Result<Patch, StoreError> {
    let mut patch = Patch::new()
        .inc(counter.path(), 1)
        .set(FieldPath::parse("lastActive")?, Utc::now().timestamp_millis());
    if let Some(name) = name_hint.filter(|n| !n.is_empty()) {
        patch = patch.set(FieldPath::parse("name")?, name);
    }
    Ok(patch)
}
