use crate::errors::{WikiError, WikiResult};
use crate::host::{Notifier, UserDirectory};
use crate::models::{Category, CommitOutcome, Entry, EntryDraft, Role, UserInfo};
use crate::store::EntryStore;
use crate::sync::{Broadcaster, ChannelMessage};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_COMMENT_LENGTH: usize = 4_000;
pub const MAX_ENTRIES: usize = 5_000;
pub const MAX_COMMENTS_PER_ENTRY: usize = 500;

// Sole authority over who may change the shared collection and how. GMs
// write directly; players relay their proposal to a connected GM; with no
// GM online the write is blocked, which is an outcome rather than an error.
#[derive(Clone)]
pub struct WriteGateway {
    store: EntryStore,
    broadcaster: Broadcaster,
    users: Arc<dyn UserDirectory>,
}

impl WriteGateway {
    pub fn new(store: EntryStore, broadcaster: Broadcaster, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            store,
            broadcaster,
            users,
        }
    }

    pub fn commit(&self, entries: Vec<Entry>, actor: &UserInfo) -> WikiResult<CommitOutcome> {
        ensure_unique_ids(&entries)?;

        if actor.role.is_gm() {
            self.store.write(&entries)?;
            self.broadcaster.publish(&ChannelMessage::Refresh)?;
            tracing::info!(user = %actor.name, count = entries.len(), "committed entry collection");
            return Ok(CommitOutcome::Committed);
        }

        let gm_online = self
            .users
            .connected_users()
            .iter()
            .any(|user| user.role.is_gm());
        if !gm_online {
            tracing::info!(user = %actor.name, "write blocked, no gm connected");
            return Ok(CommitOutcome::Blocked);
        }

        // Fire-and-forget: the relay does not wait for the GM-side commit.
        let based_on = newest_update(&self.store.read()?);
        self.broadcaster
            .publish(&ChannelMessage::RequestSave { entries, based_on })?;
        tracing::info!(user = %actor.name, "relayed save request to connected gm");
        Ok(CommitOutcome::Relayed)
    }

    // GM-side handler for a relayed proposal. Non-GM receivers drop it
    // silently. Returns whether the collection was applied locally.
    pub fn apply_relayed_save(
        &self,
        entries: Vec<Entry>,
        based_on: Option<DateTime<Utc>>,
        local_user: &UserInfo,
        notifier: &dyn Notifier,
    ) -> WikiResult<bool> {
        if !local_user.role.is_gm() {
            tracing::debug!(user = %local_user.name, "dropping relayed save on non-gm replica");
            return Ok(false);
        }

        let current = self.store.read()?;
        if store_advanced_past(&current, based_on) {
            tracing::warn!(
                entries = entries.len(),
                "relayed save based on stale state, applying last-write-wins"
            );
            notifier.warn("A relayed save overwrote changes committed in the meantime.");
        }

        ensure_unique_ids(&entries)?;
        self.store.write(&entries)?;
        self.broadcaster.publish(&ChannelMessage::Refresh)?;
        tracing::info!(count = entries.len(), "applied relayed entry collection");
        Ok(true)
    }
}

fn ensure_unique_ids(entries: &[Entry]) -> WikiResult<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(entry.id.as_str()) {
            return Err(WikiError::Internal(format!(
                "duplicate entry id '{}' in proposed collection",
                entry.id
            )));
        }
    }
    Ok(())
}

pub fn newest_update(entries: &[Entry]) -> Option<DateTime<Utc>> {
    entries.iter().map(|entry| entry.updated_at).max()
}

fn store_advanced_past(current: &[Entry], based_on: Option<DateTime<Utc>>) -> bool {
    match (newest_update(current), based_on) {
        (Some(newest), Some(watermark)) => newest > watermark,
        (Some(_), None) => true,
        _ => false,
    }
}

pub fn require_gm(actor: &UserInfo, action: &str) -> WikiResult<()> {
    if actor.role.is_gm() {
        Ok(())
    } else {
        Err(WikiError::Permission(format!("{action} requires GM privileges")))
    }
}

pub fn can_delete_comment(actor: &UserInfo, comment_owner_id: &str) -> bool {
    actor.role == Role::Gm || actor.id == comment_owner_id
}

pub fn validate_draft(draft: &EntryDraft) -> WikiResult<()> {
    if draft.title.trim().is_empty() {
        return Err(WikiError::Validation("Entry title cannot be empty".to_string()));
    }
    if draft.title.chars().count() > MAX_TITLE_LENGTH {
        return Err(WikiError::Validation(format!(
            "Entry title exceeds {MAX_TITLE_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_comment_text(text: &str) -> WikiResult<()> {
    if text.trim().is_empty() {
        return Err(WikiError::Validation("Comment text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(WikiError::Validation(format!(
            "Comment exceeds {MAX_COMMENT_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_categories(categories: &[Category]) -> WikiResult<()> {
    if categories.is_empty() {
        return Err(WikiError::Validation(
            "At least one category must remain configured".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for category in categories {
        if category.label.trim().is_empty() {
            return Err(WikiError::Validation(format!(
                "Category '{}' has an empty label",
                category.id
            )));
        }
        if !seen.insert(category.id.as_str()) {
            return Err(WikiError::Validation(format!(
                "Duplicate category id '{}'",
                category.id
            )));
        }
    }
    Ok(())
}
