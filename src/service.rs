use crate::errors::{WikiError, WikiResult};
use crate::gateway::{
    can_delete_comment, require_gm, validate_categories, validate_comment_text, validate_draft,
    WriteGateway, MAX_COMMENTS_PER_ENTRY, MAX_ENTRIES,
};
use crate::host::{MessageChannel, Notifier, SettingsStore, UserDirectory};
use crate::models::{Category, Comment, CommitOutcome, Entry, EntryDraft, SaveReceipt, UserInfo};
use crate::presence::{PresenceTracker, WindowRegistry};
use crate::projection::{build_projection, render_references, ViewQuery, WikiProjection};
use crate::store::{EntryStore, CATEGORIES_KEY, ENTRIES_KEY};
use crate::sync::{Broadcaster, ChannelMessage};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

// Per-client orchestrator. One WikiCore lives in every connected client and
// wires the store, gateway, presence tracker, and broadcaster to the host
// signals; replicas converge through refresh broadcasts plus the storage
// change fallback.
#[derive(Clone)]
pub struct WikiCore {
    store: EntryStore,
    gateway: WriteGateway,
    presence: PresenceTracker,
    windows: WindowRegistry,
    broadcaster: Broadcaster,
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    refresh_hooks: Arc<Mutex<Vec<RefreshHook>>>,
    editor_focus_hook: Arc<Mutex<Option<RefreshHook>>>,
    query: Arc<Mutex<ViewQuery>>,
}

impl WikiCore {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        channel: Arc<dyn MessageChannel>,
        users: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let store = EntryStore::new(settings);
        let broadcaster = Broadcaster::new(channel);
        let gateway = WriteGateway::new(store.clone(), broadcaster.clone(), users.clone());

        Arc::new(Self {
            store,
            gateway,
            presence: PresenceTracker::new(),
            windows: WindowRegistry::new(),
            broadcaster,
            users,
            notifier,
            refresh_hooks: Arc::new(Mutex::new(Vec::new())),
            editor_focus_hook: Arc::new(Mutex::new(None)),
            query: Arc::new(Mutex::new(ViewQuery::default())),
        })
    }

    pub fn current_user(&self) -> UserInfo {
        self.users.current_user()
    }

    pub fn entries(&self) -> WikiResult<Vec<Entry>> {
        self.store.read()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.store.read_categories()
    }

    // ─── Entry mutators ─────────────────────────────────────────────────────

    pub async fn save_entry(&self, draft: EntryDraft) -> WikiResult<SaveReceipt> {
        let actor = self.users.current_user();
        validate_draft(&draft).map_err(|err| self.deny(err))?;

        let mut entries = self.store.read()?;
        let entry_id = match &draft.id {
            Some(id) => {
                let index = entry_index_for(&entries, id, &actor)?;
                let entry = &mut entries[index];
                entry.title = draft.title.trim().to_string();
                entry.category = draft.category.clone();
                entry.content = draft.content.clone();
                // Saving through the editor implicitly withdraws a pending
                // deletion request.
                entry.pending_delete = false;
                entry.updated_at = Utc::now();
                entry.updated_by = actor.name.clone();
                id.clone()
            }
            None => {
                if entries.len() >= MAX_ENTRIES {
                    return Err(self.deny(WikiError::Validation(format!(
                        "Entry limit of {MAX_ENTRIES} reached"
                    ))));
                }
                let now = Utc::now();
                let id = Uuid::new_v4().to_string();
                entries.push(Entry {
                    id: id.clone(),
                    title: draft.title.trim().to_string(),
                    category: draft.category.clone(),
                    content: draft.content.clone(),
                    hidden: false,
                    pending_delete: false,
                    created_at: now,
                    updated_at: now,
                    created_by: actor.name.clone(),
                    updated_by: actor.name.clone(),
                    gm_notes: String::new(),
                    comments: Vec::new(),
                });
                id
            }
        };

        let outcome = self.finish_commit(entries, &actor).await?;
        Ok(SaveReceipt { entry_id, outcome })
    }

    pub async fn request_delete(&self, entry_id: &str) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;
        entries[index].pending_delete = true;
        tracing::info!(entry_id = %entry_id, user = %actor.name, "deletion requested");
        self.finish_commit(entries, &actor).await
    }

    pub async fn cancel_delete(&self, entry_id: &str) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        require_gm(&actor, "Cancelling a deletion request").map_err(|err| self.deny(err))?;

        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;
        entries[index].pending_delete = false;
        self.finish_commit(entries, &actor).await
    }

    pub async fn delete_entry(&self, entry_id: &str) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        require_gm(&actor, "Deleting an entry").map_err(|err| self.deny(err))?;

        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;
        let removed = entries.remove(index);
        tracing::info!(entry_id = %removed.id, title = %removed.title, "entry deleted");
        self.finish_commit(entries, &actor).await
    }

    pub async fn set_hidden(&self, entry_id: &str, hidden: bool) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        require_gm(&actor, "Changing entry visibility").map_err(|err| self.deny(err))?;

        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;
        entries[index].hidden = hidden;
        self.finish_commit(entries, &actor).await
    }

    // GM notes are side-channel annotations: they do not bump updatedAt.
    pub async fn save_gm_notes(&self, entry_id: &str, notes: &str) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        require_gm(&actor, "Editing GM notes").map_err(|err| self.deny(err))?;

        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;
        entries[index].gm_notes = notes.to_string();
        self.finish_commit(entries, &actor).await
    }

    pub async fn add_comment(&self, entry_id: &str, text: &str) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        validate_comment_text(text).map_err(|err| self.deny(err))?;

        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;
        if entries[index].comments.len() >= MAX_COMMENTS_PER_ENTRY {
            return Err(self.deny(WikiError::Validation(format!(
                "Comment limit of {MAX_COMMENTS_PER_ENTRY} reached for this entry"
            ))));
        }
        entries[index].comments.push(Comment {
            id: Uuid::new_v4().to_string(),
            author_name: actor.name.clone(),
            user_id: actor.id.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        });
        self.finish_commit(entries, &actor).await
    }

    pub async fn delete_comment(&self, entry_id: &str, comment_id: &str) -> WikiResult<CommitOutcome> {
        let actor = self.users.current_user();
        let mut entries = self.store.read()?;
        let index = entry_index_for(&entries, entry_id, &actor)?;

        let position = entries[index]
            .comments
            .iter()
            .position(|comment| comment.id == comment_id)
            .ok_or_else(|| WikiError::NotFound(format!("Comment '{comment_id}' does not exist")))?;

        let owner_id = entries[index].comments[position].user_id.clone();
        if !can_delete_comment(&actor, &owner_id) {
            return Err(self.deny(WikiError::Permission(
                "Only the comment author or a GM may delete a comment".to_string(),
            )));
        }

        entries[index].comments.remove(position);
        self.finish_commit(entries, &actor).await
    }

    pub async fn save_categories(&self, categories: Vec<Category>) -> WikiResult<()> {
        let actor = self.users.current_user();
        require_gm(&actor, "Editing categories").map_err(|err| self.deny(err))?;
        validate_categories(&categories).map_err(|err| self.deny(err))?;

        self.store.write_categories(&categories)?;
        self.broadcaster.publish(&ChannelMessage::CategoriesChanged)?;
        tracing::info!(count = categories.len(), "category set updated");
        self.run_refresh().await;
        Ok(())
    }

    async fn finish_commit(&self, entries: Vec<Entry>, actor: &UserInfo) -> WikiResult<CommitOutcome> {
        let outcome = self.gateway.commit(entries, actor)?;
        match outcome {
            CommitOutcome::Committed => self.run_refresh().await,
            CommitOutcome::Blocked => self.notifier.warn(
                "No GM is connected. Your changes were not saved; keep the editor open and retry once a GM joins.",
            ),
            CommitOutcome::Relayed => {}
        }
        Ok(outcome)
    }

    // ─── Editing presence ───────────────────────────────────────────────────

    pub async fn begin_editing(&self, entry_id: &str) -> WikiResult<()> {
        let actor = self.users.current_user();
        let entries = self.store.read()?;
        entry_index_for(&entries, entry_id, &actor)?;

        if let Some(holder) = self.presence.holder(entry_id).await {
            if holder.user_id != actor.id {
                self.notifier
                    .warn(&format!("{} is already editing this entry.", holder.user_name));
            }
        }

        self.windows.open(entry_id).await;
        self.presence.apply_start(entry_id, &actor.id, &actor.name).await;
        self.broadcaster.publish(&ChannelMessage::EditingStart {
            entry_id: entry_id.to_string(),
            user_name: actor.name.clone(),
            user_id: actor.id.clone(),
        })?;
        Ok(())
    }

    pub async fn end_editing(&self, entry_id: &str) -> WikiResult<()> {
        let actor = self.users.current_user();
        self.windows.close(entry_id).await;
        self.presence.apply_stop(entry_id, &actor.id).await;
        self.broadcaster.publish(&ChannelMessage::EditingStop {
            entry_id: entry_id.to_string(),
            user_id: actor.id.clone(),
        })?;
        Ok(())
    }

    // ─── View state & projection ────────────────────────────────────────────

    pub async fn select_entry(&self, entry_id: Option<String>) {
        let mut query = self.query.lock().await;
        query.selected = entry_id;
    }

    pub async fn set_search(&self, search: Option<String>) {
        let mut query = self.query.lock().await;
        query.search = search;
    }

    pub async fn set_category_filter(&self, category: Option<String>) {
        let mut query = self.query.lock().await;
        query.category = category;
    }

    pub async fn projection(&self) -> WikiResult<WikiProjection> {
        let actor = self.users.current_user();
        let entries = self.store.read()?;
        let categories = self.store.read_categories();
        let presence = self.presence.snapshot().await;

        let mut query = self.query.lock().await;
        let projection = build_projection(&entries, &categories, actor.role, &presence, &query);
        if query.selected != projection.selected {
            tracing::debug!("cleared selection of a no-longer-visible entry");
            query.selected = projection.selected.clone();
        }
        Ok(projection)
    }

    pub fn render_content(&self, content: &str) -> WikiResult<String> {
        let actor = self.users.current_user();
        let entries = self.store.read()?;
        Ok(render_references(content, &entries, actor.role))
    }

    // ─── Refresh plumbing ───────────────────────────────────────────────────

    pub async fn on_refresh(&self, hook: RefreshHook) {
        let mut hooks = self.refresh_hooks.lock().await;
        hooks.push(hook);
    }

    pub async fn set_editor_focus_hook(&self, hook: RefreshHook) {
        let mut slot = self.editor_focus_hook.lock().await;
        *slot = Some(hook);
    }

    // Refresh listeners run first; a locally open modal editor gets its
    // focus reasserted only after the whole re-render batch settles.
    async fn run_refresh(&self) {
        let hooks = { self.refresh_hooks.lock().await.clone() };
        for hook in &hooks {
            hook();
        }
        if self.windows.any_open().await {
            let focus = { self.editor_focus_hook.lock().await.clone() };
            if let Some(focus) = focus {
                focus();
            }
        }
    }

    // ─── Host signal handlers ───────────────────────────────────────────────

    pub async fn handle_message(&self, raw: serde_json::Value) -> WikiResult<()> {
        let Some(message) = Broadcaster::decode(raw) else {
            return Ok(());
        };

        match message {
            ChannelMessage::RequestSave { entries, based_on } => {
                let local = self.users.current_user();
                let applied = self.gateway.apply_relayed_save(
                    entries,
                    based_on,
                    &local,
                    self.notifier.as_ref(),
                )?;
                if applied {
                    self.run_refresh().await;
                }
            }
            ChannelMessage::Refresh | ChannelMessage::CategoriesChanged => {
                self.run_refresh().await;
            }
            ChannelMessage::EditingStart {
                entry_id,
                user_name,
                user_id,
            } => {
                self.presence.apply_start(&entry_id, &user_id, &user_name).await;
                self.run_refresh().await;
            }
            ChannelMessage::EditingStop { entry_id, user_id } => {
                self.presence.apply_stop(&entry_id, &user_id).await;
                self.run_refresh().await;
            }
        }
        Ok(())
    }

    // Storage-level change notification: the convergence fallback when a
    // refresh broadcast never arrived.
    pub async fn handle_storage_changed(&self, key: &str) {
        if key == ENTRIES_KEY || key == CATEGORIES_KEY {
            self.run_refresh().await;
        }
    }

    pub async fn handle_user_disconnected(&self, user_id: &str) {
        let released = self.presence.purge_user(user_id).await;
        if !released.is_empty() {
            self.run_refresh().await;
        }
    }

    fn deny(&self, err: WikiError) -> WikiError {
        self.notifier.warn(&err.to_string());
        err
    }
}

// Players address only entries they can see; a hidden entry behaves exactly
// like a missing one for them.
fn entry_index_for(entries: &[Entry], entry_id: &str, actor: &UserInfo) -> WikiResult<usize> {
    entries
        .iter()
        .position(|entry| entry.id == entry_id)
        .filter(|&index| actor.role.is_gm() || !entries[index].hidden)
        .ok_or_else(|| WikiError::NotFound(format!("Entry '{entry_id}' does not exist")))
}
