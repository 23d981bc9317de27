use crate::models::{Category, Comment, Entry, Role};
use crate::presence::EditorPresence;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const UNCATEGORIZED_ID: &str = "uncategorized";

static CROSSREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").expect("valid crossref regex"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub selected: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub hidden: bool,
    pub pending_delete: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gm_notes: Option<String>,
    pub comments: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editing_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiProjection {
    pub categories: Vec<Category>,
    pub entries: Vec<EntryView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

pub fn visible_entries<'a>(entries: &'a [Entry], role: Role) -> Vec<&'a Entry> {
    entries
        .iter()
        .filter(|entry| role.is_gm() || !entry.hidden)
        .collect()
}

// Builds the role-redacted view model. Hidden entries are fully absent for
// players, gmNotes never leaves this function for a non-GM role, and a
// selection pointing at a no-longer-visible entry comes back cleared.
pub fn build_projection(
    entries: &[Entry],
    categories: &[Category],
    role: Role,
    presence: &HashMap<String, EditorPresence>,
    query: &ViewQuery,
) -> WikiProjection {
    let visible = visible_entries(entries, role);

    let selected = query.selected.as_ref().and_then(|id| {
        visible
            .iter()
            .any(|entry| &entry.id == id)
            .then(|| id.clone())
    });

    let known_ids: HashSet<&str> = categories.iter().map(|category| category.id.as_str()).collect();
    let search = query
        .search
        .as_deref()
        .map(str::to_lowercase)
        .filter(|needle| !needle.is_empty());

    let mut rows: Vec<EntryView> = visible
        .into_iter()
        .filter_map(|entry| {
            let category = if known_ids.contains(entry.category.as_str()) {
                entry.category.clone()
            } else {
                UNCATEGORIZED_ID.to_string()
            };

            if let Some(wanted) = query.category.as_deref() {
                if category != wanted {
                    return None;
                }
            }

            if let Some(needle) = search.as_deref() {
                let matches = entry.title.to_lowercase().contains(needle)
                    || entry.content.to_lowercase().contains(needle);
                if !matches {
                    return None;
                }
            }

            Some(EntryView {
                id: entry.id.clone(),
                title: entry.title.clone(),
                category,
                content: entry.content.clone(),
                hidden: entry.hidden,
                pending_delete: entry.pending_delete,
                created_at: entry.created_at,
                updated_at: entry.updated_at,
                created_by: entry.created_by.clone(),
                updated_by: entry.updated_by.clone(),
                gm_notes: role.is_gm().then(|| entry.gm_notes.clone()),
                comments: entry.comments.clone(),
                editing_by: presence.get(&entry.id).map(|holder| holder.user_name.clone()),
            })
        })
        .collect();

    rows.sort_by_key(|row| row.title.to_lowercase());

    WikiProjection {
        categories: categories.to_vec(),
        entries: rows,
        selected,
    }
}

// Resolves [[Title]] references at render time against the role-visible
// collection. A reference to an entry the role cannot see renders as broken,
// indistinguishable from a reference to an entry that does not exist.
pub fn render_references(content: &str, entries: &[Entry], role: Role) -> String {
    let visible = visible_entries(entries, role);
    CROSSREF_RE
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let raw_title = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let wanted = raw_title.trim().to_lowercase();
            match visible
                .iter()
                .find(|entry| entry.title.to_lowercase() == wanted)
            {
                Some(target) => format!(
                    "<a class=\"wiki-link\" data-entry-id=\"{}\">{}</a>",
                    target.id, raw_title
                ),
                None => format!("<span class=\"wiki-link-broken\">{raw_title}</span>"),
            }
        })
        .to_string()
}

pub fn resolve_reference<'a>(title: &str, entries: &'a [Entry], role: Role) -> Option<&'a Entry> {
    let wanted = title.trim().to_lowercase();
    visible_entries(entries, role)
        .into_iter()
        .find(|entry| entry.title.to_lowercase() == wanted)
}
