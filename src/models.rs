use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Gm,
    Player,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gm => "gm",
            Self::Player => "player",
        }
    }

    pub fn is_gm(self) -> bool {
        matches!(self, Self::Gm)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author_name: String,
    pub user_id: String,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub title: String,
    pub category: String,
    pub content: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub pending_delete: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_by: String,
    #[serde(default)]
    pub gm_notes: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub label: String,
    pub icon: String,
}

pub fn default_categories() -> Vec<Category> {
    [
        ("lore", "Lore", "fas fa-book"),
        ("locations", "Locations", "fas fa-map-marker-alt"),
        ("npcs", "NPCs", "fas fa-users"),
        ("factions", "Factions", "fas fa-flag"),
        ("quests", "Quests", "fas fa-scroll"),
        ("items", "Items", "fas fa-gem"),
        ("session-notes", "Session Notes", "fas fa-calendar-alt"),
    ]
    .into_iter()
    .map(|(id, label, icon)| Category {
        id: id.to_string(),
        label: label.to_string(),
        icon: icon.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    pub id: Option<String>,
    pub title: String,
    pub category: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommitOutcome {
    Committed,
    Relayed,
    Blocked,
}

impl CommitOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Relayed => "relayed",
            Self::Blocked => "blocked",
        }
    }

    pub fn accepted(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReceipt {
    pub entry_id: String,
    pub outcome: CommitOutcome,
}

#[cfg(test)]
mod tests {
    use super::{default_categories, Entry, Role};
    use chrono::{TimeZone, Utc};

    #[test]
    fn default_category_set_has_seven_labeled_entries() {
        let categories = default_categories();
        assert_eq!(categories.len(), 7);
        assert!(categories.iter().all(|category| !category.label.is_empty()));
        assert!(categories.iter().any(|category| category.id == "session-notes"));
    }

    #[test]
    fn entry_serializes_camel_case_with_epoch_millis() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let entry = Entry {
            id: "e1".to_string(),
            title: "The Sunken Keep".to_string(),
            category: "locations".to_string(),
            content: "<p>ruins</p>".to_string(),
            hidden: false,
            pending_delete: false,
            created_at: created,
            updated_at: created,
            created_by: "Astra".to_string(),
            updated_by: "Astra".to_string(),
            gm_notes: String::new(),
            comments: Vec::new(),
        };

        let value = serde_json::to_value(&entry).expect("serialize entry");
        assert_eq!(value["createdAt"], serde_json::json!(1_700_000_000_000i64));
        assert_eq!(value["pendingDelete"], serde_json::json!(false));
        assert_eq!(value["createdBy"], serde_json::json!("Astra"));
    }

    #[test]
    fn entry_deserializes_with_missing_optional_fields() {
        let raw = serde_json::json!({
            "id": "e2",
            "title": "Rumors",
            "category": "lore",
            "content": "",
            "createdAt": 1_700_000_000_000i64,
            "updatedAt": 1_700_000_000_000i64,
            "createdBy": "Brennan",
            "updatedBy": "Brennan"
        });

        let entry: Entry = serde_json::from_value(raw).expect("deserialize entry");
        assert!(!entry.hidden);
        assert!(entry.gm_notes.is_empty());
        assert!(entry.comments.is_empty());
    }

    #[test]
    fn role_round_trips_kebab_case() {
        let raw = serde_json::to_string(&Role::Gm).expect("serialize role");
        assert_eq!(raw, "\"gm\"");
        let parsed: Role = serde_json::from_str("\"player\"").expect("deserialize role");
        assert_eq!(parsed, Role::Player);
    }
}
