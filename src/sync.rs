use crate::errors::{WikiError, WikiResult};
use crate::host::MessageChannel;
use crate::models::Entry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// One shared module topic; every message is a JSON object discriminated by
// its `action` field so foreign module traffic can be skipped cheaply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ChannelMessage {
    #[serde(rename_all = "camelCase")]
    RequestSave {
        entries: Vec<Entry>,
        #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
        based_on: Option<DateTime<Utc>>,
    },
    Refresh,
    CategoriesChanged,
    #[serde(rename_all = "camelCase")]
    EditingStart {
        entry_id: String,
        user_name: String,
        user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    EditingStop {
        entry_id: String,
        user_id: String,
    },
}

impl ChannelMessage {
    pub fn action(&self) -> &'static str {
        match self {
            Self::RequestSave { .. } => "requestSave",
            Self::Refresh => "refresh",
            Self::CategoriesChanged => "categoriesChanged",
            Self::EditingStart { .. } => "editingStart",
            Self::EditingStop { .. } => "editingStop",
        }
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    channel: Arc<dyn MessageChannel>,
}

impl Broadcaster {
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        Self { channel }
    }

    pub fn publish(&self, message: &ChannelMessage) -> WikiResult<()> {
        let payload = serde_json::to_value(message)?;
        self.channel
            .publish(payload)
            .map_err(|err| WikiError::Channel(err.to_string()))?;
        tracing::debug!(action = message.action(), "published channel message");
        Ok(())
    }

    pub fn decode(raw: serde_json::Value) -> Option<ChannelMessage> {
        match serde_json::from_value(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                // Unknown actions are tolerated for forward compatibility.
                tracing::debug!(error = %err, "ignoring unrecognized channel message");
                None
            }
        }
    }
}
