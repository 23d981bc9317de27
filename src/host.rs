use crate::models::UserInfo;

// Seams to the embedding host application. The host owns storage, transport,
// identity, and window chrome; the core consumes them through these traits.

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
    fn put(&self, key: &str, value: serde_json::Value) -> anyhow::Result<()>;
}

pub trait MessageChannel: Send + Sync {
    fn publish(&self, payload: serde_json::Value) -> anyhow::Result<()>;
}

pub trait UserDirectory: Send + Sync {
    fn current_user(&self) -> UserInfo;
    fn connected_users(&self) -> Vec<UserInfo>;
}

pub trait Notifier: Send + Sync {
    fn warn(&self, message: &str);
}
