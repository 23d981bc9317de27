pub mod errors;
pub mod gateway;
pub mod host;
pub mod models;
pub mod presence;
pub mod projection;
pub mod service;
pub mod store;
pub mod sync;

pub use errors::{WikiError, WikiResult};
pub use models::{
    default_categories, Category, Comment, CommitOutcome, Entry, EntryDraft, Role, SaveReceipt,
    UserInfo,
};
pub use projection::{EntryView, ViewQuery, WikiProjection};
pub use service::WikiCore;
pub use sync::ChannelMessage;
