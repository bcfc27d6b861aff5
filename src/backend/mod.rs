//! Capability contracts of the hosted backend: relational rows, realtime
//! change channels, object storage and the identity provider.

pub mod memory;
pub mod nostr;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::models::row::{self, Row};
use crate::models::{InteractionKind, Session, SessionChange, UserMetadata};

pub use memory::MemoryBackend;
pub use self::nostr::NostrBackend;
pub use local::LocalObjectStore;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Posts,
    Profiles,
    Likes,
    Comments,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Posts => "post",
            Table::Profiles => "user_profile",
            Table::Likes => "post_likes",
            Table::Comments => "post_comments",
        }
    }

    pub fn interaction_kind(&self) -> Option<InteractionKind> {
        match self {
            Table::Likes => Some(InteractionKind::Like),
            Table::Comments => Some(InteractionKind::Comment),
            Table::Posts | Table::Profiles => None,
        }
    }
}

/// Equality filter on the columns the feed queries by.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    pub post_id: Option<String>,
    pub user_id: Option<String>,
}

impl RowFilter {
    pub fn post(post_id: impl Into<String>) -> Self {
        Self { post_id: Some(post_id.into()), user_id: None }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        let column = |key: &str, expected: &Option<String>| match expected {
            None => true,
            Some(expected) => row::field_id(row, key).as_deref() == Some(expected.as_str()),
        };
        column("post_id", &self.post_id) && column("user_id", &self.user_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// One realtime notification. Deletes usually only carry `old.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub schema: String,
    pub table: Table,
    pub new: Option<Row>,
    pub old: Option<Row>,
}

impl ChangeEvent {
    pub fn insert(table: Table, new: Row) -> Self {
        Self { kind: ChangeKind::Insert, schema: "public".to_string(), table, new: Some(new), old: None }
    }

    pub fn delete(table: Table, old: Row) -> Self {
        Self { kind: ChangeKind::Delete, schema: "public".to_string(), table, new: None, old: Some(old) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// The backend acknowledged the subscription.
    Subscribed,
    Change(ChangeEvent),
    /// The subscription could not be established.
    Failed(String),
}

/// Backend-side half of a channel. `unsubscribe` must not block.
pub trait ChannelHandle: Send {
    fn unsubscribe(&mut self);
}

/// A realtime subscription to one table. Dropping it unsubscribes.
pub struct Channel {
    table: Table,
    receiver: mpsc::UnboundedReceiver<ChannelMessage>,
    handle: Option<Box<dyn ChannelHandle>>,
}

impl Channel {
    pub fn new(
        table: Table,
        receiver: mpsc::UnboundedReceiver<ChannelMessage>,
        handle: Box<dyn ChannelHandle>,
    ) -> Self {
        Self { table, receiver, handle: Some(handle) }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Next queued message without waiting.
    pub fn try_next(&mut self) -> Option<ChannelMessage> {
        if !self.is_open() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.unsubscribe();
            self.receiver.close();
            log::debug!("unsubscribed from {}", self.table.name());
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// All posts joined with the owner profile under `user_profile`.
    async fn fetch_posts(&self) -> Result<Vec<Row>>;

    async fn fetch_rows(&self, table: Table, filter: &RowFilter) -> Result<Vec<Row>>;

    async fn fetch_count(&self, table: Table, filter: &RowFilter) -> Result<usize>;

    /// Returns the stored row, with its authoritative id.
    async fn insert_row(&self, table: Table, fields: Row) -> Result<Row>;

    async fn delete_rows(&self, table: Table, filter: &RowFilter) -> Result<()>;

    async fn upsert_row(&self, table: Table, fields: Row, conflict_key: &str) -> Result<()>;

    /// Opens a change channel. The acknowledgment arrives later as
    /// [`ChannelMessage::Subscribed`].
    fn subscribe_changes(&self, table: Table, filter: Option<RowFilter>) -> Result<Channel>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores the object and returns its path inside the bucket.
    async fn upload_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[async_trait]
pub trait Identity: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>>;

    fn session_changes(&self) -> mpsc::UnboundedReceiver<SessionChange>;

    async fn update_user(&self, metadata: UserMetadata) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_matches_numeric_and_string_columns() {
        let row = match json!({ "id": 3, "post_id": 17, "user_id": "u-1" }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(RowFilter::post("17").matches(&row));
        assert!(RowFilter::post("17").user("u-1").matches(&row));
        assert!(!RowFilter::post("17").user("u-2").matches(&row));
        assert!(RowFilter::default().matches(&row));
    }

    struct Flag(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl ChannelHandle for Flag {
        fn unsubscribe(&mut self) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn dropping_a_channel_unsubscribes_once() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channel = Channel::new(Table::Likes, rx, Box::new(Flag(calls.clone())));
        tx.send(ChannelMessage::Subscribed).unwrap();
        assert_eq!(channel.try_next(), Some(ChannelMessage::Subscribed));

        channel.unsubscribe();
        tx.send(ChannelMessage::Subscribed).ok();
        assert_eq!(channel.try_next(), None);
        drop(channel);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
