//! An in-process backend with the same observable behavior as the hosted
//! one: generated ids, joined post fetches, realtime fan-out, and
//! acknowledgments. Failures and delivery can be scripted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::backend::{
    Backend, ChangeEvent, Channel, ChannelHandle, ChannelMessage, Identity, ObjectStore, RowFilter,
    Table,
};
use crate::error::{FeedError, Result};
use crate::models::row::{self, Row};
use crate::models::{AuthEvent, Session, SessionChange, UserMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchPosts,
    FetchRows,
    FetchCount,
    Insert,
    Delete,
    Upsert,
    Upload,
    UpdateUser,
}

struct Subscriber {
    id: u64,
    table: Table,
    filter: Option<RowFilter>,
    tx: mpsc::UnboundedSender<ChannelMessage>,
}

#[derive(Default)]
struct Inner {
    tables: HashMap<Table, Vec<Row>>,
    next_id: u64,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
    failures: HashMap<Operation, usize>,
    hold_acks: bool,
    unacked: Vec<u64>,
    muted: bool,
    session: Option<Session>,
    session_watchers: Vec<mpsc::UnboundedSender<SessionChange>>,
    objects: HashMap<(String, String), Vec<u8>>,
}

impl Inner {
    fn take_failure(&mut self, op: Operation) -> bool {
        match self.failures.get_mut(&op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    fn assign_id(&mut self, table: Table, row: &mut Row) {
        if row::row_id(row).is_some() {
            return;
        }
        self.next_id += 1;
        let id = match table {
            Table::Posts | Table::Profiles => Value::String(format!("{}-{}", table.name(), self.next_id)),
            Table::Likes | Table::Comments => Value::from(self.next_id),
        };
        row.insert("id".to_string(), id);
    }

    fn broadcast(&mut self, event: ChangeEvent) {
        if self.muted {
            return;
        }
        self.subscribers.retain(|sub| {
            if sub.table != event.table {
                return true;
            }
            // Delete payloads only carry the id, so filters cannot apply.
            let wanted = match (&event.new, &sub.filter) {
                (Some(new), Some(filter)) => filter.matches(new),
                _ => true,
            };
            !wanted || sub.tx.send(ChannelMessage::Change(event.clone())).is_ok()
        });
    }

    fn notify_session(&mut self, event: AuthEvent) {
        let change = (event, self.session.clone());
        self.session_watchers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

struct MemoryChannel {
    id: u64,
    inner: Arc<Mutex<Inner>>,
}

impl ChannelHandle for MemoryChannel {
    fn unsubscribe(&mut self) {
        let mut inner = lock(&self.inner);
        inner.subscribers.retain(|sub| sub.id != self.id);
        inner.unacked.retain(|id| *id != self.id);
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        let backend = Self::new();
        lock(&backend.inner).session = Some(session);
        backend
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    /// Stores rows directly, without realtime delivery. Returns the rows as stored.
    pub fn seed(&self, table: Table, rows: Vec<Row>) -> Vec<Row> {
        let mut inner = self.inner();
        let mut stored = Vec::with_capacity(rows.len());
        for mut row in rows {
            inner.assign_id(table, &mut row);
            stored.push(row.clone());
            inner.tables.entry(table).or_default().push(row);
        }
        stored
    }

    pub fn rows(&self, table: Table) -> Vec<Row> {
        self.inner().tables.get(&table).cloned().unwrap_or_default()
    }

    /// The next `times` calls of `op` fail.
    pub fn fail_next(&self, op: Operation, times: usize) {
        *self.inner().failures.entry(op).or_default() += times;
    }

    /// When held, new channels stay unacknowledged until [`Self::ack_pending`].
    pub fn hold_acks(&self, hold: bool) {
        self.inner().hold_acks = hold;
    }

    pub fn ack_pending(&self) {
        let mut inner = self.inner();
        let unacked = std::mem::take(&mut inner.unacked);
        for sub in inner.subscribers.iter().filter(|sub| unacked.contains(&sub.id)) {
            let _ = sub.tx.send(ChannelMessage::Subscribed);
        }
    }

    /// Stops realtime delivery of writes; [`Self::emit`] still delivers.
    pub fn mute_realtime(&self, muted: bool) {
        self.inner().muted = muted;
    }

    /// Delivers an event as if the backend had produced it.
    pub fn emit(&self, event: ChangeEvent) {
        let mut inner = self.inner();
        let muted = std::mem::replace(&mut inner.muted, false);
        inner.broadcast(event);
        inner.muted = muted;
    }

    /// Reports a failure on every open channel of `table`.
    pub fn fail_channels(&self, table: Table, reason: &str) {
        for sub in self.inner().subscribers.iter().filter(|sub| sub.table == table) {
            let _ = sub.tx.send(ChannelMessage::Failed(reason.to_string()));
        }
    }

    pub fn active_channels(&self) -> usize {
        self.inner().subscribers.len()
    }

    pub fn sign_in(&self, session: Session) {
        let mut inner = self.inner();
        inner.session = Some(session);
        inner.notify_session(AuthEvent::SignedIn);
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.inner().objects.get(&(bucket.to_string(), path.to_string())).cloned()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn fetch_posts(&self) -> Result<Vec<Row>> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::FetchPosts) {
            return Err(FeedError::Fetch("post: simulated failure".to_string()));
        }
        let profiles = inner.tables.get(&Table::Profiles).cloned().unwrap_or_default();
        let mut posts = inner.tables.get(&Table::Posts).cloned().unwrap_or_default();
        for post in posts.iter_mut() {
            let owner = row::field_id(post, "user_id");
            let profile = profiles
                .iter()
                .find(|p| owner.is_some() && row::field_id(p, "auth_user") == owner)
                .cloned()
                .map(Value::Object)
                .unwrap_or(Value::Null);
            post.insert("user_profile".to_string(), profile);
        }
        posts.reverse();
        Ok(posts)
    }

    async fn fetch_rows(&self, table: Table, filter: &RowFilter) -> Result<Vec<Row>> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::FetchRows) {
            return Err(FeedError::Fetch(format!("{}: simulated failure", table.name())));
        }
        Ok(inner
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn fetch_count(&self, table: Table, filter: &RowFilter) -> Result<usize> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::FetchCount) {
            return Err(FeedError::Fetch(format!("{}: simulated failure", table.name())));
        }
        Ok(inner
            .tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).count())
            .unwrap_or(0))
    }

    async fn insert_row(&self, table: Table, mut fields: Row) -> Result<Row> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::Insert) {
            return Err(FeedError::RemoteWrite(format!("{}: simulated insert failure", table.name())));
        }
        inner.assign_id(table, &mut fields);
        fields
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        inner.tables.entry(table).or_default().push(fields.clone());
        inner.broadcast(ChangeEvent::insert(table, fields.clone()));
        Ok(fields)
    }

    async fn delete_rows(&self, table: Table, filter: &RowFilter) -> Result<()> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::Delete) {
            return Err(FeedError::RemoteWrite(format!("{}: simulated delete failure", table.name())));
        }
        let rows = inner.tables.entry(table).or_default();
        let (removed, kept): (Vec<Row>, Vec<Row>) = rows.drain(..).partition(|r| filter.matches(r));
        *rows = kept;
        for old in removed {
            let mut key = Row::new();
            if let Some(id) = old.get("id") {
                key.insert("id".to_string(), id.clone());
            }
            inner.broadcast(ChangeEvent::delete(table, key));
        }
        Ok(())
    }

    async fn upsert_row(&self, table: Table, fields: Row, conflict_key: &str) -> Result<()> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::Upsert) {
            return Err(FeedError::RemoteWrite(format!("{}: simulated upsert failure", table.name())));
        }
        let key = fields.get(conflict_key).cloned();
        let position = inner.tables.get(&table).and_then(|rows| {
            rows.iter()
                .position(|r| key.is_some() && r.get(conflict_key) == key.as_ref())
        });
        match position {
            Some(i) => {
                if let Some(existing) = inner.tables.get_mut(&table).and_then(|rows| rows.get_mut(i)) {
                    existing.extend(fields);
                }
            }
            None => {
                let mut fields = fields;
                inner.assign_id(table, &mut fields);
                inner.tables.entry(table).or_default().push(fields);
            }
        }
        Ok(())
    }

    fn subscribe_changes(&self, table: Table, filter: Option<RowFilter>) -> Result<Channel> {
        let mut inner = self.inner();
        inner.next_subscriber += 1;
        let id = inner.next_subscriber;
        let (tx, rx) = mpsc::unbounded_channel();
        if inner.hold_acks {
            inner.unacked.push(id);
        } else {
            let _ = tx.send(ChannelMessage::Subscribed);
        }
        inner.subscribers.push(Subscriber { id, table, filter, tx });
        Ok(Channel::new(table, rx, Box::new(MemoryChannel { id, inner: self.inner.clone() })))
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn upload_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::Upload) {
            return Err(FeedError::Upload(format!("{}/{}: simulated failure", bucket, path)));
        }
        inner.objects.insert((bucket.to_string(), path.to_string()), bytes);
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }
}

#[async_trait]
impl Identity for MemoryBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.inner().session.clone())
    }

    fn session_changes(&self) -> mpsc::UnboundedReceiver<SessionChange> {
        let mut inner = self.inner();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send((AuthEvent::InitialSession, inner.session.clone()));
        inner.session_watchers.push(tx);
        rx
    }

    async fn update_user(&self, metadata: UserMetadata) -> Result<Session> {
        let mut inner = self.inner();
        if inner.take_failure(Operation::UpdateUser) {
            return Err(FeedError::RemoteWrite("user: simulated update failure".to_string()));
        }
        let session = match inner.session.as_mut() {
            Some(session) => {
                session.user.metadata = metadata;
                session.clone()
            }
            None => return Err(FeedError::Unauthenticated("no session to update".to_string())),
        };
        inner.notify_session(AuthEvent::UserUpdated);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let mut inner = self.inner();
        inner.session = None;
        inner.notify_session(AuthEvent::SignedOut);
        Ok(())
    }
}
