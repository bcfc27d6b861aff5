//! The feed on nostr relays. Posts are text notes, comments are replies
//! tagged with their root post, likes are `+` reactions, deletes are
//! deletion requests and profiles are metadata events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use nostr_sdk::prelude::*;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::backend::{
    Backend, ChangeEvent, Channel, ChannelHandle, ChannelMessage, Identity, RowFilter, Table,
};
use crate::error::{FeedError, Result};
use crate::models::row::{self, Row};
use crate::models::{AuthEvent, Config, Session, SessionChange, User, UserMetadata};

const POST_LIMIT: usize = 200;

struct IdentityState {
    metadata: UserMetadata,
    signed_in: bool,
    watchers: Vec<mpsc::UnboundedSender<SessionChange>>,
}

#[derive(Clone)]
pub struct NostrBackend {
    client: Client,
    keys: Keys,
    contacts: Vec<PublicKey>,
    feed_days: u64,
    identity: Arc<Mutex<IdentityState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn sdk_error(e: impl std::fmt::Display) -> FeedError {
    FeedError::NostrSdk(e.to_string())
}

fn tags(event: &Event) -> Vec<Vec<String>> {
    event.tags.iter().map(|tag| tag.clone().to_vec()).collect()
}

fn tag_value(event: &Event, name: &str) -> Option<String> {
    tags(event)
        .into_iter()
        .find(|t| t.len() >= 2 && t[0] == name)
        .map(|t| t[1].clone())
}

fn referenced(event: &Event) -> Vec<String> {
    tags(event)
        .into_iter()
        .filter(|t| t.len() >= 2 && t[0] == "e")
        .map(|t| t[1].clone())
        .collect()
}

/// The post a reply or reaction belongs to.
fn root_of(event: &Event) -> Option<String> {
    let tags = tags(event);
    let e_tags: Vec<&Vec<String>> = tags.iter().filter(|t| t.len() >= 2 && t[0] == "e").collect();
    e_tags
        .iter()
        .find(|t| t.get(3).map(String::as_str) == Some("root"))
        .or_else(|| e_tags.first())
        .map(|t| t[1].clone())
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn post_row(event: &Event) -> Row {
    object(json!({
        "id": event.id.to_hex(),
        "user_id": event.pubkey.to_hex(),
        "description": event.content.clone(),
        "media": tag_value(event, "media"),
        "media_type": tag_value(event, "media_type").unwrap_or_else(|| "image".to_string()),
        "advance_settings": {
            "shareToFacebook": tag_value(event, "share_to_facebook").as_deref() == Some("true"),
            "location": tag_value(event, "location").unwrap_or_default(),
            "collaborators": tag_value(event, "collaborators").unwrap_or_default(),
        },
        "created_at": event.created_at.as_u64(),
    }))
}

fn like_row(event: &Event, post_id: &str) -> Row {
    object(json!({
        "id": event.id.to_hex(),
        "post_id": post_id,
        "user_id": event.pubkey.to_hex(),
        "created_at": event.created_at.as_u64(),
    }))
}

fn comment_row(event: &Event, post_id: &str) -> Row {
    object(json!({
        "id": event.id.to_hex(),
        "post_id": post_id,
        "user_id": event.pubkey.to_hex(),
        "text": event.content.clone(),
        "created_at": event.created_at.as_u64(),
    }))
}

fn profile_row(event: &Event) -> Row {
    let meta: Value = serde_json::from_str(&event.content).unwrap_or(Value::Null);
    let field = |key: &str| meta.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    object(json!({
        "auth_user": event.pubkey.to_hex(),
        "username": field("name"),
        "fullName": field("display_name"),
        "image": field("picture"),
        "about": field("about"),
        "updated_at": event.created_at.as_u64(),
    }))
}

fn is_like(event: &Event) -> bool {
    event.kind == Kind::Reaction && (event.content == "+" || event.content.is_empty())
}

fn kind_of(table: Table) -> Kind {
    match table {
        Table::Posts | Table::Comments => Kind::TextNote,
        Table::Likes => Kind::Reaction,
        Table::Profiles => Kind::Metadata,
    }
}

/// Converts an event to the row it stands for in `table`.
fn row_for(table: Table, event: &Event) -> Option<Row> {
    match table {
        Table::Posts if event.kind == Kind::TextNote && root_of(event).is_none() => Some(post_row(event)),
        Table::Comments if event.kind == Kind::TextNote => root_of(event).map(|post| comment_row(event, &post)),
        Table::Likes if is_like(event) => root_of(event).map(|post| like_row(event, &post)),
        Table::Profiles if event.kind == Kind::Metadata => Some(profile_row(event)),
        _ => None,
    }
}

/// The realtime changes an event means for `table`.
fn changes_for(table: Table, event: &Event) -> Vec<ChangeEvent> {
    if event.kind == Kind::EventDeletion {
        let wanted = kind_of(table).as_u16().to_string();
        if tag_value(event, "k").map_or(false, |k| k != wanted) {
            return vec![];
        }
        return referenced(event)
            .into_iter()
            .map(|id| ChangeEvent::delete(table, object(json!({ "id": id }))))
            .collect();
    }
    row_for(table, event)
        .map(|row| vec![ChangeEvent::insert(table, row)])
        .unwrap_or_default()
}

fn event_id(id: &str) -> Option<EventId> {
    EventId::from_hex(id).ok()
}

struct NostrChannel {
    client: Client,
    task: tokio::task::JoinHandle<()>,
    // known before any REQ is sent
    subscriptions: Vec<SubscriptionId>,
    runtime: tokio::runtime::Handle,
}

impl NostrChannel {
    fn spawn(
        client: Client,
        runtime: tokio::runtime::Handle,
        table: Table,
        filters: Vec<Filter>,
        tx: mpsc::UnboundedSender<ChannelMessage>,
    ) -> Self {
        let subscriptions: Vec<SubscriptionId> = filters.iter().map(|_| SubscriptionId::generate()).collect();
        let requests: Vec<(SubscriptionId, Filter)> = subscriptions.iter().cloned().zip(filters).collect();
        let task_client = client.clone();
        let task = runtime.spawn(relay_events(task_client, table, requests, tx));
        Self { client, task, subscriptions, runtime }
    }
}

async fn relay_events(
    client: Client,
    table: Table,
    requests: Vec<(SubscriptionId, Filter)>,
    tx: mpsc::UnboundedSender<ChannelMessage>,
) {
    let mut notifications = client.notifications();
    let ours: Vec<SubscriptionId> = requests.iter().map(|(id, _)| id.clone()).collect();
    for (id, filter) in requests {
        if let Err(e) = client.subscribe_with_id(id, filter, None).await {
            let _ = tx.send(ChannelMessage::Failed(e.to_string()));
            return;
        }
    }
    if tx.send(ChannelMessage::Subscribed).is_err() {
        return;
    }

    // Relays each deliver their own copy.
    let mut seen = HashSet::new();
    loop {
        match notifications.recv().await {
            Ok(RelayPoolNotification::Event { subscription_id, event, .. }) => {
                if !ours.contains(&subscription_id) || !seen.insert(event.id) {
                    continue;
                }
                for change in changes_for(table, &event) {
                    if tx.send(ChannelMessage::Change(change)).is_err() {
                        return;
                    }
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                log::warn!("{} channel skipped {} notifications", table.name(), skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

impl ChannelHandle for NostrChannel {
    fn unsubscribe(&mut self) {
        self.task.abort();
        let ids = std::mem::take(&mut self.subscriptions);
        if ids.is_empty() {
            return;
        }
        let client = self.client.clone();
        self.runtime.spawn(async move {
            for id in ids {
                client.unsubscribe(&id).await;
            }
        });
    }
}

impl NostrBackend {
    pub async fn connect(config: &Config) -> Result<Self> {
        let keys = Keys::parse(&config.key).map_err(|e| FeedError::Config(format!("Invalid key: {}", e)))?;
        let contacts = config
            .contacts
            .iter()
            .filter_map(|c| match PublicKey::parse(c) {
                Ok(pk) => Some(pk),
                Err(e) => {
                    log::warn!("Ignoring contact {}: {}", c, e);
                    None
                }
            })
            .collect();

        let mut backend = Self {
            client: Client::new(keys.clone()),
            keys,
            contacts,
            feed_days: config.feed_days,
            identity: Arc::new(Mutex::new(IdentityState {
                metadata: UserMetadata::default(),
                signed_in: true,
                watchers: vec![],
            })),
        };
        backend.connect_relays(&config.relays).await?;
        if backend.contacts.is_empty() {
            match backend.fetch_contacts().await {
                Ok(contacts) => backend.contacts = contacts,
                Err(e) => log::warn!("Could not fetch contact list: {}", e),
            }
        }
        if let Err(e) = backend.load_own_metadata().await {
            log::warn!("Could not load own profile: {}", e);
        }
        Ok(backend)
    }

    async fn connect_relays(&self, relays: &[String]) -> Result<()> {
        let mut connected = 0;
        for relay in relays {
            match self.client.add_relay(relay.clone()).await {
                Ok(_) => connected += 1,
                Err(e) => log::warn!("Failed to add relay {}: {}", relay, e),
            }
        }

        self.client.connect().await;

        if connected > 0 {
            Ok(())
        } else {
            Err(FeedError::Network("Failed to connect to any relays".to_string()))
        }
    }

    /// Who the user follows, from their latest contact list.
    async fn fetch_contacts(&self) -> Result<Vec<PublicKey>> {
        let filter = Filter::new().author(self.keys.public_key()).kind(Kind::ContactList);
        let latest = self.fetch(filter).await?.into_iter().max_by_key(|e| e.created_at);
        Ok(latest
            .map(|list| {
                tags(&list)
                    .into_iter()
                    .filter(|t| t.len() >= 2 && t[0] == "p")
                    .filter_map(|t| PublicKey::from_hex(&t[1]).ok())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Followed keys, hex encoded.
    pub fn contacts(&self) -> Vec<String> {
        self.contacts.iter().map(|pk| pk.to_hex()).collect()
    }

    fn my_key(&self) -> String {
        self.keys.public_key().to_hex()
    }

    fn since(&self) -> Timestamp {
        Timestamp::from(Timestamp::now().as_u64().saturating_sub(self.feed_days * 24 * 60 * 60))
    }

    async fn fetch(&self, filter: Filter) -> Result<Vec<Event>> {
        let events = timeout(
            Duration::from_secs(15),
            self.client.fetch_events(filter, Duration::from_secs(10)),
        )
        .await
        .map_err(|_| FeedError::Fetch("Timeout fetching events".to_string()))?
        .map_err(|e| FeedError::Fetch(e.to_string()))?;
        Ok(events.into_iter().collect())
    }

    async fn send(&self, builder: EventBuilder) -> Result<EventId> {
        let output = self
            .client
            .send_event_builder(builder)
            .await
            .map_err(|e| FeedError::RemoteWrite(e.to_string()))?;
        if output.success.is_empty() {
            return Err(FeedError::RemoteWrite("No relay accepted the event".to_string()));
        }
        Ok(output.val)
    }

    async fn load_own_metadata(&self) -> Result<()> {
        let filter = Filter::new().author(self.keys.public_key()).kind(Kind::Metadata).limit(1);
        if let Some(event) = self.fetch(filter).await?.into_iter().max_by_key(|e| e.created_at) {
            let profile = profile_row(&event);
            let text = |key: &str| profile.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
            lock(&self.identity).metadata = UserMetadata {
                username: text("username"),
                full_name: text("fullName"),
                image: text("image"),
                about: text("about"),
            };
        }
        Ok(())
    }

    fn session(&self) -> Session {
        Session {
            user: User {
                id: self.my_key(),
                email: None,
                metadata: lock(&self.identity).metadata.clone(),
            },
        }
    }

    fn notify(&self, event: AuthEvent) {
        let session = self.current();
        let mut state = lock(&self.identity);
        state.watchers.retain(|tx| tx.send((event, session.clone())).is_ok());
    }

    fn current(&self) -> Option<Session> {
        let signed_in = lock(&self.identity).signed_in;
        signed_in.then(|| self.session())
    }

    /// Latest metadata of each author, keyed by hex public key.
    async fn fetch_profiles(&self, authors: Vec<PublicKey>) -> Result<HashMap<String, Row>> {
        if authors.is_empty() {
            return Ok(HashMap::new());
        }
        let events = self.fetch(Filter::new().kind(Kind::Metadata).authors(authors)).await?;
        let mut latest: HashMap<String, Event> = HashMap::new();
        for event in events {
            let key = event.pubkey.to_hex();
            let newer = latest.get(&key).map_or(true, |e| e.created_at < event.created_at);
            if newer {
                latest.insert(key, event);
            }
        }
        Ok(latest.into_iter().map(|(key, event)| (key, profile_row(&event))).collect())
    }

    fn interaction_filter(&self, table: Table, filter: &RowFilter) -> Option<Filter> {
        let mut f = Filter::new().kind(kind_of(table));
        if let Some(post_id) = &filter.post_id {
            f = f.event(event_id(post_id)?);
        }
        if let Some(user_id) = &filter.user_id {
            f = f.author(PublicKey::from_hex(user_id).ok()?);
        }
        Some(f)
    }
}

#[async_trait]
impl Backend for NostrBackend {
    async fn fetch_posts(&self) -> Result<Vec<Row>> {
        let mut filter = Filter::new().kind(Kind::TextNote).since(self.since()).limit(POST_LIMIT);
        if !self.contacts.is_empty() {
            let mut authors = self.contacts.clone();
            authors.push(self.keys.public_key());
            filter = filter.authors(authors);
        }
        let events: Vec<Event> = self
            .fetch(filter)
            .await?
            .into_iter()
            .filter(|e| root_of(e).is_none())
            .collect();

        let authors: HashSet<PublicKey> = events.iter().map(|e| e.pubkey).collect();
        let profiles = match self.fetch_profiles(authors.into_iter().collect()).await {
            Ok(profiles) => profiles,
            Err(e) => {
                log::warn!("Fetching author profiles failed: {}", e);
                HashMap::new()
            }
        };

        Ok(events
            .iter()
            .map(|event| {
                let mut row = post_row(event);
                let profile = profiles.get(&event.pubkey.to_hex()).cloned().map(Value::Object);
                row.insert("user_profile".to_string(), profile.unwrap_or(Value::Null));
                row
            })
            .collect())
    }

    async fn fetch_rows(&self, table: Table, filter: &RowFilter) -> Result<Vec<Row>> {
        if table == Table::Posts {
            let posts = self.fetch_posts().await?;
            return Ok(posts.into_iter().filter(|r| filter.matches(r)).collect());
        }
        let Some(nostr_filter) = self.interaction_filter(table, filter) else {
            // Ids that are not event ids or keys cannot match anything.
            return Ok(vec![]);
        };
        let rows = self
            .fetch(nostr_filter)
            .await?
            .iter()
            .filter_map(|event| row_for(table, event))
            .collect::<Vec<Row>>();
        if table == Table::Profiles {
            return Ok(rows);
        }
        Ok(rows.into_iter().filter(|r| filter.matches(r)).collect())
    }

    async fn fetch_count(&self, table: Table, filter: &RowFilter) -> Result<usize> {
        Ok(self.fetch_rows(table, filter).await?.len())
    }

    async fn insert_row(&self, table: Table, fields: Row) -> Result<Row> {
        let field = |key: &str| fields.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let post_id = row::field_id(&fields, "post_id").unwrap_or_default();
        let builder = match table {
            Table::Likes => EventBuilder::new(Kind::Reaction, "+")
                .tag(Tag::parse(["e", post_id.as_str()]).map_err(sdk_error)?),
            Table::Comments => EventBuilder::text_note(field("text"))
                .tag(Tag::parse(["e", post_id.as_str(), "", "root"]).map_err(sdk_error)?),
            Table::Posts => {
                let settings = fields.get("advance_settings").cloned().unwrap_or(Value::Null);
                let setting = |key: &str| settings.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
                let mut builder = EventBuilder::text_note(field("description"))
                    .tag(Tag::parse(["media", field("media").as_str()]).map_err(sdk_error)?)
                    .tag(Tag::parse(["media_type", field("media_type").as_str()]).map_err(sdk_error)?);
                for key in ["location", "collaborators"] {
                    let value = setting(key);
                    if !value.is_empty() {
                        builder = builder.tag(Tag::parse([key, value.as_str()]).map_err(sdk_error)?);
                    }
                }
                if settings.get("shareToFacebook").and_then(Value::as_bool) == Some(true) {
                    builder = builder.tag(Tag::parse(["share_to_facebook", "true"]).map_err(sdk_error)?);
                }
                builder
            }
            Table::Profiles => {
                return Err(FeedError::Validation("Profiles are upserted, not inserted".to_string()));
            }
        };

        let id = self.send(builder).await?;
        let mut stored = fields.clone();
        stored.insert("id".to_string(), Value::String(id.to_hex()));
        stored.insert("user_id".to_string(), Value::String(self.my_key()));
        stored.insert("created_at".to_string(), Value::from(Timestamp::now().as_u64()));
        Ok(stored)
    }

    async fn delete_rows(&self, table: Table, filter: &RowFilter) -> Result<()> {
        let me = self.my_key();
        if filter.user_id.as_deref().map_or(false, |user| user != me) {
            return Err(FeedError::RemoteWrite("Only your own events can be deleted".to_string()));
        }
        let own = RowFilter { user_id: Some(me), ..filter.clone() };
        let ids: Vec<String> = self
            .fetch_rows(table, &own)
            .await
            .map_err(|e| FeedError::RemoteWrite(e.to_string()))?
            .iter()
            .filter_map(row::row_id)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }

        let kind = kind_of(table).as_u16().to_string();
        let mut builder = EventBuilder::new(Kind::EventDeletion, "")
            .tag(Tag::parse(["k", kind.as_str()]).map_err(sdk_error)?);
        for id in &ids {
            builder = builder.tag(Tag::parse(["e", id.as_str()]).map_err(sdk_error)?);
        }
        self.send(builder).await?;
        log::debug!("requested deletion of {} {} rows", ids.len(), table.name());
        Ok(())
    }

    async fn upsert_row(&self, table: Table, fields: Row, _conflict_key: &str) -> Result<()> {
        if table != Table::Profiles {
            return self.insert_row(table, fields).await.map(|_| ());
        }
        let field = |key: &str| fields.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let content = json!({
            "name": field("username"),
            "display_name": field("fullName"),
            "picture": field("image"),
            "about": field("about"),
        });
        self.send(EventBuilder::new(Kind::Metadata, content.to_string())).await?;
        Ok(())
    }

    fn subscribe_changes(&self, table: Table, filter: Option<RowFilter>) -> Result<Channel> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| FeedError::Network(format!("No runtime for subscriptions: {}", e)))?;

        let mut live = Filter::new().kind(kind_of(table)).since(Timestamp::now());
        if let Some(post_id) = filter.as_ref().and_then(|f| f.post_id.as_deref()) {
            let id = event_id(post_id)
                .ok_or_else(|| FeedError::Validation(format!("{} is not an event id", post_id)))?;
            live = live.event(id);
        }
        let mut filters = vec![live];
        if table != Table::Profiles {
            filters.push(Filter::new().kind(Kind::EventDeletion).since(Timestamp::now()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = NostrChannel::spawn(self.client.clone(), runtime, table, filters, tx);
        Ok(Channel::new(table, rx, Box::new(channel)))
    }
}

#[async_trait]
impl Identity for NostrBackend {
    async fn current_session(&self) -> Result<Option<Session>> {
        Ok(self.current())
    }

    fn session_changes(&self) -> mpsc::UnboundedReceiver<SessionChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send((AuthEvent::InitialSession, self.current()));
        lock(&self.identity).watchers.push(tx);
        rx
    }

    async fn update_user(&self, metadata: UserMetadata) -> Result<Session> {
        let mut session = self.session();
        session.user.metadata = metadata.clone();
        self.upsert_row(Table::Profiles, row::profile_row(&session, chrono::Utc::now()), "auth_user")
            .await?;
        lock(&self.identity).metadata = metadata;
        self.notify(AuthEvent::UserUpdated);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        lock(&self.identity).signed_in = false;
        self.notify(AuthEvent::SignedOut);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ChangeKind;

    fn sign(builder: EventBuilder, keys: &Keys) -> Event {
        builder.sign_with_keys(keys).unwrap()
    }

    fn post_id() -> String {
        "a".repeat(64)
    }

    #[test]
    fn replies_map_to_comments_of_their_root() {
        let keys = Keys::generate();
        let post = post_id();
        let reply = sign(
            EventBuilder::text_note("nice").tag(Tag::parse(["e", post.as_str(), "", "root"]).unwrap()),
            &keys,
        );

        assert!(row_for(Table::Posts, &reply).is_none());
        let row = row_for(Table::Comments, &reply).unwrap();
        assert_eq!(row["post_id"], post.as_str());
        assert_eq!(row["user_id"], keys.public_key().to_hex().as_str());
    }

    #[test]
    fn only_plus_reactions_are_likes() {
        let keys = Keys::generate();
        let post = post_id();
        let e = Tag::parse(["e", post.as_str()]).unwrap();
        let like = sign(EventBuilder::new(Kind::Reaction, "+").tag(e.clone()), &keys);
        let frown = sign(EventBuilder::new(Kind::Reaction, "-").tag(e), &keys);
        assert!(row_for(Table::Likes, &like).is_some());
        assert!(row_for(Table::Likes, &frown).is_none());
    }

    #[test]
    fn deletions_become_delete_changes_for_their_kind() {
        let keys = Keys::generate();
        let target = "b".repeat(64);
        let deletion = sign(
            EventBuilder::new(Kind::EventDeletion, "")
                .tag(Tag::parse(["k", "7"]).unwrap())
                .tag(Tag::parse(["e", target.as_str()]).unwrap()),
            &keys,
        );

        let changes = changes_for(Table::Likes, &deletion);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Delete);
        assert_eq!(changes[0].old.as_ref().and_then(row::row_id), Some(target));
        assert!(changes_for(Table::Comments, &deletion).is_empty());
    }

    #[tokio::test]
    async fn channel_can_close_subscriptions_it_has_not_sent_yet() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let filters = vec![Filter::new().kind(Kind::Reaction), Filter::new().kind(Kind::EventDeletion)];
        let mut channel =
            NostrChannel::spawn(Client::default(), tokio::runtime::Handle::current(), Table::Likes, filters, tx);

        assert_eq!(channel.subscriptions.len(), 2);
        assert_ne!(channel.subscriptions[0], channel.subscriptions[1]);
        channel.unsubscribe();
        assert!(channel.subscriptions.is_empty());
    }

    #[test]
    fn post_tags_round_into_post_rows() {
        let keys = Keys::generate();
        let note = sign(
            EventBuilder::text_note("sunset")
                .tag(Tag::parse(["media", "file:///m/1.mp4"]).unwrap())
                .tag(Tag::parse(["media_type", "video"]).unwrap())
                .tag(Tag::parse(["location", "Lisbon"]).unwrap()),
            &keys,
        );
        let post = row::post_from_row(&post_row(&note)).unwrap();
        assert_eq!(post.media.as_deref(), Some("file:///m/1.mp4"));
        assert_eq!(post.media_kind, crate::models::MediaKind::Video);
        assert_eq!(post.advance_settings.location, "Lisbon");
        assert_eq!(post.description, "sunset");
    }
}
