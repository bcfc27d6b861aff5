//! Realtime channels of mounted posts.

use std::collections::{HashMap, HashSet};

use crate::backend::{Backend, ChangeEvent, ChangeKind, Channel, ChannelMessage, RowFilter, Table};
use crate::error::{FeedError, Result};
use crate::models::row::{self, Row};
use crate::models::{Comment, Like, Session};
use crate::sync::aggregator::{Outcome, PendingWrite, PostInteractions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Subscribing,
    Open,
}

/// The likes and comments channels of one post.
pub struct PostSubscription {
    post_id: String,
    state: ChannelState,
    likes: Option<Channel>,
    comments: Option<Channel>,
    likes_acked: bool,
    comments_acked: bool,
}

impl PostSubscription {
    pub fn closed(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            state: ChannelState::Closed,
            likes: None,
            comments: None,
            likes_acked: false,
            comments_acked: false,
        }
    }

    pub fn open(backend: &dyn Backend, session: Option<&Session>, post_id: &str) -> Result<Self> {
        if session.is_none() {
            return Err(FeedError::Unauthenticated("Please login to see live updates".to_string()));
        }
        let mut subscription = Self::closed(post_id);
        subscription.likes = Some(backend.subscribe_changes(Table::Likes, Some(RowFilter::post(post_id)))?);
        // Comments are filtered client-side.
        subscription.comments = Some(backend.subscribe_changes(Table::Comments, None)?);
        subscription.state = ChannelState::Subscribing;
        log::debug!("post {}: subscribing", post_id);
        Ok(subscription)
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn active_channels(&self) -> usize {
        self.likes.iter().chain(self.comments.iter()).filter(|c| c.is_open()).count()
    }

    /// Applies every queued message in arrival order. Returns how many
    /// changes altered the sets.
    pub fn pump(&mut self, interactions: &mut PostInteractions) -> usize {
        let mut applied = 0;
        for table in [Table::Likes, Table::Comments] {
            loop {
                let channel = match table {
                    Table::Likes => self.likes.as_mut(),
                    _ => self.comments.as_mut(),
                };
                let Some(message) = channel.and_then(Channel::try_next) else {
                    break;
                };
                if self.handle(table, message, interactions) {
                    applied += 1;
                }
            }
        }
        applied
    }

    fn handle(&mut self, table: Table, message: ChannelMessage, interactions: &mut PostInteractions) -> bool {
        match message {
            ChannelMessage::Subscribed => {
                match table {
                    Table::Likes => self.likes_acked = true,
                    _ => self.comments_acked = true,
                }
                if self.likes_acked && self.comments_acked && self.state == ChannelState::Subscribing {
                    self.state = ChannelState::Open;
                    log::debug!("post {}: channels open", self.post_id);
                }
                false
            }
            ChannelMessage::Failed(reason) => {
                log::warn!("post {}: {} channel failed: {}", self.post_id, table.name(), reason);
                self.close();
                false
            }
            ChannelMessage::Change(event) => {
                let acked = match table {
                    Table::Likes => self.likes_acked,
                    _ => self.comments_acked,
                };
                if !acked {
                    log::debug!("post {}: dropping change before {} ack", self.post_id, table.name());
                    return false;
                }
                dispatch(event, interactions)
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(mut channel) = self.likes.take() {
            channel.unsubscribe();
        }
        if let Some(mut channel) = self.comments.take() {
            channel.unsubscribe();
        }
        if self.state != ChannelState::Closed {
            log::debug!("post {}: closed", self.post_id);
        }
        self.state = ChannelState::Closed;
    }
}

impl Drop for PostSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn dispatch(event: ChangeEvent, interactions: &mut PostInteractions) -> bool {
    let Some(kind) = event.table.interaction_kind() else {
        return false;
    };
    match event.kind {
        ChangeKind::Insert => match event.new.as_ref().map(|new| row::interaction_from_row(kind, new)) {
            Some(Ok(interaction)) => interactions.apply_remote_insert(interaction),
            Some(Err(e)) => {
                log::warn!("Skipping {} insert: {}", event.table.name(), e);
                false
            }
            None => false,
        },
        ChangeKind::Delete => match event.old.as_ref().and_then(row::row_id) {
            Some(id) => interactions.apply_remote_delete(kind, &id),
            None => false,
        },
    }
}

/// Identifies one mounting of a post. Work started under an older ticket is
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub post_id: String,
    pub generation: u64,
}

/// The confirmed counts of an installed post as of one revision. A drift
/// fetch started from it only applies if nothing changed since.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftCheck {
    pub ticket: Ticket,
    pub revision: u64,
    pub counts: (usize, usize),
}

struct MountedPost {
    generation: u64,
    // bumped on every change to the interactions
    revision: u64,
    subscription: PostSubscription,
    interactions: Option<PostInteractions>,
}

/// The mounted posts of a feed.
#[derive(Default)]
pub struct SubscriptionManager {
    mounts: HashMap<String, MountedPost>,
    next_generation: u64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the channels of a post. Returns `None` when it is already
    /// mounted with live channels. A mount whose channels closed is opened
    /// again under a new ticket.
    pub fn mount(&mut self, backend: &dyn Backend, session: Option<&Session>, post_id: &str) -> Result<Option<Ticket>> {
        match self.mounts.get(post_id) {
            Some(m) if m.subscription.state() != ChannelState::Closed => return Ok(None),
            Some(_) => log::info!("post {}: reopening closed channels", post_id),
            None => {}
        }
        let subscription = PostSubscription::open(backend, session, post_id)?;
        self.next_generation += 1;
        let generation = self.next_generation;
        self.mounts.insert(
            post_id.to_string(),
            MountedPost { generation, revision: 0, subscription, interactions: None },
        );
        Ok(Some(Ticket { post_id: post_id.to_string(), generation }))
    }

    pub fn unmount(&mut self, post_id: &str) -> bool {
        self.mounts.remove(post_id).is_some()
    }

    pub fn unmount_all(&mut self) {
        self.mounts.clear();
    }

    /// Unmounts every post not in `visible`. Returns the unmounted ids.
    pub fn retain_mounted<S: AsRef<str>>(&mut self, visible: impl IntoIterator<Item = S>) -> Vec<String> {
        let visible: HashSet<String> = visible.into_iter().map(|s| s.as_ref().to_string()).collect();
        let gone: Vec<String> = self.mounts.keys().filter(|id| !visible.contains(*id)).cloned().collect();
        for id in &gone {
            self.mounts.remove(id);
        }
        gone
    }

    pub fn is_mounted(&self, post_id: &str) -> bool {
        self.mounts.contains_key(post_id)
    }

    pub fn mounted(&self) -> impl Iterator<Item = &str> {
        self.mounts.keys().map(String::as_str)
    }

    pub fn ticket(&self, post_id: &str) -> Option<Ticket> {
        self.mounts
            .get(post_id)
            .map(|m| Ticket { post_id: post_id.to_string(), generation: m.generation })
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.mounts
            .get(&ticket.post_id)
            .map_or(false, |m| m.generation == ticket.generation)
    }

    fn current_mut(&mut self, ticket: &Ticket) -> Option<&mut MountedPost> {
        self.mounts
            .get_mut(&ticket.post_id)
            .filter(|m| m.generation == ticket.generation)
    }

    pub fn state(&self, post_id: &str) -> ChannelState {
        self.mounts
            .get(post_id)
            .map_or(ChannelState::Closed, |m| m.subscription.state())
    }

    /// Installs a fetched baseline and applies the changes queued since the
    /// mount. Returns false when the ticket is stale.
    pub fn install(&mut self, ticket: &Ticket, interactions: PostInteractions) -> bool {
        let Some(mounted) = self.current_mut(ticket) else {
            log::debug!("post {}: discarding baseline of an old mount", ticket.post_id);
            return false;
        };
        let mut interactions = interactions;
        mounted.subscription.pump(&mut interactions);
        mounted.interactions = Some(interactions);
        mounted.revision += 1;
        true
    }

    /// Replaces the confirmed rows of an installed post. Returns false when
    /// the post was remounted or changed after `check` was taken.
    pub fn rebase(&mut self, check: &DriftCheck, likes: Vec<Like>, comments: Vec<Comment>) -> bool {
        let Some(mounted) = self.current_mut(&check.ticket) else {
            return false;
        };
        if mounted.revision != check.revision {
            log::debug!("post {}: discarding drift fetch older than its changes", check.ticket.post_id);
            return false;
        }
        match mounted.interactions.as_mut() {
            Some(interactions) => {
                interactions.apply_baseline(likes, comments);
                mounted.revision += 1;
                true
            }
            None => false,
        }
    }

    pub fn interactions(&self, post_id: &str) -> Option<&PostInteractions> {
        self.mounts.get(post_id).and_then(|m| m.interactions.as_ref())
    }

    pub fn interactions_mut(&mut self, post_id: &str) -> Option<&mut PostInteractions> {
        let mounted = self.mounts.get_mut(post_id)?;
        let interactions = mounted.interactions.as_mut()?;
        mounted.revision += 1;
        Some(interactions)
    }

    /// Reconciles a finished write. `None` when the post was unmounted or
    /// remounted since the write began.
    pub fn complete(&mut self, ticket: &Ticket, pending: PendingWrite, result: Result<Option<Row>>) -> Option<Result<Outcome>> {
        let mounted = self.current_mut(ticket)?;
        let interactions = mounted.interactions.as_mut()?;
        let outcome = interactions.complete(pending, result);
        mounted.subscription.pump(interactions);
        mounted.revision += 1;
        Some(outcome)
    }

    /// Applies queued realtime changes of every installed post.
    pub fn pump(&mut self) -> usize {
        self.mounts
            .values_mut()
            .map(|m| match m.interactions.as_mut() {
                Some(interactions) => {
                    let applied = m.subscription.pump(interactions);
                    if applied > 0 {
                        m.revision += 1;
                    }
                    applied
                }
                None => 0,
            })
            .sum()
    }

    /// Mounted posts still waiting for their baseline.
    pub fn needs_baseline(&self) -> Vec<Ticket> {
        self.mounts
            .iter()
            .filter(|(_, m)| m.interactions.is_none())
            .map(|(id, m)| Ticket { post_id: id.clone(), generation: m.generation })
            .collect()
    }

    /// Installed posts without removals in flight, ready for a drift check.
    pub fn installed(&self) -> Vec<DriftCheck> {
        self.mounts
            .iter()
            .filter_map(|(id, m)| {
                let interactions = m.interactions.as_ref()?;
                if interactions.has_pending_removals() {
                    return None;
                }
                Some(DriftCheck {
                    ticket: Ticket { post_id: id.clone(), generation: m.generation },
                    revision: m.revision,
                    counts: interactions.remote_counts(),
                })
            })
            .collect()
    }

    pub fn active_channels(&self) -> usize {
        self.mounts.values().map(|m| m.subscription.active_channels()).sum()
    }

    /// Mounts a post and fetches its baseline in place.
    pub async fn mount_with_baseline(&mut self, backend: &dyn Backend, session: Option<&Session>, post_id: &str) -> Result<()> {
        let Some(ticket) = self.mount(backend, session, post_id)? else {
            return Ok(());
        };
        let interactions = PostInteractions::initialize(backend, post_id).await?;
        self.install(&ticket, interactions);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::InteractionKind;
    use pretty_assertions::assert_eq;

    fn session() -> Session {
        Session::new("u-1")
    }

    #[test]
    fn mount_requires_a_session() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        let err = manager.mount(&backend, None, "p-1").unwrap_err();
        assert!(err.is_unauthenticated());
        assert_eq!(backend.active_channels(), 0);
    }

    #[test]
    fn open_after_both_acks() {
        let backend = MemoryBackend::new();
        backend.hold_acks(true);
        let mut manager = SubscriptionManager::new();
        let ticket = manager.mount(&backend, Some(&session()), "p-1").unwrap().unwrap();
        manager.install(&ticket, PostInteractions::empty("p-1"));
        assert_eq!(manager.state("p-1"), ChannelState::Subscribing);

        backend.ack_pending();
        manager.pump();
        assert_eq!(manager.state("p-1"), ChannelState::Open);
    }

    #[test]
    fn mounting_twice_keeps_one_pair_of_channels() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        assert!(manager.mount(&backend, Some(&session()), "p-1").unwrap().is_some());
        assert!(manager.mount(&backend, Some(&session()), "p-1").unwrap().is_none());
        assert_eq!(backend.active_channels(), 2);
    }

    #[test]
    fn unmount_releases_channels() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        for i in 0..10 {
            manager.mount(&backend, Some(&session()), &format!("p-{}", i)).unwrap();
        }
        assert_eq!(backend.active_channels(), 20);
        assert_eq!(manager.active_channels(), 20);

        manager.retain_mounted(["p-3"]);
        assert_eq!(backend.active_channels(), 2);
        manager.unmount("p-3");
        assert_eq!(backend.active_channels(), 0);
        assert_eq!(manager.state("p-3"), ChannelState::Closed);
    }

    #[test]
    fn stale_baseline_is_discarded() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        let old = manager.mount(&backend, Some(&session()), "p-1").unwrap().unwrap();
        manager.unmount("p-1");
        let new = manager.mount(&backend, Some(&session()), "p-1").unwrap().unwrap();

        assert!(!manager.install(&old, PostInteractions::empty("p-1")));
        assert!(manager.interactions("p-1").is_none());
        assert!(manager.install(&new, PostInteractions::empty("p-1")));
    }

    #[tokio::test]
    async fn changes_queue_until_the_baseline_is_installed() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        let ticket = manager.mount(&backend, Some(&session()), "p-1").unwrap().unwrap();
        let baseline = PostInteractions::initialize(&backend, "p-1").await.unwrap();

        let stored = backend.insert_row(Table::Likes, row::like_row("p-1", "u-2")).await.unwrap();
        backend.insert_row(Table::Comments, row::comment_row("p-2", "u-2", "elsewhere")).await.unwrap();
        assert_eq!(manager.pump(), 0);

        manager.install(&ticket, baseline);
        let interactions = manager.interactions("p-1").unwrap();
        assert_eq!(interactions.like_count(), 1);
        assert_eq!(interactions.comment_count(), 0);

        let id = row::row_id(&stored).unwrap();
        backend.emit(ChangeEvent::delete(Table::Likes, {
            let mut old = Row::new();
            old.insert("id".into(), stored["id"].clone());
            old
        }));
        manager.pump();
        let interactions = manager.interactions_mut("p-1").unwrap();
        assert_eq!(interactions.like_count(), 0);
        assert!(!interactions.apply_remote_delete(InteractionKind::Like, &id));
    }

    #[tokio::test]
    async fn drift_fetch_older_than_a_live_change_is_discarded() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        manager.mount_with_baseline(&backend, Some(&session()), "p-1").await.unwrap();
        manager.pump();

        backend.mute_realtime(true);
        backend.insert_row(Table::Likes, row::like_row("p-1", "u-2")).await.unwrap();
        backend.mute_realtime(false);

        let check = manager.installed().pop().unwrap();
        let (likes, comments) = PostInteractions::fetch_if_drifted(&backend, "p-1", check.counts)
            .await
            .unwrap()
            .unwrap();

        backend.insert_row(Table::Likes, row::like_row("p-1", "u-3")).await.unwrap();
        assert_eq!(manager.pump(), 1);

        assert!(!manager.rebase(&check, likes, comments));
        let interactions = manager.interactions("p-1").unwrap();
        assert!(interactions.is_liked_by("u-3"));
        assert_eq!(interactions.like_count(), 1);

        let check = manager.installed().pop().unwrap();
        let (likes, comments) = PostInteractions::fetch_if_drifted(&backend, "p-1", check.counts)
            .await
            .unwrap()
            .unwrap();
        assert!(manager.rebase(&check, likes, comments));
        assert_eq!(manager.interactions("p-1").unwrap().like_count(), 2);
    }

    #[test]
    fn failed_channel_is_reopened_on_the_next_mount() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        let first = manager.mount(&backend, Some(&session()), "p-1").unwrap().unwrap();
        manager.install(&first, PostInteractions::empty("p-1"));
        backend.fail_channels(Table::Likes, "relay went away");
        manager.pump();
        assert_eq!(manager.state("p-1"), ChannelState::Closed);

        let second = manager.mount(&backend, Some(&session()), "p-1").unwrap().unwrap();
        assert_ne!(first, second);
        assert!(!manager.is_current(&first));
        assert_eq!(manager.state("p-1"), ChannelState::Subscribing);
        assert!(manager.mount(&backend, Some(&session()), "p-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn completion_after_unmount_is_dropped() {
        let backend = MemoryBackend::new();
        let mut manager = SubscriptionManager::new();
        manager.mount_with_baseline(&backend, Some(&session()), "p-1").await.unwrap();
        let ticket = manager.ticket("p-1").unwrap();

        let pending = manager.interactions_mut("p-1").unwrap().begin_toggle_like(Some(&session())).unwrap();
        let result = pending.write.execute(&backend).await;
        manager.unmount("p-1");
        assert!(manager.complete(&ticket, pending, result).is_none());
    }
}
