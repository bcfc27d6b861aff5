use std::collections::HashSet;

use futures::future::try_join;

use crate::backend::{Backend, RowFilter, Table};
use crate::error::{FeedError, Result};
use crate::models::row::{self, Row};
use crate::models::{Comment, Interaction, InteractionKind, Like, Session};
use crate::sync::reconcile::{self, RowSet, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Like,
    Unlike,
    Comment,
    Uncomment,
}

/// The remote half of a user action.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteWrite {
    Insert { table: Table, fields: Row },
    Delete { table: Table, filter: RowFilter },
}

impl RemoteWrite {
    /// Runs the write. Inserts return the stored row.
    pub async fn execute(&self, backend: &dyn Backend) -> Result<Option<Row>> {
        let result = match self {
            RemoteWrite::Insert { table, fields } => backend.insert_row(*table, fields.clone()).await.map(Some),
            RemoteWrite::Delete { table, filter } => backend.delete_rows(*table, filter).await.map(|_| None),
        };
        // Anything a write reports counts as a write failure.
        result.map_err(|e| match e {
            FeedError::RemoteWrite(_) => e,
            other => FeedError::RemoteWrite(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Optimistic {
    Nothing,
    Likes(Snapshot<Like>),
    Comments(Snapshot<Comment>),
}

/// An action whose optimistic part is applied and whose remote write is
/// still to be run and reported back through [`PostInteractions::complete`].
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub post_id: String,
    pub action: Action,
    pub write: RemoteWrite,
    optimistic: Optimistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    pub like_count: usize,
    pub comment_count: usize,
}

fn require_user<'a>(session: Option<&'a Session>, what: &str) -> Result<&'a str> {
    session
        .map(Session::user_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FeedError::Unauthenticated(format!("Please login to {}", what)))
}

/// Likes and comments of one post.
#[derive(Debug, Clone)]
pub struct PostInteractions {
    post_id: String,
    likes: RowSet<Like>,
    comments: RowSet<Comment>,
    pending_removals: HashSet<String>,
    // placeholders whose insert has not completed
    pending_inserts: HashSet<String>,
}

impl PostInteractions {
    pub fn empty(post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            likes: RowSet::default(),
            comments: RowSet::default(),
            pending_removals: HashSet::new(),
            pending_inserts: HashSet::new(),
        }
    }

    pub fn from_rows(post_id: impl Into<String>, likes: Vec<Like>, comments: Vec<Comment>) -> Self {
        let mut this = Self::empty(post_id);
        for like in likes {
            this.apply_remote_insert(Interaction::Like(like));
        }
        for comment in comments {
            this.apply_remote_insert(Interaction::Comment(comment));
        }
        this
    }

    /// Fetches the baseline likes and comments of the post.
    pub async fn initialize(backend: &dyn Backend, post_id: &str) -> Result<Self> {
        let (likes, comments) = Self::fetch_baseline(backend, post_id).await?;
        log::debug!("post {}: baseline {} likes, {} comments", post_id, likes.len(), comments.len());
        Ok(Self::from_rows(post_id, likes, comments))
    }

    async fn fetch_baseline(backend: &dyn Backend, post_id: &str) -> Result<(Vec<Like>, Vec<Comment>)> {
        let filter = RowFilter::post(post_id);
        let (likes, comments) = try_join(
            backend.fetch_rows(Table::Likes, &filter),
            backend.fetch_rows(Table::Comments, &filter),
        )
        .await?;
        Ok((
            row::map_rows(&likes, row::like_from_row),
            row::map_rows(&comments, row::comment_from_row),
        ))
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    pub fn likes(&self) -> impl Iterator<Item = &Like> {
        self.likes.iter()
    }

    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter()
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.find(|l| l.user_id == user_id).is_some()
    }

    fn outcome(&self, action: Action) -> Outcome {
        Outcome { action, like_count: self.like_count(), comment_count: self.comment_count() }
    }

    /// Adds a realtime or confirmed row. Returns whether anything changed.
    pub fn apply_remote_insert(&mut self, row: Interaction) -> bool {
        if row.post_id() != self.post_id {
            return false;
        }
        match row {
            Interaction::Like(like) => self.insert_like(like),
            Interaction::Comment(comment) => {
                if self.pending_removals.contains(&comment.id) {
                    return false;
                }
                self.comments.insert(comment)
            }
        }
    }

    fn insert_like(&mut self, like: Like) -> bool {
        if self.likes.contains(&like.id) || self.pending_removals.contains(&like.id) {
            return false;
        }
        let existing = self.likes.find(|l| l.user_id == like.user_id).map(|l| l.id.clone());
        match existing {
            Some(local) if reconcile::is_local(&local) => self.likes.promote(&local, like),
            Some(other) => {
                log::warn!(
                    "post {}: ignoring like {} of {}, already liked as {}",
                    self.post_id, like.id, like.user_id, other
                );
                false
            }
            None => self.likes.insert(like),
        }
    }

    /// Removes a row by id. Unknown ids are ignored.
    pub fn apply_remote_delete(&mut self, kind: InteractionKind, row_id: &str) -> bool {
        let removed = match kind {
            InteractionKind::Like => self.likes.remove(row_id).is_some(),
            InteractionKind::Comment => self.comments.remove(row_id).is_some(),
        };
        if !removed {
            log::debug!("post {}: delete of unknown {:?} {}", self.post_id, kind, row_id);
        }
        removed
    }

    pub fn begin_toggle_like(&mut self, session: Option<&Session>) -> Result<PendingWrite> {
        let user_id = require_user(session, "like this post")?.to_string();
        let filter = RowFilter::post(&self.post_id).user(&user_id);

        if self.is_liked_by(&user_id) {
            let removed = self.likes.remove_where(|l| l.user_id == user_id);
            let snapshot = Snapshot::Removed(removed);
            self.pending_removals.extend(snapshot.removed_ids());
            return Ok(PendingWrite {
                post_id: self.post_id.clone(),
                action: Action::Unlike,
                write: RemoteWrite::Delete { table: Table::Likes, filter },
                optimistic: Optimistic::Likes(snapshot),
            });
        }

        let placeholder = Like { id: reconcile::local_id(), post_id: self.post_id.clone(), user_id: user_id.clone() };
        let local = placeholder.id.clone();
        self.likes.insert(placeholder);
        self.pending_inserts.insert(local.clone());
        Ok(PendingWrite {
            post_id: self.post_id.clone(),
            action: Action::Like,
            write: RemoteWrite::Insert { table: Table::Likes, fields: row::like_row(&self.post_id, &user_id) },
            optimistic: Optimistic::Likes(Snapshot::Added(local)),
        })
    }

    /// Validates a comment. Nothing is rendered until the backend has it.
    pub fn prepare_comment(&self, session: Option<&Session>, text: &str) -> Result<PendingWrite> {
        let user_id = require_user(session, "comment on this post")?;
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::EmptyComment);
        }
        Ok(PendingWrite {
            post_id: self.post_id.clone(),
            action: Action::Comment,
            write: RemoteWrite::Insert { table: Table::Comments, fields: row::comment_row(&self.post_id, user_id, text) },
            optimistic: Optimistic::Nothing,
        })
    }

    /// Removes every comment of the user on this post.
    pub fn begin_uncomment(&mut self, session: Option<&Session>) -> Result<PendingWrite> {
        let user_id = require_user(session, "remove your comments")?.to_string();
        let removed = self.comments.remove_where(|c| c.user_id == user_id);
        let snapshot = Snapshot::Removed(removed);
        self.pending_removals.extend(snapshot.removed_ids());
        Ok(PendingWrite {
            post_id: self.post_id.clone(),
            action: Action::Uncomment,
            write: RemoteWrite::Delete { table: Table::Comments, filter: RowFilter::post(&self.post_id).user(&user_id) },
            optimistic: Optimistic::Comments(snapshot),
        })
    }

    /// Reconciles a finished remote write. On failure the optimistic change
    /// is undone and the error returned.
    pub fn complete(&mut self, pending: PendingWrite, result: Result<Option<Row>>) -> Result<Outcome> {
        let PendingWrite { action, optimistic, .. } = pending;
        match &optimistic {
            Optimistic::Likes(Snapshot::Added(local)) => {
                self.pending_inserts.remove(local);
            }
            Optimistic::Likes(snapshot) => self.clear_pending(snapshot.removed_ids()),
            Optimistic::Comments(snapshot) => self.clear_pending(snapshot.removed_ids()),
            Optimistic::Nothing => {}
        }

        let stored = match result {
            Ok(stored) => stored,
            Err(e) => {
                log::warn!("post {}: {:?} failed, rolling back: {}", self.post_id, action, e);
                match optimistic {
                    Optimistic::Likes(snapshot) => self.likes.rollback(snapshot),
                    Optimistic::Comments(snapshot) => self.comments.rollback(snapshot),
                    Optimistic::Nothing => {}
                }
                return Err(e);
            }
        };

        match (optimistic, stored) {
            (Optimistic::Likes(Snapshot::Added(local)), Some(stored)) => match row::like_from_row(&stored) {
                Ok(like) => {
                    self.likes.promote(&local, like);
                }
                Err(e) => log::warn!("post {}: keeping placeholder {}: {}", self.post_id, local, e),
            },
            (Optimistic::Nothing, Some(stored)) if action == Action::Comment => match row::comment_from_row(&stored) {
                Ok(comment) => {
                    self.apply_remote_insert(Interaction::Comment(comment));
                }
                Err(e) => log::warn!("post {}: confirmed comment unreadable: {}", self.post_id, e),
            },
            _ => {}
        }
        Ok(self.outcome(action))
    }

    fn clear_pending(&mut self, ids: Vec<String>) {
        for id in ids {
            self.pending_removals.remove(&id);
        }
    }

    pub async fn toggle_like(&mut self, backend: &dyn Backend, session: Option<&Session>) -> Result<Outcome> {
        let pending = self.begin_toggle_like(session)?;
        let result = pending.write.execute(backend).await;
        self.complete(pending, result)
    }

    pub async fn submit_comment(&mut self, backend: &dyn Backend, session: Option<&Session>, text: &str) -> Result<Outcome> {
        let pending = self.prepare_comment(session, text)?;
        let result = pending.write.execute(backend).await;
        self.complete(pending, result)
    }

    pub async fn uncomment(&mut self, backend: &dyn Backend, session: Option<&Session>) -> Result<Outcome> {
        let pending = self.begin_uncomment(session)?;
        let result = pending.write.execute(backend).await;
        self.complete(pending, result)
    }

    /// Corrects drift against the backend. Counts are checked first and
    /// rows are only refetched when they disagree. Returns whether the sets
    /// were replaced.
    pub async fn resync(&mut self, backend: &dyn Backend) -> Result<bool> {
        if !self.pending_removals.is_empty() {
            return Ok(false);
        }
        match Self::fetch_if_drifted(backend, &self.post_id, self.remote_counts()).await? {
            Some((likes, comments)) => {
                self.apply_baseline(likes, comments);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Confirmed like and comment counts held locally.
    pub fn remote_counts(&self) -> (usize, usize) {
        (self.likes.remote_len(), self.comments.remote_len())
    }

    /// Fetches the rows of the post when the backend counts differ from
    /// `expected`.
    pub async fn fetch_if_drifted(
        backend: &dyn Backend,
        post_id: &str,
        expected: (usize, usize),
    ) -> Result<Option<(Vec<Like>, Vec<Comment>)>> {
        let filter = RowFilter::post(post_id);
        let counts = try_join(
            backend.fetch_count(Table::Likes, &filter),
            backend.fetch_count(Table::Comments, &filter),
        )
        .await?;
        if counts == expected {
            return Ok(None);
        }
        log::info!("post {}: counts {:?} drifted from {:?}, refetching", post_id, counts, expected);
        Self::fetch_baseline(backend, post_id).await.map(Some)
    }

    pub fn has_pending_removals(&self) -> bool {
        !self.pending_removals.is_empty()
    }

    /// Replaces the confirmed rows. Placeholders of inserts still in flight
    /// are kept and rows whose removal is in flight stay out.
    pub fn apply_baseline(&mut self, likes: Vec<Like>, comments: Vec<Comment>) {
        let pending_inserts = &self.pending_inserts;
        let placeholders: Vec<Like> = self
            .likes
            .locals()
            .into_iter()
            .filter(|l| pending_inserts.contains(&l.id))
            .collect();
        self.likes.clear();
        for like in likes {
            self.insert_like(like);
        }
        for placeholder in placeholders {
            if !self.is_liked_by(&placeholder.user_id) {
                self.likes.insert(placeholder);
            }
        }
        let post_id = self.post_id.clone();
        self.comments.reset_remote(
            comments.into_iter().filter(|c| c.post_id == post_id),
            &self.pending_removals,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn like(id: &str, user: &str) -> Like {
        Like { id: id.into(), post_id: "p-1".into(), user_id: user.into() }
    }

    fn comment(id: &str, user: &str) -> Comment {
        Comment { id: id.into(), post_id: "p-1".into(), user_id: user.into(), text: "hi".into(), created_at: None }
    }

    fn stored_like(id: u64, user: &str) -> Row {
        let mut r = row::like_row("p-1", user);
        r.insert("id".into(), serde_json::Value::from(id));
        r
    }

    #[test]
    fn inserts_for_other_posts_are_ignored() {
        let mut post = PostInteractions::empty("p-1");
        let mut other = like("1", "a");
        other.post_id = "p-2".into();
        assert!(!post.apply_remote_insert(Interaction::Like(other)));
        assert_eq!(post.like_count(), 0);
    }

    #[test]
    fn second_authoritative_like_of_a_user_is_ignored() {
        let mut post = PostInteractions::from_rows("p-1", vec![like("1", "a")], vec![]);
        assert!(!post.apply_remote_insert(Interaction::Like(like("2", "a"))));
        assert_eq!(post.like_count(), 1);
    }

    #[test]
    fn like_completion_promotes_placeholder() {
        let session = Session::new("a");
        let mut post = PostInteractions::empty("p-1");
        let pending = post.begin_toggle_like(Some(&session)).unwrap();
        assert_eq!(pending.action, Action::Like);
        assert!(post.likes().all(|l| reconcile::is_local(&l.id)));

        post.complete(pending, Ok(Some(stored_like(5, "a")))).unwrap();
        assert_eq!(post.likes().map(|l| l.id.as_str()).collect::<Vec<_>>(), vec!["5"]);
    }

    #[test]
    fn event_then_completion_keeps_one_like() {
        let session = Session::new("a");
        let mut post = PostInteractions::empty("p-1");
        let pending = post.begin_toggle_like(Some(&session)).unwrap();
        post.apply_remote_insert(Interaction::Like(like("5", "a")));
        assert_eq!(post.like_count(), 1);
        post.complete(pending, Ok(Some(stored_like(5, "a")))).unwrap();
        assert_eq!(post.like_count(), 1);
        assert!(post.is_liked_by("a"));
    }

    #[test]
    fn insert_event_for_a_pending_removal_is_ignored() {
        let session = Session::new("a");
        let mut post = PostInteractions::from_rows("p-1", vec![like("1", "a")], vec![]);
        let pending = post.begin_toggle_like(Some(&session)).unwrap();
        post.apply_remote_insert(Interaction::Like(like("1", "a")));
        assert_eq!(post.like_count(), 0);
        post.complete(pending, Ok(None)).unwrap();
        assert_eq!(post.like_count(), 0);
    }

    #[test]
    fn failed_unlike_restores_the_like() {
        let session = Session::new("a");
        let mut post = PostInteractions::from_rows("p-1", vec![like("1", "a"), like("2", "b")], vec![]);
        let pending = post.begin_toggle_like(Some(&session)).unwrap();
        assert_eq!(post.like_count(), 1);
        let err = post.complete(pending, Err(FeedError::RemoteWrite("down".into()))).unwrap_err();
        assert!(matches!(err, FeedError::RemoteWrite(_)));
        assert!(post.is_liked_by("a"));
        assert_eq!(post.like_count(), 2);
    }

    #[test]
    fn uncomment_removes_all_of_the_users_comments() {
        let session = Session::new("a");
        let mut post = PostInteractions::from_rows(
            "p-1",
            vec![],
            vec![comment("1", "a"), comment("2", "b"), comment("3", "a")],
        );
        let pending = post.begin_uncomment(Some(&session)).unwrap();
        assert_eq!(post.comment_count(), 1);
        assert_eq!(
            pending.write,
            RemoteWrite::Delete { table: Table::Comments, filter: RowFilter::post("p-1").user("a") }
        );
        post.complete(pending, Err(FeedError::RemoteWrite("down".into()))).ok();
        assert_eq!(post.comment_count(), 3);
    }

    #[test]
    fn comment_text_is_trimmed_and_not_rendered_early() {
        let session = Session::new("a");
        let post = PostInteractions::empty("p-1");
        let pending = post.prepare_comment(Some(&session), "  nice shot \n").unwrap();
        match &pending.write {
            RemoteWrite::Insert { fields, .. } => assert_eq!(fields["text"], "nice shot"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(post.comment_count(), 0);
    }

    #[test]
    fn like_then_unlike_with_both_writes_failing_leaves_no_like() {
        let session = Session::new("a");
        for insert_fails_first in [true, false] {
            let mut post = PostInteractions::from_rows("p-1", vec![like("1", "b")], vec![]);
            let like_write = post.begin_toggle_like(Some(&session)).unwrap();
            let unlike_write = post.begin_toggle_like(Some(&session)).unwrap();
            assert_eq!(unlike_write.action, Action::Unlike);
            assert!(!post.is_liked_by("a"));

            let down = || Err(FeedError::RemoteWrite("down".into()));
            if insert_fails_first {
                post.complete(like_write, down()).unwrap_err();
                post.complete(unlike_write, down()).unwrap_err();
            } else {
                post.complete(unlike_write, down()).unwrap_err();
                post.complete(like_write, down()).unwrap_err();
            }
            assert!(!post.is_liked_by("a"), "insert failed first: {}", insert_fails_first);
            assert_eq!(post.like_count(), 1);
        }
    }

    #[test]
    fn baseline_drops_placeholders_without_a_write_in_flight() {
        let session = Session::new("a");
        let mut post = PostInteractions::empty("p-1");
        let pending = post.begin_toggle_like(Some(&session)).unwrap();
        post.complete(pending, Ok(None)).unwrap();
        assert!(post.is_liked_by("a"));

        post.apply_baseline(vec![], vec![]);
        assert_eq!(post.like_count(), 0);
    }

    #[test]
    fn baseline_keeps_placeholders_of_users_not_confirmed_yet() {
        let session = Session::new("a");
        let mut post = PostInteractions::from_rows("p-1", vec![like("1", "b")], vec![comment("9", "c")]);
        post.begin_toggle_like(Some(&session)).unwrap();
        post.apply_baseline(vec![like("1", "b"), like("2", "c")], vec![]);
        assert_eq!(post.like_count(), 3);
        assert_eq!(post.comment_count(), 0);

        post.apply_baseline(vec![like("1", "b"), like("3", "a")], vec![]);
        assert_eq!(post.like_count(), 2);
        assert!(post.likes().all(|l| !reconcile::is_local(&l.id)));
    }
}
