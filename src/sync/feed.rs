use std::collections::HashSet;

use crate::backend::{Backend, ChangeKind, Channel, ChannelMessage, Table};
use crate::error::{FeedError, Result};
use crate::models::row;
use crate::models::Post;

/// The ordered list of posts shown in the feed.
#[derive(Default)]
pub struct PostCollection {
    posts: Vec<Post>,
    priority: Option<Post>,
    new_posts_available: bool,
    watch: Option<Channel>,
}

/// Newest first, ties broken by id. A priority post goes first and replaces
/// any fetched row with its id.
pub fn merge(fetched: Vec<Post>, priority: Option<&Post>) -> Vec<Post> {
    let mut posts = fetched;
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    if let Some(priority) = priority {
        seen.insert(priority.id.clone());
    }
    posts.retain(|p| seen.insert(p.id.clone()));

    if let Some(priority) = priority {
        posts.insert(0, priority.clone());
    }
    posts
}

impl PostCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.posts.iter().any(|p| p.id == post_id)
    }

    pub fn set_priority(&mut self, priority: Option<Post>) {
        self.priority = priority;
    }

    pub fn new_posts_available(&self) -> bool {
        self.new_posts_available
    }

    pub fn mark_new_posts_available(&mut self) {
        if !self.new_posts_available {
            log::info!("new posts available");
        }
        self.new_posts_available = true;
    }

    /// One bulk fetch of all posts with their owner profiles.
    pub async fn fetch(backend: &dyn Backend) -> Result<Vec<Post>> {
        let rows = backend.fetch_posts().await.map_err(|e| match e {
            FeedError::Fetch(_) => e,
            other => FeedError::Fetch(other.to_string()),
        })?;
        Ok(row::map_rows(&rows, row::post_from_row))
    }

    /// Merges a finished fetch. On failure the shown list stays as it was.
    pub fn apply_fetch(&mut self, result: Result<Vec<Post>>) -> Result<()> {
        let fetched = result?;
        self.posts = merge(fetched, self.priority.as_ref());
        self.new_posts_available = false;
        log::debug!("feed holds {} posts", self.posts.len());
        Ok(())
    }

    pub async fn load(&mut self, backend: &dyn Backend, priority: Option<Post>) -> Result<()> {
        self.priority = priority;
        let result = Self::fetch(backend).await;
        self.apply_fetch(result)
    }

    /// Refetches with the remembered priority post.
    pub async fn refresh(&mut self, backend: &dyn Backend) -> Result<()> {
        let result = Self::fetch(backend).await;
        self.apply_fetch(result)
    }

    /// Listens for posts created elsewhere.
    pub fn watch(&mut self, backend: &dyn Backend) -> Result<()> {
        if self.watch.is_none() {
            self.watch = Some(backend.subscribe_changes(Table::Posts, None)?);
        }
        Ok(())
    }

    /// Drains the posts channel. Returns whether new posts became available.
    pub fn poll_watch(&mut self) -> bool {
        let mut found = false;
        while let Some(message) = self.watch.as_mut().and_then(Channel::try_next) {
            let ChannelMessage::Change(event) = message else {
                continue;
            };
            if event.kind != ChangeKind::Insert {
                continue;
            }
            let Some(id) = event.new.as_ref().and_then(row::row_id) else {
                continue;
            };
            let is_priority = self.priority.as_ref().map_or(false, |p| p.id == id);
            if !is_priority && !self.contains(&id) {
                found = true;
            }
        }
        if found {
            self.mark_new_posts_available();
        }
        found
    }
}
