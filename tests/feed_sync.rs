use feedsync::backend::memory::Operation;
use feedsync::backend::{Backend, ChangeEvent, MemoryBackend, RowFilter, Table};
use feedsync::error::FeedError;
use feedsync::models::row::{self, Row};
use feedsync::models::{Like, Session};
use feedsync::sync::{ChannelState, PostCollection, PostInteractions, SubscriptionManager};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn me() -> Session {
    Session::new("u-me")
}

fn post_row(secs: i64) -> Row {
    match json!({ "user_id": "u-other", "description": "hello", "created_at": secs }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

async fn mounted(backend: &MemoryBackend, post_id: &str) -> SubscriptionManager {
    let mut manager = SubscriptionManager::new();
    manager.mount_with_baseline(backend, Some(&me()), post_id).await.unwrap();
    manager
}

#[tokio::test]
async fn own_like_converges_whichever_arrives_first() {
    for event_first in [true, false] {
        let backend = MemoryBackend::with_session(me());
        let mut manager = mounted(&backend, "p-1").await;
        let ticket = manager.ticket("p-1").unwrap();

        let pending = manager
            .interactions_mut("p-1")
            .unwrap()
            .begin_toggle_like(Some(&me()))
            .unwrap();
        let result = pending.write.execute(&backend).await;
        if event_first {
            manager.pump();
        }
        manager.complete(&ticket, pending, result).unwrap().unwrap();
        manager.pump();

        let interactions = manager.interactions("p-1").unwrap();
        assert_eq!(interactions.like_count(), 1, "event first: {}", event_first);
        assert!(interactions.is_liked_by("u-me"));
        assert_eq!(interactions.like_count(), backend.rows(Table::Likes).len());
    }
}

#[tokio::test]
async fn duplicate_and_unknown_events_leave_state_unchanged() {
    let backend = MemoryBackend::with_session(me());
    let mut manager = mounted(&backend, "p-1").await;
    let stored = backend.insert_row(Table::Likes, row::like_row("p-1", "u-2")).await.unwrap();
    for _ in 0..3 {
        backend.emit(ChangeEvent::insert(Table::Likes, stored.clone()));
    }
    backend.emit(ChangeEvent::delete(Table::Likes, {
        let mut old = Row::new();
        old.insert("id".into(), json!(999));
        old
    }));
    manager.pump();
    assert_eq!(manager.interactions("p-1").unwrap().like_count(), 1);
}

#[tokio::test]
async fn failed_writes_roll_back_exactly() {
    let backend = MemoryBackend::with_session(me());
    backend.seed(Table::Likes, vec![row::like_row("p-1", "u-2")]);
    backend.seed(Table::Comments, vec![row::comment_row("p-1", "u-me", "first")]);
    let mut post = PostInteractions::initialize(&backend, "p-1").await.unwrap();
    let likes_before: Vec<Like> = post.likes().cloned().collect();

    backend.fail_next(Operation::Insert, 1);
    let err = post.toggle_like(&backend, Some(&me())).await.unwrap_err();
    assert!(matches!(err, FeedError::RemoteWrite(_)));
    assert_eq!(post.likes().cloned().collect::<Vec<_>>(), likes_before);

    backend.fail_next(Operation::Delete, 1);
    assert!(post.uncomment(&backend, Some(&me())).await.is_err());
    assert_eq!(post.comment_count(), 1);
    assert_eq!(backend.rows(Table::Comments).len(), 1);
}

#[tokio::test]
async fn like_then_unlike_that_both_fail_match_the_backend() {
    let backend = MemoryBackend::with_session(me());
    let mut post = PostInteractions::initialize(&backend, "p-1").await.unwrap();

    let like = post.begin_toggle_like(Some(&me())).unwrap();
    let unlike = post.begin_toggle_like(Some(&me())).unwrap();
    backend.fail_next(Operation::Insert, 1);
    backend.fail_next(Operation::Delete, 1);
    let like_result = like.write.execute(&backend).await;
    let unlike_result = unlike.write.execute(&backend).await;
    assert!(post.complete(like, like_result).is_err());
    assert!(post.complete(unlike, unlike_result).is_err());

    assert!(backend.rows(Table::Likes).is_empty());
    assert_eq!(post.like_count(), 0);
    assert!(!post.is_liked_by("u-me"));
    assert!(!post.resync(&backend).await.unwrap());
}

#[tokio::test]
async fn rejected_comments_never_reach_the_backend() {
    let backend = MemoryBackend::with_session(me());
    let mut post = PostInteractions::initialize(&backend, "p-1").await.unwrap();

    let err = post.submit_comment(&backend, Some(&me()), "   \n\t").await.unwrap_err();
    assert_eq!(err, FeedError::EmptyComment);
    let err = post.submit_comment(&backend, None, "hello").await.unwrap_err();
    assert!(err.is_unauthenticated());
    let err = post.toggle_like(&backend, None).await.unwrap_err();
    assert!(err.is_unauthenticated());

    assert!(backend.rows(Table::Comments).is_empty());
    assert!(backend.rows(Table::Likes).is_empty());
}

#[tokio::test]
async fn confirmed_comment_shows_once_with_its_realtime_echo() {
    let backend = MemoryBackend::with_session(me());
    let mut manager = mounted(&backend, "p-1").await;
    let ticket = manager.ticket("p-1").unwrap();

    let pending = manager
        .interactions("p-1")
        .unwrap()
        .prepare_comment(Some(&me()), " looks great ")
        .unwrap();
    assert_eq!(manager.interactions("p-1").unwrap().comment_count(), 0);
    let result = pending.write.execute(&backend).await;
    manager.complete(&ticket, pending, result).unwrap().unwrap();
    manager.pump();

    let comments: Vec<String> = manager.interactions("p-1").unwrap().comments().map(|c| c.text.clone()).collect();
    assert_eq!(comments, vec!["looks great".to_string()]);
}

#[tokio::test]
async fn unmounting_releases_every_channel() {
    let backend = MemoryBackend::with_session(me());
    let mut manager = SubscriptionManager::new();
    for i in 0..25 {
        manager.mount_with_baseline(&backend, Some(&me()), &format!("p-{}", i)).await.unwrap();
    }
    manager.pump();
    assert_eq!(manager.state("p-7"), ChannelState::Open);
    assert_eq!(backend.active_channels(), 50);

    manager.retain_mounted(Vec::<String>::new());
    assert_eq!(backend.active_channels(), 0);
    assert_eq!(manager.active_channels(), 0);
}

#[tokio::test]
async fn resync_corrects_missed_events() {
    let backend = MemoryBackend::with_session(me());
    let mut manager = mounted(&backend, "p-1").await;

    backend.mute_realtime(true);
    backend.insert_row(Table::Likes, row::like_row("p-1", "u-2")).await.unwrap();
    backend.insert_row(Table::Comments, row::comment_row("p-1", "u-3", "missed")).await.unwrap();
    manager.pump();
    assert_eq!(manager.interactions("p-1").unwrap().like_count(), 0);

    let interactions = manager.interactions_mut("p-1").unwrap();
    assert!(interactions.resync(&backend).await.unwrap());
    assert_eq!(interactions.like_count(), 1);
    assert_eq!(interactions.comment_count(), 1);
    assert!(!interactions.resync(&backend).await.unwrap());
}

#[tokio::test]
async fn other_users_activity_is_applied_in_order() {
    let backend = MemoryBackend::with_session(me());
    let mut manager = mounted(&backend, "p-1").await;

    backend.insert_row(Table::Likes, row::like_row("p-1", "u-2")).await.unwrap();
    backend.insert_row(Table::Likes, row::like_row("p-other", "u-2")).await.unwrap();
    backend.delete_rows(Table::Likes, &RowFilter::post("p-1").user("u-2")).await.unwrap();
    backend.insert_row(Table::Likes, row::like_row("p-1", "u-3")).await.unwrap();
    manager.pump();

    let interactions = manager.interactions("p-1").unwrap();
    assert_eq!(interactions.like_count(), 1);
    assert!(interactions.is_liked_by("u-3"));
    assert!(!interactions.is_liked_by("u-2"));
}

#[tokio::test]
async fn feed_never_shows_a_post_twice() {
    let backend = MemoryBackend::new();
    let stored = backend.seed(Table::Posts, vec![post_row(10), post_row(20), post_row(30)]);
    let mut priority = row::post_from_row(&stored[0]).unwrap();
    // The creating client holds a newer copy than the fetched row.
    priority.description = "hello, edited".to_string();
    priority.created_at = chrono::Utc::now();

    let mut feed = PostCollection::new();
    feed.load(&backend, Some(priority.clone())).await.unwrap();
    feed.refresh(&backend).await.unwrap();

    let ids: Vec<&str> = feed.posts().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], priority.id);
    assert_eq!(feed.posts()[0], priority);
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
}
