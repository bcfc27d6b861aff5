//! Sample data and simulated activity for `--demo`.

use std::time::Duration;

use chrono::{Duration as Age, Utc};

use crate::backend::{Backend, MemoryBackend, RowFilter, Table};
use crate::models::row::{self, Row};
use crate::models::{AdvanceSettings, MediaKind, Session, UserMetadata};

const PEOPLE: [(&str, &str, &str); 3] = [
    ("u-ana", "ana", "Ana Lima"),
    ("u-bea", "bea", "Beatriz Costa"),
    ("u-caio", "caio", "Caio Souza"),
];

const CAPTIONS: [&str; 6] = [
    "Morning light over the river",
    "First ride of the season",
    "Street food tour, part two",
    "Rooftop garden is finally blooming",
    "Behind the scenes at the shoot",
    "Low tide, long walk",
];

fn person(id: &str, username: &str, full_name: &str) -> Session {
    let mut session = Session::new(id);
    session.user.metadata = UserMetadata {
        username: username.to_string(),
        full_name: full_name.to_string(),
        image: format!("memory://profile-images/{}.png", id),
        about: "demo account".to_string(),
    };
    session
}

pub fn demo_session() -> Session {
    person("u-you", "you", "Demo User")
}

/// A backend holding a few posts with likes and comments.
pub fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::with_session(demo_session());
    let now = Utc::now();

    let mut profiles: Vec<Row> = PEOPLE
        .iter()
        .map(|(id, username, name)| row::profile_row(&person(id, username, name), now))
        .collect();
    profiles.push(row::profile_row(&demo_session(), now));
    backend.seed(Table::Profiles, profiles);

    let posts: Vec<Row> = CAPTIONS
        .iter()
        .enumerate()
        .map(|(i, caption)| {
            let (owner, _, _) = PEOPLE[i % PEOPLE.len()];
            let kind = if i % 3 == 1 { MediaKind::Video } else { MediaKind::Image };
            let ext = if kind == MediaKind::Video { "mp4" } else { "jpg" };
            row::post_row(
                owner,
                &format!("memory://feed-media/{}/{}.{}", owner, i, ext),
                kind,
                caption,
                &AdvanceSettings::default(),
                now - Age::hours(i as i64 * 5),
            )
        })
        .collect();
    let posts = backend.seed(Table::Posts, posts);

    for (i, post) in posts.iter().enumerate() {
        let Some(post_id) = row::row_id(post) else { continue };
        let likes: Vec<Row> = PEOPLE
            .iter()
            .take(i % PEOPLE.len() + 1)
            .map(|(user, _, _)| row::like_row(&post_id, user))
            .collect();
        backend.seed(Table::Likes, likes);
        backend.seed(Table::Comments, vec![row::comment_row(&post_id, PEOPLE[(i + 1) % PEOPLE.len()].0, "love this")]);
    }
    backend
}

/// Other people liking, unliking, commenting and posting every few seconds.
pub fn spawn_activity(backend: MemoryBackend, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        let mut step: usize = 0;
        loop {
            interval.tick().await;
            step += 1;
            let posts = backend.rows(Table::Posts);
            if posts.is_empty() {
                continue;
            }
            let Some(post_id) = row::row_id(&posts[step % posts.len()]) else { continue };
            let (user, _, _) = PEOPLE[step % PEOPLE.len()];
            let filter = RowFilter::post(&post_id).user(user);

            let result = match step % 4 {
                0 | 1 => {
                    let liked = backend.fetch_count(Table::Likes, &filter).await.unwrap_or(0) > 0;
                    if liked {
                        backend.delete_rows(Table::Likes, &filter).await
                    } else {
                        backend.insert_row(Table::Likes, row::like_row(&post_id, user)).await.map(|_| ())
                    }
                }
                2 => backend
                    .insert_row(Table::Comments, row::comment_row(&post_id, user, CAPTIONS[step % CAPTIONS.len()]))
                    .await
                    .map(|_| ()),
                _ if step % 20 == 3 => backend
                    .insert_row(
                        Table::Posts,
                        row::post_row(
                            user,
                            &format!("memory://feed-media/{}/{}.jpg", user, step),
                            MediaKind::Image,
                            "Fresh from the camera",
                            &AdvanceSettings::default(),
                            Utc::now(),
                        ),
                    )
                    .await
                    .map(|_| ()),
                _ => backend.delete_rows(Table::Comments, &filter).await,
            };
            if let Err(e) = result {
                log::warn!("demo activity step {} failed: {}", step, e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_posts_have_owners_and_interactions() {
        let backend = seeded_backend();
        let posts = backend.fetch_posts().await.unwrap();
        assert_eq!(posts.len(), CAPTIONS.len());
        assert!(posts.iter().all(|p| p["user_profile"].is_object()));
        assert!(!backend.rows(Table::Likes).is_empty());
        assert_eq!(backend.rows(Table::Comments).len(), CAPTIONS.len());
    }
}
