//! Conversion between the loosely typed rows the backend speaks and the
//! crate's own records. Nothing outside this module reads row fields.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::error::{FeedError, Result};
use crate::models::interaction::{Comment, Interaction, InteractionKind, Like};
use crate::models::post::{AdvanceSettings, MediaKind, OwnerProfile, Post};
use crate::models::session::Session;

pub type Row = Map<String, Value>;

/// Ids arrive as strings or as integers depending on the table.
pub fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn row_id(row: &Row) -> Option<String> {
    row.get("id").and_then(id_value)
}

pub fn field_id(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(id_value)
}

fn text(row: &Row, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_id(row: &Row, key: &str) -> Result<String> {
    field_id(row, key).ok_or_else(|| FeedError::Mapping(format!("missing `{}` in {}", key, Value::Object(row.clone()))))
}

fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

fn row_timestamp(row: &Row, key: &str) -> Option<DateTime<Utc>> {
    row.get(key).and_then(timestamp)
}

fn owner_profile(value: &Value) -> Option<OwnerProfile> {
    let profile = value.as_object()?;
    // Both spellings exist in stored profiles.
    let full_name = text(profile, "fullName")
        .or_else(|| text(profile, "fullname"))
        .unwrap_or_default();
    Some(OwnerProfile {
        username: text(profile, "username").unwrap_or_default(),
        full_name,
        image: text(profile, "image").unwrap_or_default(),
    })
}

pub fn post_from_row(row: &Row) -> Result<Post> {
    let id = required_id(row, "id")?;
    let user_id = required_id(row, "user_id")?;

    let media_kind = match row.get("media_type").and_then(Value::as_str) {
        Some("video") => MediaKind::Video,
        _ => MediaKind::Image,
    };

    let advance_settings = match row.get("advance_settings") {
        Some(Value::Object(settings)) => {
            serde_json::from_value(Value::Object(settings.clone())).unwrap_or_else(|e| {
                log::warn!("Ignoring advance settings of post {}: {}", id, e);
                AdvanceSettings::default()
            })
        }
        _ => AdvanceSettings::default(),
    };

    let created_at = row_timestamp(row, "created_at").unwrap_or_default();
    let updated_at = row_timestamp(row, "updated_at").unwrap_or(created_at);

    Ok(Post {
        media: text(row, "media").filter(|m| !m.is_empty()),
        media_kind,
        description: text(row, "description")
            .or_else(|| text(row, "caption"))
            .unwrap_or_default(),
        advance_settings,
        created_at,
        updated_at,
        owner: row.get("user_profile").and_then(owner_profile),
        id,
        user_id,
    })
}

pub fn like_from_row(row: &Row) -> Result<Like> {
    Ok(Like {
        id: required_id(row, "id")?,
        post_id: required_id(row, "post_id")?,
        user_id: required_id(row, "user_id")?,
    })
}

pub fn comment_from_row(row: &Row) -> Result<Comment> {
    Ok(Comment {
        id: required_id(row, "id")?,
        post_id: required_id(row, "post_id")?,
        user_id: required_id(row, "user_id")?,
        text: text(row, "text").unwrap_or_default(),
        created_at: row_timestamp(row, "created_at"),
    })
}

pub fn interaction_from_row(kind: InteractionKind, row: &Row) -> Result<Interaction> {
    match kind {
        InteractionKind::Like => like_from_row(row).map(Interaction::Like),
        InteractionKind::Comment => comment_from_row(row).map(Interaction::Comment),
    }
}

/// Maps every row, skipping and logging the ones that do not fit.
pub fn map_rows<T>(rows: &[Row], map: impl Fn(&Row) -> Result<T>) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match map(row) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skipping row: {}", e);
                None
            }
        })
        .collect()
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

pub fn like_row(post_id: &str, user_id: &str) -> Row {
    object(json!({ "post_id": post_id, "user_id": user_id }))
}

pub fn comment_row(post_id: &str, user_id: &str, text: &str) -> Row {
    object(json!({ "post_id": post_id, "user_id": user_id, "text": text }))
}

pub fn post_row(
    user_id: &str,
    media: &str,
    media_kind: MediaKind,
    description: &str,
    settings: &AdvanceSettings,
    now: DateTime<Utc>,
) -> Row {
    object(json!({
        "created_at": now.to_rfc3339(),
        "updated_at": now.to_rfc3339(),
        "user_id": user_id,
        "media_type": media_kind.as_str(),
        "media": media,
        "description": description,
        "advance_settings": settings,
    }))
}

pub fn profile_row(session: &Session, now: DateTime<Utc>) -> Row {
    let meta = &session.user.metadata;
    object(json!({
        "auth_user": session.user.id,
        "email": session.user.email,
        "username": meta.username,
        "fullName": meta.full_name,
        "image": meta.image,
        "about": meta.about,
        "updated_at": now.to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(value: Value) -> Row {
        object(value)
    }

    #[test]
    fn numeric_ids_become_strings() {
        let like = like_from_row(&row(json!({ "id": 42, "post_id": "p-1", "user_id": "u-1" }))).unwrap();
        assert_eq!(
            like,
            Like { id: "42".into(), post_id: "p-1".into(), user_id: "u-1".into() }
        );
    }

    #[test]
    fn missing_id_is_a_mapping_error() {
        let err = comment_from_row(&row(json!({ "post_id": "p-1", "user_id": "u-1" }))).unwrap_err();
        assert!(matches!(err, FeedError::Mapping(_)));
    }

    #[test]
    fn post_row_with_profile_join() {
        let post = post_from_row(&row(json!({
            "id": "p-1",
            "user_id": "u-1",
            "media": "https://cdn/p-1.mp4",
            "media_type": "video",
            "description": "sunset",
            "advance_settings": { "shareToFacebook": true, "location": "Lisbon" },
            "created_at": "2024-05-01T10:00:00+00:00",
            "user_profile": { "username": "ana", "fullname": "Ana Lima", "image": "a.png" }
        })))
        .unwrap();

        assert_eq!(post.media_kind, MediaKind::Video);
        assert_eq!(post.updated_at, post.created_at);
        assert_eq!(
            post.advance_settings,
            AdvanceSettings { share_to_facebook: true, location: "Lisbon".into(), collaborators: String::new() }
        );
        assert_eq!(post.owner.unwrap().full_name, "Ana Lima");
    }

    #[test]
    fn map_rows_skips_malformed() {
        let rows = vec![
            row(json!({ "id": 1, "post_id": "p", "user_id": "u" })),
            row(json!({ "post_id": "p" })),
        ];
        assert_eq!(map_rows(&rows, like_from_row).len(), 1);
    }
}
