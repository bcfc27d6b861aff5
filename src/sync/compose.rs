//! Creating posts and completing the profile.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::backend::{Backend, Identity, ObjectStore, Table};
use crate::error::{FeedError, Result};
use crate::models::row;
use crate::models::{AdvanceSettings, MediaKind, OwnerProfile, Post, Session, UserMetadata};

pub const MAX_DESCRIPTION: usize = 2200;
pub const MIN_USERNAME: usize = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub description: String,
    pub media: Option<PathBuf>,
    pub settings: AdvanceSettings,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}

fn read_media(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| FeedError::Validation(format!("Cannot read {}: {}", path.display(), e)))
}

/// Checks a draft and returns its trimmed description.
pub fn validate_draft(draft: &PostDraft) -> Result<String> {
    let description = draft.description.trim();
    if description.is_empty() {
        return Err(FeedError::Validation("Description is required".to_string()));
    }
    if description.chars().count() > MAX_DESCRIPTION {
        return Err(FeedError::Validation(format!(
            "Description is longer than {} characters",
            MAX_DESCRIPTION
        )));
    }
    if draft.media.is_none() {
        return Err(FeedError::Validation("A photo or video is required".to_string()));
    }
    Ok(description.to_string())
}

/// Uploads the media, then stores the post. Nothing is stored when the
/// upload fails. The returned post is meant to be shown first in the feed.
pub async fn create_post(
    backend: &dyn Backend,
    store: &dyn ObjectStore,
    session: Option<&Session>,
    draft: &PostDraft,
    bucket: &str,
) -> Result<Post> {
    let session = session.ok_or_else(|| FeedError::Unauthenticated("Please login to share a post".to_string()))?;
    let description = validate_draft(draft)?;
    let media = draft
        .media
        .as_deref()
        .ok_or_else(|| FeedError::Validation("A photo or video is required".to_string()))?;

    let ext = extension(media);
    let bytes = read_media(media)?;
    let now = Utc::now();
    let object = format!("{}/{}.{}", session.user_id(), now.timestamp_millis(), ext);
    let stored_path = store.upload_object(bucket, &object, bytes).await?;
    let url = store.public_url(bucket, &stored_path);
    log::info!("uploaded {} to {}", media.display(), url);

    if let Err(e) = backend
        .upsert_row(Table::Profiles, row::profile_row(session, now), "auth_user")
        .await
    {
        log::warn!("profile upsert for {} failed: {}", session.user_id(), e);
    }

    let fields = row::post_row(
        session.user_id(),
        &url,
        MediaKind::from_extension(&ext),
        &description,
        &draft.settings,
        now,
    );
    let stored = backend.insert_row(Table::Posts, fields).await?;
    let mut post = row::post_from_row(&stored)?;
    if post.owner.is_none() {
        let meta = &session.user.metadata;
        post.owner = Some(OwnerProfile {
            username: meta.username.clone(),
            full_name: meta.full_name.clone(),
            image: meta.image.clone(),
        });
    }
    Ok(post)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileImage {
    Url(String),
    File(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileForm {
    pub username: String,
    pub full_name: String,
    pub about: String,
    pub image: Option<ProfileImage>,
}

pub fn validate_profile(form: &ProfileForm) -> Result<()> {
    let username = form.username.trim();
    if username.is_empty() {
        return Err(FeedError::Validation("Username is required".to_string()));
    }
    if username.chars().count() < MIN_USERNAME {
        return Err(FeedError::Validation(format!(
            "Username must have at least {} characters",
            MIN_USERNAME
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(FeedError::Validation(
            "Username may only contain letters, numbers, underscores and dots".to_string(),
        ));
    }
    if form.full_name.trim().is_empty() {
        return Err(FeedError::Validation("Full name is required".to_string()));
    }
    if form.about.trim().is_empty() {
        return Err(FeedError::Validation("About is required".to_string()));
    }
    match &form.image {
        None => Err(FeedError::Validation("Profile image is required".to_string())),
        Some(ProfileImage::Url(url)) if url.trim().is_empty() => {
            Err(FeedError::Validation("Profile image is required".to_string()))
        }
        Some(_) => Ok(()),
    }
}

/// Stores the profile and updates the session metadata.
pub async fn complete_profile(
    backend: &dyn Backend,
    store: &dyn ObjectStore,
    identity: &dyn Identity,
    session: Option<&Session>,
    form: &ProfileForm,
    bucket: &str,
) -> Result<Session> {
    let session = session.ok_or_else(|| FeedError::Unauthenticated("Please login first".to_string()))?;
    validate_profile(form)?;

    let image = match &form.image {
        Some(ProfileImage::Url(url)) => url.trim().to_string(),
        Some(ProfileImage::File(path)) => {
            let object = format!("{}.{}", session.user_id(), extension(path));
            let stored = store.upload_object(bucket, &object, read_media(path)?).await?;
            store.public_url(bucket, &stored)
        }
        None => return Err(FeedError::Validation("Profile image is required".to_string())),
    };

    let metadata = UserMetadata {
        username: form.username.trim().to_string(),
        full_name: form.full_name.trim().to_string(),
        image,
        about: form.about.trim().to_string(),
    };
    let mut updated = session.clone();
    updated.user.metadata = metadata.clone();
    backend
        .upsert_row(Table::Profiles, row::profile_row(&updated, Utc::now()), "auth_user")
        .await?;
    let session = identity.update_user(metadata).await?;
    log::info!("profile of {} completed", session.user_id());
    Ok(session)
}
