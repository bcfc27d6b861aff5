use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use crate::cli::Flags;
use crate::controllers::Services;
use crate::error::{FeedError, Result};
use crate::models::{AdvanceSettings, Config, Post, Session};
use crate::sync::compose::{self, PostDraft, ProfileForm, ProfileImage};

/// Opens `$EDITOR` on an empty file and returns what was written.
pub fn create_post_via_editor() -> Result<String> {
    let editor = env::var("EDITOR")
        .unwrap_or_else(|_| "vi".to_string());

    let mut temp_path = env::temp_dir();
    temp_path.push(format!("feedsync-post-{}", std::process::id()));

    let status = Command::new(editor)
        .arg(&temp_path)
        .status()?;

    if !status.success() {
        return Err(FeedError::Io("Editor exited with non-zero status".to_string()));
    }

    let content = fs::read_to_string(&temp_path)?;
    let _ = fs::remove_file(&temp_path);
    Ok(content)
}

pub fn draft_from_flags(flags: &Flags, description: String) -> PostDraft {
    PostDraft {
        description,
        media: flags.media.clone(),
        settings: AdvanceSettings {
            share_to_facebook: flags.share_facebook,
            location: flags.location.clone().unwrap_or_default(),
            collaborators: flags.collaborators.clone().unwrap_or_default(),
        },
    }
}

/// Creates a post from the command line, asking for the description in the
/// editor.
pub async fn publish_post(services: &Services, flags: &Flags, config: &Config) -> Result<Post> {
    let session = services.identity.current_session().await?;
    // Check the draft before the user spends time in the editor.
    if flags.media.is_none() {
        return Err(FeedError::Validation("Pass the photo or video with --media".to_string()));
    }
    let description = create_post_via_editor()?;
    let draft = draft_from_flags(flags, description);
    let post = compose::create_post(
        services.backend.as_ref(),
        services.store.as_ref(),
        session.as_ref(),
        &draft,
        &config.media_bucket,
    )
    .await?;
    log::info!("created post {}", post.id);
    Ok(post)
}

pub fn profile_form_from_flags(flags: &Flags) -> ProfileForm {
    let image = flags.image.as_ref().map(|image| {
        if image.starts_with("http://") || image.starts_with("https://") {
            ProfileImage::Url(image.clone())
        } else {
            ProfileImage::File(PathBuf::from(image))
        }
    });
    ProfileForm {
        username: flags.username.clone().unwrap_or_default(),
        full_name: flags.full_name.clone().unwrap_or_default(),
        about: flags.about.clone().unwrap_or_default(),
        image,
    }
}

pub async fn complete_profile_from_flags(services: &Services, flags: &Flags, config: &Config) -> Result<Session> {
    let session = services.identity.current_session().await?;
    compose::complete_profile(
        services.backend.as_ref(),
        services.store.as_ref(),
        services.identity.as_ref(),
        session.as_ref(),
        &profile_form_from_flags(flags),
        &config.profile_bucket,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn urls_and_files_are_told_apart() {
        let flags = Flags::parse_from(["feedsync", "profile", "--image", "https://img/a.png"]);
        assert_eq!(profile_form_from_flags(&flags).image, Some(ProfileImage::Url("https://img/a.png".into())));

        let flags = Flags::parse_from(["feedsync", "profile", "--image", "me.png"]);
        assert_eq!(profile_form_from_flags(&flags).image, Some(ProfileImage::File("me.png".into())));
    }

    #[test]
    fn draft_carries_advance_settings() {
        let flags = Flags::parse_from(["feedsync", "post", "--media", "a.jpg", "--collaborators", "bea"]);
        let draft = draft_from_flags(&flags, "hi".into());
        assert_eq!(draft.settings.collaborators, "bea");
        assert_eq!(draft.media, Some(PathBuf::from("a.jpg")));
    }
}
