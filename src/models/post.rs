use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

impl MediaKind {
    const VIDEO_EXTENSIONS: [&'static str; 5] = ["mp4", "mov", "webm", "mkv", "avi"];

    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if Self::VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvanceSettings {
    #[serde(rename = "shareToFacebook", default)]
    pub share_to_facebook: bool,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub collaborators: String,
}

/// Owner profile as it was when the post was fetched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct OwnerProfile {
    pub username: String,
    pub full_name: String,
    pub image: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub media: Option<String>,
    pub media_kind: MediaKind,
    pub description: String,
    pub advance_settings: AdvanceSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner: Option<OwnerProfile>,
}

impl Post {
    pub fn author(&self) -> &str {
        self.owner
            .as_ref()
            .map(|o| o.username.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.user_id)
    }

    pub fn datetime(&self) -> String {
        let local: DateTime<chrono::Local> = DateTime::from(self.created_at);
        local.format("%H:%M %h-%d-%Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_follows_extension() {
        assert_eq!(MediaKind::from_extension("MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("webm"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("jpg"), MediaKind::Image);
        assert_eq!(MediaKind::from_extension(""), MediaKind::Image);
    }

    #[test]
    fn author_falls_back_to_user_id() {
        let mut post = Post {
            id: "1".into(),
            user_id: "u-1".into(),
            media: None,
            media_kind: MediaKind::Image,
            description: String::new(),
            advance_settings: AdvanceSettings::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            owner: None,
        };
        assert_eq!(post.author(), "u-1");

        post.owner = Some(OwnerProfile {
            username: "ana".into(),
            ..OwnerProfile::default()
        });
        assert_eq!(post.author(), "ana");
    }
}
