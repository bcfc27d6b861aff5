use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tables holding per-post interactions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Like,
    Comment,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Like {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// A mapped row for one of the interaction tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Like(Like),
    Comment(Comment),
}

impl Interaction {
    pub fn kind(&self) -> InteractionKind {
        match self {
            Interaction::Like(_) => InteractionKind::Like,
            Interaction::Comment(_) => InteractionKind::Comment,
        }
    }

    pub fn post_id(&self) -> &str {
        match self {
            Interaction::Like(like) => &like.post_id,
            Interaction::Comment(comment) => &comment.post_id,
        }
    }
}
