use std::io;
use thiserror::Error;
use serde::{Serialize, Deserialize};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedError {
    #[error("Please log in: {0}")]
    Unauthenticated(String),

    #[error("Comment is empty")]
    EmptyComment,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Remote write failed: {0}")]
    RemoteWrite(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Malformed row: {0}")]
    Mapping(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Nostr SDK error: {0}")]
    NostrSdk(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Anyhow error: {0}")]
    Anyhow(String),
}

impl FeedError {
    /// Short text for the transient status line.
    pub fn notice(&self) -> String {
        match self {
            FeedError::Unauthenticated(_) => "Please log in first".to_string(),
            FeedError::EmptyComment => "Write something before posting".to_string(),
            FeedError::RemoteWrite(_) => "Could not save, please try again".to_string(),
            FeedError::Fetch(_) => "Could not load, press r to retry".to_string(),
            FeedError::Upload(_) => "Upload failed".to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, FeedError::Unauthenticated(_))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Json(err.to_string())
    }
}

impl From<io::Error> for FeedError {
    fn from(err: io::Error) -> Self {
        FeedError::Io(err.to_string())
    }
}

impl From<anyhow::Error> for FeedError {
    fn from(err: anyhow::Error) -> Self {
        FeedError::Anyhow(format!("{:#}", err))
    }
}

pub type Result<T, E = FeedError> = std::result::Result<T, E>;
