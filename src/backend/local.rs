use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::ObjectStore;
use crate::error::FeedError;

/// Media kept on the local disk, for backends without an object store.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
}

pub fn data_dir() -> Result<PathBuf, FeedError> {
    // Check the XDG_DATA_HOME environment variable first
    let base_dir = match env::var_os("XDG_DATA_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .ok_or_else(|| FeedError::Config("Home directory not found".to_string()))?
            .join(".local/share"),
    };
    Ok(base_dir.join("feedsync"))
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn in_data_dir() -> Result<Self, FeedError> {
        Ok(Self::new(data_dir()?.join("objects")))
    }

    fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf, FeedError> {
        let relative = Path::new(path);
        if relative.is_absolute() || relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(FeedError::Upload(format!("Refusing object path {}", path)));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String, FeedError> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FeedError::Upload(format!("Failed to create {:?}: {}", parent, e)))?;
        }
        fs::write(&target, bytes)
            .map_err(|e| FeedError::Upload(format!("Failed to write {:?}: {}", target, e)))?;
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("file://{}", self.root.join(bucket).join(path).display())
    }
}
