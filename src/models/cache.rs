use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FeedError;

pub fn cache_dir() -> Result<PathBuf, FeedError> {
    // Check the XDG_CACHE_HOME environment variable first
    let base_cache_dir = match env::var_os("XDG_CACHE_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = env::var_os("HOME")
                .ok_or_else(|| FeedError::Config("Home environment variable not set".to_string()))?;
            Path::new(&home).join(".cache")
        }
    };

    let app_cache_dir = base_cache_dir.join("feedsync");

    fs::create_dir_all(&app_cache_dir)
        .map_err(|e| FeedError::Io(format!("Failed to create cache directory: {}", e)))?;

    Ok(app_cache_dir)
}

/// Where the binary writes its log, so the terminal UI stays clean.
pub fn log_file() -> Result<PathBuf, FeedError> {
    Ok(cache_dir()?.join("feedsync.log"))
}
