use std::fs::{self, File, OpenOptions};
use std::io::{Write, BufReader};
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use anyhow::Context;

use crate::error::FeedError;

fn default_feed_days() -> u64 { 7 }
fn default_mount_window() -> usize { 2 }
fn default_resync_secs() -> u64 { 30 }
fn default_media_bucket() -> String { "feed-media".to_string() }
fn default_profile_bucket() -> String { "profile-images".to_string() }

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub key: String,
    pub relays: Vec<String>,
    #[serde(default)]
    pub contacts: Vec<String>,
    /// How far back the feed reaches, in days.
    #[serde(default = "default_feed_days")]
    pub feed_days: u64,
    /// Posts above and below the selected one that keep live subscriptions.
    #[serde(default = "default_mount_window")]
    pub mount_window: usize,
    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,
    #[serde(default = "default_media_bucket")]
    pub media_bucket: String,
    #[serde(default = "default_profile_bucket")]
    pub profile_bucket: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: String::new(),
            relays: vec![],
            contacts: vec![],
            feed_days: default_feed_days(),
            mount_window: default_mount_window(),
            resync_secs: default_resync_secs(),
            media_bucket: default_media_bucket(),
            profile_bucket: default_profile_bucket(),
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf, FeedError> {
        Ok(dirs::home_dir()
            .ok_or_else(|| FeedError::Config("Could not find home directory".to_string()))?
            .join(".config/feedsync/config.json"))
    }

    pub fn load() -> Result<Self, FeedError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(config_path: &PathBuf) -> Result<Self, FeedError> {
        let file = File::open(config_path)
            .with_context(|| format!("Failed to open config file at {:?}", config_path))?;

        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .context("Failed to parse config JSON")?;

        if config.key.trim().is_empty() {
            return Err(FeedError::Config("`key` must be set".to_string()));
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), FeedError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, config_path: &PathBuf) -> Result<(), FeedError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(&self)
            .context("Failed to serialize config to JSON")?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(config_path)
            .with_context(|| format!("Failed to open conf file for writing at {:?}", config_path))?;

        file.write_all(json.as_bytes())
            .context("Failed to write config data")?;

        Ok(())
    }
}
