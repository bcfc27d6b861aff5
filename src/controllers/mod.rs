pub mod app_controller;
pub mod post_controller;
pub mod demo;

use std::sync::Arc;

use crate::backend::{Backend, Identity, LocalObjectStore, MemoryBackend, NostrBackend, ObjectStore};
use crate::error::Result;
use crate::models::Config;

// Re-export key functions
pub use app_controller::start_app;
pub use post_controller::{complete_profile_from_flags, create_post_via_editor, publish_post};

/// The backend capabilities the controllers work with.
#[derive(Clone)]
pub struct Services {
    pub backend: Arc<dyn Backend>,
    pub store: Arc<dyn ObjectStore>,
    pub identity: Arc<dyn Identity>,
}

impl Services {
    pub fn memory(backend: MemoryBackend) -> Self {
        let backend = Arc::new(backend);
        Self { backend: backend.clone(), store: backend.clone(), identity: backend }
    }

    /// Connects to the configured relays. A contact list fetched from the
    /// relays is saved back to the config.
    pub async fn nostr(config: &mut Config) -> Result<Self> {
        let backend = Arc::new(NostrBackend::connect(config).await?);
        if config.contacts.is_empty() && !backend.contacts().is_empty() {
            config.contacts = backend.contacts();
            config.save()?;
        }
        Ok(Self {
            backend: backend.clone(),
            store: Arc::new(LocalObjectStore::in_data_dir()?),
            identity: backend,
        })
    }
}
