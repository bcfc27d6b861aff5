pub mod backend;
pub mod cli;
pub mod controllers;
pub mod error;
pub mod models;
pub mod sync;
pub mod views;

// Re-exports for convenience
pub use error::{FeedError, Result};
pub use models::{Config, Post};
pub use sync::{PostCollection, PostInteractions, SubscriptionManager};
pub use controllers::{start_app, Services};
