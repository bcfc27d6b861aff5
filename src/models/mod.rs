pub mod post;
pub mod interaction;
pub mod session;
pub mod row;
pub mod config;
pub mod cache;

// Re-export important structs for convenience
pub use post::{AdvanceSettings, MediaKind, OwnerProfile, Post};
pub use interaction::{Comment, Interaction, InteractionKind, Like};
pub use session::{AuthEvent, AuthState, Route, Session, SessionChange, User, UserMetadata};
pub use row::Row;
pub use config::Config;
