//! Realtime synchronisation of the feed: merge policy, per-post interaction
//! state, channel lifecycle and the post list.

pub mod reconcile;
pub mod aggregator;
pub mod subscription;
pub mod feed;
pub mod compose;

pub use aggregator::{Action, Outcome, PendingWrite, PostInteractions, RemoteWrite};
pub use compose::{PostDraft, ProfileForm, ProfileImage};
pub use feed::PostCollection;
pub use subscription::{ChannelState, DriftCheck, PostSubscription, SubscriptionManager, Ticket};
