//! State synchronization between clients sharing one session document.

#[cfg(feature = "async")]
pub mod channel;
pub mod guard;

#[cfg(feature = "async")]
pub use channel::{ChannelError, InMemoryChannel, RemoteChannel, SnapshotStream};
pub use guard::{AuthorityGuard, DiscardReason, GuardDecision, GuardStats};
