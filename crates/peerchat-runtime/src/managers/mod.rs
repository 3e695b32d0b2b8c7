//! Stateful managers for the PeerChat runtime
//!
//! These managers are owned by the core logic task and never shared; each
//! one returns the effects and app events its transitions produce.

pub mod connection;
pub mod history;
pub mod identity;

pub use connection::{ClosedOutcome, ConnectionController, ConnectionStats, OpenOutcome, PeerConnection};
pub use history::{HistoryOutcome, HistoryStats, HistorySynchronizer, SyncReport};
pub use identity::{IdentityManager, IdentityStatus};
