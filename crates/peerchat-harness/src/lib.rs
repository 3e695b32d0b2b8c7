//! PeerChat Harness
//!
//! In-process stand-ins for the external collaborators, used by tests and
//! demos:
//! - `LoopbackNetwork` / `LoopbackSignaling`: a signaling service and direct
//!   channels that never leave the process
//! - `GatedBackend`: an in-memory backend whose history fetches can be held
//!   back to force load races

pub mod backend;
pub mod network;

pub use backend::{GatedBackend, HistoryGate};
pub use network::{LoopbackNetwork, LoopbackSignaling};
