//! Core Logic Module
//!
//! The core logic task is split into focused components:
//! - `state`: session state owned by the task, and its statistics
//! - `handlers`: command, event and sync-report handlers
//! - `task`: the `CoreLogicTask` select loop
//!
//! All session state is serialized through the one task. Handlers never
//! block; backend I/O runs in spawned tasks that report back through the
//! sync channel.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::{CommandHandlers, Transition};
pub use state::{CoreState, CoreStats};
pub use task::CoreLogicTask;
