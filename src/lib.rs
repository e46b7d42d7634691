//! beadbridge: mediates between a beads daemon's lifecycle stream, a chat
//! workspace, and a fleet of long-running agent processes.

pub mod api;
pub mod bead;
pub mod bridge;
pub mod chatbot;
pub mod config;
pub mod dashboard;
pub mod daemon_client;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod nudger;
pub mod router;
pub mod sse;
pub mod state_store;
pub mod watchers;

pub use error::{Error, Result};
