//! Per-domain watchers: each subscribes to a slice of the SSE topic space,
//! applies policy, and calls into a Notifier capability and/or the Nudger.
//! Handlers are registered onto an [`crate::sse::SseStream`] and must not
//! block long — any slow work they do should be spawned onto its own task.

pub mod agents;
pub mod bead_activity;
pub mod chat;
pub mod decisions;
pub mod mail;
