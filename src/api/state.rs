//! Shared state handed to every axum handler.

use crate::bead::BeadEvent;
use crate::daemon_client::BeadClientDyn;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One decision lifecycle event, re-broadcast to browser SSE clients after
/// filtering the daemon's own stream down to `type = decision`.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEvent {
    pub kind: &'static str,
    pub bead: BeadEvent,
}

pub struct ApiState {
    pub daemon: Arc<dyn BeadClientDyn>,
    pub decision_events: broadcast::Sender<DecisionEvent>,
    pub vcs_repos: Vec<String>,
}

impl ApiState {
    pub fn new(daemon: Arc<dyn BeadClientDyn>, vcs_repos: Vec<String>) -> Arc<Self> {
        let (decision_events, _rx) = broadcast::channel(256);
        Arc::new(Self {
            daemon,
            decision_events,
            vcs_repos,
        })
    }
}
