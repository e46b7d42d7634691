//! A single pinned chat message showing the whole fleet's state, refreshed
//! periodically and on dirty signals from SSE handlers.
//!
//! The ticker loop follows the same interval-plus-failure-tolerant shape as
//! the reference architecture's own scheduled-task runner, minus a
//! persistence layer — this dashboard has exactly one instance, not a
//! registrable collection of jobs.

use crate::chatbot::transport::{ChatMessage, ChatTransportDyn};
use crate::chatbot::DASHBOARD_MARKER;
use crate::daemon_client::BeadClientDyn;
use crate::state_store::{DashboardRef, StateStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const STALE_AFTER: Duration = Duration::from_secs(5 * 60);
const EDIT_RATE_LIMIT: Duration = Duration::from_secs(3);

pub struct Dashboard {
    transport: Arc<dyn ChatTransportDyn>,
    daemon: Arc<dyn BeadClientDyn>,
    state_store: Arc<StateStore>,
    channel: String,
    interval: Duration,
    dirty: AtomicBool,
    current: Mutex<Option<DashboardRef>>,
    last_edit: Mutex<Instant>,
}

impl Dashboard {
    pub fn new(
        transport: Arc<dyn ChatTransportDyn>,
        daemon: Arc<dyn BeadClientDyn>,
        state_store: Arc<StateStore>,
        channel: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            daemon,
            state_store,
            channel: channel.into(),
            interval,
            dirty: AtomicBool::new(true),
            current: Mutex::new(None),
            last_edit: Mutex::new(Instant::now() - STALE_AFTER),
        }
    }

    /// Called by SSE handlers on any agent or decision event, short-circuits
    /// the hash check on the next tick.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Three-tier recovery: adopt from StateStore, else adopt a pinned
    /// message carrying the marker, else post a new one and pin it.
    pub async fn recover(&self) {
        if let Some(reference) = self.state_store.get_dashboard().await {
            let content = self.build_content().await;
            match self.transport.edit(&reference.channel_id, &reference.timestamp, content).await {
                Ok(()) => {
                    *self.current.lock().unwrap() = Some(reference);
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to adopt dashboard message from StateStore, scanning pins");
                }
            }
        }

        if let Ok(pins) = self.transport.list_pins(&self.channel).await {
            if let Some(pinned) = pins.into_iter().find(|p| p.text.contains(DASHBOARD_MARKER)) {
                let reference = DashboardRef {
                    channel_id: pinned.channel_id,
                    timestamp: pinned.timestamp,
                    last_hash: String::new(),
                };
                *self.current.lock().unwrap() = Some(reference.clone());
                if let Err(e) = self.state_store.set_dashboard(reference).await {
                    tracing::warn!(error = %e, "failed to persist recovered dashboard reference");
                }
                return;
            }
        }

        self.post_new().await;
    }

    async fn post_new(&self) {
        let previous = self.current.lock().unwrap().clone();
        let content = self.build_content().await;
        let posted = match self.transport.post(&self.channel, content).await {
            Ok(posted) => posted,
            Err(e) => {
                tracing::warn!(error = %e, "failed to post new dashboard message");
                return;
            }
        };
        if let Err(e) = self.transport.add_pin(&posted.channel_id, &posted.timestamp).await {
            tracing::warn!(error = %e, "failed to pin new dashboard message");
        }

        if let Some(previous) = previous {
            if let Err(e) = self.transport.remove_pin(&previous.channel_id, &previous.timestamp).await {
                tracing::debug!(error = %e, "failed to unpin previous dashboard message");
            }
            if let Err(e) = self.transport.delete(&previous.channel_id, &previous.timestamp).await {
                tracing::debug!(error = %e, "failed to delete previous dashboard message");
            }
        }

        let reference = DashboardRef {
            channel_id: posted.channel_id,
            timestamp: posted.timestamp,
            last_hash: String::new(),
        };
        *self.current.lock().unwrap() = Some(reference.clone());
        if let Err(e) = self.state_store.set_dashboard(reference).await {
            tracing::warn!(error = %e, "failed to persist new dashboard reference");
        }
    }

    /// Runs the refresh ticker until `cancellation` fires.
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        let elapsed_since_edit = self.last_edit.lock().unwrap().elapsed();
        if elapsed_since_edit < EDIT_RATE_LIMIT {
            self.dirty.store(true, Ordering::Relaxed);
            return;
        }

        let hash = self.compute_hash().await;
        let stale = self
            .current
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.last_hash != hash)
            .unwrap_or(true);
        let dirty = self.dirty.swap(false, Ordering::Relaxed);
        let aged_out = elapsed_since_edit >= STALE_AFTER;

        if !stale && !dirty && !aged_out {
            return;
        }

        let Some(reference) = self.current.lock().unwrap().clone() else {
            self.post_new().await;
            return;
        };

        let content = ChatMessage {
            text: self.render(&hash).await,
            buttons: Vec::new(),
            thread_ts: None,
        };
        match self.transport.edit(&reference.channel_id, &reference.timestamp, content).await {
            Ok(()) => {
                *self.last_edit.lock().unwrap() = Instant::now();
                let updated = DashboardRef {
                    last_hash: hash,
                    ..reference
                };
                *self.current.lock().unwrap() = Some(updated.clone());
                if let Err(e) = self.state_store.set_dashboard(updated).await {
                    tracing::warn!(error = %e, "failed to persist dashboard edit");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "dashboard edit failed, will retry next tick");
                self.dirty.store(true, Ordering::Relaxed);
            }
        }
    }

    async fn roster_tokens(&self) -> Vec<String> {
        let mut tokens = Vec::new();
        if let Ok(agents) = self.daemon.list_agent_beads().await {
            for agent in &agents {
                let state = agent.agent_state().unwrap_or("unknown");
                let project = agent.field("project").unwrap_or("-");
                tokens.push(format!("{}:{}:{}", agent.assignee, state, project));
            }
        }
        if let Ok(decisions) = self.daemon.list_decision_beads().await {
            for decision in &decisions {
                tokens.push(format!("dec:{}", decision.id));
            }
        }
        tokens.sort();
        tokens
    }

    async fn compute_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let tokens = self.roster_tokens().await;
        let mut hasher = DefaultHasher::new();
        tokens.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }

    async fn render(&self, _hash: &str) -> String {
        let tokens = self.roster_tokens().await;
        format!("{}\nFleet status:\n{}", DASHBOARD_MARKER, tokens.join("\n"))
    }

    async fn build_content(&self) -> ChatMessage {
        let hash = self.compute_hash().await;
        ChatMessage {
            text: self.render(&hash).await,
            buttons: Vec::new(),
            thread_ts: None,
        }
    }
}
