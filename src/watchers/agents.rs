//! Turns agent-bead lifecycle into spawn/state/crash notifications.

use crate::bead::{BeadEnvelope, BeadEvent, BeadType};
use crate::notifier::AgentNotifierDyn;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct AgentsWatcher {
    notifier: Arc<dyn AgentNotifierDyn>,
    crash_notified: Mutex<HashSet<String>>,
}

impl AgentsWatcher {
    pub fn new(notifier: Arc<dyn AgentNotifierDyn>) -> Self {
        Self {
            notifier,
            crash_notified: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle(&self, topic: &str, envelope: BeadEnvelope) {
        let bead = envelope.bead;
        if bead.kind != BeadType::Agent {
            return;
        }

        match topic {
            "beads.bead.created" => {
                self.notifier.notify_agent_spawn(&bead).await;
            }
            "beads.bead.updated" => {
                if bead.is_crashed() {
                    self.notify_crash_once(&bead).await;
                }
                if let Some(state) = bead.agent_state() {
                    self.notifier.notify_agent_state(&bead, state).await;
                }
            }
            "beads.bead.closed" => {
                if bead.is_crashed() {
                    self.notify_crash_once(&bead).await;
                }
                let state = bead.agent_state().unwrap_or("done");
                self.notifier.notify_agent_state(&bead, state).await;
            }
            _ => {}
        }
    }

    async fn notify_crash_once(&self, bead: &BeadEvent) {
        let already_notified = {
            let mut seen = self.crash_notified.lock().unwrap();
            !seen.insert(bead.id.clone())
        };
        if already_notified {
            return;
        }
        if let Err(e) = self.notifier.notify_agent_crash(bead).await {
            tracing::warn!(bead_id = %bead.id, error = %e, "notify_agent_crash failed");
        }
    }
}
