//! Emits work-item create/claim/close signals for display (the dashboard's
//! dirty-signal source and, eventually, an activity feed).

use crate::bead::{BeadEnvelope, BeadEvent, BeadType};
use crate::notifier::ActivityNotifierDyn;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct BeadActivityWatcher {
    notifier: Arc<dyn ActivityNotifierDyn>,
    seen: Mutex<HashSet<String>>,
}

fn tracked(kind: &BeadType) -> bool {
    matches!(
        kind,
        BeadType::Task | BeadType::Bug | BeadType::Feature | BeadType::Epic
    )
}

impl BeadActivityWatcher {
    pub fn new(notifier: Arc<dyn ActivityNotifierDyn>) -> Self {
        Self {
            notifier,
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub async fn handle(&self, topic: &str, envelope: BeadEnvelope) {
        let bead = envelope.bead;
        if !tracked(&bead.kind) {
            return;
        }

        let action = match topic {
            "beads.bead.created" => "created",
            "beads.bead.closed" => "closed",
            "beads.bead.updated" => {
                if self.is_claim(&bead) {
                    "claimed"
                } else {
                    return;
                }
            }
            _ => return,
        };

        if self.already_notified(&bead.id, action) {
            return;
        }
        self.notifier.notify_activity(&bead, action).await;
    }

    fn is_claim(&self, bead: &BeadEvent) -> bool {
        bead.status == crate::bead::BeadStatus::InProgress && !bead.assignee.is_empty()
    }

    fn already_notified(&self, id: &str, action: &str) -> bool {
        let key = format!("{id}:{action}");
        let mut seen = self.seen.lock().unwrap();
        !seen.insert(key)
    }
}
