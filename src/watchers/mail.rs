//! Nudges assignees on high-priority or interrupt-labelled mail beads.

use crate::bead::{BeadEnvelope, BeadType};
use crate::nudger::Nudger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct MailWatcher {
    nudger: Arc<Nudger>,
    cancellation: CancellationToken,
}

impl MailWatcher {
    pub fn new(nudger: Arc<Nudger>, cancellation: CancellationToken) -> Self {
        Self { nudger, cancellation }
    }

    pub async fn handle(&self, topic: &str, envelope: BeadEnvelope) {
        if topic != "beads.bead.created" {
            return;
        }
        let bead = envelope.bead;
        if bead.kind != BeadType::Mail {
            return;
        }
        if bead.assignee.is_empty() {
            return;
        }

        let urgent = bead.has_label("delivery:interrupt") || bead.priority <= 1;
        if !urgent {
            return;
        }

        let sender = bead.mail_sender().unwrap_or("someone");
        let message = format!("New mail from {sender}");
        if let Err(e) = self
            .nudger
            .nudge(&bead.assignee, &message, &self.cancellation)
            .await
        {
            tracing::warn!(agent = %bead.assignee, error = %e, "mail nudge failed");
        }
    }
}
