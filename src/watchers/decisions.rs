//! Turns decision-bead create/close/update into chat posts, edits,
//! dismissals, and agent nudges. Handles escalations with a time-bounded
//! dedup window.

use crate::bead::{BeadEnvelope, BeadType};
use crate::dedup::Dedup;
use crate::daemon_client::BeadClientDyn;
use crate::notifier::DecisionNotifierDyn;
use crate::nudger::Nudger;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct DecisionsWatcher {
    daemon: Arc<dyn BeadClientDyn>,
    notifier: Arc<dyn DecisionNotifierDyn>,
    nudger: Arc<Nudger>,
    escalation_dedup: Dedup,
    cancellation: CancellationToken,
}

impl DecisionsWatcher {
    pub fn new(
        daemon: Arc<dyn BeadClientDyn>,
        notifier: Arc<dyn DecisionNotifierDyn>,
        nudger: Arc<Nudger>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            daemon,
            notifier,
            nudger,
            escalation_dedup: Dedup::new(Duration::from_secs(3600)),
            cancellation,
        }
    }

    pub async fn handle(&self, topic: &str, envelope: BeadEnvelope) {
        let bead = envelope.bead;
        let is_report = bead.kind == BeadType::Report;
        if bead.kind != BeadType::Decision && !(is_report && topic == "beads.bead.closed") {
            return;
        }

        match topic {
            "beads.bead.created" => {
                if let Err(e) = self.notifier.notify_decision(&bead).await {
                    tracing::warn!(bead_id = %bead.id, error = %e, "notify_decision failed");
                }
            }
            "beads.bead.closed" if is_report => {
                let Some(decision_id) = bead.decision_id() else {
                    return;
                };
                let (report_type, content) = if bead.content().is_some() {
                    (
                        bead.report_type().unwrap_or("report").to_string(),
                        bead.content().unwrap_or_default().to_string(),
                    )
                } else {
                    match self.daemon.get_bead(&bead.id).await {
                        Ok(full) => (
                            full.report_type().unwrap_or("report").to_string(),
                            full.content().unwrap_or_default().to_string(),
                        ),
                        Err(e) => {
                            tracing::warn!(bead_id = %bead.id, error = %e, "failed to re-fetch report bead");
                            return;
                        }
                    }
                };
                if let Err(e) = self.notifier.post_report(decision_id, &report_type, &content).await {
                    tracing::warn!(decision_id, error = %e, "post_report failed");
                }
            }
            "beads.bead.closed" => {
                let bead = if bead.chosen().is_none() {
                    match self.daemon.get_bead(&bead.id).await {
                        Ok(full) => full,
                        Err(e) => {
                            tracing::warn!(bead_id = %bead.id, error = %e, "failed to re-fetch closed decision");
                            return;
                        }
                    }
                } else {
                    bead
                };
                self.handle_closed(&bead).await;
            }
            "beads.bead.updated" => {
                if bead.has_label("escalated") && !self.escalation_dedup.seen(bead.id.clone()) {
                    if let Err(e) = self.notifier.notify_escalation(&bead).await {
                        tracing::warn!(bead_id = %bead.id, error = %e, "notify_escalation failed");
                    }
                }
            }
            _ => {}
        }
    }

    async fn handle_closed(&self, bead: &crate::bead::BeadEvent) {
        let chosen = bead.chosen().unwrap_or_default();
        if chosen == "_expired" || chosen == "dismissed" {
            if let Err(e) = self.notifier.dismiss_decision(&bead.id).await {
                tracing::warn!(bead_id = %bead.id, error = %e, "dismiss_decision failed");
            }
        } else {
            if let Err(e) = self.notifier.update_decision(&bead.id, chosen).await {
                tracing::warn!(bead_id = %bead.id, error = %e, "update_decision failed");
            }
        }

        if bead.assignee.is_empty() {
            return;
        }
        let mut message = format!("Decision resolved: {chosen}");
        if let Some(rationale) = bead.rationale() {
            message.push_str(&format!(" — {rationale}"));
        }
        if let Some(artifact_type) = bead.required_artifact() {
            message.push_str(&format!(
                " — Artifact required ({artifact_type}). Use the bridge CLI to submit."
            ));
        }
        if let Err(e) = self
            .nudger
            .nudge(&bead.assignee, &message, &self.cancellation)
            .await
        {
            tracing::warn!(agent = %bead.assignee, error = %e, "nudge after decision close failed");
        }
    }
}
