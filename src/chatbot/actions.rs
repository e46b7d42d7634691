//! Routes interactive-component action-ids to handlers by longest-matching
//! prefix, rather than ad-hoc string tests — per design, a small registry.
//!
//! Three action families: `resolve_<beadId>_<index>` (an option button),
//! `resolve_other_<beadId>` (opens the "Other" modal), and
//! `dismiss_decision` (value carries the bead id). Modal submission closes
//! the bead via the daemon and, on success, edits the original message and
//! nudges the requesting agent.

use crate::chatbot::ChatBot;
use crate::daemon_client::BeadClientDyn;
use crate::error::{ChatError, Result};
use crate::notifier::DecisionNotifier;
use crate::nudger::Nudger;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The fixed set of artifact types selectable in the "Other" modal.
pub const ARTIFACT_TYPES: &[&str] = &["none", "report", "plan", "checklist", "diff-summary", "epic", "bug"];

/// One inbound interaction: a button click or a modal submission, already
/// decoded from whatever transport-specific payload it arrived in.
#[derive(Debug, Clone)]
pub enum Interaction {
    Button {
        action_id: String,
        value: String,
        user_id: String,
        trigger_id: String,
    },
    OtherModalSubmit {
        bead_id: String,
        rationale: String,
        artifact_type: String,
        user_id: String,
    },
}

/// Outcome of handling an interaction, for the caller to relay back to the
/// user (an ephemeral acknowledgement or failure message).
pub enum Outcome {
    Resolved,
    OpenOtherModal { bead_id: String, trigger_id: String },
    Ignored,
}

pub struct ActionRouter {
    daemon: Arc<dyn BeadClientDyn>,
    chatbot: Arc<ChatBot>,
    nudger: Arc<Nudger>,
    cancellation: CancellationToken,
}

impl ActionRouter {
    pub fn new(
        daemon: Arc<dyn BeadClientDyn>,
        chatbot: Arc<ChatBot>,
        nudger: Arc<Nudger>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            daemon,
            chatbot,
            nudger,
            cancellation,
        }
    }

    pub async fn handle(&self, interaction: Interaction) -> Result<Outcome> {
        match interaction {
            Interaction::Button {
                action_id,
                value,
                user_id,
                trigger_id,
            } => self.handle_button(&action_id, &value, &user_id, &trigger_id).await,
            Interaction::OtherModalSubmit {
                bead_id,
                rationale,
                artifact_type,
                user_id,
            } => {
                let chosen = rationale_or_chosen(&rationale);
                self.close_decision(&bead_id, &chosen, &rationale, &artifact_type, &user_id)
                    .await?;
                Ok(Outcome::Resolved)
            }
        }
    }

    async fn handle_button(&self, action_id: &str, value: &str, user_id: &str, trigger_id: &str) -> Result<Outcome> {
        if action_id == "dismiss_decision" {
            let bead_id = value;
            self.daemon
                .close_bead(bead_id, json!({"chosen": "dismissed"}))
                .await?;
            if let Err(e) = self.chatbot.dismiss_decision(bead_id).await {
                tracing::warn!(bead_id, error = %e, "failed to remove dismissed decision message");
            }
            return Ok(Outcome::Resolved);
        }
        if let Some(bead_id) = action_id.strip_prefix("resolve_other_") {
            return Ok(Outcome::OpenOtherModal {
                bead_id: bead_id.to_string(),
                trigger_id: trigger_id.to_string(),
            });
        }
        if action_id.starts_with("resolve_") {
            // value is "<beadId>:<index>"; the chosen option text is the
            // option the bead's own `options` field recorded at that index.
            let Some((bead_id, index)) = value.split_once(':') else {
                return Err(ChatError::BadResponse(format!("malformed resolve value: {value}")).into());
            };
            let index: usize = index
                .parse()
                .map_err(|_| ChatError::BadResponse(format!("malformed resolve value: {value}")))?;
            let bead = self.daemon.get_bead(bead_id).await?;
            let options = crate::chatbot::decision_options(&bead);
            let Some(chosen) = options.get(index) else {
                return Err(ChatError::BadResponse(format!(
                    "resolve index {index} out of range for bead {bead_id}"
                ))
                .into());
            };
            self.close_decision(bead_id, chosen, "", "none", user_id).await?;
            return Ok(Outcome::Resolved);
        }
        Ok(Outcome::Ignored)
    }

    async fn close_decision(
        &self,
        bead_id: &str,
        chosen: &str,
        rationale: &str,
        artifact_type: &str,
        _user_id: &str,
    ) -> Result<()> {
        let bead = self.daemon.get_bead(bead_id).await?;

        let mut fields = serde_json::Map::new();
        fields.insert("chosen".into(), json!(chosen));
        if !rationale.is_empty() {
            fields.insert("rationale".into(), json!(rationale));
        }
        if artifact_type != "none" {
            fields.insert("required_artifact".into(), json!(artifact_type));
            fields.insert("artifact_status".into(), json!("pending"));
        }
        self.daemon.close_bead(bead_id, serde_json::Value::Object(fields)).await?;

        if let Err(e) = self.chatbot.update_decision(bead_id, chosen).await {
            tracing::warn!(bead_id, error = %e, "failed to edit resolved decision message");
        }

        if let Some(requesting_bead_id) = bead.requesting_agent_bead_id() {
            if let Ok(requesting_bead) = self.daemon.get_bead(requesting_bead_id).await {
                if !requesting_bead.assignee.is_empty() {
                    if let Err(e) = self
                        .nudger
                        .nudge(&requesting_bead.assignee, "Your decision was just resolved.", &self.cancellation)
                        .await
                    {
                        tracing::warn!(agent = %requesting_bead.assignee, error = %e, "post-resolve nudge failed");
                    }
                }
            }
        }

        Ok(())
    }
}

fn rationale_or_chosen(rationale: &str) -> String {
    if rationale.is_empty() {
        "resolved".to_string()
    } else {
        rationale.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::ARTIFACT_TYPES;

    #[test]
    fn artifact_types_include_none_as_the_default() {
        assert_eq!(ARTIFACT_TYPES[0], "none");
        assert_eq!(ARTIFACT_TYPES.len(), 7);
    }
}
