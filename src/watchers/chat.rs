//! When a chat-tracking bead closes, relays the agent's response into the
//! original chat thread.

use crate::bead::BeadEnvelope;
use crate::daemon_client::BeadClientDyn;
use crate::notifier::ChatNotifierDyn;
use crate::nudger::Nudger;
use crate::state_store::{Collection, StateStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ChatWatcher {
    daemon: Arc<dyn BeadClientDyn>,
    notifier: Arc<dyn ChatNotifierDyn>,
    nudger: Arc<Nudger>,
    state_store: Arc<StateStore>,
    cancellation: CancellationToken,
}

impl ChatWatcher {
    pub fn new(
        daemon: Arc<dyn BeadClientDyn>,
        notifier: Arc<dyn ChatNotifierDyn>,
        nudger: Arc<Nudger>,
        state_store: Arc<StateStore>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            daemon,
            notifier,
            nudger,
            state_store,
            cancellation,
        }
    }

    pub async fn handle(&self, topic: &str, envelope: BeadEnvelope) {
        if topic != "beads.bead.closed" {
            return;
        }
        let bead = envelope.bead;
        if !bead.has_label("slack-chat") && !bead.has_label("slack-mention") {
            return;
        }

        let origin = match self.state_store.get(Collection::Chat, &bead.id).await {
            Some(reference) => Some((reference.channel_id, reference.timestamp)),
            None => {
                let full = match self.daemon.get_bead(&bead.id).await {
                    Ok(full) => full,
                    Err(e) => {
                        tracing::warn!(bead_id = %bead.id, error = %e, "failed to re-fetch chat bead");
                        return;
                    }
                };
                full.field("notes")
                    .and_then(|notes| parse_slack_tag(notes))
                    .or_else(|| bead.field("description").and_then(|d| parse_slack_tag(d)))
            }
        };

        let Some((channel_id, ts)) = origin else {
            tracing::warn!(bead_id = %bead.id, "no chat origin found for closed chat bead");
            return;
        };

        let full = match self.daemon.get_bead(&bead.id).await {
            Ok(full) => full,
            Err(e) => {
                tracing::warn!(bead_id = %bead.id, error = %e, "failed to re-fetch chat bead response");
                return;
            }
        };
        let response = full
            .field("reason")
            .or_else(|| full.field("close_reason"))
            .or_else(|| full.field("notes"))
            .unwrap_or("(no response recorded)");

        if let Err(e) = self.notifier.post_chat_reply(&channel_id, &ts, response).await {
            tracing::warn!(bead_id = %bead.id, error = %e, "failed to post chat reply");
        }

        if let Err(e) = self.state_store.remove(Collection::Chat, &bead.id).await {
            tracing::warn!(bead_id = %bead.id, error = %e, "failed to remove chat-message entry");
        }

        if !bead.assignee.is_empty() {
            if let Err(e) = self
                .nudger
                .nudge(&bead.assignee, "Your chat thread was just answered.", &self.cancellation)
                .await
            {
                tracing::warn!(agent = %bead.assignee, error = %e, "chat-close nudge failed");
            }
        }
    }
}

/// Parses a `[slack:channel:ts]` tag. Preserved exactly as the original
/// behaviour: splits on the first two colons only, so `ts` is taken verbatim
/// — including any `.` it contains — rather than being re-split on `:`. This
/// is only safe because Slack timestamps never contain a further `:`; do not
/// "fix" it to be more general.
pub fn parse_slack_tag(text: &str) -> Option<(String, String)> {
    let start = text.find("[slack:")?;
    let rest = &text[start + "[slack:".len()..];
    let end = rest.find(']')?;
    let inner = &rest[..end];
    let mut parts = inner.splitn(2, ':');
    let channel = parts.next()?;
    let ts = parts.next()?;
    Some((channel.to_string(), ts.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_with_dotted_timestamp() {
        let text = "agent response here [slack:C123:1700000000.123456] trailing";
        let (channel, ts) = parse_slack_tag(text).unwrap();
        assert_eq!(channel, "C123");
        assert_eq!(ts, "1700000000.123456");
    }

    #[test]
    fn missing_tag_returns_none() {
        assert_eq!(parse_slack_tag("no tag here"), None);
    }
}
