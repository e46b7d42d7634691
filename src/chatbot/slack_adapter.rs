//! The concrete chat transport: a socket-mode session against the chat
//! workspace, built on `slack-morphism`. Adapted from the messaging layer's
//! own Slack adapter — the socket-mode wiring, event-ack-within-3s shape, and
//! block-kit button conventions are the same; the payloads it produces now
//! carry bridge-specific `InboundEvent`s instead of the messaging layer's
//! `InboundMessage`.

use crate::chatbot::transport::{ChatMessage, ChatTransport, PostedMessage};
use crate::config::ChatPermissions;
use crate::error::{ChatError, Result};
use arc_swap::ArcSwap;
use slack_morphism::api::*;
use slack_morphism::hyper_tokio::SlackClientHyperConnector;
use slack_morphism::listener::SlackClientEventsListenerEnvironment;
use slack_morphism::prelude::*;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An inbound happening from the chat workspace, decoded from whichever
/// socket-mode envelope it arrived in.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    Message {
        channel_id: String,
        user_id: String,
        ts: String,
        thread_ts: Option<String>,
        text: String,
    },
    AppMention {
        channel_id: String,
        user_id: String,
        thread_ts: String,
        text: String,
    },
    Command {
        command: String,
        channel_id: String,
        user_id: String,
        text: String,
    },
    BlockAction {
        action_id: String,
        value: String,
        channel_id: String,
        message_ts: String,
        user_id: String,
        trigger_id: String,
    },
    ViewSubmission {
        callback_id: String,
        user_id: String,
        values: std::collections::HashMap<String, String>,
    },
}

pub struct SlackAdapter {
    client: Arc<SlackClient<SlackClientHyperConnector<slack_morphism::hyper_tokio::SlackClientHyperHttpsConnector>>>,
    bot_token: SlackApiToken,
    pub permissions: Arc<ArcSwap<ChatPermissions>>,
    pub inbound_tx: mpsc::UnboundedSender<InboundEvent>,
}

impl SlackAdapter {
    pub fn new(
        bot_token: impl Into<String>,
        permissions: Arc<ArcSwap<ChatPermissions>>,
    ) -> (Self, mpsc::UnboundedReceiver<InboundEvent>) {
        let connector = SlackClientHyperConnector::new().expect("tls backend initializes");
        let client = Arc::new(SlackClient::new(connector));
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                bot_token: SlackApiToken::new(bot_token.into().into()),
                permissions,
                inbound_tx: tx,
            },
            rx,
        )
    }

    fn session(&self) -> SlackClientSession<'_, SlackClientHyperConnector<slack_morphism::hyper_tokio::SlackClientHyperHttpsConnector>> {
        self.client.open_session(&self.bot_token)
    }

    /// Starts the socket-mode listener under `app_token`. Runs until the
    /// environment's listener task is aborted by the caller's cancellation.
    pub async fn start(&self, app_token: impl Into<String>) -> Result<()> {
        let app_token = SlackApiToken::new(app_token.into().into());
        let environment = Arc::new(
            SlackClientEventsListenerEnvironment::new(self.client.clone())
                .with_error_handler(|err, _client| {
                    tracing::warn!(error = %err, "slack socket-mode error");
                }),
        );
        let tx = self.inbound_tx.clone();
        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_push_events({
                let tx = tx.clone();
                move |event, _client, _states| {
                    let tx = tx.clone();
                    async move {
                        dispatch_push_event(event, &tx);
                        Ok(())
                    }
                }
            })
            .with_command_events({
                let tx = tx.clone();
                move |event, _client, _states| {
                    let tx = tx.clone();
                    async move {
                        tx.send(InboundEvent::Command {
                            command: event.command.0,
                            channel_id: event.channel_id.to_string(),
                            user_id: event.user_id.to_string(),
                            text: event.text.unwrap_or_default(),
                        })
                        .ok();
                        // Acks within the socket-mode 3s budget with an empty
                        // ephemeral response; the actual reply is sent async.
                        Ok(SlackCommandEventResponse::new(
                            SlackMessageContent::new().with_text("".into()),
                        ))
                    }
                }
            })
            .with_interaction_events({
                let tx = tx.clone();
                move |event, _client, _states| {
                    let tx = tx.clone();
                    async move {
                        dispatch_interaction_event(event, &tx);
                        Ok(())
                    }
                }
            });

        let listener = SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            environment,
            callbacks,
        );
        listener.listen_for(&app_token).await.map_err(|e| {
            ChatError::Transport(e.to_string())
        })?;
        listener.serve().await;
        Ok(())
    }
}

fn dispatch_push_event(event: SlackPushEvent, tx: &mpsc::UnboundedSender<InboundEvent>) {
    if let SlackPushEvent::EventCallback(callback) = event {
        match callback.event {
            SlackEventCallbackBody::Message(message) => {
                if let (Some(channel), Some(user), Some(text)) =
                    (message.origin.channel, message.sender.user, message.content.and_then(|c| c.text))
                {
                    tx.send(InboundEvent::Message {
                        channel_id: channel.to_string(),
                        user_id: user.to_string(),
                        ts: message.origin.ts.to_string(),
                        thread_ts: message.origin.thread_ts.map(|t| t.to_string()),
                        text,
                    })
                    .ok();
                }
            }
            SlackEventCallbackBody::AppMention(mention) => {
                tx.send(InboundEvent::AppMention {
                    channel_id: mention.channel.to_string(),
                    user_id: mention.user.map(|u| u.to_string()).unwrap_or_default(),
                    thread_ts: mention.ts.to_string(),
                    text: mention.text,
                })
                .ok();
            }
            _ => {}
        }
    }
}

fn dispatch_interaction_event(event: SlackInteractionEvent, tx: &mpsc::UnboundedSender<InboundEvent>) {
    match event {
        SlackInteractionEvent::BlockActions(action_event) => {
            let channel_id = action_event
                .channel
                .as_ref()
                .map(|c| c.id.to_string())
                .unwrap_or_default();
            let message_ts = action_event
                .message
                .as_ref()
                .map(|m| m.origin.ts.to_string())
                .unwrap_or_default();
            let user_id = action_event.user.id.to_string();
            let trigger_id = action_event.trigger_id.to_string();
            for action in action_event.actions.unwrap_or_default() {
                let action_id = action.action_id.to_string();
                let value = action.value.unwrap_or_default();
                tx.send(InboundEvent::BlockAction {
                    action_id,
                    value,
                    channel_id: channel_id.clone(),
                    message_ts: message_ts.clone(),
                    user_id: user_id.clone(),
                    trigger_id: trigger_id.clone(),
                })
                .ok();
            }
        }
        SlackInteractionEvent::ViewSubmission(submission) => {
            if let Some((callback_id, user_id, values)) = decode_view_submission(&submission) {
                tx.send(InboundEvent::ViewSubmission {
                    callback_id,
                    user_id,
                    values,
                })
                .ok();
            } else {
                tracing::warn!("view submission payload missing callback_id or user id");
            }
        }
        _ => {}
    }
}

/// A submitted modal's answers sit in a per-block, per-action-id state map
/// whose exact shape varies by element type (`value` for text inputs,
/// `selected_option.value` for selects). Walked as JSON rather than matched
/// field-by-field against the element-specific state types.
fn decode_view_submission(
    submission: &(impl serde::Serialize + ?Sized),
) -> Option<(String, String, std::collections::HashMap<String, String>)> {
    let json = serde_json::to_value(submission).ok()?;
    let callback_id = json.pointer("/view/callback_id")?.as_str()?.to_string();
    let user_id = json.pointer("/user/id")?.as_str()?.to_string();

    let mut values = std::collections::HashMap::new();
    if let Some(blocks) = json.pointer("/view/state/values").and_then(|v| v.as_object()) {
        for block in blocks.values() {
            let Some(block) = block.as_object() else { continue };
            for (action_id, state) in block {
                let value = state
                    .get("value")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .or_else(|| {
                        state
                            .pointer("/selected_option/value")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string())
                    });
                if let Some(value) = value {
                    values.insert(action_id.clone(), value);
                }
            }
        }
    }
    Some((callback_id, user_id, values))
}

impl ChatTransport for SlackAdapter {
    async fn post(&self, channel_id: &str, message: ChatMessage) -> Result<PostedMessage> {
        let session = self.session();
        let text = message.text.clone();
        let mut content = SlackMessageContent::new().with_text(message.text);
        if !message.buttons.is_empty() {
            content = content.with_blocks(vec![render_buttons(&message.buttons)]);
        }
        let mut request = SlackApiChatPostMessageRequest::new(channel_id.into(), content);
        if let Some(thread_ts) = message.thread_ts {
            request = request.with_thread_ts(thread_ts.into());
        }
        let response = session
            .chat_post_message(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(PostedMessage {
            channel_id: response.channel.to_string(),
            timestamp: response.ts.to_string(),
            text,
        })
    }

    async fn edit(&self, channel_id: &str, ts: &str, message: ChatMessage) -> Result<()> {
        let session = self.session();
        let mut content = SlackMessageContent::new().with_text(message.text);
        if !message.buttons.is_empty() {
            content = content.with_blocks(vec![render_buttons(&message.buttons)]);
        }
        let request = SlackApiChatUpdateRequest::new(channel_id.into(), content, ts.into());
        session
            .chat_update(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, channel_id: &str, ts: &str) -> Result<()> {
        let session = self.session();
        let request = SlackApiChatDeleteRequest::new(channel_id.into(), ts.into());
        session
            .chat_delete(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn post_ephemeral(&self, channel_id: &str, user_id: &str, text: &str) -> Result<()> {
        let session = self.session();
        let content = SlackMessageContent::new().with_text(text.to_string());
        let request =
            SlackApiChatPostEphemeralRequest::new(channel_id.into(), user_id.into(), content);
        session
            .chat_post_ephemeral(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn add_pin(&self, channel_id: &str, ts: &str) -> Result<()> {
        let session = self.session();
        let request = SlackApiPinsAddRequest::new(channel_id.into()).with_timestamp(ts.into());
        session
            .pins_add(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn remove_pin(&self, channel_id: &str, ts: &str) -> Result<()> {
        let session = self.session();
        let request = SlackApiPinsRemoveRequest::new(channel_id.into()).with_timestamp(ts.into());
        // Best-effort: "no pin" is not treated as a failure by the caller.
        session.pins_remove(&request).await.ok();
        Ok(())
    }

    async fn list_pins(&self, channel_id: &str) -> Result<Vec<PostedMessage>> {
        let session = self.session();
        let request = SlackApiPinsListRequest::new(channel_id.into());
        let response = session
            .pins_list(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                item.message.map(|m| PostedMessage {
                    channel_id: channel_id.to_string(),
                    timestamp: m.origin.ts.to_string(),
                    text: m.content.and_then(|c| c.text).unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn open_modal(&self, trigger_id: &str, bead_id: &str) -> Result<()> {
        let session = self.session();
        let artifact_select = SlackBlockStaticSelectElement::new("artifact_type".into()).with_options(
            crate::chatbot::actions::ARTIFACT_TYPES
                .iter()
                .map(|t| SlackBlockChoiceItem::new(pt(t), t.to_string()))
                .collect(),
        );
        let blocks = vec![
            SlackBlock::Input(
                SlackInputBlock::new(
                    pt("Rationale"),
                    SlackInputBlockElement::PlainTextInput(
                        SlackBlockPlainTextInputElement::new("rationale".into()).with_multiline(true),
                    ),
                )
                .with_optional(true),
            ),
            SlackBlock::Input(
                SlackInputBlock::new(pt("Required artifact"), SlackInputBlockElement::StaticSelect(artifact_select))
                    .with_optional(true),
            ),
        ];
        let view = SlackView::Modal(
            SlackModalView::new(pt("Resolve decision"), blocks)
                .with_callback_id(bead_id.into())
                .with_submit(pt("Submit")),
        );
        let request = SlackApiViewsOpenRequest::new(trigger_id.into(), view);
        session
            .views_open(&request)
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn render_buttons(buttons: &[(String, String, String)]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|(label, action_id, value)| {
            SlackActionBlockElement::Button(
                SlackBlockButtonElement::new(action_id.clone().into(), pt(label))
                    .with_value(value.clone()),
            )
        })
        .collect();
    SlackBlock::Actions(SlackActionsBlock::new(elements))
}

fn pt(text: &str) -> SlackBlockPlainTextOnly {
    SlackBlockPlainTextOnly::new(text.to_string())
}
