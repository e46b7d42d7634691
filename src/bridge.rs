//! Top-level supervisor: builds every component in dependency order and
//! spawns them onto one shared cancellation token, the same way the
//! reference architecture's daemon entry point wires its subsystems
//! together before blocking on shutdown.

use crate::api::decisions as api_decisions;
use crate::api::server::start_http_server;
use crate::api::state::ApiState;
use crate::bead::BeadEnvelope;
use crate::chatbot::actions::{ActionRouter, Interaction, Outcome};
use crate::chatbot::slack_adapter::{InboundEvent, SlackAdapter};
use crate::chatbot::ChatBot;
use crate::config::{BridgeConfig, ChatPermissions};
use crate::daemon_client::{BeadClientDyn, HttpBeadClient};
use crate::dashboard::Dashboard;
use crate::dedup::Dedup;
use crate::nudger::Nudger;
use crate::router::Router;
use crate::sse::SseStream;
use crate::state_store::StateStore;
use crate::watchers::agents::AgentsWatcher;
use crate::watchers::bead_activity::BeadActivityWatcher;
use crate::watchers::chat::ChatWatcher;
use crate::watchers::decisions::DecisionsWatcher;
use crate::watchers::mail::MailWatcher;

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SSE_TOPICS: &[&str] = &["beads.bead.created", "beads.bead.updated", "beads.bead.closed"];

/// Runs the bridge until `cancellation` fires, then waits for every spawned
/// task to wind down.
pub async fn run(config: BridgeConfig, cancellation: CancellationToken) -> crate::error::Result<()> {
    let state_store = Arc::new(StateStore::load(config.state_path()).await?);
    let dedup = Arc::new(Dedup::new(Duration::from_secs(600)));
    let router = Arc::new(Router::with_tables(
        config.default_channel.clone(),
        config.router.rules(),
        config.router.overrides.clone(),
    ));

    let daemon: Arc<dyn BeadClientDyn> = Arc::new(HttpBeadClient::new(config.daemon_http_addr.clone()));
    let nudger = Arc::new(Nudger::new(daemon.clone()));

    let permissions = Arc::new(ArcSwap::from_pointee(ChatPermissions::default()));
    let (slack, inbound_rx) = SlackAdapter::new(config.chat_bot_token.clone(), permissions);
    let slack = Arc::new(slack);
    let transport = slack.clone();

    let chatbot = Arc::new(ChatBot::new(
        transport.clone(),
        router.clone(),
        state_store.clone(),
        daemon.clone(),
        nudger.clone(),
        cancellation.clone(),
    ));
    chatbot.hydrate().await;

    let action_router = Arc::new(ActionRouter::new(
        daemon.clone(),
        chatbot.clone(),
        nudger.clone(),
        cancellation.clone(),
    ));

    let decisions_watcher = Arc::new(DecisionsWatcher::new(
        daemon.clone(),
        chatbot.clone(),
        nudger.clone(),
        cancellation.clone(),
    ));
    let agents_watcher = Arc::new(AgentsWatcher::new(chatbot.clone()));
    let bead_activity_watcher = Arc::new(BeadActivityWatcher::new(chatbot.clone()));
    let mail_watcher = Arc::new(MailWatcher::new(nudger.clone(), cancellation.clone()));
    let chat_watcher = Arc::new(ChatWatcher::new(
        daemon.clone(),
        chatbot.clone(),
        nudger.clone(),
        state_store.clone(),
        cancellation.clone(),
    ));

    let sse = Arc::new(
        SseStream::new(config.daemon_http_addr.clone(), SSE_TOPICS.iter().map(|s| s.to_string()).collect(), state_store.clone())
            .with_dedup(dedup),
    );

    let api_state = ApiState::new(daemon.clone(), config.vcs_repos.clone());

    let dashboard = config.dashboard_enabled.then(|| {
        Arc::new(Dashboard::new(
            transport.clone(),
            daemon.clone(),
            state_store.clone(),
            config
                .dashboard_channel
                .clone()
                .unwrap_or_else(|| config.default_channel.clone()),
            config.dashboard_interval,
        ))
    });

    for topic in SSE_TOPICS {
        let decisions_watcher = decisions_watcher.clone();
        let agents_watcher = agents_watcher.clone();
        let bead_activity_watcher = bead_activity_watcher.clone();
        let mail_watcher = mail_watcher.clone();
        let chat_watcher = chat_watcher.clone();
        let dashboard = dashboard.clone();
        let api_state = api_state.clone();
        let topic_owned = topic.to_string();
        sse.on(
            *topic,
            Arc::new(move |envelope: BeadEnvelope| {
                let decisions_watcher = decisions_watcher.clone();
                let agents_watcher = agents_watcher.clone();
                let bead_activity_watcher = bead_activity_watcher.clone();
                let mail_watcher = mail_watcher.clone();
                let chat_watcher = chat_watcher.clone();
                let dashboard = dashboard.clone();
                let api_state = api_state.clone();
                let topic = topic_owned.clone();
                Box::pin(async move {
                    let kind = match topic.as_str() {
                        "beads.bead.created" => "created",
                        "beads.bead.closed" => "closed",
                        _ => "updated",
                    };
                    api_decisions::publish(&api_state, kind, envelope.bead.clone());
                    if let Some(dashboard) = &dashboard {
                        dashboard.mark_dirty();
                    }
                    decisions_watcher.handle(&topic, envelope.clone()).await;
                    agents_watcher.handle(&topic, envelope.clone()).await;
                    bead_activity_watcher.handle(&topic, envelope.clone()).await;
                    mail_watcher.handle(&topic, envelope.clone()).await;
                    chat_watcher.handle(&topic, envelope).await;
                })
            }),
        );
    }

    let mut handles = Vec::new();

    {
        let sse = sse.clone();
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(async move { sse.start(cancellation).await }));
    }

    {
        let slack = slack.clone();
        let app_token = config.chat_app_token.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = slack.start(app_token).await {
                tracing::error!(error = %e, "slack socket-mode listener exited");
            }
        }));
    }

    handles.push(tokio::spawn(inbound_loop(inbound_rx, chatbot.clone(), action_router.clone())));

    if let Some(dashboard) = dashboard.clone() {
        dashboard.recover().await;
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(async move { dashboard.run(cancellation).await }));
    }

    {
        let bind: std::net::SocketAddr = config
            .bind_addr
            .parse()
            .map_err(|e| crate::error::ConfigError::Invalid(format!("invalid bind_addr: {e}")))?;
        let handle = start_http_server(bind, api_state, cancellation.clone())
            .await
            .map_err(crate::error::Error::Other)?;
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

/// Drains the transport's inbound queue, routing interactive payloads through
/// `ActionRouter` and everything else through `ChatBot::handle_inbound`.
async fn inbound_loop(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<InboundEvent>,
    chatbot: Arc<ChatBot>,
    action_router: Arc<ActionRouter>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            InboundEvent::BlockAction {
                action_id,
                value,
                user_id,
                trigger_id,
                ..
            } => {
                let interaction = Interaction::Button {
                    action_id,
                    value,
                    user_id,
                    trigger_id,
                };
                match action_router.handle(interaction).await {
                    Ok(Outcome::OpenOtherModal { bead_id, trigger_id }) => {
                        if let Err(e) = chatbot.open_other_modal(&trigger_id, &bead_id).await {
                            tracing::warn!(bead_id, error = %e, "failed to open \"other\" decision modal");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to handle interactive button");
                    }
                }
            }
            InboundEvent::ViewSubmission {
                callback_id,
                user_id,
                values,
            } => {
                let interaction = Interaction::OtherModalSubmit {
                    bead_id: callback_id,
                    rationale: values.get("rationale").cloned().unwrap_or_default(),
                    artifact_type: values.get("artifact_type").cloned().unwrap_or_else(|| "none".to_string()),
                    user_id,
                };
                if let Err(e) = action_router.handle(interaction).await {
                    tracing::warn!(error = %e, "failed to handle modal submission");
                }
            }
            other => chatbot.handle_inbound(other).await,
        }
    }
}
