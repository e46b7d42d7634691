//! Owns the chat transport and implements every watcher's Notifier interface.
//!
//! ChatBot is polymorphic over the union of the four Notifier capability
//! traits rather than one monolithic interface, the way the messaging layer
//! pairs a static trait with a dynamic one — see [`crate::notifier`]. Its hot
//! caches mirror what's durable in [`crate::state_store::StateStore`] so a
//! lookup never needs a lock held across a network call.

pub mod actions;
pub mod slack_adapter;
pub mod transport;

use crate::bead::BeadEvent;
use crate::chatbot::slack_adapter::InboundEvent;
use crate::chatbot::transport::{ChatMessage, ChatTransportDyn, PostedMessage};
use crate::daemon_client::{BeadClientDyn, CreateBeadRequest};
use crate::error::Result;
use crate::notifier::{ActivityNotifier, AgentNotifier, ChatNotifier, DecisionNotifier};
use crate::nudger::Nudger;
use crate::router::Router;
use crate::state_store::{Collection, MessageRef, StateStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// The marker string stamped into the dashboard message so it can be found
/// again by scanning pins after a restart that lost its StateStore entry.
pub const DASHBOARD_MARKER: &str = "<!-- beadbridge-dashboard -->";

/// Parses a decision bead's `options` field (a JSON array of strings) the
/// same way for button rendering and for resolving which option a click
/// picked.
pub fn decision_options(bead: &BeadEvent) -> Vec<String> {
    bead.field("options")
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default()
}

#[derive(Default)]
struct Caches {
    decision_messages: HashMap<String, MessageRef>,
    chat_messages: HashMap<String, MessageRef>,
    agent_cards: HashMap<String, MessageRef>,
    pending_count: HashMap<String, u32>,
    /// Agent -> most recent decision id threaded under that agent's card,
    /// used as a fallback predecessor when a bead's own `predecessor_id` is
    /// unset but the agent already has an open decision.
    message_by_agent: HashMap<String, String>,
}

pub struct ChatBot {
    transport: Arc<dyn ChatTransportDyn>,
    router: Arc<Router>,
    state_store: Arc<StateStore>,
    daemon: Arc<dyn BeadClientDyn>,
    nudger: Arc<Nudger>,
    cancellation: CancellationToken,
    caches: Mutex<Caches>,
}

impl ChatBot {
    pub fn new(
        transport: Arc<dyn ChatTransportDyn>,
        router: Arc<Router>,
        state_store: Arc<StateStore>,
        daemon: Arc<dyn BeadClientDyn>,
        nudger: Arc<Nudger>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            transport,
            router,
            state_store,
            daemon,
            nudger,
            cancellation,
            caches: Mutex::new(Caches::default()),
        }
    }

    /// Seeds the hot caches from StateStore and recomputes pending counts.
    /// Must complete before any Notifier method is called.
    pub async fn hydrate(&self) {
        let decision_messages = self.state_store.all(Collection::Decision).await;
        let chat_messages = self.state_store.all(Collection::Chat).await;
        let agent_cards = self.state_store.all(Collection::AgentCard).await;

        let mut pending_count: HashMap<String, u32> = HashMap::new();
        let mut message_by_agent: HashMap<String, String> = HashMap::new();
        for (id, reference) in &decision_messages {
            *pending_count.entry(reference.agent.clone()).or_insert(0) += 1;
            message_by_agent.insert(reference.agent.clone(), id.clone());
        }

        let mut caches = self.caches.lock().unwrap();
        caches.decision_messages = decision_messages;
        caches.chat_messages = chat_messages;
        caches.agent_cards = agent_cards;
        caches.pending_count = pending_count;
        caches.message_by_agent = message_by_agent;
    }

    fn card_for(&self, agent: &str) -> Option<MessageRef> {
        self.caches.lock().unwrap().agent_cards.get(agent).cloned()
    }

    fn decision_ref(&self, id: &str) -> Option<MessageRef> {
        self.caches
            .lock()
            .unwrap()
            .decision_messages
            .get(id)
            .cloned()
    }

    fn increment_pending(&self, agent: &str) {
        *self
            .caches
            .lock()
            .unwrap()
            .pending_count
            .entry(agent.to_string())
            .or_insert(0) += 1;
    }

    fn decrement_pending(&self, agent: &str) {
        let mut caches = self.caches.lock().unwrap();
        if let Some(count) = caches.pending_count.get_mut(agent) {
            *count = count.saturating_sub(1);
        }
    }

    /// Opens the "Other" decision modal for the button click that requested
    /// it.
    pub async fn open_other_modal(&self, trigger_id: &str, bead_id: &str) -> Result<()> {
        self.transport.open_modal(trigger_id, bead_id).await
    }

    fn decision_buttons(bead: &BeadEvent) -> Vec<(String, String, String)> {
        let options = decision_options(bead);
        let mut buttons: Vec<(String, String, String)> = options
            .iter()
            .enumerate()
            .map(|(index, option)| {
                (
                    option.clone(),
                    format!("resolve_{}_{}", bead.id, index),
                    format!("{}:{}", bead.id, index),
                )
            })
            .collect();
        buttons.push((
            "Other".to_string(),
            format!("resolve_other_{}", bead.id),
            bead.id.clone(),
        ));
        buttons.push((
            "Dismiss".to_string(),
            "dismiss_decision".to_string(),
            bead.id.clone(),
        ));
        buttons
    }
}

impl DecisionNotifier for ChatBot {
    async fn notify_decision(&self, bead: &BeadEvent) -> Result<()> {
        let (channel_id, _matched_by) = self.router.resolve(&bead.assignee)?;

        let card = self.card_for(&bead.assignee).filter(|c| c.channel_id == channel_id);
        let predecessor = bead
            .predecessor_id()
            .map(str::to_string)
            .or_else(|| {
                self.caches
                    .lock()
                    .unwrap()
                    .message_by_agent
                    .get(&bead.assignee)
                    .cloned()
            })
            .and_then(|id| self.decision_ref(&id))
            .filter(|r| r.channel_id == channel_id);

        let thread_ts = card
            .as_ref()
            .map(|c| c.timestamp.clone())
            .or_else(|| predecessor.as_ref().map(|p| p.timestamp.clone()));

        let text = bead
            .field("decision_question")
            .unwrap_or(&bead.title)
            .to_string();
        let message = ChatMessage {
            text,
            buttons: Self::decision_buttons(bead),
            thread_ts,
        };

        let posted: PostedMessage = self.transport.post(&channel_id, message).await?;

        let reference = MessageRef {
            channel_id: channel_id.clone(),
            timestamp: posted.timestamp.clone(),
            agent: bead.assignee.clone(),
        };
        {
            let mut caches = self.caches.lock().unwrap();
            caches
                .decision_messages
                .insert(bead.id.clone(), reference.clone());
            caches
                .message_by_agent
                .insert(bead.assignee.clone(), bead.id.clone());
        }
        self.increment_pending(&bead.assignee);
        self.state_store
            .set(Collection::Decision, bead.id.clone(), reference)
            .await?;

        if card.is_none() {
            if let Some(predecessor) = predecessor {
                let edit = ChatMessage {
                    text: format!("Superseded: see <{}>", bead.id),
                    buttons: Vec::new(),
                    thread_ts: None,
                };
                if let Err(e) = self
                    .transport
                    .edit(&predecessor.channel_id, &predecessor.timestamp, edit)
                    .await
                {
                    tracing::warn!(bead_id = %bead.id, error = %e, "failed to mark predecessor decision superseded");
                }
            }
        }

        Ok(())
    }

    async fn update_decision(&self, id: &str, chosen: &str) -> Result<()> {
        let Some(reference) = self.decision_ref(id) else {
            return Ok(());
        };
        let edit = ChatMessage {
            text: format!("\u{2705} Resolved: {chosen}"),
            buttons: Vec::new(),
            thread_ts: None,
        };
        self.transport
            .edit(&reference.channel_id, &reference.timestamp, edit)
            .await?;
        self.decrement_pending(&reference.agent);
        self.caches.lock().unwrap().decision_messages.remove(id);
        self.state_store.remove(Collection::Decision, id).await?;
        Ok(())
    }

    async fn dismiss_decision(&self, id: &str) -> Result<()> {
        let Some(reference) = self.decision_ref(id) else {
            return Ok(());
        };
        self.transport
            .delete(&reference.channel_id, &reference.timestamp)
            .await?;
        self.decrement_pending(&reference.agent);
        self.caches.lock().unwrap().decision_messages.remove(id);
        self.state_store.remove(Collection::Decision, id).await?;

        if let Some(card) = self.card_for(&reference.agent) {
            let pending = self
                .caches
                .lock()
                .unwrap()
                .pending_count
                .get(&reference.agent)
                .copied()
                .unwrap_or(0);
            let edit = ChatMessage {
                text: format!("{}: {pending} pending decision(s)", reference.agent),
                buttons: Vec::new(),
                thread_ts: None,
            };
            if let Err(e) = self.transport.edit(&card.channel_id, &card.timestamp, edit).await {
                tracing::warn!(agent = %reference.agent, error = %e, "failed to update agent card after dismiss");
            }
        }
        Ok(())
    }

    async fn notify_escalation(&self, bead: &BeadEvent) -> Result<()> {
        let (channel_id, _matched_by) = self.router.resolve(&bead.assignee)?;
        let thread_ts = self
            .card_for(&bead.assignee)
            .filter(|c| c.channel_id == channel_id)
            .map(|c| c.timestamp);
        let message = ChatMessage {
            text: format!(":rotating_light: Escalated: {}", bead.title),
            buttons: Vec::new(),
            thread_ts,
        };
        self.transport.post(&channel_id, message).await?;
        Ok(())
    }

    async fn post_report(&self, decision_id: &str, report_type: &str, content: &str) -> Result<()> {
        let Some(reference) = self.decision_ref(decision_id) else {
            tracing::warn!(decision_id, "post_report: no decision message on record, dropping");
            return Ok(());
        };
        let reply = ChatMessage {
            text: format!("Report ({report_type}):\n{content}"),
            buttons: Vec::new(),
            thread_ts: Some(reference.timestamp.clone()),
        };
        self.transport.post(&reference.channel_id, reply).await?;

        let preview: String = content.chars().take(280).collect();
        let edit = ChatMessage {
            text: format!("{} — latest report: {}", report_type, preview),
            buttons: Vec::new(),
            thread_ts: None,
        };
        if let Err(e) = self
            .transport
            .edit(&reference.channel_id, &reference.timestamp, edit)
            .await
        {
            tracing::warn!(decision_id, error = %e, "failed to inline report preview");
        }
        Ok(())
    }
}

impl AgentNotifier for ChatBot {
    async fn notify_agent_crash(&self, bead: &BeadEvent) -> Result<()> {
        let (channel_id, _matched_by) = self.router.resolve(&bead.assignee)?;
        let thread_ts = self
            .card_for(&bead.assignee)
            .filter(|c| c.channel_id == channel_id)
            .map(|c| c.timestamp);
        let message = ChatMessage {
            text: format!(":boom: Agent crashed: {}", bead.assignee),
            buttons: Vec::new(),
            thread_ts,
        };
        self.transport.post(&channel_id, message).await?;
        Ok(())
    }

    async fn notify_agent_spawn(&self, bead: &BeadEvent) {
        let channel_id = match self.router.resolve(&bead.assignee) {
            Ok((channel_id, _)) => channel_id,
            Err(e) => {
                tracing::warn!(agent = %bead.assignee, error = %e, "notify_agent_spawn: router resolution failed");
                return;
            }
        };
        let message = ChatMessage {
            text: format!(":seedling: Agent spawned: {}", bead.assignee),
            buttons: Vec::new(),
            thread_ts: None,
        };
        match self.transport.post(&channel_id, message).await {
            Ok(posted) => {
                let reference = MessageRef {
                    channel_id,
                    timestamp: posted.timestamp,
                    agent: bead.assignee.clone(),
                };
                self.caches
                    .lock()
                    .unwrap()
                    .agent_cards
                    .insert(bead.assignee.clone(), reference.clone());
                if let Err(e) = self
                    .state_store
                    .set(Collection::AgentCard, bead.assignee.clone(), reference)
                    .await
                {
                    tracing::warn!(agent = %bead.assignee, error = %e, "failed to persist agent card");
                }
            }
            Err(e) => {
                tracing::warn!(agent = %bead.assignee, error = %e, "notify_agent_spawn failed");
            }
        }
    }

    async fn notify_agent_state(&self, bead: &BeadEvent, state: &str) {
        let Some(reference) = self.card_for(&bead.assignee) else {
            return;
        };
        let edit = ChatMessage {
            text: format!("{}: {}", bead.assignee, state),
            buttons: Vec::new(),
            thread_ts: None,
        };
        if let Err(e) = self
            .transport
            .edit(&reference.channel_id, &reference.timestamp, edit)
            .await
        {
            tracing::warn!(agent = %bead.assignee, error = %e, "notify_agent_state failed");
        }
    }
}

impl ChatNotifier for ChatBot {
    async fn post_chat_reply(&self, channel_id: &str, thread_ts: &str, text: &str) -> Result<()> {
        let message = ChatMessage {
            text: text.to_string(),
            buttons: Vec::new(),
            thread_ts: Some(thread_ts.to_string()),
        };
        self.transport.post(channel_id, message).await?;
        Ok(())
    }
}

impl ActivityNotifier for ChatBot {
    async fn notify_activity(&self, bead: &BeadEvent, action: &str) {
        if bead.assignee.is_empty() {
            return;
        }
        let channel_id = match self.router.resolve(&bead.assignee) {
            Ok((channel_id, _)) => channel_id,
            Err(_) => return,
        };
        let thread_ts = self
            .card_for(&bead.assignee)
            .filter(|c| c.channel_id == channel_id)
            .map(|c| c.timestamp);
        let message = ChatMessage {
            text: format!("{} {} {}", bead.kind_label(), action, bead.title),
            buttons: Vec::new(),
            thread_ts,
        };
        if let Err(e) = self.transport.post(&channel_id, message).await {
            tracing::debug!(bead_id = %bead.id, error = %e, "notify_activity post failed");
        }
    }
}

impl ChatBot {
    /// Dispatches one event off the transport's inbound queue. Slash commands
    /// return their ephemeral reply text to the caller, which posts it; every
    /// other variant is handled here directly.
    pub async fn handle_inbound(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message {
                channel_id,
                ts,
                thread_ts,
                text,
                ..
            } => self.handle_message(&channel_id, &ts, thread_ts.as_deref(), &text).await,
            InboundEvent::AppMention {
                channel_id,
                thread_ts,
                text,
                ..
            } => self.handle_mention(&channel_id, &thread_ts, &text).await,
            InboundEvent::Command {
                command,
                channel_id,
                user_id,
                text,
            } => self.handle_command(&command, &channel_id, &user_id, &text).await,
            InboundEvent::BlockAction { .. } | InboundEvent::ViewSubmission { .. } => {
                // Interactive payloads are routed through
                // `chatbot::actions::ActionRouter`, not here.
            }
        }
    }

    async fn handle_message(&self, channel_id: &str, ts: &str, thread_ts: Option<&str>, text: &str) {
        if let Some(thread_ts) = thread_ts {
            if self.resolve_decision_by_thread(channel_id, thread_ts, text).await {
                return;
            }
        }

        let Some(agent) = self.router.get_agent_by_channel(channel_id) else {
            return;
        };
        let title: String = text.chars().take(80).collect();
        let request = CreateBeadRequest {
            kind: "task".to_string(),
            title,
            assignee: Some(agent.clone()),
            priority: Some(2),
            labels: vec!["slack-chat".to_string()],
            description: Some(format!("[slack:{channel_id}:{ts}]\n{text}")),
        };
        match self.daemon.create_bead(request).await {
            Ok(created) => {
                let reference = MessageRef {
                    channel_id: channel_id.to_string(),
                    timestamp: ts.to_string(),
                    agent,
                };
                self.caches
                    .lock()
                    .unwrap()
                    .chat_messages
                    .insert(created.id.clone(), reference.clone());
                if let Err(e) = self
                    .state_store
                    .set(Collection::Chat, created.id, reference)
                    .await
                {
                    tracing::warn!(error = %e, "failed to persist chat-message reference");
                }
            }
            Err(e) => tracing::warn!(channel_id, error = %e, "failed to create chat-tracking bead"),
        }
    }

    async fn handle_mention(&self, channel_id: &str, thread_ts: &str, text: &str) {
        let Some(agent) = self.router.get_agent_by_channel(channel_id) else {
            return;
        };
        let title: String = text.chars().take(80).collect();
        let request = CreateBeadRequest {
            kind: "task".to_string(),
            title,
            assignee: Some(agent.clone()),
            priority: Some(2),
            labels: vec!["slack-mention".to_string()],
            description: Some(format!("[slack:{channel_id}:{thread_ts}]\n{text}")),
        };
        if let Err(e) = self.daemon.create_bead(request).await {
            tracing::warn!(channel_id, error = %e, "failed to create mention-tracking bead");
        }
        if let Err(e) = self.nudger.nudge(&agent, text, &self.cancellation).await {
            tracing::warn!(agent, error = %e, "mention nudge failed");
        }
    }

    /// If `thread_ts` is the root of a still-open decision message, resolves
    /// it with `text` as the rationale and returns true.
    async fn resolve_decision_by_thread(&self, channel_id: &str, thread_ts: &str, text: &str) -> bool {
        let Some(id) = self.decision_id_for_thread(channel_id, thread_ts) else {
            return false;
        };
        let fields = serde_json::json!({ "chosen": text, "rationale": text });
        match self.daemon.close_bead(&id, fields).await {
            Ok(()) => {
                if let Err(e) = self.update_decision(&id, text).await {
                    tracing::warn!(bead_id = %id, error = %e, "update_decision after thread-reply resolve failed");
                }
                true
            }
            Err(e) => {
                tracing::warn!(bead_id = %id, error = %e, "failed to resolve decision from thread reply");
                true
            }
        }
    }

    fn decision_id_for_thread(&self, channel_id: &str, thread_ts: &str) -> Option<String> {
        self.caches
            .lock()
            .unwrap()
            .decision_messages
            .iter()
            .find(|(_, r)| r.channel_id == channel_id && r.timestamp == thread_ts)
            .map(|(id, _)| id.clone())
    }

    /// `/decisions`: a paginated ephemeral summary of open decisions.
    pub async fn render_decisions_summary(&self) -> String {
        match self.daemon.list_decision_beads().await {
            Ok(beads) if beads.is_empty() => "No open decisions.".to_string(),
            Ok(beads) => {
                let lines: Vec<String> = beads
                    .iter()
                    .take(20)
                    .map(|b| format!("• `{}` {} ({})", b.id, b.title, b.assignee))
                    .collect();
                lines.join("\n")
            }
            Err(e) => format!("Failed to list decisions: {e}"),
        }
    }

    /// `/roster`: the live agent fleet.
    pub async fn render_roster(&self) -> String {
        match self.daemon.list_agent_beads().await {
            Ok(beads) if beads.is_empty() => "No agents on record.".to_string(),
            Ok(beads) => beads
                .iter()
                .map(|b| format!("• {} — {}", b.assignee, b.agent_state().unwrap_or("unknown")))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("Failed to list agents: {e}"),
        }
    }

    /// Dispatches a slash command and posts its ephemeral reply. `/unreleased`
    /// has no VCS client wired up in this build, so it reports that plainly
    /// rather than fabricating data.
    pub async fn handle_command(&self, command: &str, channel_id: &str, user_id: &str, _text: &str) {
        let reply = match command {
            "/decisions" => self.render_decisions_summary().await,
            "/roster" => self.render_roster().await,
            "/unreleased" => "Unreleased-commit reporting is not configured.".to_string(),
            other => format!("Unknown command: {other}"),
        };
        if let Err(e) = self.transport.post_ephemeral(channel_id, user_id, &reply).await {
            tracing::warn!(command, error = %e, "failed to post slash command reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bead::{BeadStatus, BeadType};
    use crate::chatbot::transport::ChatTransport;
    use crate::router::Router;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeTransport {
        counter: AtomicU64,
        posts: Mutex<Vec<(String, String)>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                counter: AtomicU64::new(0),
                posts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatTransport for FakeTransport {
        async fn post(&self, channel_id: &str, message: ChatMessage) -> Result<PostedMessage> {
            let ts = self.counter.fetch_add(1, Ordering::SeqCst);
            self.posts
                .lock()
                .unwrap()
                .push((channel_id.to_string(), message.text.clone()));
            Ok(PostedMessage {
                channel_id: channel_id.to_string(),
                timestamp: ts.to_string(),
                text: message.text,
            })
        }
        async fn edit(&self, _channel_id: &str, _ts: &str, _message: ChatMessage) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _channel_id: &str, _ts: &str) -> Result<()> {
            Ok(())
        }
        async fn post_ephemeral(&self, _channel_id: &str, _user_id: &str, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn add_pin(&self, _channel_id: &str, _ts: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_pin(&self, _channel_id: &str, _ts: &str) -> Result<()> {
            Ok(())
        }
        async fn list_pins(&self, _channel_id: &str) -> Result<Vec<PostedMessage>> {
            Ok(Vec::new())
        }
        async fn open_modal(&self, _trigger_id: &str, _bead_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn decision_bead(id: &str, assignee: &str) -> BeadEvent {
        BeadEvent {
            id: id.into(),
            kind: BeadType::Decision,
            title: "Deploy?".into(),
            status: BeadStatus::Open,
            assignee: assignee.into(),
            created_by: String::new(),
            labels: Default::default(),
            priority: 2,
            fields: Default::default(),
        }
    }

    async fn bot() -> (ChatBot, Arc<FakeTransport>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state_store = Arc::new(StateStore::load(dir.path().join("state.json")).await.unwrap());
        let router = Arc::new(Router::with_tables("C-DEFAULT", vec![], vec![]));
        let transport = Arc::new(FakeTransport::new());
        let daemon: Arc<dyn BeadClientDyn> = Arc::new(crate::daemon_client::HttpBeadClient::new("http://unused"));
        let nudger = Arc::new(Nudger::new(daemon.clone()));
        let bot = ChatBot::new(
            transport.clone(),
            router,
            state_store,
            daemon,
            nudger,
            CancellationToken::new(),
        );
        (bot, transport, dir)
    }

    #[tokio::test]
    async fn notify_decision_records_reference_and_pending_count() {
        let (bot, _transport, _dir) = bot().await;
        let bead = decision_bead("dec-1", "gasboat/crew/ops");
        bot.notify_decision(&bead).await.unwrap();
        assert_eq!(
            bot.decision_ref("dec-1").map(|r| r.agent),
            Some("gasboat/crew/ops".to_string())
        );
        assert_eq!(bot.caches.lock().unwrap().pending_count["gasboat/crew/ops"], 1);
    }

    #[tokio::test]
    async fn update_decision_is_idempotent_when_absent() {
        let (bot, _transport, _dir) = bot().await;
        bot.update_decision("missing", "yes").await.unwrap();
    }

    #[tokio::test]
    async fn update_decision_removes_reference_and_decrements_pending() {
        let (bot, _transport, _dir) = bot().await;
        let bead = decision_bead("dec-2", "gasboat/crew/ops");
        bot.notify_decision(&bead).await.unwrap();
        bot.update_decision("dec-2", "yes").await.unwrap();
        assert!(bot.decision_ref("dec-2").is_none());
        assert_eq!(bot.caches.lock().unwrap().pending_count["gasboat/crew/ops"], 0);
    }
}
