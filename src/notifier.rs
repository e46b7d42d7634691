//! The Notifier capability traits that ChatBot implements.
//!
//! ChatBot is polymorphic over the union of these small capability sets
//! rather than one monolithic interface — mirrors the way the messaging layer
//! pairs a static trait (for generic construction) with a dynamic trait (for
//! `Arc<dyn ...>` storage) bridged by a blanket impl. Each watcher only
//! depends on the one or two capability traits it actually calls.
//!
//! The mixed error/no-error method signatures below are intentional, not an
//! oversight: `notify_agent_crash` can fail loudly (a crash notification that
//! silently drops is a real incident missed), while `notify_agent_spawn` and
//! `notify_agent_state` are routine enough that the agents watcher logs and
//! moves on regardless. Do not homogenize these.

use crate::bead::BeadEvent;
use crate::error::Result;
use std::future::Future;
use std::pin::Pin;

pub trait DecisionNotifier: Send + Sync + 'static {
    fn notify_decision(&self, bead: &BeadEvent) -> impl Future<Output = Result<()>> + Send;
    fn update_decision(&self, id: &str, chosen: &str) -> impl Future<Output = Result<()>> + Send;
    fn dismiss_decision(&self, id: &str) -> impl Future<Output = Result<()>> + Send;
    fn notify_escalation(&self, bead: &BeadEvent) -> impl Future<Output = Result<()>> + Send;
    fn post_report(
        &self,
        decision_id: &str,
        report_type: &str,
        content: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait DecisionNotifierDyn: Send + Sync + 'static {
    fn notify_decision<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn update_decision<'a>(&'a self, id: &'a str, chosen: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn dismiss_decision<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn notify_escalation<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn post_report<'a>(
        &'a self,
        decision_id: &'a str,
        report_type: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl<T: DecisionNotifier> DecisionNotifierDyn for T {
    fn notify_decision<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(DecisionNotifier::notify_decision(self, bead))
    }
    fn update_decision<'a>(&'a self, id: &'a str, chosen: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(DecisionNotifier::update_decision(self, id, chosen))
    }
    fn dismiss_decision<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(DecisionNotifier::dismiss_decision(self, id))
    }
    fn notify_escalation<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(DecisionNotifier::notify_escalation(self, bead))
    }
    fn post_report<'a>(
        &'a self,
        decision_id: &'a str,
        report_type: &'a str,
        content: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(DecisionNotifier::post_report(self, decision_id, report_type, content))
    }
}

/// Note the mixed signatures: crash notification can fail and the caller
/// needs to know; spawn/state notifications are best-effort.
pub trait AgentNotifier: Send + Sync + 'static {
    fn notify_agent_crash(&self, bead: &BeadEvent) -> impl Future<Output = Result<()>> + Send;
    fn notify_agent_spawn(&self, bead: &BeadEvent) -> impl Future<Output = ()> + Send;
    fn notify_agent_state(&self, bead: &BeadEvent, state: &str) -> impl Future<Output = ()> + Send;
}

pub trait AgentNotifierDyn: Send + Sync + 'static {
    fn notify_agent_crash<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn notify_agent_spawn<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
    fn notify_agent_state<'a>(&'a self, bead: &'a BeadEvent, state: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

impl<T: AgentNotifier> AgentNotifierDyn for T {
    fn notify_agent_crash<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(AgentNotifier::notify_agent_crash(self, bead))
    }
    fn notify_agent_spawn<'a>(&'a self, bead: &'a BeadEvent) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(AgentNotifier::notify_agent_spawn(self, bead))
    }
    fn notify_agent_state<'a>(&'a self, bead: &'a BeadEvent, state: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(AgentNotifier::notify_agent_state(self, bead, state))
    }
}

pub trait ChatNotifier: Send + Sync + 'static {
    fn post_chat_reply(
        &self,
        channel_id: &str,
        thread_ts: &str,
        text: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait ChatNotifierDyn: Send + Sync + 'static {
    fn post_chat_reply<'a>(
        &'a self,
        channel_id: &'a str,
        thread_ts: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl<T: ChatNotifier> ChatNotifierDyn for T {
    fn post_chat_reply<'a>(
        &'a self,
        channel_id: &'a str,
        thread_ts: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatNotifier::post_chat_reply(self, channel_id, thread_ts, text))
    }
}

/// Bead-activity is display-only: a failed post never needs to surface past a
/// log line, so there's no fallible variant at all.
pub trait ActivityNotifier: Send + Sync + 'static {
    fn notify_activity(&self, bead: &BeadEvent, action: &str) -> impl Future<Output = ()> + Send;
}

pub trait ActivityNotifierDyn: Send + Sync + 'static {
    fn notify_activity<'a>(&'a self, bead: &'a BeadEvent, action: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

impl<T: ActivityNotifier> ActivityNotifierDyn for T {
    fn notify_activity<'a>(&'a self, bead: &'a BeadEvent, action: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(ActivityNotifier::notify_activity(self, bead, action))
    }
}
