//! The chat-platform operations ChatBot needs, abstracted behind a trait so
//! the rest of the bridge never touches `slack-morphism` types directly.
//! Paired static/dynamic traits, same shape as [`crate::daemon_client`].

use crate::error::Result;
use std::future::Future;
use std::pin::Pin;

/// A posted or edited chat message's identity.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub channel_id: String,
    pub timestamp: String,
    /// The message's text, if known. Populated by `post`/`edit` from what was
    /// just sent, and by `list_pins` from the platform's own record — used to
    /// scan pinned messages for a recovery marker without a dedicated lookup.
    pub text: String,
}

/// A minimal, platform-agnostic view of a message to post or edit. Button
/// actions are encoded as `(label, action_id, value)` triples; the transport
/// is responsible for rendering them as Block-Kit (or an equivalent) on the
/// wire.
#[derive(Debug, Clone, Default)]
pub struct ChatMessage {
    pub text: String,
    pub buttons: Vec<(String, String, String)>,
    pub thread_ts: Option<String>,
}

pub trait ChatTransport: Send + Sync + 'static {
    fn post(&self, channel_id: &str, message: ChatMessage) -> impl Future<Output = Result<PostedMessage>> + Send;
    fn edit(&self, channel_id: &str, ts: &str, message: ChatMessage) -> impl Future<Output = Result<()>> + Send;
    fn delete(&self, channel_id: &str, ts: &str) -> impl Future<Output = Result<()>> + Send;
    fn post_ephemeral(
        &self,
        channel_id: &str,
        user_id: &str,
        text: &str,
    ) -> impl Future<Output = Result<()>> + Send;
    fn add_pin(&self, channel_id: &str, ts: &str) -> impl Future<Output = Result<()>> + Send;
    fn remove_pin(&self, channel_id: &str, ts: &str) -> impl Future<Output = Result<()>> + Send;
    fn list_pins(&self, channel_id: &str) -> impl Future<Output = Result<Vec<PostedMessage>>> + Send;
    /// Opens the "Other" decision modal against the trigger captured from the
    /// button click that requested it.
    fn open_modal(&self, trigger_id: &str, bead_id: &str) -> impl Future<Output = Result<()>> + Send;
}

pub trait ChatTransportDyn: Send + Sync + 'static {
    fn post<'a>(
        &'a self,
        channel_id: &'a str,
        message: ChatMessage,
    ) -> Pin<Box<dyn Future<Output = Result<PostedMessage>> + Send + 'a>>;
    fn edit<'a>(
        &'a self,
        channel_id: &'a str,
        ts: &'a str,
        message: ChatMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn delete<'a>(&'a self, channel_id: &'a str, ts: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn post_ephemeral<'a>(
        &'a self,
        channel_id: &'a str,
        user_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn add_pin<'a>(&'a self, channel_id: &'a str, ts: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn remove_pin<'a>(&'a self, channel_id: &'a str, ts: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn list_pins<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PostedMessage>>> + Send + 'a>>;
    fn open_modal<'a>(
        &'a self,
        trigger_id: &'a str,
        bead_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl<T: ChatTransport> ChatTransportDyn for T {
    fn post<'a>(
        &'a self,
        channel_id: &'a str,
        message: ChatMessage,
    ) -> Pin<Box<dyn Future<Output = Result<PostedMessage>> + Send + 'a>> {
        Box::pin(ChatTransport::post(self, channel_id, message))
    }
    fn edit<'a>(
        &'a self,
        channel_id: &'a str,
        ts: &'a str,
        message: ChatMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::edit(self, channel_id, ts, message))
    }
    fn delete<'a>(&'a self, channel_id: &'a str, ts: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::delete(self, channel_id, ts))
    }
    fn post_ephemeral<'a>(
        &'a self,
        channel_id: &'a str,
        user_id: &'a str,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::post_ephemeral(self, channel_id, user_id, text))
    }
    fn add_pin<'a>(&'a self, channel_id: &'a str, ts: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::add_pin(self, channel_id, ts))
    }
    fn remove_pin<'a>(&'a self, channel_id: &'a str, ts: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::remove_pin(self, channel_id, ts))
    }
    fn list_pins<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PostedMessage>>> + Send + 'a>> {
        Box::pin(ChatTransport::list_pins(self, channel_id))
    }
    fn open_modal<'a>(
        &'a self,
        trigger_id: &'a str,
        bead_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(ChatTransport::open_modal(self, trigger_id, bead_id))
    }
}
