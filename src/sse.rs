//! Long-lived connection to the daemon's event stream: framed-event parsing,
//! resumable reconnection, fan-out to topic handlers, and an optional dedup
//! gate.
//!
//! Built on `reqwest`'s streaming body wrapped with the `eventsource-stream`
//! crate's `Eventsource` extension trait, the same way an SSE-speaking chat
//! completions client turns a byte stream into a sequence of named events.
//! The dedup gate, topic fan-out, and StateStore-backed resumption on top of
//! that are specific to this bridge.

use crate::bead::BeadEnvelope;
use crate::dedup::Dedup;
use crate::error::{Result, SseError};
use crate::state_store::StateStore;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub type Handler = Arc<dyn Fn(BeadEnvelope) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct SseStream {
    base_url: String,
    topics: Vec<String>,
    http: reqwest::Client,
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
    dedup: Option<Arc<Dedup>>,
    state_store: Arc<StateStore>,
}

impl SseStream {
    pub fn new(base_url: impl Into<String>, topics: Vec<String>, state_store: Arc<StateStore>) -> Self {
        Self {
            base_url: base_url.into(),
            topics,
            http: reqwest::Client::new(),
            handlers: Mutex::new(HashMap::new()),
            dedup: None,
            state_store,
        }
    }

    pub fn with_dedup(mut self, dedup: Arc<Dedup>) -> Self {
        self.dedup = Some(dedup);
        self
    }

    pub fn on(&self, topic: impl Into<String>, handler: Handler) {
        self.handlers
            .lock()
            .unwrap()
            .entry(topic.into())
            .or_default()
            .push(handler);
    }

    /// Runs the reconnect loop until `cancellation` fires. Any error from a
    /// live connection (including a clean end-of-stream) causes a reconnect
    /// after exponential backoff; only the cancellation token stops the loop.
    pub async fn start(&self, cancellation: CancellationToken) {
        let mut backoff = MIN_BACKOFF;
        loop {
            if cancellation.is_cancelled() {
                return;
            }
            match self.run_once(&cancellation).await {
                Ok(()) => {
                    // clean end-of-stream: reconnect immediately with reset backoff
                    backoff = MIN_BACKOFF;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SSE connection dropped, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancellation.cancelled() => return,
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn run_once(&self, cancellation: &CancellationToken) -> Result<()> {
        let last_event_id = self.state_store.get_last_event_id().await;
        let url = format!(
            "{}/v1/events/stream?topics={}",
            self.base_url.trim_end_matches('/'),
            self.topics.join(",")
        );
        let mut request = self
            .http
            .get(&url)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");
        if !last_event_id.is_empty() {
            request = request.header("Last-Event-ID", last_event_id);
        }

        let response = request.send().await.map_err(SseError::Transport)?;
        if !response.status().is_success() {
            return Err(SseError::UpstreamStatus(response.status()).into());
        }

        let mut stream = response.bytes_stream().eventsource();
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => return Ok(()),
                next = stream.next() => {
                    let Some(event) = next else { return Ok(()) }; // end of stream
                    let event = event.map_err(|e| SseError::BadResponse(e.to_string()))?;
                    if event.data.is_empty() || event.event.is_empty() {
                        continue;
                    }
                    self.dispatch(&event.event, &event.data).await;
                    if !event.id.is_empty() {
                        if let Err(e) = self.state_store.set_last_event_id(event.id).await {
                            tracing::warn!(error = %e, "failed to persist last_event_id");
                        }
                    }
                }
            }
        }
    }

    async fn dispatch(&self, topic: &str, data: &str) {
        let envelope: BeadEnvelope = match serde_json::from_str(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(topic, error = %e, "failed to parse bead envelope, dropping event");
                return;
            }
        };

        if let Some(dedup) = &self.dedup {
            if topic != "beads.bead.updated" {
                let key = format!("{topic}:{}", envelope.bead.id);
                if dedup.seen(key) {
                    return;
                }
            }
        }

        let handlers = {
            let guard = self.handlers.lock().unwrap();
            guard.get(topic).cloned().unwrap_or_default()
        };
        for handler in handlers {
            handler(envelope.clone()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn dedup_gate_skips_repeated_create_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::load(dir.path().join("s.json")).await.unwrap());
        let stream = SseStream::new("http://unused", vec!["beads.bead.created".into()], store)
            .with_dedup(Arc::new(Dedup::new(Duration::from_secs(60))));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        stream.on(
            "beads.bead.created",
            Arc::new(move |_event| {
                let calls = calls_clone.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        let data = r#"{"bead":{"id":"dec-1","type":"decision"}}"#;
        stream.dispatch("beads.bead.created", data).await;
        stream.dispatch("beads.bead.created", data).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn updated_topic_is_never_deduped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::load(dir.path().join("s.json")).await.unwrap());
        let stream = SseStream::new("http://unused", vec!["beads.bead.updated".into()], store)
            .with_dedup(Arc::new(Dedup::new(Duration::from_secs(60))));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        stream.on(
            "beads.bead.updated",
            Arc::new(move |_event| {
                let calls = calls_clone.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        let data = r#"{"bead":{"id":"agent-1","type":"agent"}}"#;
        stream.dispatch("beads.bead.updated", data).await;
        stream.dispatch("beads.bead.updated", data).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn handlers_for_same_topic_run_in_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::load(dir.path().join("s.json")).await.unwrap());
        let stream = SseStream::new("http://unused", vec!["beads.bead.created".into()], store);

        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = order.clone();
            stream.on(
                "beads.bead.created",
                Arc::new(move |_event| {
                    let order = order.clone();
                    Box::pin(async move {
                        order.lock().unwrap().push(tag);
                    })
                }),
            );
        }
        stream
            .dispatch("beads.bead.created", r#"{"bead":{"id":"x","type":"task"}}"#)
            .await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }
}
