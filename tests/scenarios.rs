//! End-to-end scenarios driving the SSE consumer and decision watcher
//! together against a stubbed daemon, the way a single bead lifecycle would
//! really flow through the bridge.

use beadbridge::bead::{BeadEvent, BeadStatus, BeadType};
use beadbridge::daemon_client::{BeadClient, BeadClientDyn, CreateBeadRequest, ResolveDecisionRequest};
use beadbridge::dedup::Dedup;
use beadbridge::error::Result;
use beadbridge::notifier::{DecisionNotifier, DecisionNotifierDyn};
use beadbridge::nudger::Nudger;
use beadbridge::sse::SseStream;
use beadbridge::state_store::StateStore;
use beadbridge::watchers::decisions::DecisionsWatcher;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Records every notifier call it receives, for assertions, without touching
/// a real chat transport.
#[derive(Default)]
struct RecordingNotifier {
    decisions: Mutex<Vec<String>>,
    updates: Mutex<Vec<(String, String)>>,
    dismissals: Mutex<Vec<String>>,
    escalations: Mutex<Vec<String>>,
    reports: Mutex<Vec<(String, String, String)>>,
}

impl DecisionNotifier for RecordingNotifier {
    async fn notify_decision(&self, bead: &BeadEvent) -> Result<()> {
        self.decisions.lock().unwrap().push(bead.id.clone());
        Ok(())
    }

    async fn update_decision(&self, id: &str, chosen: &str) -> Result<()> {
        self.updates.lock().unwrap().push((id.to_string(), chosen.to_string()));
        Ok(())
    }

    async fn dismiss_decision(&self, id: &str) -> Result<()> {
        self.dismissals.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn notify_escalation(&self, bead: &BeadEvent) -> Result<()> {
        self.escalations.lock().unwrap().push(bead.id.clone());
        Ok(())
    }

    async fn post_report(&self, decision_id: &str, report_type: &str, content: &str) -> Result<()> {
        self.reports
            .lock()
            .unwrap()
            .push((decision_id.to_string(), report_type.to_string(), content.to_string()));
        Ok(())
    }
}

/// A daemon stub backed by a fixed table of beads, so `handle_closed`'s
/// re-fetch-on-close path has something to return.
struct FakeDaemon {
    beads: HashMap<String, BeadEvent>,
}

impl BeadClient for FakeDaemon {
    async fn get_bead(&self, id: &str) -> Result<BeadEvent> {
        self.beads
            .get(id)
            .cloned()
            .ok_or_else(|| beadbridge::error::DaemonError::NotFound(id.to_string()).into())
    }
    async fn find_agent_bead(&self, agent: &str) -> Result<Option<BeadEvent>> {
        Ok(self.beads.values().find(|b| b.assignee == agent).cloned())
    }
    async fn create_bead(&self, _req: CreateBeadRequest) -> Result<BeadEvent> {
        unreachable!("not exercised in these scenarios")
    }
    async fn close_bead(&self, _id: &str, _fields: serde_json::Value) -> Result<()> {
        Ok(())
    }
    async fn list_decision_beads(&self) -> Result<Vec<BeadEvent>> {
        Ok(self.beads.values().filter(|b| b.kind == BeadType::Decision).cloned().collect())
    }
    async fn list_agent_beads(&self) -> Result<Vec<BeadEvent>> {
        Ok(self.beads.values().filter(|b| b.kind == BeadType::Agent).cloned().collect())
    }
    async fn resolve_decision(&self, _id: &str, _req: ResolveDecisionRequest) -> Result<()> {
        Ok(())
    }
    async fn cancel_decision(&self, _id: &str, _reason: &str, _canceled_by: &str) -> Result<()> {
        Ok(())
    }
}

fn decision_bead(id: &str, assignee: &str) -> BeadEvent {
    BeadEvent {
        id: id.to_string(),
        kind: BeadType::Decision,
        title: "Deploy the new build?".to_string(),
        status: BeadStatus::Open,
        assignee: assignee.to_string(),
        created_by: "agent".to_string(),
        labels: Default::default(),
        priority: 2,
        fields: HashMap::new(),
    }
}

fn agent_bead_with_coop(assignee: &str, coop_url: &str) -> BeadEvent {
    let mut fields = HashMap::new();
    fields.insert("coop_url".to_string(), coop_url.to_string());
    BeadEvent {
        id: format!("agent-{assignee}"),
        kind: BeadType::Agent,
        title: String::new(),
        status: BeadStatus::Open,
        assignee: assignee.to_string(),
        created_by: String::new(),
        labels: Default::default(),
        priority: 3,
        fields,
    }
}

fn harness(
    beads: Vec<BeadEvent>,
) -> (Arc<RecordingNotifier>, DecisionsWatcher) {
    let notifier = Arc::new(RecordingNotifier::default());
    let table: HashMap<String, BeadEvent> = beads.into_iter().map(|b| (b.id.clone(), b)).collect();
    let daemon: Arc<dyn BeadClientDyn> = Arc::new(FakeDaemon { beads: table });
    let nudger = Arc::new(Nudger::new(daemon.clone()));
    let notifier_dyn: Arc<dyn DecisionNotifierDyn> = notifier.clone();
    let watcher = DecisionsWatcher::new(daemon, notifier_dyn, nudger, CancellationToken::new());
    (notifier, watcher)
}

fn envelope(bead: BeadEvent) -> beadbridge::bead::BeadEnvelope {
    beadbridge::bead::BeadEnvelope { bead }
}

/// Scenario 1: a fresh decision bead created on the stream results in exactly
/// one `notify_decision` call.
#[tokio::test]
async fn scenario_decision_happy_path() {
    let bead = decision_bead("dec-1", "gasboat/crew/ops");
    let (notifier, watcher) = harness(vec![bead.clone()]);

    watcher.handle("beads.bead.created", envelope(bead)).await;

    assert_eq!(*notifier.decisions.lock().unwrap(), vec!["dec-1".to_string()]);
}

/// Scenario 2: closing a decision with a `chosen` field edits the message and
/// nudges the requesting agent.
#[tokio::test]
async fn scenario_decision_close_nudges_agent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/agent/nudge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"delivered": true})))
        .expect(1)
        .mount(&server)
        .await;

    let agent = agent_bead_with_coop("gasboat/crew/ops", &server.uri());
    let mut closed = decision_bead("dec-2", "gasboat/crew/ops");
    closed.status = BeadStatus::Closed;
    closed.fields.insert("chosen".to_string(), "ship-it".to_string());

    let (notifier, watcher) = harness(vec![agent, closed.clone()]);
    watcher.handle("beads.bead.closed", envelope(closed)).await;

    assert_eq!(
        *notifier.updates.lock().unwrap(),
        vec![("dec-2".to_string(), "ship-it".to_string())]
    );
}

/// Scenario 3: a bead closed with `chosen = "_expired"` is dismissed, not
/// edited, and never reaches update_decision.
#[tokio::test]
async fn scenario_decision_expiry_dismisses_instead_of_updating() {
    let mut expired = decision_bead("dec-3", "");
    expired.status = BeadStatus::Closed;
    expired.fields.insert("chosen".to_string(), "_expired".to_string());

    let (notifier, watcher) = harness(vec![expired.clone()]);
    watcher.handle("beads.bead.closed", envelope(expired)).await;

    assert_eq!(*notifier.dismissals.lock().unwrap(), vec!["dec-3".to_string()]);
    assert!(notifier.updates.lock().unwrap().is_empty());
}

/// Scenario 4: the same escalated bead arriving twice on `updated` fires
/// `notify_escalation` only once, inside the watcher's own dedup window.
#[tokio::test]
async fn scenario_escalation_dedup_fires_once() {
    let mut escalated = decision_bead("dec-4", "gasboat/crew/ops");
    escalated.labels.insert("escalated".to_string());

    let (notifier, watcher) = harness(vec![escalated.clone()]);
    watcher.handle("beads.bead.updated", envelope(escalated.clone())).await;
    watcher.handle("beads.bead.updated", envelope(escalated)).await;

    assert_eq!(*notifier.escalations.lock().unwrap(), vec!["dec-4".to_string()]);
}

/// Scenario 5: a coop endpoint that reports `delivered: false` twice before
/// succeeding is retried, not given up on after the first busy response.
#[tokio::test]
async fn scenario_nudge_busy_then_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/agent/nudge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"delivered": false})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/agent/nudge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"delivered": true})))
        .mount(&server)
        .await;

    let agent = agent_bead_with_coop("gasboat/crew/ops", &server.uri());
    let table: HashMap<String, BeadEvent> = vec![(agent.id.clone(), agent)].into_iter().collect();
    let daemon: Arc<dyn BeadClientDyn> = Arc::new(FakeDaemon { beads: table });
    let nudger = Nudger::new(daemon).with_max_attempts(3);

    nudger
        .nudge("gasboat/crew/ops", "wake up", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

/// Scenario 6: after a dropped SSE connection, the reconnect carries the
/// persisted `Last-Event-ID` header so the daemon can resume the backlog
/// instead of replaying from the start.
#[tokio::test]
async fn scenario_resumable_reconnect_sends_last_event_id() {
    let server = MockServer::start().await;

    let seen_headers: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_headers_clone = seen_headers.clone();

    Mock::given(method("GET"))
        .and(path("/v1/events/stream"))
        .respond_with(move |req: &Request| {
            let last_event_id = req
                .headers
                .get("Last-Event-ID")
                .map(|v| v.to_str().unwrap_or_default().to_string());
            seen_headers_clone.lock().unwrap().push(last_event_id);
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(
                    "event: beads.bead.created\nid: evt-1\ndata: {\"bead\":{\"id\":\"dec-5\",\"type\":\"decision\"}}\n\n"
                        .as_bytes()
                        .to_vec(),
                    "text/event-stream",
                )
        })
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StateStore::load(dir.path().join("state.json")).await.unwrap());
    let stream = Arc::new(SseStream::new(
        server.uri(),
        vec!["beads.bead.created".to_string()],
        store.clone(),
    ));

    let received = Arc::new(Mutex::new(Vec::new()));
    let received_clone = received.clone();
    stream.on(
        "beads.bead.created",
        Arc::new(move |envelope: beadbridge::bead::BeadEnvelope| {
            let received = received_clone.clone();
            Box::pin(async move {
                received.lock().unwrap().push(envelope.bead.id);
            })
        }),
    );

    let cancellation = CancellationToken::new();
    let cancel_clone = cancellation.clone();
    let stream_clone = stream.clone();
    let handle = tokio::spawn(async move { stream_clone.start(cancel_clone).await });

    // Give the reconnect loop time to run once (first connection, no
    // Last-Event-ID yet), persist the id from the frame, drop, and reconnect
    // carrying that id on the second request.
    tokio::time::sleep(Duration::from_millis(250)).await;
    cancellation.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    assert_eq!(store.get_last_event_id().await, "evt-1");

    let headers = seen_headers.lock().unwrap();
    assert!(headers.len() >= 2, "expected at least a first connection and a reconnect");
    assert_eq!(headers[0], None, "first connection has no resume point yet");
    assert_eq!(
        headers.last().cloned().flatten().as_deref(),
        Some("evt-1"),
        "reconnect should carry the persisted Last-Event-ID"
    );
}

#[tokio::test]
async fn dedup_survives_across_watcher_instances_only_within_its_own_window() {
    let dedup = Dedup::new(Duration::from_millis(50));
    assert!(!dedup.seen("k".to_string()));
    assert!(dedup.seen("k".to_string()));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!dedup.seen("k".to_string()), "entry should have expired");
}
