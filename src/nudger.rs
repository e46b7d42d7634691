//! HTTP client that looks up an agent's coop URL, POSTs a nudge, and retries
//! on "busy".
//!
//! The per-attempt timeout and cancellable backoff mirror the subprocess
//! worker's own `tokio::select!` race between a cancellation token and a
//! per-call timeout.

use crate::bead::BeadEvent;
use crate::daemon_client::BeadClientDyn;
use crate::error::{NudgeError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(8);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct NudgeRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct NudgeResponse {
    #[serde(default)]
    delivered: Option<bool>,
    #[serde(default)]
    #[allow(dead_code)]
    reason: Option<String>,
}

pub struct Nudger {
    http: reqwest::Client,
    daemon: Arc<dyn BeadClientDyn>,
    max_attempts: u32,
}

impl Nudger {
    pub fn new(daemon: Arc<dyn BeadClientDyn>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(ATTEMPT_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            daemon,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wakes `agent` with `message`. Empty agent fails immediately with
    /// `invalid_argument`. Missing `coop_url` is logged at debug and treated
    /// as success (the agent is reachable only through polling). Busy
    /// responses are retried with exponential backoff honouring
    /// cancellation.
    pub async fn nudge(
        &self,
        agent: &str,
        message: &str,
        cancellation: &CancellationToken,
    ) -> Result<()> {
        if agent.is_empty() {
            return Err(NudgeError::EmptyAgent.into());
        }

        let bead = self
            .daemon
            .find_agent_bead(agent)
            .await?
            .ok_or_else(|| NudgeError::AgentNotFound {
                agent: agent.to_string(),
            })?;

        let Some(coop_url) = coop_url_of(&bead) else {
            tracing::debug!(agent, "no coop_url on record, treating nudge as delivered");
            return Ok(());
        };

        let endpoint = format!("{}/api/v1/agent/nudge", coop_url.trim_end_matches('/'));
        let mut backoff = BASE_BACKOFF;

        for attempt in 1..=self.max_attempts {
            let resp = self
                .http
                .post(&endpoint)
                .json(&NudgeRequest { message })
                .send()
                .await
                .map_err(NudgeError::Transport)?;

            if !resp.status().is_success() {
                return Err(NudgeError::Transport(
                    resp.error_for_status().unwrap_err(),
                )
                .into());
            }

            let bytes = resp.bytes().await.map_err(NudgeError::Transport)?;
            if bytes.is_empty() {
                return Ok(());
            }

            let parsed: NudgeResponse = match serde_json::from_slice(&bytes) {
                Ok(parsed) => parsed,
                Err(_) => return Ok(()), // unparseable body: treat as delivered
            };

            match parsed.delivered {
                None | Some(true) => return Ok(()),
                Some(false) => {
                    if attempt == self.max_attempts {
                        return Err(NudgeError::Busy {
                            agent: agent.to_string(),
                            attempts: attempt,
                        }
                        .into());
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancellation.cancelled() => return Ok(()),
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        Err(NudgeError::Busy {
            agent: agent.to_string(),
            attempts: self.max_attempts,
        }
        .into())
    }
}

fn coop_url_of(bead: &BeadEvent) -> Option<String> {
    bead.field("coop_url")
        .map(str::to_string)
        .or_else(|| bead.field("notes").and_then(BeadEvent::coop_url_from_notes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bead::{BeadStatus, BeadType};
    use crate::error::Error;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeDaemon {
        bead: Option<BeadEvent>,
    }

    impl crate::daemon_client::BeadClient for FakeDaemon {
        async fn get_bead(&self, _id: &str) -> Result<BeadEvent> {
            unreachable!("not exercised by nudge")
        }
        async fn find_agent_bead(&self, _agent: &str) -> Result<Option<BeadEvent>> {
            Ok(self.bead.clone())
        }
        async fn create_bead(
            &self,
            _req: crate::daemon_client::CreateBeadRequest,
        ) -> Result<BeadEvent> {
            unreachable!()
        }
        async fn close_bead(&self, _id: &str, _fields: serde_json::Value) -> Result<()> {
            unreachable!()
        }
        async fn list_decision_beads(&self) -> Result<Vec<BeadEvent>> {
            unreachable!()
        }
        async fn list_agent_beads(&self) -> Result<Vec<BeadEvent>> {
            unreachable!()
        }
        async fn resolve_decision(
            &self,
            _id: &str,
            _req: crate::daemon_client::ResolveDecisionRequest,
        ) -> Result<()> {
            unreachable!()
        }
        async fn cancel_decision(&self, _id: &str, _reason: &str, _canceled_by: &str) -> Result<()> {
            unreachable!()
        }
    }

    fn agent_bead(coop_url: &str) -> BeadEvent {
        let mut fields = std::collections::HashMap::new();
        fields.insert("coop_url".to_string(), coop_url.to_string());
        BeadEvent {
            id: "agent-1".into(),
            kind: BeadType::Agent,
            title: String::new(),
            status: BeadStatus::Open,
            assignee: "gasboat/crew/ops".into(),
            created_by: String::new(),
            labels: Default::default(),
            priority: 3,
            fields,
        }
    }

    #[tokio::test]
    async fn empty_agent_is_invalid_argument() {
        let daemon: Arc<dyn BeadClientDyn> = Arc::new(FakeDaemon { bead: None });
        let nudger = Nudger::new(daemon);
        let err = nudger
            .nudge("", "hi", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Nudge(crate::error::NudgeError::EmptyAgent)));
    }

    #[tokio::test]
    async fn delivered_true_returns_success_in_one_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agent/nudge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"delivered": true})))
            .expect(1)
            .mount(&server)
            .await;

        let daemon: Arc<dyn BeadClientDyn> = Arc::new(FakeDaemon {
            bead: Some(agent_bead(&server.uri())),
        });
        let nudger = Nudger::new(daemon);
        nudger
            .nudge("gasboat/crew/ops", "hi", &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn busy_twice_then_delivered_makes_three_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agent/nudge"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"delivered": false, "reason": "agent_busy"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/agent/nudge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"delivered": true})))
            .mount(&server)
            .await;

        let daemon: Arc<dyn BeadClientDyn> = Arc::new(FakeDaemon {
            bead: Some(agent_bead(&server.uri())),
        });
        let nudger = Nudger::new(daemon).with_max_attempts(3);
        nudger
            .nudge("gasboat/crew/ops", "hi", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn no_coop_url_treated_as_delivered() {
        let mut bead = agent_bead("http://unused");
        bead.fields.clear();
        let daemon: Arc<dyn BeadClientDyn> = Arc::new(FakeDaemon { bead: Some(bead) });
        let nudger = Nudger::new(daemon);
        nudger
            .nudge("gasboat/crew/ops", "hi", &CancellationToken::new())
            .await
            .unwrap();
    }
}
