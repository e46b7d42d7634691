//! A thin typed client over the beads daemon's REST API.
//!
//! Paired static/dynamic traits, the same shape as the messaging layer's
//! `Messaging`/`MessagingDyn` split: `BeadClient` is what you implement
//! (RPITIT, generic-friendly), `BeadClientDyn` is what you store
//! (`Arc<dyn BeadClientDyn>`, boxed futures). A blanket impl bridges the two
//! so watchers and the HTTP API layer never need to know which concrete
//! client they're holding.

use crate::bead::BeadEvent;
use crate::error::{DaemonError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct CreateBeadRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub assignee: Option<String>,
    pub priority: Option<u8>,
    pub labels: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveDecisionRequest {
    pub selected_option: Option<String>,
    pub response_text: Option<String>,
    pub responded_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionSummary {
    pub id: String,
    pub status: String,
    pub title: String,
}

pub trait BeadClient: Send + Sync + 'static {
    fn get_bead(&self, id: &str) -> impl Future<Output = Result<BeadEvent>> + Send;
    fn find_agent_bead(&self, agent: &str) -> impl Future<Output = Result<Option<BeadEvent>>> + Send;
    fn create_bead(&self, req: CreateBeadRequest) -> impl Future<Output = Result<BeadEvent>> + Send;
    fn close_bead(
        &self,
        id: &str,
        fields: serde_json::Value,
    ) -> impl Future<Output = Result<()>> + Send;
    fn list_decision_beads(&self) -> impl Future<Output = Result<Vec<BeadEvent>>> + Send;
    fn list_agent_beads(&self) -> impl Future<Output = Result<Vec<BeadEvent>>> + Send;
    fn resolve_decision(
        &self,
        id: &str,
        req: ResolveDecisionRequest,
    ) -> impl Future<Output = Result<()>> + Send;
    fn cancel_decision(
        &self,
        id: &str,
        reason: &str,
        canceled_by: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub trait BeadClientDyn: Send + Sync + 'static {
    fn get_bead<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Result<BeadEvent>> + Send + 'a>>;
    fn find_agent_bead<'a>(
        &'a self,
        agent: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BeadEvent>>> + Send + 'a>>;
    fn create_bead<'a>(
        &'a self,
        req: CreateBeadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BeadEvent>> + Send + 'a>>;
    fn close_bead<'a>(
        &'a self,
        id: &'a str,
        fields: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn list_decision_beads<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<BeadEvent>>> + Send + 'a>>;
    fn list_agent_beads<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<BeadEvent>>> + Send + 'a>>;
    fn resolve_decision<'a>(
        &'a self,
        id: &'a str,
        req: ResolveDecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
    fn cancel_decision<'a>(
        &'a self,
        id: &'a str,
        reason: &'a str,
        canceled_by: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl<T: BeadClient> BeadClientDyn for T {
    fn get_bead<'a>(&'a self, id: &'a str) -> Pin<Box<dyn Future<Output = Result<BeadEvent>> + Send + 'a>> {
        Box::pin(BeadClient::get_bead(self, id))
    }

    fn find_agent_bead<'a>(
        &'a self,
        agent: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<BeadEvent>>> + Send + 'a>> {
        Box::pin(BeadClient::find_agent_bead(self, agent))
    }

    fn create_bead<'a>(
        &'a self,
        req: CreateBeadRequest,
    ) -> Pin<Box<dyn Future<Output = Result<BeadEvent>> + Send + 'a>> {
        Box::pin(BeadClient::create_bead(self, req))
    }

    fn close_bead<'a>(
        &'a self,
        id: &'a str,
        fields: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(BeadClient::close_bead(self, id, fields))
    }

    fn list_decision_beads<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<BeadEvent>>> + Send + 'a>> {
        Box::pin(BeadClient::list_decision_beads(self))
    }

    fn list_agent_beads<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<Vec<BeadEvent>>> + Send + 'a>> {
        Box::pin(BeadClient::list_agent_beads(self))
    }

    fn resolve_decision<'a>(
        &'a self,
        id: &'a str,
        req: ResolveDecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(BeadClient::resolve_decision(self, id, req))
    }

    fn cancel_decision<'a>(
        &'a self,
        id: &'a str,
        reason: &'a str,
        canceled_by: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(BeadClient::cancel_decision(self, id, reason, canceled_by))
    }
}

/// `reqwest`-backed client hitting the beads daemon's HTTP REST surface.
pub struct HttpBeadClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBeadClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client builds with static config"),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.http.get(self.url(path)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DaemonError::UpstreamStatus {
                status,
                path: path.to_string(),
            }
            .into());
        }
        resp.json::<T>()
            .await
            .map_err(|e| DaemonError::BadResponse(e.to_string()).into())
    }
}

impl BeadClient for HttpBeadClient {
    async fn get_bead(&self, id: &str) -> Result<BeadEvent> {
        self.get_json(&format!("/beads/{id}")).await
    }

    async fn find_agent_bead(&self, agent: &str) -> Result<Option<BeadEvent>> {
        let path = format!("/beads/agent/{}", urlencode(agent));
        let resp = self.http.get(self.url(&path)).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(DaemonError::UpstreamStatus {
                status: resp.status(),
                path,
            }
            .into());
        }
        Ok(Some(resp.json::<BeadEvent>().await.map_err(|e| {
            DaemonError::BadResponse(e.to_string())
        })?))
    }

    async fn create_bead(&self, req: CreateBeadRequest) -> Result<BeadEvent> {
        let resp = self.http.post(self.url("/beads")).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(DaemonError::UpstreamStatus {
                status: resp.status(),
                path: "/beads".into(),
            }
            .into());
        }
        Ok(resp
            .json::<BeadEvent>()
            .await
            .map_err(|e| DaemonError::BadResponse(e.to_string()))?)
    }

    async fn close_bead(&self, id: &str, fields: serde_json::Value) -> Result<()> {
        let path = format!("/beads/{id}/close");
        let resp = self.http.post(self.url(&path)).json(&fields).send().await?;
        if !resp.status().is_success() {
            return Err(DaemonError::UpstreamStatus {
                status: resp.status(),
                path,
            }
            .into());
        }
        Ok(())
    }

    async fn list_decision_beads(&self) -> Result<Vec<BeadEvent>> {
        self.get_json("/beads?type=decision").await
    }

    async fn list_agent_beads(&self) -> Result<Vec<BeadEvent>> {
        self.get_json("/beads?type=agent").await
    }

    async fn resolve_decision(&self, id: &str, req: ResolveDecisionRequest) -> Result<()> {
        let path = format!("/decisions/{id}/resolve");
        let resp = self.http.post(self.url(&path)).json(&req).send().await?;
        if !resp.status().is_success() {
            return Err(DaemonError::UpstreamStatus {
                status: resp.status(),
                path,
            }
            .into());
        }
        Ok(())
    }

    async fn cancel_decision(&self, id: &str, reason: &str, canceled_by: &str) -> Result<()> {
        let path = format!("/decisions/{id}/cancel");
        let body = serde_json::json!({ "reason": reason, "canceled_by": canceled_by });
        let resp = self.http.post(self.url(&path)).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(DaemonError::UpstreamStatus {
                status: resp.status(),
                path,
            }
            .into());
        }
        Ok(())
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}
