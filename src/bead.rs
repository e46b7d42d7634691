//! The common in-memory shape for any work item, and typed views over its
//! free-form `fields` envelope.
//!
//! Beads carry a `fields: string -> string` bag because the daemon's typed
//! sub-structures are transported here as strings (or embedded JSON). Handlers
//! should go through [`BeadEvent::field`] and friends rather than indexing
//! `fields` directly, so the duck-typing stays confined to one place.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The kind of work item. Unknown values round-trip through `Other` rather
/// than failing to deserialize — the daemon may introduce new bead types the
/// bridge doesn't otherwise need to special-case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadType {
    Decision,
    Agent,
    Mail,
    Task,
    Bug,
    Feature,
    Epic,
    Report,
    Project,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    Open,
    InProgress,
    Blocked,
    Deferred,
    Closed,
}

/// The common in-memory shape for any work item emitted on the SSE stream or
/// returned by the daemon REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeadEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BeadType,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_status")]
    pub status: BeadStatus,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub labels: HashSet<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub fields: std::collections::HashMap<String, String>,
}

fn default_status() -> BeadStatus {
    BeadStatus::Open
}

fn default_priority() -> u8 {
    3
}

/// The SSE envelope wrapping a bead payload: `{"bead": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct BeadEnvelope {
    pub bead: BeadEvent,
}

impl BeadEvent {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn agent_state(&self) -> Option<&str> {
        self.field("agent_state")
    }

    pub fn pod_phase(&self) -> Option<&str> {
        self.field("pod_phase")
    }

    pub fn chosen(&self) -> Option<&str> {
        self.field("chosen")
    }

    pub fn rationale(&self) -> Option<&str> {
        self.field("rationale")
    }

    pub fn required_artifact(&self) -> Option<&str> {
        self.field("required_artifact")
    }

    pub fn decision_id(&self) -> Option<&str> {
        self.field("decision_id")
    }

    pub fn report_type(&self) -> Option<&str> {
        self.field("report_type")
    }

    pub fn content(&self) -> Option<&str> {
        self.field("content")
    }

    pub fn predecessor_id(&self) -> Option<&str> {
        self.field("predecessor_id")
    }

    pub fn requesting_agent_bead_id(&self) -> Option<&str> {
        self.field("requesting_agent_bead_id")
    }

    pub fn close_reason(&self) -> Option<&str> {
        self.field("reason").or_else(|| self.field("close_reason"))
    }

    /// A crash is `agent_state = failed` OR `pod_phase = failed`, whichever field
    /// is present, seen on either an `updated` or a `closed` event.
    pub fn is_crashed(&self) -> bool {
        self.agent_state() == Some("failed") || self.pod_phase() == Some("failed")
    }

    /// The first `from:<sender>` label, used by the mail watcher to name a sender
    /// without a REST round-trip.
    pub fn mail_sender(&self) -> Option<&str> {
        self.labels
            .iter()
            .find_map(|label| label.strip_prefix("from:"))
    }

    /// A human-readable label for the bead's kind, for display in activity
    /// notifications.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            BeadType::Decision => "decision",
            BeadType::Agent => "agent",
            BeadType::Mail => "mail",
            BeadType::Task => "task",
            BeadType::Bug => "bug",
            BeadType::Feature => "feature",
            BeadType::Epic => "epic",
            BeadType::Report => "report",
            BeadType::Project => "project",
            BeadType::Other => "item",
        }
    }

    /// Parses `coop_url: <value>` out of a `notes`-style `key: value` block
    /// (one `key: value` pair per line). Used by the Nudger to find an agent's
    /// coop endpoint without a dedicated daemon field for it.
    pub fn coop_url_from_notes(notes: &str) -> Option<String> {
        notes.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == "coop_url").then(|| value.trim().to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_decision_bead() {
        let json = r#"{"bead":{"id":"dec-1","type":"decision","assignee":"gasboat/crew/ops","fields":{"prompt":"Deploy?"}}}"#;
        let envelope: BeadEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.bead.id, "dec-1");
        assert_eq!(envelope.bead.kind, BeadType::Decision);
        assert_eq!(envelope.bead.field("prompt"), Some("Deploy?"));
    }

    #[test]
    fn unknown_bead_type_round_trips_as_other() {
        let json = r#"{"id":"x","type":"widget"}"#;
        let bead: BeadEvent = serde_json::from_str(json).unwrap();
        assert_eq!(bead.kind, BeadType::Other);
    }

    #[test]
    fn crash_detected_from_either_field() {
        let mut bead = BeadEvent {
            id: "a".into(),
            kind: BeadType::Agent,
            title: String::new(),
            status: BeadStatus::Open,
            assignee: String::new(),
            created_by: String::new(),
            labels: HashSet::new(),
            priority: 3,
            fields: Default::default(),
        };
        assert!(!bead.is_crashed());
        bead.fields.insert("pod_phase".into(), "failed".into());
        assert!(bead.is_crashed());
    }

    #[test]
    fn coop_url_parsed_from_notes_block() {
        let notes = "owner: ops\ncoop_url: http://10.0.0.5:9100\nextra: 1";
        assert_eq!(
            BeadEvent::coop_url_from_notes(notes).as_deref(),
            Some("http://10.0.0.5:9100")
        );
    }

    #[test]
    fn mail_sender_reads_first_from_label() {
        let mut bead = BeadEvent {
            id: "m".into(),
            kind: BeadType::Mail,
            title: String::new(),
            status: BeadStatus::Open,
            assignee: String::new(),
            created_by: String::new(),
            labels: HashSet::new(),
            priority: 1,
            fields: Default::default(),
        };
        bead.labels.insert("from:alice".into());
        assert_eq!(bead.mail_sender(), Some("alice"));
    }
}
