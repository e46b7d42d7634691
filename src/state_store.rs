//! The durable document of message references and SSE resume state.
//!
//! StateStore exclusively owns the persisted document; every watcher and the
//! ChatBot hold only transient in-memory caches reconstructible from it plus a
//! full daemon list. Persistence is serialize-to-temp-then-rename, the same
//! atomic-replace idiom the control-plane API uses for its own on-disk state.

use crate::error::{Result, StateStoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Identifies one chat message: which channel, which timestamp, and which
/// agent it's tracking on behalf of (so pending counts can be decremented
/// without re-reading the bead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: String,
    pub timestamp: String,
    pub agent: String,
}

/// The dashboard's single pinned message plus the content hash used to skip
/// no-op edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardRef {
    pub channel_id: String,
    pub timestamp: String,
    pub last_hash: String,
}

/// The persisted document. Invariants enforced by [`StateStore`]'s mutators,
/// not by this type alone: keys in `decision_messages` and `chat_messages` are
/// disjoint, and every `(channel_id, timestamp)` pair is unique across the
/// document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub decision_messages: HashMap<String, MessageRef>,
    #[serde(default)]
    pub chat_messages: HashMap<String, MessageRef>,
    #[serde(default)]
    pub agent_cards: HashMap<String, MessageRef>,
    #[serde(default)]
    pub dashboard: Option<DashboardRef>,
    #[serde(default)]
    pub last_event_id: String,
}

/// Which collection a `MessageRef` operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Decision,
    Chat,
    AgentCard,
}

pub struct StateStore {
    path: PathBuf,
    data: RwLock<StateData>,
}

impl StateStore {
    /// Loads the store from `path`. A missing or empty file is a valid empty
    /// document. A parse failure is fatal and halts startup, per design: the
    /// store MUST succeed its first load before any watcher starts.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => StateData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                StateStoreError::Corrupt {
                    path: path.display().to_string(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn collection(data: &StateData, which: Collection) -> &HashMap<String, MessageRef> {
        match which {
            Collection::Decision => &data.decision_messages,
            Collection::Chat => &data.chat_messages,
            Collection::AgentCard => &data.agent_cards,
        }
    }

    fn collection_mut(data: &mut StateData, which: Collection) -> &mut HashMap<String, MessageRef> {
        match which {
            Collection::Decision => &mut data.decision_messages,
            Collection::Chat => &mut data.chat_messages,
            Collection::AgentCard => &mut data.agent_cards,
        }
    }

    pub async fn get(&self, which: Collection, id: &str) -> Option<MessageRef> {
        let data = self.data.read().await;
        Self::collection(&data, which).get(id).cloned()
    }

    pub async fn all(&self, which: Collection) -> HashMap<String, MessageRef> {
        let data = self.data.read().await;
        Self::collection(&data, which).clone()
    }

    pub async fn set(&self, which: Collection, id: impl Into<String>, value: MessageRef) -> Result<()> {
        let mut data = self.data.write().await;
        Self::collection_mut(&mut data, which).insert(id.into(), value);
        self.persist(&data).await
    }

    pub async fn remove(&self, which: Collection, id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        Self::collection_mut(&mut data, which).remove(id);
        self.persist(&data).await
    }

    pub async fn get_last_event_id(&self) -> String {
        self.data.read().await.last_event_id.clone()
    }

    pub async fn set_last_event_id(&self, id: impl Into<String>) -> Result<()> {
        let mut data = self.data.write().await;
        data.last_event_id = id.into();
        self.persist(&data).await
    }

    pub async fn get_dashboard(&self) -> Option<DashboardRef> {
        self.data.read().await.dashboard.clone()
    }

    pub async fn set_dashboard(&self, dashboard: DashboardRef) -> Result<()> {
        let mut data = self.data.write().await;
        data.dashboard = Some(dashboard);
        self.persist(&data).await
    }

    /// Serializes to a canonical pretty-printed form, writes it to a sibling
    /// `.restore_tmp` path, then atomically renames it into place. Creates the
    /// parent directory on first save.
    async fn persist(&self, data: &StateData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let tmp_path = tmp_path_for(&self.path);
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| StateStoreError::Persist {
                path: tmp_path.display().to_string(),
                source,
            })?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|source| StateStoreError::Persist {
                path: self.path.display().to_string(),
                source,
            })?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    path.with_extension("restore_tmp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).await.unwrap();
        assert_eq!(store.get_last_event_id().await, "");
        assert!(store.all(Collection::Decision).await.is_empty());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).await.unwrap();
        let reference = MessageRef {
            channel_id: "C1".into(),
            timestamp: "123.456".into(),
            agent: "gasboat/crew/ops".into(),
        };
        store
            .set(Collection::Decision, "dec-1", reference.clone())
            .await
            .unwrap();
        assert_eq!(store.get(Collection::Decision, "dec-1").await, Some(reference));
    }

    #[tokio::test]
    async fn remove_then_get_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::load(dir.path().join("state.json")).await.unwrap();
        let reference = MessageRef {
            channel_id: "C1".into(),
            timestamp: "1".into(),
            agent: "a".into(),
        };
        store.set(Collection::Chat, "t-1", reference).await.unwrap();
        store.remove(Collection::Chat, "t-1").await.unwrap();
        assert_eq!(store.get(Collection::Chat, "t-1").await, None);
    }

    #[tokio::test]
    async fn persisted_state_survives_reconstruction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        {
            let store = StateStore::load(&path).await.unwrap();
            store.set_last_event_id("42").await.unwrap();
            store
                .set(
                    Collection::AgentCard,
                    "gasboat/crew/ops",
                    MessageRef {
                        channel_id: "C1".into(),
                        timestamp: "999".into(),
                        agent: "gasboat/crew/ops".into(),
                    },
                )
                .await
                .unwrap();
        }
        let reopened = StateStore::load(&path).await.unwrap();
        assert_eq!(reopened.get_last_event_id().await, "42");
        assert_eq!(reopened.all(Collection::AgentCard).await.len(), 1);
        // no leftover temp file after a clean rename
        assert!(!tmp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let result = StateStore::load(&path).await;
        assert!(result.is_err());
    }
}
