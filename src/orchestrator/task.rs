use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::{Capability, Device, Machine, ParsedIntent, PaymentDetails};
use crate::error::Result;
use crate::storage::{KeyValueStore, load_json, save_json};

pub const TASK_HISTORY_KEY: &str = "task_history";
pub const HISTORY_VERSION: u32 = 1;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskState {
    #[default]
    Idle,
    Scanning,
    Quote,
    Executing,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// States during which a new run must not start.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Scanning | Self::Executing)
    }
}

/// Working state of one orchestration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub intent: String,
    pub state: TaskState,
    pub parsed_intent: Option<ParsedIntent>,
    pub machine: Option<Machine>,
    pub resolution_degraded: bool,
    pub device: Option<Device>,
    pub capability: Option<Capability>,
    pub params: Map<String, Value>,
    pub payment_details: Option<PaymentDetails>,
    pub tx_hash: Option<String>,
    pub result_data: Option<Value>,
    pub error: Option<String>,
    /// Reply for chat intents.
    pub message: Option<String>,
}

impl TaskRecord {
    pub fn new(intent: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            intent: intent.to_string(),
            ..Self::default()
        }
    }

    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            id: self.id.clone(),
            intent: self.intent.clone(),
            state: self.state,
            timestamp: Utc::now(),
            tx_hash: self.tx_hash.clone(),
            device: self.device.as_ref().map(|d| d.id.clone()),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub intent: String,
    pub state: TaskState,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryBlob {
    version: u32,
    entries: VecDeque<HistoryEntry>,
}

/// Bounded, most-recent-first log of finished tasks. Display only.
pub struct TaskHistory {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
    entries: Mutex<VecDeque<HistoryEntry>>,
}

impl std::fmt::Debug for TaskHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHistory")
            .field("limit", &self.limit)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl TaskHistory {
    pub fn load(store: Arc<dyn KeyValueStore>, limit: usize) -> Result<Self> {
        let limit = limit.max(1);
        let mut entries = match load_json::<HistoryBlob>(store.as_ref(), TASK_HISTORY_KEY) {
            Ok(Some(blob)) if blob.version == HISTORY_VERSION => blob.entries,
            Ok(Some(blob)) => {
                tracing::warn!(version = blob.version, "unsupported task history version, starting empty");
                VecDeque::new()
            }
            Ok(None) => VecDeque::new(),
            Err(e) => {
                tracing::warn!(error = %e, "task history unreadable, starting empty");
                VecDeque::new()
            }
        };
        entries.truncate(limit);
        Ok(Self {
            store,
            limit,
            entries: Mutex::new(entries),
        })
    }

    pub fn push(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.push_front(entry);
        entries.truncate(self.limit);
        save_json(
            self.store.as_ref(),
            TASK_HISTORY_KEY,
            &HistoryBlob {
                version: HISTORY_VERSION,
                entries: entries.clone(),
            },
        )
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.store.remove(TASK_HISTORY_KEY)
    }
}
