use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::task::TaskState;
use crate::core::PaymentDetails;

/// Events published by the orchestrator for UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    StateChanged {
        task_id: String,
        state: TaskState,
    },
    MachineResolved {
        task_id: String,
        machine: String,
        base_url: String,
        degraded: bool,
        reason: Option<String>,
    },
    DeviceSelected {
        task_id: String,
        device_id: String,
        device_name: String,
    },
    CapabilitySelected {
        task_id: String,
        capability_id: String,
        payment_required: bool,
    },
    QuoteIssued {
        task_id: String,
        details: PaymentDetails,
    },
    Completed {
        task_id: String,
        tx_hash: Option<String>,
    },
    Failed {
        task_id: String,
        message: String,
    },
    Chat {
        task_id: String,
        message: String,
    },
}

pub type EventSender = broadcast::Sender<TaskEvent>;
pub type EventReceiver = broadcast::Receiver<TaskEvent>;

/// Create a broadcast event bus with the given capacity.
pub fn event_bus(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}
