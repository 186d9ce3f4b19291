pub mod approval;
pub mod events;
pub mod runner;
pub mod task;

pub use approval::{AutoApprove, AutoDenyApprover, QuoteApprover, QuoteDecision, QuoteRequest};
pub use events::{EventReceiver, EventSender, TaskEvent, event_bus};
pub use runner::TaskOrchestrator;
pub use task::{HistoryEntry, TaskHistory, TaskRecord, TaskState};
