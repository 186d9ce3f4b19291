//! Top-level task state machine.
//!
//! `Idle → Scanning → (Quote | Executing) → (Success | Error)`
//!
//! `Quote` is entered only when the gateway surfaces payment terms for a
//! human; `authorize` resumes from there. A run stays in `Scanning` while
//! the first capability request is in flight and moves to `Executing` once
//! a payment is being made or the capability has answered.

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::approval::{QuoteApprover, QuoteDecision, QuoteRequest};
use super::events::{EventReceiver, EventSender, TaskEvent, event_bus};
use super::task::{TaskHistory, TaskRecord, TaskState};
use crate::core::{Action, IntentKind, route_name};
use crate::discovery::catalog::{CapabilityCatalog, find_matching_capability};
use crate::discovery::client::MachineClient;
use crate::discovery::directory::MachineDirectory;
use crate::discovery::matcher::{DeviceQuery, find_device};
use crate::discovery::resolver::NameResolver;
use crate::error::{Result, TollgateError};
use crate::intent::IntentParser;
use crate::payment::gateway::{
    ExecutionOutcome, GatewayPhase, PaymentGateway, PaymentMode, cancellable,
};

const EVENT_CAPACITY: usize = 64;

const UNCLEAR_INTENT: &str = "I could not tell which action you want. Try \"unlock smart_lock_01\".";

pub struct TaskOrchestrator {
    parser: Arc<dyn IntentParser>,
    directory: MachineDirectory,
    resolver: NameResolver,
    machines: MachineClient,
    catalog: CapabilityCatalog,
    gateway: PaymentGateway,
    history: TaskHistory,
    attended_only: bool,
    events: EventSender,
    state: watch::Sender<TaskState>,
    current: Mutex<Option<TaskRecord>>,
    active: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOrchestrator")
            .field("state", &self.state())
            .field("attended_only", &self.attended_only)
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl TaskOrchestrator {
    pub fn new(
        parser: Arc<dyn IntentParser>,
        directory: MachineDirectory,
        resolver: NameResolver,
        machines: MachineClient,
        gateway: PaymentGateway,
        history: TaskHistory,
    ) -> Self {
        let (events, _) = event_bus(EVENT_CAPACITY);
        let (state, _) = watch::channel(TaskState::Idle);
        Self {
            parser,
            directory,
            resolver,
            catalog: CapabilityCatalog::new(machines.clone()),
            machines,
            gateway,
            history,
            attended_only: false,
            events,
            state,
            current: Mutex::new(None),
            active: Mutex::new(None),
        }
    }

    /// Always ask a human before paying, even with autonomy enabled.
    #[must_use]
    pub fn attended_only(mut self, attended: bool) -> Self {
        self.attended_only = attended;
        self
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn current(&self) -> Option<TaskRecord> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn history(&self) -> &TaskHistory {
        &self.history
    }

    pub fn gateway(&self) -> &PaymentGateway {
        &self.gateway
    }

    /// Run an intent through the pipeline. Returns the record for `Idle`
    /// (chat), `Quote` and `Success`; task-level failures come back as the
    /// error after the record has been archived in `Error`.
    pub async fn run(&self, text: &str, cancel: &CancellationToken) -> Result<TaskRecord> {
        let token = self.begin(cancel)?;
        let mut record = TaskRecord::new(text);
        tracing::info!(task = %record.id, intent = text, "task started");
        self.store_current(&record);

        let result = self.drive(&mut record, &token).await;
        self.end();
        self.conclude(record, result)
    }

    /// Pay the pending quote and retry the capability with proof.
    pub async fn authorize(&self, cancel: &CancellationToken) -> Result<TaskRecord> {
        let token = self.begin(cancel)?;
        let mut record = match self.take_quote() {
            Ok(record) => record,
            Err(err) => {
                self.end();
                return Err(err);
            }
        };
        tracing::info!(task = %record.id, "quote authorized");

        let result = self.settle_quote(&mut record, &token).await;
        self.end();
        self.conclude(record, result)
    }

    /// Reject the pending quote; the task ends in `Error`.
    pub fn decline(&self, reason: &str) -> Result<TaskRecord> {
        let record = self.take_quote()?;
        tracing::info!(task = %record.id, reason, "quote declined");
        self.conclude(
            record,
            Err(TollgateError::AuthorizationDenied(reason.to_string())),
        )
    }

    /// Run and, when a quote comes back, let `approver` decide.
    pub async fn run_with_approval(
        &self,
        text: &str,
        approver: &dyn QuoteApprover,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord> {
        let record = self.run(text, cancel).await?;
        if record.state != TaskState::Quote {
            return Ok(record);
        }
        let request = quote_request(&record)?;
        let decision = cancellable(cancel, async {
            approver
                .review(&request)
                .await
                .map_err(TollgateError::Other)
        })
        .await;
        match decision {
            Ok(QuoteDecision::Approved) => self.authorize(cancel).await,
            Ok(QuoteDecision::Denied { reason }) => self.decline(&reason),
            Err(err) => {
                let record = self.take_quote()?;
                self.conclude(record, Err(err))
            }
        }
    }

    /// Abort whatever is in flight and return to `Idle`.
    pub fn reset(&self) {
        if let Some(token) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
        let discarded = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let task_id = discarded.map(|r| r.id).unwrap_or_default();
        self.set_state(&task_id, TaskState::Idle);
        tracing::info!(task = %task_id, "orchestrator reset");
    }

    async fn drive(&self, record: &mut TaskRecord, cancel: &CancellationToken) -> Result<TaskState> {
        let intent = cancellable(cancel, self.parser.parse(&record.intent)).await?;
        record.parsed_intent = Some(intent.clone());

        let action = match (intent.kind, intent.action) {
            (IntentKind::Chat, _) => {
                return Ok(self.chat(record, intent.message.as_deref().unwrap_or_default()));
            }
            (IntentKind::Action, None) => return Ok(self.chat(record, UNCLEAR_INTENT)),
            (IntentKind::Action, Some(action)) => action,
        };
        let hint = intent.device.as_deref();

        self.transition(record, TaskState::Scanning);

        let entry = self
            .directory
            .select(&action, hint)
            .ok_or_else(|| TollgateError::NoMachine {
                action: action.to_string(),
            })?;
        let resolution = cancellable(cancel, async {
            Ok::<_, TollgateError>(self.resolver.resolve(entry).await)
        })
        .await?;
        let machine = resolution.machine;
        record.resolution_degraded = resolution.degraded;
        self.emit(TaskEvent::MachineResolved {
            task_id: record.id.clone(),
            machine: machine.logical_id.clone(),
            base_url: machine.base_url.clone(),
            degraded: resolution.degraded,
            reason: resolution.reason,
        });
        record.machine = Some(machine.clone());

        let devices = cancellable(cancel, self.machines.devices(&machine.base_url)).await?;
        let query = DeviceQuery::new(Some(hint.unwrap_or(&machine.device_id)), hint, Some(&action));
        let device = find_device(&devices, &query)
            .cloned()
            .ok_or_else(|| TollgateError::NoMatchingDevice {
                searched: query.describe(),
                action: action.to_string(),
            })?;
        tracing::info!(task = %record.id, device = %device.id, name = %device.name, "device selected");
        self.emit(TaskEvent::DeviceSelected {
            task_id: record.id.clone(),
            device_id: device.id.clone(),
            device_name: device.name.clone(),
        });
        record.device = Some(device.clone());

        let capabilities = cancellable(
            cancel,
            self.catalog
                .get_capabilities(&machine.base_url, Some(&device.id)),
        )
        .await?;
        let capability = find_matching_capability(&capabilities, &action)
            .cloned()
            .ok_or_else(|| no_capability(&action, &capabilities))?;
        self.emit(TaskEvent::CapabilitySelected {
            task_id: record.id.clone(),
            capability_id: capability.id.clone(),
            payment_required: capability.payment_required,
        });

        let mut params = intent.params;
        params.insert("device_id".into(), Value::String(device.id.clone()));
        params.insert("device_name".into(), Value::String(route_name(&device.id)));
        record.capability = Some(capability.clone());
        record.params = params.clone();

        let mode = self.payment_mode();
        let outcome = self
            .execute_tracking(record, &machine, &capability, &params, mode, cancel)
            .await?;

        match outcome {
            ExecutionOutcome::Completed(execution) => {
                if record.state != TaskState::Executing {
                    self.transition(record, TaskState::Executing);
                }
                record.tx_hash = execution.tx_hash;
                record.result_data = Some(execution.data);
                Ok(TaskState::Success)
            }
            ExecutionOutcome::PaymentRequired(details) => {
                tracing::info!(task = %record.id, amount = %details.amount, "awaiting payment authorization");
                self.emit(TaskEvent::QuoteIssued {
                    task_id: record.id.clone(),
                    details: details.clone(),
                });
                record.payment_details = Some(details);
                Ok(TaskState::Quote)
            }
        }
    }

    /// Run the gateway while mirroring its payment phases into `Executing`.
    async fn execute_tracking(
        &self,
        record: &mut TaskRecord,
        machine: &crate::core::Machine,
        capability: &crate::core::Capability,
        params: &Map<String, Value>,
        mode: PaymentMode,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let mut phases = self.gateway.subscribe();
        let execution = self.gateway.execute(machine, capability, params, mode, cancel);
        tokio::pin!(execution);
        loop {
            tokio::select! {
                result = &mut execution => return result,
                Ok(()) = phases.changed() => {
                    let phase = *phases.borrow_and_update();
                    if is_paying(phase) && record.state != TaskState::Executing {
                        self.transition(record, TaskState::Executing);
                    }
                }
            }
        }
    }

    async fn settle_quote(&self, record: &mut TaskRecord, cancel: &CancellationToken) -> Result<TaskState> {
        let (Some(machine), Some(capability), Some(details)) = (
            record.machine.clone(),
            record.capability.clone(),
            record.payment_details.clone(),
        ) else {
            return Err(TollgateError::NoPendingQuote);
        };
        self.transition(record, TaskState::Executing);

        let execution = self
            .gateway
            .pay_and_retry(&machine, &capability, &record.params, &details, cancel)
            .await?;
        record.tx_hash = execution.tx_hash;
        record.result_data = Some(execution.data);
        Ok(TaskState::Success)
    }

    fn payment_mode(&self) -> PaymentMode {
        if !self.attended_only && self.gateway.policy().state().enabled {
            PaymentMode::Autonomous
        } else {
            PaymentMode::Attended
        }
    }

    fn chat(&self, record: &mut TaskRecord, message: &str) -> TaskState {
        record.message = Some(message.to_string());
        self.emit(TaskEvent::Chat {
            task_id: record.id.clone(),
            message: message.to_string(),
        });
        TaskState::Idle
    }

    fn conclude(&self, mut record: TaskRecord, result: Result<TaskState>) -> Result<TaskRecord> {
        match result {
            Ok(state) => {
                record.state = state;
                if state == TaskState::Success {
                    tracing::info!(task = %record.id, tx_hash = record.tx_hash.as_deref().unwrap_or("-"), "task succeeded");
                    self.emit(TaskEvent::Completed {
                        task_id: record.id.clone(),
                        tx_hash: record.tx_hash.clone(),
                    });
                    self.archive(&record);
                }
                self.set_state(&record.id, state);
                self.store_current(&record);
                Ok(record)
            }
            Err(err) => {
                if let TollgateError::PaymentRejected { tx_hash, .. } = &err {
                    record.tx_hash = Some(tx_hash.clone());
                }
                record.state = TaskState::Error;
                record.error = Some(err.to_string());
                tracing::error!(task = %record.id, error = %err, "task failed");
                self.emit(TaskEvent::Failed {
                    task_id: record.id.clone(),
                    message: err.to_string(),
                });
                self.archive(&record);

                if matches!(err, TollgateError::Cancelled) {
                    self.set_state(&record.id, TaskState::Idle);
                    *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
                } else {
                    self.set_state(&record.id, TaskState::Error);
                    self.store_current(&record);
                }
                Err(err)
            }
        }
    }

    fn archive(&self, record: &TaskRecord) {
        if let Err(e) = self.history.push(record.to_history_entry()) {
            tracing::warn!(task = %record.id, error = %e, "failed to persist task history");
        }
    }

    fn begin(&self, cancel: &CancellationToken) -> Result<CancellationToken> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() || self.state().is_busy() {
            return Err(TollgateError::TaskInProgress);
        }
        let token = cancel.child_token();
        *active = Some(token.clone());
        Ok(token)
    }

    fn end(&self) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn take_quote(&self) -> Result<TaskRecord> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|r| r.state == TaskState::Quote) {
            current.take().ok_or(TollgateError::NoPendingQuote)
        } else {
            Err(TollgateError::NoPendingQuote)
        }
    }

    fn transition(&self, record: &mut TaskRecord, state: TaskState) {
        record.state = state;
        self.set_state(&record.id, state);
        self.store_current(record);
    }

    fn set_state(&self, task_id: &str, state: TaskState) {
        tracing::debug!(task = task_id, state = %state, "task state");
        self.state.send_replace(state);
        self.emit(TaskEvent::StateChanged {
            task_id: task_id.to_string(),
            state,
        });
    }

    fn store_current(&self, record: &TaskRecord) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.clone());
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn is_paying(phase: GatewayPhase) -> bool {
    matches!(
        phase,
        GatewayPhase::AuthorizingPayment
            | GatewayPhase::Paying
            | GatewayPhase::AwaitingConfirmation
            | GatewayPhase::Retrying
    )
}

fn no_capability(action: &Action, capabilities: &[crate::core::Capability]) -> TollgateError {
    TollgateError::NoMatchingCapability {
        action: action.to_string(),
        available: if capabilities.is_empty() {
            "none".to_string()
        } else {
            capabilities
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        },
    }
}

fn quote_request(record: &TaskRecord) -> Result<QuoteRequest> {
    match (&record.machine, &record.capability, &record.payment_details) {
        (Some(machine), Some(capability), Some(details)) => Ok(QuoteRequest {
            task_id: record.id.clone(),
            intent: record.intent.clone(),
            machine: machine.clone(),
            capability_id: capability.id.clone(),
            details: details.clone(),
        }),
        _ => Err(TollgateError::NoPendingQuote),
    }
}
