//! Daily spend cap for autonomous payments.
//!
//! One `SpendPolicy` is owned per session and shared behind an `Arc`. All
//! reads and writes of the counters go through a single mutex; the day
//! rollover runs inside the same critical section as every check, so a
//! boundary crossing always zeroes `daily_spent` before the limit is
//! compared. Every mutation is persisted and published on a `watch` channel.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::core::Amount;
use crate::error::{Result, TollgateError};
use crate::storage::{KeyValueStore, load_json, save_json};

pub const SPEND_POLICY_KEY: &str = "spend_policy";
/// Limit-only blob written by older builds.
pub const LEGACY_LIMIT_KEY: &str = "autonomous_limit";
pub const STATE_VERSION: u32 = 1;

// ── Clock ────────────────────────────────────────────────────────

/// Source of the current UTC date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Settable clock for simulating day boundaries.
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = today.checked_add_days(chrono::Days::new(days)) {
            *today = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── State ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendPolicyState {
    #[serde(default)]
    pub version: u32,
    pub enabled: bool,
    pub daily_limit: Amount,
    pub last_reset_date: NaiveDate,
    pub daily_spent: Amount,
    #[serde(default)]
    pub allowance_granted: bool,
}

impl SpendPolicyState {
    pub fn new(daily_limit: Amount, today: NaiveDate) -> Self {
        Self {
            version: STATE_VERSION,
            enabled: false,
            daily_limit,
            last_reset_date: today,
            daily_spent: Amount::ZERO,
            allowance_granted: false,
        }
    }

    pub fn remaining(&self) -> Amount {
        self.daily_limit.saturating_sub(self.daily_spent)
    }

    /// Zero the counter when `today` is later than the last reset. The
    /// reset date never moves backwards.
    fn rollover(&mut self, today: NaiveDate) -> bool {
        if today > self.last_reset_date {
            self.last_reset_date = today;
            self.daily_spent = Amount::ZERO;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Ledger {
    state: SpendPolicyState,
    /// Amounts checked but not yet committed or released.
    reserved: Amount,
}

impl Ledger {
    fn headroom(&self) -> Amount {
        self.state
            .daily_limit
            .saturating_sub(self.state.daily_spent.saturating_add(self.reserved))
    }
}

// ── Policy ───────────────────────────────────────────────────────

pub struct SpendPolicy {
    ledger: Mutex<Ledger>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    updates: watch::Sender<SpendPolicyState>,
}

impl std::fmt::Debug for SpendPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("SpendPolicy")
            .field("state", &ledger.state)
            .field("reserved", &ledger.reserved)
            .finish_non_exhaustive()
    }
}

impl SpendPolicy {
    /// Load persisted state, importing the legacy limit blob or falling back
    /// to defaults when nothing usable is stored.
    pub fn load(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        default_limit: Amount,
    ) -> Result<Self> {
        let today = clock.today();
        let mut state = load_state(store.as_ref(), default_limit, today)?;
        let rolled = state.rollover(today);

        let (updates, _) = watch::channel(state.clone());
        let policy = Self {
            ledger: Mutex::new(Ledger {
                state,
                reserved: Amount::ZERO,
            }),
            store,
            clock,
            updates,
        };
        if rolled {
            let ledger = policy.lock();
            policy.persist(&ledger.state)?;
        }
        Ok(policy)
    }

    pub fn in_memory(default_limit: Amount) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let state = SpendPolicyState::new(default_limit, clock.today());
        let (updates, _) = watch::channel(state.clone());
        Self {
            ledger: Mutex::new(Ledger {
                state,
                reserved: Amount::ZERO,
            }),
            store: Arc::new(crate::storage::MemoryStore::new()),
            clock,
            updates,
        }
    }

    /// Snapshot of the counters after applying any pending rollover.
    pub fn state(&self) -> SpendPolicyState {
        let mut ledger = self.lock();
        self.rollover_logged(&mut ledger);
        ledger.state.clone()
    }

    pub fn remaining(&self) -> Amount {
        let mut ledger = self.lock();
        self.rollover_logged(&mut ledger);
        ledger.headroom()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpendPolicyState> {
        self.updates.subscribe()
    }

    pub fn can_spend(&self, amount: Amount) -> bool {
        let mut ledger = self.lock();
        self.rollover_logged(&mut ledger);
        ledger.state.enabled && amount <= ledger.headroom()
    }

    /// Unconditionally add to today's counter.
    pub fn record_spend(&self, amount: Amount) -> Result<()> {
        let mut ledger = self.lock();
        ledger.state.rollover(self.clock.today());
        ledger.state.daily_spent = ledger.state.daily_spent.saturating_add(amount);
        tracing::info!(
            amount = %amount,
            daily_spent = %ledger.state.daily_spent,
            daily_limit = %ledger.state.daily_limit,
            "spend recorded"
        );
        self.persist(&ledger.state)
    }

    /// Rollover, limit check and reservation in one critical section.
    /// The reservation holds budget until it is committed or dropped.
    pub fn check_and_reserve(&self, amount: Amount) -> Result<SpendReservation<'_>> {
        let mut ledger = self.lock();
        self.rollover_logged(&mut ledger);

        let headroom = ledger.headroom();
        if !ledger.state.enabled || amount > headroom {
            return Err(TollgateError::SpendLimitExceeded {
                requested: amount,
                remaining: if ledger.state.enabled {
                    headroom
                } else {
                    Amount::ZERO
                },
            });
        }
        ledger.reserved = ledger.reserved.saturating_add(amount);
        tracing::debug!(amount = %amount, reserved = %ledger.reserved, "spend reserved");

        Ok(SpendReservation {
            policy: self,
            amount,
            committed: false,
        })
    }

    /// Turn autonomous mode on. Native-asset payments need no separate
    /// approval step, so the allowance is granted at the same time.
    pub fn enable(&self, daily_limit: Amount) -> Result<()> {
        let mut ledger = self.lock();
        ledger.state.rollover(self.clock.today());
        ledger.state.enabled = true;
        ledger.state.daily_limit = daily_limit;
        ledger.state.allowance_granted = true;
        tracing::info!(daily_limit = %daily_limit, "autonomous mode enabled");
        self.persist(&ledger.state)
    }

    pub fn disable(&self) -> Result<()> {
        let mut ledger = self.lock();
        ledger.state.enabled = false;
        tracing::info!("autonomous mode disabled");
        self.persist(&ledger.state)
    }

    fn commit(&self, amount: Amount) -> Result<()> {
        let mut ledger = self.lock();
        ledger.reserved = ledger.reserved.saturating_sub(amount);
        ledger.state.rollover(self.clock.today());
        ledger.state.daily_spent = ledger.state.daily_spent.saturating_add(amount);
        tracing::info!(
            amount = %amount,
            daily_spent = %ledger.state.daily_spent,
            daily_limit = %ledger.state.daily_limit,
            "autonomous spend committed"
        );
        self.persist(&ledger.state)
    }

    fn release(&self, amount: Amount) {
        let mut ledger = self.lock();
        ledger.reserved = ledger.reserved.saturating_sub(amount);
        tracing::debug!(amount = %amount, "spend reservation released");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rollover_logged(&self, ledger: &mut Ledger) {
        if ledger.state.rollover(self.clock.today()) {
            tracing::info!(date = %ledger.state.last_reset_date, "daily spend reset");
            if let Err(e) = self.persist(&ledger.state) {
                tracing::warn!(error = %e, "failed to persist spend reset");
            }
        }
    }

    fn persist(&self, state: &SpendPolicyState) -> Result<()> {
        self.updates.send_replace(state.clone());
        save_json(self.store.as_ref(), SPEND_POLICY_KEY, state)
    }
}

/// Budget held by a pending autonomous payment.
#[must_use = "dropping a reservation releases it"]
#[derive(Debug)]
pub struct SpendReservation<'a> {
    policy: &'a SpendPolicy,
    amount: Amount,
    committed: bool,
}

impl SpendReservation<'_> {
    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Count the reserved amount as spent.
    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.policy.commit(self.amount)
    }
}

impl Drop for SpendReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.policy.release(self.amount);
        }
    }
}

fn load_state(
    store: &dyn KeyValueStore,
    default_limit: Amount,
    today: NaiveDate,
) -> Result<SpendPolicyState> {
    match load_json::<Value>(store, SPEND_POLICY_KEY) {
        Ok(Some(raw)) => {
            let version = raw.get("version").and_then(Value::as_u64).unwrap_or(0);
            if version != u64::from(STATE_VERSION) {
                tracing::warn!(version, "unsupported spend policy version, using defaults");
                return Ok(SpendPolicyState::new(default_limit, today));
            }
            match serde_json::from_value::<SpendPolicyState>(raw) {
                Ok(state) => return Ok(state),
                Err(e) => {
                    tracing::warn!(error = %e, "spend policy state unreadable, using defaults");
                    return Ok(SpendPolicyState::new(default_limit, today));
                }
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "spend policy state unreadable, using defaults");
            return Ok(SpendPolicyState::new(default_limit, today));
        }
    }

    match load_json::<Amount>(store, LEGACY_LIMIT_KEY) {
        Ok(Some(limit)) => {
            tracing::info!(daily_limit = %limit, "imported legacy autonomous limit");
            Ok(SpendPolicyState::new(limit, today))
        }
        Ok(None) => Ok(SpendPolicyState::new(default_limit, today)),
        Err(e) => {
            tracing::warn!(error = %e, "legacy autonomous limit unreadable, ignoring");
            Ok(SpendPolicyState::new(default_limit, today))
        }
    }
}
