//! x402 handshake: call, pay on 402, retry once with proof.
//!
//! ```text
//! Idle → Requesting → Success
//!                   → PaymentRequired → (surface quote)
//!                                     → AuthorizingPayment → Paying
//!                                       → AwaitingConfirmation → Retrying → Success
//! any step → Error
//! ```
//!
//! Autonomous payments are validated against the per-transaction ceiling
//! and then reserved on the `SpendPolicy` in one step. A payment a human
//! authorized goes through `pay_and_retry` and is not counted against the
//! autonomous budget. Spend is committed as soon as the transfer is
//! submitted, since it cannot be recalled after that.

use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::policy::{SpendPolicy, SpendReservation};
use super::wallet::{BalanceSource, ConfirmationWatcher, PaymentSigner};
use crate::core::{Amount, Capability, Machine, PaymentDetails};
use crate::discovery::client::{InvocationResponse, MachineClient};
use crate::error::{Result, TollgateError, WalletError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GatewayPhase {
    Idle,
    Requesting,
    PaymentRequired,
    AuthorizingPayment,
    Paying,
    AwaitingConfirmation,
    Retrying,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// Pay without asking when the spend policy allows it.
    Autonomous,
    /// Always surface payment terms for a human to authorize.
    Attended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub data: Value,
    pub tx_hash: Option<String>,
    pub paid: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Completed(Execution),
    /// Not an error: the caller must obtain authorization and call
    /// `pay_and_retry`.
    PaymentRequired(PaymentDetails),
}

pub struct PaymentGateway {
    client: MachineClient,
    policy: Arc<SpendPolicy>,
    signer: Arc<dyn PaymentSigner>,
    watcher: Arc<dyn ConfirmationWatcher>,
    balance: Option<Arc<dyn BalanceSource>>,
    max_auto_pay: Amount,
    gas_reserve: Amount,
    proof_grace: Duration,
    phase: watch::Sender<GatewayPhase>,
}

impl std::fmt::Debug for PaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateway")
            .field("phase", &*self.phase.borrow())
            .field("max_auto_pay", &self.max_auto_pay)
            .field("gas_reserve", &self.gas_reserve)
            .field("has_balance_source", &self.balance.is_some())
            .finish_non_exhaustive()
    }
}

impl PaymentGateway {
    pub fn new(
        client: MachineClient,
        policy: Arc<SpendPolicy>,
        signer: Arc<dyn PaymentSigner>,
        watcher: Arc<dyn ConfirmationWatcher>,
    ) -> Self {
        let (phase, _) = watch::channel(GatewayPhase::Idle);
        Self {
            client,
            policy,
            signer,
            watcher,
            balance: None,
            max_auto_pay: Amount::from_wei(u128::MAX),
            gas_reserve: Amount::ZERO,
            proof_grace: Duration::ZERO,
            phase,
        }
    }

    #[must_use]
    pub fn with_balance_source(mut self, source: Arc<dyn BalanceSource>, gas_reserve: Amount) -> Self {
        self.balance = Some(source);
        self.gas_reserve = gas_reserve;
        self
    }

    #[must_use]
    pub fn with_max_auto_pay(mut self, ceiling: Amount) -> Self {
        self.max_auto_pay = ceiling;
        self
    }

    /// Delay between confirmation and the proof retry, for servers that
    /// index transactions with some lag.
    #[must_use]
    pub fn with_proof_grace(mut self, grace: Duration) -> Self {
        self.proof_grace = grace;
        self
    }

    pub fn phase(&self) -> GatewayPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<GatewayPhase> {
        self.phase.subscribe()
    }

    pub fn policy(&self) -> &Arc<SpendPolicy> {
        &self.policy
    }

    pub async fn execute(
        &self,
        machine: &Machine,
        capability: &Capability,
        params: &Map<String, Value>,
        mode: PaymentMode,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let result = self
            .execute_inner(machine, capability, params, mode, cancel)
            .await;
        self.finish(&result);
        result
    }

    /// Settle a quote a human authorized, then retry with proof.
    pub async fn pay_and_retry(
        &self,
        machine: &Machine,
        capability: &Capability,
        params: &Map<String, Value>,
        details: &PaymentDetails,
        cancel: &CancellationToken,
    ) -> Result<Execution> {
        self.set_phase(GatewayPhase::AuthorizingPayment);
        let result = self
            .settle(machine, capability, params, details, None, cancel)
            .await;
        match &result {
            Ok(_) => self.set_phase(GatewayPhase::Success),
            Err(_) => self.set_phase(GatewayPhase::Error),
        }
        result
    }

    async fn execute_inner(
        &self,
        machine: &Machine,
        capability: &Capability,
        params: &Map<String, Value>,
        mode: PaymentMode,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        self.set_phase(GatewayPhase::Requesting);
        let response = cancellable(
            cancel,
            self.client.invoke(&machine.base_url, capability, params, None),
        )
        .await?;

        if is_success(response.status) {
            tracing::info!(capability = %capability.id, url = %response.url, "capability executed");
            return Ok(ExecutionOutcome::Completed(Execution {
                data: response.body,
                tx_hash: None,
                paid: None,
            }));
        }
        if response.status != 402 {
            return Err(unexpected(response));
        }

        self.set_phase(GatewayPhase::PaymentRequired);
        let details = parse_payment_details(&response.body, capability).ok_or_else(|| {
            TollgateError::Http(format!(
                "{}: 402 response carried no payment details",
                response.url
            ))
        })?;
        tracing::info!(
            capability = %capability.id,
            amount = %details.amount,
            recipient = %details.recipient_address,
            "payment required"
        );

        if mode == PaymentMode::Attended {
            return Ok(ExecutionOutcome::PaymentRequired(details));
        }
        if details.amount > self.max_auto_pay {
            tracing::info!(
                amount = %details.amount,
                ceiling = %self.max_auto_pay,
                "amount above autonomous ceiling, asking for authorization"
            );
            return Ok(ExecutionOutcome::PaymentRequired(details));
        }
        let reservation = match self.policy.check_and_reserve(details.amount) {
            Ok(reservation) => reservation,
            Err(TollgateError::SpendLimitExceeded {
                requested,
                remaining,
            }) => {
                tracing::info!(
                    requested = %requested,
                    remaining = %remaining,
                    "spend limit would be exceeded, asking for authorization"
                );
                return Ok(ExecutionOutcome::PaymentRequired(details));
            }
            Err(err) => return Err(err),
        };

        self.set_phase(GatewayPhase::AuthorizingPayment);
        self.settle(machine, capability, params, &details, Some(reservation), cancel)
            .await
            .map(ExecutionOutcome::Completed)
    }

    async fn settle(
        &self,
        machine: &Machine,
        capability: &Capability,
        params: &Map<String, Value>,
        details: &PaymentDetails,
        reservation: Option<SpendReservation<'_>>,
        cancel: &CancellationToken,
    ) -> Result<Execution> {
        let amount = details.amount;
        let recipient = if details.recipient_address.trim().is_empty() {
            machine.payment_address.as_str()
        } else {
            details.recipient_address.as_str()
        };

        if let Some(source) = &self.balance {
            self.check_balance(source.as_ref(), amount, cancel).await?;
        }

        self.set_phase(GatewayPhase::Paying);
        // Not raced against the token: a submitted transfer is always committed.
        let tx_hash = match self.signer.send_transaction(recipient, amount).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => return Err(self.send_failure(err, amount).await),
        };

        if let Some(reservation) = reservation {
            if let Err(err) = reservation.commit() {
                tracing::warn!(tx_hash = %tx_hash, error = %err, "failed to persist committed spend");
            }
        }
        if cancel.is_cancelled() {
            tracing::warn!(tx_hash = %tx_hash, "cancelled after submission, spend kept");
            return Err(TollgateError::Cancelled);
        }

        self.set_phase(GatewayPhase::AwaitingConfirmation);
        cancellable(cancel, async {
            self.watcher
                .wait_for_confirmation(&tx_hash)
                .await
                .map_err(TollgateError::from)
        })
        .await?;

        if !self.proof_grace.is_zero() {
            cancellable(cancel, async {
                tokio::time::sleep(self.proof_grace).await;
                Ok::<_, TollgateError>(())
            })
            .await?;
        }

        self.set_phase(GatewayPhase::Retrying);
        let response = cancellable(
            cancel,
            self.client
                .invoke(&machine.base_url, capability, params, Some(&tx_hash)),
        )
        .await?;

        if !is_success(response.status) {
            tracing::error!(
                tx_hash = %tx_hash,
                status = response.status,
                "payment proof rejected"
            );
            return Err(TollgateError::PaymentRejected {
                status: response.status,
                tx_hash,
                body: body_text(&response.body),
            });
        }

        tracing::info!(capability = %capability.id, tx_hash = %tx_hash, amount = %amount, "paid capability executed");
        Ok(Execution {
            data: response.body,
            tx_hash: Some(tx_hash),
            paid: Some(amount),
        })
    }

    async fn check_balance(
        &self,
        source: &dyn BalanceSource,
        amount: Amount,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let required = amount.saturating_add(self.gas_reserve);
        let lookup = cancellable(cancel, async {
            source.balance().await.map_err(TollgateError::from)
        })
        .await;
        match lookup {
            Ok(available) if available < required => {
                Err(TollgateError::InsufficientFunds {
                    required,
                    available,
                })
            }
            Ok(_) => Ok(()),
            Err(TollgateError::Cancelled) => Err(TollgateError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, "balance lookup failed, proceeding with payment");
                Ok(())
            }
        }
    }

    /// A node-side insufficient-funds rejection is reported with amounts
    /// when the balance can be read.
    async fn send_failure(&self, err: WalletError, amount: Amount) -> TollgateError {
        if !matches!(err, WalletError::InsufficientBalance { .. }) {
            return err.into();
        }
        let Some(source) = &self.balance else {
            return err.into();
        };
        match source.balance().await {
            Ok(available) => TollgateError::InsufficientFunds {
                required: amount.saturating_add(self.gas_reserve),
                available,
            },
            Err(lookup) => {
                tracing::warn!(error = %lookup, "balance lookup after rejected send failed");
                err.into()
            }
        }
    }

    fn finish(&self, result: &Result<ExecutionOutcome>) {
        match result {
            Ok(ExecutionOutcome::Completed(_)) => self.set_phase(GatewayPhase::Success),
            Ok(ExecutionOutcome::PaymentRequired(_)) => {
                self.set_phase(GatewayPhase::PaymentRequired);
            }
            Err(_) => self.set_phase(GatewayPhase::Error),
        }
    }

    fn set_phase(&self, phase: GatewayPhase) {
        tracing::debug!(phase = %phase, "gateway phase");
        self.phase.send_replace(phase);
    }
}

/// Race `fut` against the token.
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TollgateError::Cancelled),
        result = fut => result,
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn unexpected(response: InvocationResponse) -> TollgateError {
    TollgateError::UnexpectedStatus {
        status: response.status,
        url: response.url,
        body: body_text(&response.body),
    }
}

fn body_text(body: &Value) -> String {
    match body {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Payment terms sit under `detail.paymentDetails` or `paymentDetails`.
/// A missing amount is taken from the capability's advertised default.
pub fn parse_payment_details(body: &Value, capability: &Capability) -> Option<PaymentDetails> {
    let raw = body
        .get("detail")
        .and_then(|d| d.get("paymentDetails"))
        .or_else(|| body.get("paymentDetails"))?;
    let mut object = raw.as_object()?.clone();
    if !object.contains_key("amount") {
        let default = capability.default_amount?;
        object.insert("amount".into(), Value::String(default.to_string()));
    }
    match serde_json::from_value(Value::Object(object)) {
        Ok(details) => Some(details),
        Err(e) => {
            tracing::warn!(error = %e, "malformed payment details");
            None
        }
    }
}
