use thiserror::Error;

use crate::core::amount::Amount;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Tollgate`.
///
/// Task-level variants abort an orchestrator run and are surfaced verbatim to
/// the caller. Component-local failures (name resolution, a single fallback
/// RPC endpoint) are absorbed before they ever become one of these.
#[derive(Debug, Error)]
pub enum TollgateError {
    // ── Discovery ───────────────────────────────────────────────────────
    /// Carried as a reason string on `Resolution`; `resolve` never returns it.
    #[error("name resolution degraded: {0}")]
    ResolutionDegraded(String),

    #[error("capability catalog unavailable at {url}: {message}")]
    CatalogUnavailable { url: String, message: String },

    #[error("no matching device for {searched:?} (action: {action})")]
    NoMatchingDevice { searched: String, action: String },

    #[error("no matching capability for action {action} (available: {available})")]
    NoMatchingCapability { action: String, available: String },

    #[error("no machine in the directory can serve action {action}")]
    NoMachine { action: String },

    // ── Payment ─────────────────────────────────────────────────────────
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("payment proof {tx_hash} rejected with status {status}: {body}")]
    PaymentRejected {
        status: u16,
        tx_hash: String,
        body: String,
    },

    #[error("spend limit exceeded: requested {requested}, remaining {remaining}")]
    SpendLimitExceeded { requested: Amount, remaining: Amount },

    #[error("payment authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("wallet: {0}")]
    Wallet(WalletError),

    #[error("invalid amount {raw:?}: {reason}")]
    InvalidAmount { raw: String, reason: String },

    // ── Transport ───────────────────────────────────────────────────────
    #[error("network timeout talking to {endpoint}")]
    NetworkTimeout { endpoint: String },

    #[error("unexpected status {status} from {url}: {body}")]
    UnexpectedStatus {
        status: u16,
        url: String,
        body: String,
    },

    #[error("http: {0}")]
    Http(String),

    // ── Local state ─────────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(String),

    #[error("config: {0}")]
    Config(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("no task awaiting payment authorization")]
    NoPendingQuote,

    #[error("a task is already running")]
    TaskInProgress,

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TollgateError {
    pub(crate) fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::NetworkTimeout {
                endpoint: url.to_string(),
            }
        } else {
            Self::Http(format!("{url}: {err}"))
        }
    }
}

// ─── Wallet errors ───────────────────────────────────────────────────────────

/// Failures raised by the injected payment primitive.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient balance in {address} to send {value}")]
    InsufficientBalance { address: String, value: Amount },

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport: {0}")]
    Transport(String),

    #[error("no rpc endpoint answered ({attempts} tried, last {last})")]
    AllEndpointsFailed { attempts: usize, last: String },

    #[error("confirmation failed for {tx_hash}: {reason}")]
    Confirmation { tx_hash: String, reason: String },
}

/// Exhausting every RPC endpoint is a network timeout at task level.
impl From<WalletError> for TollgateError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::AllEndpointsFailed { last, .. } => Self::NetworkTimeout { endpoint: last },
            other => Self::Wallet(other),
        }
    }
}

pub type Result<T, E = TollgateError> = std::result::Result<T, E>;
