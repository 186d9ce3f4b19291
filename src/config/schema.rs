use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::Amount;
use crate::discovery::directory::MachineEntry;
use crate::error::{Result, TollgateError};

/// Name resolution must fail fast so the fallback chain runs inside the task.
pub const MAX_RESOLVER_TIMEOUT_SECS: u64 = 5;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base directory (`~/.tollgate`) - computed from home, not serialized
    #[serde(skip)]
    pub home_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub machine: MachineConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub wallet: WalletConfig,

    #[serde(default)]
    pub autonomy: AutonomyConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub intent: IntentConfig,

    #[serde(default = "default_machines")]
    pub machines: Vec<MachineEntry>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            log_level: default_log_level(),
            machine: MachineConfig::default(),
            resolver: ResolverConfig::default(),
            wallet: WalletConfig::default(),
            autonomy: AutonomyConfig::default(),
            storage: StorageConfig::default(),
            telemetry: TelemetryConfig::default(),
            intent: IntentConfig::default(),
            machines: default_machines(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.machine.default_url.trim().is_empty() {
            return Err(invalid("machine.default_url must not be empty"));
        }
        url::Url::parse(&self.machine.default_url)
            .map_err(|e| invalid(format!("machine.default_url is not a valid URL: {e}")))?;
        if self.wallet.wallet_rpc_url.is_some() && self.wallet.rpc_urls.is_empty() {
            return Err(invalid("wallet.rpc_urls must list at least one endpoint when wallet_rpc_url is set"));
        }
        if self.wallet.confirmation_poll_ms == 0 {
            return Err(invalid("wallet.confirmation_poll_ms must be greater than zero"));
        }
        if self.autonomy.max_auto_pay_amount.is_zero() {
            return Err(invalid("autonomy.max_auto_pay_amount must be greater than zero"));
        }
        if self.storage.history_limit == 0 {
            return Err(invalid("storage.history_limit must be greater than zero"));
        }
        if self.telemetry.poll_interval_secs == 0 {
            return Err(invalid("telemetry.poll_interval_secs must be greater than zero"));
        }
        if let Some(url) = &self.intent.parser_url {
            url::Url::parse(url)
                .map_err(|e| invalid(format!("intent.parser_url is not a valid URL: {e}")))?;
        }
        for entry in &self.machines {
            if entry.id.trim().is_empty() {
                return Err(invalid("machines entries require a non-empty id"));
            }
        }
        Ok(())
    }

    /// Directory holding persisted key/value state.
    pub fn state_dir(&self) -> PathBuf {
        match &self.storage.state_dir {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            None => self.home_dir.join("state"),
        }
    }
}

fn invalid(message: impl Into<String>) -> TollgateError {
    TollgateError::Config(message.into())
}

// ── Machine transport ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default = "default_machine_url")]
    pub default_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_machine_url() -> String {
    "http://localhost:8000".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            default_url: default_machine_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Name resolution ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolver endpoint; defaults to the machine URL when unset
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_payment_address")]
    pub default_payment_address: String,
}

fn default_resolver_timeout_secs() -> u64 {
    MAX_RESOLVER_TIMEOUT_SECS
}

fn default_payment_address() -> String {
    "0x0000000000000000000000000000000000000000".into()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_resolver_timeout_secs(),
            default_payment_address: default_payment_address(),
        }
    }
}

impl ResolverConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(1, MAX_RESOLVER_TIMEOUT_SECS))
    }
}

// ── Wallet / chain ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// JSON-RPC endpoint holding the signing key (`eth_sendTransaction`)
    #[serde(default)]
    pub wallet_rpc_url: Option<String>,
    /// Account that pays
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Ordered fallback list for read-only calls (balance, receipts)
    #[serde(default = "default_rpc_urls")]
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_gas_reserve")]
    pub gas_reserve: Amount,
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,
    #[serde(default)]
    pub proof_grace_period_ms: u64,
}

fn default_chain_id() -> u64 {
    84_532
}

fn default_rpc_urls() -> Vec<String> {
    vec![
        "https://sepolia.base.org".into(),
        "https://base-sepolia-rpc.publicnode.com".into(),
    ]
}

fn default_gas_reserve() -> Amount {
    Amount::from_wei(100_000_000_000_000)
}

fn default_confirmation_poll_ms() -> u64 {
    2_000
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            wallet_rpc_url: None,
            wallet_address: None,
            rpc_urls: default_rpc_urls(),
            gas_reserve: default_gas_reserve(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
            proof_grace_period_ms: 0,
        }
    }
}

// ── Autonomy ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Ceiling for a single unattended payment
    #[serde(default = "default_max_auto_pay_amount")]
    pub max_auto_pay_amount: Amount,
    #[serde(default = "default_daily_limit")]
    pub default_daily_limit: Amount,
}

fn default_max_auto_pay_amount() -> Amount {
    Amount::from_wei(50_000_000_000_000_000)
}

fn default_daily_limit() -> Amount {
    Amount::from_wei(100_000_000_000_000_000)
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            max_auto_pay_amount: default_max_auto_pay_amount(),
            default_daily_limit: default_daily_limit(),
        }
    }
}

// ── Storage / telemetry ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_history_limit() -> usize {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

// ── Intent parsing ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    /// Remote parser endpoint; keyword matching is used when unset
    #[serde(default)]
    pub parser_url: Option<String>,
    #[serde(default = "default_intent_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_intent_timeout_secs() -> u64 {
    15
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            parser_url: None,
            timeout_secs: default_intent_timeout_secs(),
        }
    }
}

fn default_machines() -> Vec<MachineEntry> {
    [
        ("smart-lock", "Smart Lock", "smart_lock", "smartlock.eth"),
        ("3d-printer", "3D Printer", "3d_printer", "3dprinter.eth"),
        ("ev-charger", "EV Charger", "ev_charger", "evcharger.eth"),
        ("vending-machine", "Vending Machine", "vending_machine", "vendingmachine.eth"),
    ]
    .into_iter()
    .map(|(id, name, device_type, domain)| MachineEntry {
        id: id.into(),
        name: name.into(),
        description: String::new(),
        device_type: Some(device_type.into()),
        name_domain: Some(domain.into()),
        url: None,
        device_id: None,
    })
    .collect()
}
