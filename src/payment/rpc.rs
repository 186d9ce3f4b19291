//! Minimal JSON-RPC 2.0 client for an EVM-compatible chain.
//!
//! Read-only calls walk an ordered list of endpoints until one answers.
//! Transaction submission goes to exactly one endpoint and is never retried.

use reqwest::Client;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::Amount;
use crate::error::WalletError;

#[derive(Debug)]
pub struct JsonRpcClient {
    client: Client,
    endpoints: Vec<String>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client, endpoints)
    }

    pub fn with_client(client: Client, endpoints: Vec<String>) -> Self {
        Self {
            client,
            endpoints,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Try each endpoint in order. An RPC-level error is an answer and is
    /// returned as-is; only transport failures move on to the next endpoint.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let mut attempts = 0;
        let mut last = String::from("(none configured)");
        for endpoint in &self.endpoints {
            attempts += 1;
            match self.call_endpoint(endpoint, method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(err @ WalletError::Rpc { .. }) => return Err(err),
                Err(err) => {
                    tracing::warn!(endpoint = %endpoint, method, error = %err, "rpc endpoint failed");
                    last.clone_from(endpoint);
                }
            }
        }
        Err(WalletError::AllEndpointsFailed { attempts, last })
    }

    /// Call the first endpoint only.
    pub async fn call_once(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        let endpoint = self
            .endpoints
            .first()
            .ok_or_else(|| WalletError::AllEndpointsFailed {
                attempts: 0,
                last: "(none configured)".into(),
            })?;
        self.call_endpoint(endpoint, method, params).await
    }

    async fn call_endpoint(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
    ) -> Result<Value, WalletError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::Transport(format!("{endpoint}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::Transport(format!(
                "{endpoint} returned status {status}"
            )));
        }
        let value: Value = response
            .json()
            .await
            .map_err(|e| WalletError::Transport(format!("{endpoint}: malformed response: {e}")))?;

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(WalletError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// `0x`-prefixed hex quantity → wei.
pub fn parse_quantity(raw: &str) -> Result<Amount, WalletError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| WalletError::Transport(format!("quantity {raw:?} must be 0x-prefixed")))?;
    if digits.is_empty() {
        return Ok(Amount::ZERO);
    }
    u128::from_str_radix(digits, 16)
        .map(Amount::from_wei)
        .map_err(|e| WalletError::Transport(format!("quantity {raw:?} is not valid hex: {e}")))
}

pub fn to_quantity(amount: Amount) -> String {
    format!("0x{:x}", amount.wei())
}

pub fn normalize_address(raw: &str) -> Result<String, WalletError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let valid = trimmed
        .strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .is_some_and(|bytes| bytes.len() == 20);
    if valid {
        Ok(trimmed)
    } else {
        Err(WalletError::Rejected(format!(
            "{raw:?} is not a 0x-prefixed 20-byte address"
        )))
    }
}

pub fn normalize_tx_hash(raw: &str) -> Result<String, WalletError> {
    let trimmed = raw.trim().to_ascii_lowercase();
    let valid = trimmed
        .strip_prefix("0x")
        .and_then(|digits| hex::decode(digits).ok())
        .is_some_and(|bytes| bytes.len() == 32);
    if valid {
        Ok(trimmed)
    } else {
        Err(WalletError::Transport(format!(
            "{raw:?} is not a 32-byte transaction hash"
        )))
    }
}
