//! Injected payment primitives.
//!
//! The gateway only needs to submit a native-asset transfer, wait for it to
//! be mined and (optionally) read the paying account's balance. Transaction
//! construction and signing belong to whatever sits behind these traits.

use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::rpc::{JsonRpcClient, normalize_address, normalize_tx_hash, parse_quantity, to_quantity};
use crate::config::WalletConfig;
use crate::core::Amount;
use crate::error::WalletError;

pub type WalletFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, WalletError>> + Send + 'a>>;

pub trait PaymentSigner: Send + Sync {
    /// Submit a transfer and return its transaction hash. Returns on
    /// submission, not confirmation.
    fn send_transaction<'a>(&'a self, to: &'a str, amount: Amount) -> WalletFuture<'a, String>;
}

pub trait ConfirmationWatcher: Send + Sync {
    /// Resolve once the transaction is mined. Owns its own timeout, if any.
    fn wait_for_confirmation<'a>(&'a self, tx_hash: &'a str) -> WalletFuture<'a, ()>;
}

pub trait BalanceSource: Send + Sync {
    fn balance(&self) -> WalletFuture<'_, Amount>;
}

/// Stand-in used when no wallet is configured; every payment is refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWallet;

impl PaymentSigner for NoWallet {
    fn send_transaction<'a>(&'a self, _to: &'a str, _amount: Amount) -> WalletFuture<'a, String> {
        Box::pin(async {
            Err(WalletError::Rejected(
                "no wallet configured (set wallet.wallet_rpc_url and wallet.wallet_address)".into(),
            ))
        })
    }
}

impl ConfirmationWatcher for NoWallet {
    fn wait_for_confirmation<'a>(&'a self, tx_hash: &'a str) -> WalletFuture<'a, ()> {
        Box::pin(async move {
            Err(WalletError::Confirmation {
                tx_hash: tx_hash.to_string(),
                reason: "no wallet configured".into(),
            })
        })
    }
}

/// Wallet backed by JSON-RPC: `eth_sendTransaction` against an endpoint
/// that holds the key, reads against the chain fallback list.
#[derive(Debug)]
pub struct RpcWallet {
    signer: JsonRpcClient,
    chain: JsonRpcClient,
    from: String,
    poll_interval: Duration,
}

impl RpcWallet {
    pub fn new(
        signer: JsonRpcClient,
        chain: JsonRpcClient,
        from: &str,
        poll_interval: Duration,
    ) -> Result<Self, WalletError> {
        Ok(Self {
            signer,
            chain,
            from: normalize_address(from)?,
            poll_interval,
        })
    }

    /// `None` when the config names no signing endpoint or account.
    pub fn from_config(config: &WalletConfig) -> Result<Option<Self>, WalletError> {
        let (Some(wallet_url), Some(address)) = (&config.wallet_rpc_url, &config.wallet_address)
        else {
            return Ok(None);
        };
        let timeout = Duration::from_secs(30);
        let wallet = Self::new(
            JsonRpcClient::new(vec![wallet_url.clone()], timeout),
            JsonRpcClient::new(config.rpc_urls.clone(), timeout),
            address,
            Duration::from_millis(config.confirmation_poll_ms),
        )?;
        Ok(Some(wallet))
    }

    pub fn address(&self) -> &str {
        &self.from
    }
}

impl PaymentSigner for RpcWallet {
    fn send_transaction<'a>(&'a self, to: &'a str, amount: Amount) -> WalletFuture<'a, String> {
        Box::pin(async move {
            let to = normalize_address(to)?;
            let params = json!([{
                "from": self.from,
                "to": to,
                "value": to_quantity(amount),
            }]);
            let result = self
                .signer
                .call_once("eth_sendTransaction", params)
                .await
                .map_err(|err| classify_send_error(err, &self.from, amount))?;
            let hash = result.as_str().ok_or_else(|| {
                WalletError::Transport("eth_sendTransaction returned no hash".into())
            })?;
            let hash = normalize_tx_hash(hash)?;
            tracing::info!(tx_hash = %hash, to = %to, amount = %amount, "transaction submitted");
            Ok(hash)
        })
    }
}

impl ConfirmationWatcher for RpcWallet {
    fn wait_for_confirmation<'a>(&'a self, tx_hash: &'a str) -> WalletFuture<'a, ()> {
        Box::pin(async move {
            loop {
                match self
                    .chain
                    .call("eth_getTransactionReceipt", json!([tx_hash]))
                    .await
                {
                    Ok(Value::Null) => {}
                    Ok(receipt) => return receipt_outcome(tx_hash, &receipt),
                    Err(err @ WalletError::AllEndpointsFailed { .. }) => {
                        tracing::warn!(tx_hash, error = %err, "receipt lookup failed, polling again");
                    }
                    Err(err) => return Err(err),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        })
    }
}

impl BalanceSource for RpcWallet {
    fn balance(&self) -> WalletFuture<'_, Amount> {
        Box::pin(async move {
            let result = self
                .chain
                .call("eth_getBalance", json!([self.from, "latest"]))
                .await?;
            let raw = result
                .as_str()
                .ok_or_else(|| WalletError::Transport("eth_getBalance returned no value".into()))?;
            parse_quantity(raw)
        })
    }
}

fn receipt_outcome(tx_hash: &str, receipt: &Value) -> Result<(), WalletError> {
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x1") | None => {
            tracing::info!(tx_hash, "transaction confirmed");
            Ok(())
        }
        Some(status) => Err(WalletError::Confirmation {
            tx_hash: tx_hash.to_string(),
            reason: format!("transaction reverted (status {status})"),
        }),
    }
}

fn classify_send_error(err: WalletError, from: &str, value: Amount) -> WalletError {
    match err {
        WalletError::Rpc { message, .. } if message.to_lowercase().contains("insufficient funds") => {
            WalletError::InsufficientBalance {
                address: from.to_string(),
                value,
            }
        }
        WalletError::Rpc { code: 4001, message } => WalletError::Rejected(message),
        other => other,
    }
}
