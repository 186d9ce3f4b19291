use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::action::Action;
use super::amount::Amount;

/// A resolved machine. Immutable once produced for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub logical_id: String,
    pub display_name: String,
    pub base_url: String,
    pub payment_address: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_domain: Option<String>,
}

/// An invocable action advertised by a machine or device manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    #[serde(rename = "endpoint")]
    pub endpoint_template: String,
    #[serde(rename = "method", default = "default_http_method")]
    pub http_method: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payment_required: bool,
    #[serde(
        rename = "default_amount_eth",
        alias = "default_amount",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_amount: Option<Amount>,
}

fn default_http_method() -> String {
    "POST".into()
}

impl Capability {
    /// Substitute `{device_id}` / `{device_name}` and anchor relative
    /// endpoints under the device path.
    ///
    /// `device_name` falls back to the device id with hyphens mapped to
    /// underscores, which is how machines key their device routes.
    pub fn expand_endpoint(&self, params: &Map<String, Value>) -> String {
        let device_id = params
            .get("device_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let device_name = params
            .get("device_name")
            .and_then(Value::as_str)
            .map_or_else(|| route_name(device_id), ToString::to_string);

        let path = self
            .endpoint_template
            .replace("{device_id}", device_id)
            .replace("{device_name}", &device_name);

        if path.starts_with('/') {
            path
        } else {
            format!("/devices/{device_name}/{path}")
        }
    }
}

/// Route-safe device name: hyphens become underscores.
pub fn route_name(raw: &str) -> String {
    raw.replace('-', "_")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(rename = "chainId", default)]
    pub chain_id: u64,
    #[serde(rename = "chainName", default)]
    pub chain_name: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(rename = "rpcUrl", default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_config: Option<PaymentConfig>,
}

/// A device as listed by a machine's `/status` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub telemetry: Map<String, Value>,
    #[serde(default, alias = "ens", skip_serializing_if = "Option::is_none")]
    pub ens_domain: Option<String>,
}

/// Payment terms carried by a 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    #[serde(rename = "chainId", default)]
    pub chain_id: u64,
    #[serde(rename = "chainName", default)]
    pub chain_name: String,
    #[serde(rename = "token", alias = "tokenSymbol", default)]
    pub token_symbol: String,
    #[serde(rename = "recipient", alias = "recipientAddress")]
    pub recipient_address: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    #[default]
    Action,
    Chat,
}

/// Output of the external intent parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    #[serde(rename = "type", default)]
    pub kind: IntentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ParsedIntent {
    pub fn action(action: Action, device: Option<String>) -> Self {
        Self {
            kind: IntentKind::Action,
            action: Some(action),
            device,
            ..Self::default()
        }
    }

    pub fn chat(message: impl Into<String>) -> Self {
        Self {
            kind: IntentKind::Chat,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}
