//! HTTP contract consumed from a machine: device listing, manifests,
//! capability invocation, and the name-resolution endpoint.

use reqwest::{Client, Method};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::core::{Capability, Device, Manifest, route_name};
use crate::error::{Result, TollgateError};

pub fn build_machine_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Join a base URL and an absolute path, validating the result.
pub fn join_url(base_url: &str, path: &str) -> Result<String> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url::Url::parse(&joined)
        .map(|_| joined)
        .map_err(|e| TollgateError::Http(format!("invalid machine URL {base_url}: {e}")))
}

/// Raw outcome of a capability call; the payment gateway interprets it.
#[derive(Debug, Clone)]
pub struct InvocationResponse {
    pub url: String,
    pub status: u16,
    pub body: Value,
}

/// Record returned by `GET {resolver}/resolve/{domain}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NameRecord {
    pub url: String,
    pub payment_address: String,
    pub device_id: String,
    pub device_name: String,
    #[serde(default)]
    pub ens_domain: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MachineClient {
    client: Client,
}

impl MachineClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_machine_client(timeout),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// `GET /status`
    pub async fn devices(&self, base_url: &str) -> Result<Vec<Device>> {
        let url = join_url(base_url, "/status")?;
        let devices: Vec<Device> = self.get_json(&url, None).await?;
        tracing::debug!(url = %url, count = devices.len(), "device listing fetched");
        Ok(devices)
    }

    /// `GET /ai-manifest`
    pub async fn manifest(&self, base_url: &str) -> Result<Manifest> {
        let url = join_url(base_url, "/ai-manifest")?;
        self.get_json(&url, None).await
    }

    /// `GET /devices/{device_name}/ai-manifest`
    pub async fn device_manifest(&self, base_url: &str, device_name: &str) -> Result<Manifest> {
        let path = format!("/devices/{}/ai-manifest", route_name(device_name));
        let url = join_url(base_url, &path)?;
        self.get_json(&url, None).await
    }

    /// `GET {resolver}/resolve/{normalized_domain}` with a hard timeout and no retry.
    pub async fn resolve_name(
        &self,
        resolver_url: &str,
        normalized_domain: &str,
        timeout: Duration,
    ) -> Result<NameRecord> {
        let url = join_url(resolver_url, &format!("/resolve/{normalized_domain}"))?;
        self.get_json(&url, Some(timeout)).await
    }

    /// Invoke a capability. 200 and 402 come back as responses; the caller
    /// decides what any other status means.
    pub async fn invoke(
        &self,
        base_url: &str,
        capability: &Capability,
        params: &Map<String, Value>,
        payment_proof: Option<&str>,
    ) -> Result<InvocationResponse> {
        let url = join_url(base_url, &capability.expand_endpoint(params))?;
        let method = Method::from_bytes(capability.http_method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                TollgateError::Http(format!(
                    "capability {} declares invalid method {}",
                    capability.id, capability.http_method
                ))
            })?;

        let mut request = self.client.request(method.clone(), &url);
        if method == Method::GET {
            request = request.query(&scalar_pairs(params));
        } else {
            request = request.json(params);
        }
        if let Some(proof) = payment_proof {
            request = request.bearer_auth(proof);
        }

        tracing::debug!(
            url = %url,
            method = %method,
            with_proof = payment_proof.is_some(),
            "invoking capability"
        );

        let response = request
            .send()
            .await
            .map_err(|e| TollgateError::from_reqwest(&url, &e))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TollgateError::from_reqwest(&url, &e))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(InvocationResponse { url, status, body })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let mut request = self.client.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TollgateError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TollgateError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TollgateError::Http(format!("{url}: malformed response: {e}")))
    }
}

fn scalar_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key.clone(), s.clone())),
            Value::Number(n) => Some((key.clone(), n.to_string())),
            Value::Bool(b) => Some((key.clone(), b.to_string())),
            _ => None,
        })
        .collect()
}
