//! Logical machine id → base URL, payment address, device.
//!
//! Resolution never fails. When the name service is unreachable the
//! resolver walks a fixed fallback chain and marks the result degraded:
//!
//! 1. literal URL from the directory entry + default payment address
//! 2. device listing on the default machine, fuzzy-matched on the domain
//! 3. local defaults only

use std::time::Duration;

use super::client::{MachineClient, NameRecord};
use super::directory::{MachineDirectory, MachineEntry};
use crate::config::{MachineConfig, ResolverConfig};
use crate::core::{Device, Machine, route_name};
use crate::error::TollgateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub machine: Machine,
    pub degraded: bool,
    pub reason: Option<String>,
}

impl Resolution {
    fn exact(machine: Machine) -> Self {
        Self {
            machine,
            degraded: false,
            reason: None,
        }
    }

    fn degraded(machine: Machine, detail: String) -> Self {
        Self {
            machine,
            degraded: true,
            reason: Some(TollgateError::ResolutionDegraded(detail).to_string()),
        }
    }
}

/// Strip the `.eth` suffix the resolver does not expect.
pub fn normalize_domain(domain: &str) -> &str {
    let trimmed = domain.trim();
    trimmed.strip_suffix(".eth").unwrap_or(trimmed)
}

#[derive(Debug, Clone)]
pub struct NameResolver {
    client: MachineClient,
    resolver_url: String,
    default_machine_url: String,
    default_payment_address: String,
    timeout: Duration,
}

impl NameResolver {
    pub fn new(client: MachineClient, machine: &MachineConfig, resolver: &ResolverConfig) -> Self {
        Self {
            client,
            resolver_url: resolver
                .url
                .clone()
                .unwrap_or_else(|| machine.default_url.clone()),
            default_machine_url: machine.default_url.clone(),
            default_payment_address: resolver.default_payment_address.clone(),
            timeout: resolver.timeout(),
        }
    }

    /// Resolve an id that may or may not be in the directory. Unknown ids
    /// containing a dot are treated as name-service domains.
    pub async fn resolve_id(&self, directory: &MachineDirectory, logical_id: &str) -> Resolution {
        if let Some(entry) = directory.get(logical_id) {
            return self.resolve(entry).await;
        }
        let entry = MachineEntry {
            id: logical_id.to_string(),
            name: String::new(),
            description: String::new(),
            device_type: None,
            name_domain: logical_id.contains('.').then(|| logical_id.to_string()),
            url: None,
            device_id: None,
        };
        self.resolve(&entry).await
    }

    pub async fn resolve(&self, entry: &MachineEntry) -> Resolution {
        let Some(domain) = entry.name_domain.as_deref() else {
            return Resolution::exact(self.direct(entry));
        };
        let normalized = normalize_domain(domain);

        match self
            .client
            .resolve_name(&self.resolver_url, normalized, self.timeout)
            .await
        {
            Ok(record) => {
                tracing::debug!(domain, url = %record.url, "name resolved");
                Resolution::exact(from_record(entry, domain, record))
            }
            Err(err) => {
                let reason = format!("resolver {} failed for {domain}: {err}", self.resolver_url);
                tracing::warn!(
                    machine = %entry.id,
                    domain,
                    error = %err,
                    "name resolution failed, falling back"
                );
                self.fallback(entry, domain, normalized, reason).await
            }
        }
    }

    fn direct(&self, entry: &MachineEntry) -> Machine {
        let device_id = entry.device_id.clone().unwrap_or_else(|| entry.id.clone());
        Machine {
            logical_id: entry.id.clone(),
            display_name: entry.display_name().to_string(),
            base_url: entry
                .url
                .clone()
                .unwrap_or_else(|| self.default_machine_url.clone()),
            payment_address: self.default_payment_address.clone(),
            device_name: route_name(&device_id),
            device_id,
            name_domain: None,
        }
    }

    async fn fallback(
        &self,
        entry: &MachineEntry,
        domain: &str,
        normalized: &str,
        reason: String,
    ) -> Resolution {
        let guessed_id = entry
            .device_id
            .clone()
            .unwrap_or_else(|| normalized.replace('_', "-"));
        let machine = |base_url: String, device_id: String| Machine {
            logical_id: entry.id.clone(),
            display_name: entry.display_name().to_string(),
            base_url,
            payment_address: self.default_payment_address.clone(),
            device_name: route_name(&device_id),
            device_id,
            name_domain: Some(domain.to_string()),
        };

        if let Some(url) = &entry.url {
            tracing::info!(machine = %entry.id, url = %url, "using literal fallback URL");
            return Resolution::degraded(machine(url.clone(), guessed_id), reason);
        }

        match self.client.devices(&self.default_machine_url).await {
            Ok(devices) => {
                if let Some(device) = fuzzy_match(&devices, normalized) {
                    tracing::info!(
                        machine = %entry.id,
                        device = %device.id,
                        "matched device from machine listing"
                    );
                    return Resolution::degraded(
                        machine(self.default_machine_url.clone(), device.id.clone()),
                        reason,
                    );
                }
            }
            Err(err) => {
                tracing::warn!(
                    url = %self.default_machine_url,
                    error = %err,
                    "device listing fallback failed"
                );
            }
        }

        tracing::warn!(machine = %entry.id, "using local defaults for machine");
        Resolution::degraded(
            machine(self.default_machine_url.clone(), guessed_id),
            format!("{reason}; using local defaults"),
        )
    }
}

fn from_record(entry: &MachineEntry, domain: &str, record: NameRecord) -> Machine {
    Machine {
        logical_id: entry.id.clone(),
        display_name: entry.display_name().to_string(),
        base_url: record.url,
        payment_address: record.payment_address,
        device_id: record.device_id,
        device_name: record.device_name,
        name_domain: Some(record.ens_domain.unwrap_or_else(|| domain.to_string())),
    }
}

fn fuzzy_match<'a>(devices: &'a [Device], needle: &str) -> Option<&'a Device> {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return None;
    }
    devices.iter().find(|d| {
        [d.id.to_lowercase(), d.name.to_lowercase()]
            .iter()
            .filter(|field| !field.is_empty())
            .any(|field| field.contains(&needle) || needle.contains(field.as_str()))
    })
}
