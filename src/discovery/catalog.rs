use super::client::MachineClient;
use crate::core::{Action, Capability, Manifest, route_name};
use crate::error::{Result, TollgateError};

/// Fetches capability manifests. A missing manifest is fatal for the task.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    client: MachineClient,
}

impl CapabilityCatalog {
    pub fn new(client: MachineClient) -> Self {
        Self { client }
    }

    pub async fn get_manifest(&self, base_url: &str, device_name: Option<&str>) -> Result<Manifest> {
        let fetched = match device_name.filter(|n| !n.trim().is_empty()) {
            Some(name) => self.client.device_manifest(base_url, name).await,
            None => self.client.manifest(base_url).await,
        };
        fetched.map_err(|err| {
            let url = match device_name {
                Some(name) => format!("{base_url}/devices/{}/ai-manifest", route_name(name)),
                None => format!("{base_url}/ai-manifest"),
            };
            tracing::error!(url = %url, error = %err, "capability manifest unavailable");
            TollgateError::CatalogUnavailable {
                url,
                message: err.to_string(),
            }
        })
    }

    pub async fn get_capabilities(
        &self,
        base_url: &str,
        device_name: Option<&str>,
    ) -> Result<Vec<Capability>> {
        let manifest = self.get_manifest(base_url, device_name).await?;
        tracing::debug!(
            base_url,
            device = device_name.unwrap_or("-"),
            count = manifest.capabilities.len(),
            "capabilities fetched"
        );
        Ok(manifest.capabilities)
    }
}

/// Exact canonical id, then substring either way, then the first entry.
/// `None` only for an empty manifest.
pub fn find_matching_capability<'a>(
    capabilities: &'a [Capability],
    action: &Action,
) -> Option<&'a Capability> {
    let wanted = action.capability_id().to_lowercase();
    let verb = action.as_str().to_lowercase();

    capabilities
        .iter()
        .find(|c| c.id.to_lowercase() == wanted)
        .or_else(|| {
            capabilities.iter().find(|c| {
                let id = c.id.to_lowercase();
                [wanted.as_str(), verb.as_str()]
                    .iter()
                    .filter(|needle| !needle.is_empty())
                    .any(|needle| id.contains(needle) || needle.contains(id.as_str()))
            })
        })
        .or_else(|| capabilities.first())
}
