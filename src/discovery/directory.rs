use serde::{Deserialize, Serialize};

use crate::core::Action;

/// A known machine. Entries come from the `[[machines]]` config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Device type this machine serves (e.g. `smart_lock`)
    #[serde(default)]
    pub device_type: Option<String>,
    /// Name-service domain (e.g. `smartlock.eth`)
    #[serde(default, alias = "ens")]
    pub name_domain: Option<String>,
    /// Literal base URL used when name resolution fails
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

impl MachineEntry {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    fn mentions(&self, hint: &str) -> bool {
        let hint = hint.to_lowercase();
        [
            Some(self.id.as_str()),
            Some(self.name.as_str()),
            self.name_domain.as_deref(),
            self.device_id.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|field| !field.is_empty())
        .map(str::to_lowercase)
        .any(|field| field.contains(&hint) || hint.contains(&field))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MachineDirectory {
    entries: Vec<MachineEntry>,
}

impl MachineDirectory {
    pub fn new(entries: Vec<MachineEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MachineEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&MachineEntry> {
        self.entries
            .iter()
            .find(|e| e.id == id || e.name_domain.as_deref() == Some(id))
    }

    /// Pick the machine to resolve for an action.
    ///
    /// Entries whose device type matches the action are preferred so that
    /// irrelevant machines are never resolved; among the remaining
    /// candidates one that mentions the device hint wins.
    pub fn select(&self, action: &Action, device_hint: Option<&str>) -> Option<&MachineEntry> {
        let typed: Vec<&MachineEntry> = match action.device_type() {
            Some(expected) => self
                .entries
                .iter()
                .filter(|e| e.device_type.as_deref() == Some(expected))
                .collect(),
            None => Vec::new(),
        };
        let candidates: Vec<&MachineEntry> = if typed.is_empty() {
            self.entries.iter().collect()
        } else {
            typed
        };

        if let Some(hint) = device_hint.filter(|h| !h.trim().is_empty()) {
            if let Some(entry) = candidates.iter().copied().find(|e| e.mentions(hint)) {
                return Some(entry);
            }
        }
        candidates.first().copied()
    }
}
