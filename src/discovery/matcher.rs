//! Staged device selection from noisy natural-language hints.
//!
//! Rules run in order and the first one that singles out a device wins:
//! exact id, case-insensitive exact name/id, substring either way, token
//! overlap, expected device type for the action, first device. When a
//! text rule matches several devices the expected type narrows them, and
//! otherwise the first match in listing order is taken.

use crate::core::{Action, Device};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceQuery {
    pub id: Option<String>,
    pub name_hint: Option<String>,
    pub action: Option<Action>,
}

impl DeviceQuery {
    pub fn new(id: Option<&str>, name_hint: Option<&str>, action: Option<&Action>) -> Self {
        let clean = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };
        Self {
            id: clean(id),
            name_hint: clean(name_hint),
            action: action.cloned(),
        }
    }

    fn hints(&self) -> Vec<String> {
        let mut hints: Vec<String> = Vec::new();
        for hint in [self.name_hint.as_ref(), self.id.as_ref()].into_iter().flatten() {
            let lowered = hint.to_lowercase();
            if !hints.contains(&lowered) {
                hints.push(lowered);
            }
        }
        hints
    }

    /// What was searched for, for error messages.
    pub fn describe(&self) -> String {
        match (&self.id, &self.name_hint) {
            (Some(id), Some(name)) if id != name => format!("id {id} / name {name}"),
            (Some(id), _) => id.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => "any device".to_string(),
        }
    }
}

/// `None` only when `devices` is empty.
pub fn find_device<'a>(devices: &'a [Device], query: &DeviceQuery) -> Option<&'a Device> {
    if devices.is_empty() {
        return None;
    }
    let expected_type = query.action.as_ref().and_then(Action::device_type);

    if let Some(id) = &query.id {
        if let Some(device) = devices.iter().find(|d| &d.id == id) {
            return Some(device);
        }
    }

    let hints = query.hints();
    if !hints.is_empty() {
        let rules: [fn(&Device, &str) -> bool; 3] = [exact_match, substring_match, token_overlap];
        for rule in rules {
            let matched: Vec<&Device> = devices
                .iter()
                .filter(|d| hints.iter().any(|h| rule(d, h)))
                .collect();
            if let Some(device) = pick(&matched, expected_type) {
                return Some(device);
            }
        }
    }

    if let Some(expected) = expected_type {
        if let Some(device) = devices.iter().find(|d| d.device_type == expected) {
            return Some(device);
        }
    }

    devices.first()
}

fn pick<'a>(matched: &[&'a Device], expected_type: Option<&str>) -> Option<&'a Device> {
    match matched {
        [] => None,
        [only] => Some(*only),
        several => expected_type
            .and_then(|t| several.iter().copied().find(|d| d.device_type == t))
            .or_else(|| several.first().copied()),
    }
}

fn exact_match(device: &Device, hint: &str) -> bool {
    device.name.to_lowercase() == hint || device.id.to_lowercase() == hint
}

fn substring_match(device: &Device, hint: &str) -> bool {
    [device.name.to_lowercase(), device.id.to_lowercase()]
        .iter()
        .filter(|field| !field.is_empty())
        .any(|field| field.contains(hint) || hint.contains(field.as_str()))
}

/// "Lab 3" matches "Prusa Lab Station": some hint token is a substring of,
/// or contains, some token of the device name.
fn token_overlap(device: &Device, hint: &str) -> bool {
    let name = device.name.to_lowercase();
    let name_tokens: Vec<&str> = name.split_whitespace().collect();
    hint.split_whitespace().any(|h| {
        name_tokens
            .iter()
            .any(|n| n.contains(h) || h.contains(n))
    })
}
