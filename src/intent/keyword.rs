use std::future::Future;
use std::pin::Pin;

use super::IntentParser;
use crate::core::{Action, ParsedIntent};
use crate::error::Result;

const KEYWORD_CONFIDENCE: f64 = 0.7;

const CHAT_REPLY: &str =
    "I can unlock, print, charge or dispense on nearby machines. Try \"unlock smart_lock_01\".";

/// Token prefixes per action, English and Spanish.
const ACTION_PREFIXES: &[(&str, &[&str])] = &[
    ("unlock", &["unlock", "desbloque", "abrir", "abre", "open"]),
    ("print", &["print", "imprim"]),
    ("charge", &["charg", "cargar", "carga", "recarg"]),
    ("dispense", &["dispens", "vend", "buy", "compr"]),
];

/// Words that introduce a device name: "printer lab", "lock 7".
const DEVICE_MARKERS: &[&str] = &[
    "device",
    "dispositivo",
    "lock",
    "impresora",
    "printer",
    "station",
    "estacion",
    "estación",
];

/// Words that introduce a location-style hint: "print in Lab 3".
const LOCATION_MARKERS: &[&str] = &["in", "at", "on", "en"];

const MAX_LOCATION_TOKENS: usize = 3;

/// Offline classifier used when no remote parser is configured or the
/// remote one fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordIntentParser;

impl KeywordIntentParser {
    pub fn classify(text: &str) -> ParsedIntent {
        let tokens = tokenize(text);
        let Some(action) = tokens.iter().find_map(|t| action_for(t)) else {
            return ParsedIntent::chat(CHAT_REPLY);
        };
        let device = device_hint(&tokens);
        tracing::debug!(action = %action, device = device.as_deref().unwrap_or("-"), "keyword intent");

        let mut intent = ParsedIntent::action(action, device);
        intent.confidence = Some(KEYWORD_CONFIDENCE);
        intent
    }
}

impl IntentParser for KeywordIntentParser {
    fn parse<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedIntent>> + Send + 'a>> {
        Box::pin(async move { Ok(Self::classify(text)) })
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-')))
        .filter(|t| !t.is_empty())
        .collect()
}

fn action_for(token: &str) -> Option<Action> {
    let lowered = token.to_lowercase();
    ACTION_PREFIXES
        .iter()
        .find(|(_, prefixes)| prefixes.iter().any(|p| lowered.starts_with(p)))
        .map(|(action, _)| Action::parse(action))
}

fn is_id_like(token: &str) -> bool {
    token.contains('_') || (token.contains('-') && token.chars().any(|c| c.is_ascii_digit()))
}

fn device_hint(tokens: &[&str]) -> Option<String> {
    if let Some(id) = tokens.iter().find(|t| is_id_like(t)) {
        return Some((*id).to_string());
    }

    let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

    for (i, word) in lowered.iter().enumerate() {
        if DEVICE_MARKERS.contains(&word.as_str()) {
            if let Some(next) = tokens.get(i + 1).filter(|t| action_for(t).is_none()) {
                return Some((*next).to_string());
            }
        }
    }

    for (i, word) in lowered.iter().enumerate() {
        if LOCATION_MARKERS.contains(&word.as_str()) {
            let rest: Vec<&str> = tokens
                .iter()
                .skip(i + 1)
                .take(MAX_LOCATION_TOKENS)
                .copied()
                .collect();
            if !rest.is_empty() {
                return Some(rest.join(" "));
            }
        }
    }
    None
}
