use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Actions the orchestrator knows how to route.
///
/// Anything the intent parser produces outside this vocabulary is kept as
/// `Unknown` so capability matching can still try it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Unlock,
    Print,
    Charge,
    Dispense,
    Unknown(String),
}

impl Action {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unlock" | "open" | "desbloquear" | "abrir" => Self::Unlock,
            "print" | "imprimir" => Self::Print,
            "charge" | "cargar" => Self::Charge,
            "dispense" | "dispensar" | "buy" | "comprar" => Self::Dispense,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Unlock => "unlock",
            Self::Print => "print",
            Self::Charge => "charge",
            Self::Dispense => "dispense",
            Self::Unknown(raw) => raw,
        }
    }

    /// Canonical capability id in a machine manifest.
    pub fn capability_id(&self) -> &str {
        match self {
            Self::Unlock => "unlock_device",
            Self::Print => "print_document",
            Self::Charge => "charge_vehicle",
            Self::Dispense => "dispense_item",
            Self::Unknown(raw) => raw,
        }
    }

    /// Device type expected to serve this action, when one is known.
    pub fn device_type(&self) -> Option<&'static str> {
        match self {
            Self::Unlock => Some("smart_lock"),
            Self::Print => Some("3d_printer"),
            Self::Charge => Some("ev_charger"),
            Self::Dispense => Some("vending_machine"),
            Self::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
