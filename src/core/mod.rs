pub mod action;
pub mod amount;
pub mod types;

pub use action::Action;
pub use amount::Amount;
pub use types::{
    Capability, Device, IntentKind, Machine, Manifest, ParsedIntent, PaymentConfig,
    PaymentDetails, route_name,
};
