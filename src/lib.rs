#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod payment;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{Result, TollgateError, WalletError};
