mod loader;
pub mod schema;

pub use schema::{
    AutonomyConfig, Config, IntentConfig, MachineConfig, ResolverConfig, StorageConfig,
    TelemetryConfig, WalletConfig,
};
