//! Finding the machine, device and capability an intent targets.

pub mod catalog;
pub mod client;
pub mod directory;
pub mod matcher;
pub mod resolver;

pub use catalog::{CapabilityCatalog, find_matching_capability};
pub use client::{InvocationResponse, MachineClient, NameRecord};
pub use directory::{MachineDirectory, MachineEntry};
pub use matcher::{DeviceQuery, find_device};
pub use resolver::{NameResolver, Resolution, normalize_domain};
