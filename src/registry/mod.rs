//! Node Registry Module
//!
//! Per-resource heartbeat registries kept in the shared store, with
//! race-safe expiry sweeps.

pub mod events;
pub mod node_registry;
pub mod stats;

pub use events::*;
pub use node_registry::*;
pub use stats::*;
