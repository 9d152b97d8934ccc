//! Liveness Registry - distributed node-liveness substrate
//!
//! Independent processes cooperating over a shared resource key heartbeat
//! into a hash kept in a shared store, detect peers that stopped
//! heartbeating, and sweep them without ever deleting a node that came back.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                 Coordination layer (cache / lock manager)              │
//! ├───────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────┐            ┌──────────────────────────────┐  │
//! │  │      Sweeper        │ ─ drives ─▶│        NodeRegistry          │  │
//! │  │ (heartbeat + sweep) │            │ phonon_<key>.nodelist        │  │
//! │  └─────────────────────┘            │ node_id -> last heartbeat ms │  │
//! │                                     └──────────────┬───────────────┘  │
//! ├────────────────────────────────────────────────────┼──────────────────┤
//! │                          SharedStore               │                  │
//! │  ┌──────────────┐  ┌──────────────┐  ┌─────────────┴──────────────┐   │
//! │  │ MemoryStore  │  │  RedisStore  │  │ ShardedStore (crc32 % n)   │   │
//! │  └──────────────┘  └──────────────┘  └────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Node registry, node ids, events and counters
//! - [`store`]: Shared store port and adapters
//! - [`sweeper`]: Periodic heartbeat and expiry sweep driver
//! - [`config`]: Configuration loading
//! - [`metrics`]: Prometheus exposition
//! - [`error`]: Error types and handling

pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod sweeper;

// Re-export commonly used types
pub use config::{load_config, AgentConfig, AppConfig, LivenessConfig, StoreConfig, MAX_TTL_SECS};

pub use error::{Error, ErrorAction, Result};

pub use metrics::LivenessMetrics;

pub use registry::{
    now_ms, read_snapshot, registry_key, NodeId, NodeRegistry, NodeStatus, RegistryEvent,
    RegistryStatsSnapshot,
};

pub use store::{
    connect_store, resolve_node_id, MemoryStore, RedisStore, ShardedStore, SharedStore,
    SharedStoreRef,
};

pub use sweeper::{Sweeper, SweeperConfig, TickReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
