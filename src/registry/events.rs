//! Registry Events
//!
//! Events emitted by a node registry so the coordination layer above can
//! react to peers joining, leaving and failing.

use serde::{Deserialize, Serialize};

/// Events emitted by the node registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A node wrote a heartbeat
    NodeRefreshed {
        registry: String,
        node_id: String,
        heartbeat_ms: i64,
    },

    /// A sweep deleted a node that stopped heartbeating
    NodeExpired {
        registry: String,
        node_id: String,
        last_heartbeat_ms: Option<i64>,
    },

    /// A sweep candidate was found live again and kept
    NodeRevived {
        registry: String,
        node_id: String,
        heartbeat_ms: i64,
    },

    /// A node was removed explicitly
    NodeRemoved { registry: String, node_id: String },

    /// The whole registry was deleted
    RegistryCleared { registry: String },
}

impl RegistryEvent {
    /// Registry key the event belongs to
    pub fn registry(&self) -> &str {
        match self {
            RegistryEvent::NodeRefreshed { registry, .. }
            | RegistryEvent::NodeExpired { registry, .. }
            | RegistryEvent::NodeRevived { registry, .. }
            | RegistryEvent::NodeRemoved { registry, .. }
            | RegistryEvent::RegistryCleared { registry } => registry,
        }
    }

    /// Get the node ID if this is a node-level event
    pub fn node_id(&self) -> Option<&str> {
        match self {
            RegistryEvent::NodeRefreshed { node_id, .. }
            | RegistryEvent::NodeExpired { node_id, .. }
            | RegistryEvent::NodeRevived { node_id, .. }
            | RegistryEvent::NodeRemoved { node_id, .. } => Some(node_id),
            RegistryEvent::RegistryCleared { .. } => None,
        }
    }

    /// Check if this event takes one or more nodes out of the registry
    pub fn is_departure(&self) -> bool {
        matches!(
            self,
            RegistryEvent::NodeExpired { .. }
                | RegistryEvent::NodeRemoved { .. }
                | RegistryEvent::RegistryCleared { .. }
        )
    }
}
