//! Node identity
//!
//! Every process joining a registry needs an identifier no other live process
//! shares.

use crate::registry::NodeId;

/// Environment variable consulted when no explicit id is configured
pub const NODE_ID_ENV: &str = "LIVENESS_NODE_ID";

/// Resolve the identifier for this process.
///
/// An explicit override wins, then [`NODE_ID_ENV`]. Otherwise the id is
/// `<hostname>-<8 random hex chars>` so two processes on the same host never
/// collide.
pub fn resolve_node_id(explicit: Option<&str>) -> NodeId {
    if let Some(id) = explicit.filter(|id| !id.is_empty()) {
        return NodeId::new(id);
    }
    match std::env::var(NODE_ID_ENV) {
        Ok(id) if !id.is_empty() => NodeId::new(id),
        _ => generate_node_id(),
    }
}

/// Build a fresh `<hostname>-<suffix>` identifier
pub fn generate_node_id() -> NodeId {
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    NodeId::new(format!("{hostname}-{suffix}"))
}
