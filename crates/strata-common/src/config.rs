//! Strata Node Configuration
//!
//! Typed configuration for a replica: its own socket address (which doubles
//! as its replica identity), the seeded view, and the optional initial shard
//! count. Values come from the environment (`SOCKET_ADDRESS`, `VIEW`,
//! `SHARD_COUNT`) or equivalent command-line flags.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::{Result, StrataError};
use crate::types::ReplicaId;
use serde::{Deserialize, Serialize};

// =============================================================================
// Node Configuration
// =============================================================================

/// Configuration for a single replica process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bind target and replica identity, `host:port`.
    pub socket_address: String,
    /// Initial belief about the set of live replicas, including self.
    pub view: Vec<ReplicaId>,
    /// Initial shard count. Absent means the node runs non-sharded.
    pub shard_count: Option<usize>,
}

impl NodeConfig {
    /// Build a configuration from raw environment values.
    pub fn new(socket_address: String, view: &str, shard_count: Option<usize>) -> Result<Self> {
        if socket_address.is_empty() {
            return Err(StrataError::Configuration(
                "SOCKET_ADDRESS must not be empty".to_string(),
            ));
        }
        if let Some(count) = shard_count {
            if count == 0 {
                return Err(StrataError::Configuration(
                    "SHARD_COUNT must be at least 1".to_string(),
                ));
            }
        }

        let view = parse_view(view);
        Ok(Self {
            socket_address,
            view,
            shard_count,
        })
    }

    /// The replica identity of this node.
    pub fn self_id(&self) -> ReplicaId {
        ReplicaId::new(self.socket_address.clone())
    }

    /// Seeded peers, excluding this node.
    pub fn seeded_peers(&self) -> Vec<ReplicaId> {
        let self_id = self.self_id();
        self.view.iter().filter(|r| **r != self_id).cloned().collect()
    }
}

/// Parse a comma-separated view string into unique replica ids, preserving
/// order of first appearance.
fn parse_view(raw: &str) -> Vec<ReplicaId> {
    let mut view = Vec::new();
    for part in raw.split(',') {
        let addr = part.trim();
        if addr.is_empty() {
            continue;
        }
        let id = ReplicaId::new(addr);
        if !view.contains(&id) {
            view.push(id);
        }
    }
    view
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_view() {
        let config = NodeConfig::new(
            "10.10.0.2:8090".to_string(),
            "10.10.0.2:8090,10.10.0.3:8090, 10.10.0.4:8090",
            None,
        )
        .unwrap();

        assert_eq!(config.view.len(), 3);
        assert_eq!(config.view[1].as_str(), "10.10.0.3:8090");
    }

    #[test]
    fn test_view_deduplicates() {
        let config = NodeConfig::new(
            "a:1".to_string(),
            "a:1,b:1,a:1,,b:1",
            Some(1),
        )
        .unwrap();

        assert_eq!(config.view.len(), 2);
    }

    #[test]
    fn test_seeded_peers_excludes_self() {
        let config = NodeConfig::new("a:1".to_string(), "a:1,b:1,c:1", None).unwrap();
        let peers = config.seeded_peers();
        assert_eq!(peers.len(), 2);
        assert!(!peers.contains(&ReplicaId::new("a:1")));
    }

    #[test]
    fn test_rejects_empty_address() {
        assert!(NodeConfig::new(String::new(), "a:1", None).is_err());
    }

    #[test]
    fn test_rejects_zero_shard_count() {
        assert!(NodeConfig::new("a:1".to_string(), "a:1", Some(0)).is_err());
    }
}
