//! Strata Core Types
//!
//! Replica and shard identifiers plus the stored-value record shared by the
//! replication engine and the HTTP surface.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};

// =============================================================================
// Replica ID
// =============================================================================

/// Unique identifier for a replica in the cluster. The replica's socket
/// address (`host:port`) doubles as its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReplicaId(pub String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Shard ID
// =============================================================================

/// Unique identifier for a shard (`shard0`, `shard1`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(pub String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create the canonical identifier for the i-th shard.
    pub fn numbered(index: usize) -> Self {
        Self(format!("shard{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ShardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Stored Value
// =============================================================================

/// A stored record: an opaque JSON value preserved verbatim, plus the
/// client-supplied type tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: serde_json::Value,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl StoredValue {
    pub fn new(value: serde_json::Value, kind: impl Into<String>) -> Self {
        Self {
            value,
            kind: kind.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_id() {
        let id = ReplicaId::new("10.10.0.2:8090");
        assert_eq!(id.as_str(), "10.10.0.2:8090");
        assert_eq!(id.to_string(), "10.10.0.2:8090");
        assert_eq!(id, ReplicaId::from("10.10.0.2:8090"));
    }

    #[test]
    fn test_shard_id_numbered() {
        assert_eq!(ShardId::numbered(0).as_str(), "shard0");
        assert_eq!(ShardId::numbered(3).as_str(), "shard3");
    }

    #[test]
    fn test_stored_value_wire_format() {
        let record = StoredValue::new(serde_json::json!({"n": 1}), "object");
        let encoded = serde_json::to_string(&record).unwrap();
        assert!(encoded.contains("\"type\":\"object\""));

        let decoded: StoredValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
