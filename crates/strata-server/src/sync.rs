//! Strata Anti-Entropy Sync
//!
//! Bulk state transfer for joining nodes. A starting replica asks each
//! seeded peer for its full state (key-value map, vector clock, shard map)
//! and replaces its own wholesale; when no peer answers it initializes an
//! empty clock and, in sharded mode, runs the distribution itself. The
//! payload nests the three parts as JSON-encoded strings.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use strata_common::{ReplicaId, Result, StoredValue, StrataError};
use strata_replication::{ShardMap, VectorClock};

/// Per-peer timeout while looking for a sync source.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(1);

// =============================================================================
// Sync Payload
// =============================================================================

/// One atomic state transfer: key-value map, vector clock, and shard map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPayload {
    #[serde(rename = "kvsCopy")]
    pub kvs: String,
    #[serde(rename = "vectorClock")]
    pub vector_clock: String,
    #[serde(rename = "shard")]
    pub shards: String,
}

impl SyncPayload {
    /// Capture this node's current state.
    pub fn capture(state: &AppState) -> Result<Self> {
        let (snapshot, vector_clock) = {
            let engine = state.engine.lock();
            (engine.snapshot(), engine.metadata())
        };
        let kvs = serde_json::to_string(&snapshot)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;
        let shards = serde_json::to_string(&state.placement.read().shards)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;

        Ok(Self {
            kvs,
            vector_clock,
            shards,
        })
    }

    /// Replace the local state with this payload.
    pub fn apply(self, state: &AppState) -> Result<()> {
        let entries: HashMap<String, StoredValue> = serde_json::from_str(&self.kvs)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;
        let clock = VectorClock::from_metadata(&self.vector_clock)?;
        let shards: ShardMap = serde_json::from_str(&self.shards)
            .map_err(|e| StrataError::Serialization(e.to_string()))?;

        state.engine.lock().replace_state(clock, entries);
        state.install_placement(shards);
        Ok(())
    }
}

// =============================================================================
// Bootstrap
// =============================================================================

/// Catch up with the cluster on startup. Tries each seeded peer for a sync
/// snapshot; falls back to a fresh empty state with self-run distribution.
pub async fn bootstrap(state: &AppState) {
    let client = reqwest::Client::new();

    for peer in state.view.peers() {
        match fetch_from(&client, &peer).await {
            Ok(payload) => match payload.apply(state) {
                Ok(()) => {
                    tracing::info!(replica = %peer, "synchronized with cluster");
                    return;
                }
                Err(err) => {
                    tracing::warn!(replica = %peer, error = %err, "sync payload rejected");
                }
            },
            Err(err) => {
                tracing::debug!(replica = %peer, error = %err, "sync source unavailable");
            }
        }
    }

    // No peer answered: start fresh.
    tracing::info!("no sync source available, initializing empty state");
    if let Some(shard_count) = state.config.shard_count {
        let map = ShardMap::distribute(shard_count, &state.view.snapshot());
        if ShardMap::ensure_fault_tolerance(shard_count, state.view.len()).is_err() {
            tracing::warn!(
                shard_count,
                nodes = state.view.len(),
                "initial distribution leaves shards under-replicated"
            );
        }
        state.install_placement(map);
    }
}

async fn fetch_from(client: &reqwest::Client, peer: &ReplicaId) -> Result<SyncPayload> {
    let url = format!("http://{}/sync", peer);
    let response = client
        .get(&url)
        .timeout(SYNC_TIMEOUT)
        .send()
        .await
        .map_err(|e| StrataError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(StrataError::Transport(format!(
            "sync source {} answered {}",
            peer,
            response.status()
        )));
    }

    response
        .json::<SyncPayload>()
        .await
        .map_err(|e| StrataError::Serialization(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_common::NodeConfig;

    fn state() -> AppState {
        let config = NodeConfig::new(
            "n0:8090".to_string(),
            "n0:8090,n1:8090,n2:8090,n3:8090",
            Some(2),
        )
        .unwrap();
        AppState::new(config)
    }

    #[test]
    fn test_capture_apply_round_trip() {
        let source = state();
        {
            let mut engine = source.engine.lock();
            engine
                .client_put("a", StoredValue::new(json!(1), "int"), &VectorClock::new())
                .unwrap();
        }
        source.install_placement(ShardMap::distribute(2, &source.view.snapshot()));

        let payload = SyncPayload::capture(&source).unwrap();

        let joiner = state();
        payload.apply(&joiner).unwrap();

        let engine = joiner.engine.lock();
        assert_eq!(engine.key_count(), 1);
        assert_eq!(engine.metadata(), source.engine.lock().metadata());
        drop(engine);
        assert_eq!(joiner.placement.read().shards.len(), 2);
        assert_eq!(joiner.my_shard(), source.my_shard());
    }

    #[test]
    fn test_payload_wire_field_names() {
        let source = state();
        let payload = SyncPayload::capture(&source).unwrap();
        let encoded = serde_json::to_string(&payload).unwrap();

        assert!(encoded.contains("\"kvsCopy\""));
        assert!(encoded.contains("\"vectorClock\""));
        assert!(encoded.contains("\"shard\""));
    }

    #[test]
    fn test_apply_rejects_garbage() {
        let payload = SyncPayload {
            kvs: "not json".to_string(),
            vector_clock: String::new(),
            shards: "{}".to_string(),
        };
        assert!(payload.apply(&state()).is_err());
    }

    #[tokio::test]
    async fn test_bootstrap_falls_back_to_distribution() {
        let state = state();
        // No peers are reachable in tests, so bootstrap must self-distribute.
        bootstrap(&state).await;

        assert_eq!(state.placement.read().shards.len(), 2);
        assert!(state.my_shard().is_some());
    }
}
