//! Strata Server State
//!
//! Shared application state passed into request handlers: the view, the
//! causally guarded engine (clock + store behind one mutex), the current
//! shard placement, and the replication broadcaster. The placement is
//! rebuilt whole on reshard; readers take a shared snapshot.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::broadcast::Broadcaster;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use strata_common::{NodeConfig, ReplicaId, ShardId};
use strata_replication::{CausalEngine, HashRing, ShardMap, VectorClock, ViewManager};

// =============================================================================
// Placement
// =============================================================================

/// The node's current shard placement: the authoritative shard map, the hash
/// ring derived from it, and this node's own shard.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub shards: ShardMap,
    pub ring: HashRing,
    pub my_shard: Option<ShardId>,
}

// =============================================================================
// Application State
// =============================================================================

/// Shared state handle cloned into every request handler and background task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    pub view: Arc<ViewManager>,
    pub engine: Arc<Mutex<CausalEngine>>,
    pub placement: Arc<RwLock<Placement>>,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    /// Create the state for a freshly started replica: seeded view, a zero
    /// clock entry per seeded member, no placement yet.
    pub fn new(config: NodeConfig) -> Self {
        let self_id = config.self_id();
        let view = Arc::new(ViewManager::new(self_id.clone(), config.view.clone()));
        let clock = VectorClock::with_replicas(&view.snapshot());
        let engine = Arc::new(Mutex::new(CausalEngine::new(self_id.clone(), clock)));
        let broadcaster = Arc::new(Broadcaster::new(self_id, Arc::clone(&view)));

        Self {
            config: Arc::new(config),
            view,
            engine,
            placement: Arc::new(RwLock::new(Placement::default())),
            broadcaster,
        }
    }

    /// This replica's identity.
    pub fn self_id(&self) -> ReplicaId {
        self.view.self_id().clone()
    }

    /// The shard this node currently belongs to.
    pub fn my_shard(&self) -> Option<ShardId> {
        self.placement.read().my_shard.clone()
    }

    /// Install a new shard map, rebuilding the derived ring and this node's
    /// cached shard id.
    pub fn install_placement(&self, shards: ShardMap) {
        let ring = shards.build_ring();
        let my_shard = shards.shard_for_node(&self.self_id());
        *self.placement.write() = Placement {
            shards,
            ring,
            my_shard,
        };
    }

    /// Replicas that must receive a locally accepted mutation: the other
    /// members of our shard, or the whole view when running non-sharded.
    pub fn replication_targets(&self) -> Vec<ReplicaId> {
        let placement = self.placement.read();
        match &placement.my_shard {
            Some(shard) => placement.shards.members(shard).unwrap_or_default(),
            None => self.view.snapshot(),
        }
    }

    /// Admit a replica into the view and start tracking it in the clock.
    /// Returns false if it was already present.
    pub fn add_replica(&self, replica: ReplicaId) -> bool {
        let added = self.view.add(replica.clone());
        self.engine.lock().track_replica(&replica);
        added
    }

    /// Remove a replica from the view, every shard's member list, and the
    /// broadcaster's worker set. Returns false if it was not in the view.
    pub fn remove_replica(&self, replica: &ReplicaId) -> bool {
        let removed = self.view.remove(replica);
        self.placement.write().shards.remove_node(replica);
        self.broadcaster.retire(replica);
        removed
    }

    /// The current causal metadata string.
    pub fn metadata(&self) -> String {
        self.engine.lock().metadata()
    }
}

// =============================================================================
// Tests
// =============================================================================
