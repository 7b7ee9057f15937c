//! Strata Causal Delivery Engine
//!
//! The deliverability predicates and write application rules that give the
//! store its causal guarantees. The engine owns the local vector clock and
//! the key-value map together, so a single lock around it makes predicate
//! evaluation, clock movement, and the mutation one critical section.
//!
//! Client requests are deliverable unless their metadata proves the client
//! has observed writes this replica has not. Replica-to-replica messages are
//! deliverable only when the sender's own entry is the immediate next tick
//! and every other entry is already covered locally; combined with the
//! broadcaster's per-destination FIFO retry this yields causal delivery
//! without holding back buffers.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::store::{KvStore, PutOutcome};
use crate::vector_clock::VectorClock;
use std::collections::HashMap;
use strata_common::{ReplicaId, Result, StoredValue, StrataError};

// =============================================================================
// Write Receipt
// =============================================================================

/// Outcome of an accepted write: what happened plus the causal metadata the
/// caller must carry forward.
#[derive(Debug, Clone)]
pub struct WriteReceipt {
    pub outcome: PutOutcome,
    pub metadata: String,
}

// =============================================================================
// Causal Engine
// =============================================================================

/// The replica's causally guarded state: its vector clock and key-value map.
#[derive(Debug)]
pub struct CausalEngine {
    self_id: ReplicaId,
    clock: VectorClock,
    store: KvStore,
}

impl CausalEngine {
    /// Create an engine with an initial clock and empty store.
    pub fn new(self_id: ReplicaId, clock: VectorClock) -> Self {
        Self {
            self_id,
            clock,
            store: KvStore::new(),
        }
    }

    /// The current clock serialized as causal metadata.
    pub fn metadata(&self) -> String {
        self.clock.to_metadata()
    }

    /// The current clock.
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Track a replica that joined the cluster (zero entry until its first
    /// write).
    pub fn track_replica(&mut self, replica: &ReplicaId) {
        self.clock.ensure(replica);
    }

    // =========================================================================
    // Deliverability Predicates
    // =========================================================================

    /// A client request is deliverable unless its metadata strictly
    /// happens-after the local clock, i.e. the client has observed writes
    /// this replica has not yet applied.
    pub fn client_deliverable(&self, sender: &VectorClock) -> bool {
        !sender.happened_after(&self.clock)
    }

    /// A replica-to-replica message from sender S is deliverable iff S's own
    /// entry is exactly one ahead of ours and every other entry is already
    /// covered locally.
    pub fn peer_deliverable(&self, sender: &VectorClock, sender_id: &ReplicaId) -> bool {
        for (replica, ticks) in sender.entries() {
            let local = self.clock.get(&ReplicaId::new(replica));
            if replica == sender_id.as_str() {
                if ticks != local + 1 {
                    return false;
                }
            } else if ticks > local {
                return false;
            }
        }
        true
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Serve a client read under the deliverability predicate.
    pub fn read(&self, key: &str, sender: &VectorClock) -> Result<(StoredValue, String)> {
        if !self.client_deliverable(sender) {
            return Err(StrataError::StaleReplica);
        }
        let record = self.store.get(key).cloned().ok_or(StrataError::KeyNotFound)?;
        Ok((record, self.metadata()))
    }

    // =========================================================================
    // Client Writes
    // =========================================================================

    /// Apply a client put: merge the request clock, tick our own entry, and
    /// mutate. The receipt's metadata is what peers must see.
    pub fn client_put(
        &mut self,
        key: &str,
        record: StoredValue,
        sender: &VectorClock,
    ) -> Result<WriteReceipt> {
        KvStore::validate(key, &record.value)?;
        if !self.client_deliverable(sender) {
            return Err(StrataError::StaleReplica);
        }

        self.clock.merge(sender);
        self.clock.tick(&self.self_id);
        let outcome = self.store.put(key, record)?;

        Ok(WriteReceipt {
            outcome,
            metadata: self.metadata(),
        })
    }

    /// Apply a client delete. A delete of an absent key is rejected before
    /// the clock moves, so it neither ticks nor replicates.
    pub fn client_delete(&mut self, key: &str, sender: &VectorClock) -> Result<WriteReceipt> {
        if !self.client_deliverable(sender) {
            return Err(StrataError::StaleReplica);
        }
        if self.store.get(key).is_none() {
            return Err(StrataError::KeyNotFound);
        }

        self.clock.merge(sender);
        self.clock.tick(&self.self_id);
        self.store.delete(key)?;

        Ok(WriteReceipt {
            outcome: PutOutcome::Replaced,
            metadata: self.metadata(),
        })
    }

    // =========================================================================
    // Peer Writes
    // =========================================================================

    /// Apply a replicated put from a peer. The sender already ticked its own
    /// entry, so acceptance only merges.
    pub fn peer_put(
        &mut self,
        sender_id: &ReplicaId,
        key: &str,
        record: StoredValue,
        sender: &VectorClock,
    ) -> Result<WriteReceipt> {
        KvStore::validate(key, &record.value)?;
        if !self.peer_deliverable(sender, sender_id) {
            return Err(StrataError::NotDeliverable);
        }

        self.clock.merge(sender);
        let outcome = self.store.put(key, record)?;

        Ok(WriteReceipt {
            outcome,
            metadata: self.metadata(),
        })
    }

    /// Apply a replicated delete from a peer.
    pub fn peer_delete(
        &mut self,
        sender_id: &ReplicaId,
        key: &str,
        sender: &VectorClock,
    ) -> Result<String> {
        if !self.peer_deliverable(sender, sender_id) {
            return Err(StrataError::NotDeliverable);
        }

        self.clock.merge(sender);
        self.store.delete(key)?;
        Ok(self.metadata())
    }

    // =========================================================================
    // Reshard and Sync Hand-offs
    // =========================================================================

    /// Install a record outside the causal path (reshard hand-off). The
    /// record was validated and causally ordered at its origin.
    pub fn install(&mut self, key: &str, record: StoredValue) {
        self.store.put_unchecked(key, record);
    }

    /// Drop a key that migrated to another shard.
    pub fn evict(&mut self, key: &str) {
        self.store.evict(key);
    }

    /// Number of locally stored keys.
    pub fn key_count(&self) -> usize {
        self.store.key_count()
    }

    /// Snapshot the key-value map.
    pub fn snapshot(&self) -> HashMap<String, StoredValue> {
        self.store.snapshot()
    }

    /// Replace clock and store wholesale from a sync payload.
    pub fn replace_state(&mut self, clock: VectorClock, entries: HashMap<String, StoredValue>) {
        self.clock = clock;
        self.store.replace_all(entries);
    }
}

// =============================================================================
// Tests
// =============================================================================
