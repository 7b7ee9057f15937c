//! Strata View Management
//!
//! The view: this replica's current belief about the set of live replicas.
//! The list is ordered, holds unique ids, and is only amended through
//! explicit add/remove operations driven by view requests, join gossip, and
//! heartbeat failures.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use parking_lot::Mutex;
use strata_common::ReplicaId;

// =============================================================================
// View Manager
// =============================================================================

/// Lock-guarded list of live replica ids.
#[derive(Debug)]
pub struct ViewManager {
    self_id: ReplicaId,
    members: Mutex<Vec<ReplicaId>>,
}

impl ViewManager {
    /// Create a view seeded with the configured initial members.
    pub fn new(self_id: ReplicaId, seeded: Vec<ReplicaId>) -> Self {
        let mut members = Vec::new();
        for replica in seeded {
            if !members.contains(&replica) {
                members.push(replica);
            }
        }
        Self {
            self_id,
            members: Mutex::new(members),
        }
    }

    /// This replica's own id.
    pub fn self_id(&self) -> &ReplicaId {
        &self.self_id
    }

    /// Add a replica. Returns false if it was already present.
    pub fn add(&self, replica: ReplicaId) -> bool {
        let mut members = self.members.lock();
        if members.contains(&replica) {
            return false;
        }
        members.push(replica);
        true
    }

    /// Remove a replica. Returns false if it was absent.
    pub fn remove(&self, replica: &ReplicaId) -> bool {
        let mut members = self.members.lock();
        if let Some(index) = members.iter().position(|r| r == replica) {
            members.remove(index);
            true
        } else {
            false
        }
    }

    /// Check membership.
    pub fn contains(&self, replica: &ReplicaId) -> bool {
        self.members.lock().contains(replica)
    }

    /// Snapshot the full view.
    pub fn snapshot(&self) -> Vec<ReplicaId> {
        self.members.lock().clone()
    }

    /// Snapshot the view excluding this replica.
    pub fn peers(&self) -> Vec<ReplicaId> {
        self.members
            .lock()
            .iter()
            .filter(|r| **r != self.self_id)
            .cloned()
            .collect()
    }

    /// Number of replicas currently believed alive.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewManager {
        ViewManager::new(
            ReplicaId::new("a:1"),
            vec![
                ReplicaId::new("a:1"),
                ReplicaId::new("b:1"),
                ReplicaId::new("c:1"),
            ],
        )
    }

    #[test]
    fn test_seeded_view() {
        let view = view();
        assert_eq!(view.len(), 3);
        assert!(view.contains(&ReplicaId::new("b:1")));
    }

    #[test]
    fn test_add_is_idempotent() {
        let view = view();

        assert!(view.add(ReplicaId::new("d:1")));
        assert!(!view.add(ReplicaId::new("d:1")));
        assert_eq!(view.len(), 4);
    }

    #[test]
    fn test_remove() {
        let view = view();

        assert!(view.remove(&ReplicaId::new("b:1")));
        assert!(!view.remove(&ReplicaId::new("b:1")));
        assert_eq!(view.len(), 2);
        assert!(!view.contains(&ReplicaId::new("b:1")));
    }

    #[test]
    fn test_peers_excludes_self() {
        let view = view();
        let peers = view.peers();

        assert_eq!(peers.len(), 2);
        assert!(!peers.contains(&ReplicaId::new("a:1")));
    }

    #[test]
    fn test_seed_deduplicates() {
        let view = ViewManager::new(
            ReplicaId::new("a:1"),
            vec![ReplicaId::new("a:1"), ReplicaId::new("a:1"), ReplicaId::new("b:1")],
        );
        assert_eq!(view.len(), 2);
    }
}
