//! Strata Shard Placement
//!
//! The shard map: the authoritative assignment of replicas to shards. The
//! hash ring is always derived from this map, so any node holding the same
//! map computes the same key routing. Distribution slices the ordered view
//! into contiguous runs, which keeps the assignment deterministic across
//! nodes that agree on the view.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::ring::HashRing;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_common::{ReplicaId, Result, ShardId, StrataError};

/// Minimum replicas per shard for fault tolerance.
pub const MIN_REPLICAS_PER_SHARD: usize = 2;

// =============================================================================
// Shard Map
// =============================================================================

/// Mapping from shard id to its ordered member list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardMap {
    shards: BTreeMap<ShardId, Vec<ReplicaId>>,
}

impl ShardMap {
    /// Create an empty map (non-sharded mode).
    pub fn new() -> Self {
        Self {
            shards: BTreeMap::new(),
        }
    }

    /// Evenly distribute nodes into `shard_count` shards: each shard gets a
    /// contiguous run of `floor(n / shard_count)` nodes, and the remainder
    /// goes one node each to the lowest-numbered shards.
    pub fn distribute(shard_count: usize, nodes: &[ReplicaId]) -> Self {
        let mut shards = BTreeMap::new();
        if shard_count == 0 {
            return Self { shards };
        }

        let base = nodes.len() / shard_count;
        let remainder = nodes.len() % shard_count;

        for i in 0..shard_count {
            let members: Vec<ReplicaId> = nodes[base * i..base * i + base].to_vec();
            shards.insert(ShardId::numbered(i), members);
        }
        for i in 0..remainder {
            if let Some(members) = shards.get_mut(&ShardId::numbered(i)) {
                members.push(nodes[base * shard_count + i].clone());
            }
        }

        Self { shards }
    }

    /// Reject a target shard count that cannot give every shard at least
    /// two replicas.
    pub fn ensure_fault_tolerance(shard_count: usize, node_count: usize) -> Result<()> {
        if shard_count == 0 || node_count / shard_count < MIN_REPLICAS_PER_SHARD {
            return Err(StrataError::InsufficientNodes);
        }
        Ok(())
    }

    /// All shard ids, in order.
    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shards.keys().cloned().collect()
    }

    /// Members of a shard.
    pub fn members(&self, shard: &ShardId) -> Option<Vec<ReplicaId>> {
        self.shards.get(shard).cloned()
    }

    /// Check whether a shard exists.
    pub fn contains(&self, shard: &ShardId) -> bool {
        self.shards.contains_key(shard)
    }

    /// The shard a node belongs to, if any.
    pub fn shard_for_node(&self, node: &ReplicaId) -> Option<ShardId> {
        self.shards
            .iter()
            .find(|(_, members)| members.contains(node))
            .map(|(shard, _)| shard.clone())
    }

    /// The first member of a shard, used when any one member will do.
    pub fn choose_node(&self, shard: &ShardId) -> Option<ReplicaId> {
        self.shards.get(shard).and_then(|members| members.first().cloned())
    }

    /// Add a node to a shard's member list. Returns false if it was already
    /// a member; errors if the shard is unknown.
    pub fn add_member(&mut self, shard: &ShardId, node: ReplicaId) -> Result<bool> {
        let members = self
            .shards
            .get_mut(shard)
            .ok_or_else(|| StrataError::ShardNotFound(shard.to_string()))?;
        if members.contains(&node) {
            return Ok(false);
        }
        members.push(node);
        Ok(true)
    }

    /// Remove a node from every shard's member list.
    pub fn remove_node(&mut self, node: &ReplicaId) {
        for members in self.shards.values_mut() {
            members.retain(|m| m != node);
        }
    }

    /// Build the hash ring derived from this map's shard ids.
    pub fn build_ring(&self) -> HashRing {
        HashRing::with_members(self.shards.keys().cloned())
    }

    /// Number of shards.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(count: usize) -> Vec<ReplicaId> {
        (0..count).map(|i| ReplicaId::new(format!("n{}:8090", i))).collect()
    }

    #[test]
    fn test_distribute_even() {
        let map = ShardMap::distribute(2, &nodes(6));

        assert_eq!(map.len(), 2);
        assert_eq!(map.members(&ShardId::numbered(0)).unwrap().len(), 3);
        assert_eq!(map.members(&ShardId::numbered(1)).unwrap().len(), 3);
    }

    #[test]
    fn test_distribute_remainder_goes_to_low_shards() {
        let map = ShardMap::distribute(3, &nodes(7));

        let shard0 = map.members(&ShardId::numbered(0)).unwrap();
        let shard1 = map.members(&ShardId::numbered(1)).unwrap();
        let shard2 = map.members(&ShardId::numbered(2)).unwrap();

        assert_eq!(shard0.len(), 3);
        assert_eq!(shard1.len(), 2);
        assert_eq!(shard2.len(), 2);
        // The remainder node is the last of the input list.
        assert_eq!(shard0[2], ReplicaId::new("n6:8090"));
    }

    #[test]
    fn test_distribute_covers_every_node_once() {
        let all = nodes(8);
        let map = ShardMap::distribute(3, &all);

        let mut seen = Vec::new();
        for shard in map.shard_ids() {
            seen.extend(map.members(&shard).unwrap());
        }
        seen.sort();
        let mut expected = all.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_distribute_is_deterministic() {
        let all = nodes(6);
        assert_eq!(ShardMap::distribute(2, &all), ShardMap::distribute(2, &all));
    }

    #[test]
    fn test_fault_tolerance_precondition() {
        assert!(ShardMap::ensure_fault_tolerance(2, 6).is_ok());
        assert!(ShardMap::ensure_fault_tolerance(3, 6).is_ok());
        assert!(matches!(
            ShardMap::ensure_fault_tolerance(4, 6),
            Err(StrataError::InsufficientNodes)
        ));
        assert!(matches!(
            ShardMap::ensure_fault_tolerance(0, 6),
            Err(StrataError::InsufficientNodes)
        ));
    }

    #[test]
    fn test_shard_for_node() {
        let map = ShardMap::distribute(2, &nodes(4));

        assert_eq!(
            map.shard_for_node(&ReplicaId::new("n0:8090")),
            Some(ShardId::numbered(0))
        );
        assert_eq!(
            map.shard_for_node(&ReplicaId::new("n3:8090")),
            Some(ShardId::numbered(1))
        );
        assert_eq!(map.shard_for_node(&ReplicaId::new("other:1")), None);
    }

    #[test]
    fn test_add_member() {
        let mut map = ShardMap::distribute(2, &nodes(4));
        let shard = ShardId::numbered(0);

        assert!(map.add_member(&shard, ReplicaId::new("n9:8090")).unwrap());
        assert!(!map.add_member(&shard, ReplicaId::new("n9:8090")).unwrap());
        assert!(map
            .add_member(&ShardId::new("shard9"), ReplicaId::new("n9:8090"))
            .is_err());
    }

    #[test]
    fn test_remove_node_purges_all_shards() {
        let mut map = ShardMap::distribute(2, &nodes(4));
        let node = ReplicaId::new("n1:8090");

        map.remove_node(&node);
        assert_eq!(map.shard_for_node(&node), None);
    }

    #[test]
    fn test_build_ring_matches_shard_ids() {
        let map = ShardMap::distribute(3, &nodes(6));
        let ring = map.build_ring();

        assert_eq!(ring.member_count(), 3);
        let owner = ring.locate("some-key").unwrap();
        assert!(map.contains(owner));
    }

    #[test]
    fn test_serde_round_trip() {
        let map = ShardMap::distribute(2, &nodes(4));
        let encoded = serde_json::to_string(&map).unwrap();
        let decoded: ShardMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, map);
    }
}
