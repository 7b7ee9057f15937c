//! Strata Consistent Hashing
//!
//! Consistent-hash ring mapping keys to shard identifiers. The ring hashes a
//! fixed number of partitions onto the members' virtual nodes with a bounded
//! per-member load, so every node that shares the same member set computes
//! the same key-to-shard assignment.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use std::collections::{BTreeMap, HashMap};
use strata_common::ShardId;
use xxhash_rust::xxh64::xxh64;

/// Number of partitions the key space is divided into.
pub const PARTITION_COUNT: u64 = 11;

/// Virtual nodes per ring member.
pub const REPLICATION_FACTOR: usize = 5;

/// Upper bound on a member's partition load, relative to the average.
pub const LOAD_FACTOR: f64 = 1.10;

// =============================================================================
// Hash Ring
// =============================================================================

/// A consistent-hash ring whose members are shard identifiers.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    ring: BTreeMap<u64, ShardId>,
    partitions: HashMap<u64, ShardId>,
    members: Vec<ShardId>,
}

impl HashRing {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ring populated with the given members.
    pub fn with_members(members: impl IntoIterator<Item = ShardId>) -> Self {
        let mut ring = Self::new();
        for member in members {
            ring.add(member);
        }
        ring
    }

    /// Add a member and redistribute partitions.
    pub fn add(&mut self, member: ShardId) {
        if self.members.contains(&member) {
            return;
        }
        for index in 0..REPLICATION_FACTOR {
            let position = xxh64(format!("{}{}", member, index).as_bytes(), 0);
            self.ring.insert(position, member.clone());
        }
        self.members.push(member);
        self.distribute_partitions();
    }

    /// Remove a member and redistribute partitions.
    pub fn remove(&mut self, member: &ShardId) {
        if !self.members.contains(member) {
            return;
        }
        self.ring.retain(|_, m| m != member);
        self.members.retain(|m| m != member);
        self.distribute_partitions();
    }

    /// The shard owning a key.
    pub fn locate(&self, key: &str) -> Option<&ShardId> {
        if self.partitions.is_empty() {
            return None;
        }
        let partition = xxh64(key.as_bytes(), 0) % PARTITION_COUNT;
        self.partitions.get(&partition)
    }

    /// All ring members.
    pub fn members(&self) -> &[ShardId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Maximum partitions a single member may own.
    fn average_load(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        ((PARTITION_COUNT as f64 / self.members.len() as f64) * LOAD_FACTOR).ceil()
    }

    /// Assign every partition to a member, walking the ring clockwise from
    /// the partition's hash position and skipping members already at the
    /// load bound.
    fn distribute_partitions(&mut self) {
        self.partitions.clear();
        if self.members.is_empty() {
            return;
        }

        let capacity = self.average_load();
        let mut loads: HashMap<ShardId, f64> = HashMap::new();
        let positions: Vec<&u64> = self.ring.keys().collect();

        for partition in 0..PARTITION_COUNT {
            let hash = xxh64(&partition.to_le_bytes(), 0);
            let start = positions.partition_point(|&&p| p < hash) % positions.len();

            for step in 0..positions.len() {
                let position = positions[(start + step) % positions.len()];
                let candidate = &self.ring[position];
                let load = loads.entry(candidate.clone()).or_insert(0.0);
                if *load + 1.0 <= capacity {
                    *load += 1.0;
                    self.partitions.insert(partition, candidate.clone());
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(count: usize) -> HashRing {
        HashRing::with_members((0..count).map(ShardId::numbered))
    }

    #[test]
    fn test_empty_ring_locates_nothing() {
        let ring = HashRing::new();
        assert!(ring.locate("key").is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_locate_is_deterministic() {
        let ring = ring(3);

        let first = ring.locate("some-key").unwrap().clone();
        for _ in 0..10 {
            assert_eq!(ring.locate("some-key").unwrap(), &first);
        }
    }

    #[test]
    fn test_same_member_set_same_placement() {
        // Members added in different orders must agree on key ownership.
        let ring1 = HashRing::with_members(vec![
            ShardId::numbered(0),
            ShardId::numbered(1),
            ShardId::numbered(2),
        ]);
        let ring2 = HashRing::with_members(vec![
            ShardId::numbered(2),
            ShardId::numbered(0),
            ShardId::numbered(1),
        ]);

        for i in 0..100 {
            let key = format!("key_{}", i);
            assert_eq!(ring1.locate(&key), ring2.locate(&key));
        }
    }

    #[test]
    fn test_every_partition_is_owned() {
        let ring = ring(2);
        for partition in 0..PARTITION_COUNT {
            assert!(ring.partitions.contains_key(&partition));
        }
    }

    #[test]
    fn test_load_bound_respected() {
        let ring = ring(3);
        let capacity = ring.average_load();

        let mut counts: HashMap<&ShardId, usize> = HashMap::new();
        for owner in ring.partitions.values() {
            *counts.entry(owner).or_insert(0) += 1;
        }

        assert_eq!(counts.len(), 3, "every member should own partitions");
        for count in counts.values() {
            assert!(*count as f64 <= capacity);
        }
    }

    #[test]
    fn test_removed_member_owns_nothing() {
        let mut ring = ring(3);
        let removed = ShardId::numbered(2);
        ring.remove(&removed);

        assert_eq!(ring.member_count(), 2);
        for i in 0..50 {
            let owner = ring.locate(&format!("key_{}", i)).unwrap();
            assert_ne!(owner, &removed);
        }
    }

    #[test]
    fn test_single_member_owns_everything() {
        let ring = ring(1);
        for i in 0..20 {
            assert_eq!(ring.locate(&format!("k{}", i)).unwrap(), &ShardId::numbered(0));
        }
    }
}
