//! Strata Vector Clocks
//!
//! Vector clocks for tracking causality between writes. Every replica known
//! to the cluster appears as an entry (zero until its first write), entries
//! are never removed, and the serialized form is a canonical JSON object so
//! that identical clocks serialize identically on every replica.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use strata_common::{ReplicaId, Result, StrataError};

// =============================================================================
// Vector Clock
// =============================================================================

/// A vector clock mapping replica ids to write counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    clocks: BTreeMap<String, u64>,
}

impl VectorClock {
    /// Create a new empty vector clock.
    pub fn new() -> Self {
        Self {
            clocks: BTreeMap::new(),
        }
    }

    /// Create a vector clock with a zero entry for each replica.
    pub fn with_replicas<'a>(replicas: impl IntoIterator<Item = &'a ReplicaId>) -> Self {
        let mut clock = Self::new();
        for replica in replicas {
            clock.set(replica, 0);
        }
        clock
    }

    /// Increment the counter for a replica.
    pub fn tick(&mut self, replica: &ReplicaId) {
        *self.clocks.entry(replica.as_str().to_string()).or_insert(0) += 1;
    }

    /// Get the counter for a replica (missing entries read as 0).
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.clocks.get(replica.as_str()).copied().unwrap_or(0)
    }

    /// Assign the counter for a replica.
    pub fn set(&mut self, replica: &ReplicaId, value: u64) {
        self.clocks.insert(replica.as_str().to_string(), value);
    }

    /// Ensure an entry exists for a replica, initializing it to zero.
    pub fn ensure(&mut self, replica: &ReplicaId) {
        self.clocks.entry(replica.as_str().to_string()).or_insert(0);
    }

    /// Merge with another clock, taking the componentwise maximum.
    pub fn merge(&mut self, other: &VectorClock) {
        for (replica, &value) in &other.clocks {
            let current = self.clocks.entry(replica.clone()).or_insert(0);
            *current = (*current).max(value);
        }
    }

    /// Check if this clock happened strictly before another.
    pub fn happened_before(&self, other: &VectorClock) -> bool {
        let mut dominated = false;

        for (replica, &value) in &self.clocks {
            let other_value = other.clocks.get(replica).copied().unwrap_or(0);
            if value > other_value {
                return false;
            }
            if value < other_value {
                dominated = true;
            }
        }

        for (replica, &value) in &other.clocks {
            if !self.clocks.contains_key(replica) && value > 0 {
                dominated = true;
            }
        }

        dominated
    }

    /// Check if this clock happened strictly after another.
    pub fn happened_after(&self, other: &VectorClock) -> bool {
        other.happened_before(self)
    }

    /// Check if two clocks are concurrent (neither happened before the other
    /// and they are not equal).
    pub fn is_concurrent(&self, other: &VectorClock) -> bool {
        self.compare(other) == ClockOrdering::Concurrent
    }

    /// Check if two clocks are identical (zero entries count as absent).
    pub fn equals(&self, other: &VectorClock) -> bool {
        for (replica, &value) in &self.clocks {
            if other.clocks.get(replica).copied().unwrap_or(0) != value {
                return false;
            }
        }
        for (replica, &value) in &other.clocks {
            if self.clocks.get(replica).copied().unwrap_or(0) != value {
                return false;
            }
        }
        true
    }

    /// Compare two vector clocks under the happens-before lattice.
    pub fn compare(&self, other: &VectorClock) -> ClockOrdering {
        if self.equals(other) {
            ClockOrdering::Equal
        } else if self.happened_before(other) {
            ClockOrdering::Before
        } else if self.happened_after(other) {
            ClockOrdering::After
        } else {
            ClockOrdering::Concurrent
        }
    }

    /// The number of replicas tracked.
    pub fn replica_count(&self) -> usize {
        self.clocks.len()
    }

    /// Iterate over (replica id, counter) entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, u64)> {
        self.clocks.iter().map(|(replica, &value)| (replica.as_str(), value))
    }

    /// Check if the clock is empty (no entries or all zeros).
    pub fn is_empty(&self) -> bool {
        self.clocks.values().all(|&v| v == 0)
    }

    /// Serialize as a canonical JSON object. Keys are emitted in sorted
    /// order, so equal clocks always serialize to the same string.
    pub fn to_metadata(&self) -> String {
        serde_json::to_string(&self.clocks).unwrap_or_else(|_| "{}".to_string())
    }

    /// Parse from the canonical JSON form. The empty string parses to the
    /// empty clock.
    pub fn from_metadata(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Ok(Self::new());
        }
        let clocks: BTreeMap<String, u64> =
            serde_json::from_str(raw).map_err(|_| StrataError::InvalidMetadata)?;
        Ok(Self { clocks })
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for VectorClock {}

impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            ClockOrdering::Equal => Some(Ordering::Equal),
            ClockOrdering::Before => Some(Ordering::Less),
            ClockOrdering::After => Some(Ordering::Greater),
            ClockOrdering::Concurrent => None,
        }
    }
}

impl std::fmt::Display for VectorClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_metadata())
    }
}

// =============================================================================
// Clock Ordering
// =============================================================================

/// Result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    /// First clock happened before second.
    Before,
    /// First clock happened after second.
    After,
    /// Clocks are equal.
    Equal,
    /// Clocks are concurrent (incomparable).
    Concurrent,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(id: &str) -> ReplicaId {
        ReplicaId::new(id)
    }

    #[test]
    fn test_vector_clock_basic() {
        let mut clock = VectorClock::new();
        let a = replica("a:1");
        let b = replica("b:1");

        clock.tick(&a);
        clock.tick(&a);
        clock.tick(&b);

        assert_eq!(clock.get(&a), 2);
        assert_eq!(clock.get(&b), 1);
        assert_eq!(clock.replica_count(), 2);
    }

    #[test]
    fn test_vector_clock_happened_before() {
        let a = replica("a:1");
        let b = replica("b:1");

        let mut clock1 = VectorClock::new();
        clock1.set(&a, 1);
        clock1.set(&b, 1);

        let mut clock2 = VectorClock::new();
        clock2.set(&a, 2);
        clock2.set(&b, 2);

        assert!(clock1.happened_before(&clock2));
        assert!(!clock2.happened_before(&clock1));
        assert!(clock2.happened_after(&clock1));
    }

    #[test]
    fn test_vector_clock_concurrent() {
        let a = replica("a:1");
        let b = replica("b:1");

        let mut clock1 = VectorClock::new();
        clock1.set(&a, 2);
        clock1.set(&b, 1);

        let mut clock2 = VectorClock::new();
        clock2.set(&a, 1);
        clock2.set(&b, 2);

        assert!(clock1.is_concurrent(&clock2));
        assert_eq!(clock1.compare(&clock2), ClockOrdering::Concurrent);
    }

    #[test]
    fn test_vector_clock_merge() {
        let a = replica("a:1");
        let b = replica("b:1");

        let mut clock1 = VectorClock::new();
        clock1.set(&a, 2);
        clock1.set(&b, 1);

        let mut clock2 = VectorClock::new();
        clock2.set(&a, 1);
        clock2.set(&b, 3);

        clock1.merge(&clock2);

        assert_eq!(clock1.get(&a), 2);
        assert_eq!(clock1.get(&b), 3);
    }

    #[test]
    fn test_zero_entries_compare_as_absent() {
        let a = replica("a:1");
        let b = replica("b:1");

        let mut clock1 = VectorClock::new();
        clock1.set(&a, 1);
        clock1.set(&b, 0);

        let mut clock2 = VectorClock::new();
        clock2.set(&a, 1);

        assert_eq!(clock1.compare(&clock2), ClockOrdering::Equal);
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut clock = VectorClock::new();
        clock.set(&replica("b:1"), 3);
        clock.set(&replica("a:1"), 1);

        let raw = clock.to_metadata();
        let parsed = VectorClock::from_metadata(&raw).unwrap();
        assert_eq!(parsed, clock);
    }

    #[test]
    fn test_metadata_is_canonical() {
        let mut clock1 = VectorClock::new();
        clock1.set(&replica("b:1"), 2);
        clock1.set(&replica("a:1"), 1);

        let mut clock2 = VectorClock::new();
        clock2.set(&replica("a:1"), 1);
        clock2.set(&replica("b:1"), 2);

        assert_eq!(clock1.to_metadata(), clock2.to_metadata());
        assert_eq!(clock1.to_metadata(), r#"{"a:1":1,"b:1":2}"#);
    }

    #[test]
    fn test_empty_metadata_parses_to_empty_clock() {
        let clock = VectorClock::from_metadata("").unwrap();
        assert!(clock.is_empty());
        assert_eq!(clock.replica_count(), 0);
    }

    #[test]
    fn test_invalid_metadata_rejected() {
        assert!(VectorClock::from_metadata("not json").is_err());
        assert!(VectorClock::from_metadata(r#"{"a:1":-4}"#).is_err());
    }

    #[test]
    fn test_partial_ord() {
        let a = replica("a:1");

        let mut clock1 = VectorClock::new();
        clock1.set(&a, 1);

        let mut clock2 = VectorClock::new();
        clock2.set(&a, 2);

        assert!(clock1 < clock2);
        assert!(clock2 > clock1);
    }

    #[test]
    fn test_with_replicas_starts_at_zero() {
        let view = vec![replica("a:1"), replica("b:1")];
        let clock = VectorClock::with_replicas(&view);

        assert_eq!(clock.replica_count(), 2);
        assert!(clock.is_empty());
        assert_eq!(clock.get(&replica("a:1")), 0);
    }
}
