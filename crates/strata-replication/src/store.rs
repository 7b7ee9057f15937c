//! Strata Key-Value Store
//!
//! The in-memory key-value map. Values are opaque JSON terms preserved
//! verbatim alongside a client-supplied type tag. The store itself holds no
//! lock: the causal engine owns it behind the same mutex as the vector
//! clock, so a write's predicate evaluation, clock bump, and mutation form
//! one critical section.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strata_common::{Result, StoredValue, StrataError};

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 50;

// =============================================================================
// Put Outcome
// =============================================================================

/// Result of a put: whether the key was freshly created or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Replaced,
}

impl PutOutcome {
    /// The wire label for this outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            PutOutcome::Created => "created",
            PutOutcome::Replaced => "replaced",
        }
    }
}

// =============================================================================
// KV Store
// =============================================================================

/// In-memory map from key to stored record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvStore {
    entries: HashMap<String, StoredValue>,
}

impl KvStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Validate a write's key and value against the store contracts.
    pub fn validate(key: &str, value: &serde_json::Value) -> Result<()> {
        if key.len() > MAX_KEY_LEN {
            return Err(StrataError::KeyTooLong);
        }
        if value.is_null() || value.as_str() == Some("") {
            return Err(StrataError::NoValue);
        }
        Ok(())
    }

    /// Insert or replace a record.
    pub fn put(&mut self, key: &str, record: StoredValue) -> Result<PutOutcome> {
        Self::validate(key, &record.value)?;
        match self.entries.insert(key.to_string(), record) {
            Some(_) => Ok(PutOutcome::Replaced),
            None => Ok(PutOutcome::Created),
        }
    }

    /// Insert or replace a record without contract checks. Used for reshard
    /// hand-offs and sync, where the record was validated at its origin.
    pub fn put_unchecked(&mut self, key: &str, record: StoredValue) {
        self.entries.insert(key.to_string(), record);
    }

    /// Look up a record.
    pub fn get(&self, key: &str) -> Option<&StoredValue> {
        self.entries.get(key)
    }

    /// Remove a record.
    pub fn delete(&mut self, key: &str) -> Result<StoredValue> {
        self.entries.remove(key).ok_or(StrataError::KeyNotFound)
    }

    /// Remove a record without reporting whether it existed.
    pub fn evict(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Number of stored keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot the full map.
    pub fn snapshot(&self) -> HashMap<String, StoredValue> {
        self.entries.clone()
    }

    /// Replace the full map wholesale (anti-entropy sync).
    pub fn replace_all(&mut self, entries: HashMap<String, StoredValue>) {
        self.entries = entries;
    }
}

// =============================================================================
// Tests
// =============================================================================
