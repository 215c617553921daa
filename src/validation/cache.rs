//! Process-wide cache of authoritative lookup results.

use super::IdentifierKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    valid: bool,
    inserted_at: Instant,
}

/// Bounded map from `(kind, identifier)` to the authority's answer.
///
/// Only definite answers are stored; unavailable lookups are retried on the
/// next batch. When full, the oldest entry is evicted.
#[derive(Debug)]
pub struct ValidationCache {
    entries: RwLock<HashMap<(IdentifierKind, String), CacheEntry>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValidationCache {
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, kind: IdentifierKind, identifier: &str) -> Option<bool> {
        let entries = self.entries.read().expect("cache lock poisoned");
        let found = entries
            .get(&(kind, identifier.to_string()))
            .map(|e| e.valid);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put(&self, kind: IdentifierKind, identifier: &str, valid: bool) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        let key = (kind, identifier.to_string());
        if !entries.contains_key(&key) {
            while entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        entries.remove(&k);
                    }
                    None => break,
                }
            }
        }
        entries.insert(
            key,
            CacheEntry {
                valid,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop the given identifiers (e.g. those belonging to a deleted scan).
    pub fn evict<'a>(&self, kind: IdentifierKind, identifiers: impl IntoIterator<Item = &'a str>) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        for identifier in identifiers {
            entries.remove(&(kind, identifier.to_string()));
        }
    }

    pub fn clear(&self) {
        self.entries.write().expect("cache lock poisoned").clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(hits, misses)` since creation
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}
