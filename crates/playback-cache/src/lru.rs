//! Size-bounded LRU index of cached files.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One locally cached remote video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub last_accessed_at: DateTime<Utc>,
}

/// What an insert did.
#[derive(Debug, Default, PartialEq)]
pub struct InsertOutcome {
    /// Entries pushed out, least recently used first.
    pub evicted: Vec<CacheEntry>,

    /// The new entry alone exceeds the cap and was not retained.
    pub rejected: bool,
}

/// Entries ordered by recency with a running byte total.
#[derive(Debug)]
pub struct SizedLru {
    entries: HashMap<String, CacheEntry>,
    /// Front is least recently used.
    order: VecDeque<String>,
    total_bytes: u64,
    cap_bytes: u64,
}

impl SizedLru {
    pub fn new(cap_bytes: u64) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            total_bytes: 0,
            cap_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn cap_bytes(&self) -> u64 {
        self.cap_bytes
    }

    /// Look up `key` and mark it most recently used.
    pub fn touch(&mut self, key: &str) -> Option<&CacheEntry> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.promote(key);
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = Utc::now();
        Some(&*entry)
    }

    pub fn peek(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert as most recently used, then evict least recently used
    /// entries until the total fits the cap. The new entry is never
    /// evicted to make room; if it alone exceeds the cap it is rejected
    /// and nothing else is evicted.
    pub fn insert(&mut self, entry: CacheEntry) -> InsertOutcome {
        let mut outcome = InsertOutcome::default();
        if let Some(old) = self.remove(&entry.key) {
            // Same key refetched; the old file is stale.
            outcome.evicted.push(old);
        }
        if entry.size_bytes > self.cap_bytes {
            outcome.rejected = true;
            return outcome;
        }

        let key = entry.key.clone();
        self.total_bytes += entry.size_bytes;
        self.entries.insert(key.clone(), entry);
        self.order.push_back(key.clone());

        while self.total_bytes > self.cap_bytes {
            let Some(victim) = self.order.front().cloned() else {
                break;
            };
            if victim == key {
                break;
            }
            if let Some(old) = self.remove(&victim) {
                outcome.evicted.push(old);
            }
        }
        outcome
    }

    /// Insert restored entries in the given order (oldest first) without
    /// applying the cap.
    pub(crate) fn restore(&mut self, entry: CacheEntry) {
        self.total_bytes += entry.size_bytes;
        self.order.push_back(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Evict least recently used entries until under the cap.
    pub(crate) fn trim(&mut self) -> Vec<CacheEntry> {
        let mut evicted = Vec::new();
        while self.total_bytes > self.cap_bytes {
            let Some(victim) = self.order.pop_front() else {
                break;
            };
            if let Some(old) = self.entries.remove(&victim) {
                self.total_bytes -= old.size_bytes;
                evicted.push(old);
            }
        }
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Remove everything, least recently used first.
    pub fn drain(&mut self) -> Vec<CacheEntry> {
        let drained = self
            .order
            .drain(..)
            .filter_map(|k| self.entries.remove(&k))
            .collect();
        self.total_bytes = 0;
        drained
    }

    /// Entries from least to most recently used.
    pub fn iter_lru(&self) -> impl Iterator<Item = &CacheEntry> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    fn promote(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}
