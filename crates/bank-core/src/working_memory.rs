//! Working Memory
//!
//! A short-lived in-process cache keyed by bank, holding the last N
//! recalled memory ids to bias subsequent recalls. Not
//! persisted, and optional: its absence must not break correctness of any
//! recall, only the biasing.

use std::collections::HashMap;
use std::sync::Mutex;

use lru::LruCache;

const DEFAULT_CAPACITY: usize = 32;

/// One bank's recently recalled ids, most-recent first.
struct BankWindow {
    ids: std::collections::VecDeque<String>,
    capacity: usize,
}

impl BankWindow {
    fn new(capacity: usize) -> Self {
        Self {
            ids: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push_many(&mut self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            self.ids.retain(|existing| existing != &id);
            self.ids.push_front(id);
        }
        while self.ids.len() > self.capacity {
            self.ids.pop_back();
        }
    }
}

/// Per-bank working memory, capped in total number of banks tracked via an
/// LRU eviction policy so a long-running process with many banks doesn't
/// grow unbounded.
pub struct WorkingMemory {
    banks: Mutex<LruCache<String, BankWindow>>,
    capacity_per_bank: usize,
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WorkingMemory {
    pub fn new(capacity_per_bank: usize) -> Self {
        Self {
            banks: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(256).expect("256 is non-zero"))),
            capacity_per_bank,
        }
    }

    /// Record that `ids` were just recalled for `bank_id`, most-recent
    /// first.
    pub fn record(&self, bank_id: &str, ids: impl IntoIterator<Item = String>) {
        let mut banks = self.banks.lock().unwrap_or_else(|e| e.into_inner());
        if !banks.contains(bank_id) {
            banks.put(bank_id.to_string(), BankWindow::new(self.capacity_per_bank));
        }
        if let Some(window) = banks.get_mut(bank_id) {
            window.push_many(ids);
        }
    }

    /// The ids currently held for `bank_id`, most-recent first.
    pub fn recent(&self, bank_id: &str) -> Vec<String> {
        let mut banks = self.banks.lock().unwrap_or_else(|e| e.into_inner());
        banks
            .get(bank_id)
            .map(|w| w.ids.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_recent_roundtrip() {
        let wm = WorkingMemory::default();
        wm.record("b1", vec!["m1".to_string(), "m2".to_string()]);
        assert_eq!(wm.recent("b1"), vec!["m2".to_string(), "m1".to_string()]);
    }

    #[test]
    fn capacity_is_respected() {
        let wm = WorkingMemory::new(2);
        wm.record("b1", vec!["m1".to_string()]);
        wm.record("b1", vec!["m2".to_string()]);
        wm.record("b1", vec!["m3".to_string()]);
        assert_eq!(wm.recent("b1"), vec!["m3".to_string(), "m2".to_string()]);
    }

    #[test]
    fn unknown_bank_returns_empty() {
        let wm = WorkingMemory::default();
        assert!(wm.recent("missing").is_empty());
    }
}
