// ── In-memory backend ──
//
// Process-local `KvStore` over DashMap. Per-key atomicity comes from
// DashMap's shard locks: every conditional mutation runs entirely under
// the entry guard for its key. Expiry is lazy -- expired entries are
// treated as absent and reaped when touched.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::StoreError;
use crate::kv::{KvStore, ScanPage};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            expires_at: None,
        }
    }

    fn expiring(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_owned(),
            expires_at: Some(Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process `KvStore` backend.
///
/// Used by tests and embedded deployments. Suitable for a single
/// process only -- nothing is shared or persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries. Test helper.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|r| !r.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.slots.get(key) {
            Some(slot) if !slot.is_expired() => Ok(Some(slot.value.clone())),
            Some(_) => {
                drop(self.slots.remove_if(key, |_, slot| slot.is_expired()));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.slots.insert(key.to_owned(), Slot::live(value));
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        self.slots.insert(
            key.to_owned(),
            Slot::expiring(value, Duration::from_secs(ttl_seconds)),
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Slot::live(value));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::live(value));
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new_value: &str,
    ) -> Result<bool, StoreError> {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get();
                if slot.is_expired() || slot.value != expected {
                    return Ok(false);
                }
                // A successful swap clears any expiry, matching SET semantics
                // on the REST backend.
                occupied.insert(Slot::live(new_value));
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        match self.slots.entry(key.to_owned()) {
            Entry::Occupied(occupied) => {
                let slot = occupied.get();
                if slot.is_expired() || slot.value != expected {
                    return Ok(false);
                }
                occupied.remove();
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let removed = self.slots.remove(key);
        Ok(removed.is_some_and(|(_, slot)| !slot.is_expired()))
    }

    async fn scan(&self, prefix: &str, cursor: u64, limit: usize) -> Result<ScanPage, StoreError> {
        // Snapshot + sort so the cursor (a plain offset) stays stable
        // enough across pages. Mutations between pages may skip or repeat
        // keys, same as a SCAN on the REST backend.
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|r| r.key().starts_with(prefix) && !r.value().is_expired())
            .map(|r| r.key().clone())
            .collect();
        keys.sort_unstable();

        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(keys.len());
        let end = start.saturating_add(limit.max(1)).min(keys.len());
        let next = if end >= keys.len() {
            0
        } else {
            u64::try_from(end).unwrap_or(0)
        };

        Ok(ScanPage {
            keys: keys[start..end].to_vec(),
            cursor: next,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        store.set("tier200-abc123", "valid").await.unwrap();
        assert_eq!(
            store.get("tier200-abc123").await.unwrap().as_deref(),
            Some("valid")
        );
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let store = MemoryStore::new();
        store.set_with_ttl("probe", "ok", 0).await.unwrap();
        assert_eq!(store.get("probe").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_respects_existing() {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("k", "v1").await.unwrap());
        assert!(!store.set_if_absent("k", "v2").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn set_if_absent_reclaims_expired_key() {
        let store = MemoryStore::new();
        store.set_with_ttl("k", "stale", 0).await.unwrap();
        assert!(store.set_if_absent("k", "fresh").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn cas_only_swaps_on_match() {
        let store = MemoryStore::new();
        store.set("k", "valid").await.unwrap();

        assert!(!store.compare_and_swap("k", "used", "x").await.unwrap());
        assert!(store.compare_and_swap("k", "valid", "used").await.unwrap());
        assert!(!store.compare_and_swap("k", "valid", "used").await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("used"));
    }

    #[tokio::test]
    async fn cad_only_deletes_on_match() {
        let store = MemoryStore::new();
        store.set("k", "valid").await.unwrap();

        assert!(!store.compare_and_delete("k", "used").await.unwrap());
        assert!(store.compare_and_delete("k", "valid").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.compare_and_delete("k", "valid").await.unwrap());
    }

    #[tokio::test]
    async fn scan_pages_through_prefix() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.set(&format!("tier200-{i:06}"), "valid").await.unwrap();
        }
        store.set("tier500-zzzzzz", "valid").await.unwrap();

        let mut seen = Vec::new();
        let mut cursor = 0;
        loop {
            let page = store.scan("tier200-", cursor, 2).await.unwrap();
            let done = page.is_last();
            cursor = page.cursor;
            seen.extend(page.keys);
            if done {
                break;
            }
        }

        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|k| k.starts_with("tier200-")));
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }
}
