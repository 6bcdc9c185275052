// ── Key-value store contract ──
//
// The storage seam of the whole system. Conditional mutations
// (compare-and-swap / compare-and-delete) are the only serialization
// point the upper layers rely on; every backend must execute the
// compare and the mutation as one atomic step per key.

use std::future::Future;

use crate::error::StoreError;

/// One page of a prefix scan.
///
/// `cursor == 0` means the iteration is complete; any other value is an
/// opaque token to pass back for the next page. Keys within and across
/// pages carry no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    pub cursor: u64,
}

impl ScanPage {
    /// Whether this page ends the iteration.
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Async key-value store with optional expiry and per-key conditional
/// mutation.
///
/// Implementations must guarantee that `set_if_absent`,
/// `compare_and_swap`, and `compare_and_delete` are atomic with respect
/// to concurrent callers on the same key, including callers in other
/// process instances sharing the backend.
pub trait KvStore: Send + Sync {
    /// Fetch a value. `None` if the key is absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Unconditionally set a value.
    fn set(&self, key: &str, value: &str)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Set a value that expires after `ttl_seconds`.
    fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Create the key only if it does not already exist.
    /// Returns `false` when the key was already present.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically replace the value only if the current value equals
    /// `expected`. Returns `false` when the key is absent or holds a
    /// different value.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new_value: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Atomically delete the key only if the current value equals
    /// `expected`. Returns `false` when the key is absent or holds a
    /// different value.
    fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Delete a key. Returns `true` if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Fetch one page of keys matching `prefix`, resuming from `cursor`
    /// (`0` to start). `limit` is a hint, not a guarantee -- backends may
    /// return fewer or slightly more keys per page.
    fn scan(
        &self,
        prefix: &str,
        cursor: u64,
        limit: usize,
    ) -> impl Future<Output = Result<ScanPage, StoreError>> + Send;
}
