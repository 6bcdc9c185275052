// ── Administrative clear workflow ──
//
// Two-step confirm/execute bulk delete. The pending record lives in the
// same store as the codes (under its own keyspace, with a TTL matching
// the confirmation window) so that any process instance can confirm an
// action initiated by another. Expiry is enforced by comparing the
// recorded issue time against the wall clock at confirm time; the TTL
// is only hygiene for abandoned records.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use keydrop_store::KvStore;

use crate::error::CoreError;
use crate::model::Category;
use crate::repo::CodeRepository;

/// Destructive actions that require confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingAction {
    Clear,
}

/// A pending confirmation awaiting its second step. Single slot per
/// requester -- initiating again overwrites the previous record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub requester_id: String,
    pub issued_at: DateTime<Utc>,
    pub action: PendingAction,
}

/// Default confirmation window. Deployments may configure anything in
/// the 10-60 second range.
pub const DEFAULT_CONFIRM_WINDOW: Duration = Duration::from_secs(30);

// Reserved keyspace; cannot collide with codes because category names
// are the only valid code prefixes.
const PENDING_PREFIX: &str = "pending:clear:";

/// Two-step bulk-clear across every category.
pub struct ClearWorkflow<S: KvStore> {
    store: Arc<S>,
    repo: Arc<CodeRepository<S>>,
    window: Duration,
}

impl<S: KvStore> ClearWorkflow<S> {
    pub fn new(store: Arc<S>, repo: Arc<CodeRepository<S>>) -> Self {
        Self {
            store,
            repo,
            window: DEFAULT_CONFIRM_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Step one: record the intent, stamped with the issue time.
    pub async fn initiate(&self, requester_id: &str) -> Result<PendingConfirmation, CoreError> {
        let pending = PendingConfirmation {
            requester_id: requester_id.to_owned(),
            issued_at: Utc::now(),
            action: PendingAction::Clear,
        };
        let payload = serde_json::to_string(&pending)
            .map_err(|e| CoreError::Internal(format!("pending record serialization: {e}")))?;

        self.store
            .set_with_ttl(&pending_key(requester_id), &payload, self.window.as_secs())
            .await?;

        info!(requester_id, window_secs = self.window.as_secs(), "clear initiated");
        Ok(pending)
    }

    /// Step two: execute if a matching, non-expired record exists.
    /// Returns the number of entries deleted across all categories.
    pub async fn confirm(&self, requester_id: &str) -> Result<usize, CoreError> {
        let key = pending_key(requester_id);

        let Some(payload) = self.store.get(&key).await? else {
            return Err(CoreError::NothingPending {
                requester: requester_id.to_owned(),
            });
        };

        let pending: PendingConfirmation = match serde_json::from_str(&payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(requester_id, error = %e, "dropping corrupt pending record");
                self.store.delete(&key).await?;
                return Err(CoreError::NothingPending {
                    requester: requester_id.to_owned(),
                });
            }
        };

        if self.deadline(&pending) < Utc::now() {
            self.store.delete(&key).await?;
            return Err(CoreError::ConfirmationExpired {
                requester: requester_id.to_owned(),
            });
        }

        let deleted = self.repo.delete_all(&Category::ALL).await?;
        self.store.delete(&key).await?;
        info!(requester_id, deleted, "clear confirmed");
        Ok(deleted)
    }

    /// Any other interaction from the requester cancels the pending
    /// action. Returns `true` if there was one to cancel.
    pub async fn cancel(&self, requester_id: &str) -> Result<bool, CoreError> {
        let cancelled = self.store.delete(&pending_key(requester_id)).await?;
        if cancelled {
            info!(requester_id, "pending clear cancelled");
        }
        Ok(cancelled)
    }

    fn deadline(&self, pending: &PendingConfirmation) -> DateTime<Utc> {
        let window = i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX);
        pending.issued_at + chrono::Duration::seconds(window)
    }
}

fn pending_key(requester_id: &str) -> String {
    format!("{PENDING_PREFIX}{requester_id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use keydrop_store::MemoryStore;

    use super::*;
    use crate::model::Code;

    fn workflow(window: Duration) -> ClearWorkflow<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(CodeRepository::new(Arc::clone(&store)));
        ClearWorkflow::new(store, repo).with_window(window)
    }

    async fn seed(wf: &ClearWorkflow<MemoryStore>, raws: &[&str]) {
        for raw in raws {
            wf.repo
                .insert_if_absent(&Code::from_str(raw).unwrap())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn initiate_then_confirm_deletes_everything() {
        let wf = workflow(DEFAULT_CONFIRM_WINDOW);
        seed(&wf, &["tier200-aaaaaa", "tier500-bbbbbb", "unlimited-cccccc"]).await;

        wf.initiate("admin-1").await.unwrap();
        let deleted = wf.confirm("admin-1").await.unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(wf.repo.remaining(crate::model::Category::Tier200).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn confirm_without_initiate_is_rejected() {
        let wf = workflow(DEFAULT_CONFIRM_WINDOW);
        assert!(matches!(
            wf.confirm("admin-1").await,
            Err(CoreError::NothingPending { .. })
        ));
    }

    #[tokio::test]
    async fn confirm_is_per_requester() {
        let wf = workflow(DEFAULT_CONFIRM_WINDOW);
        wf.initiate("admin-1").await.unwrap();

        assert!(matches!(
            wf.confirm("admin-2").await,
            Err(CoreError::NothingPending { .. })
        ));
    }

    #[tokio::test]
    async fn confirm_after_deadline_is_rejected_and_cleared() {
        // Zero window: the deadline has always already passed.
        let wf = workflow(Duration::from_secs(0));
        seed(&wf, &["tier200-aaaaaa"]).await;

        wf.initiate("admin-1").await.unwrap();
        assert!(matches!(
            wf.confirm("admin-1").await,
            Err(CoreError::ConfirmationExpired { .. } | CoreError::NothingPending { .. })
        ));

        // The pending slot is gone either way; codes survive.
        assert!(matches!(
            wf.confirm("admin-1").await,
            Err(CoreError::NothingPending { .. })
        ));
        assert_eq!(wf.repo.remaining(crate::model::Category::Tier200).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_drops_the_pending_action() {
        let wf = workflow(DEFAULT_CONFIRM_WINDOW);
        seed(&wf, &["tier200-aaaaaa"]).await;

        wf.initiate("admin-1").await.unwrap();
        assert!(wf.cancel("admin-1").await.unwrap());
        assert!(!wf.cancel("admin-1").await.unwrap());

        assert!(matches!(
            wf.confirm("admin-1").await,
            Err(CoreError::NothingPending { .. })
        ));
    }

    #[tokio::test]
    async fn reinitiate_overwrites_the_slot() {
        let wf = workflow(DEFAULT_CONFIRM_WINDOW);
        let first = wf.initiate("admin-1").await.unwrap();
        let second = wf.initiate("admin-1").await.unwrap();
        assert!(second.issued_at >= first.issued_at);

        seed(&wf, &["tier200-aaaaaa"]).await;
        assert_eq!(wf.confirm("admin-1").await.unwrap(), 1);
    }
}
