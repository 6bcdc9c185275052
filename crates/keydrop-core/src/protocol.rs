// ── Dispense / verify protocol ──
//
// The two-phase surface external callers drive:
//
//     Requested -> Allocated -> Confirmed (terminal)
//                -> Rejected  (terminal)
//
// `request` covers Requested -> Allocated/Rejected; a later `verify`
// call is the Confirmed transition. The two phases stay separate entry
// points because allocation and redemption arrive on different channels
// (chat command vs. web form) and must not share a trust boundary.

use std::str::FromStr;

use tracing::info;

use keydrop_store::KvStore;

use crate::error::CoreError;
use crate::model::{Category, Code};
use crate::repo::CodeRepository;

/// What a redeemed code entitles its holder to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlement {
    pub category: Category,
    /// Maximum variation count; `None` is unbounded.
    pub max: Option<u32>,
}

/// Terminal result of the allocation phase.
#[derive(Debug)]
pub enum RequestOutcome {
    /// A code was atomically allocated to this requester.
    Allocated(Code),
    /// Unknown category or nothing left to allocate.
    Rejected(CoreError),
}

impl RequestOutcome {
    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated(_))
    }
}

/// Allocation phase: ask for one code in `category`.
///
/// The category string arrives raw from the caller (e.g. a bot command
/// argument) and is matched against the enumerated set; anything else
/// rejects without touching the store.
pub async fn request<S: KvStore>(repo: &CodeRepository<S>, category: &str) -> RequestOutcome {
    let normalized = category.trim().to_lowercase();
    let Ok(category) = Category::from_str(&normalized) else {
        return RequestOutcome::Rejected(CoreError::InvalidFormat {
            reason: format!("unknown category '{normalized}'"),
        });
    };

    match repo.dispense_one(category).await {
        Ok(code) => RequestOutcome::Allocated(code),
        Err(e) => RequestOutcome::Rejected(e),
    }
}

/// Redemption phase: consume a previously issued code exactly once.
///
/// Re-validates the format, then performs the mode-dependent conditional
/// consume. A second submission of the same code fails with
/// `AlreadyUsed` (mark-redeemed mode) or `CodeNotFound` (delete mode).
pub async fn verify<S: KvStore>(
    repo: &CodeRepository<S>,
    raw: &str,
) -> Result<Entitlement, CoreError> {
    let code = Code::from_str(raw)?;
    repo.redeem(&code).await?;

    let category = code.category();
    info!(code = %code, %category, "code redeemed");
    Ok(Entitlement {
        category,
        max: category.limit(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use keydrop_store::MemoryStore;

    use super::*;
    use crate::repo::RedeemMode;

    fn repo() -> CodeRepository<MemoryStore> {
        CodeRepository::new(Arc::new(MemoryStore::new()))
    }

    async fn seed(repo: &CodeRepository<MemoryStore>, raw: &str) -> Code {
        let code = Code::from_str(raw).unwrap();
        repo.insert_if_absent(&code).await.unwrap();
        code
    }

    #[tokio::test]
    async fn request_unknown_category_rejects_without_dispensing() {
        let repo = repo();
        seed(&repo, "tier200-abc123").await;

        let outcome = request(&repo, "gold").await;
        assert!(matches!(
            outcome,
            RequestOutcome::Rejected(CoreError::InvalidFormat { .. })
        ));
        assert_eq!(repo.remaining(Category::Tier200).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn request_with_no_stock_or_no_category_rejects() {
        let repo = repo();
        let outcome = request(&repo, "tier200").await;
        assert!(matches!(
            outcome,
            RequestOutcome::Rejected(CoreError::NoCodesAvailable { .. })
        ));
        assert!(!request(&repo, "").await.is_allocated());
    }

    #[tokio::test]
    async fn allocate_then_verify_exactly_once() {
        let repo = repo();
        seed(&repo, "tier1000-abc123").await;

        let RequestOutcome::Allocated(code) = request(&repo, "tier1000").await else {
            panic!("expected allocation");
        };

        let entitlement = verify(&repo, &code.to_string()).await.unwrap();
        assert_eq!(entitlement.category, Category::Tier1000);
        assert_eq!(entitlement.max, Some(1000));

        let err = verify(&repo, &code.to_string()).await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyUsed { .. }));
    }

    #[tokio::test]
    async fn verify_admin_added_code_succeeds_exactly_once() {
        let repo = repo();
        seed(&repo, "tier5000-xyz789").await;

        let entitlement = verify(&repo, "TIER5000-XYZ789").await.unwrap();
        assert_eq!(entitlement.category, Category::Tier5000);
        assert_eq!(entitlement.max, Some(5000));

        let err = verify(&repo, "tier5000-xyz789").await.unwrap_err();
        assert!(matches!(err, CoreError::AlreadyUsed { .. }));
    }

    #[tokio::test]
    async fn verify_in_delete_mode_reports_not_found_on_resubmit() {
        let store = Arc::new(MemoryStore::new());
        let repo = CodeRepository::new(store).with_mode(RedeemMode::Delete);
        seed(&repo, "unlimited-abc123").await;

        let entitlement = verify(&repo, "unlimited-abc123").await.unwrap();
        assert_eq!(entitlement.max, None);

        let err = verify(&repo, "unlimited-abc123").await.unwrap_err();
        assert!(matches!(err, CoreError::CodeNotFound { .. }));
    }

    #[tokio::test]
    async fn verify_rejects_malformed_input() {
        let repo = repo();
        let err = verify(&repo, "tier200abc123").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidFormat { .. }));
    }
}
