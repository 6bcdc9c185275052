// ── Core error types ──
//
// User-facing errors from keydrop-core. Consumers never see reqwest or
// JSON parse failures directly -- the `From<StoreError>` impl folds every
// storage failure into `StoreUnavailable`, which callers may retry.

use thiserror::Error;

use keydrop_store::StoreError;

use crate::model::Category;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Client input ─────────────────────────────────────────────────
    #[error("Invalid code format: {reason}")]
    InvalidFormat { reason: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("No unused {category} codes available")]
    NoCodesAvailable { category: Category },

    #[error("Code not found: {code}")]
    CodeNotFound { code: String },

    #[error("Code already used: {code}")]
    AlreadyUsed { code: String },

    // ── Admin workflow ───────────────────────────────────────────────
    #[error("No pending clear action for requester {requester}")]
    NothingPending { requester: String },

    #[error("Clear confirmation window expired for requester {requester}")]
    ConfirmationExpired { requester: String },

    // ── Import ───────────────────────────────────────────────────────
    #[error("Upload could not be parsed: {message}")]
    UploadParse { message: String },

    // ── Infrastructure ───────────────────────────────────────────────
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` when the caller's own input caused the failure
    /// (non-retryable, translate to a 4xx / user message).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat { .. }
                | Self::NoCodesAvailable { .. }
                | Self::CodeNotFound { .. }
                | Self::AlreadyUsed { .. }
                | Self::NothingPending { .. }
                | Self::ConfirmationExpired { .. }
                | Self::UploadParse { .. }
        )
    }

    /// Returns `true` if retrying later might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::StoreUnavailable {
            reason: err.to_string(),
        }
    }
}
