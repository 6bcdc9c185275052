// keydrop-core: unlock-code lifecycle between keydrop-store and consumers
// (bot command handlers, HTTP glue).

pub mod admin;
pub mod error;
pub mod import;
pub mod model;
pub mod protocol;
pub mod repo;

// ── Primary re-exports ──────────────────────────────────────────────
pub use admin::{ClearWorkflow, DEFAULT_CONFIRM_WINDOW, PendingAction, PendingConfirmation};
pub use error::CoreError;
pub use import::{ExportFormat, ImportFormat, ImportReport, export_codes, import_codes};
pub use model::{Category, Code, CodeEntry, CodeState, SUFFIX_LEN};
pub use protocol::{Entitlement, RequestOutcome, request, verify};
pub use repo::{CodePage, CodeRepository, RedeemMode};
