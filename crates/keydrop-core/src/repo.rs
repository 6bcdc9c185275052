// ── Code repository ──
//
// Sole writer of persisted code state. Every mutation goes through the
// store's per-key conditional primitives, so at-most-once dispense and
// at-most-once redemption hold across any number of process instances
// sharing the backend. Reads are never trusted for allocation decisions
// -- a candidate found by scan still has to win its compare-and-swap
// before it is handed out.

use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use keydrop_store::KvStore;

use crate::error::CoreError;
use crate::model::{Category, Code, CodeEntry, CodeState};

/// What a winning redemption does to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedeemMode {
    /// Write the terminal `redeemed` tag; the key stays as a tombstone.
    #[default]
    MarkRedeemed,
    /// Delete the key outright; redeemed codes leave no trace.
    Delete,
}

/// One page of a category listing. `cursor == 0` ends the iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePage {
    pub entries: Vec<CodeEntry>,
    pub cursor: u64,
}

impl CodePage {
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

const DEFAULT_PAGE_SIZE: usize = 100;
const PING_KEY: &str = "keydrop:ping";
const PING_TTL_SECONDS: u64 = 5;

/// Repository owning the code -> state mapping.
pub struct CodeRepository<S: KvStore> {
    store: Arc<S>,
    mode: RedeemMode,
    page_size: usize,
}

impl<S: KvStore> CodeRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            mode: RedeemMode::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_mode(mut self, mode: RedeemMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn mode(&self) -> RedeemMode {
        self.mode
    }

    // ── Single-code operations ───────────────────────────────────────

    /// `true` if the code is present and still dispensable.
    pub async fn exists(&self, code: &Code) -> Result<bool, CoreError> {
        Ok(self.state_of(code).await? == Some(CodeState::Valid))
    }

    /// Current persisted state, or `None` when absent (or holding an
    /// unrecognized legacy tag, which is logged and treated as absent).
    pub async fn state_of(&self, code: &Code) -> Result<Option<CodeState>, CoreError> {
        let key = code.storage_key();
        match self.store.get(&key).await? {
            None => Ok(None),
            Some(tag) => match CodeState::from_tag(&tag) {
                Some(state) => Ok(Some(state)),
                None => {
                    warn!(%key, %tag, "ignoring entry with unrecognized state tag");
                    Ok(None)
                }
            },
        }
    }

    /// Atomically create the code as unused. `false` when the key is
    /// already present in any state (idempotent import).
    pub async fn insert_if_absent(&self, code: &Code) -> Result<bool, CoreError> {
        let key = code.storage_key();
        let created = self
            .store
            .set_if_absent(&key, CodeState::Valid.as_tag())
            .await?;
        if created {
            debug!(%key, "code inserted");
        }
        Ok(created)
    }

    /// Atomically allocate one unused code of `category`.
    ///
    /// Candidates are gathered by prefix scan, then tried in uniformly
    /// random order to keep allocation unpredictable. The `valid -> used`
    /// compare-and-swap is the serialization point: losing it just means
    /// another caller got that code first, so the next candidate is tried.
    pub async fn dispense_one(&self, category: Category) -> Result<Code, CoreError> {
        let mut candidates = self.collect_valid(category).await?;

        while !candidates.is_empty() {
            let pick = rand::rng().random_range(0..candidates.len());
            let code = candidates.swap_remove(pick);
            let won = self
                .store
                .compare_and_swap(
                    &code.storage_key(),
                    CodeState::Valid.as_tag(),
                    CodeState::Used.as_tag(),
                )
                .await?;
            if won {
                info!(code = %code, %category, "dispensed code");
                return Ok(code);
            }
            warn!(code = %code, "lost dispense race, trying another candidate");
        }

        Err(CoreError::NoCodesAvailable { category })
    }

    /// Transition a code `valid -> used`. Exactly one caller can win.
    pub async fn mark_used(&self, code: &Code) -> Result<(), CoreError> {
        let won = self
            .store
            .compare_and_swap(
                &code.storage_key(),
                CodeState::Valid.as_tag(),
                CodeState::Used.as_tag(),
            )
            .await?;
        if won {
            info!(code = %code, "code marked used");
            return Ok(());
        }
        Err(self.rejection_for(code).await?)
    }

    /// Terminally consume a code (the verify path). Accepts entries in
    /// `valid` (admin-added, never dispensed) or `used` (dispensed,
    /// awaiting redemption); each conditional mutation is atomic, so a
    /// code is redeemed at most once no matter how many callers race.
    pub async fn redeem(&self, code: &Code) -> Result<(), CoreError> {
        let key = code.storage_key();
        for from in [CodeState::Valid, CodeState::Used] {
            let won = match self.mode {
                RedeemMode::MarkRedeemed => {
                    self.store
                        .compare_and_swap(&key, from.as_tag(), CodeState::Redeemed.as_tag())
                        .await?
                }
                RedeemMode::Delete => self.store.compare_and_delete(&key, from.as_tag()).await?,
            };
            if won {
                info!(%key, from = %from, "code redeemed");
                return Ok(());
            }
        }
        Err(self.rejection_for(code).await?)
    }

    // ── Enumeration ──────────────────────────────────────────────────

    /// One page of entries for `category`, resuming from `cursor`
    /// (`0` to start). Restartable; no total-order guarantee.
    pub async fn list_page(
        &self,
        category: Category,
        cursor: u64,
    ) -> Result<CodePage, CoreError> {
        let page = self
            .store
            .scan(&category.key_prefix(), cursor, self.page_size)
            .await?;

        let mut entries = Vec::with_capacity(page.keys.len());
        for key in &page.keys {
            let Ok(code) = Code::from_str(key) else {
                debug!(%key, "skipping malformed key in category scan");
                continue;
            };
            if let Some(state) = self.state_of(&code).await? {
                entries.push(CodeEntry { code, state });
            }
        }

        Ok(CodePage {
            entries,
            cursor: page.cursor,
        })
    }

    /// Count of unused codes remaining in `category`.
    pub async fn remaining(&self, category: Category) -> Result<usize, CoreError> {
        Ok(self.collect_valid(category).await?.len())
    }

    /// Category-wise unused counts, in tier order.
    pub async fn counts(&self) -> Result<Vec<(Category, usize)>, CoreError> {
        let mut out = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            out.push((category, self.remaining(category).await?));
        }
        Ok(out)
    }

    // ── Bulk delete ──────────────────────────────────────────────────

    /// Delete every entry in the given categories, in any state.
    /// Returns the count actually deleted. Keys are collected first so
    /// deletions cannot perturb the scan cursor mid-iteration.
    pub async fn delete_all(&self, categories: &[Category]) -> Result<usize, CoreError> {
        let mut deleted = 0;
        for &category in categories {
            for key in self.collect_keys(category).await? {
                if self.store.delete(&key).await? {
                    deleted += 1;
                }
            }
        }
        info!(deleted, "bulk delete finished");
        Ok(deleted)
    }

    // ── Health ───────────────────────────────────────────────────────

    /// Round-trip a throwaway key with a short expiry.
    pub async fn ping(&self) -> Result<(), CoreError> {
        self.store
            .set_with_ttl(PING_KEY, "ok", PING_TTL_SECONDS)
            .await?;
        match self.store.get(PING_KEY).await? {
            Some(v) if v == "ok" => Ok(()),
            other => Err(CoreError::StoreUnavailable {
                reason: format!("ping readback mismatch: {other:?}"),
            }),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Why a conditional mutation on `code` failed.
    async fn rejection_for(&self, code: &Code) -> Result<CoreError, CoreError> {
        let rejection = match self.state_of(code).await? {
            None => CoreError::CodeNotFound {
                code: code.to_string(),
            },
            Some(_) => CoreError::AlreadyUsed {
                code: code.to_string(),
            },
        };
        Ok(rejection)
    }

    /// All keys under a category prefix, across every scan page.
    async fn collect_keys(&self, category: Category) -> Result<Vec<String>, CoreError> {
        let prefix = category.key_prefix();
        let mut keys = Vec::new();
        let mut cursor = 0;
        loop {
            let page = self.store.scan(&prefix, cursor, self.page_size).await?;
            keys.extend(page.keys);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }
        Ok(keys)
    }

    /// Parseable, still-unused codes in a category.
    async fn collect_valid(&self, category: Category) -> Result<Vec<Code>, CoreError> {
        let mut codes = Vec::new();
        for key in self.collect_keys(category).await? {
            let Ok(code) = Code::from_str(&key) else {
                debug!(%key, "skipping malformed key in category scan");
                continue;
            };
            if self.exists(&code).await? {
                codes.push(code);
            }
        }
        Ok(codes)
    }
}
