// ── Code identity types ──
//
// Category and Code form the foundation of every lifecycle operation.
// Parsing is the only way to construct a Code, so anything holding one
// is already normalized (lowercase) and structurally valid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Suffix length every code must carry after the category separator.
pub const SUFFIX_LEN: usize = 6;

// ── Category ────────────────────────────────────────────────────────

/// Fixed unlock tiers. The wire form is the lowercase name
/// (`tier200`, ..., `unlimited`), which doubles as the storage key prefix.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tier200,
    Tier500,
    Tier1000,
    Tier5000,
    Unlimited,
}

impl Category {
    /// Every category, in tier order.
    pub const ALL: [Category; 5] = [
        Category::Tier200,
        Category::Tier500,
        Category::Tier1000,
        Category::Tier5000,
        Category::Unlimited,
    ];

    /// Entitlement limit a redeemed code of this category grants.
    /// `None` means unbounded. Informational only -- it never bounds how
    /// many codes of the category may exist in storage.
    pub fn limit(self) -> Option<u32> {
        match self {
            Category::Tier200 => Some(200),
            Category::Tier500 => Some(500),
            Category::Tier1000 => Some(1000),
            Category::Tier5000 => Some(5000),
            Category::Unlimited => None,
        }
    }

    /// Storage key prefix for this category (`"tier200-"`).
    pub fn key_prefix(self) -> String {
        format!("{self}-")
    }
}

// ── Code ────────────────────────────────────────────────────────────

/// A single redeemable unlock code: `<category>-<suffix>`.
///
/// The suffix is exactly [`SUFFIX_LEN`] ASCII alphanumerics. Input is
/// trimmed and lowercased before validation, so two spellings of the
/// same code collapse to one storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Code {
    category: Category,
    suffix: String,
}

impl Code {
    pub fn category(&self) -> Category {
        self.category
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The exact storage key for this code.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.category, self.suffix)
    }
}

impl FromStr for Code {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(CoreError::InvalidFormat {
                reason: "empty code".into(),
            });
        }

        let Some((category_raw, suffix)) = normalized.split_once('-') else {
            return Err(CoreError::InvalidFormat {
                reason: "missing '-' separator".into(),
            });
        };

        let category =
            Category::from_str(category_raw).map_err(|_| CoreError::InvalidFormat {
                reason: format!("unknown category '{category_raw}'"),
            })?;

        if suffix.len() != SUFFIX_LEN
            || !suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(CoreError::InvalidFormat {
                reason: format!("suffix must be {SUFFIX_LEN} alphanumeric characters"),
            });
        }

        Ok(Self {
            category,
            suffix: suffix.to_owned(),
        })
    }
}

// ── Code state ──────────────────────────────────────────────────────

/// Canonical persisted state tags. The store maps a code's storage key
/// to exactly one of these strings; absence means the code is unknown.
///
/// Lifecycle: `valid` (imported, dispensable) -> `used` (handed to a
/// requester, awaiting redemption) -> `redeemed` (terminal). A code
/// redeemed straight from `valid` (admin-added, never dispensed) skips
/// the middle state. Deployments running in delete mode remove the key
/// at redemption instead of writing the terminal tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeState {
    Valid,
    Used,
    Redeemed,
}

impl CodeState {
    /// The tag written to the store.
    pub fn as_tag(self) -> &'static str {
        match self {
            CodeState::Valid => "valid",
            CodeState::Used => "used",
            CodeState::Redeemed => "redeemed",
        }
    }

    /// Parse a stored tag. Unknown tags are `None` -- legacy boolean
    /// sentinels are deliberately not honored.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "valid" => Some(CodeState::Valid),
            "used" => Some(CodeState::Used),
            "redeemed" => Some(CodeState::Redeemed),
            _ => None,
        }
    }

    /// Whether a redemption may still consume this entry.
    pub fn is_redeemable(self) -> bool {
        matches!(self, CodeState::Valid | CodeState::Used)
    }
}

impl fmt::Display for CodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// A code together with its persisted state, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    pub code: Code,
    pub state: CodeState,
}
