use thiserror::Error;

/// Top-level error type for the `keydrop-store` crate.
///
/// Covers every failure mode of the storage layer: transport, auth,
/// server-side command errors, and payload decoding. `keydrop-core`
/// maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum StoreError {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Authentication ──────────────────────────────────────────────
    /// The store rejected our token (HTTP 401/403).
    #[error("Store rejected credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// The configured token cannot be sent as an HTTP header.
    #[error("Store token contains characters not valid in a header")]
    InvalidToken,

    // ── Server-side ─────────────────────────────────────────────────
    /// Structured error returned in the REST envelope.
    #[error("Store command failed: {message}")]
    Command { message: String },

    /// Non-success HTTP status without a parseable envelope.
    #[error("Store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Data ────────────────────────────────────────────────────────
    /// The envelope decoded, but the result had an unexpected shape.
    #[error("Unexpected store response: {message}")]
    UnexpectedResponse { message: String },

    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl StoreError {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the store rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
