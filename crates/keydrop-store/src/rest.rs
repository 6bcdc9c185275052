// Redis-over-REST backend (Upstash-compatible).
//
// Speaks the single-command POST protocol: the request body is a JSON
// array of command arguments, the response is a `{"result": ...}` or
// `{"error": "..."}` envelope. Conditional mutations are EVAL scripts so
// the compare and the write execute server-side as one atomic step --
// that atomicity is what the repository's dispense guarantees stand on.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::StoreError;
use crate::kv::{KvStore, ScanPage};
use crate::transport::TransportConfig;

const CAS_SCRIPT: &str = "if redis.call('GET', KEYS[1]) == ARGV[1] then \
     redis.call('SET', KEYS[1], ARGV[2]) return 1 else return 0 end";

const CAD_SCRIPT: &str = "if redis.call('GET', KEYS[1]) == ARGV[1] then \
     return redis.call('DEL', KEYS[1]) else return 0 end";

/// Response envelope used by Upstash-style REST endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// `KvStore` backend over an Upstash-compatible Redis REST endpoint.
///
/// The bearer token is injected as a default header at construction;
/// individual calls never touch credentials.
pub struct RestStore {
    http: reqwest::Client,
    base_url: Url,
}

impl RestStore {
    /// Create a new REST store client.
    pub fn new(
        base_url: Url,
        token: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, StoreError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| StoreError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = transport.build_client(headers)?;
        Ok(Self { http, base_url })
    }

    /// The store endpoint this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Protocol plumbing ────────────────────────────────────────────

    /// Send one command and unwrap the REST envelope.
    async fn command(&self, args: &[&str]) -> Result<Value, StoreError> {
        debug!(cmd = args.first().copied().unwrap_or(""), "store command");

        let resp = self
            .http
            .post(self.base_url.clone())
            .json(&args)
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(StoreError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(StoreError::Transport)?;
        let envelope: Envelope =
            serde_json::from_str(&body).map_err(|e| StoreError::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        if let Some(message) = envelope.error {
            return Err(StoreError::Command { message });
        }
        if !status.is_success() {
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }

    fn expect_int(value: &Value) -> Result<i64, StoreError> {
        value.as_i64().ok_or_else(|| StoreError::UnexpectedResponse {
            message: format!("expected integer result, got {value}"),
        })
    }
}

impl KvStore for RestStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.command(&["GET", key]).await? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(s)),
            other => Err(StoreError::UnexpectedResponse {
                message: format!("GET returned {other}"),
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.command(&["SET", key, value]).await?;
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: u64,
    ) -> Result<(), StoreError> {
        let ttl = ttl_seconds.to_string();
        self.command(&["SET", key, value, "EX", &ttl]).await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        // SET ... NX answers "OK" on creation, null when the key exists.
        let result = self.command(&["SET", key, value, "NX"]).await?;
        Ok(!result.is_null())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new_value: &str,
    ) -> Result<bool, StoreError> {
        let result = self
            .command(&["EVAL", CAS_SCRIPT, "1", key, expected, new_value])
            .await?;
        Ok(Self::expect_int(&result)? == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let result = self
            .command(&["EVAL", CAD_SCRIPT, "1", key, expected])
            .await?;
        Ok(Self::expect_int(&result)? >= 1)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = self.command(&["DEL", key]).await?;
        Ok(Self::expect_int(&result)? >= 1)
    }

    async fn scan(&self, prefix: &str, cursor: u64, limit: usize) -> Result<ScanPage, StoreError> {
        let cursor_arg = cursor.to_string();
        let pattern = format!("{prefix}*");
        let count = limit.max(1).to_string();

        let result = self
            .command(&["SCAN", &cursor_arg, "MATCH", &pattern, "COUNT", &count])
            .await?;

        // SCAN answers a two-element array: [next_cursor, [keys...]].
        // The cursor arrives as a string on most deployments; accept a
        // bare number too.
        let parts = result
            .as_array()
            .filter(|a| a.len() == 2)
            .ok_or_else(|| StoreError::UnexpectedResponse {
                message: format!("SCAN returned {result}"),
            })?;

        let next = match &parts[0] {
            Value::String(s) => s.parse::<u64>().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
        .ok_or_else(|| StoreError::UnexpectedResponse {
            message: format!("SCAN cursor not numeric: {}", parts[0]),
        })?;

        let keys = parts[1]
            .as_array()
            .ok_or_else(|| StoreError::UnexpectedResponse {
                message: format!("SCAN keys not an array: {}", parts[1]),
            })?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();

        Ok(ScanPage { keys, cursor: next })
    }
}
