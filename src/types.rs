//! Shared identifier and timestamp types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unix timestamp in milliseconds.
pub type Millis = u64;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Wrap an existing id string without validation.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Generate a fresh id from the given creation inputs.
            pub fn generate(now_ms: Millis, parts: &[&[u8]]) -> Self {
                Self(generate_id($prefix, now_ms, parts))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

string_id!(
    /// Identifier of a context item (`ctx-…`).
    ContextId,
    "ctx"
);
string_id!(
    /// Identifier of a frame (`frm-…`).
    FrameId,
    "frm"
);
string_id!(
    /// Identifier of an attention log entry (`att-…`).
    AttentionId,
    "att"
);
string_id!(
    /// Identifier of a checkpoint (`chk-…`).
    ///
    /// The millisecond component is zero padded so ids sort chronologically.
    CheckpointId,
    "chk"
);

/// Compute a prefixed id: `{prefix}-{now_ms:013}-{hex16}`
///
/// The hash covers the creation inputs, the process id, and a process-wide
/// counter, so two ids minted in the same millisecond never collide.
fn generate_id(prefix: &str, now_ms: Millis, parts: &[&[u8]]) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut hasher = blake3::Hasher::new();
    hasher.update(prefix.as_bytes());
    hasher.update(&now_ms.to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    format!("{prefix}-{now_ms:013}-{}", hex::encode(&digest.as_bytes()[..8]))
}

/// Wall-clock milliseconds since the unix epoch.
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Render a millisecond timestamp as RFC 3339 (UTC).
pub fn format_millis(ms: Millis) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms as i64)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
