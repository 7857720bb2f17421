// Typed error taxonomy: store failures propagate unchanged; malformed payloads
// and missing info snapshots are distinct decode-level failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// A batch produced fewer or differently-shaped replies than the ops submitted.
    #[error("batch reply mismatch: {0}")]
    BatchReply(String),
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Stored payload did not decode against the expected schema. Never
    /// silently coerced; surfaced to the caller.
    #[error("decode failure for {key}: {reason}")]
    Decode { key: String, reason: String },

    /// No info snapshot has ever been written for this server.
    #[error("no info snapshot stored for server {server}")]
    InfoNotFound { server: String },
}
