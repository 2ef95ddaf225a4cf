// =============================================================================
// Error taxonomy
// =============================================================================
//
// Every venue/client/persistence operation that can fail in a way the caller
// needs to branch on returns `EngineError`. Anything else (config parsing,
// one-shot startup plumbing) keeps using `anyhow::Result` the way the rest
// of this codebase does.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Venue 401/403, or credentials missing entirely. Fail fast — do not retry.
    #[error("auth error: {0}")]
    Auth(String),

    /// Venue 418/429. The caller aborts the current operation; the limiter's
    /// own backoff state governs when the next attempt is allowed.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// 5xx, timeout, DNS failure. Safe to retry within the same tick.
    #[error("temporary error: {0}")]
    Temporary(String),

    /// 4xx business-rule rejection (reduceOnly violation, `retCode != 0`, ...).
    #[error("exchange rejected request: {0}")]
    Exchange(String),

    /// Duplicate-key violation on an idempotency constraint. Callers must
    /// treat this as success, never propagate it as a user-visible failure.
    #[error("integrity violation (idempotent no-op): {0}")]
    Integrity(String),

    /// Anything else — a bug, an invariant violation, an unexpected shape.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// `true` when the caller should retry later in the same tick rather
    /// than surface the error to the user.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Temporary(_) | EngineError::RateLimit(_))
    }

    /// `true` when this is the idempotent-duplicate-key case that callers
    /// must swallow as success per the `order_events` uniqueness invariant.
    pub fn is_idempotent_duplicate(&self) -> bool {
        matches!(self, EngineError::Integrity(_))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

/// Classify a raw sqlx error against the `order_events` idempotency
/// constraint (MySQL error 1062, duplicate entry on a unique key).
pub fn classify_sqlx_error(err: &sqlx::Error, idempotency_hint: &str) -> EngineError {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23000") || db_err.message().contains("Duplicate entry") {
            if db_err.message().contains(idempotency_hint) {
                return EngineError::Integrity(db_err.message().to_string());
            }
        }
    }
    EngineError::Internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(EngineError::Temporary("timeout".into()).is_retryable());
        assert!(EngineError::RateLimit("429".into()).is_retryable());
        assert!(!EngineError::Auth("401".into()).is_retryable());
        assert!(!EngineError::Exchange("reduceOnly".into()).is_retryable());
    }

    #[test]
    fn idempotent_duplicate_detection() {
        assert!(EngineError::Integrity("dup".into()).is_idempotent_duplicate());
        assert!(!EngineError::Internal("bug".into()).is_idempotent_duplicate());
    }
}
