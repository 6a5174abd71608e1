//! Error taxonomy for the session-state subsystem.
//!
//! Cache misses are not errors; they are reported through
//! [`CacheLookup`](super::CacheLookup). Everything here is a condition the
//! caller must handle explicitly.

/// Labeled failure from a session-state operation.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// An identifier or text argument was empty or malformed.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// `cached_data` holds a key with no matching `cached_at` entry.
    #[error("cached data '{0}' has no cached_at timestamp")]
    MissingCacheTimestamp(String),

    /// A serialized state failed to parse or violates a structural invariant.
    #[error("corrupt session state: {0}")]
    CorruptState(String),

    /// A query referenced a merchant other than the one owning the session.
    #[error("session belongs to {expected}, but the query references {found}")]
    MerchantMismatch { expected: String, found: String },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_names_the_field() {
        let err = SessionError::invalid("merchant_id", "must not be empty");
        assert_eq!(err.to_string(), "invalid merchant_id: must not be empty");
    }

    #[test]
    fn mismatch_mentions_both_merchants() {
        let err = SessionError::MerchantMismatch {
            expected: "mch_111111".into(),
            found: "mch_222222".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mch_111111"));
        assert!(msg.contains("mch_222222"));
    }
}
