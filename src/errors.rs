use thiserror::Error;

/// Top-level console error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum ConsoleError {
    // ── Event stream errors ──────────────────────────────────────────────────
    #[error("Malformed event payload: {source} (data: {excerpt})")]
    MalformedEvent {
        excerpt: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Event stream is not valid UTF-8: {0}")]
    InvalidEncoding(#[source] std::str::Utf8Error),

    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    // ── Upstream API errors ──────────────────────────────────────────────────
    #[error("Upstream returned {status} for {url}")]
    Upstream { status: u16, url: String },

    // ── Configuration errors ─────────────────────────────────────────────────
    #[error("Invalid value '{value}' for {key}")]
    InvalidConfig { key: String, value: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ConsoleError {
    /// Builds a [`ConsoleError::MalformedEvent`], keeping at most 200 bytes of the payload.
    pub fn malformed(payload: &str, source: serde_json::Error) -> Self {
        let mut end = payload.len().min(200);
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        ConsoleError::MalformedEvent { excerpt: payload[..end].to_string(), source }
    }

    pub fn connection(url: impl Into<String>, source: impl std::fmt::Display) -> Self {
        ConsoleError::Connection { url: url.into(), message: source.to_string() }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ConsoleError::MalformedEvent { .. } | ConsoleError::InvalidEncoding(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, ConsoleError::Connection { .. } | ConsoleError::Upstream { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ConsoleError::EmptyField { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_excerpt_respects_char_boundaries() {
        let payload = "é".repeat(150);
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ConsoleError::malformed(&payload, source);
        match err {
            ConsoleError::MalformedEvent { excerpt, .. } => {
                assert!(excerpt.len() <= 200);
                assert!(excerpt.chars().all(|c| c == 'é'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn predicates_classify_variants() {
        assert!(ConsoleError::connection("http://x", "refused").is_connection());
        assert!(ConsoleError::Upstream { status: 502, url: "http://x".into() }.is_connection());
        assert!(ConsoleError::EmptyField { field_name: "prompt".into() }.is_validation());
        assert!(!ConsoleError::Unexpected("boom".into()).is_validation());
    }
}
