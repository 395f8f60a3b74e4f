//! Error types for teslog-core operations.
//!
//! Malformed input is not an error here: the normalizer reports it as a
//! skip. Errors are reserved for driver bugs and collaborator failures.

// ═══════════════════════════════════════════════════════════════════════════════
// Core Error
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum TeslogError {
    // ─────────────────────────────────────────────────────────────────────
    // Contract Violations
    // ─────────────────────────────────────────────────────────────────────
    #[error("Session {active} is still open; it must be closed before another opens")]
    SessionAlreadyOpen { active: u64 },

    // ─────────────────────────────────────────────────────────────────────
    // Collaborator Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Geolocation lookup failed: {0}")]
    Locate(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("Record sink error: {context}: {source}")]
    Sink {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using TeslogError.
pub type Result<T> = std::result::Result<T, TeslogError>;

impl From<TeslogError> for String {
    fn from(err: TeslogError) -> String {
        err.to_string()
    }
}
