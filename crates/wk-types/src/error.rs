use thiserror::Error;

/// Error taxonomy shared across the ingestion pipeline (spec §7).
///
/// Each variant names the recoverability the rest of the pipeline relies on:
/// see [`ErrorKind::is_retryable`] and [`ErrorKind::is_skip`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    RateLimited,
    #[error("upstream timeout")]
    Timeout,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("upstream server error (status {0})")]
    ServerError(u16),
    #[error("upstream client error (status {0})")]
    ClientError(u16),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("kill too old")]
    KillTooOld,
    #[error("missing required fields: {0:?}")]
    MissingRequiredFields(Vec<String>),
    #[error("invalid field types: {0:?}")]
    InvalidFieldTypes(Vec<String>),
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("circuit open")]
    CircuitOpen,
    #[error("queue full")]
    QueueFull,
    #[error("enrichment partial")]
    EnrichmentPartial,
    #[error("task exited: {0}")]
    TaskExit(String),
    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),
}

impl ErrorKind {
    /// Whether a caller should retry this failure (spec §7 table).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::Timeout
                | ErrorKind::ConnectionFailed(_)
                | ErrorKind::ServerError(_)
                | ErrorKind::CircuitOpen
                | ErrorKind::QueueFull
        )
    }

    /// Whether this is a skip (not an error) in the pipeline's accounting.
    pub fn is_skip(&self) -> bool {
        matches!(self, ErrorKind::KillTooOld)
    }

    /// Whether this failure increments the circuit breaker's failure counter.
    pub fn affects_circuit(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::ServerError(_))
    }
}
