use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// spec §4.2: "If event-id overflow is reached (2^63), behavior is
    /// fatal." The Store never retries; this propagates straight up.
    #[error("event id space exhausted")]
    EventSpaceExhausted,
}
