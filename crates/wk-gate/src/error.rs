use thiserror::Error;

/// Failure to even reach the upstream call (spec §4.4). Distinct from the
/// upstream call's own error type, which `execute` wraps in `GateError::Upstream`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("circuit open")]
    CircuitOpen,
    #[error("queue full")]
    QueueFull,
    #[error("timed out waiting for a permit")]
    Timeout,
}

/// Outcome of `Gate::execute`: either the gate itself refused the call, or
/// the call ran and the upstream closure returned `Err`.
#[derive(Debug, Clone)]
pub enum ExecuteError<E> {
    Gate(GateError),
    Upstream(E),
}

impl<E: std::fmt::Display> std::fmt::Display for ExecuteError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteError::Gate(e) => write!(f, "{e}"),
            ExecuteError::Upstream(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for ExecuteError<E> {}
