use wk_types::ErrorKind;

/// Maps a completed HTTP response's status code onto the shared taxonomy
/// (spec §7). `2xx` is the caller's problem to interpret, not this function's.
pub fn classify_status(status: reqwest::StatusCode) -> Option<ErrorKind> {
    if status.is_success() {
        return None;
    }
    if status.as_u16() == 429 {
        return Some(ErrorKind::RateLimited);
    }
    if status.is_server_error() {
        return Some(ErrorKind::ServerError(status.as_u16()));
    }
    Some(ErrorKind::ClientError(status.as_u16()))
}

pub fn classify_transport(err: &reqwest::Error) -> ErrorKind {
    if err.is_timeout() {
        ErrorKind::Timeout
    } else if err.is_connect() {
        ErrorKind::ConnectionFailed(err.to_string())
    } else if err.is_decode() {
        ErrorKind::ParseError(err.to_string())
    } else {
        ErrorKind::ConnectionFailed(err.to_string())
    }
}
