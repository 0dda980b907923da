use thiserror::Error;
use wk_types::ErrorKind;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("subscription not found: {0}")]
    NotFound(String),
}

impl From<SubscriptionError> for ErrorKind {
    fn from(e: SubscriptionError) -> Self {
        match e {
            SubscriptionError::Validation(msg) => ErrorKind::Validation(msg),
            SubscriptionError::NotFound(id) => ErrorKind::Validation(format!("unknown subscription: {id}")),
        }
    }
}
